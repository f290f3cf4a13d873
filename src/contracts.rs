//! Contract call shapes
//!
//! ABI structs for the external venues, declared with alloy's `sol!` macro,
//! plus the user-data encodings the generation-A vault expects for join and
//! exit. Only the shapes the fund actually builds are declared here.

use alloy::primitives::{aliases::U24, Bytes, Uint, U256};
use alloy::sol;
use alloy::sol_types::SolValue;

use crate::error::BackendError;

// ── Pairwise exchange, generation 2 ──────────────────────────────────

sol! {
    #[sol(all_derives)]
    struct ExactInputSingleParams {
        address tokenIn;
        address tokenOut;
        uint24 fee;
        address recipient;
        uint256 amountIn;
        uint256 amountOutMinimum;
        uint160 sqrtPriceLimitX96;
    }
}

// ── Pooled-liquidity vault, generation A ─────────────────────────────

sol! {
    #[sol(all_derives)]
    struct JoinPoolRequest {
        address[] assets;
        uint256[] maxAmountsIn;
        bytes userData;
        bool fromInternalBalance;
    }

    #[sol(all_derives)]
    struct ExitPoolRequest {
        address[] assets;
        uint256[] minAmountsOut;
        bytes userData;
        bool toInternalBalance;
    }
}

/// Join kind tags understood by the generation-A vault (first ABI word of user data).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// First deposit into a pool with zero supply: `(kind, amountsIn)`
    Init = 0,
    /// Proportional join: `(kind, amountsIn, minPoolTokenOut)`
    ExactTokensInForPoolTokenOut = 1,
}

/// Exit kind tag for a proportional exit: `(kind, poolTokenAmountIn)`
pub const EXIT_EXACT_POOL_TOKEN_IN_FOR_TOKENS_OUT: u8 = 1;

/// Decoded join user data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinData {
    pub kind: JoinKind,
    pub amounts_in: Vec<U256>,
    pub min_pool_token_out: U256,
}

/// Helper: convert u32 fee tier to alloy uint24 type for contract calls.
/// Uses from_limbs() because Uint<24, 1> doesn't impl From<u32>.
pub fn fee_to_u24(fee: u32) -> U24 {
    debug_assert!(fee <= 0xFFFFFF, "fee {} exceeds U24 max (16777215)", fee);
    Uint::from_limbs([u64::from(fee)])
}

/// Encode join user data for the given kind.
pub fn encode_join_data(kind: JoinKind, amounts_in: &[U256], min_pool_token_out: U256) -> Bytes {
    let tag = U256::from(kind as u8);
    let encoded = match kind {
        JoinKind::Init => (tag, amounts_in.to_vec()).abi_encode_params(),
        JoinKind::ExactTokensInForPoolTokenOut => {
            (tag, amounts_in.to_vec(), min_pool_token_out).abi_encode_params()
        }
    };
    Bytes::from(encoded)
}

/// Decode join user data; the first word selects the layout.
pub fn decode_join_data(data: &[u8]) -> Result<JoinData, BackendError> {
    match leading_tag(data)? {
        0 => {
            let (_, amounts_in) = <(U256, Vec<U256>)>::abi_decode_params(data)
                .map_err(|e| BackendError::Reverted(format!("bad init join data: {e}")))?;
            Ok(JoinData {
                kind: JoinKind::Init,
                amounts_in,
                min_pool_token_out: U256::ZERO,
            })
        }
        1 => {
            let (_, amounts_in, min_pool_token_out) =
                <(U256, Vec<U256>, U256)>::abi_decode_params(data)
                    .map_err(|e| BackendError::Reverted(format!("bad join data: {e}")))?;
            Ok(JoinData {
                kind: JoinKind::ExactTokensInForPoolTokenOut,
                amounts_in,
                min_pool_token_out,
            })
        }
        other => Err(BackendError::Reverted(format!("unsupported join kind {other}"))),
    }
}

/// Encode exit user data for a proportional exit.
pub fn encode_exit_data(pool_token_amount_in: U256) -> Bytes {
    let tag = U256::from(EXIT_EXACT_POOL_TOKEN_IN_FOR_TOKENS_OUT);
    Bytes::from((tag, pool_token_amount_in).abi_encode_params())
}

/// Decode proportional-exit user data, returning the pool-token amount.
pub fn decode_exit_data(data: &[u8]) -> Result<U256, BackendError> {
    let tag = leading_tag(data)?;
    if tag != u64::from(EXIT_EXACT_POOL_TOKEN_IN_FOR_TOKENS_OUT) {
        return Err(BackendError::Reverted(format!("unsupported exit kind {tag}")));
    }
    let (_, amount) = <(U256, U256)>::abi_decode_params(data)
        .map_err(|e| BackendError::Reverted(format!("bad exit data: {e}")))?;
    Ok(amount)
}

fn leading_tag(data: &[u8]) -> Result<u64, BackendError> {
    if data.len() < 32 {
        return Err(BackendError::Reverted("user data too short".to_string()));
    }
    let tag = U256::from_be_slice(&data[..32]);
    u64::try_from(tag).map_err(|_| BackendError::Reverted("user data tag out of range".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fee_to_u24() {
        assert_eq!(fee_to_u24(3000).to::<u32>(), 3000);
        assert_eq!(fee_to_u24(10000).to::<u32>(), 10000);
    }

    #[test]
    fn test_init_and_proportional_join_tags_differ() {
        let amounts = vec![U256::from(10u64), U256::from(20u64)];
        let init = encode_join_data(JoinKind::Init, &amounts, U256::ZERO);
        let prop = encode_join_data(JoinKind::ExactTokensInForPoolTokenOut, &amounts, U256::ZERO);

        assert_eq!(U256::from_be_slice(&init[..32]), U256::ZERO);
        assert_eq!(U256::from_be_slice(&prop[..32]), U256::from(1u64));

        let decoded = decode_join_data(&init).unwrap();
        assert_eq!(decoded.kind, JoinKind::Init);
        assert_eq!(decoded.amounts_in, amounts);

        let decoded = decode_join_data(&prop).unwrap();
        assert_eq!(decoded.kind, JoinKind::ExactTokensInForPoolTokenOut);
        assert_eq!(decoded.min_pool_token_out, U256::ZERO);
    }

    #[test]
    fn test_exit_data() {
        let data = encode_exit_data(U256::from(777u64));
        assert_eq!(decode_exit_data(&data).unwrap(), U256::from(777u64));
        assert!(decode_exit_data(&[0u8; 4]).is_err());
    }

    #[test]
    fn test_unknown_join_kind_rejected() {
        let data = (U256::from(9u64), vec![U256::ZERO]).abi_encode_params();
        assert!(matches!(decode_join_data(&data), Err(BackendError::Reverted(_))));
    }
}
