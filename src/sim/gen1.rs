//! Generation-1 pairwise exchange (constant product)
//!
//! Each pair holds its reserves as ordinary token balances at the pair
//! address. Output follows the x*y=k rule with a 0.30% input fee:
//!
//! amountOut = (amountIn * 997 * reserveOut) / (reserveIn * 1000 + amountIn * 997)

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::{ChainState, SimChain};
use crate::error::BackendError;
use crate::interfaces::{BackendResult, ChainContext, PairwiseGen1Exchange};

/// V2 fee factor: 997/1000 = 0.30% fee
const FEE_NUMERATOR: u64 = 997;
const FEE_DENOMINATOR: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gen1Pair {
    pub address: Address,
    pub token0: Address,
    pub token1: Address,
}

/// Sorted pair key
pub(crate) fn pair_key(a: Address, b: Address) -> (Address, Address) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Constant-product output for `amount_in` against the given reserves.
pub fn amount_out(amount_in: U256, reserve_in: U256, reserve_out: U256) -> BackendResult<U256> {
    if amount_in.is_zero() {
        return Err(BackendError::Reverted("insufficient input amount".to_string()));
    }
    if reserve_in.is_zero() || reserve_out.is_zero() {
        return Err(BackendError::Reverted("insufficient liquidity".to_string()));
    }

    let amount_in_with_fee = amount_in
        .checked_mul(U256::from(FEE_NUMERATOR))
        .ok_or(BackendError::Overflow("gen1 input"))?;
    let numerator = amount_in_with_fee
        .checked_mul(reserve_out)
        .ok_or(BackendError::Overflow("gen1 numerator"))?;
    let denominator = reserve_in
        .checked_mul(U256::from(FEE_DENOMINATOR))
        .and_then(|d| d.checked_add(amount_in_with_fee))
        .ok_or(BackendError::Overflow("gen1 denominator"))?;

    Ok(numerator / denominator)
}

impl ChainState {
    fn gen1_pair(&self, token_in: Address, token_out: Address) -> BackendResult<Gen1Pair> {
        self.gen1_pairs
            .get(&pair_key(token_in, token_out))
            .cloned()
            .ok_or_else(|| BackendError::UnknownPool(format!("gen1 {}/{}", token_in, token_out)))
    }

    fn gen1_quote(&self, amount_in: U256, path: &[Address]) -> BackendResult<(Gen1Pair, U256)> {
        let [token_in, token_out] = path else {
            return Err(BackendError::InvalidPath(format!("expected 2 hops, got {}", path.len())));
        };
        let pair = self.gen1_pair(*token_in, *token_out)?;
        let reserve_in = self.balance(*token_in, pair.address);
        let reserve_out = self.balance(*token_out, pair.address);
        let out = amount_out(amount_in, reserve_in, reserve_out)?;
        Ok((pair, out))
    }
}

/// Router facade over the chain's generation-1 pairs.
pub struct SimGen1Exchange {
    address: Address,
    chain: Arc<SimChain>,
}

impl SimGen1Exchange {
    pub fn new(address: Address, chain: Arc<SimChain>) -> Self {
        Self { address, chain }
    }

    /// Register a pair and seed its reserves.
    pub fn create_pair(&self, pair: Address, token_a: Address, token_b: Address, reserve_a: U256, reserve_b: U256) {
        let (token0, token1) = pair_key(token_a, token_b);
        let _ = self.chain.transact(|s| {
            s.gen1_pairs.insert(
                (token0, token1),
                Gen1Pair {
                    address: pair,
                    token0,
                    token1,
                },
            );
            s.mint(token_a, pair, reserve_a)?;
            s.mint(token_b, pair, reserve_b)
        });
    }

    /// Current reserves of the pair, in argument order
    pub fn reserves(&self, token_a: Address, token_b: Address) -> Option<(U256, U256)> {
        self.chain.read(|s| {
            let pair = s.gen1_pairs.get(&pair_key(token_a, token_b))?;
            Some((s.balance(token_a, pair.address), s.balance(token_b, pair.address)))
        })
    }
}

#[async_trait]
impl PairwiseGen1Exchange for SimGen1Exchange {
    fn address(&self) -> Address {
        self.address
    }

    async fn get_amounts_out(&self, amount_in: U256, path: &[Address]) -> BackendResult<Vec<U256>> {
        let (_, out) = self.chain.read(|s| s.gen1_quote(amount_in, path))?;
        Ok(vec![amount_in, out])
    }

    async fn swap_exact_in(
        &self,
        sender: Address,
        value: U256,
        path: &[Address],
        amount_in: U256,
        min_amount_out: U256,
        recipient: Address,
        deadline: u64,
    ) -> BackendResult<Vec<U256>> {
        let now = self.chain.block_timestamp();
        if deadline < now {
            return Err(BackendError::Expired { deadline, now });
        }

        let weth = self.chain.weth();
        let router = self.address;
        let out = self.chain.transact(|s| {
            let (pair, out) = s.gen1_quote(amount_in, path)?;
            if out < min_amount_out {
                return Err(BackendError::InsufficientOutput {
                    minimum: min_amount_out,
                    actual: out,
                });
            }

            if value.is_zero() {
                s.transfer_from(path[0], router, sender, pair.address, amount_in)?;
            } else {
                if path[0] != weth || value != amount_in {
                    return Err(BackendError::InvalidPath(
                        "native input requires the wrapped token first and value == amountIn".to_string(),
                    ));
                }
                s.wrap_into(weth, sender, pair.address, amount_in)?;
            }

            s.transfer(path[1], pair.address, recipient, out)?;
            Ok(out)
        })?;

        debug!("Gen1 pair swap {} {} -> {} {}", amount_in, path[0], out, path[1]);
        Ok(vec![amount_in, out])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_v2_math_basic() {
        // 1000/1000 reserves, 10 in: 10*997*1000 / (1000*1000 + 9970) = 9.87 -> 9
        let out = amount_out(U256::from(10u64), U256::from(1000u64), U256::from(1000u64)).unwrap();
        assert_eq!(out, U256::from(9u64));
    }

    #[test]
    fn test_v2_price_impact_grows() {
        let r = U256::from(1_000_000u64);
        let small = amount_out(U256::from(1_000u64), r, r).unwrap();
        let large = amount_out(U256::from(100_000u64), r, r).unwrap();
        // Large trade gets a worse average rate
        assert!(large * U256::from(1_000u64) < small * U256::from(100_000u64));
    }

    #[test]
    fn test_empty_reserves_revert() {
        assert!(amount_out(U256::from(1u64), U256::ZERO, U256::from(1u64)).is_err());
    }

    #[tokio::test]
    async fn test_expired_deadline() {
        let weth = Address::repeat_byte(0x10);
        let chain = Arc::new(SimChain::new(weth, 1_000));
        let exchange = SimGen1Exchange::new(Address::repeat_byte(0xE1), chain.clone());
        let err = exchange
            .swap_exact_in(
                Address::repeat_byte(1),
                U256::ZERO,
                &[weth, Address::repeat_byte(0x20)],
                U256::from(1u64),
                U256::ZERO,
                Address::repeat_byte(1),
                999,
            )
            .await
            .unwrap_err();
        assert_eq!(err, BackendError::Expired { deadline: 999, now: 1_000 });
    }

    #[tokio::test]
    async fn test_native_in_swap_moves_reserves() {
        let weth = Address::repeat_byte(0x10);
        let token = Address::repeat_byte(0x20);
        let trader = Address::repeat_byte(1);
        let chain = Arc::new(SimChain::new(weth, 1_000));
        let exchange = SimGen1Exchange::new(Address::repeat_byte(0xE1), chain.clone());
        exchange.create_pair(Address::repeat_byte(0xC1), weth, token, U256::from(1_000_000u64), U256::from(2_000_000u64));
        chain.set_native_balance(trader, U256::from(1_000u64));

        let amounts = exchange
            .swap_exact_in(trader, U256::from(1_000u64), &[weth, token], U256::from(1_000u64), U256::ZERO, trader, 2_000)
            .await
            .unwrap();

        let (r_weth, r_token) = exchange.reserves(weth, token).unwrap();
        assert_eq!(r_weth, U256::from(1_001_000u64));
        assert_eq!(r_token, U256::from(2_000_000u64) - amounts[1]);
        assert_eq!(chain.balance(token, trader), amounts[1]);
        assert_eq!(chain.native_of(trader), U256::ZERO);
    }
}
