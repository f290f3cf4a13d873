//! Swap Router
//!
//! Executes one swap leg against the backend its selector names.
//! Gen1: swapExactIn along a direct two-token path with a short deadline
//! Gen2: exactInputSingle at the selector's fee tier
//!
//! The realized output is always the amount the backend reports; a quote is
//! only ever used to derive the minimum-output floor.

use alloy::primitives::{aliases::U160, Address, U256};
use std::sync::Arc;
use tracing::{debug, info};

use crate::contracts::{fee_to_u24, ExactInputSingleParams};
use crate::error::{BackendError, FundError, Result};
use crate::interfaces::{ChainContext, PairwiseGen1Exchange, PairwiseGen2Exchange, TokenLedger};
use crate::routing::approval::ensure_approval;
use crate::types::{SwapBackend, SwapDirection};

/// Gen1 deadline: current block time + 5 minutes
pub const DEADLINE_SECS: u64 = 300;

/// One swap to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapLeg {
    pub token_in: Address,
    pub token_out: Address,
    pub amount_in: U256,
    pub min_amount_out: U256,
    pub direction: SwapDirection,
}

impl SwapLeg {
    /// The non-native side of the pair; the key the backend selector is looked up by.
    pub fn selector_key(&self) -> Address {
        match self.direction {
            SwapDirection::NativeIn => self.token_out,
            SwapDirection::NativeOut => self.token_in,
        }
    }
}

/// Backend dispatch plus allowance bookkeeping for the fund's swaps.
#[derive(Clone)]
pub struct SwapRouter {
    /// Address swaps are sent from and paid to
    account: Address,
    native: Address,
    tokens: Arc<dyn TokenLedger>,
    chain: Arc<dyn ChainContext>,
    gen1: Option<Arc<dyn PairwiseGen1Exchange>>,
    gen2: Option<Arc<dyn PairwiseGen2Exchange>>,
}

impl SwapRouter {
    pub fn new(
        account: Address,
        native: Address,
        tokens: Arc<dyn TokenLedger>,
        chain: Arc<dyn ChainContext>,
        gen1: Option<Arc<dyn PairwiseGen1Exchange>>,
        gen2: Option<Arc<dyn PairwiseGen2Exchange>>,
    ) -> Self {
        Self {
            account,
            native,
            tokens,
            chain,
            gen1,
            gen2,
        }
    }

    /// Execute a swap leg on `backend`; returns the amount the backend reports.
    pub async fn swap(&self, leg: SwapLeg, backend: SwapBackend) -> Result<U256> {
        if leg.amount_in.is_zero() {
            return Err(FundError::ZeroAmount("swap amount"));
        }

        let amount_out = match backend {
            SwapBackend::PairwiseGen1 => self.swap_gen1(&leg).await?,
            SwapBackend::PairwiseGen2 { fee_tier } => self.swap_gen2(&leg, fee_tier).await?,
        };

        info!(
            "Swap on {}: {} {} -> {} {} (min {})",
            backend, leg.amount_in, leg.token_in, amount_out, leg.token_out, leg.min_amount_out
        );
        Ok(amount_out)
    }

    /// Gen1 swap. The protocol only takes raw native as input when the path
    /// starts at the wrapped native token, so the native asset must sit on
    /// the side the direction names.
    async fn swap_gen1(&self, leg: &SwapLeg) -> Result<U256> {
        let exchange = self
            .gen1
            .as_ref()
            .ok_or_else(|| FundError::BackendUnavailable("gen1".to_string()))?;

        let value = match leg.direction {
            SwapDirection::NativeIn => {
                if leg.token_in != self.native {
                    return Err(unexpected_side("gen1", "input", leg));
                }
                leg.amount_in
            }
            SwapDirection::NativeOut => {
                if leg.token_out != self.native {
                    return Err(unexpected_side("gen1", "output", leg));
                }
                ensure_approval(
                    self.tokens.as_ref(),
                    leg.token_in,
                    self.account,
                    exchange.address(),
                    leg.amount_in,
                )
                .await?;
                U256::ZERO
            }
        };

        let path = [leg.token_in, leg.token_out];
        let deadline = self.chain.block_timestamp() + DEADLINE_SECS;

        debug!(
            "Gen1 swap: {} {} -> {} | min out {} | deadline {}",
            leg.amount_in, leg.token_in, leg.token_out, leg.min_amount_out, deadline
        );

        let amounts = exchange
            .swap_exact_in(
                self.account,
                value,
                &path,
                leg.amount_in,
                leg.min_amount_out,
                self.account,
                deadline,
            )
            .await?;

        amounts
            .last()
            .copied()
            .ok_or_else(|| FundError::Backend(BackendError::InvalidPath("empty amounts".to_string())))
    }

    /// Gen2 swap. Native value is attached only on native-in legs; otherwise
    /// the router pulls `token_in` under a standing approval.
    async fn swap_gen2(&self, leg: &SwapLeg, fee_tier: u32) -> Result<U256> {
        let exchange = self
            .gen2
            .as_ref()
            .ok_or_else(|| FundError::BackendUnavailable("gen2".to_string()))?;

        ensure_approval(
            self.tokens.as_ref(),
            leg.token_in,
            self.account,
            exchange.address(),
            leg.amount_in,
        )
        .await?;

        let value = match leg.direction {
            SwapDirection::NativeIn => leg.amount_in,
            SwapDirection::NativeOut => U256::ZERO,
        };

        // sqrtPriceLimitX96 = 0 means no price limit (the floor is amountOutMinimum)
        let params = ExactInputSingleParams {
            tokenIn: leg.token_in,
            tokenOut: leg.token_out,
            fee: fee_to_u24(fee_tier),
            recipient: self.account,
            amountIn: leg.amount_in,
            amountOutMinimum: leg.min_amount_out,
            sqrtPriceLimitX96: U160::ZERO,
        };

        debug!(
            "Gen2 swap: {} {} -> {} (fee tier {}) | min out {}",
            leg.amount_in, leg.token_in, leg.token_out, fee_tier, leg.min_amount_out
        );

        Ok(exchange.exact_input_single(self.account, value, params).await?)
    }
}

fn unexpected_side(backend: &'static str, expected_side: &'static str, leg: &SwapLeg) -> FundError {
    FundError::UnexpectedAssetSide {
        backend,
        expected_side,
        token_in: leg.token_in,
        token_out: leg.token_out,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::MarketBuilder;

    fn leg(token_in: Address, token_out: Address, direction: SwapDirection) -> SwapLeg {
        SwapLeg {
            token_in,
            token_out,
            amount_in: U256::from(1_000_000u64),
            min_amount_out: U256::ZERO,
            direction,
        }
    }

    #[test]
    fn test_selector_key_is_non_native_side() {
        let weth = Address::repeat_byte(0x10);
        let asset = Address::repeat_byte(0x20);
        assert_eq!(leg(weth, asset, SwapDirection::NativeIn).selector_key(), asset);
        assert_eq!(leg(asset, weth, SwapDirection::NativeOut).selector_key(), asset);
    }

    #[tokio::test]
    async fn test_gen1_rejects_native_on_wrong_side() {
        let market = MarketBuilder::standard().build();
        let fund = Address::repeat_byte(0xF0);
        let router = market.router_for(fund);

        // Native-in leg whose input is not the native asset
        let err = router
            .swap(leg(market.token("AAA"), market.weth(), SwapDirection::NativeIn), SwapBackend::PairwiseGen1)
            .await
            .unwrap_err();
        assert!(matches!(err, FundError::UnexpectedAssetSide { expected_side: "input", .. }));

        // Native-out leg whose output is not the native asset
        let err = router
            .swap(leg(market.weth(), market.token("AAA"), SwapDirection::NativeOut), SwapBackend::PairwiseGen1)
            .await
            .unwrap_err();
        assert!(matches!(err, FundError::UnexpectedAssetSide { expected_side: "output", .. }));
    }

    #[tokio::test]
    async fn test_gen2_approves_once_then_reuses() {
        let market = MarketBuilder::standard().build();
        let fund = Address::repeat_byte(0xF0);
        let bbb = market.token("BBB");
        market.chain.mint_token(bbb, fund, U256::from(10u64).pow(U256::from(21)));
        let router = market.router_for(fund);
        let spender = market.gen2_address();

        assert_eq!(market.chain.allowance_of(bbb, fund, spender), U256::ZERO);

        let out = router
            .swap(leg(bbb, market.weth(), SwapDirection::NativeOut), SwapBackend::PairwiseGen2 { fee_tier: 3000 })
            .await
            .unwrap();
        assert!(out > U256::ZERO);

        // Unlimited approval granted, then drawn down by the swap
        let after_first = market.chain.allowance_of(bbb, fund, spender);
        assert_eq!(after_first, U256::MAX - U256::from(1_000_000u64));

        router
            .swap(leg(bbb, market.weth(), SwapDirection::NativeOut), SwapBackend::PairwiseGen2 { fee_tier: 3000 })
            .await
            .unwrap();
        // No re-approval: allowance keeps decreasing from the first grant
        assert_eq!(
            market.chain.allowance_of(bbb, fund, spender),
            after_first - U256::from(1_000_000u64)
        );
    }

    #[tokio::test]
    async fn test_gen1_reports_backend_amount() {
        let market = MarketBuilder::standard().build();
        let fund = Address::repeat_byte(0xF0);
        market.chain.set_native_balance(fund, U256::from(10u64).pow(U256::from(18)));
        let router = market.router_for(fund);

        let aaa = market.token("AAA");
        let expected = market
            .gen1()
            .get_amounts_out(U256::from(1_000_000u64), &[market.weth(), aaa])
            .await
            .unwrap();
        let out = router
            .swap(leg(market.weth(), aaa, SwapDirection::NativeIn), SwapBackend::PairwiseGen1)
            .await
            .unwrap();
        assert_eq!(out, expected[1]);
        assert_eq!(market.chain.balance(aaa, fund), out);
    }

    #[tokio::test]
    async fn test_floor_violation_is_slippage_error() {
        let market = MarketBuilder::standard().build();
        let fund = Address::repeat_byte(0xF0);
        market.chain.set_native_balance(fund, U256::from(10u64).pow(U256::from(18)));
        let router = market.router_for(fund);

        let mut l = leg(market.weth(), market.token("AAA"), SwapDirection::NativeIn);
        l.min_amount_out = U256::MAX;
        let err = router.swap(l, SwapBackend::PairwiseGen1).await.unwrap_err();
        assert!(matches!(err, FundError::SlippageViolation { .. }));
    }
}
