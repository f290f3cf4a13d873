//! Quote Service
//!
//! Expected swap output per backend:
//! - Gen1: the exchange's own path estimator (full execution, price impact included)
//! - Gen2: spot price from the pool's sqrtPriceX96 only. No simulated execution,
//!   so the swap's own impact and the pool fee are ignored. Indicative, not exact.
//!
//! Gen2 quotes always read the pool at the fund's quote fee tier, whichever
//! tier the asset's selector swaps through.

use alloy::primitives::{Address, U256, U512};
use std::sync::Arc;
use tracing::debug;

use crate::error::{BackendError, FundError, Result};
use crate::interfaces::{Gen2Slot0, PairwiseGen1Exchange, PairwiseGen2Exchange};
use crate::types::BackendSelector;

/// Stateless quote lookup across the configured exchanges.
#[derive(Clone)]
pub struct QuoteService {
    native: Address,
    quote_fee_tier: u32,
    gen1: Option<Arc<dyn PairwiseGen1Exchange>>,
    gen2: Option<Arc<dyn PairwiseGen2Exchange>>,
}

impl QuoteService {
    pub fn new(
        native: Address,
        quote_fee_tier: u32,
        gen1: Option<Arc<dyn PairwiseGen1Exchange>>,
        gen2: Option<Arc<dyn PairwiseGen2Exchange>>,
    ) -> Self {
        Self {
            native,
            quote_fee_tier,
            gen1,
            gen2,
        }
    }

    /// Expected output of swapping `amount_in` of `token_in` for `token_out`.
    pub async fn quote(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
        selector: BackendSelector,
    ) -> Result<U256> {
        if token_in == token_out {
            return Ok(amount_in);
        }

        match selector {
            BackendSelector::Unset => {
                let asset = if token_in == self.native { token_out } else { token_in };
                Err(FundError::BackendUnset(asset))
            }
            BackendSelector::PairwiseGen1 => self.quote_gen1(token_in, token_out, amount_in).await,
            BackendSelector::PairwiseGen2TierA | BackendSelector::PairwiseGen2TierB => {
                self.quote_gen2(token_in, token_out, amount_in).await
            }
        }
    }

    async fn quote_gen1(&self, token_in: Address, token_out: Address, amount_in: U256) -> Result<U256> {
        let exchange = self
            .gen1
            .as_ref()
            .ok_or_else(|| FundError::BackendUnavailable("gen1".to_string()))?;

        let path = [token_in, token_out];
        let amounts = exchange.get_amounts_out(amount_in, &path).await?;
        let out = amounts
            .last()
            .copied()
            .ok_or_else(|| FundError::Backend(BackendError::InvalidPath("empty amounts".to_string())))?;

        debug!("Gen1 quote: {} {} -> {} {}", amount_in, token_in, out, token_out);
        Ok(out)
    }

    async fn quote_gen2(&self, token_in: Address, token_out: Address, amount_in: U256) -> Result<U256> {
        let exchange = self
            .gen2
            .as_ref()
            .ok_or_else(|| FundError::BackendUnavailable("gen2".to_string()))?;

        let pool = exchange
            .get_pool(token_in, token_out, self.quote_fee_tier)
            .await?
            .filter(|p| !p.is_zero())
            .ok_or(FundError::PoolNotFound {
                token_in,
                token_out,
                fee_tier: self.quote_fee_tier,
            })?;

        let slot0 = exchange.slot0(pool).await?;
        let out = spot_amount_out(&slot0, token_in, amount_in)?;

        debug!(
            "Gen2 quote: {} {} -> {} {} (pool {}, tick {})",
            amount_in, token_in, out, token_out, pool, slot0.tick
        );
        Ok(out)
    }
}

/// Output at the pool's current price, ignoring fee and price impact.
///
/// price = sqrtPriceX96² / 2^192 token1 per token0, applied as two
/// `mul_div` steps through the square root.
pub fn spot_amount_out(slot0: &Gen2Slot0, token_in: Address, amount_in: U256) -> Result<U256> {
    let overflow = || FundError::Backend(BackendError::Overflow("spot quote"));
    let sqrt_price = slot0.sqrt_price_x96;
    if sqrt_price.is_zero() {
        return Err(FundError::Backend(BackendError::Reverted("pool price is zero".to_string())));
    }
    let q96: U256 = U256::from(1u8) << 96usize;

    if token_in == slot0.token0 {
        let half = mul_div(amount_in, sqrt_price, q96).ok_or_else(overflow)?;
        mul_div(half, sqrt_price, q96).ok_or_else(overflow)
    } else if token_in == slot0.token1 {
        let half = mul_div(amount_in, q96, sqrt_price).ok_or_else(overflow)?;
        mul_div(half, q96, sqrt_price).ok_or_else(overflow)
    } else {
        Err(FundError::Backend(BackendError::InvalidPath(format!(
            "{} is not in pool {}/{}",
            token_in, slot0.token0, slot0.token1
        ))))
    }
}

/// floor(a * b / denominator) with a 512-bit product. None on a zero
/// denominator or a result wider than 256 bits.
pub fn mul_div(a: U256, b: U256, denominator: U256) -> Option<U256> {
    if denominator.is_zero() {
        return None;
    }
    let product = widen(a).checked_mul(widen(b))?;
    narrow(product / widen(denominator))
}

fn widen(value: U256) -> U512 {
    let mut limbs = [0u64; 8];
    limbs[..4].copy_from_slice(value.as_limbs());
    U512::from_limbs(limbs)
}

fn narrow(value: U512) -> Option<U256> {
    let limbs = value.as_limbs();
    if limbs[4..].iter().any(|&limb| limb != 0) {
        return None;
    }
    Some(U256::from_limbs([limbs[0], limbs[1], limbs[2], limbs[3]]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use crate::sim::market::MarketBuilder;

    fn slot(price_num: u64) -> Gen2Slot0 {
        // sqrt(price) * 2^96 for a perfect-square price
        let root = (price_num as f64).sqrt() as u64;
        Gen2Slot0 {
            sqrt_price_x96: U256::from(root) << 96,
            tick: 0,
            token0: Address::repeat_byte(0x01),
            token1: Address::repeat_byte(0x02),
        }
    }

    #[test]
    fn test_spot_quote_token0_in() {
        let s = slot(2500); // 2500 token1 per token0
        let out = spot_amount_out(&s, s.token0, U256::from(1_000u64)).unwrap();
        assert_eq!(out, U256::from(2_500_000u64));
    }

    #[test]
    fn test_spot_quote_token1_in() {
        let s = slot(2500);
        let out = spot_amount_out(&s, s.token1, U256::from(2_500_000u64)).unwrap();
        assert_eq!(out, U256::from(1_000u64));
    }

    #[test]
    fn test_spot_quote_foreign_token() {
        let s = slot(4);
        assert!(spot_amount_out(&s, Address::repeat_byte(0x09), U256::from(1u64)).is_err());
    }

    fn slot_at(sqrt_price_x96: U256) -> Gen2Slot0 {
        Gen2Slot0 {
            sqrt_price_x96,
            tick: 0,
            token0: Address::repeat_byte(0x01),
            token1: Address::repeat_byte(0x02),
        }
    }

    fn pow10(exp: u64) -> U256 {
        U256::from(10u64).pow(U256::from(exp))
    }

    #[test]
    fn test_spot_quote_above_two_pow_64() {
        // 8-decimal token0 against a cheap 18-decimal token1: price 1e22
        let s = slot_at(pow10(11) << 96usize);
        assert_eq!(spot_amount_out(&s, s.token0, pow10(8)).unwrap(), pow10(30));
        assert_eq!(spot_amount_out(&s, s.token1, pow10(30)).unwrap(), pow10(8));
    }

    #[test]
    fn test_spot_quote_below_two_pow_minus_96() {
        // price 1e-30 token1 per token0
        let q96: U256 = U256::from(1u8) << 96usize;
        let s = slot_at(q96 / pow10(15));

        let out = spot_amount_out(&s, s.token1, U256::from(1u8)).unwrap();
        assert_eq!(out / pow10(26), U256::from(10_000u64));

        let out = spot_amount_out(&s, s.token0, pow10(33)).unwrap();
        assert_eq!(out, U256::from(999u64));
    }

    #[test]
    fn test_zero_sqrt_price_is_rejected() {
        let s = slot_at(U256::ZERO);
        assert!(spot_amount_out(&s, s.token0, U256::from(1u8)).is_err());
    }

    #[test]
    fn test_mul_div_keeps_wide_intermediate() {
        assert_eq!(mul_div(U256::MAX, U256::from(2u8), U256::from(4u8)), Some(U256::MAX >> 1usize));
        assert_eq!(mul_div(U256::MAX, U256::from(2u8), U256::from(1u8)), None);
        assert_eq!(mul_div(U256::from(1u8), U256::from(1u8), U256::ZERO), None);
    }

    #[tokio::test]
    async fn test_missing_pool_at_quote_tier_is_configuration_error() {
        let market = MarketBuilder::standard().build();
        let weth = market.weth();
        let asset = market.token("AAA");
        // Pools exist at 3000 only
        let service = QuoteService::new(weth, 500, None, Some(market.gen2()));

        let err = service
            .quote(weth, asset, U256::from(1_000u64), BackendSelector::PairwiseGen2TierA)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            FundError::PoolNotFound {
                token_in: weth,
                token_out: asset,
                fee_tier: 500,
            }
        );
        assert_eq!(err.category(), ErrorCategory::Configuration);
    }

    #[tokio::test]
    async fn test_unset_selector_names_the_asset() {
        let native = Address::repeat_byte(0x10);
        let asset = Address::repeat_byte(0x20);
        let service = QuoteService::new(native, 3000, None, None);

        let err = service
            .quote(native, asset, U256::from(1u64), BackendSelector::Unset)
            .await
            .unwrap_err();
        assert_eq!(err, FundError::BackendUnset(asset));
    }

    #[tokio::test]
    async fn test_missing_backend_is_configuration_error() {
        let native = Address::repeat_byte(0x10);
        let service = QuoteService::new(native, 3000, None, None);
        let err = service
            .quote(native, Address::repeat_byte(0x20), U256::from(1u64), BackendSelector::PairwiseGen1)
            .await
            .unwrap_err();
        assert!(matches!(err, FundError::BackendUnavailable(_)));
    }

    #[tokio::test]
    async fn test_same_token_quotes_identity() {
        let native = Address::repeat_byte(0x10);
        let service = QuoteService::new(native, 3000, None, None);
        let out = service
            .quote(native, native, U256::from(42u64), BackendSelector::Unset)
            .await
            .unwrap();
        assert_eq!(out, U256::from(42u64));
    }
}
