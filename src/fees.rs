//! Fee and slippage arithmetic
//!
//! Protocol fee on deposits and withdrawals, and the minimum-output floor
//! applied to quoted swaps. Pure functions; moving the fee is the caller's job.

use alloy::primitives::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{FundError, Result};

/// 100% in basis points
pub const BPS_DENOMINATOR: u32 = 10_000;

/// Default protocol fee: 0.5%
pub const DEFAULT_FEE_RATE_BPS: u32 = 50;

/// Default mint-leg slippage tolerance: 20%
pub const DEFAULT_SLIPPAGE_BPS: u32 = 2_000;

/// A percentage in basis points, always within `0..=10_000`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct BasisPoints(u32);

impl BasisPoints {
    pub const ZERO: Self = Self(0);
    pub const MAX: Self = Self(BPS_DENOMINATOR);

    /// Validated constructor.
    pub fn new(value: u32) -> Result<Self> {
        if value > BPS_DENOMINATOR {
            return Err(FundError::InvalidBasisPoints(value));
        }
        Ok(Self(value))
    }

    pub const fn get(&self) -> u32 {
        self.0
    }

    /// `amount * self / 10_000`, rounded down.
    pub fn apply(&self, amount: U256) -> U256 {
        // Split to stay exact without overflowing near U256::MAX
        let denom = U256::from(BPS_DENOMINATOR);
        let bps = U256::from(self.0);
        let (q, r) = (amount / denom, amount % denom);
        q * bps + (r * bps) / denom
    }

    /// The complement `10_000 - self`.
    pub fn complement(&self) -> Self {
        Self(BPS_DENOMINATOR - self.0)
    }

    /// Percentage for display (50 bp -> 0.5)
    pub fn as_percent(&self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl TryFrom<u32> for BasisPoints {
    type Error = FundError;

    fn try_from(value: u32) -> Result<Self> {
        Self::new(value)
    }
}

impl From<BasisPoints> for u32 {
    fn from(bps: BasisPoints) -> Self {
        bps.0
    }
}

impl fmt::Display for BasisPoints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}bp", self.0)
    }
}

/// Result of skimming the protocol fee off an amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeeSplit {
    pub net: U256,
    pub fee: U256,
}

/// Protocol fee calculator. Same rate for deposits and withdrawals.
pub struct FeeEngine;

impl FeeEngine {
    /// `fee = floor(amount * rate / 10_000)`, `net = amount - fee`.
    pub fn take(amount: U256, rate: BasisPoints) -> FeeSplit {
        let fee = rate.apply(amount);
        FeeSplit {
            net: amount - fee,
            fee,
        }
    }
}

/// Lowest acceptable output for a quoted swap:
/// `floor(quoted * (10_000 - tolerance) / 10_000)`.
pub fn min_amount_out(quoted: U256, tolerance: BasisPoints) -> U256 {
    tolerance.complement().apply(quoted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eth(n: u64) -> U256 {
        U256::from(n) * U256::from(10u64).pow(U256::from(18))
    }

    #[test]
    fn test_fee_exactness_default_rate() {
        let rate = BasisPoints::new(DEFAULT_FEE_RATE_BPS).unwrap();
        let split = FeeEngine::take(eth(1), rate);
        // 1e18 * 50 / 10000 = 5e15
        assert_eq!(split.fee, U256::from(5_000_000_000_000_000u64));
        assert_eq!(split.net + split.fee, eth(1));
    }

    #[test]
    fn test_fee_floors() {
        let rate = BasisPoints::new(50).unwrap();
        // 199 * 50 / 10000 = 0.995 -> 0
        assert_eq!(FeeEngine::take(U256::from(199u64), rate).fee, U256::ZERO);
        // 200 * 50 / 10000 = 1
        assert_eq!(FeeEngine::take(U256::from(200u64), rate).fee, U256::from(1u64));
        // 12345 * 333 / 10000 = 411.0885 -> 411
        let rate = BasisPoints::new(333).unwrap();
        assert_eq!(FeeEngine::take(U256::from(12_345u64), rate).fee, U256::from(411u64));
    }

    #[test]
    fn test_apply_matches_naive_formula() {
        let rate = BasisPoints::new(777).unwrap();
        for raw in [0u64, 1, 9_999, 10_000, 10_001, 123_456_789, u64::MAX] {
            let amount = U256::from(raw);
            let naive = amount * U256::from(777u64) / U256::from(10_000u64);
            assert_eq!(rate.apply(amount), naive, "amount {}", raw);
        }
    }

    #[test]
    fn test_apply_no_overflow_at_max() {
        assert_eq!(BasisPoints::MAX.apply(U256::MAX), U256::MAX);
        assert_eq!(BasisPoints::ZERO.apply(U256::MAX), U256::ZERO);
    }

    #[test]
    fn test_rejects_out_of_range() {
        assert_eq!(BasisPoints::new(10_001), Err(FundError::InvalidBasisPoints(10_001)));
        assert!(BasisPoints::new(10_000).is_ok());
    }

    #[test]
    fn test_min_amount_out() {
        let tolerance = BasisPoints::new(DEFAULT_SLIPPAGE_BPS).unwrap();
        assert_eq!(min_amount_out(U256::from(1000u64), tolerance), U256::from(800u64));
        assert_eq!(min_amount_out(U256::from(1000u64), BasisPoints::ZERO), U256::from(1000u64));
        assert_eq!(min_amount_out(U256::from(1000u64), BasisPoints::MAX), U256::ZERO);
    }

    #[test]
    fn test_serde_validates() {
        #[derive(Deserialize)]
        struct Wrapper {
            rate: BasisPoints,
        }
        let ok: Wrapper = toml::from_str("rate = 50").unwrap();
        assert_eq!(ok.rate.get(), 50);
        assert!(toml::from_str::<Wrapper>("rate = 20000").is_err());
    }
}
