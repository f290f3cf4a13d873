//! Core data structures
//!
//! Backend selectors, swap directions, vault generations and the
//! underlying-asset entries that make up a fund's basket.

use alloy::primitives::{Address, U256};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Per-asset exchange choice, as stored in configuration.
///
/// The selector is mutable after deployment (authorized actor only) and is
/// always keyed by the non-native asset of a swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendSelector {
    #[default]
    Unset,
    PairwiseGen1,
    PairwiseGen2TierA,
    PairwiseGen2TierB,
}

impl BackendSelector {
    /// Returns true if this selector routes through the generation-2 exchange
    pub fn is_gen2(&self) -> bool {
        matches!(self, BackendSelector::PairwiseGen2TierA | BackendSelector::PairwiseGen2TierB)
    }

    /// Resolve to a concrete swap backend, or None when unset.
    pub fn backend(&self, tiers: &FeeTiers) -> Option<SwapBackend> {
        match self {
            BackendSelector::Unset => None,
            BackendSelector::PairwiseGen1 => Some(SwapBackend::PairwiseGen1),
            BackendSelector::PairwiseGen2TierA => Some(SwapBackend::PairwiseGen2 { fee_tier: tiers.tier_a }),
            BackendSelector::PairwiseGen2TierB => Some(SwapBackend::PairwiseGen2 { fee_tier: tiers.tier_b }),
        }
    }
}

impl fmt::Display for BackendSelector {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BackendSelector::Unset => write!(f, "Unset"),
            BackendSelector::PairwiseGen1 => write!(f, "PairwiseGen1"),
            BackendSelector::PairwiseGen2TierA => write!(f, "PairwiseGen2_TierA"),
            BackendSelector::PairwiseGen2TierB => write!(f, "PairwiseGen2_TierB"),
        }
    }
}

/// Swap backend a leg is dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SwapBackend {
    /// Per-pair constant-product exchange, path-based entry points
    PairwiseGen1,
    /// Tick-priced exchange; `fee_tier` in millionths (3000 = 0.30%)
    PairwiseGen2 { fee_tier: u32 },
}

impl fmt::Display for SwapBackend {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SwapBackend::PairwiseGen1 => write!(f, "gen1"),
            SwapBackend::PairwiseGen2 { fee_tier } => {
                write!(f, "gen2_{:.2}%", *fee_tier as f64 / 10000.0)
            }
        }
    }
}

/// The two generation-2 fee tiers a selector can name (millionths).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeTiers {
    pub tier_a: u32,
    pub tier_b: u32,
}

impl Default for FeeTiers {
    fn default() -> Self {
        Self {
            tier_a: 3000,
            tier_b: 10000,
        }
    }
}

/// Which side of a swap carries the native currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SwapDirection {
    /// Spend native currency, acquire an asset (mint leg)
    NativeIn,
    /// Spend an asset, acquire wrapped native (redeem leg)
    NativeOut,
}

/// Pooled-liquidity vault calling convention. Fixed per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VaultGeneration {
    /// Pool-id addressed vault; join/exit encode a kind tag in user data and report nothing
    A,
    /// Pool-address addressed vault; unbalanced add / proportional remove report amounts
    B,
}

impl fmt::Display for VaultGeneration {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            VaultGeneration::A => write!(f, "vault-A"),
            VaultGeneration::B => write!(f, "vault-B"),
        }
    }
}

/// How a depositor's position in the pool is represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountingMode {
    /// The pool token itself is handed to the depositor
    DirectToken,
    /// The fund keeps the pool token and tracks proportional shares
    #[default]
    Ledger,
}

/// Minimum-output policy for the redemption-leg swaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedemptionFloor {
    /// No floor: redemption always succeeds whatever the price (back-running exposure)
    #[default]
    Zero,
    /// Same quote-minus-slippage floor the mint leg uses
    Quoted,
}

impl fmt::Display for RedemptionFloor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RedemptionFloor::Zero => write!(f, "zero"),
            RedemptionFloor::Quoted => write!(f, "quoted"),
        }
    }
}

/// One basket constituent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnderlyingAsset {
    pub token: Address,
    pub symbol: String,
    #[serde(default = "default_decimals")]
    pub decimals: u8,
    /// Initial backend selector (live value lives in the fund settings)
    #[serde(default)]
    pub selector: BackendSelector,
    /// Target weight in bps. Informational: mint always splits evenly.
    #[serde(default)]
    pub weight_bps: u32,
}

fn default_decimals() -> u8 { 18 }

impl UnderlyingAsset {
    pub fn new(token: Address, symbol: &str, selector: BackendSelector) -> Self {
        Self {
            token,
            symbol: symbol.to_string(),
            decimals: 18,
            selector,
            weight_bps: 0,
        }
    }

    pub fn with_weight(mut self, weight_bps: u32) -> Self {
        self.weight_bps = weight_bps;
        self
    }

    pub fn with_decimals(mut self, decimals: u8) -> Self {
        self.decimals = decimals;
        self
    }
}

/// Convert a raw token amount to human units.
///
/// Amounts beyond Decimal's 96-bit mantissa are clamped to Decimal::MAX.
pub fn format_units(amount: U256, decimals: u8) -> Decimal {
    let raw = match Decimal::from_str(&amount.to_string()) {
        Ok(d) => d,
        Err(_) => return Decimal::MAX,
    };
    let mut scaled = raw;
    // Decimal scale tops out at 28
    let scale = u32::from(decimals).min(28);
    if scaled.set_scale(scale).is_err() {
        return raw;
    }
    scaled.normalize()
}

/// Convert human units to a raw token amount, truncating extra precision.
///
/// None for negative amounts or amounts beyond U256.
pub fn parse_units(amount: Decimal, decimals: u8) -> Option<U256> {
    let mantissa = u128::try_from(amount.mantissa()).ok()?;
    let ten = U256::from(10u8);
    let scaled = U256::from(mantissa).checked_mul(ten.checked_pow(U256::from(decimals))?)?;
    Some(scaled / ten.pow(U256::from(amount.scale())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_selector_resolves_fee_tiers() {
        let tiers = FeeTiers::default();
        assert_eq!(BackendSelector::Unset.backend(&tiers), None);
        assert_eq!(
            BackendSelector::PairwiseGen1.backend(&tiers),
            Some(SwapBackend::PairwiseGen1)
        );
        assert_eq!(
            BackendSelector::PairwiseGen2TierA.backend(&tiers),
            Some(SwapBackend::PairwiseGen2 { fee_tier: 3000 })
        );
        assert_eq!(
            BackendSelector::PairwiseGen2TierB.backend(&tiers),
            Some(SwapBackend::PairwiseGen2 { fee_tier: 10000 })
        );
        assert!(BackendSelector::PairwiseGen2TierB.is_gen2());
        assert!(!BackendSelector::PairwiseGen1.is_gen2());
    }

    #[test]
    fn test_selector_serde_names() {
        #[derive(Deserialize)]
        struct Wrapper {
            selector: BackendSelector,
        }
        let w: Wrapper = toml::from_str("selector = \"pairwise_gen2_tier_b\"").unwrap();
        assert_eq!(w.selector, BackendSelector::PairwiseGen2TierB);
    }

    #[test]
    fn test_format_units() {
        let one_eth = U256::from(10u64).pow(U256::from(18));
        assert_eq!(format_units(one_eth, 18), dec!(1));
        assert_eq!(format_units(U256::from(1_500_000u64), 6), dec!(1.5));
        assert_eq!(format_units(U256::ZERO, 18), dec!(0));
    }

    #[test]
    fn test_parse_units() {
        let one_eth = U256::from(10u64).pow(U256::from(18));
        assert_eq!(parse_units(dec!(1), 18), Some(one_eth));
        assert_eq!(parse_units(dec!(1.5), 6), Some(U256::from(1_500_000u64)));
        // Precision beyond the token's decimals is dropped
        assert_eq!(parse_units(dec!(0.0000001), 6), Some(U256::ZERO));
        assert_eq!(parse_units(dec!(-1), 18), None);
    }

    #[test]
    fn test_backend_display() {
        assert_eq!(SwapBackend::PairwiseGen2 { fee_tier: 500 }.to_string(), "gen2_0.05%");
        assert_eq!(SwapBackend::PairwiseGen1.to_string(), "gen1");
    }
}
