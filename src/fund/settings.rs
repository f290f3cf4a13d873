//! Mutable fund settings
//!
//! The only post-deployment state besides the share ledger. Written solely
//! through the controller's authorized setters.

use alloy::primitives::Address;
use serde::Serialize;
use std::collections::HashMap;

use crate::config::FundConfig;
use crate::fees::BasisPoints;
use crate::types::{BackendSelector, RedemptionFloor};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FundSettings {
    pub slippage_tolerance: BasisPoints,
    pub fee_rate: BasisPoints,
    pub redemption_floor: RedemptionFloor,
    selectors: HashMap<Address, BackendSelector>,
}

impl FundSettings {
    pub fn from_config(config: &FundConfig) -> Self {
        Self {
            slippage_tolerance: config.slippage_tolerance,
            fee_rate: config.fee_rate,
            redemption_floor: config.redemption_floor,
            selectors: config.assets.iter().map(|a| (a.token, a.selector)).collect(),
        }
    }

    /// Selector for `asset`; Unset for tokens outside the basket.
    pub fn selector(&self, asset: Address) -> BackendSelector {
        self.selectors.get(&asset).copied().unwrap_or_default()
    }

    /// Replace a selector, returning the previous value.
    pub(crate) fn set_selector(&mut self, asset: Address, selector: BackendSelector) -> BackendSelector {
        self.selectors.insert(asset, selector).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VaultConfig;
    use crate::types::UnderlyingAsset;
    use alloy::primitives::B256;

    #[test]
    fn test_initial_values_from_config() {
        let asset = Address::repeat_byte(0x20);
        let config = FundConfig::new(
            Address::repeat_byte(0xF0),
            Address::repeat_byte(0x10),
            Address::repeat_byte(0xA1),
            Address::repeat_byte(0xFE),
            VaultConfig::generation_a(Address::repeat_byte(0xB1), B256::repeat_byte(1)),
            vec![UnderlyingAsset::new(asset, "AAA", BackendSelector::PairwiseGen1)],
        );

        let mut settings = FundSettings::from_config(&config);
        assert_eq!(settings.fee_rate.get(), 50);
        assert_eq!(settings.selector(asset), BackendSelector::PairwiseGen1);
        assert_eq!(settings.selector(Address::repeat_byte(0x99)), BackendSelector::Unset);

        let old = settings.set_selector(asset, BackendSelector::PairwiseGen2TierA);
        assert_eq!(old, BackendSelector::PairwiseGen1);
        assert_eq!(settings.selector(asset), BackendSelector::PairwiseGen2TierA);
    }
}
