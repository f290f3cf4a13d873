//! Fund configuration
//!
//! Immutable deployment parameters, loaded from TOML. The mutable settings
//! (fee rate, slippage tolerance, selectors, redemption floor) only take
//! their initial values from here; the live values sit in `FundSettings`.

use alloy::primitives::{Address, B256};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::error::FundError;
use crate::fees::{BasisPoints, DEFAULT_FEE_RATE_BPS, DEFAULT_SLIPPAGE_BPS};
use crate::types::{AccountingMode, FeeTiers, RedemptionFloor, UnderlyingAsset, VaultGeneration};

/// Largest fee tier expressible as uint24
const MAX_FEE_TIER: u32 = 0xFF_FFFF;

/// Deployment configuration of one fund.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundConfig {
    /// The fund's own account (holds assets and pool tokens between calls)
    pub address: Address,
    /// Wrapped native token
    pub native: Address,
    /// Actor allowed to change settings
    pub authority: Address,
    pub fee_recipient: Address,
    #[serde(default)]
    pub gen1_exchange: Option<Address>,
    #[serde(default)]
    pub gen2_exchange: Option<Address>,
    pub vault: VaultConfig,
    #[serde(rename = "asset")]
    pub assets: Vec<UnderlyingAsset>,
    #[serde(default)]
    pub fee_tiers: FeeTiers,
    /// Generation-2 tier read by quotes; defaults to tier A
    #[serde(default)]
    pub quote_fee_tier: Option<u32>,
    #[serde(default)]
    pub accounting: AccountingMode,
    #[serde(default = "default_fee_rate")]
    pub fee_rate: BasisPoints,
    #[serde(default = "default_slippage")]
    pub slippage_tolerance: BasisPoints,
    #[serde(default)]
    pub redemption_floor: RedemptionFloor,
}

/// Which vault the fund joins, and how the pool is addressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultConfig {
    pub generation: VaultGeneration,
    pub address: Address,
    /// Generation A only
    #[serde(default)]
    pub pool_id: Option<B256>,
    /// Generation B only
    #[serde(default)]
    pub pool: Option<Address>,
}

fn default_fee_rate() -> BasisPoints {
    BasisPoints::new(DEFAULT_FEE_RATE_BPS).unwrap_or_default()
}

fn default_slippage() -> BasisPoints {
    BasisPoints::new(DEFAULT_SLIPPAGE_BPS).unwrap_or_default()
}

impl VaultConfig {
    pub fn generation_a(address: Address, pool_id: B256) -> Self {
        Self {
            generation: VaultGeneration::A,
            address,
            pool_id: Some(pool_id),
            pool: None,
        }
    }

    pub fn generation_b(address: Address, pool: Address) -> Self {
        Self {
            generation: VaultGeneration::B,
            address,
            pool_id: None,
            pool: Some(pool),
        }
    }
}

impl FundConfig {
    /// Config with default fees, tiers and policies.
    pub fn new(
        address: Address,
        native: Address,
        authority: Address,
        fee_recipient: Address,
        vault: VaultConfig,
        assets: Vec<UnderlyingAsset>,
    ) -> Self {
        Self {
            address,
            native,
            authority,
            fee_recipient,
            gen1_exchange: None,
            gen2_exchange: None,
            vault,
            assets,
            fee_tiers: FeeTiers::default(),
            quote_fee_tier: None,
            accounting: AccountingMode::default(),
            fee_rate: default_fee_rate(),
            slippage_tolerance: default_slippage(),
            redemption_floor: RedemptionFloor::default(),
        }
    }

    /// Load and validate configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = toml::from_str(&content).with_context(|| "Failed to parse TOML configuration")?;
        config.validate().context("Invalid fund configuration")?;

        Ok(config)
    }

    pub fn quote_fee_tier(&self) -> u32 {
        self.quote_fee_tier.unwrap_or(self.fee_tiers.tier_a)
    }

    pub fn asset_tokens(&self) -> Vec<Address> {
        self.assets.iter().map(|a| a.token).collect()
    }

    pub fn asset(&self, token: Address) -> Option<&UnderlyingAsset> {
        self.assets.iter().find(|a| a.token == token)
    }

    /// Sum of the informational weights
    pub fn total_weight_bps(&self) -> u32 {
        self.assets.iter().map(|a| a.weight_bps).sum()
    }

    pub fn validate(&self) -> std::result::Result<(), FundError> {
        if self.assets.is_empty() {
            return Err(FundError::Configuration("no underlying assets".to_string()));
        }

        let mut seen = HashSet::new();
        for asset in &self.assets {
            if asset.token.is_zero() {
                return Err(FundError::Configuration(format!("asset {} has a zero address", asset.symbol)));
            }
            if !seen.insert(asset.token) {
                return Err(FundError::Configuration(format!("duplicate asset {}", asset.token)));
            }
            BasisPoints::new(asset.weight_bps)?;
        }
        if self.total_weight_bps() > crate::fees::BPS_DENOMINATOR {
            return Err(FundError::InvalidBasisPoints(self.total_weight_bps()));
        }

        for tier in [self.fee_tiers.tier_a, self.fee_tiers.tier_b, self.quote_fee_tier()] {
            if tier == 0 || tier > MAX_FEE_TIER {
                return Err(FundError::Configuration(format!("fee tier {} out of range", tier)));
            }
        }

        match self.vault.generation {
            VaultGeneration::A if self.vault.pool_id.is_none() => {
                return Err(FundError::Configuration("vault-A requires pool_id".to_string()));
            }
            VaultGeneration::B if self.vault.pool.is_none() => {
                return Err(FundError::Configuration("vault-B requires pool".to_string()));
            }
            _ => {}
        }

        if self.native.is_zero() || self.address.is_zero() {
            return Err(FundError::Configuration("native and fund address must be set".to_string()));
        }

        Ok(())
    }
}
