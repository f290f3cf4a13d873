//! Pooled-liquidity adapters
//!
//! One `LiquidityPoolAdapter` per vault generation. The two calling
//! conventions are never mixed: a deployment picks its adapter once, at
//! construction, and the fund only ever sees the trait.
//!
//! Amount arrays crossing the trait are always in the fund's configured
//! asset order; each adapter reorders to the vault's canonical order itself.

pub mod vault_a;
pub mod vault_b;

pub use vault_a::VaultAAdapter;
pub use vault_b::VaultBAdapter;

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{FundError, Result};
use crate::interfaces::{TokenLedger, VaultHandle};
use crate::types::VaultGeneration;

/// Join/exit contract shared by both vault generations.
#[async_trait]
pub trait LiquidityPoolAdapter: Send + Sync {
    fn generation(&self) -> VaultGeneration;

    /// Liquidity token of the pool
    fn pool_token(&self) -> Address;

    /// Address the fund must approve / that pulls assets on join
    fn vault_address(&self) -> Address;

    /// Join with `amounts` (fund order); returns pool tokens received by `fund`.
    async fn join(&self, fund: Address, amounts: &[U256]) -> Result<U256>;

    /// Exit `pool_tokens`; returns the per-asset amounts received (fund order).
    async fn exit(&self, fund: Address, pool_tokens: U256) -> Result<Vec<U256>>;
}

/// Build the adapter for whichever vault the deployment targets.
pub async fn connect(
    vault: &VaultHandle,
    tokens: Arc<dyn TokenLedger>,
    fund_assets: &[Address],
) -> Result<Arc<dyn LiquidityPoolAdapter>> {
    let adapter: Arc<dyn LiquidityPoolAdapter> = match vault {
        VaultHandle::A { vault, pool_id } => {
            Arc::new(VaultAAdapter::connect(vault.clone(), *pool_id, tokens, fund_assets).await?)
        }
        VaultHandle::B { vault, pool } => {
            Arc::new(VaultBAdapter::connect(vault.clone(), *pool, tokens, fund_assets).await?)
        }
    };
    Ok(adapter)
}

/// Mapping between the fund's asset order and a vault's canonical order.
///
/// Reconciled once at setup; both lists must hold exactly the same tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenOrdering {
    vault_order: Vec<Address>,
    /// fund index -> vault index
    fund_to_vault: Vec<usize>,
}

impl TokenOrdering {
    pub fn new(fund_assets: &[Address], vault_tokens: &[Address]) -> Result<Self> {
        let fund_set: HashSet<_> = fund_assets.iter().collect();
        let vault_set: HashSet<_> = vault_tokens.iter().collect();

        if fund_set.len() != fund_assets.len() {
            return Err(FundError::Configuration("duplicate fund asset".to_string()));
        }
        if fund_set != vault_set || vault_set.len() != vault_tokens.len() {
            return Err(FundError::Configuration(format!(
                "vault tokens {:?} do not match fund assets {:?}",
                vault_tokens, fund_assets
            )));
        }

        let fund_to_vault = fund_assets
            .iter()
            .map(|asset| {
                vault_tokens
                    .iter()
                    .position(|t| t == asset)
                    .ok_or(FundError::UnknownAsset(*asset))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            vault_order: vault_tokens.to_vec(),
            fund_to_vault,
        })
    }

    pub fn vault_order(&self) -> &[Address] {
        &self.vault_order
    }

    pub fn len(&self) -> usize {
        self.vault_order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vault_order.is_empty()
    }

    /// Fund-ordered amounts -> vault-ordered amounts.
    pub fn to_vault(&self, amounts: &[U256]) -> Result<Vec<U256>> {
        self.check_len(amounts)?;
        let mut out = vec![U256::ZERO; self.len()];
        for (fund_idx, &vault_idx) in self.fund_to_vault.iter().enumerate() {
            out[vault_idx] = amounts[fund_idx];
        }
        Ok(out)
    }

    /// Vault-ordered amounts -> fund-ordered amounts.
    pub fn to_fund(&self, amounts: &[U256]) -> Result<Vec<U256>> {
        self.check_len(amounts)?;
        Ok(self.fund_to_vault.iter().map(|&vault_idx| amounts[vault_idx]).collect())
    }

    fn check_len(&self, amounts: &[U256]) -> Result<()> {
        if amounts.len() != self.len() {
            return Err(FundError::Configuration(format!(
                "expected {} amounts, got {}",
                self.len(),
                amounts.len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> Address {
        Address::repeat_byte(b)
    }

    #[test]
    fn test_reordering_reversed() {
        let fund = [addr(1), addr(2), addr(3)];
        let vault = [addr(3), addr(1), addr(2)];
        let ordering = TokenOrdering::new(&fund, &vault).unwrap();

        let amounts = [U256::from(10u64), U256::from(20u64), U256::from(30u64)];
        let in_vault = ordering.to_vault(&amounts).unwrap();
        assert_eq!(in_vault, vec![U256::from(30u64), U256::from(10u64), U256::from(20u64)]);
        assert_eq!(ordering.to_fund(&in_vault).unwrap(), amounts.to_vec());
    }

    #[test]
    fn test_mismatched_sets_rejected() {
        let err = TokenOrdering::new(&[addr(1), addr(2)], &[addr(1), addr(9)]).unwrap_err();
        assert!(matches!(err, FundError::Configuration(_)));

        let err = TokenOrdering::new(&[addr(1)], &[addr(1), addr(2)]).unwrap_err();
        assert!(matches!(err, FundError::Configuration(_)));
    }

    #[test]
    fn test_duplicate_assets_rejected() {
        assert!(TokenOrdering::new(&[addr(1), addr(1)], &[addr(1), addr(1)]).is_err());
    }

    #[test]
    fn test_wrong_length_amounts() {
        let ordering = TokenOrdering::new(&[addr(1), addr(2)], &[addr(2), addr(1)]).unwrap();
        assert!(ordering.to_vault(&[U256::ZERO]).is_err());
    }
}
