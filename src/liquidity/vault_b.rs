//! Generation-B vault adapter
//!
//! Pool addressed by its own address (which is also the pool token).
//! Unbalanced add and proportional remove both report their amounts, so
//! nothing is measured by balance delta here.

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use super::{LiquidityPoolAdapter, TokenOrdering};
use crate::error::Result;
use crate::interfaces::{TokenLedger, VaultB};
use crate::routing::ensure_approval;
use crate::types::VaultGeneration;

pub struct VaultBAdapter {
    vault: Arc<dyn VaultB>,
    pool: Address,
    tokens: Arc<dyn TokenLedger>,
    ordering: TokenOrdering,
}

impl VaultBAdapter {
    pub async fn connect(
        vault: Arc<dyn VaultB>,
        pool: Address,
        tokens: Arc<dyn TokenLedger>,
        fund_assets: &[Address],
    ) -> Result<Self> {
        let vault_tokens = vault.pool_tokens(pool).await?;
        let ordering = TokenOrdering::new(fund_assets, &vault_tokens)?;

        info!("Vault-B pool {} connected: {} tokens", pool, ordering.len());

        Ok(Self {
            vault,
            pool,
            tokens,
            ordering,
        })
    }
}

#[async_trait]
impl LiquidityPoolAdapter for VaultBAdapter {
    fn generation(&self) -> VaultGeneration {
        VaultGeneration::B
    }

    fn pool_token(&self) -> Address {
        self.pool
    }

    fn vault_address(&self) -> Address {
        self.vault.address()
    }

    async fn join(&self, fund: Address, amounts: &[U256]) -> Result<U256> {
        let amounts_in = self.ordering.to_vault(amounts)?;

        for (token, amount) in self.ordering.vault_order().iter().zip(&amounts_in) {
            ensure_approval(self.tokens.as_ref(), *token, fund, self.vault.address(), *amount).await?;
        }

        // Plain assets only: no wrapping of any token on the way in
        let wrap = vec![false; self.ordering.len()];
        let minted = self
            .vault
            .add_liquidity_unbalanced(fund, self.pool, wrap, amounts_in.clone(), U256::ZERO)
            .await?;

        debug!("Vault-B join: {:?} -> {} pool tokens", amounts_in, minted);
        Ok(minted)
    }

    async fn exit(&self, fund: Address, pool_tokens: U256) -> Result<Vec<U256>> {
        ensure_approval(self.tokens.as_ref(), self.pool, fund, self.vault.address(), pool_tokens).await?;

        let unwrap = vec![false; self.ordering.len()];
        let mins = vec![U256::ZERO; self.ordering.len()];
        let amounts = self
            .vault
            .remove_liquidity_proportional(fund, self.pool, unwrap, pool_tokens, mins)
            .await?;

        debug!("Vault-B exit: {} pool tokens -> {:?}", pool_tokens, amounts);
        self.ordering.to_fund(&amounts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::MarketBuilder;

    fn units(n: u64) -> U256 {
        U256::from(n) * U256::from(10u64).pow(U256::from(18))
    }

    #[tokio::test]
    async fn test_join_and_exit_report_amounts() {
        let market = MarketBuilder::standard().build();
        let fund = Address::repeat_byte(0xF0);
        let (aaa, bbb) = (market.token("AAA"), market.token("BBB"));
        market.chain.mint_token(aaa, fund, units(100));
        market.chain.mint_token(bbb, fund, units(100));

        let adapter = VaultBAdapter::connect(market.vault_b(), market.pool_address(), market.tokens(), &[bbb, aaa])
            .await
            .unwrap();
        assert_eq!(adapter.pool_token(), market.pool_address());

        let minted = adapter.join(fund, &[units(4), units(6)]).await.unwrap();
        assert_eq!(minted, units(10));
        assert_eq!(market.chain.balance(market.pool_address(), fund), minted);

        let out = adapter.exit(fund, minted).await.unwrap();
        assert_eq!(out, vec![units(4), units(6)]);
        assert_eq!(market.chain.balance(market.pool_address(), fund), U256::ZERO);
    }

    #[tokio::test]
    async fn test_exit_approves_pool_token() {
        let market = MarketBuilder::standard().build();
        let fund = Address::repeat_byte(0xF0);
        let (aaa, bbb) = (market.token("AAA"), market.token("BBB"));
        market.chain.mint_token(aaa, fund, units(10));
        market.chain.mint_token(bbb, fund, units(10));

        let adapter = VaultBAdapter::connect(market.vault_b(), market.pool_address(), market.tokens(), &[aaa, bbb])
            .await
            .unwrap();
        let minted = adapter.join(fund, &[units(1), units(1)]).await.unwrap();
        adapter.exit(fund, minted / U256::from(2u8)).await.unwrap();

        let allowance = market
            .chain
            .allowance_of(market.pool_address(), fund, adapter.vault_address());
        assert_eq!(allowance, U256::MAX - minted / U256::from(2u8));
    }
}
