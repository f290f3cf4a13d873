//! Generation-A vault adapter
//!
//! Pool addressed by id. Join and exit carry a kind tag in their user data
//! and report nothing back, so every amount is measured as a balance delta
//! around the call.

use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use super::{LiquidityPoolAdapter, TokenOrdering};
use crate::contracts::{encode_exit_data, encode_join_data, ExitPoolRequest, JoinKind, JoinPoolRequest};
use crate::error::{FundError, Result};
use crate::interfaces::{TokenLedger, VaultA};
use crate::routing::ensure_approval;
use crate::types::VaultGeneration;

pub struct VaultAAdapter {
    vault: Arc<dyn VaultA>,
    pool_id: B256,
    pool_token: Address,
    tokens: Arc<dyn TokenLedger>,
    ordering: TokenOrdering,
}

impl VaultAAdapter {
    /// Resolve the pool token and reconcile token orderings.
    pub async fn connect(
        vault: Arc<dyn VaultA>,
        pool_id: B256,
        tokens: Arc<dyn TokenLedger>,
        fund_assets: &[Address],
    ) -> Result<Self> {
        let pool_token = vault.get_pool(pool_id).await?;
        let vault_tokens = vault.get_pool_tokens(pool_id).await?;
        let ordering = TokenOrdering::new(fund_assets, &vault_tokens)?;

        info!(
            "Vault-A pool {} connected: pool token {}, {} tokens",
            pool_id,
            pool_token,
            ordering.len()
        );

        Ok(Self {
            vault,
            pool_id,
            pool_token,
            tokens,
            ordering,
        })
    }

    pub fn pool_id(&self) -> B256 {
        self.pool_id
    }

    async fn balances(&self, holder: Address) -> Result<Vec<U256>> {
        let mut out = Vec::with_capacity(self.ordering.len());
        for token in self.ordering.vault_order() {
            out.push(self.tokens.balance_of(*token, holder).await?);
        }
        Ok(out)
    }
}

#[async_trait]
impl LiquidityPoolAdapter for VaultAAdapter {
    fn generation(&self) -> VaultGeneration {
        VaultGeneration::A
    }

    fn pool_token(&self) -> Address {
        self.pool_token
    }

    fn vault_address(&self) -> Address {
        self.vault.address()
    }

    async fn join(&self, fund: Address, amounts: &[U256]) -> Result<U256> {
        let amounts_in = self.ordering.to_vault(amounts)?;

        for (token, amount) in self.ordering.vault_order().iter().zip(&amounts_in) {
            ensure_approval(self.tokens.as_ref(), *token, fund, self.vault.address(), *amount).await?;
        }

        // Zero supply means the pool was never initialised
        let supply = self.tokens.total_supply(self.pool_token).await?;
        let kind = if supply.is_zero() {
            JoinKind::Init
        } else {
            JoinKind::ExactTokensInForPoolTokenOut
        };

        let request = JoinPoolRequest {
            assets: self.ordering.vault_order().to_vec(),
            maxAmountsIn: amounts_in.clone(),
            userData: encode_join_data(kind, &amounts_in, U256::ZERO),
            fromInternalBalance: false,
        };

        let before = self.tokens.balance_of(self.pool_token, fund).await?;
        self.vault.join_pool(self.pool_id, fund, fund, request).await?;
        let after = self.tokens.balance_of(self.pool_token, fund).await?;

        let received = after
            .checked_sub(before)
            .ok_or_else(|| FundError::Accounting("pool token balance fell during join".to_string()))?;

        debug!("Vault-A join ({:?}): {:?} -> {} pool tokens", kind, amounts_in, received);
        Ok(received)
    }

    async fn exit(&self, fund: Address, pool_tokens: U256) -> Result<Vec<U256>> {
        let request = ExitPoolRequest {
            assets: self.ordering.vault_order().to_vec(),
            minAmountsOut: vec![U256::ZERO; self.ordering.len()],
            userData: encode_exit_data(pool_tokens),
            toInternalBalance: false,
        };

        let before = self.balances(fund).await?;
        self.vault.exit_pool(self.pool_id, fund, fund, request).await?;
        let after = self.balances(fund).await?;

        let received = after
            .iter()
            .zip(&before)
            .map(|(a, b)| {
                a.checked_sub(*b)
                    .ok_or_else(|| FundError::Accounting("asset balance fell during exit".to_string()))
            })
            .collect::<Result<Vec<_>>>()?;

        debug!("Vault-A exit: {} pool tokens -> {:?}", pool_tokens, received);
        self.ordering.to_fund(&received)
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
    async fn test_first_join_uses_init_then_proportional() {
        let market = MarketBuilder::standard().build();
        let fund = Address::repeat_byte(0xF0);
        let (aaa, bbb) = (market.token("AAA"), market.token("BBB"));
        market.chain.mint_token(aaa, fund, units(100));
        market.chain.mint_token(bbb, fund, units(100));

        let adapter = VaultAAdapter::connect(
            market.vault_a(),
            market.pool_id(),
            market.tokens(),
            &[aaa, bbb],
        )
        .await
        .unwrap();

        // Empty pool: INIT mints the sum of amounts
        let first = adapter.join(fund, &[units(10), units(10)]).await.unwrap();
        assert_eq!(first, units(20));
        assert_eq!(market.chain.join_kinds(), vec![JoinKind::Init]);

        let second = adapter.join(fund, &[units(5), units(5)]).await.unwrap();
        assert_eq!(second, units(10));
        assert_eq!(
            market.chain.join_kinds(),
            vec![JoinKind::Init, JoinKind::ExactTokensInForPoolTokenOut]
        );
    }

    #[tokio::test]
    async fn test_reversed_vault_order_reconciled() {
        let market = MarketBuilder::standard().build();
        let fund = Address::repeat_byte(0xF0);
        let (aaa, bbb) = (market.token("AAA"), market.token("BBB"));
        market.chain.mint_token(aaa, fund, units(100));
        market.chain.mint_token(bbb, fund, units(100));

        // Fund order is the reverse of the vault's canonical order
        let adapter = VaultAAdapter::connect(
            market.vault_a(),
            market.pool_id(),
            market.tokens(),
            &[bbb, aaa],
        )
        .await
        .unwrap();

        adapter.join(fund, &[units(3), units(7)]).await.unwrap();
        assert_eq!(market.chain.balance(bbb, fund), units(97));
        assert_eq!(market.chain.balance(aaa, fund), units(93));

        let out = adapter.exit(fund, units(10)).await.unwrap();
        assert_eq!(out, vec![units(3), units(7)]);
    }

    #[tokio::test]
    async fn test_exit_measures_balance_delta() {
        let market = MarketBuilder::standard().build();
        let fund = Address::repeat_byte(0xF0);
        let (aaa, bbb) = (market.token("AAA"), market.token("BBB"));
        market.chain.mint_token(aaa, fund, units(50));
        market.chain.mint_token(bbb, fund, units(50));

        let adapter = VaultAAdapter::connect(market.vault_a(), market.pool_id(), market.tokens(), &[aaa, bbb])
            .await
            .unwrap();
        let minted = adapter.join(fund, &[units(20), units(40)]).await.unwrap();

        // Half the pool tokens -> half of each reserve
        let out = adapter.exit(fund, minted / U256::from(2u8)).await.unwrap();
        assert_eq!(out, vec![units(10), units(20)]);
        assert_eq!(market.chain.balance(adapter.pool_token(), fund), minted / U256::from(2u8));
    }
}
