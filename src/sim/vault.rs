//! Weighted-pool vault, reachable through both vault calling conventions
//!
//! Pools hold their reserves as token balances at the pool address, and the
//! pool address is also the pool token. Join math:
//! - first join (zero supply): mint the plain sum of amounts in
//! - later joins: mint supply * sum(w_i * a_i / b_i), the linearised
//!   exact-tokens-in formula
//!
//! Exit is proportional: a_i = b_i * poolTokensIn / supply.

use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::{ChainState, SimChain};
use crate::contracts::{decode_exit_data, decode_join_data, ExitPoolRequest, JoinKind, JoinPoolRequest};
use crate::error::BackendError;
use crate::fees::BPS_DENOMINATOR;
use crate::interfaces::{BackendResult, VaultA, VaultB};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightedPool {
    pub address: Address,
    /// Canonical token order
    pub tokens: Vec<Address>,
    pub weights_bps: Vec<u32>,
}

impl ChainState {
    fn vault_pool(&self, pool: Address) -> BackendResult<WeightedPool> {
        self.vault_pools
            .get(&pool)
            .cloned()
            .ok_or_else(|| BackendError::UnknownPool(pool.to_string()))
    }

    fn pool_by_id(&self, pool_id: B256) -> BackendResult<Address> {
        self.pool_ids
            .get(&pool_id)
            .copied()
            .ok_or_else(|| BackendError::UnknownPool(pool_id.to_string()))
    }

    /// Pull `amounts` (canonical order) from `sender` and mint pool tokens to `recipient`.
    fn pool_join(
        &mut self,
        spender: Address,
        pool: &WeightedPool,
        sender: Address,
        recipient: Address,
        amounts: &[U256],
        min_out: U256,
    ) -> BackendResult<U256> {
        if amounts.len() != pool.tokens.len() {
            return Err(BackendError::Reverted("amounts length mismatch".to_string()));
        }

        let supply = self.supply(pool.address);
        let minted = if supply.is_zero() {
            amounts
                .iter()
                .try_fold(U256::ZERO, |acc, a| acc.checked_add(*a))
                .ok_or(BackendError::Overflow("init join"))?
        } else {
            let mut minted = U256::ZERO;
            for ((token, weight), amount) in pool.tokens.iter().zip(&pool.weights_bps).zip(amounts) {
                if amount.is_zero() {
                    continue;
                }
                let balance = self.balance(*token, pool.address);
                if balance.is_zero() {
                    return Err(BackendError::Reverted(format!("pool holds no {}", token)));
                }
                let term = supply
                    .checked_mul(U256::from(*weight))
                    .and_then(|v| v.checked_mul(*amount))
                    .ok_or(BackendError::Overflow("weighted join"))?
                    / (balance * U256::from(BPS_DENOMINATOR));
                minted += term;
            }
            minted
        };

        if minted.is_zero() {
            return Err(BackendError::Reverted("zero pool tokens out".to_string()));
        }
        if minted < min_out {
            return Err(BackendError::InsufficientOutput {
                minimum: min_out,
                actual: minted,
            });
        }

        for (token, amount) in pool.tokens.iter().zip(amounts) {
            if !amount.is_zero() {
                self.transfer_from(*token, spender, sender, pool.address, *amount)?;
            }
        }
        self.mint(pool.address, recipient, minted)?;
        Ok(minted)
    }

    /// Burn `pool_tokens` from `holder` and pay the proportional reserves to `recipient`.
    fn pool_exit(
        &mut self,
        pool: &WeightedPool,
        holder: Address,
        recipient: Address,
        pool_tokens: U256,
        min_amounts: &[U256],
    ) -> BackendResult<Vec<U256>> {
        let supply = self.supply(pool.address);
        if pool_tokens.is_zero() || pool_tokens > supply {
            return Err(BackendError::Reverted(format!("cannot exit {} of {}", pool_tokens, supply)));
        }

        let mut amounts = Vec::with_capacity(pool.tokens.len());
        for (i, token) in pool.tokens.iter().enumerate() {
            let balance = self.balance(*token, pool.address);
            let amount = balance
                .checked_mul(pool_tokens)
                .ok_or(BackendError::Overflow("proportional exit"))?
                / supply;
            let minimum = min_amounts.get(i).copied().unwrap_or_default();
            if amount < minimum {
                return Err(BackendError::InsufficientOutput { minimum, actual: amount });
            }
            amounts.push(amount);
        }

        self.burn(pool.address, holder, pool_tokens)?;
        for (token, amount) in pool.tokens.iter().zip(&amounts) {
            self.transfer(*token, pool.address, recipient, *amount)?;
        }
        Ok(amounts)
    }
}

/// Register a weighted pool on the chain. Returns its id for vault-A use.
pub fn create_weighted_pool(chain: &SimChain, pool: WeightedPool) -> B256 {
    let pool_id = pool.address.into_word();
    let _ = chain.transact(|s| {
        s.pool_ids.insert(pool_id, pool.address);
        s.vault_pools.insert(pool.address, pool);
        Ok(())
    });
    pool_id
}

/// Pool-id addressed vault; join/exit report nothing.
pub struct SimVaultA {
    address: Address,
    chain: Arc<SimChain>,
}

impl SimVaultA {
    pub fn new(address: Address, chain: Arc<SimChain>) -> Self {
        Self { address, chain }
    }
}

#[async_trait]
impl VaultA for SimVaultA {
    fn address(&self) -> Address {
        self.address
    }

    async fn get_pool(&self, pool_id: B256) -> BackendResult<Address> {
        self.chain.read(|s| s.pool_by_id(pool_id))
    }

    async fn get_pool_tokens(&self, pool_id: B256) -> BackendResult<Vec<Address>> {
        self.chain.read(|s| {
            let address = s.pool_by_id(pool_id)?;
            Ok(s.vault_pool(address)?.tokens)
        })
    }

    async fn join_pool(
        &self,
        pool_id: B256,
        sender: Address,
        recipient: Address,
        request: JoinPoolRequest,
    ) -> BackendResult<()> {
        let data = decode_join_data(&request.userData)?;
        let vault = self.address;

        let minted = self.chain.transact(|s| {
            let pool = s.vault_pool(s.pool_by_id(pool_id)?)?;
            if request.assets != pool.tokens {
                return Err(BackendError::Reverted("assets not in pool order".to_string()));
            }
            if data.amounts_in != request.maxAmountsIn {
                return Err(BackendError::Reverted("amounts exceed maxAmountsIn".to_string()));
            }

            let initialised = !s.supply(pool.address).is_zero();
            match (data.kind, initialised) {
                (JoinKind::Init, true) => return Err(BackendError::Reverted("pool already initialised".to_string())),
                (JoinKind::ExactTokensInForPoolTokenOut, false) => {
                    return Err(BackendError::Reverted("pool not initialised".to_string()))
                }
                _ => {}
            }

            let minted = s.pool_join(vault, &pool, sender, recipient, &data.amounts_in, data.min_pool_token_out)?;
            s.join_log.push(data.kind);
            Ok(minted)
        })?;

        debug!("Vault-A join {:?}: minted {}", data.kind, minted);
        Ok(())
    }

    async fn exit_pool(
        &self,
        pool_id: B256,
        sender: Address,
        recipient: Address,
        request: ExitPoolRequest,
    ) -> BackendResult<()> {
        let pool_tokens = decode_exit_data(&request.userData)?;

        let amounts = self.chain.transact(|s| {
            let pool = s.vault_pool(s.pool_by_id(pool_id)?)?;
            if request.assets != pool.tokens {
                return Err(BackendError::Reverted("assets not in pool order".to_string()));
            }
            s.pool_exit(&pool, sender, recipient, pool_tokens, &request.minAmountsOut)
        })?;

        debug!("Vault-A exit {}: paid {:?}", pool_tokens, amounts);
        Ok(())
    }
}

/// Pool-address addressed vault; add/remove report their amounts.
pub struct SimVaultB {
    address: Address,
    chain: Arc<SimChain>,
}

impl SimVaultB {
    pub fn new(address: Address, chain: Arc<SimChain>) -> Self {
        Self { address, chain }
    }
}

#[async_trait]
impl VaultB for SimVaultB {
    fn address(&self) -> Address {
        self.address
    }

    async fn pool_tokens(&self, pool: Address) -> BackendResult<Vec<Address>> {
        self.chain.read(|s| Ok(s.vault_pool(pool)?.tokens))
    }

    async fn add_liquidity_unbalanced(
        &self,
        sender: Address,
        pool: Address,
        wrap_underlying: Vec<bool>,
        exact_amounts_in: Vec<U256>,
        min_pool_token_out: U256,
    ) -> BackendResult<U256> {
        if wrap_underlying.iter().any(|w| *w) {
            return Err(BackendError::Reverted("no wrapped-underlying tokens in this pool".to_string()));
        }
        let vault = self.address;
        self.chain.transact(|s| {
            let state = s.vault_pool(pool)?;
            s.pool_join(vault, &state, sender, sender, &exact_amounts_in, min_pool_token_out)
        })
    }

    async fn remove_liquidity_proportional(
        &self,
        sender: Address,
        pool: Address,
        unwrap_wrapped: Vec<bool>,
        exact_pool_token_in: U256,
        min_amounts_out: Vec<U256>,
    ) -> BackendResult<Vec<U256>> {
        if unwrap_wrapped.iter().any(|w| *w) {
            return Err(BackendError::Reverted("no wrapped-underlying tokens in this pool".to_string()));
        }
        let vault = self.address;
        self.chain.transact(|s| {
            let state = s.vault_pool(pool)?;
            // Pool tokens are pulled under the vault's allowance before burning
            s.transfer_from(pool, vault, sender, pool, exact_pool_token_in)?;
            s.pool_exit(&state, pool, sender, exact_pool_token_in, &min_amounts_out)
        })
    }
}
