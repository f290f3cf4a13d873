//! External collaborator interfaces
//!
//! The fund never talks to a concrete exchange, vault or token contract; it
//! drives these traits. Mutating calls carry the acting address explicitly
//! (there is no implicit message sender) and payable calls carry the attached
//! native value.
//!
//! `ChainContext` stands in for the host's transaction atomicity: the fund
//! checkpoints before a mint/redeem and reverts everything on failure.

use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use std::sync::Arc;

use crate::contracts::{ExactInputSingleParams, ExitPoolRequest, JoinPoolRequest};
use crate::error::BackendError;
use crate::types::VaultGeneration;

pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Fungible token ledger (balances, allowances, supply) for every token the
/// fund touches, including the wrapped native asset and pool tokens.
#[async_trait]
pub trait TokenLedger: Send + Sync {
    async fn balance_of(&self, token: Address, holder: Address) -> BackendResult<U256>;

    async fn total_supply(&self, token: Address) -> BackendResult<U256>;

    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> BackendResult<U256>;

    async fn approve(&self, token: Address, owner: Address, spender: Address, amount: U256) -> BackendResult<()>;

    async fn transfer(&self, token: Address, from: Address, to: Address, amount: U256) -> BackendResult<()>;

    /// Move `amount` from `from` to `to` using `spender`'s allowance.
    async fn transfer_from(
        &self,
        token: Address,
        spender: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> BackendResult<()>;
}

/// Raw native currency and the wrap/unwrap service.
#[async_trait]
pub trait NativeCurrency: Send + Sync {
    /// Address of the wrapped native token
    fn wrapped(&self) -> Address;

    async fn native_balance(&self, holder: Address) -> BackendResult<U256>;

    async fn send_native(&self, from: Address, to: Address, amount: U256) -> BackendResult<()>;

    async fn wrap(&self, holder: Address, amount: U256) -> BackendResult<()>;

    /// Unwrap `amount` of `holder`'s wrapped balance; returns the raw amount credited.
    async fn unwrap(&self, holder: Address, amount: U256) -> BackendResult<U256>;
}

/// Opaque checkpoint handle returned by [`ChainContext::checkpoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint(pub u64);

/// Clock and atomicity of the host environment.
pub trait ChainContext: Send + Sync {
    fn block_timestamp(&self) -> u64;

    fn checkpoint(&self) -> Checkpoint;

    /// Keep every change made since `checkpoint`.
    fn commit(&self, checkpoint: Checkpoint);

    /// Discard every change made since `checkpoint`.
    fn revert_to(&self, checkpoint: Checkpoint);
}

/// Generation-1 pairwise exchange (constant product, path-based).
#[async_trait]
pub trait PairwiseGen1Exchange: Send + Sync {
    fn address(&self) -> Address;

    /// Simulated execution along `path`, price impact included.
    async fn get_amounts_out(&self, amount_in: U256, path: &[Address]) -> BackendResult<Vec<U256>>;

    /// Fixed-input swap. With a non-zero `value` the raw native currency is
    /// the input and `path[0]` must be the wrapped native token.
    #[allow(clippy::too_many_arguments)]
    async fn swap_exact_in(
        &self,
        sender: Address,
        value: U256,
        path: &[Address],
        amount_in: U256,
        min_amount_out: U256,
        recipient: Address,
        deadline: u64,
    ) -> BackendResult<Vec<U256>>;
}

/// Price state of a generation-2 pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gen2Slot0 {
    pub sqrt_price_x96: U256,
    pub tick: i32,
    pub token0: Address,
    pub token1: Address,
}

/// Generation-2 pairwise exchange (tick pricing, fee tiers).
#[async_trait]
pub trait PairwiseGen2Exchange: Send + Sync {
    /// Router address (spender for approvals)
    fn address(&self) -> Address;

    /// Factory lookup; None when no pool exists for the pair at `fee`.
    async fn get_pool(&self, token_a: Address, token_b: Address, fee: u32) -> BackendResult<Option<Address>>;

    async fn slot0(&self, pool: Address) -> BackendResult<Gen2Slot0>;

    /// Single-hop fixed-input swap; a non-zero `value` pays `tokenIn` in raw native.
    async fn exact_input_single(
        &self,
        sender: Address,
        value: U256,
        params: ExactInputSingleParams,
    ) -> BackendResult<U256>;
}

/// Generation-A pooled-liquidity vault.
#[async_trait]
pub trait VaultA: Send + Sync {
    fn address(&self) -> Address;

    /// Pool token for `pool_id`
    async fn get_pool(&self, pool_id: B256) -> BackendResult<Address>;

    /// Tokens in the vault's canonical order
    async fn get_pool_tokens(&self, pool_id: B256) -> BackendResult<Vec<Address>>;

    async fn join_pool(
        &self,
        pool_id: B256,
        sender: Address,
        recipient: Address,
        request: JoinPoolRequest,
    ) -> BackendResult<()>;

    async fn exit_pool(
        &self,
        pool_id: B256,
        sender: Address,
        recipient: Address,
        request: ExitPoolRequest,
    ) -> BackendResult<()>;
}

/// Generation-B pooled-liquidity vault.
#[async_trait]
pub trait VaultB: Send + Sync {
    fn address(&self) -> Address;

    /// Tokens in the vault's canonical order
    async fn pool_tokens(&self, pool: Address) -> BackendResult<Vec<Address>>;

    /// Returns the pool tokens minted to `sender`.
    async fn add_liquidity_unbalanced(
        &self,
        sender: Address,
        pool: Address,
        wrap_underlying: Vec<bool>,
        exact_amounts_in: Vec<U256>,
        min_pool_token_out: U256,
    ) -> BackendResult<U256>;

    /// Returns the per-token amounts paid to `sender`.
    async fn remove_liquidity_proportional(
        &self,
        sender: Address,
        pool: Address,
        unwrap_wrapped: Vec<bool>,
        exact_pool_token_in: U256,
        min_amounts_out: Vec<U256>,
    ) -> BackendResult<Vec<U256>>;
}

/// The one vault a deployment targets.
#[derive(Clone)]
pub enum VaultHandle {
    A { vault: Arc<dyn VaultA>, pool_id: B256 },
    B { vault: Arc<dyn VaultB>, pool: Address },
}

impl VaultHandle {
    pub fn generation(&self) -> VaultGeneration {
        match self {
            VaultHandle::A { .. } => VaultGeneration::A,
            VaultHandle::B { .. } => VaultGeneration::B,
        }
    }

    pub fn address(&self) -> Address {
        match self {
            VaultHandle::A { vault, .. } => vault.address(),
            VaultHandle::B { vault, .. } => vault.address(),
        }
    }
}

/// Every collaborator a fund is wired to.
#[derive(Clone)]
pub struct Venues {
    pub tokens: Arc<dyn TokenLedger>,
    pub native: Arc<dyn NativeCurrency>,
    pub chain: Arc<dyn ChainContext>,
    pub gen1: Option<Arc<dyn PairwiseGen1Exchange>>,
    pub gen2: Option<Arc<dyn PairwiseGen2Exchange>>,
    pub vault: VaultHandle,
}
