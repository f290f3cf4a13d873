//! In-memory chain
//!
//! Implements every collaborator the fund drives: token ledger, native
//! currency with its wrapper, generation-1 pairs, generation-2 pools and a
//! weighted-pool vault reachable through both vault calling conventions.
//!
//! Each collaborator call runs against a copy of the state and is only
//! written back when it succeeds, so a reverted call leaves nothing behind.
//! `ChainContext` checkpoints stack on top of that for whole operations.

pub mod gen1;
pub mod gen2;
pub mod market;
pub mod scenario;
pub mod vault;

pub use gen1::SimGen1Exchange;
pub use gen2::SimGen2Exchange;
pub use market::{Market, MarketBuilder};
pub use vault::{SimVaultA, SimVaultB, WeightedPool};

use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

use crate::contracts::JoinKind;
use crate::error::BackendError;
use crate::interfaces::{BackendResult, ChainContext, Checkpoint, NativeCurrency, TokenLedger};

/// Full chain state. Cheap enough to clone per call at simulation sizes.
#[derive(Debug, Clone, Default)]
pub struct ChainState {
    pub timestamp: u64,
    native: HashMap<Address, U256>,
    /// (token, holder) -> balance
    balances: HashMap<(Address, Address), U256>,
    /// (token, owner, spender) -> allowance
    allowances: HashMap<(Address, Address, Address), U256>,
    supplies: HashMap<Address, U256>,
    rejects_native: HashSet<Address>,
    pub(crate) gen1_pairs: HashMap<(Address, Address), gen1::Gen1Pair>,
    pub(crate) gen2_pools: HashMap<Address, gen2::Gen2Pool>,
    pub(crate) gen2_index: HashMap<(Address, Address, u32), Address>,
    pub(crate) vault_pools: HashMap<Address, WeightedPool>,
    pub(crate) pool_ids: HashMap<B256, Address>,
    pub(crate) join_log: Vec<JoinKind>,
}

impl ChainState {
    pub fn balance(&self, token: Address, holder: Address) -> U256 {
        self.balances.get(&(token, holder)).copied().unwrap_or_default()
    }

    pub fn native_balance(&self, holder: Address) -> U256 {
        self.native.get(&holder).copied().unwrap_or_default()
    }

    pub fn supply(&self, token: Address) -> U256 {
        self.supplies.get(&token).copied().unwrap_or_default()
    }

    pub fn allowance(&self, token: Address, owner: Address, spender: Address) -> U256 {
        self.allowances
            .get(&(token, owner, spender))
            .copied()
            .unwrap_or_default()
    }

    pub(crate) fn credit(&mut self, token: Address, holder: Address, amount: U256) -> BackendResult<()> {
        let entry = self.balances.entry((token, holder)).or_default();
        *entry = entry.checked_add(amount).ok_or(BackendError::Overflow("token balance"))?;
        Ok(())
    }

    pub(crate) fn debit(&mut self, token: Address, holder: Address, amount: U256) -> BackendResult<()> {
        let available = self.balance(token, holder);
        if available < amount {
            return Err(BackendError::InsufficientBalance {
                token,
                holder,
                available,
                required: amount,
            });
        }
        self.balances.insert((token, holder), available - amount);
        Ok(())
    }

    pub(crate) fn mint(&mut self, token: Address, to: Address, amount: U256) -> BackendResult<()> {
        self.credit(token, to, amount)?;
        let supply = self.supplies.entry(token).or_default();
        *supply = supply.checked_add(amount).ok_or(BackendError::Overflow("token supply"))?;
        Ok(())
    }

    pub(crate) fn burn(&mut self, token: Address, from: Address, amount: U256) -> BackendResult<()> {
        self.debit(token, from, amount)?;
        let supply = self.supplies.entry(token).or_default();
        *supply = supply.saturating_sub(amount);
        Ok(())
    }

    pub(crate) fn transfer(&mut self, token: Address, from: Address, to: Address, amount: U256) -> BackendResult<()> {
        self.debit(token, from, amount)?;
        self.credit(token, to, amount)
    }

    pub(crate) fn approve(&mut self, token: Address, owner: Address, spender: Address, amount: U256) {
        self.allowances.insert((token, owner, spender), amount);
    }

    /// Spend `spender`'s allowance and move the tokens.
    pub(crate) fn transfer_from(
        &mut self,
        token: Address,
        spender: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> BackendResult<()> {
        let available = self.allowance(token, from, spender);
        if available < amount {
            return Err(BackendError::InsufficientAllowance {
                token,
                owner: from,
                spender,
                available,
                required: amount,
            });
        }
        self.allowances.insert((token, from, spender), available - amount);
        self.transfer(token, from, to, amount)
    }

    pub(crate) fn debit_native(&mut self, holder: Address, amount: U256) -> BackendResult<()> {
        let available = self.native_balance(holder);
        if available < amount {
            return Err(BackendError::InsufficientBalance {
                token: Address::ZERO,
                holder,
                available,
                required: amount,
            });
        }
        self.native.insert(holder, available - amount);
        Ok(())
    }

    pub(crate) fn credit_native(&mut self, holder: Address, amount: U256) -> BackendResult<()> {
        if self.rejects_native.contains(&holder) {
            return Err(BackendError::NativeTransferRejected(holder));
        }
        let entry = self.native.entry(holder).or_default();
        *entry = entry.checked_add(amount).ok_or(BackendError::Overflow("native balance"))?;
        Ok(())
    }

    /// Convert raw native paid by `payer` into wrapped tokens held by `to`.
    pub(crate) fn wrap_into(&mut self, weth: Address, payer: Address, to: Address, amount: U256) -> BackendResult<()> {
        self.debit_native(payer, amount)?;
        self.mint(weth, to, amount)
    }
}

/// Shared in-memory chain with snapshot stack.
#[derive(Debug)]
pub struct SimChain {
    weth: Address,
    state: Mutex<ChainState>,
    snapshots: Mutex<Vec<(u64, ChainState)>>,
    next_checkpoint: Mutex<u64>,
}

impl SimChain {
    pub fn new(weth: Address, timestamp: u64) -> Self {
        let state = ChainState {
            timestamp,
            ..ChainState::default()
        };
        Self {
            weth,
            state: Mutex::new(state),
            snapshots: Mutex::new(Vec::new()),
            next_checkpoint: Mutex::new(0),
        }
    }

    pub fn weth(&self) -> Address {
        self.weth
    }

    fn lock(&self) -> MutexGuard<'_, ChainState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read-only view of the state.
    pub fn read<R>(&self, f: impl FnOnce(&ChainState) -> R) -> R {
        f(&self.lock())
    }

    /// Run one call atomically: changes are kept only if `f` succeeds.
    pub(crate) fn transact<R>(&self, f: impl FnOnce(&mut ChainState) -> BackendResult<R>) -> BackendResult<R> {
        let mut state = self.lock();
        let mut working = state.clone();
        let out = f(&mut working)?;
        *state = working;
        Ok(out)
    }

    // ── Setup and inspection helpers ─────────────────────────────────

    pub fn mint_token(&self, token: Address, to: Address, amount: U256) {
        // Only overflows past U256::MAX supply; ignored for setup
        let _ = self.transact(|s| s.mint(token, to, amount));
    }

    pub fn set_native_balance(&self, holder: Address, amount: U256) {
        self.lock().native.insert(holder, amount);
    }

    pub fn balance(&self, token: Address, holder: Address) -> U256 {
        self.read(|s| s.balance(token, holder))
    }

    pub fn native_of(&self, holder: Address) -> U256 {
        self.read(|s| s.native_balance(holder))
    }

    pub fn supply(&self, token: Address) -> U256 {
        self.read(|s| s.supply(token))
    }

    pub fn allowance_of(&self, token: Address, owner: Address, spender: Address) -> U256 {
        self.read(|s| s.allowance(token, owner, spender))
    }

    pub fn approve_now(&self, token: Address, owner: Address, spender: Address, amount: U256) {
        self.lock().approve(token, owner, spender, amount);
    }

    /// Make native transfers to `holder` fail.
    pub fn reject_native(&self, holder: Address, reject: bool) {
        let mut state = self.lock();
        if reject {
            state.rejects_native.insert(holder);
        } else {
            state.rejects_native.remove(&holder);
        }
    }

    pub fn advance_time(&self, secs: u64) {
        self.lock().timestamp += secs;
    }

    /// Join kinds seen by the generation-A vault, oldest first
    pub fn join_kinds(&self) -> Vec<JoinKind> {
        self.read(|s| s.join_log.clone())
    }
}

impl ChainContext for SimChain {
    fn block_timestamp(&self) -> u64 {
        self.lock().timestamp
    }

    fn checkpoint(&self) -> Checkpoint {
        let id = {
            let mut next = self.next_checkpoint.lock().unwrap_or_else(PoisonError::into_inner);
            *next += 1;
            *next
        };
        let state = self.lock().clone();
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, state));
        trace!("Checkpoint {}", id);
        Checkpoint(id)
    }

    fn commit(&self, checkpoint: Checkpoint) {
        let mut snapshots = self.snapshots.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pos) = snapshots.iter().position(|(id, _)| *id == checkpoint.0) {
            snapshots.truncate(pos);
        }
        trace!("Commit {}", checkpoint.0);
    }

    fn revert_to(&self, checkpoint: Checkpoint) {
        let mut snapshots = self.snapshots.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pos) = snapshots.iter().position(|(id, _)| *id == checkpoint.0) {
            let (_, state) = snapshots.swap_remove(pos);
            snapshots.truncate(pos);
            *self.lock() = state;
            debug!("Reverted to checkpoint {}", checkpoint.0);
        }
    }
}

#[async_trait]
impl TokenLedger for SimChain {
    async fn balance_of(&self, token: Address, holder: Address) -> BackendResult<U256> {
        Ok(self.balance(token, holder))
    }

    async fn total_supply(&self, token: Address) -> BackendResult<U256> {
        Ok(self.supply(token))
    }

    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> BackendResult<U256> {
        Ok(self.allowance_of(token, owner, spender))
    }

    async fn approve(&self, token: Address, owner: Address, spender: Address, amount: U256) -> BackendResult<()> {
        self.approve_now(token, owner, spender, amount);
        Ok(())
    }

    async fn transfer(&self, token: Address, from: Address, to: Address, amount: U256) -> BackendResult<()> {
        self.transact(|s| s.transfer(token, from, to, amount))
    }

    async fn transfer_from(
        &self,
        token: Address,
        spender: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> BackendResult<()> {
        self.transact(|s| s.transfer_from(token, spender, from, to, amount))
    }
}

#[async_trait]
impl NativeCurrency for SimChain {
    fn wrapped(&self) -> Address {
        self.weth
    }

    async fn native_balance(&self, holder: Address) -> BackendResult<U256> {
        Ok(self.native_of(holder))
    }

    async fn send_native(&self, from: Address, to: Address, amount: U256) -> BackendResult<()> {
        self.transact(|s| {
            s.debit_native(from, amount)?;
            s.credit_native(to, amount)
        })
    }

    async fn wrap(&self, holder: Address, amount: U256) -> BackendResult<()> {
        let weth = self.weth;
        self.transact(|s| s.wrap_into(weth, holder, holder, amount))
    }

    async fn unwrap(&self, holder: Address, amount: U256) -> BackendResult<U256> {
        let weth = self.weth;
        self.transact(|s| {
            s.burn(weth, holder, amount)?;
            s.credit_native(holder, amount)?;
            Ok(amount)
        })
    }
}

/// Integer square root (floor), Newton's method.
pub fn isqrt(value: U256) -> U256 {
    if value < U256::from(2u8) {
        return value;
    }
    let mut x = value;
    let mut y: U256 = (x + U256::from(1u8)) >> 1usize;
    while y < x {
        x = y;
        y = (x + value / x) >> 1usize;
    }
    x
}
