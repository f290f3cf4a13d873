//! Share accounting
//!
//! How a depositor's stake in the fund's pool-token balance is represented:
//! - DirectToken: the pool token is the claim; it's handed straight out
//! - Ledger: the fund keeps the pool token and books proportional shares
//!
//! Invariant (Ledger): sum(shares[holder]) == total_shares, always.

use alloy::primitives::{Address, U256};
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

use crate::error::{FundError, Result};
use crate::types::AccountingMode;

/// Active accounting strategy of a fund.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareAccounting {
    DirectToken,
    Ledger(ShareLedger),
}

impl ShareAccounting {
    pub fn new(mode: AccountingMode) -> Self {
        match mode {
            AccountingMode::DirectToken => ShareAccounting::DirectToken,
            AccountingMode::Ledger => ShareAccounting::Ledger(ShareLedger::default()),
        }
    }

    pub fn mode(&self) -> AccountingMode {
        match self {
            ShareAccounting::DirectToken => AccountingMode::DirectToken,
            ShareAccounting::Ledger(_) => AccountingMode::Ledger,
        }
    }

    /// Holder's claim on pool tokens.
    ///
    /// `balance` is the holder's own pool-token balance for DirectToken, and
    /// the fund's pool-token balance for Ledger.
    pub fn claim_of(&self, holder: Address, balance: U256) -> U256 {
        match self {
            ShareAccounting::DirectToken => balance,
            ShareAccounting::Ledger(ledger) => ledger.claim_of(holder, balance),
        }
    }

    pub fn ledger(&self) -> Option<&ShareLedger> {
        match self {
            ShareAccounting::Ledger(ledger) => Some(ledger),
            ShareAccounting::DirectToken => None,
        }
    }

    pub fn ledger_mut(&mut self) -> Option<&mut ShareLedger> {
        match self {
            ShareAccounting::Ledger(ledger) => Some(ledger),
            ShareAccounting::DirectToken => None,
        }
    }
}

/// Internal proportional-share ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShareLedger {
    shares: HashMap<Address, U256>,
    total: U256,
}

impl ShareLedger {
    /// Shares to issue for `received` pool tokens.
    ///
    /// First deposit is 1:1; afterwards `received * total / pool_balance_before`, floored.
    pub fn shares_for_join(&self, received: U256, pool_balance_before: U256) -> Result<U256> {
        if self.total.is_zero() {
            return Ok(received);
        }
        if pool_balance_before.is_zero() {
            return Err(FundError::Accounting(format!(
                "{} shares outstanding against an empty pool balance",
                self.total
            )));
        }
        let scaled = received
            .checked_mul(self.total)
            .ok_or_else(|| FundError::Accounting("share issuance overflow".to_string()))?;
        Ok(scaled / pool_balance_before)
    }

    /// Pool tokens redeemable for `shares`: `pool_balance * shares / total`, floored.
    pub fn pool_tokens_for(&self, shares: U256, pool_balance: U256) -> Result<U256> {
        if shares > self.total {
            return Err(FundError::Accounting(format!(
                "{} shares exceed total {}",
                shares, self.total
            )));
        }
        if self.total.is_zero() {
            return Ok(U256::ZERO);
        }
        let scaled = pool_balance
            .checked_mul(shares)
            .ok_or_else(|| FundError::Accounting("redemption overflow".to_string()))?;
        Ok(scaled / self.total)
    }

    pub fn credit(&mut self, holder: Address, shares: U256) -> Result<()> {
        if shares.is_zero() {
            return Ok(());
        }
        let entry = self.shares.entry(holder).or_insert(U256::ZERO);
        *entry = entry
            .checked_add(shares)
            .ok_or_else(|| FundError::Accounting("share balance overflow".to_string()))?;
        self.total = self
            .total
            .checked_add(shares)
            .ok_or_else(|| FundError::Accounting("total shares overflow".to_string()))?;
        debug!("Credited {} shares to {} (total {})", shares, holder, self.total);
        Ok(())
    }

    pub fn debit(&mut self, holder: Address, shares: U256) -> Result<()> {
        let available = self.shares_of(holder);
        if shares > available {
            return Err(FundError::InsufficientClaim {
                holder,
                requested: shares,
                available,
            });
        }

        let remaining = available - shares;
        if remaining.is_zero() {
            self.shares.remove(&holder);
        } else {
            self.shares.insert(holder, remaining);
        }
        self.total -= shares;
        debug!("Debited {} shares from {} (total {})", shares, holder, self.total);
        Ok(())
    }

    pub fn shares_of(&self, holder: Address) -> U256 {
        self.shares.get(&holder).copied().unwrap_or_default()
    }

    pub fn total_shares(&self) -> U256 {
        self.total
    }

    pub fn holders(&self) -> impl Iterator<Item = (&Address, &U256)> {
        self.shares.iter()
    }

    /// Holder's share of `pool_balance`, floored.
    pub fn claim_of(&self, holder: Address, pool_balance: U256) -> U256 {
        if self.total.is_zero() {
            return U256::ZERO;
        }
        // shares <= total, so this only overflows for absurd pool balances
        self.shares_of(holder)
            .checked_mul(pool_balance)
            .map(|v| v / self.total)
            .unwrap_or(U256::MAX)
    }

    /// Sum of all holder entries equals the recorded total.
    pub fn is_consistent(&self) -> bool {
        let sum = self
            .shares
            .values()
            .try_fold(U256::ZERO, |acc, s| acc.checked_add(*s));
        sum == Some(self.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> Address {
        Address::repeat_byte(b)
    }

    #[test]
    fn test_first_depositor_one_to_one() {
        let ledger = ShareLedger::default();
        let shares = ledger.shares_for_join(U256::from(1_234u64), U256::ZERO).unwrap();
        assert_eq!(shares, U256::from(1_234u64));
    }

    #[test]
    fn test_proportional_issuance_floors() {
        let mut ledger = ShareLedger::default();
        ledger.credit(addr(1), U256::from(100u64)).unwrap();
        // Pool grew to 300 tokens for 100 shares; 10 new tokens -> 10*100/300 = 3.33 -> 3
        let shares = ledger.shares_for_join(U256::from(10u64), U256::from(300u64)).unwrap();
        assert_eq!(shares, U256::from(3u64));
    }

    #[test]
    fn test_empty_pool_with_shares_is_error() {
        let mut ledger = ShareLedger::default();
        ledger.credit(addr(1), U256::from(5u64)).unwrap();
        assert!(matches!(
            ledger.shares_for_join(U256::from(1u64), U256::ZERO),
            Err(FundError::Accounting(_))
        ));
    }

    #[test]
    fn test_debit_beyond_claim() {
        let mut ledger = ShareLedger::default();
        ledger.credit(addr(1), U256::from(50u64)).unwrap();
        let err = ledger.debit(addr(1), U256::from(51u64)).unwrap_err();
        assert_eq!(
            err,
            FundError::InsufficientClaim {
                holder: addr(1),
                requested: U256::from(51u64),
                available: U256::from(50u64),
            }
        );
        // Unchanged after the failed debit
        assert_eq!(ledger.shares_of(addr(1)), U256::from(50u64));
    }

    #[test]
    fn test_zero_balance_entry_removed() {
        let mut ledger = ShareLedger::default();
        ledger.credit(addr(1), U256::from(7u64)).unwrap();
        ledger.credit(addr(2), U256::from(3u64)).unwrap();
        ledger.debit(addr(1), U256::from(7u64)).unwrap();

        assert_eq!(ledger.holders().count(), 1);
        assert_eq!(ledger.total_shares(), U256::from(3u64));
        assert!(ledger.is_consistent());
    }

    #[test]
    fn test_claims_proportional_and_bounded() {
        let mut ledger = ShareLedger::default();
        ledger.credit(addr(1), U256::from(1u64)).unwrap();
        ledger.credit(addr(2), U256::from(2u64)).unwrap();
        let pool = U256::from(1_000u64);

        let c1 = ledger.claim_of(addr(1), pool);
        let c2 = ledger.claim_of(addr(2), pool);
        assert_eq!(c1, U256::from(333u64));
        assert_eq!(c2, U256::from(666u64));
        assert!(c1 + c2 <= pool);
        assert_eq!(ledger.pool_tokens_for(U256::from(2u64), pool).unwrap(), c2);
    }

    #[test]
    fn test_pool_tokens_for_rejects_excess_shares() {
        let mut ledger = ShareLedger::default();
        ledger.credit(addr(1), U256::from(10u64)).unwrap();
        assert!(ledger.pool_tokens_for(U256::from(11u64), U256::from(100u64)).is_err());
    }

    #[test]
    fn test_direct_token_claim_is_balance() {
        let accounting = ShareAccounting::new(AccountingMode::DirectToken);
        assert_eq!(accounting.claim_of(addr(1), U256::from(42u64)), U256::from(42u64));
        assert!(accounting.ledger().is_none());
    }
}
