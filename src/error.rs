//! Error types
//!
//! `BackendError` is what an external collaborator (exchange, vault, token
//! ledger) reports when a call reverts. `FundError` is what the fund surfaces
//! to its caller; every variant aborts the whole mint/redeem.

use alloy::primitives::{Address, U256};
use thiserror::Error;

/// A reverted call on an external collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("output {actual} below minimum {minimum}")]
    InsufficientOutput { minimum: U256, actual: U256 },

    #[error("{holder} holds {available} of {token}, needs {required}")]
    InsufficientBalance {
        token: Address,
        holder: Address,
        available: U256,
        required: U256,
    },

    #[error("{spender} may move {available} of {token} for {owner}, needs {required}")]
    InsufficientAllowance {
        token: Address,
        owner: Address,
        spender: Address,
        available: U256,
        required: U256,
    },

    #[error("deadline {deadline} passed (now {now})")]
    Expired { deadline: u64, now: u64 },

    #[error("no pool at {0}")]
    UnknownPool(String),

    #[error("invalid swap path: {0}")]
    InvalidPath(String),

    #[error("native transfer to {0} rejected")]
    NativeTransferRejected(Address),

    #[error("arithmetic overflow in {0}")]
    Overflow(&'static str),

    #[error("reverted: {0}")]
    Reverted(String),
}

/// Error taxonomy exposed by the fund.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    SlippageViolation,
    InsufficientBalance,
    InsufficientClaim,
    /// A zero deposit, claim or derived amount.
    InvalidAmount,
    /// Share or pool-token arithmetic the fund cannot reconcile.
    Accounting,
    Authorization,
    Settlement,
    Reentrancy,
    Backend,
}

/// Errors returned by fund operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FundError {
    #[error("no trading pool for {token_in}/{token_out} at fee tier {fee_tier}")]
    PoolNotFound {
        token_in: Address,
        token_out: Address,
        fee_tier: u32,
    },

    #[error("{backend} requires the native asset on the {expected_side} side of {token_in}->{token_out}")]
    UnexpectedAssetSide {
        backend: &'static str,
        expected_side: &'static str,
        token_in: Address,
        token_out: Address,
    },

    #[error("no backend selected for asset {0}")]
    BackendUnset(Address),

    #[error("backend {0} not available in this deployment")]
    BackendUnavailable(String),

    #[error("asset {0} is not part of the basket")]
    UnknownAsset(Address),

    #[error("invalid basis points: {0} (max 10000)")]
    InvalidBasisPoints(u32),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("slippage violation: received {actual}, floor {minimum}")]
    SlippageViolation { minimum: U256, actual: U256 },

    #[error("insufficient balance: {0}")]
    InsufficientBalance(String),

    #[error("insufficient claim for {holder}: requested {requested}, holds {available}")]
    InsufficientClaim {
        holder: Address,
        requested: U256,
        available: U256,
    },

    #[error("amount must be non-zero ({0})")]
    ZeroAmount(&'static str),

    #[error("{0} is not authorized")]
    Unauthorized(Address),

    #[error("reentrant call rejected")]
    Reentrancy,

    #[error("settlement failed: {0}")]
    SettlementFailure(String),

    #[error("accounting error: {0}")]
    Accounting(String),

    #[error("backend call failed: {0}")]
    Backend(BackendError),
}

impl FundError {
    /// Map this error onto the fund's error taxonomy.
    pub fn category(&self) -> ErrorCategory {
        match self {
            FundError::PoolNotFound { .. }
            | FundError::UnexpectedAssetSide { .. }
            | FundError::BackendUnset(_)
            | FundError::BackendUnavailable(_)
            | FundError::UnknownAsset(_)
            | FundError::InvalidBasisPoints(_)
            | FundError::Configuration(_) => ErrorCategory::Configuration,
            FundError::SlippageViolation { .. } => ErrorCategory::SlippageViolation,
            FundError::InsufficientBalance(_) => ErrorCategory::InsufficientBalance,
            FundError::InsufficientClaim { .. } => ErrorCategory::InsufficientClaim,
            FundError::ZeroAmount(_) => ErrorCategory::InvalidAmount,
            FundError::Accounting(_) => ErrorCategory::Accounting,
            FundError::Unauthorized(_) => ErrorCategory::Authorization,
            FundError::SettlementFailure(_) => ErrorCategory::Settlement,
            FundError::Reentrancy => ErrorCategory::Reentrancy,
            FundError::Backend(_) => ErrorCategory::Backend,
        }
    }
}

impl From<BackendError> for FundError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::InsufficientOutput { minimum, actual } => {
                FundError::SlippageViolation { minimum, actual }
            }
            e @ BackendError::InsufficientBalance { .. }
            | e @ BackendError::InsufficientAllowance { .. } => {
                FundError::InsufficientBalance(e.to_string())
            }
            other => FundError::Backend(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, FundError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_output_maps_to_slippage() {
        let err: FundError = BackendError::InsufficientOutput {
            minimum: U256::from(100),
            actual: U256::from(99),
        }
        .into();
        assert_eq!(err.category(), ErrorCategory::SlippageViolation);
        assert!(err.to_string().contains("floor 100"));
    }

    #[test]
    fn test_allowance_maps_to_insufficient_balance() {
        let err: FundError = BackendError::InsufficientAllowance {
            token: Address::ZERO,
            owner: Address::ZERO,
            spender: Address::ZERO,
            available: U256::ZERO,
            required: U256::from(1),
        }
        .into();
        assert_eq!(err.category(), ErrorCategory::InsufficientBalance);
    }

    #[test]
    fn test_other_backend_errors_pass_through() {
        let err: FundError = BackendError::Expired { deadline: 1, now: 2 }.into();
        assert!(matches!(err, FundError::Backend(BackendError::Expired { .. })));
        assert_eq!(err.category(), ErrorCategory::Backend);
    }

    #[test]
    fn test_accounting_and_zero_amount_have_own_classes() {
        let overflow = FundError::Accounting("share issuance overflow".to_string());
        assert_eq!(overflow.category(), ErrorCategory::Accounting);

        let shortfall = FundError::InsufficientClaim {
            holder: Address::ZERO,
            requested: U256::from(2),
            available: U256::from(1),
        };
        assert_eq!(shortfall.category(), ErrorCategory::InsufficientClaim);

        assert_eq!(FundError::ZeroAmount("deposit").category(), ErrorCategory::InvalidAmount);
    }
}
