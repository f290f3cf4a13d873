//! Basket Fund Library
//!
//! A fund that takes a native-currency deposit, buys an equal slice of each
//! basket asset on a pairwise exchange, joins a pooled-liquidity vault with
//! the result, and records the depositor's claim. Redeem runs the same path
//! backwards.
//!
//! External venues are reached through the traits in [`interfaces`]; the
//! [`sim`] module provides an in-memory market implementing all of them.

pub mod accounting;
pub mod config;
pub mod contracts;
pub mod error;
pub mod events;
pub mod fees;
pub mod fund;
pub mod interfaces;
pub mod liquidity;
pub mod routing;
pub mod sim;
pub mod types;

// Re-export commonly used types
pub use accounting::{ShareAccounting, ShareLedger};
pub use config::{FundConfig, VaultConfig};
pub use error::{BackendError, ErrorCategory, FundError};
pub use events::{EventLog, FundEvent, JsonlEventWriter};
pub use fees::{BasisPoints, FeeEngine};
pub use fund::{FundController, MintReceipt, RedeemReceipt};
pub use interfaces::{VaultHandle, Venues};
pub use types::{
    AccountingMode, BackendSelector, RedemptionFloor, SwapBackend, UnderlyingAsset, VaultGeneration,
};
