//! Swap routing
//!
//! Quote lookup and backend dispatch for converting native currency into
//! basket assets and back.

pub mod approval;
pub mod quote;
pub mod router;

pub use approval::ensure_approval;
pub use quote::QuoteService;
pub use router::{SwapLeg, SwapRouter, DEADLINE_SECS};
