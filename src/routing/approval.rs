//! Approve-on-demand
//!
//! Grants a spender an unlimited allowance the first time the current one
//! is too small, so repeated swaps and joins don't pay for approvals again.

use alloy::primitives::{Address, U256};
use tracing::{debug, info};

use crate::error::Result;
use crate::interfaces::TokenLedger;

/// Ensure `spender` may move at least `amount` of `token` for `owner`.
/// Returns true if a new approval was granted.
pub async fn ensure_approval(
    tokens: &dyn TokenLedger,
    token: Address,
    owner: Address,
    spender: Address,
    amount: U256,
) -> Result<bool> {
    let allowance = tokens.allowance(token, owner, spender).await?;

    if allowance >= amount {
        debug!("Sufficient allowance: {} >= {}", allowance, amount);
        return Ok(false);
    }

    // Approve max uint256 for future calls
    info!("Approving {} for spender {}", token, spender);
    tokens.approve(token, owner, spender, U256::MAX).await?;
    Ok(true)
}
