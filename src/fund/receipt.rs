//! Operation receipts and previews

use alloy::primitives::{Address, U256};

use crate::types::{BackendSelector, SwapBackend};

/// One asset conversion inside a mint or redeem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegReceipt {
    pub asset: Address,
    /// None when the asset is the wrapped native token (wrapped, not swapped)
    pub backend: Option<SwapBackend>,
    pub amount_in: U256,
    pub quoted: U256,
    pub min_out: U256,
    pub amount_out: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintReceipt {
    pub depositor: Address,
    pub deposit: U256,
    pub fee: U256,
    pub net: U256,
    pub per_asset: U256,
    pub legs: Vec<LegReceipt>,
    pub pool_tokens: U256,
    /// Shares (ledger) or pool tokens (direct token) issued
    pub claim_issued: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedeemReceipt {
    pub redeemer: Address,
    pub claim: U256,
    pub pool_tokens: U256,
    /// Exit amounts per asset, fund order
    pub exit_amounts: Vec<U256>,
    pub legs: Vec<LegReceipt>,
    /// Wrapped native gathered before the fee
    pub gross_native: U256,
    pub fee: U256,
    pub payout: U256,
}

/// Quoted expectation for one mint leg.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotePreview {
    pub asset: Address,
    pub selector: BackendSelector,
    pub quoted: U256,
    pub min_out: U256,
}

/// Read-only breakdown of what a mint of `deposit` would do right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintPreview {
    pub deposit: U256,
    pub fee: U256,
    pub net: U256,
    pub per_asset: U256,
    pub quotes: Vec<QuotePreview>,
}
