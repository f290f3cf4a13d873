//! Fund controller
//!
//! Orchestrates mint and redeem end to end:
//!   deposit -> fee -> even split -> quote + swap per asset -> pool join -> claim
//!   claim -> pool exit -> swap back to wrapped native -> fee -> unwrap -> payout
//!
//! Every operation is one unit of work. The reentrancy guard is taken first,
//! then a chain checkpoint and an accounting snapshot; any error reverts both
//! and nothing is emitted. No lock on fund state is held across a call into
//! a venue, so a venue calling back in sees the state as of that moment.

mod guard;
mod receipt;
mod settings;


pub use guard::{GuardLock, ReentrancyGuard};
pub use receipt::{LegReceipt, MintPreview, MintReceipt, QuotePreview, RedeemReceipt};
pub use settings::FundSettings;

use alloy::primitives::{Address, U256};
use futures::future::try_join_all;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::accounting::ShareAccounting;
use crate::config::FundConfig;
use crate::error::{FundError, Result};
use crate::events::{EventLog, FundEvent};
use crate::fees::{min_amount_out, BasisPoints, FeeEngine};
use crate::interfaces::{VaultHandle, Venues};
use crate::liquidity::{self, LiquidityPoolAdapter};
use crate::routing::{QuoteService, SwapLeg, SwapRouter};
use crate::types::{
    format_units, AccountingMode, BackendSelector, RedemptionFloor, SwapBackend, SwapDirection, VaultGeneration,
};

/// Native currency decimals, for log output
const NATIVE_DECIMALS: u8 = 18;

pub struct FundController {
    config: FundConfig,
    venues: Venues,
    quotes: QuoteService,
    router: SwapRouter,
    pool: Arc<dyn LiquidityPoolAdapter>,
    guard: ReentrancyGuard,
    settings: RwLock<FundSettings>,
    accounting: RwLock<ShareAccounting>,
    events: EventLog,
}

fn settlement(err: impl std::fmt::Display) -> FundError {
    FundError::SettlementFailure(err.to_string())
}

impl FundController {
    /// Wire a fund to its venues. Fails on any mismatch between the
    /// configuration and the supplied collaborators.
    pub async fn new(config: FundConfig, venues: Venues) -> Result<Self> {
        config.validate()?;
        Self::check_venues(&config, &venues)?;

        let pool = liquidity::connect(&venues.vault, venues.tokens.clone(), &config.asset_tokens()).await?;

        let quotes = QuoteService::new(
            config.native,
            config.quote_fee_tier(),
            venues.gen1.clone(),
            venues.gen2.clone(),
        );
        let router = SwapRouter::new(
            config.address,
            config.native,
            venues.tokens.clone(),
            venues.chain.clone(),
            venues.gen1.clone(),
            venues.gen2.clone(),
        );

        let weights = config.total_weight_bps();
        if weights != 0 {
            // Stored and reported only; the mint split stays even
            debug!("Target weights sum to {} bps (not enforced)", weights);
        }

        info!(
            "Fund {} ready: {} assets, {}, {:?} accounting, fee {}, slippage {}",
            config.address,
            config.assets.len(),
            pool.generation(),
            config.accounting,
            config.fee_rate,
            config.slippage_tolerance
        );

        Ok(Self {
            settings: RwLock::new(FundSettings::from_config(&config)),
            accounting: RwLock::new(ShareAccounting::new(config.accounting)),
            config,
            venues,
            quotes,
            router,
            pool,
            guard: ReentrancyGuard::new(),
            events: EventLog::new(),
        })
    }

    fn check_venues(config: &FundConfig, venues: &Venues) -> Result<()> {
        let mismatch = |what: &str| FundError::Configuration(format!("{} does not match the configured venue", what));

        if venues.native.wrapped() != config.native {
            return Err(mismatch("wrapped native token"));
        }
        if venues.vault.generation() != config.vault.generation || venues.vault.address() != config.vault.address {
            return Err(mismatch("vault"));
        }
        match &venues.vault {
            VaultHandle::A { pool_id, .. } if config.vault.pool_id != Some(*pool_id) => {
                return Err(mismatch("vault-A pool id"));
            }
            VaultHandle::B { pool, .. } if config.vault.pool != Some(*pool) => {
                return Err(mismatch("vault-B pool"));
            }
            _ => {}
        }

        if let Some(expected) = config.gen1_exchange {
            let gen1 = venues
                .gen1
                .as_ref()
                .ok_or_else(|| FundError::BackendUnavailable("gen1".to_string()))?;
            if gen1.address() != expected {
                return Err(mismatch("gen1 exchange"));
            }
        }
        if let Some(expected) = config.gen2_exchange {
            let gen2 = venues
                .gen2
                .as_ref()
                .ok_or_else(|| FundError::BackendUnavailable("gen2".to_string()))?;
            if gen2.address() != expected {
                return Err(mismatch("gen2 exchange"));
            }
        }
        Ok(())
    }

    // ── Exposed operations ───────────────────────────────────────────

    /// Deposit `deposit` raw native from `caller` and issue a claim.
    pub async fn mint(&self, caller: Address, deposit: U256) -> Result<MintReceipt> {
        let _lock = self.guard.enter()?;
        if deposit.is_zero() {
            return Err(FundError::ZeroAmount("deposit"));
        }

        let checkpoint = self.venues.chain.checkpoint();
        let snapshot = self.accounting.read().await.clone();

        match self.mint_inner(caller, deposit).await {
            Ok(receipt) => {
                self.venues.chain.commit(checkpoint);
                info!(
                    "Minted: {} deposited {} native, fee {}, {} pool tokens, claim {}",
                    caller,
                    format_units(deposit, NATIVE_DECIMALS),
                    format_units(receipt.fee, NATIVE_DECIMALS),
                    receipt.pool_tokens,
                    receipt.claim_issued
                );
                self.events.push(FundEvent::Minted {
                    depositor: caller,
                    gross_deposit: deposit,
                    net_deposit: receipt.net,
                    fee: receipt.fee,
                    pool_tokens: receipt.pool_tokens,
                    claim_issued: receipt.claim_issued,
                    vault: self.pool.generation(),
                });
                Ok(receipt)
            }
            Err(e) => {
                self.venues.chain.revert_to(checkpoint);
                *self.accounting.write().await = snapshot;
                warn!("Mint by {} of {} reverted: {}", caller, deposit, e);
                Err(e)
            }
        }
    }

    /// Burn `claim` (shares or pool tokens) from `caller` and pay out native.
    pub async fn redeem(&self, caller: Address, claim: U256) -> Result<RedeemReceipt> {
        let _lock = self.guard.enter()?;
        if claim.is_zero() {
            return Err(FundError::ZeroAmount("claim"));
        }

        let checkpoint = self.venues.chain.checkpoint();
        let snapshot = self.accounting.read().await.clone();

        match self.redeem_inner(caller, claim).await {
            Ok(receipt) => {
                self.venues.chain.commit(checkpoint);
                info!(
                    "Redeemed: {} burned claim {} ({} pool tokens), paid {} native, fee {}",
                    caller,
                    claim,
                    receipt.pool_tokens,
                    format_units(receipt.payout, NATIVE_DECIMALS),
                    format_units(receipt.fee, NATIVE_DECIMALS)
                );
                self.events.push(FundEvent::Redeemed {
                    redeemer: caller,
                    claim_burned: claim,
                    pool_tokens: receipt.pool_tokens,
                    gross_native: receipt.gross_native,
                    fee: receipt.fee,
                    payout: receipt.payout,
                });
                Ok(receipt)
            }
            Err(e) => {
                self.venues.chain.revert_to(checkpoint);
                *self.accounting.write().await = snapshot;
                warn!("Redeem by {} of {} reverted: {}", caller, claim, e);
                Err(e)
            }
        }
    }

    /// What a mint of `deposit` would do at current prices. Changes nothing.
    pub async fn preview_mint(&self, deposit: U256) -> Result<MintPreview> {
        if deposit.is_zero() {
            return Err(FundError::ZeroAmount("deposit"));
        }
        let settings = self.settings.read().await.clone();
        let split = FeeEngine::take(deposit, settings.fee_rate);
        let per_asset = self.per_asset(split.net)?;
        let quotes = self.quote_legs(per_asset, &settings).await?;

        Ok(MintPreview {
            deposit,
            fee: split.fee,
            net: split.net,
            per_asset,
            quotes,
        })
    }

    // ── Authorized setters ───────────────────────────────────────────

    pub async fn set_slippage_tolerance(&self, caller: Address, bps: u32) -> Result<()> {
        self.authorize(caller)?;
        let new = BasisPoints::new(bps)?;
        let old = std::mem::replace(&mut self.settings.write().await.slippage_tolerance, new);

        info!("Slippage tolerance {} -> {}", old, new);
        self.events.push(FundEvent::SlippageToleranceUpdated { old, new });
        Ok(())
    }

    pub async fn set_fee_rate(&self, caller: Address, bps: u32) -> Result<()> {
        self.authorize(caller)?;
        let new = BasisPoints::new(bps)?;
        let old = std::mem::replace(&mut self.settings.write().await.fee_rate, new);

        info!("Fee rate {} -> {}", old, new);
        self.events.push(FundEvent::FeeRateUpdated { old, new });
        Ok(())
    }

    pub async fn set_backend_selector(&self, caller: Address, asset: Address, selector: BackendSelector) -> Result<()> {
        self.authorize(caller)?;
        if self.config.asset(asset).is_none() {
            return Err(FundError::UnknownAsset(asset));
        }
        let old = self.settings.write().await.set_selector(asset, selector);

        info!("Backend selector for {}: {} -> {}", asset, old, selector);
        self.events.push(FundEvent::BackendSelectorUpdated {
            asset,
            old,
            new: selector,
        });
        Ok(())
    }

    pub async fn set_redemption_floor(&self, caller: Address, floor: RedemptionFloor) -> Result<()> {
        self.authorize(caller)?;
        let old = std::mem::replace(&mut self.settings.write().await.redemption_floor, floor);

        info!("Redemption floor {} -> {}", old, floor);
        self.events.push(FundEvent::RedemptionFloorUpdated { old, new: floor });
        Ok(())
    }

    fn authorize(&self, caller: Address) -> Result<()> {
        if caller != self.config.authority {
            warn!("Rejected settings change from {}", caller);
            return Err(FundError::Unauthorized(caller));
        }
        Ok(())
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn config(&self) -> &FundConfig {
        &self.config
    }

    pub fn address(&self) -> Address {
        self.config.address
    }

    pub fn pool_token(&self) -> Address {
        self.pool.pool_token()
    }

    pub fn vault_generation(&self) -> VaultGeneration {
        self.pool.generation()
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub async fn settings(&self) -> FundSettings {
        self.settings.read().await.clone()
    }

    pub async fn slippage_tolerance(&self) -> BasisPoints {
        self.settings.read().await.slippage_tolerance
    }

    pub async fn fee_rate(&self) -> BasisPoints {
        self.settings.read().await.fee_rate
    }

    pub async fn redemption_floor(&self) -> RedemptionFloor {
        self.settings.read().await.redemption_floor
    }

    pub async fn backend_selector(&self, asset: Address) -> BackendSelector {
        self.settings.read().await.selector(asset)
    }

    pub async fn accounting_mode(&self) -> AccountingMode {
        self.accounting.read().await.mode()
    }

    /// Holder's claim on pool tokens, under the active accounting strategy.
    pub async fn claim_of(&self, holder: Address) -> Result<U256> {
        let mode = self.accounting_mode().await;
        let balance_holder = match mode {
            AccountingMode::DirectToken => holder,
            AccountingMode::Ledger => self.config.address,
        };
        let balance = self.venues.tokens.balance_of(self.pool.pool_token(), balance_holder).await?;
        Ok(self.accounting.read().await.claim_of(holder, balance))
    }

    /// Ledger shares of `holder` (zero under direct-token accounting)
    pub async fn shares_of(&self, holder: Address) -> U256 {
        self.accounting
            .read()
            .await
            .ledger()
            .map(|l| l.shares_of(holder))
            .unwrap_or_default()
    }

    pub async fn total_shares(&self) -> U256 {
        self.accounting
            .read()
            .await
            .ledger()
            .map(|l| l.total_shares())
            .unwrap_or_default()
    }

    /// Snapshot of the accounting state
    pub async fn accounting(&self) -> ShareAccounting {
        self.accounting.read().await.clone()
    }

    // ── Internals ────────────────────────────────────────────────────

    fn per_asset(&self, net: U256) -> Result<U256> {
        // Remainder of the floor division stays with the fund
        let per_asset = net / U256::from(self.config.assets.len());
        if per_asset.is_zero() {
            return Err(FundError::ZeroAmount("per-asset amount"));
        }
        Ok(per_asset)
    }

    fn resolve_backend(&self, asset: Address, selector: BackendSelector) -> Result<SwapBackend> {
        selector
            .backend(&self.config.fee_tiers)
            .ok_or(FundError::BackendUnset(asset))
    }

    /// Quote every asset leg of a mint concurrently.
    async fn quote_legs(&self, per_asset: U256, settings: &FundSettings) -> Result<Vec<QuotePreview>> {
        let native = self.config.native;
        let slippage = settings.slippage_tolerance;

        let quotes = self.config.assets.iter().map(|asset| {
            let selector = settings.selector(asset.token);
            async move {
                if asset.token == native {
                    return Ok(QuotePreview {
                        asset: asset.token,
                        selector,
                        quoted: per_asset,
                        min_out: per_asset,
                    });
                }
                let quoted = self.quotes.quote(native, asset.token, per_asset, selector).await?;
                Ok::<_, FundError>(QuotePreview {
                    asset: asset.token,
                    selector,
                    quoted,
                    min_out: min_amount_out(quoted, slippage),
                })
            }
        });

        try_join_all(quotes).await
    }

    async fn mint_inner(&self, caller: Address, deposit: U256) -> Result<MintReceipt> {
        let settings = self.settings.read().await.clone();
        let fund = self.config.address;
        let native = self.config.native;

        // Pull the attached value
        self.venues.native.send_native(caller, fund, deposit).await?;

        let split = FeeEngine::take(deposit, settings.fee_rate);
        let per_asset = self.per_asset(split.net)?;
        debug!(
            "Mint split: net {} fee {} -> {} per asset",
            split.net, split.fee, per_asset
        );

        let quotes = self.quote_legs(per_asset, &settings).await?;

        let mut legs = Vec::with_capacity(quotes.len());
        for quote in quotes {
            if quote.asset == native {
                self.venues.native.wrap(fund, per_asset).await?;
                legs.push(LegReceipt {
                    asset: quote.asset,
                    backend: None,
                    amount_in: per_asset,
                    quoted: quote.quoted,
                    min_out: quote.min_out,
                    amount_out: per_asset,
                });
                continue;
            }

            let backend = self.resolve_backend(quote.asset, quote.selector)?;
            let leg = SwapLeg {
                token_in: native,
                token_out: quote.asset,
                amount_in: per_asset,
                min_amount_out: quote.min_out,
                direction: SwapDirection::NativeIn,
            };
            let amount_out = self.router.swap(leg, backend).await?;
            legs.push(LegReceipt {
                asset: quote.asset,
                backend: Some(backend),
                amount_in: per_asset,
                quoted: quote.quoted,
                min_out: quote.min_out,
                amount_out,
            });
        }

        let amounts: Vec<U256> = legs.iter().map(|l| l.amount_out).collect();
        let pool_balance_before = self.venues.tokens.balance_of(self.pool.pool_token(), fund).await?;
        let pool_tokens = self.pool.join(fund, &amounts).await?;
        if pool_tokens.is_zero() {
            return Err(FundError::ZeroAmount("pool tokens received"));
        }

        let claim_issued = self.issue_claim(caller, pool_tokens, pool_balance_before).await?;

        if !split.fee.is_zero() {
            self.venues
                .native
                .send_native(fund, self.config.fee_recipient, split.fee)
                .await
                .map_err(settlement)?;
        }

        Ok(MintReceipt {
            depositor: caller,
            deposit,
            fee: split.fee,
            net: split.net,
            per_asset,
            legs,
            pool_tokens,
            claim_issued,
        })
    }

    async fn issue_claim(&self, holder: Address, pool_tokens: U256, pool_balance_before: U256) -> Result<U256> {
        match self.accounting_mode().await {
            AccountingMode::DirectToken => {
                self.venues
                    .tokens
                    .transfer(self.pool.pool_token(), self.config.address, holder, pool_tokens)
                    .await
                    .map_err(settlement)?;
                Ok(pool_tokens)
            }
            AccountingMode::Ledger => {
                let mut accounting = self.accounting.write().await;
                let ledger = accounting
                    .ledger_mut()
                    .ok_or_else(|| FundError::Accounting("ledger missing".to_string()))?;
                let shares = ledger.shares_for_join(pool_tokens, pool_balance_before)?;
                if shares.is_zero() {
                    return Err(FundError::ZeroAmount("shares issued"));
                }
                ledger.credit(holder, shares)?;
                Ok(shares)
            }
        }
    }

    /// Take the caller's claim and return the pool tokens it is worth.
    /// Ledger shares are debited here, before any venue is called.
    async fn surrender_claim(&self, caller: Address, claim: U256) -> Result<U256> {
        let fund = self.config.address;
        let pool_token = self.pool.pool_token();

        match self.accounting_mode().await {
            AccountingMode::DirectToken => {
                self.venues
                    .tokens
                    .transfer_from(pool_token, fund, caller, fund, claim)
                    .await?;
                Ok(claim)
            }
            AccountingMode::Ledger => {
                let pool_balance = self.venues.tokens.balance_of(pool_token, fund).await?;
                let mut accounting = self.accounting.write().await;
                let ledger = accounting
                    .ledger_mut()
                    .ok_or_else(|| FundError::Accounting("ledger missing".to_string()))?;

                let available = ledger.shares_of(caller);
                if claim > available {
                    return Err(FundError::InsufficientClaim {
                        holder: caller,
                        requested: claim,
                        available,
                    });
                }
                // Priced against the totals before the burn
                let pool_tokens = ledger.pool_tokens_for(claim, pool_balance)?;
                ledger.debit(caller, claim)?;
                Ok(pool_tokens)
            }
        }
    }

    async fn redeem_inner(&self, caller: Address, claim: U256) -> Result<RedeemReceipt> {
        let settings = self.settings.read().await.clone();
        let fund = self.config.address;
        let native = self.config.native;

        let pool_tokens = self.surrender_claim(caller, claim).await?;
        if pool_tokens.is_zero() {
            return Err(FundError::ZeroAmount("pool tokens to redeem"));
        }

        let exit_amounts = self.pool.exit(fund, pool_tokens).await?;

        let mut legs = Vec::with_capacity(exit_amounts.len());
        let mut gross_native = U256::ZERO;
        for (asset, &amount) in self.config.assets.iter().zip(&exit_amounts) {
            if asset.token == native {
                gross_native += amount;
                continue;
            }
            if amount.is_zero() {
                continue;
            }

            let mut leg = SwapLeg {
                token_in: asset.token,
                token_out: native,
                amount_in: amount,
                min_amount_out: U256::ZERO,
                direction: SwapDirection::NativeOut,
            };
            let selector = settings.selector(leg.selector_key());
            let backend = self.resolve_backend(leg.selector_key(), selector)?;
            let quoted = match settings.redemption_floor {
                RedemptionFloor::Zero => U256::ZERO,
                RedemptionFloor::Quoted => {
                    let quoted = self.quotes.quote(leg.token_in, native, amount, selector).await?;
                    leg.min_amount_out = min_amount_out(quoted, settings.slippage_tolerance);
                    quoted
                }
            };

            let amount_out = self.router.swap(leg, backend).await?;
            gross_native += amount_out;
            legs.push(LegReceipt {
                asset: asset.token,
                backend: Some(backend),
                amount_in: amount,
                quoted,
                min_out: leg.min_amount_out,
                amount_out,
            });
        }

        let split = FeeEngine::take(gross_native, settings.fee_rate);
        debug!("Redeem gathered {} wrapped native: net {} fee {}", gross_native, split.net, split.fee);

        let mut payout = U256::ZERO;
        if !split.net.is_zero() {
            payout = self.venues.native.unwrap(fund, split.net).await?;
            self.venues
                .native
                .send_native(fund, caller, payout)
                .await
                .map_err(settlement)?;
        }
        if !split.fee.is_zero() {
            self.venues
                .tokens
                .transfer(native, fund, self.config.fee_recipient, split.fee)
                .await
                .map_err(settlement)?;
        }

        Ok(RedeemReceipt {
            redeemer: caller,
            claim,
            pool_tokens,
            exit_amounts,
            legs,
            gross_native,
            fee: split.fee,
            payout,
        })
    }
}
