//! TOML scenarios for the simulated market
//!
//! A scenario describes a market, one fund on top of it, a set of named
//! accounts, and a list of steps (mint, redeem, approve, settings changes)
//! run in order. A failing step is recorded and the run carries on, the
//! same way a rejected call leaves the chain untouched.

use alloy::primitives::{Address, U256};
use anyhow::{anyhow, bail, Context, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use super::{Market, MarketBuilder};
use crate::config::FundConfig;
use crate::events::JsonlEventWriter;
use crate::fees::BasisPoints;
use crate::fund::FundController;
use crate::types::{
    format_units, parse_units, AccountingMode, BackendSelector, RedemptionFloor, UnderlyingAsset, VaultGeneration,
};

const NATIVE_DECIMALS: u8 = 18;

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub name: String,
    pub market: MarketSpec,
    pub fund: FundSpec,
    #[serde(rename = "account", default)]
    pub accounts: Vec<AccountSpec>,
    #[serde(rename = "step", default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketSpec {
    #[serde(default)]
    pub timestamp: Option<u64>,
    #[serde(default)]
    pub weth: Option<Address>,
    #[serde(rename = "token", default)]
    pub tokens: Vec<TokenSpec>,
    #[serde(rename = "gen1_pair", default)]
    pub gen1_pairs: Vec<Gen1PairSpec>,
    #[serde(rename = "gen2_pool", default)]
    pub gen2_pools: Vec<Gen2PoolSpec>,
    pub vault_pool: VaultPoolSpec,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenSpec {
    pub symbol: String,
    pub address: Address,
}

/// Reserves in whole units (18 decimals)
#[derive(Debug, Clone, Deserialize)]
pub struct Gen1PairSpec {
    pub symbol: String,
    pub native_reserve: Decimal,
    pub token_reserve: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Gen2PoolSpec {
    pub symbol: String,
    pub fee: u32,
    /// Tokens per one native
    pub price: Decimal,
    /// Raw liquidity L, as a string (TOML integers stop at i64)
    pub liquidity: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VaultPoolSpec {
    pub tokens: Vec<String>,
    pub weights_bps: Vec<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FundSpec {
    pub address: Address,
    pub vault: VaultGeneration,
    /// Account name
    pub authority: String,
    /// Account name
    pub fee_recipient: String,
    #[serde(default)]
    pub accounting: AccountingMode,
    #[serde(default)]
    pub fee_rate: Option<BasisPoints>,
    #[serde(default)]
    pub slippage_tolerance: Option<BasisPoints>,
    #[serde(default)]
    pub redemption_floor: RedemptionFloor,
    #[serde(rename = "asset")]
    pub assets: Vec<FundAssetSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FundAssetSpec {
    pub symbol: String,
    #[serde(default)]
    pub selector: BackendSelector,
    #[serde(default)]
    pub weight_bps: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountSpec {
    pub name: String,
    pub address: Address,
    /// Starting native balance in whole units
    #[serde(default)]
    pub native: Decimal,
}

/// Redeem size: an explicit claim amount (whole units) or the whole claim.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ClaimAmount {
    All(AllMarker),
    Units(Decimal),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllMarker {
    All,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    Mint { account: String, amount: Decimal },
    Redeem { account: String, amount: ClaimAmount },
    /// Let the fund pull the account's pool tokens (direct-token redeem)
    Approve { account: String },
    SetSlippage { account: String, bps: u32 },
    SetFee { account: String, bps: u32 },
    SetSelector { account: String, symbol: String, selector: BackendSelector },
    SetRedemptionFloor { account: String, floor: RedemptionFloor },
    /// Move the clock forward
    Wait { secs: u64 },
}

impl Step {
    pub fn action(&self) -> &'static str {
        match self {
            Step::Mint { .. } => "mint",
            Step::Redeem { .. } => "redeem",
            Step::Approve { .. } => "approve",
            Step::SetSlippage { .. } => "set_slippage",
            Step::SetFee { .. } => "set_fee",
            Step::SetSelector { .. } => "set_selector",
            Step::SetRedemptionFloor { .. } => "set_redemption_floor",
            Step::Wait { .. } => "wait",
        }
    }
}

/// Result of one step.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub index: usize,
    pub action: &'static str,
    pub result: std::result::Result<String, String>,
}

/// Per-account state at the end of a run.
#[derive(Debug, Clone)]
pub struct AccountReport {
    pub name: String,
    pub native: Decimal,
    pub claim: U256,
}

#[derive(Debug, Clone)]
pub struct ScenarioReport {
    pub outcomes: Vec<StepOutcome>,
    pub accounts: Vec<AccountReport>,
    pub total_shares: U256,
    pub pool_tokens_held: U256,
}

impl ScenarioReport {
    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_err()).count()
    }
}

fn units(amount: Decimal) -> Result<U256> {
    parse_units(amount, NATIVE_DECIMALS).ok_or_else(|| anyhow!("invalid amount {}", amount))
}

impl Scenario {
    /// Load a scenario from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read scenario file: {}", path.as_ref().display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).with_context(|| "Failed to parse scenario TOML")
    }

    pub fn build_market(&self) -> Result<Market> {
        let spec = &self.market;
        let mut builder = MarketBuilder::new();
        if let Some(weth) = spec.weth {
            builder = builder.weth(weth);
        }
        if let Some(ts) = spec.timestamp {
            builder = builder.timestamp(ts);
        }
        for token in &spec.tokens {
            builder = builder.token(&token.symbol, token.address);
        }
        for pair in &spec.gen1_pairs {
            builder = builder.gen1_pair(&pair.symbol, units(pair.native_reserve)?, units(pair.token_reserve)?);
        }
        for pool in &spec.gen2_pools {
            let liquidity = pool
                .liquidity
                .trunc()
                .to_u128()
                .ok_or_else(|| anyhow!("invalid liquidity {} for {}", pool.liquidity, pool.symbol))?;
            builder = builder.gen2_pool(&pool.symbol, pool.fee, pool.price, liquidity);
        }
        let symbols: Vec<&str> = spec.vault_pool.tokens.iter().map(String::as_str).collect();
        builder = builder.vault_pool(&symbols, &spec.vault_pool.weights_bps);

        let market = builder.build();
        for symbol in &spec.vault_pool.tokens {
            if market.token(symbol).is_zero() {
                bail!("vault pool token {} is not declared", symbol);
            }
        }
        Ok(market)
    }

    fn account(&self, name: &str) -> Result<Address> {
        self.accounts
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.address)
            .ok_or_else(|| anyhow!("unknown account {}", name))
    }

    pub fn fund_config(&self, market: &Market) -> Result<FundConfig> {
        let spec = &self.fund;
        let assets = spec
            .assets
            .iter()
            .map(|a| {
                let token = market.token(&a.symbol);
                if token.is_zero() {
                    bail!("fund asset {} is not declared", a.symbol);
                }
                Ok(UnderlyingAsset::new(token, &a.symbol, a.selector).with_weight(a.weight_bps))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut config = market.fund_config(
            spec.vault,
            spec.address,
            self.account(&spec.authority)?,
            self.account(&spec.fee_recipient)?,
            assets,
        );
        config.accounting = spec.accounting;
        config.redemption_floor = spec.redemption_floor;
        if let Some(fee) = spec.fee_rate {
            config.fee_rate = fee;
        }
        if let Some(slippage) = spec.slippage_tolerance {
            config.slippage_tolerance = slippage;
        }
        config.validate().context("Invalid fund section")?;
        Ok(config)
    }

    /// Build everything and run the steps. Configuration problems are
    /// errors; step failures are recorded in the report.
    pub async fn run(&self, events: Option<&JsonlEventWriter>) -> Result<ScenarioReport> {
        let market = self.build_market()?;
        let config = self.fund_config(&market)?;
        let fund = Arc::new(
            FundController::new(config, market.venues(self.fund.vault))
                .await
                .context("Failed to set up fund")?,
        );

        for account in &self.accounts {
            market.chain.set_native_balance(account.address, units(account.native)?);
        }

        info!("Running scenario '{}': {} steps", self.name, self.steps.len());

        let mut outcomes = Vec::with_capacity(self.steps.len());
        let mut emitted = 0;
        for (index, step) in self.steps.iter().enumerate() {
            let result = self.run_step(&market, &fund, step).await;
            match &result {
                Ok(summary) => info!("Step {} {}: {}", index, step.action(), summary),
                Err(reason) => warn!("Step {} {} failed: {}", index, step.action(), reason),
            }
            outcomes.push(StepOutcome {
                index,
                action: step.action(),
                result,
            });

            let fresh = fund.events().since(emitted);
            emitted += fresh.len();
            if let Some(writer) = events {
                writer.write_all(&fresh)?;
            }
        }

        let mut accounts = Vec::with_capacity(self.accounts.len());
        for account in &self.accounts {
            accounts.push(AccountReport {
                name: account.name.clone(),
                native: format_units(market.chain.native_of(account.address), NATIVE_DECIMALS),
                claim: fund.claim_of(account.address).await?,
            });
        }

        Ok(ScenarioReport {
            outcomes,
            accounts,
            total_shares: fund.total_shares().await,
            pool_tokens_held: market.chain.balance(fund.pool_token(), fund.address()),
        })
    }

    async fn run_step(
        &self,
        market: &Market,
        fund: &FundController,
        step: &Step,
    ) -> std::result::Result<String, String> {
        let who = |name: &str| self.account(name).map_err(|e| e.to_string());
        let text = |e: crate::error::FundError| e.to_string();

        match step {
            Step::Mint { account, amount } => {
                let caller = who(account)?;
                let deposit = units(*amount).map_err(|e| e.to_string())?;
                let receipt = fund.mint(caller, deposit).await.map_err(text)?;
                Ok(format!(
                    "{} deposited {} -> {} pool tokens, claim {}",
                    account,
                    amount,
                    receipt.pool_tokens,
                    receipt.claim_issued
                ))
            }
            Step::Redeem { account, amount } => {
                let caller = who(account)?;
                let claim = match amount {
                    ClaimAmount::All(_) => match fund.accounting_mode().await {
                        AccountingMode::Ledger => fund.shares_of(caller).await,
                        AccountingMode::DirectToken => market.chain.balance(fund.pool_token(), caller),
                    },
                    ClaimAmount::Units(units_) => units(*units_).map_err(|e| e.to_string())?,
                };
                let receipt = fund.redeem(caller, claim).await.map_err(text)?;
                Ok(format!(
                    "{} redeemed claim {} -> paid {} native (fee {})",
                    account,
                    claim,
                    format_units(receipt.payout, NATIVE_DECIMALS),
                    format_units(receipt.fee, NATIVE_DECIMALS)
                ))
            }
            Step::Approve { account } => {
                let owner = who(account)?;
                market
                    .chain
                    .approve_now(fund.pool_token(), owner, fund.address(), U256::MAX);
                Ok(format!("{} approved the fund for pool tokens", account))
            }
            Step::SetSlippage { account, bps } => {
                fund.set_slippage_tolerance(who(account)?, *bps).await.map_err(text)?;
                Ok(format!("slippage tolerance now {}bp", bps))
            }
            Step::SetFee { account, bps } => {
                fund.set_fee_rate(who(account)?, *bps).await.map_err(text)?;
                Ok(format!("fee rate now {}bp", bps))
            }
            Step::SetSelector { account, symbol, selector } => {
                let asset = market.token(symbol);
                fund.set_backend_selector(who(account)?, asset, *selector)
                    .await
                    .map_err(text)?;
                Ok(format!("{} now routes via {}", symbol, selector))
            }
            Step::SetRedemptionFloor { account, floor } => {
                fund.set_redemption_floor(who(account)?, *floor).await.map_err(text)?;
                Ok(format!("redemption floor now {}", floor))
            }
            Step::Wait { secs } => {
                market.chain.advance_time(*secs);
                Ok(format!("advanced {}s", secs))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = r#"
name = "round trip"

[market]

[[market.token]]
symbol = "AAA"
address = "0x2020202020202020202020202020202020202020"

[[market.token]]
symbol = "BBB"
address = "0x3030303030303030303030303030303030303030"

[[market.gen1_pair]]
symbol = "AAA"
native_reserve = "1000"
token_reserve = "2000000"

[[market.gen2_pool]]
symbol = "BBB"
fee = 3000
price = "50"
liquidity = "1000000000000000000000000"

[market.vault_pool]
tokens = ["AAA", "BBB"]
weights_bps = [5000, 5000]

[fund]
address = "0x00000000000000000000000000000000000000f0"
vault = "A"
authority = "admin"
fee_recipient = "treasury"

[[fund.asset]]
symbol = "AAA"
selector = "pairwise_gen1"

[[fund.asset]]
symbol = "BBB"
selector = "pairwise_gen2_tier_a"

[[account]]
name = "alice"
address = "0x00000000000000000000000000000000000000a0"
native = "10"

[[account]]
name = "admin"
address = "0x00000000000000000000000000000000000000a1"

[[account]]
name = "treasury"
address = "0x00000000000000000000000000000000000000fe"

[[step]]
action = "mint"
account = "alice"
amount = "1"

[[step]]
action = "set_fee"
account = "alice"
bps = 100

[[step]]
action = "redeem"
account = "alice"
amount = "all"
"#;

    #[test]
    fn test_parse_steps() {
        let scenario = Scenario::parse(SCENARIO).unwrap();
        assert_eq!(scenario.steps.len(), 3);
        assert!(matches!(
            scenario.steps[2],
            Step::Redeem {
                amount: ClaimAmount::All(AllMarker::All),
                ..
            }
        ));
        assert_eq!(scenario.fund.assets[1].selector, BackendSelector::PairwiseGen2TierA);
    }

    #[tokio::test]
    async fn test_run_records_failures_and_continues() {
        let scenario = Scenario::parse(SCENARIO).unwrap();
        let report = scenario.run(None).await.unwrap();

        assert_eq!(report.outcomes.len(), 3);
        assert!(report.outcomes[0].result.is_ok());
        // alice is not the authority
        assert!(report.outcomes[1].result.is_err());
        assert!(report.outcomes[2].result.is_ok());
        assert_eq!(report.failures(), 1);
        assert_eq!(report.total_shares, U256::ZERO);

        let alice = report.accounts.iter().find(|a| a.name == "alice").unwrap();
        assert!(alice.native > Decimal::from(9) + Decimal::new(97, 2));
    }
}
