//! Basket fund scenario runner
//!
//! Builds a simulated market and one fund from a TOML scenario, runs its
//! steps in order and prints the outcome of each plus the final positions.
//! Fund events can be appended to a JSONL file as they happen.
//!
//! Usage:
//!   cargo run -- --scenario scenarios/demo.toml
//!   cargo run -- --scenario scenarios/demo.toml --events data/events.jsonl
//!   RUST_LOG=basket_fund=debug cargo run -- --scenario scenarios/demo.toml

use anyhow::{Context, Result};
use basket_fund::events::JsonlEventWriter;
use basket_fund::sim::scenario::{Scenario, ScenarioReport};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

/// Basket fund scenario runner
#[derive(Parser)]
#[command(name = "basket-fund")]
struct Args {
    /// Scenario file (TOML)
    #[arg(short, long, env = "FUND_SCENARIO", default_value = "scenarios/demo.toml")]
    scenario: PathBuf,

    /// Append fund events to this JSONL file
    #[arg(short, long, env = "FUND_EVENTS")]
    events: Option<PathBuf>,

    /// Log as JSON lines instead of text
    #[arg(long, env = "FUND_LOG_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    dotenv::dotenv().ok();
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if args.json {
        fmt().json().with_env_filter(filter).init();
    } else {
        fmt().with_env_filter(filter).with_target(false).init();
    }

    info!("Scenario file: {}", args.scenario.display());
    let scenario = Scenario::load(&args.scenario)?;

    let writer = args
        .events
        .as_ref()
        .map(JsonlEventWriter::new)
        .transpose()
        .context("Failed to open event log")?;
    if let Some(w) = &writer {
        info!("Writing events to {}", w.path().display());
    }

    let report = match scenario.run(writer.as_ref()).await {
        Ok(report) => report,
        Err(e) => {
            error!("Scenario aborted: {:#}", e);
            return Err(e);
        }
    };

    print_report(&scenario, &report);
    Ok(())
}

fn print_report(scenario: &Scenario, report: &ScenarioReport) {
    println!();
    println!("=== {} ===", if scenario.name.is_empty() { "scenario" } else { &scenario.name });
    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(summary) => println!("  [{:>2}] {:<22} ok    {}", outcome.index, outcome.action, summary),
            Err(reason) => println!("  [{:>2}] {:<22} FAIL  {}", outcome.index, outcome.action, reason),
        }
    }

    println!();
    println!("  {:<12} {:>24} {:>28}", "account", "native", "claim");
    for account in &report.accounts {
        println!("  {:<12} {:>24} {:>28}", account.name, account.native, account.claim);
    }
    println!();
    println!("  total shares:      {}", report.total_shares);
    println!("  pool tokens held:  {}", report.pool_tokens_held);
    println!("  failed steps:      {}/{}", report.failures(), report.outcomes.len());
}
