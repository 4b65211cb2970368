//! decision-replay: run the decision engine over a candle file.
//!
//! The candle file is a JSON document `{"daily": {...}, "weekly": {...}}`
//! where each table is `{"timeframe": "Day1" | "Week1", "bars": [...]}`.
//! Output is JSON on stdout; logs go to stderr.
//!
//! Usage:
//!   cargo run -p decision-replay -- --candles market.json
//!   cargo run -p decision-replay -- --candles market.json --config engine.json
//!   cargo run -p decision-replay -- --candles market.json --at 2024-06-03T00:00:00Z
//!   cargo run -p decision-replay -- --candles market.json --replay --signals-only

use analysis_core::{CandleTable, EngineConfig};
use analysis_orchestrator::DecisionEngine;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct MarketData {
    daily: CandleTable,
    weekly: CandleTable,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "decision_replay=info,analysis_orchestrator=info".into());
    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
}

fn load_config(path: Option<&str>) -> anyhow::Result<EngineConfig> {
    let mut config = match path {
        Some(p) => EngineConfig::from_path(p)?,
        None => EngineConfig::default(),
    };
    config.apply_env_overrides()?;
    Ok(config)
}

fn load_market(path: &Path) -> anyhow::Result<MarketData> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading candles from {}", path.display()))?;
    let market: MarketData = serde_json::from_str(&raw)
        .with_context(|| format!("parsing candles in {}", path.display()))?;
    Ok(market)
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args: Vec<String> = std::env::args().collect();
    let replay = args.iter().any(|a| a == "--replay");
    let signals_only = args.iter().any(|a| a == "--signals-only");

    let candles_path = arg_value(&args, "--candles")
        .context("--candles <file> is required")?;
    let config = load_config(arg_value(&args, "--config")).context("loading engine config")?;
    let market = load_market(Path::new(candles_path))?;

    tracing::info!(
        "Loaded {} daily and {} weekly candles from {}",
        market.daily.len(),
        market.weekly.len(),
        candles_path
    );

    let engine = DecisionEngine::new(config)?;

    if replay {
        let decisions = if signals_only {
            engine.replay_signals(&market.daily, &market.weekly)?
        } else {
            engine.replay(&market.daily, &market.weekly)?
        };
        tracing::info!("Replay produced {} decisions", decisions.len());
        println!("{}", serde_json::to_string_pretty(&decisions)?);
        return Ok(());
    }

    let at: DateTime<Utc> = match arg_value(&args, "--at") {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .with_context(|| format!("invalid --at timestamp {}", raw))?
            .with_timezone(&Utc),
        None => {
            let last = market
                .weekly
                .last()
                .context("weekly table is empty, pass --at explicitly")?;
            last.timestamp + market.weekly.timeframe().duration()
        }
    };

    let daily = market.daily.closed_as_of(at);
    let weekly = market.weekly.closed_as_of(at);
    let decision = engine.decide(&daily, &weekly, at)?;
    println!("{}", serde_json::to_string_pretty(&decision)?);

    Ok(())
}
