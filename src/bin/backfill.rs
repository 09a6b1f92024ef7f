//! Offline backfill: replay historical readings through the ingestion
//! pipeline and rebuild daily/weekly aggregates and device baselines
//! afterward.
//!
//! Unlike the long-running `insights-engine` process, this is a one-shot
//! operational tool: point it at a file of newline-delimited JSON readings,
//! let it drain, then exit.
//!
//! # Usage
//!
//! ```bash
//! backfill --input readings.jsonl --sled-path ./data/insights-engine.sled
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::io::BufRead;

use insights_engine::clock::ManualClock;
use insights_engine::persistence::{AggregateStore, MemoryStore, SledStore, Store};
use insights_engine::types::Reading;
use insights_engine::{aggregator, ingest, profile_learner};

#[derive(Parser, Debug)]
#[command(name = "backfill", about = "Replay historical readings and rebuild aggregates")]
struct CliArgs {
    /// Path to a file of newline-delimited JSON readings, or `-` for stdin.
    #[arg(long)]
    input: String,

    /// Sled data directory to write into.
    #[arg(long, default_value = "./data/insights-engine.sled")]
    sled_path: String,

    /// Use an in-memory store instead (dry run; nothing is persisted past exit).
    #[arg(long)]
    memory: bool,

    /// Skip the daily/weekly rebuild and baseline recompute pass after replay.
    #[arg(long)]
    skip_rebuild: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")))
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    let store: Box<dyn Store> = if args.memory {
        Box::new(MemoryStore::new())
    } else {
        Box::new(SledStore::open(&args.sled_path).context("failed to open sled store")?)
    };

    let lines: Box<dyn BufRead> = if args.input == "-" {
        Box::new(std::io::BufReader::new(std::io::stdin()))
    } else {
        let file = std::fs::File::open(&args.input).with_context(|| format!("failed to open {}", args.input))?;
        Box::new(std::io::BufReader::new(file))
    };

    let clock = ManualClock::new(0);
    let mut replayed = 0u64;
    let mut failed = 0u64;
    let mut max_timestamp_ms = 0i64;

    for line in lines.lines() {
        let line = line.context("failed to read input line")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let raw: Reading = match serde_json::from_str(line) {
            Ok(r) => r,
            Err(err) => {
                tracing::warn!("skipping malformed line: {}", err);
                failed += 1;
                continue;
            }
        };

        clock.set(raw.timestamp_ms);
        max_timestamp_ms = max_timestamp_ms.max(raw.timestamp_ms);

        match ingest::ingest_reading(store.as_ref(), &clock, raw).await {
            Ok(_) => replayed += 1,
            Err(err) => {
                tracing::error!("failed to ingest reading: {}", err);
                failed += 1;
            }
        }
    }

    tracing::info!("replayed {} readings ({} failed)", replayed, failed);

    if !args.skip_rebuild && replayed > 0 {
        clock.set(max_timestamp_ms);

        let daily = aggregator::compute_daily(store.as_ref(), &clock).await.context("daily rebuild failed")?;
        tracing::info!("rebuilt {} daily aggregates", daily);

        let weekly = aggregator::compute_weekly(store.as_ref(), &clock).await.context("weekly rebuild failed")?;
        tracing::info!("rebuilt {} weekly aggregates", weekly);

        let lookback_ms = 24 * 3_600_000;
        let hardware_ids = AggregateStore::devices_with_hourly_in_range(store.as_ref(), max_timestamp_ms - lookback_ms, max_timestamp_ms)
            .await
            .context("failed to enumerate devices for baseline recompute")?;
        let updated = profile_learner::recompute_baselines(store.as_ref(), &clock, &hardware_ids)
            .await
            .context("baseline recompute failed")?;
        tracing::info!("recomputed baselines for {} devices", updated);
    }

    Ok(())
}
