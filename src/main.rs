//! Plant telemetry insight engine — process entry point.
//!
//! Wires configuration, the persistence backend, and the worker set, then
//! runs the ingestion loop and the time-based schedulers under a
//! [`JoinSet`] supervisor until asked to shut down.
//!
//! # Usage
//!
//! ```bash
//! # Stream newline-delimited JSON readings from stdin
//! generate-readings | insights-engine --stdin
//!
//! # Local development against the in-memory backend
//! insights-engine --stdin --memory
//! ```
//!
//! # Environment Variables
//!
//! - `INSIGHTS_CONFIG`: path to a TOML config file (see `insights_engine::config`)
//! - `LLM_API_KEY`: LLM provider API key; absent means degraded-mode insights
//! - `RUST_LOG`: logging verbosity (default: info)

use anyhow::{Context, Result};
use chrono::{Datelike, Timelike, Utc};
use clap::Parser;
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use insights_engine::clock::{Clock, SystemClock};
use insights_engine::config::{self, defaults, EngineConfig};
use insights_engine::persistence::{MemoryStore, SledStore, Store};
use insights_engine::types::Reading;
use insights_engine::{aggregator, ingest, insight, profile_learner, rollup};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "insights-engine", about = "Plant telemetry ingestion and insight pipeline")]
struct CliArgs {
    /// Read newline-delimited JSON readings from stdin.
    #[arg(long)]
    stdin: bool,

    /// Use the in-memory persistence backend instead of sled. Useful for
    /// local development; state does not survive a restart.
    #[arg(long)]
    memory: bool,

    /// Wipe the sled data directory before starting.
    #[arg(long)]
    reset_db: bool,

    /// Emit JSON-formatted logs instead of the default human-readable format.
    #[arg(long)]
    json_logs: bool,
}

fn should_reset_db(cli_flag: bool) -> bool {
    cli_flag || std::env::var("RESET_DB").map(|v| v == "true").unwrap_or(false)
}

fn reset_data_directory(sled_path: &str) -> Result<()> {
    let path = std::path::Path::new(sled_path);
    if path.exists() {
        warn!("RESET_DB is set: removing {}", sled_path);
        std::fs::remove_dir_all(path).with_context(|| format!("failed to remove data directory {sled_path}"))?;
    }
    Ok(())
}

/// Name of a supervised background task, for logging when the supervisor
/// loop reports a task's completion or failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskName {
    Ingestion,
    DailyRollup,
    WeeklyRollup,
    InsightScheduler,
    InsightGenerator,
}

impl fmt::Display for TaskName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskName::Ingestion => "Ingestion",
            TaskName::DailyRollup => "DailyRollup",
            TaskName::WeeklyRollup => "WeeklyRollup",
            TaskName::InsightScheduler => "InsightScheduler",
            TaskName::InsightGenerator => "InsightGenerator",
        };
        write!(f, "{name}")
    }
}

/// Milliseconds until the next UTC occurrence of `hour:minute`, at least one
/// second away (so a process started exactly on the boundary doesn't fire
/// twice).
fn millis_until_next_utc(hour: u32, minute: u32) -> i64 {
    let now = Utc::now();
    let mut next = now.date_naive().and_hms_opt(hour, minute, 0).expect("valid hour/minute").and_utc();
    if next <= now {
        next += chrono::Duration::days(1);
    }
    (next - now).num_milliseconds().max(1_000)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    let filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if args.json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
    }

    let engine_config = EngineConfig::load();

    if should_reset_db(args.reset_db) && !args.memory {
        reset_data_directory(&engine_config.sled_path)?;
    }

    config::init(engine_config.clone());

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  Plant Telemetry Insight Engine");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let store: Arc<dyn Store> = if args.memory {
        info!("using in-memory persistence backend");
        Arc::new(MemoryStore::new())
    } else {
        info!(path = %engine_config.sled_path, "opening sled persistence backend");
        Arc::new(SledStore::open(&engine_config.sled_path).context("failed to open sled store")?)
    };
    let clock = Arc::new(SystemClock);

    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();

    if args.stdin {
        let ingest_store = Arc::clone(&store);
        let ingest_clock = Arc::clone(&clock);
        let ingest_cancel = cancel_token.clone();
        task_set.spawn(async move { run_ingestion_stdin(ingest_store, ingest_clock, ingest_cancel).await });
    }

    {
        let daily_store = Arc::clone(&store);
        let daily_clock = Arc::clone(&clock);
        let daily_cancel = cancel_token.clone();
        task_set.spawn(async move { run_daily_rollup_scheduler(daily_store, daily_clock, daily_cancel).await });
    }

    {
        let weekly_store = Arc::clone(&store);
        let weekly_clock = Arc::clone(&clock);
        let weekly_cancel = cancel_token.clone();
        task_set.spawn(async move { run_weekly_rollup_scheduler(weekly_store, weekly_clock, weekly_cancel).await });
    }

    {
        let sched_store = Arc::clone(&store);
        let sched_clock = Arc::clone(&clock);
        let sched_cancel = cancel_token.clone();
        let threshold_hours = engine_config.active_device_threshold_hours;
        task_set.spawn(async move { run_insight_scheduler(sched_store, sched_clock, sched_cancel, threshold_hours).await });
    }

    {
        let gen_store = Arc::clone(&store);
        let gen_clock = Arc::clone(&clock);
        let gen_cancel = cancel_token.clone();
        let gen_config = engine_config.clone();
        task_set.spawn(async move { run_insight_generator(gen_store, gen_clock, gen_cancel, gen_config).await });
    }

    info!("supervisor: all tasks spawned, monitoring...");

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                info!("supervisor: shutdown signal received");
                break;
            }
            result = task_set.join_next() => {
                match result {
                    Some(Ok(Ok(task_name))) => {
                        info!("supervisor: task {} completed normally", task_name);
                    }
                    Some(Ok(Err(e))) => {
                        error!("supervisor: task failed with error: {}", e);
                        cancel_token.cancel();
                        return Err(e);
                    }
                    Some(Err(e)) => {
                        error!("supervisor: task panicked: {}", e);
                        cancel_token.cancel();
                        return Err(anyhow::anyhow!("task panicked: {}", e));
                    }
                    None => {
                        info!("supervisor: all tasks completed");
                        break;
                    }
                }
            }
        }
    }

    task_set.shutdown().await;
    info!("insights-engine shutdown complete");
    Ok(())
}

/// Read newline-delimited JSON readings from stdin and fan each one out
/// through [`ingest::ingest_reading`]. Tracks the distinct devices seen in
/// each idle-flush window so [`rollup::on_devices_reporting`] reflects one
/// batch rather than one reading at a time.
async fn run_ingestion_stdin(store: Arc<dyn Store>, clock: Arc<SystemClock>, cancel: CancellationToken) -> Result<TaskName> {
    use std::collections::HashSet;
    use tokio::io::{AsyncBufReadExt, BufReader};

    info!("[Ingestion] task starting, reading newline-delimited JSON readings from stdin");

    let stdin = tokio::io::stdin();
    let mut reader = BufReader::new(stdin);
    let mut line_buffer = String::with_capacity(1024);
    let mut readings_seen = 0u64;
    let mut devices_this_batch: HashSet<String> = HashSet::new();
    let mut flush_interval = tokio::time::interval(std::time::Duration::from_secs(30));

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("[Ingestion] received shutdown signal after {} readings", readings_seen);
                return Ok(TaskName::Ingestion);
            }
            _ = flush_interval.tick() => {
                if !devices_this_batch.is_empty() {
                    let count = devices_this_batch.len() as i64;
                    if let Err(err) = rollup::on_devices_reporting(store.as_ref(), clock.as_ref(), count).await {
                        error!("[Ingestion] failed to record devices-reporting rollup: {}", err);
                    }
                    devices_this_batch.clear();
                }
            }
            result = reader.read_line(&mut line_buffer) => {
                match result {
                    Ok(0) => {
                        info!("[Ingestion] EOF reached after {} readings", readings_seen);
                        return Ok(TaskName::Ingestion);
                    }
                    Ok(_) => {
                        let line = line_buffer.trim();
                        if !line.is_empty() {
                            match serde_json::from_str::<Reading>(line) {
                                Ok(raw) => {
                                    let hardware_id = raw.hardware_id.clone();
                                    match ingest::ingest_reading(store.as_ref(), clock.as_ref(), raw).await {
                                        Ok((_reading, _outcome)) => {
                                            readings_seen += 1;
                                            devices_this_batch.insert(hardware_id);
                                        }
                                        Err(err) => {
                                            error!(hardware_id = %hardware_id, "[Ingestion] failed to ingest reading: {}", err);
                                        }
                                    }
                                }
                                Err(err) => {
                                    warn!("[Ingestion] failed to parse reading: {}", err);
                                }
                            }
                        }
                        line_buffer.clear();
                    }
                    Err(e) => {
                        error!("[Ingestion] stdin read error: {}", e);
                        return Err(anyhow::anyhow!("stdin read error: {}", e));
                    }
                }
            }
        }
    }
}

/// Once daily at [`defaults::aggregator::DAILY_ROLLUP_HOUR_UTC`]:`MINUTE_UTC`,
/// rebuild yesterday's daily aggregates and recompute per-device baseline
/// moisture ranges from the trailing window of hourly aggregates.
async fn run_daily_rollup_scheduler(store: Arc<dyn Store>, clock: Arc<SystemClock>, cancel: CancellationToken) -> Result<TaskName> {
    info!("[DailyRollup] task starting");
    loop {
        let wait_ms = millis_until_next_utc(defaults::aggregator::DAILY_ROLLUP_HOUR_UTC, defaults::aggregator::DAILY_ROLLUP_MINUTE_UTC);
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("[DailyRollup] received shutdown signal");
                return Ok(TaskName::DailyRollup);
            }
            _ = tokio::time::sleep(std::time::Duration::from_millis(wait_ms as u64)) => {}
        }

        match aggregator::compute_daily(store.as_ref(), clock.as_ref()).await {
            Ok(count) => info!("[DailyRollup] computed {} daily aggregates", count),
            Err(err) => error!("[DailyRollup] daily aggregate computation failed: {}", err),
        }

        let now_ms = clock.as_ref().now_ms();
        let lookback_ms = 24 * 3_600_000;
        match insights_engine::persistence::AggregateStore::devices_with_hourly_in_range(store.as_ref(), now_ms - lookback_ms, now_ms).await
        {
            Ok(hardware_ids) => match profile_learner::recompute_baselines(store.as_ref(), clock.as_ref(), &hardware_ids).await {
                Ok(updated) => info!("[DailyRollup] recomputed baselines for {} devices", updated),
                Err(err) => error!("[DailyRollup] baseline recompute failed: {}", err),
            },
            Err(err) => error!("[DailyRollup] failed to enumerate active devices for baseline recompute: {}", err),
        }
    }
}

/// Once weekly at [`defaults::aggregator::WEEKLY_ROLLUP_HOUR_UTC`]:`MINUTE_UTC`
/// (ISO Monday), rebuild last week's aggregates.
async fn run_weekly_rollup_scheduler(store: Arc<dyn Store>, clock: Arc<SystemClock>, cancel: CancellationToken) -> Result<TaskName> {
    info!("[WeeklyRollup] task starting");
    loop {
        let now = Utc::now();
        let days_until_monday = (7 - now.weekday().num_days_from_monday()) % 7;
        let days_until_monday = if days_until_monday == 0
            && (now.hour(), now.minute()) >= (defaults::aggregator::WEEKLY_ROLLUP_HOUR_UTC, defaults::aggregator::WEEKLY_ROLLUP_MINUTE_UTC)
        {
            7
        } else {
            days_until_monday
        };
        let next = (now.date_naive() + chrono::Duration::days(days_until_monday as i64))
            .and_hms_opt(defaults::aggregator::WEEKLY_ROLLUP_HOUR_UTC, defaults::aggregator::WEEKLY_ROLLUP_MINUTE_UTC, 0)
            .expect("valid hour/minute")
            .and_utc();
        let wait_ms = (next - now).num_milliseconds().max(1_000) as u64;

        tokio::select! {
            _ = cancel.cancelled() => {
                info!("[WeeklyRollup] received shutdown signal");
                return Ok(TaskName::WeeklyRollup);
            }
            _ = tokio::time::sleep(std::time::Duration::from_millis(wait_ms)) => {}
        }

        match aggregator::compute_weekly(store.as_ref(), clock.as_ref()).await {
            Ok(count) => info!("[WeeklyRollup] computed {} weekly aggregates", count),
            Err(err) => error!("[WeeklyRollup] weekly aggregate computation failed: {}", err),
        }
    }
}

/// Twice daily, enumerate active devices and enqueue one scheduled insight
/// request each.
async fn run_insight_scheduler(
    store: Arc<dyn Store>,
    clock: Arc<SystemClock>,
    cancel: CancellationToken,
    active_device_threshold_hours: i64,
) -> Result<TaskName> {
    info!("[InsightScheduler] task starting");
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(12 * 3_600));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("[InsightScheduler] received shutdown signal");
                return Ok(TaskName::InsightScheduler);
            }
            _ = interval.tick() => {
                match insight::scheduler::run_once(store.as_ref(), clock.as_ref(), active_device_threshold_hours).await {
                    Ok(created) => info!("[InsightScheduler] scheduled {} insight requests", created),
                    Err(err) => error!("[InsightScheduler] scheduling pass failed: {}", err),
                }
            }
        }
    }
}

/// Periodically drain the insight request queue.
async fn run_insight_generator(
    store: Arc<dyn Store>,
    clock: Arc<SystemClock>,
    cancel: CancellationToken,
    config: EngineConfig,
) -> Result<TaskName> {
    info!("[InsightGenerator] task starting");
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("[InsightGenerator] received shutdown signal");
                return Ok(TaskName::InsightGenerator);
            }
            _ = interval.tick() => {
                match insight::generator::run_once(store.as_ref(), clock.as_ref(), &config.llm, config.insight_batch_size).await {
                    Ok(claimed) => {
                        if claimed > 0 {
                            info!("[InsightGenerator] processed {} insight requests", claimed);
                        }
                    }
                    Err(err) => error!("[InsightGenerator] generation pass failed: {}", err),
                }
            }
        }
    }
}
