//! Aggregator.
//!
//! Three entry points: [`process_reading`] (incremental update or rebuild,
//! driven by the reading change feed), [`compute_daily`] and
//! [`compute_weekly`] (driven by a time-based scheduler). All three write
//! through [`crate::persistence::AggregateStore`] only — device-status
//! side effects go through the patches in [`crate::device_status`], never a
//! direct field write.

mod combine;
mod incremental;

use thiserror::Error;

use crate::clock::Clock;
use crate::idempotency;
use crate::persistence::{
    AggregateStore, DeviceProfileStore, DeviceStatusPatch, DeviceStatusStore, PersistenceError, ReadingStore, Store,
};
use crate::rollup;
use crate::time_utils::{self, Window};
use crate::types::{Aggregate, ProcessingStage, Reading, WindowType};

pub use combine::combine_sensor_stats;

#[derive(Debug, Error)]
pub enum AggregatorError {
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Outcome of [`process_reading`], mostly useful for tests and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationOutcome {
    /// Another attempt already claimed this reading for this stage.
    AlreadyClaimed,
    /// The reading's window is still open; accumulators were updated.
    Incremental,
    /// The reading's window is closed and within the lateness window; the
    /// window was recomputed from scratch.
    Rebuilt,
    /// The reading arrived more than 24h after its window closed.
    TooLateDiscarded,
}

/// Per-reading aggregation path: validate, classify the target window as
/// open or closed, and either fold into an open window or trigger a rebuild.
pub async fn process_reading(
    store: &dyn Store,
    clock: &dyn Clock,
    reading: &Reading,
) -> Result<AggregationOutcome, AggregatorError> {
    let reading_id = reading.reading_id();
    if !idempotency::claim(store, clock, &reading_id, ProcessingStage::Aggregate).await? {
        return Ok(AggregationOutcome::AlreadyClaimed);
    }

    if time_utils::check_clock_skew(reading.timestamp_ms, reading.ingest_time_ms) {
        tracing::warn!(
            hardware_id = %reading.hardware_id,
            reading_id = %reading_id,
            event_time_ms = reading.timestamp_ms,
            ingest_time_ms = reading.ingest_time_ms,
            "clock skew exceeds warning threshold"
        );
    }

    let window = time_utils::get_window(reading.timestamp_ms, WindowType::Hourly);
    let now_ms = clock.now_ms();

    if now_ms < window.end_ms {
        incremental::apply(store, reading, window, now_ms).await?;
        return Ok(AggregationOutcome::Incremental);
    }

    if time_utils::is_within_lateness_window(window.end_ms, now_ms) {
        rebuild_hourly(store, clock, &reading.hardware_id, window, now_ms).await?;
        return Ok(AggregationOutcome::Rebuilt);
    }

    tracing::warn!(
        hardware_id = %reading.hardware_id,
        reading_id = %reading_id,
        window_end_ms = window.end_ms,
        now_ms,
        "reading arrived past the lateness window; discarding"
    );
    Ok(AggregationOutcome::TooLateDiscarded)
}

/// Re-derive an hourly window's aggregate from its raw readings. Idempotent:
/// re-running with the same inputs overwrites the row with byte-identical
/// accumulators.
async fn rebuild_hourly(
    store: &dyn Store,
    clock: &dyn Clock,
    hardware_id: &str,
    window: Window,
    now_ms: i64,
) -> Result<Aggregate, AggregatorError> {
    let readings = ReadingStore::range(store, hardware_id, window.start_ms, window.end_ms, usize::MAX).await?;

    let aggregate = incremental::rebuild_from_readings(hardware_id, WindowType::Hourly, window, &readings, now_ms);
    AggregateStore::put(store, aggregate.clone()).await?;

    let expected_interval_sec = DeviceProfileStore::get(store, hardware_id)
        .await?
        .map(|p| p.expected_interval_sec)
        .unwrap_or(crate::config::defaults::profile::DEFAULT_EXPECTED_INTERVAL_SEC);
    let coverage = incremental::coverage_pct(&aggregate, expected_interval_sec);

    if let Err(err) =
        DeviceStatusStore::apply_patch(store, hardware_id, DeviceStatusPatch::from_aggregator(now_ms, coverage), now_ms).await
    {
        tracing::error!(hardware_id, error = %err, "failed to update device status after aggregate rebuild");
    }

    if let Err(err) = rollup::on_aggregate_computed(store, clock, WindowType::Hourly.as_str()).await {
        tracing::error!(hardware_id, error = %err, "failed to record aggregate rollup");
    }

    Ok(aggregate)
}

/// Combine yesterday's hourly aggregates into a daily aggregate for every
/// device that reported.
pub async fn compute_daily(store: &dyn Store, clock: &dyn Clock) -> Result<usize, AggregatorError> {
    let now_ms = clock.now_ms();
    let target_day = time_utils::get_window(now_ms - 24 * 3_600_000, WindowType::Daily);
    let devices = store.devices_with_hourly_in_range(target_day.start_ms, target_day.end_ms).await?;
    let mut computed = 0;
    for hardware_id in &devices {
        let hourlies =
            AggregateStore::range(store, hardware_id, WindowType::Hourly, target_day.start_ms, target_day.end_ms)
                .await?;
        if hourlies.is_empty() {
            continue;
        }
        let daily = combine::combine_into(hardware_id, WindowType::Daily, target_day, &hourlies, now_ms);
        AggregateStore::put(store, daily).await?;
        computed += 1;
        if let Err(err) = rollup::on_aggregate_computed(store, clock, WindowType::Daily.as_str()).await {
            tracing::error!(hardware_id, error = %err, "failed to record daily rollup");
        }
    }
    Ok(computed)
}

/// Combine the most recently completed ISO week's daily aggregates into a
/// weekly aggregate for every device with daily data that week.
pub async fn compute_weekly(store: &dyn Store, clock: &dyn Clock) -> Result<usize, AggregatorError> {
    let now_ms = clock.now_ms();
    let target_week = time_utils::get_window(now_ms - 7 * 24 * 3_600_000, WindowType::Weekly);
    let devices = store.devices_with_hourly_in_range(target_week.start_ms, target_week.end_ms).await?;
    let mut computed = 0;
    for hardware_id in &devices {
        let dailies =
            AggregateStore::range(store, hardware_id, WindowType::Daily, target_week.start_ms, target_week.end_ms)
                .await?;
        if dailies.is_empty() {
            continue;
        }
        let weekly = combine::combine_into(hardware_id, WindowType::Weekly, target_week, &dailies, now_ms);
        AggregateStore::put(store, weekly).await?;
        computed += 1;
        if let Err(err) = rollup::on_aggregate_computed(store, clock, WindowType::Weekly.as_str()).await {
            tracing::error!(hardware_id, error = %err, "failed to record weekly rollup");
        }
    }
    Ok(computed)
}
