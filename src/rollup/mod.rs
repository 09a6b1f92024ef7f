//! Rollup updater.
//!
//! Routes operational events from every other component into minute- and
//! hour-bucketed counters. Strictly one-directional: this module only ever
//! calls [`crate::persistence::RollupStore`] and never reads or writes any
//! business table (readings, events, aggregates, insights).

pub mod keys;

use std::collections::BTreeMap;

use crate::clock::Clock;
use crate::persistence::{PersistenceError, RollupStore};
use crate::time_utils::{align_to_hour, align_to_minute};
use crate::types::{BucketType, Rollup};

/// Increment `metric_name` (with `dimensions`) by `count`/`sum` in both the
/// current minute bucket and the current hour bucket, so dashboards can read
/// either granularity.
async fn record<S: RollupStore + ?Sized>(
    store: &S,
    clock: &dyn Clock,
    metric_name: &str,
    dimensions: BTreeMap<String, String>,
    count: i64,
    sum: Option<f64>,
) -> Result<(), PersistenceError> {
    let now_ms = clock.now_ms();
    let now_unix_secs = now_ms / 1000;
    for (bucket_type, bucket_start_ms) in
        [(BucketType::Minute, align_to_minute(now_ms)), (BucketType::Hour, align_to_hour(now_ms))]
    {
        let rollup = Rollup {
            bucket_key: keys::bucket_key(bucket_type, bucket_start_ms),
            metric_key: keys::metric_key(metric_name, &dimensions),
            bucket_type,
            bucket_start_ms,
            metric_name: metric_name.to_string(),
            dimensions: dimensions.clone(),
            count,
            sum,
            ttl_unix_secs: keys::calculate_ttl(bucket_type, now_unix_secs),
        };
        store.increment(rollup).await?;
    }
    Ok(())
}

fn dims(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

/// A reading was inserted for the first time: bump the ingest counter, and
/// separately flag it as invalid if any sensor came in `out_of_range`.
///
/// Undimensioned: these are fleet-wide operational counters, not a per-device
/// index (that is [`crate::device_status`]'s job — dimensioning every
/// reading-level rollup by `hardware_id` would make this table grow with the
/// device fleet instead of with wall-clock buckets).
pub async fn on_reading_ingested<S: RollupStore + ?Sized>(
    store: &S,
    clock: &dyn Clock,
    any_sensor_out_of_range: bool,
) -> Result<(), PersistenceError> {
    record(store, clock, "readings_ingested_count", BTreeMap::new(), 1, None).await?;
    if any_sensor_out_of_range {
        record(store, clock, "readings_invalid_count", BTreeMap::new(), 1, None).await?;
    }
    Ok(())
}

/// A redelivered reading landed on an existing row (a `Modify` change, not an
/// `Insert`) — the idempotency ledger already saw this `reading_id`.
pub async fn on_reading_deduped<S: RollupStore + ?Sized>(store: &S, clock: &dyn Clock) -> Result<(), PersistenceError> {
    record(store, clock, "readings_deduped_count", BTreeMap::new(), 1, None).await
}

/// Contribute one sample to the `pipeline_lag_seconds` sum/count pair: how
/// long after `event_time_ms` this reading was actually observed.
pub async fn on_pipeline_lag_sample<S: RollupStore + ?Sized>(
    store: &S,
    clock: &dyn Clock,
    event_time_ms: i64,
) -> Result<(), PersistenceError> {
    let lag_secs = (clock.now_ms() - event_time_ms) as f64 / 1000.0;
    record(store, clock, "pipeline_lag_seconds", BTreeMap::new(), 1, Some(lag_secs)).await
}

/// Once a batch of readings has been fanned out to every per-record handler,
/// record how many distinct devices reported in it.
pub async fn on_devices_reporting<S: RollupStore + ?Sized>(
    store: &S,
    clock: &dyn Clock,
    distinct_device_count: i64,
) -> Result<(), PersistenceError> {
    if distinct_device_count == 0 {
        return Ok(());
    }
    record(store, clock, "devices_reporting_count", BTreeMap::new(), distinct_device_count, None).await
}

pub async fn on_event_detected<S: RollupStore + ?Sized>(
    store: &S,
    clock: &dyn Clock,
    event_type: &str,
) -> Result<(), PersistenceError> {
    record(store, clock, "events_detected_count", dims(&[("event_type", event_type)]), 1, None).await
}

pub async fn on_aggregate_computed<S: RollupStore + ?Sized>(
    store: &S,
    clock: &dyn Clock,
    window_type: &str,
) -> Result<(), PersistenceError> {
    record(store, clock, "aggregates_computed_count", dims(&[("window_type", window_type)]), 1, None).await
}

/// An insight request finished, successfully or not. `success` mirrors the
/// definition used elsewhere: the persisted insight has a non-empty summary or at
/// least one recommendation.
pub async fn on_insight_generated<S: RollupStore + ?Sized>(
    store: &S,
    clock: &dyn Clock,
    success: bool,
    duration_ms: i64,
) -> Result<(), PersistenceError> {
    let status = if success { "success" } else { "failure" };
    record(store, clock, "insights_generated_count", dims(&[("status", status)]), 1, None).await?;
    record(
        store,
        clock,
        "insight_generation_duration_ms",
        BTreeMap::new(),
        1,
        Some(duration_ms as f64),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::persistence::MemoryStore;

    #[tokio::test]
    async fn reading_ingested_increments_both_granularities() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(90_000); // 1m30s after epoch
        on_reading_ingested(&store, &clock, false).await.unwrap();
        on_reading_ingested(&store, &clock, false).await.unwrap();
    }

    #[tokio::test]
    async fn out_of_range_reading_also_counts_invalid() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(0);
        on_reading_ingested(&store, &clock, true).await.unwrap();
    }

    #[tokio::test]
    async fn insight_outcome_records_status_and_duration() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(0);
        on_insight_generated(&store, &clock, true, 4200).await.unwrap();
        on_insight_generated(&store, &clock, false, 150).await.unwrap();
    }

    #[tokio::test]
    async fn devices_reporting_skips_empty_batch() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(0);
        on_devices_reporting(&store, &clock, 0).await.unwrap();
        on_devices_reporting(&store, &clock, 3).await.unwrap();
    }
}
