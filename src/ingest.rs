//! Per-reading ingestion dispatcher.
//!
//! The entry point the reading change feed hands each record to. One raw
//! reading fans out to sensor validation, the three per-reading stages
//! (aggregator, event detector, device-status update), and the rollup
//! counters — in that order, with each stage's own failure isolated from
//! the others.

use thiserror::Error;

use crate::clock::Clock;
use crate::idempotency;
use crate::persistence::{ConditionalWriteOutcome, DeviceStatusPatch, PersistenceError, ReadingStore, Store};
use crate::sensor_validation::{self, SensorKind};
use crate::types::{ProcessingStage, Reading, SensorStatus};
use crate::{aggregator, device_status, event_detector, rollup};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Outcome of ingesting one raw reading, for logging/metrics at the call
/// site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// First time this `(hardware_id, timestamp_ms)` has been seen.
    Inserted,
    /// Redelivery of an already-stored reading; downstream stages were still
    /// invoked (they no-op via their own idempotency claims) but the rollup
    /// counts it as a dedup, not a fresh ingest.
    Deduped,
}

/// Validate, store, and fan a raw reading out to every downstream stage.
/// Returns the reading actually stored (with sensor statuses stamped) so the
/// caller can track distinct `hardware_id`s seen across a batch.
pub async fn ingest_reading(store: &dyn Store, clock: &dyn Clock, raw: Reading) -> Result<(Reading, IngestOutcome), IngestError> {
    let reading = stamp_sensor_statuses(store, raw).await?;

    let write_outcome = ReadingStore::put(store, reading.clone()).await?;
    let outcome =
        if write_outcome == ConditionalWriteOutcome::Applied { IngestOutcome::Inserted } else { IngestOutcome::Deduped };

    let any_out_of_range = [reading.temperature_status, reading.humidity_status, reading.pressure_status, reading.soil_moisture_status]
        .iter()
        .any(|status| *status == SensorStatus::OutOfRange);

    let now_ms = clock.now_ms();
    let reading_id = reading.reading_id();

    if idempotency::claim(store, clock, &reading_id, ProcessingStage::Status).await? {
        let expected_interval_sec = crate::persistence::DeviceProfileStore::get(store, &reading.hardware_id)
            .await?
            .map(|p| p.expected_interval_sec)
            .unwrap_or(crate::config::defaults::profile::DEFAULT_EXPECTED_INTERVAL_SEC);
        let patch = DeviceStatusPatch::from_ingestion(reading.ingest_time_ms, reading.timestamp_ms, expected_interval_sec);
        if let Err(err) = crate::persistence::DeviceStatusStore::apply_patch(store, &reading.hardware_id, patch, now_ms).await {
            tracing::error!(hardware_id = %reading.hardware_id, error = %err, "failed to update device status after ingestion");
        }
    }

    match outcome {
        IngestOutcome::Inserted => {
            if let Err(err) = rollup::on_reading_ingested(store, clock, any_out_of_range).await {
                tracing::error!(hardware_id = %reading.hardware_id, error = %err, "failed to record ingest rollup");
            }
        }
        IngestOutcome::Deduped => {
            if let Err(err) = rollup::on_reading_deduped(store, clock).await {
                tracing::error!(hardware_id = %reading.hardware_id, error = %err, "failed to record dedup rollup");
            }
        }
    }
    if let Err(err) = rollup::on_pipeline_lag_sample(store, clock, reading.timestamp_ms).await {
        tracing::error!(hardware_id = %reading.hardware_id, error = %err, "failed to record pipeline lag rollup");
    }

    if let Err(err) = aggregator::process_reading(store, clock, &reading).await {
        tracing::error!(hardware_id = %reading.hardware_id, error = %err, "aggregator failed for reading");
    }
    if let Err(err) = event_detector::process_reading(store, clock, &reading).await {
        tracing::error!(hardware_id = %reading.hardware_id, error = %err, "event detector failed for reading");
    }

    Ok((reading, outcome))
}

/// Fetch each sensor's recent raw values for this device and stamp fresh
/// status tags onto `raw` (overwriting whatever the source sent).
async fn stamp_sensor_statuses(store: &dyn Store, mut raw: Reading) -> Result<Reading, PersistenceError> {
    let lookback_ms = 6 * 3_600_000;
    let context = ReadingStore::range(store, &raw.hardware_id, raw.timestamp_ms - lookback_ms, raw.timestamp_ms, 16).await?;

    raw.temperature_status =
        sensor_validation::validate_value(SensorKind::Temperature, raw.temperature, &recent(&context, |r| r.temperature));
    raw.humidity_status = sensor_validation::validate_value(SensorKind::Humidity, raw.humidity, &recent(&context, |r| r.humidity));
    raw.pressure_status = sensor_validation::validate_value(SensorKind::Pressure, raw.pressure, &recent(&context, |r| r.pressure));
    raw.soil_moisture_status =
        sensor_validation::validate_value(SensorKind::SoilMoisture, raw.soil_moisture, &recent(&context, |r| r.soil_moisture));

    Ok(raw)
}

fn recent(context: &[Reading], extract: impl Fn(&Reading) -> Option<f64>) -> Vec<f64> {
    context.iter().filter_map(extract).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::persistence::MemoryStore;

    fn reading(hardware_id: &str, ts_ms: i64, moisture: f64) -> Reading {
        Reading {
            hardware_id: hardware_id.to_string(),
            batch_id: format!("b-{ts_ms}"),
            timestamp_ms: ts_ms,
            ingest_time_ms: ts_ms,
            temperature: Some(22.0),
            humidity: Some(50.0),
            pressure: Some(1013.0),
            soil_moisture: Some(moisture),
            temperature_status: SensorStatus::Ok,
            humidity_status: SensorStatus::Ok,
            pressure_status: SensorStatus::Ok,
            soil_moisture_status: SensorStatus::Ok,
        }
    }

    #[tokio::test]
    async fn first_ingest_of_a_reading_is_inserted() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(1_000);
        let (_, outcome) = ingest_reading(&store, &clock, reading("dev-1", 1_000, 40.0)).await.unwrap();
        assert_eq!(outcome, IngestOutcome::Inserted);
    }

    #[tokio::test]
    async fn redelivery_of_same_reading_is_deduped() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(1_000);
        ingest_reading(&store, &clock, reading("dev-1", 1_000, 40.0)).await.unwrap();
        let (_, outcome) = ingest_reading(&store, &clock, reading("dev-1", 1_000, 40.0)).await.unwrap();
        assert_eq!(outcome, IngestOutcome::Deduped);
    }

    #[tokio::test]
    async fn out_of_range_value_is_stamped_before_storage() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(0);
        let (stored, _) = ingest_reading(&store, &clock, reading("dev-1", 0, 999.0)).await.unwrap();
        assert_eq!(stored.soil_moisture_status, SensorStatus::OutOfRange);
    }
}
