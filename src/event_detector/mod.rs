//! Event detector.
//!
//! Runs five independent detectors against a per-device reading window and
//! persists at most one candidate per detector per reading, subject to a
//! per-event-type cooldown and at-most-once insertion keyed by
//! `(hardware_id, start_time_ms)`.

mod drying;
mod environmental;
mod humidity;
mod temperature;
mod watering;

use thiserror::Error;

use crate::clock::Clock;
use crate::config::defaults::{event_detector as d, insight as insight_d};
use crate::idempotency;
use crate::persistence::{ConditionalWriteOutcome, DeviceStatusPatch, EventStore, InsightRequestStore, PersistenceError, Store};
use crate::rollup;
use crate::types::{Event, EventType, InsightRequest, ProcessingStage, Reading, SensorStatus};

#[derive(Debug, Error)]
pub enum EventDetectorError {
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Readings within `[end_ts - lookback_ms, end_ts]`, ascending by timestamp.
/// Returns owned clones so detectors can filter/sort/fold without juggling
/// reference depth.
fn in_window(readings: &[Reading], end_ts: i64, lookback_ms: i64) -> Vec<Reading> {
    readings.iter().filter(|r| r.timestamp_ms >= end_ts - lookback_ms && r.timestamp_ms <= end_ts).cloned().collect()
}

/// Run every detector for one reading, persisting any candidates that clear
/// their cooldown. Returns the number of events actually persisted (after
/// dedup). A detector panicking or erroring is isolated: it is logged and the
/// remaining detectors still run.
pub async fn process_reading(store: &dyn Store, clock: &dyn Clock, reading: &Reading) -> Result<usize, EventDetectorError> {
    let reading_id = reading.reading_id();
    if !idempotency::claim(store, clock, &reading_id, ProcessingStage::Event).await? {
        return Ok(0);
    }

    let context = crate::persistence::ReadingStore::range(
        store,
        &reading.hardware_id,
        reading.timestamp_ms - d::CONTEXT_LOOKBACK_HOURS * 3_600_000,
        reading.timestamp_ms,
        d::MAX_CONTEXT_ROWS,
    )
    .await?;
    let combined = combine_context(context, reading);

    let candidates: Vec<Option<Event>> = vec![
        watering::detect(&combined, reading),
        drying::detect(&combined, reading),
        temperature::detect(reading),
        humidity::detect(&combined, reading),
        environmental::detect(&combined, reading),
    ];

    let now_ms = clock.now_ms();
    let mut persisted = 0;
    for candidate in candidates.into_iter().flatten() {
        match try_persist(store, clock, &candidate, now_ms).await {
            Ok(true) => persisted += 1,
            Ok(false) => {}
            Err(err) => {
                tracing::error!(
                    hardware_id = %reading.hardware_id,
                    event_type = candidate.event_type.as_str(),
                    error = %err,
                    "failed to persist candidate event"
                );
            }
        }
    }

    if persisted > 0 {
        if let Err(err) = crate::persistence::DeviceStatusStore::apply_patch(
            store,
            &reading.hardware_id,
            DeviceStatusPatch::from_event_detector(now_ms, reading.timestamp_ms),
            now_ms,
        )
        .await
        {
            tracing::error!(hardware_id = %reading.hardware_id, error = %err, "failed to update device status after event detection");
        }
    }

    Ok(persisted)
}

/// Readings fetched as context plus the current reading, deduplicated by
/// timestamp (the current reading wins) and sorted ascending.
fn combine_context(mut context: Vec<Reading>, current: &Reading) -> Vec<Reading> {
    context.retain(|r| r.timestamp_ms != current.timestamp_ms);
    context.push(current.clone());
    context.sort_by_key(|r| r.timestamp_ms);
    context
}

/// Check cooldown, persist via conditional insert, record rollups, and for a
/// critical (temperature stress) event enqueue an event-driven insight
/// request subject to the daily cap and batching window.
async fn try_persist(
    store: &dyn Store,
    clock: &dyn Clock,
    event: &Event,
    now_ms: i64,
) -> Result<bool, PersistenceError> {
    if let Some(cooldown) = event.event_type.cooldown() {
        let since_ms = now_ms - cooldown.as_millis() as i64;
        let recent = EventStore::list_by_type_since(store, &event.hardware_id, event.event_type.as_str(), since_ms).await?;
        if !recent.is_empty() {
            return Ok(false);
        }
    }

    let outcome = EventStore::put_if_absent(store, event.clone()).await?;
    if outcome != ConditionalWriteOutcome::Applied {
        return Ok(false);
    }

    if let Err(err) = rollup::on_event_detected(store, clock, event.event_type.as_str()).await {
        tracing::error!(hardware_id = %event.hardware_id, error = %err, "failed to record event rollup");
    }

    if event.event_type == EventType::TemperatureStress {
        maybe_enqueue_event_driven_insight(store, &event.hardware_id, event.event_type.as_str(), now_ms).await?;
    }

    if event.event_type == EventType::WateringEvent {
        if let Err(err) = crate::profile_learner::on_watering_event_detected(store, &event.hardware_id, event.start_time_ms, now_ms).await {
            tracing::error!(hardware_id = %event.hardware_id, error = %err, "failed to update profile after watering event");
        }
    }

    Ok(true)
}

async fn maybe_enqueue_event_driven_insight(
    store: &dyn Store,
    hardware_id: &str,
    event_type: &str,
    now_ms: i64,
) -> Result<(), PersistenceError> {
    let daily_since_ms = now_ms - 24 * 3_600_000;
    let count = InsightRequestStore::count_event_driven_since(store, hardware_id, daily_since_ms).await?;
    if count >= insight_d::EVENT_DRIVEN_DAILY_CAP {
        return Ok(());
    }

    let batching_since_ms = now_ms - insight_d::EVENT_BATCHING_WINDOW_HOURS * 3_600_000;
    let recent = InsightRequestStore::latest_for_device_since(store, hardware_id, batching_since_ms).await?;
    if recent.iter().any(|r| r.status == crate::types::InsightRequestStatus::Pending) {
        return Ok(());
    }

    InsightRequestStore::put(store, InsightRequest::new_event_driven(hardware_id, event_type, now_ms)).await
}

/// True if the sensor status for this value is `ok` and the value is present.
fn valid(status: SensorStatus, value: Option<f64>) -> Option<f64> {
    if status == SensorStatus::Ok { value } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::persistence::{MemoryStore, ReadingStore};
    use crate::types::SensorStatus;

    fn reading(ts_ms: i64, moisture: f64, temperature: f64) -> Reading {
        Reading {
            hardware_id: "dev-1".to_string(),
            batch_id: format!("b-{ts_ms}"),
            timestamp_ms: ts_ms,
            ingest_time_ms: ts_ms,
            temperature: Some(temperature),
            humidity: Some(50.0),
            pressure: Some(1000.0),
            soil_moisture: Some(moisture),
            temperature_status: SensorStatus::Ok,
            humidity_status: SensorStatus::Ok,
            pressure_status: SensorStatus::Ok,
            soil_moisture_status: SensorStatus::Ok,
        }
    }

    #[tokio::test]
    async fn rapid_watering_spike_is_detected() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(0);
        let r0 = reading(0, 30.0, 22.0);
        let r1 = reading(600_000, 31.0, 22.0);
        let r2 = reading(1_500_000, 50.0, 22.0);
        ReadingStore::put(&store, r0.clone()).await.unwrap();
        ReadingStore::put(&store, r1.clone()).await.unwrap();
        clock.set(1_500_000);
        let persisted = process_reading(&store, &clock, &r2).await.unwrap();
        assert_eq!(persisted, 1);
        let events = EventStore::range(&store, "dev-1", 0, 1_500_001).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::WateringEvent);
        assert_eq!(events[0].start_time_ms, 0);
        assert_eq!(events[0].end_time_ms, 1_500_000);
    }

    #[tokio::test]
    async fn temperature_boundary_does_not_trigger_at_exactly_35() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(0);
        let r = reading(0, 40.0, 35.0);
        let persisted = process_reading(&store, &clock, &r).await.unwrap();
        assert_eq!(persisted, 0);
    }

    #[tokio::test]
    async fn temperature_stress_is_suppressed_by_cooldown() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(0);
        let r1 = reading(0, 40.0, 36.0);
        assert_eq!(process_reading(&store, &clock, &r1).await.unwrap(), 1);

        clock.set(15 * 60_000);
        let r2 = reading(15 * 60_000, 40.0, 36.0);
        assert_eq!(process_reading(&store, &clock, &r2).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn same_reading_is_not_processed_twice() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(0);
        let r = reading(0, 40.0, 36.0);
        assert_eq!(process_reading(&store, &clock, &r).await.unwrap(), 1);
        assert_eq!(process_reading(&store, &clock, &r).await.unwrap(), 0);
    }
}
