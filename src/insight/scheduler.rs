//! Insight scheduler.
//!
//! Invoked on a cron-like trigger (twice daily): enumerates devices that
//! have reported recently and creates one scheduled [`InsightRequest`] per
//! device. Event-driven requests are enqueued separately by
//! [`crate::event_detector`], subject to its own daily cap and batching
//! window.

use thiserror::Error;

use crate::clock::Clock;
use crate::persistence::{DeviceStatusStore, InsightRequestStore, PersistenceError, Store};
use crate::types::InsightRequest;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Enqueue one scheduled insight request for every device whose
/// `last_seen_ingest_time_ms` falls within `active_device_threshold_hours`.
/// Returns the number of requests created.
pub async fn run_once(store: &dyn Store, clock: &dyn Clock, active_device_threshold_hours: i64) -> Result<usize, SchedulerError> {
    let now_ms = clock.now_ms();
    let threshold_ms = active_device_threshold_hours * 3_600_000;
    let statuses = DeviceStatusStore::list_all(store).await?;

    let mut created = 0;
    for status in statuses {
        let Some(last_seen_ms) = status.last_seen_ingest_time_ms else { continue };
        if now_ms - last_seen_ms > threshold_ms {
            continue;
        }
        InsightRequestStore::put(store, InsightRequest::new_scheduled(status.hardware_id, now_ms)).await?;
        created += 1;
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::persistence::{DeviceStatusPatch, MemoryStore};

    #[tokio::test]
    async fn only_recently_seen_devices_get_scheduled() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(100 * 3_600_000);

        DeviceStatusStore::apply_patch(&store, "dev-fresh", DeviceStatusPatch::from_ingestion(99 * 3_600_000, 99 * 3_600_000, 300), clock.now_ms())
            .await
            .unwrap();
        DeviceStatusStore::apply_patch(&store, "dev-stale", DeviceStatusPatch::from_ingestion(10 * 3_600_000, 10 * 3_600_000, 300), clock.now_ms())
            .await
            .unwrap();

        let created = run_once(&store, &clock, 24).await.unwrap();
        assert_eq!(created, 1);
    }

    #[tokio::test]
    async fn devices_never_seen_are_skipped() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(0);
        let created = run_once(&store, &clock, 24).await.unwrap();
        assert_eq!(created, 0);
    }
}
