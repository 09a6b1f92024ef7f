//! In-memory persistence backend.
//!
//! Used in unit/integration tests and as a local development backend. Mirrors
//! the trait set exactly; no behavior here is special-cased for tests beyond
//! not surviving process restart.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use super::{
    AggregateStore, ChangeKind, ConditionalWriteOutcome, DeviceProfileStore, DeviceStatusPatch,
    DeviceStatusStore, EventStore, InsightRequestStore, InsightStore, PersistenceError,
    ProcessedReadingStore, ReadingStore, RollupStore,
};
use crate::types::{
    Aggregate, DeviceProfile, DeviceStatus, Event, Insight, InsightRequest, InsightRequestStatus,
    ProcessedReading, ProcessingStage, Reading, Rollup, WindowType,
};

#[derive(Default)]
pub struct MemoryStore {
    readings: RwLock<HashMap<(String, i64), Reading>>,
    events: RwLock<HashMap<(String, i64), Event>>,
    aggregates: RwLock<HashMap<(String, WindowType, i64), Aggregate>>,
    device_profiles: RwLock<HashMap<String, DeviceProfile>>,
    device_status: RwLock<HashMap<String, DeviceStatus>>,
    insights: RwLock<Vec<Insight>>,
    insight_requests: RwLock<HashMap<(String, i64), InsightRequest>>,
    rollups: RwLock<HashMap<(String, String), Rollup>>,
    processed_readings: RwLock<HashMap<String, ProcessedReading>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_err<T>(_e: T) -> PersistenceError {
        PersistenceError::Storage("lock poisoned".to_string())
    }
}

#[async_trait]
impl ReadingStore for MemoryStore {
    async fn put(&self, reading: Reading) -> Result<ConditionalWriteOutcome, PersistenceError> {
        let key = (reading.hardware_id.clone(), reading.timestamp_ms);
        let mut guard = self.readings.write().map_err(Self::lock_err)?;
        if guard.contains_key(&key) {
            return Ok(ConditionalWriteOutcome::ConditionFailed);
        }
        guard.insert(key, reading);
        Ok(ConditionalWriteOutcome::Applied)
    }

    async fn get(&self, hardware_id: &str, timestamp_ms: i64) -> Result<Option<Reading>, PersistenceError> {
        let guard = self.readings.read().map_err(Self::lock_err)?;
        Ok(guard.get(&(hardware_id.to_string(), timestamp_ms)).cloned())
    }

    async fn range(
        &self,
        hardware_id: &str,
        start_ms: i64,
        end_ms: i64,
        limit: usize,
    ) -> Result<Vec<Reading>, PersistenceError> {
        let guard = self.readings.read().map_err(Self::lock_err)?;
        let mut rows: Vec<Reading> = guard
            .values()
            .filter(|r| r.hardware_id == hardware_id && r.timestamp_ms >= start_ms && r.timestamp_ms < end_ms)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.timestamp_ms);
        rows.truncate(limit);
        Ok(rows)
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn put_if_absent(&self, event: Event) -> Result<ConditionalWriteOutcome, PersistenceError> {
        let key = (event.hardware_id.clone(), event.start_time_ms);
        let mut guard = self.events.write().map_err(Self::lock_err)?;
        if guard.contains_key(&key) {
            return Ok(ConditionalWriteOutcome::ConditionFailed);
        }
        guard.insert(key, event);
        Ok(ConditionalWriteOutcome::Applied)
    }

    async fn list_by_type_since(
        &self,
        hardware_id: &str,
        event_type: &str,
        since_ms: i64,
    ) -> Result<Vec<Event>, PersistenceError> {
        let guard = self.events.read().map_err(Self::lock_err)?;
        Ok(guard
            .values()
            .filter(|e| e.hardware_id == hardware_id && e.event_type.as_str() == event_type && e.start_time_ms >= since_ms)
            .cloned()
            .collect())
    }

    async fn range(&self, hardware_id: &str, start_ms: i64, end_ms: i64) -> Result<Vec<Event>, PersistenceError> {
        let guard = self.events.read().map_err(Self::lock_err)?;
        let mut rows: Vec<Event> = guard
            .values()
            .filter(|e| e.hardware_id == hardware_id && e.start_time_ms >= start_ms && e.start_time_ms < end_ms)
            .cloned()
            .collect();
        rows.sort_by_key(|e| e.start_time_ms);
        Ok(rows)
    }
}

#[async_trait]
impl AggregateStore for MemoryStore {
    async fn get(
        &self,
        hardware_id: &str,
        window_type: WindowType,
        window_start_ms: i64,
    ) -> Result<Option<Aggregate>, PersistenceError> {
        let guard = self.aggregates.read().map_err(Self::lock_err)?;
        Ok(guard.get(&(hardware_id.to_string(), window_type, window_start_ms)).cloned())
    }

    async fn put(&self, aggregate: Aggregate) -> Result<(), PersistenceError> {
        let key = (aggregate.hardware_id.clone(), aggregate.window_type, aggregate.window_start_ms);
        let mut guard = self.aggregates.write().map_err(Self::lock_err)?;
        guard.insert(key, aggregate);
        Ok(())
    }

    async fn range(
        &self,
        hardware_id: &str,
        window_type: WindowType,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<Aggregate>, PersistenceError> {
        let guard = self.aggregates.read().map_err(Self::lock_err)?;
        let mut rows: Vec<Aggregate> = guard
            .values()
            .filter(|a| {
                a.hardware_id == hardware_id
                    && a.window_type == window_type
                    && a.window_start_ms >= start_ms
                    && a.window_start_ms < end_ms
            })
            .cloned()
            .collect();
        rows.sort_by_key(|a| a.window_start_ms);
        Ok(rows)
    }

    async fn devices_with_hourly_in_range(&self, start_ms: i64, end_ms: i64) -> Result<Vec<String>, PersistenceError> {
        let guard = self.aggregates.read().map_err(Self::lock_err)?;
        let mut ids: Vec<String> = guard
            .values()
            .filter(|a| {
                a.window_type == WindowType::Hourly && a.window_start_ms < end_ms && a.window_end_ms > start_ms
            })
            .map(|a| a.hardware_id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }
}

#[async_trait]
impl DeviceProfileStore for MemoryStore {
    async fn get(&self, hardware_id: &str) -> Result<Option<DeviceProfile>, PersistenceError> {
        let guard = self.device_profiles.read().map_err(Self::lock_err)?;
        Ok(guard.get(hardware_id).cloned())
    }

    async fn put(&self, profile: DeviceProfile) -> Result<(), PersistenceError> {
        let mut guard = self.device_profiles.write().map_err(Self::lock_err)?;
        guard.insert(profile.hardware_id.clone(), profile);
        Ok(())
    }
}

#[async_trait]
impl DeviceStatusStore for MemoryStore {
    async fn get(&self, hardware_id: &str) -> Result<Option<DeviceStatus>, PersistenceError> {
        let guard = self.device_status.read().map_err(Self::lock_err)?;
        Ok(guard.get(hardware_id).cloned())
    }

    async fn apply_patch(
        &self,
        hardware_id: &str,
        patch: DeviceStatusPatch,
        now_ms: i64,
    ) -> Result<(), PersistenceError> {
        let mut guard = self.device_status.write().map_err(Self::lock_err)?;
        let status = guard
            .entry(hardware_id.to_string())
            .or_insert_with(|| DeviceStatus::new(hardware_id));

        if let Some(v) = patch.last_seen_event_time_ms {
            status.last_seen_event_time_ms = Some(v);
        }
        if let Some(v) = patch.last_seen_ingest_time_ms {
            status.last_seen_ingest_time_ms = Some(v);
        }
        if let Some(v) = patch.sensor_status_summary {
            status.sensor_status_summary = v;
        }
        if let Some(v) = patch.last_aggregate_computed_at_ms {
            status.last_aggregate_computed_at_ms = Some(v);
        }
        if let Some(v) = patch.coverage_pct_last_hour {
            status.coverage_pct_last_hour = Some(v);
        }
        if let Some(v) = patch.last_event_detected_at_ms {
            status.last_event_detected_at_ms = Some(v);
        }
        if let Some(v) = patch.last_processed_event_time_ms {
            status.last_processed_event_time_ms = Some(v);
        }
        if let Some(v) = patch.last_insight_generated_at_ms {
            status.last_insight_generated_at_ms = Some(v);
        }
        if let Some(v) = patch.ingest_event_skew_seconds {
            status.ingest_event_skew_seconds = Some(v);
        }
        if let Some(v) = patch.pipeline_lag_seconds {
            status.pipeline_lag_seconds = Some(v);
        }
        if let Some(v) = patch.expected_interval_sec {
            status.expected_interval_sec = v;
        }
        if let Some((code, message)) = patch.append_error {
            crate::device_status::append_error(status, now_ms, &code, &message);
        }
        status.updated_at_ms = Some(now_ms);
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<DeviceStatus>, PersistenceError> {
        let guard = self.device_status.read().map_err(Self::lock_err)?;
        Ok(guard.values().cloned().collect())
    }
}

#[async_trait]
impl InsightStore for MemoryStore {
    async fn put(&self, insight: Insight) -> Result<(), PersistenceError> {
        let mut guard = self.insights.write().map_err(Self::lock_err)?;
        guard.push(insight);
        Ok(())
    }
}

#[async_trait]
impl InsightRequestStore for MemoryStore {
    async fn put(&self, request: InsightRequest) -> Result<(), PersistenceError> {
        let key = (request.hardware_id.clone(), request.request_time_ms);
        let mut guard = self.insight_requests.write().map_err(Self::lock_err)?;
        guard.insert(key, request);
        Ok(())
    }

    async fn fetch_pending(&self, limit: usize) -> Result<Vec<InsightRequest>, PersistenceError> {
        let guard = self.insight_requests.read().map_err(Self::lock_err)?;
        let mut rows: Vec<InsightRequest> = guard
            .values()
            .filter(|r| r.status == InsightRequestStatus::Pending)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.request_time_ms);
        rows.truncate(limit);
        Ok(rows)
    }

    async fn try_transition(
        &self,
        hardware_id: &str,
        request_time_ms: i64,
        expected: InsightRequestStatus,
        next: InsightRequestStatus,
        error_message: Option<String>,
        processed_at_ms: Option<i64>,
    ) -> Result<bool, PersistenceError> {
        let mut guard = self.insight_requests.write().map_err(Self::lock_err)?;
        let Some(request) = guard.get_mut(&(hardware_id.to_string(), request_time_ms)) else {
            return Ok(false);
        };
        if request.status != expected {
            return Ok(false);
        }
        request.status = next;
        if error_message.is_some() {
            request.error_message = error_message;
        }
        if processed_at_ms.is_some() {
            request.processed_at_ms = processed_at_ms;
        }
        Ok(true)
    }

    async fn count_event_driven_since(&self, hardware_id: &str, since_ms: i64) -> Result<u32, PersistenceError> {
        let guard = self.insight_requests.read().map_err(Self::lock_err)?;
        Ok(guard
            .values()
            .filter(|r| {
                r.hardware_id == hardware_id
                    && r.request_type == crate::types::InsightRequestType::Event
                    && r.request_time_ms >= since_ms
            })
            .count() as u32)
    }

    async fn latest_for_device_since(
        &self,
        hardware_id: &str,
        since_ms: i64,
    ) -> Result<Vec<InsightRequest>, PersistenceError> {
        let guard = self.insight_requests.read().map_err(Self::lock_err)?;
        Ok(guard
            .values()
            .filter(|r| r.hardware_id == hardware_id && r.request_time_ms >= since_ms)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RollupStore for MemoryStore {
    async fn increment(&self, rollup: Rollup) -> Result<(), PersistenceError> {
        let key = (rollup.bucket_key.clone(), rollup.metric_key.clone());
        let mut guard = self.rollups.write().map_err(Self::lock_err)?;
        let entry = guard.entry(key).or_insert_with(|| Rollup {
            bucket_key: rollup.bucket_key.clone(),
            metric_key: rollup.metric_key.clone(),
            bucket_type: rollup.bucket_type,
            bucket_start_ms: rollup.bucket_start_ms,
            metric_name: rollup.metric_name.clone(),
            dimensions: rollup.dimensions.clone(),
            count: 0,
            sum: None,
            ttl_unix_secs: rollup.ttl_unix_secs,
        });
        entry.count += rollup.count;
        if let Some(delta) = rollup.sum {
            entry.sum = Some(entry.sum.unwrap_or(0.0) + delta);
        }
        Ok(())
    }
}

#[async_trait]
impl ProcessedReadingStore for MemoryStore {
    async fn mark_if_absent(
        &self,
        reading_id: &str,
        stage: ProcessingStage,
        now_ms: i64,
    ) -> Result<bool, PersistenceError> {
        let mut guard = self.processed_readings.write().map_err(Self::lock_err)?;
        let row = guard.entry(reading_id.to_string()).or_insert_with(|| ProcessedReading {
            reading_id: reading_id.to_string(),
            ttl_unix_secs: now_ms / 1000 + crate::config::defaults::idempotency::PROCESSED_READING_TTL.as_secs() as i64,
            ..Default::default()
        });
        let slot = match stage {
            ProcessingStage::Event => &mut row.event_processed_at_ms,
            ProcessingStage::Aggregate => &mut row.aggregate_processed_at_ms,
            ProcessingStage::Status => &mut row.status_processed_at_ms,
        };
        if slot.is_some() {
            return Ok(false);
        }
        *slot = Some(now_ms);
        Ok(true)
    }

    async fn is_processed(&self, reading_id: &str, stage: ProcessingStage) -> Result<bool, PersistenceError> {
        let guard = self.processed_readings.read().map_err(Self::lock_err)?;
        Ok(guard.get(reading_id).is_some_and(|row| row.is_processed(stage)))
    }
}

/// Helper for tests and local backfill tools: turn the current reading set
/// into insert-kind change records in insertion order. Production change
/// feeds come from the underlying store driver, out of this crate's scope;
/// this exists purely to exercise the stream fan-in harness against the
/// in-memory backend.
pub fn change_feed_of<T: Clone>(items: Vec<T>) -> Vec<super::ChangeRecord<T>> {
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| super::ChangeRecord { sequence_number: i.to_string(), kind: ChangeKind::Insert, item })
        .collect()
}
