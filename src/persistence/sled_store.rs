//! Embedded-database persistence backend, for local/single-node deployment.
//!
//! One `sled` tree per table, JSON-encoded values (kept legible on disk
//! rather than reaching for a binary codec, matching this codebase's own
//! storage convention). Conditional writes use `Tree::compare_and_swap` in an
//! optimistic read-modify-write retry loop, since sled has no native
//! per-attribute update expression.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;

use super::{
    AggregateStore, ConditionalWriteOutcome, DeviceProfileStore, DeviceStatusPatch, DeviceStatusStore,
    EventStore, InsightRequestStore, InsightStore, PersistenceError, ProcessedReadingStore, ReadingStore,
    RollupStore,
};
use crate::types::{
    Aggregate, DeviceProfile, DeviceStatus, Event, Insight, InsightRequest, InsightRequestStatus,
    InsightRequestType, ProcessedReading, ProcessingStage, Reading, Rollup, WindowType,
};

pub struct SledStore {
    readings: sled::Tree,
    events: sled::Tree,
    aggregates: sled::Tree,
    device_profiles: sled::Tree,
    device_status: sled::Tree,
    insights: sled::Tree,
    insight_requests: sled::Tree,
    rollups: sled::Tree,
    processed_readings: sled::Tree,
}

fn ser<T: Serialize>(value: &T) -> Result<Vec<u8>, PersistenceError> {
    serde_json::to_vec(value).map_err(|e| PersistenceError::Serialization(e.to_string()))
}

fn de<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, PersistenceError> {
    serde_json::from_slice(bytes).map_err(|e| PersistenceError::Serialization(e.to_string()))
}

fn reading_key(hardware_id: &str, timestamp_ms: i64) -> Vec<u8> {
    format!("{hardware_id}#{timestamp_ms:020}").into_bytes()
}

fn event_key(hardware_id: &str, start_time_ms: i64) -> Vec<u8> {
    format!("{hardware_id}#{start_time_ms:020}").into_bytes()
}

fn aggregate_key(hardware_id: &str, window_type: WindowType, window_start_ms: i64) -> Vec<u8> {
    format!("{hardware_id}#{}#{window_start_ms:020}", window_type.as_str()).into_bytes()
}

fn insight_request_key(hardware_id: &str, request_time_ms: i64) -> Vec<u8> {
    format!("{hardware_id}#{request_time_ms:020}").into_bytes()
}

impl SledStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, PersistenceError> {
        let db = sled::open(path).map_err(|e| PersistenceError::Storage(e.to_string()))?;
        Ok(Self {
            readings: db.open_tree("readings").map_err(|e| PersistenceError::Storage(e.to_string()))?,
            events: db.open_tree("events").map_err(|e| PersistenceError::Storage(e.to_string()))?,
            aggregates: db.open_tree("aggregates").map_err(|e| PersistenceError::Storage(e.to_string()))?,
            device_profiles: db
                .open_tree("device_profiles")
                .map_err(|e| PersistenceError::Storage(e.to_string()))?,
            device_status: db.open_tree("device_status").map_err(|e| PersistenceError::Storage(e.to_string()))?,
            insights: db.open_tree("insights").map_err(|e| PersistenceError::Storage(e.to_string()))?,
            insight_requests: db
                .open_tree("insight_requests")
                .map_err(|e| PersistenceError::Storage(e.to_string()))?,
            rollups: db.open_tree("rollups").map_err(|e| PersistenceError::Storage(e.to_string()))?,
            processed_readings: db
                .open_tree("processed_readings")
                .map_err(|e| PersistenceError::Storage(e.to_string()))?,
        })
    }

    /// Optimistic read-modify-write: loads the row (or default), lets
    /// `mutate` update it, then CASes it back in. Retries on a lost race.
    fn read_modify_write<T, F>(tree: &sled::Tree, key: &[u8], default: T, mutate: F) -> Result<T, PersistenceError>
    where
        T: Serialize + DeserializeOwned + Clone,
        F: Fn(&mut T),
    {
        loop {
            let current = tree.get(key).map_err(|e| PersistenceError::Storage(e.to_string()))?;
            let mut value: T = match &current {
                Some(bytes) => de(bytes)?,
                None => default.clone(),
            };
            mutate(&mut value);
            let new_bytes = ser(&value)?;
            let result = tree
                .compare_and_swap(key, current.as_deref(), Some(new_bytes))
                .map_err(|e| PersistenceError::Storage(e.to_string()))?;
            if result.is_ok() {
                return Ok(value);
            }
            // Lost the race; retry with fresh state.
        }
    }
}

#[async_trait]
impl ReadingStore for SledStore {
    async fn put(&self, reading: Reading) -> Result<ConditionalWriteOutcome, PersistenceError> {
        let key = reading_key(&reading.hardware_id, reading.timestamp_ms);
        let bytes = ser(&reading)?;
        let result = self
            .readings
            .compare_and_swap(&key, None::<&[u8]>, Some(bytes))
            .map_err(|e| PersistenceError::Storage(e.to_string()))?;
        Ok(if result.is_ok() { ConditionalWriteOutcome::Applied } else { ConditionalWriteOutcome::ConditionFailed })
    }

    async fn get(&self, hardware_id: &str, timestamp_ms: i64) -> Result<Option<Reading>, PersistenceError> {
        let key = reading_key(hardware_id, timestamp_ms);
        match self.readings.get(key).map_err(|e| PersistenceError::Storage(e.to_string()))? {
            Some(bytes) => Ok(Some(de(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn range(
        &self,
        hardware_id: &str,
        start_ms: i64,
        end_ms: i64,
        limit: usize,
    ) -> Result<Vec<Reading>, PersistenceError> {
        let prefix = format!("{hardware_id}#");
        let mut rows = Vec::new();
        for item in self.readings.scan_prefix(prefix.as_bytes()) {
            let (_, bytes) = item.map_err(|e| PersistenceError::Storage(e.to_string()))?;
            let reading: Reading = de(&bytes)?;
            if reading.timestamp_ms >= start_ms && reading.timestamp_ms < end_ms {
                rows.push(reading);
                if rows.len() >= limit {
                    break;
                }
            }
        }
        Ok(rows)
    }
}

#[async_trait]
impl EventStore for SledStore {
    async fn put_if_absent(&self, event: Event) -> Result<ConditionalWriteOutcome, PersistenceError> {
        let key = event_key(&event.hardware_id, event.start_time_ms);
        let bytes = ser(&event)?;
        let result = self
            .events
            .compare_and_swap(&key, None::<&[u8]>, Some(bytes))
            .map_err(|e| PersistenceError::Storage(e.to_string()))?;
        Ok(if result.is_ok() { ConditionalWriteOutcome::Applied } else { ConditionalWriteOutcome::ConditionFailed })
    }

    async fn list_by_type_since(
        &self,
        hardware_id: &str,
        event_type: &str,
        since_ms: i64,
    ) -> Result<Vec<Event>, PersistenceError> {
        let prefix = format!("{hardware_id}#");
        let mut rows = Vec::new();
        for item in self.events.scan_prefix(prefix.as_bytes()) {
            let (_, bytes) = item.map_err(|e| PersistenceError::Storage(e.to_string()))?;
            let event: Event = de(&bytes)?;
            if event.event_type.as_str() == event_type && event.start_time_ms >= since_ms {
                rows.push(event);
            }
        }
        Ok(rows)
    }

    async fn range(&self, hardware_id: &str, start_ms: i64, end_ms: i64) -> Result<Vec<Event>, PersistenceError> {
        let prefix = format!("{hardware_id}#");
        let mut rows = Vec::new();
        for item in self.events.scan_prefix(prefix.as_bytes()) {
            let (_, bytes) = item.map_err(|e| PersistenceError::Storage(e.to_string()))?;
            let event: Event = de(&bytes)?;
            if event.start_time_ms >= start_ms && event.start_time_ms < end_ms {
                rows.push(event);
            }
        }
        Ok(rows)
    }
}

#[async_trait]
impl AggregateStore for SledStore {
    async fn get(
        &self,
        hardware_id: &str,
        window_type: WindowType,
        window_start_ms: i64,
    ) -> Result<Option<Aggregate>, PersistenceError> {
        let key = aggregate_key(hardware_id, window_type, window_start_ms);
        match self.aggregates.get(key).map_err(|e| PersistenceError::Storage(e.to_string()))? {
            Some(bytes) => Ok(Some(de(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, aggregate: Aggregate) -> Result<(), PersistenceError> {
        let key = aggregate_key(&aggregate.hardware_id, aggregate.window_type, aggregate.window_start_ms);
        let bytes = ser(&aggregate)?;
        self.aggregates.insert(key, bytes).map_err(|e| PersistenceError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn range(
        &self,
        hardware_id: &str,
        window_type: WindowType,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<Aggregate>, PersistenceError> {
        let prefix = format!("{hardware_id}#{}#", window_type.as_str());
        let mut rows = Vec::new();
        for item in self.aggregates.scan_prefix(prefix.as_bytes()) {
            let (_, bytes) = item.map_err(|e| PersistenceError::Storage(e.to_string()))?;
            let aggregate: Aggregate = de(&bytes)?;
            if aggregate.window_start_ms >= start_ms && aggregate.window_start_ms < end_ms {
                rows.push(aggregate);
            }
        }
        Ok(rows)
    }

    async fn devices_with_hourly_in_range(&self, start_ms: i64, end_ms: i64) -> Result<Vec<String>, PersistenceError> {
        let mut ids = Vec::new();
        for item in self.aggregates.iter() {
            let (_, bytes) = item.map_err(|e| PersistenceError::Storage(e.to_string()))?;
            let aggregate: Aggregate = de(&bytes)?;
            if aggregate.window_type == WindowType::Hourly
                && aggregate.window_start_ms < end_ms
                && aggregate.window_end_ms > start_ms
            {
                ids.push(aggregate.hardware_id);
            }
        }
        ids.sort();
        ids.dedup();
        Ok(ids)
    }
}

#[async_trait]
impl DeviceProfileStore for SledStore {
    async fn get(&self, hardware_id: &str) -> Result<Option<DeviceProfile>, PersistenceError> {
        match self.device_profiles.get(hardware_id).map_err(|e| PersistenceError::Storage(e.to_string()))? {
            Some(bytes) => Ok(Some(de(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, profile: DeviceProfile) -> Result<(), PersistenceError> {
        let bytes = ser(&profile)?;
        self.device_profiles
            .insert(profile.hardware_id.as_bytes(), bytes)
            .map_err(|e| PersistenceError::Storage(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl DeviceStatusStore for SledStore {
    async fn get(&self, hardware_id: &str) -> Result<Option<DeviceStatus>, PersistenceError> {
        match self.device_status.get(hardware_id).map_err(|e| PersistenceError::Storage(e.to_string()))? {
            Some(bytes) => Ok(Some(de(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn apply_patch(
        &self,
        hardware_id: &str,
        patch: DeviceStatusPatch,
        now_ms: i64,
    ) -> Result<(), PersistenceError> {
        let default = DeviceStatus::new(hardware_id);
        Self::read_modify_write(&self.device_status, hardware_id.as_bytes(), default, |status| {
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
            if let Some((code, message)) = &patch.append_error {
                crate::device_status::append_error(status, now_ms, code, message);
            }
            status.updated_at_ms = Some(now_ms);
        })?;
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<DeviceStatus>, PersistenceError> {
        let mut rows = Vec::new();
        for item in self.device_status.iter() {
            let (_, bytes) = item.map_err(|e| PersistenceError::Storage(e.to_string()))?;
            rows.push(de(&bytes)?);
        }
        Ok(rows)
    }
}

#[async_trait]
impl InsightStore for SledStore {
    async fn put(&self, insight: Insight) -> Result<(), PersistenceError> {
        let key = insight_request_key(&insight.hardware_id, insight.timestamp_ms);
        let bytes = ser(&insight)?;
        self.insights.insert(key, bytes).map_err(|e| PersistenceError::Storage(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl InsightRequestStore for SledStore {
    async fn put(&self, request: InsightRequest) -> Result<(), PersistenceError> {
        let key = insight_request_key(&request.hardware_id, request.request_time_ms);
        let bytes = ser(&request)?;
        self.insight_requests.insert(key, bytes).map_err(|e| PersistenceError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn fetch_pending(&self, limit: usize) -> Result<Vec<InsightRequest>, PersistenceError> {
        let mut rows = Vec::new();
        for item in self.insight_requests.iter() {
            let (_, bytes) = item.map_err(|e| PersistenceError::Storage(e.to_string()))?;
            let request: InsightRequest = de(&bytes)?;
            if request.status == InsightRequestStatus::Pending {
                rows.push(request);
                if rows.len() >= limit {
                    break;
                }
            }
        }
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
        let key = insight_request_key(hardware_id, request_time_ms);
        loop {
            let current = self.insight_requests.get(&key).map_err(|e| PersistenceError::Storage(e.to_string()))?;
            let Some(bytes) = current.clone() else {
                return Ok(false);
            };
            let mut request: InsightRequest = de(&bytes)?;
            if request.status != expected {
                return Ok(false);
            }
            request.status = next;
            if error_message.is_some() {
                request.error_message = error_message.clone();
            }
            if processed_at_ms.is_some() {
                request.processed_at_ms = processed_at_ms;
            }
            let new_bytes = ser(&request)?;
            let result = self
                .insight_requests
                .compare_and_swap(&key, Some(bytes), Some(new_bytes))
                .map_err(|e| PersistenceError::Storage(e.to_string()))?;
            if result.is_ok() {
                return Ok(true);
            }
        }
    }

    async fn count_event_driven_since(&self, hardware_id: &str, since_ms: i64) -> Result<u32, PersistenceError> {
        let prefix = format!("{hardware_id}#");
        let mut count = 0u32;
        for item in self.insight_requests.scan_prefix(prefix.as_bytes()) {
            let (_, bytes) = item.map_err(|e| PersistenceError::Storage(e.to_string()))?;
            let request: InsightRequest = de(&bytes)?;
            if request.request_type == InsightRequestType::Event && request.request_time_ms >= since_ms {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn latest_for_device_since(
        &self,
        hardware_id: &str,
        since_ms: i64,
    ) -> Result<Vec<InsightRequest>, PersistenceError> {
        let prefix = format!("{hardware_id}#");
        let mut rows = Vec::new();
        for item in self.insight_requests.scan_prefix(prefix.as_bytes()) {
            let (_, bytes) = item.map_err(|e| PersistenceError::Storage(e.to_string()))?;
            let request: InsightRequest = de(&bytes)?;
            if request.request_time_ms >= since_ms {
                rows.push(request);
            }
        }
        Ok(rows)
    }
}

#[async_trait]
impl RollupStore for SledStore {
    async fn increment(&self, rollup: Rollup) -> Result<(), PersistenceError> {
        let key = format!("{}#{}", rollup.bucket_key, rollup.metric_key).into_bytes();
        let default = Rollup {
            bucket_key: rollup.bucket_key.clone(),
            metric_key: rollup.metric_key.clone(),
            bucket_type: rollup.bucket_type,
            bucket_start_ms: rollup.bucket_start_ms,
            metric_name: rollup.metric_name.clone(),
            dimensions: rollup.dimensions.clone(),
            count: 0,
            sum: None,
            ttl_unix_secs: rollup.ttl_unix_secs,
        };
        Self::read_modify_write(&self.rollups, &key, default, |row| {
            row.count += rollup.count;
            if let Some(delta) = rollup.sum {
                row.sum = Some(row.sum.unwrap_or(0.0) + delta);
            }
        })?;
        Ok(())
    }
}

#[async_trait]
impl ProcessedReadingStore for SledStore {
    async fn mark_if_absent(
        &self,
        reading_id: &str,
        stage: ProcessingStage,
        now_ms: i64,
    ) -> Result<bool, PersistenceError> {
        let default = ProcessedReading {
            reading_id: reading_id.to_string(),
            ttl_unix_secs: now_ms / 1000 + crate::config::defaults::idempotency::PROCESSED_READING_TTL.as_secs() as i64,
            ..Default::default()
        };
        let mut obtained = false;
        Self::read_modify_write(&self.processed_readings, reading_id.as_bytes(), default, |row| {
            let slot = match stage {
                ProcessingStage::Event => &mut row.event_processed_at_ms,
                ProcessingStage::Aggregate => &mut row.aggregate_processed_at_ms,
                ProcessingStage::Status => &mut row.status_processed_at_ms,
            };
            if slot.is_none() {
                *slot = Some(now_ms);
                obtained = true;
            } else {
                obtained = false;
            }
        })?;
        Ok(obtained)
    }

    async fn is_processed(&self, reading_id: &str, stage: ProcessingStage) -> Result<bool, PersistenceError> {
        match self.processed_readings.get(reading_id).map_err(|e| PersistenceError::Storage(e.to_string()))? {
            Some(bytes) => {
                let row: ProcessedReading = de(&bytes)?;
                Ok(row.is_processed(stage))
            }
            None => Ok(false),
        }
    }
}
