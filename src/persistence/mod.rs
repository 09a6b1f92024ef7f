//! Abstract persistence boundary.
//!
//! The core assumes a key-value store providing primary-key get/put,
//! conditional put (insert-if-absent), conditional field-scoped update,
//! atomic numeric add, per-partition range queries, a per-table change feed,
//! and per-row TTL. This module defines that contract as traits so
//! the pipeline code is backend-agnostic; [`memory`] and [`sled_store`]
//! provide two implementations.

mod memory;
mod sled_store;

pub use memory::MemoryStore;
pub use sled_store::SledStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{
    Aggregate, DeviceProfile, DeviceStatus, Event, Insight, InsightRequest, ProcessedReading,
    ProcessingStage, Reading, Rollup, WindowType,
};

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("not found")]
    NotFound,
}

/// Outcome of a conditional write. `Inserted` means the caller's write took
/// effect; `AlreadyExists`/`ConditionFailed` are not errors — they signal
/// dedup or a lost ownership race and the caller should advance silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionalWriteOutcome {
    Applied,
    ConditionFailed,
}

/// Kind of a change-feed record, mirroring the underlying store's notion of
/// insert/modify/remove. Only `Insert`/`Modify` are ever handed to workers —
/// tombstones are filtered by the stream fan-in harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Modify,
}

/// One record delivered by a change feed, carrying enough identity for the
/// stream fan-in harness to report it as a failed item on error.
#[derive(Debug, Clone)]
pub struct ChangeRecord<T> {
    pub sequence_number: String,
    pub kind: ChangeKind,
    pub item: T,
}

/// Readings table.
#[async_trait]
pub trait ReadingStore: Send + Sync {
    async fn put(&self, reading: Reading) -> Result<ConditionalWriteOutcome, PersistenceError>;
    async fn get(&self, hardware_id: &str, timestamp_ms: i64) -> Result<Option<Reading>, PersistenceError>;
    async fn range(
        &self,
        hardware_id: &str,
        start_ms: i64,
        end_ms: i64,
        limit: usize,
    ) -> Result<Vec<Reading>, PersistenceError>;
}

/// Events table.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Conditional insert against `(hardware_id, start_time_ms)`; a
    /// `ConditionFailed` outcome means the event already existed and is a
    /// successful dedup, not an error.
    async fn put_if_absent(&self, event: Event) -> Result<ConditionalWriteOutcome, PersistenceError>;
    async fn list_by_type_since(
        &self,
        hardware_id: &str,
        event_type: &str,
        since_ms: i64,
    ) -> Result<Vec<Event>, PersistenceError>;
    async fn range(&self, hardware_id: &str, start_ms: i64, end_ms: i64) -> Result<Vec<Event>, PersistenceError>;
}

/// Aggregates table.
#[async_trait]
pub trait AggregateStore: Send + Sync {
    async fn get(
        &self,
        hardware_id: &str,
        window_type: WindowType,
        window_start_ms: i64,
    ) -> Result<Option<Aggregate>, PersistenceError>;
    async fn put(&self, aggregate: Aggregate) -> Result<(), PersistenceError>;
    async fn range(
        &self,
        hardware_id: &str,
        window_type: WindowType,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<Aggregate>, PersistenceError>;
    /// Every distinct `hardware_id` with an hourly aggregate intersecting
    /// `[start_ms, end_ms)`. Backed by a full scan; a production deployment
    /// would maintain a health-index-backed listing instead.
    async fn devices_with_hourly_in_range(&self, start_ms: i64, end_ms: i64) -> Result<Vec<String>, PersistenceError>;
}

/// Device profiles table.
#[async_trait]
pub trait DeviceProfileStore: Send + Sync {
    async fn get(&self, hardware_id: &str) -> Result<Option<DeviceProfile>, PersistenceError>;
    async fn put(&self, profile: DeviceProfile) -> Result<(), PersistenceError>;
}

/// Device status table. All writes are field-scoped patches, never full-row
/// puts, enforced by the shape of [`DeviceStatusPatch`].
#[async_trait]
pub trait DeviceStatusStore: Send + Sync {
    async fn get(&self, hardware_id: &str) -> Result<Option<DeviceStatus>, PersistenceError>;
    async fn apply_patch(
        &self,
        hardware_id: &str,
        patch: DeviceStatusPatch,
        now_ms: i64,
    ) -> Result<(), PersistenceError>;
    async fn list_all(&self) -> Result<Vec<DeviceStatus>, PersistenceError>;
}

/// A field-scoped update to [`DeviceStatus`]. Every field is optional; only
/// `Some` fields are written. Constructors on this type (in
/// `crate::device_status`) are grouped by owning component so a caller can
/// only ever build the patch shape its component is allowed to write.
#[derive(Debug, Clone, Default)]
pub struct DeviceStatusPatch {
    pub last_seen_event_time_ms: Option<i64>,
    pub last_seen_ingest_time_ms: Option<i64>,
    pub sensor_status_summary: Option<crate::types::SensorStatusSummary>,
    pub last_aggregate_computed_at_ms: Option<i64>,
    pub coverage_pct_last_hour: Option<f64>,
    pub last_event_detected_at_ms: Option<i64>,
    pub last_processed_event_time_ms: Option<i64>,
    pub last_insight_generated_at_ms: Option<i64>,
    pub ingest_event_skew_seconds: Option<f64>,
    pub pipeline_lag_seconds: Option<f64>,
    pub expected_interval_sec: Option<i64>,
    pub append_error: Option<(String, String)>, // (error_code, error_message)
}

/// Insights table.
#[async_trait]
pub trait InsightStore: Send + Sync {
    async fn put(&self, insight: Insight) -> Result<(), PersistenceError>;
}

/// Insight requests table / queue.
#[async_trait]
pub trait InsightRequestStore: Send + Sync {
    async fn put(&self, request: InsightRequest) -> Result<(), PersistenceError>;
    async fn fetch_pending(&self, limit: usize) -> Result<Vec<InsightRequest>, PersistenceError>;
    /// Compare-and-swap the status field; `Ok(false)` means another worker
    /// won the race (not an error).
    async fn try_transition(
        &self,
        hardware_id: &str,
        request_time_ms: i64,
        expected: crate::types::InsightRequestStatus,
        next: crate::types::InsightRequestStatus,
        error_message: Option<String>,
        processed_at_ms: Option<i64>,
    ) -> Result<bool, PersistenceError>;
    async fn count_event_driven_since(&self, hardware_id: &str, since_ms: i64) -> Result<u32, PersistenceError>;
    async fn latest_for_device_since(
        &self,
        hardware_id: &str,
        since_ms: i64,
    ) -> Result<Vec<InsightRequest>, PersistenceError>;
}

/// Rollups table.
#[async_trait]
pub trait RollupStore: Send + Sync {
    async fn increment(
        &self,
        rollup: Rollup,
    ) -> Result<(), PersistenceError>;
}

/// Idempotency ledger.
#[async_trait]
pub trait ProcessedReadingStore: Send + Sync {
    /// Atomically sets `<stage>_processed_at_ms = now_ms` iff that column was
    /// previously absent. Returns whether the caller obtained ownership.
    async fn mark_if_absent(
        &self,
        reading_id: &str,
        stage: ProcessingStage,
        now_ms: i64,
    ) -> Result<bool, PersistenceError>;
    async fn is_processed(&self, reading_id: &str, stage: ProcessingStage) -> Result<bool, PersistenceError>;
}

/// Aggregate of every table handle, passed to workers as one dependency.
pub trait Store:
    ReadingStore
    + EventStore
    + AggregateStore
    + DeviceProfileStore
    + DeviceStatusStore
    + InsightStore
    + InsightRequestStore
    + RollupStore
    + ProcessedReadingStore
{
}

impl<T> Store for T where
    T: ReadingStore
        + EventStore
        + AggregateStore
        + DeviceProfileStore
        + DeviceStatusStore
        + InsightStore
        + InsightRequestStore
        + RollupStore
        + ProcessedReadingStore
{
}
