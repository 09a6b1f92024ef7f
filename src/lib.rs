//! Plant telemetry insight engine.
//!
//! Ingests per-device environmental readings (temperature, humidity,
//! pressure, soil moisture), validates and stores them, derives rolling
//! aggregates and events, tracks per-device health status, and periodically
//! produces LLM-backed natural-language insights grounded in that telemetry.
//!
//! ## Pipeline
//!
//! - [`ingest`] — per-reading entry point: sensor validation, storage,
//!   idempotency-gated device-status update, rollup counters.
//! - [`aggregator`] — hourly/daily/weekly statistical rollups of readings.
//! - [`event_detector`] — rule-based detection (watering, drying,
//!   temperature/humidity stress, environmental swings).
//! - [`profile_learner`] — derives a device's expected reporting cadence and
//!   normal-value bounds from its own history.
//! - [`device_status`] — per-device health snapshot, written by every other
//!   component via field-scoped patches.
//! - [`insight`] — scheduler and generator for LLM-backed insights.
//! - [`rollup`] — operational metrics counters, fed by every stage above.
//!
//! ## Ambient
//!
//! - [`persistence`] — storage trait contract plus the `sled`-backed and
//!   in-memory implementations.
//! - [`config`] — operator-tunable settings and built-in defaults.
//! - [`clock`] — injected time source (no component reads the wall clock
//!   directly).
//! - [`idempotency`] — the `(reading_id, stage)` claim ledger shared by
//!   aggregator, event detector, and device status.
//! - [`stream`] — per-record failure isolation for change-feed consumers.
//! - [`retry`] — bounded exponential backoff, used by the LLM client.
//! - [`sensor_validation`] — range/staleness/noise checks applied to raw
//!   sensor values before storage.
//! - [`time_utils`] — window-boundary arithmetic shared by the aggregator
//!   and insight generator.

pub mod aggregator;
pub mod clock;
pub mod config;
pub mod device_status;
pub mod event_detector;
pub mod idempotency;
pub mod ingest;
pub mod insight;
pub mod persistence;
pub mod profile_learner;
pub mod retry;
pub mod rollup;
pub mod sensor_validation;
pub mod stream;
pub mod time_utils;
pub mod types;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{EngineConfig, LlmConfig};
pub use persistence::{MemoryStore, PersistenceError, SledStore, Store};
