//! Shared data structures for the plant telemetry insight pipeline.
//!
//! - `reading` — raw sensor readings as they arrive from ingestion
//! - `aggregate` — per-device, per-window statistical rollups
//! - `event` — detected physical events (waterings, stress, drying)
//! - `device_profile` — learned + user-owned per-device configuration
//! - `device_status` — cross-pipeline health signals
//! - `insight` / `insight_request` — LLM-generated advisories and their queue
//! - `rollup` — operational metrics, bucketed by minute/hour
//! - `processed_reading` — the idempotency ledger row shape

mod aggregate;
mod device_profile;
mod device_status;
mod event;
mod insight;
mod insight_request;
mod processed_reading;
mod reading;
mod rollup;

pub use aggregate::*;
pub use device_profile::*;
pub use device_status::*;
pub use event::*;
pub use insight::*;
pub use insight_request::*;
pub use processed_reading::*;
pub use reading::*;
pub use rollup::*;
