//! Per-device health status, maintained by four disjoint writers (see
//! [`crate::device_status`]).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SensorStatusSummary {
    #[default]
    Ok,
    Degraded,
    Missing,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HealthCategory {
    Healthy,
    Stale,
    Missing,
    Failing,
}

/// One entry in the bounded `last_errors` list. `error_message` is always
/// truncated to 256 characters before storage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorRecord {
    pub timestamp_ms: i64,
    pub error_code: String,
    pub error_message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceStatus {
    pub hardware_id: String,
    pub last_seen_event_time_ms: Option<i64>,
    pub last_seen_ingest_time_ms: Option<i64>,
    pub expected_interval_sec: i64,
    pub last_processed_event_time_ms: Option<i64>,
    pub ingest_event_skew_seconds: Option<f64>,
    pub pipeline_lag_seconds: Option<f64>,
    pub coverage_pct_last_hour: Option<f64>,
    pub sensor_status_summary: SensorStatusSummary,
    pub last_event_detected_at_ms: Option<i64>,
    pub last_aggregate_computed_at_ms: Option<i64>,
    pub last_insight_generated_at_ms: Option<i64>,
    pub last_error_at_ms: Option<i64>,
    pub last_error_code: Option<String>,
    pub last_errors: Vec<ErrorRecord>,
    pub updated_at_ms: Option<i64>,
}

impl DeviceStatus {
    pub fn new(hardware_id: impl Into<String>) -> Self {
        Self {
            hardware_id: hardware_id.into(),
            last_seen_event_time_ms: None,
            last_seen_ingest_time_ms: None,
            expected_interval_sec: crate::config::defaults::profile::DEFAULT_EXPECTED_INTERVAL_SEC,
            last_processed_event_time_ms: None,
            ingest_event_skew_seconds: None,
            pipeline_lag_seconds: None,
            coverage_pct_last_hour: None,
            sensor_status_summary: SensorStatusSummary::Ok,
            last_event_detected_at_ms: None,
            last_aggregate_computed_at_ms: None,
            last_insight_generated_at_ms: None,
            last_error_at_ms: None,
            last_error_code: None,
            last_errors: Vec::new(),
            updated_at_ms: None,
        }
    }
}
