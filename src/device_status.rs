//! Device status maintenance.
//!
//! `DeviceStatus` has four disjoint writers — ingestion, the aggregator, the
//! event detector, and the insight generator — plus a shared error-append
//! path any of them can call on failure. Each writer gets its own
//! [`DeviceStatusPatch`] constructor so it can only ever touch the fields it
//! owns; [`append_error`] and [`record_error`] are the one path every
//! component shares.

use crate::config::defaults::device_status as d;
use crate::persistence::{DeviceStatusPatch, DeviceStatusStore, PersistenceError};
use crate::types::{DeviceStatus, ErrorRecord, HealthCategory, SensorStatusSummary};

/// Truncate an error message to at most `max_length` bytes, on a char
/// boundary, so it is safe to store without resplitting a multi-byte
/// character.
pub fn truncate_error_message(message: &str, max_length: usize) -> String {
    if message.len() <= max_length {
        return message.to_string();
    }
    let mut end = max_length;
    while end > 0 && !message.is_char_boundary(end) {
        end -= 1;
    }
    message[..end].to_string()
}

/// Append one error to `status`, truncating the message and keeping only the
/// most recent [`crate::config::defaults::device_status::MAX_ERROR_RECORDS`]
/// entries. Also refreshes the `last_error_*` summary fields used by
/// [`derive_health_category`].
pub fn append_error(status: &mut DeviceStatus, now_ms: i64, error_code: &str, error_message: &str) {
    let truncated = truncate_error_message(error_message, d::MAX_ERROR_MESSAGE_LEN);
    status.last_errors.push(ErrorRecord {
        timestamp_ms: now_ms,
        error_code: error_code.to_string(),
        error_message: truncated,
    });
    if status.last_errors.len() > d::MAX_ERROR_RECORDS {
        let overflow = status.last_errors.len() - d::MAX_ERROR_RECORDS;
        status.last_errors.drain(0..overflow);
    }
    status.last_error_at_ms = Some(now_ms);
    status.last_error_code = Some(error_code.to_string());
}

/// The per-device health category, derived fresh on every read rather than
/// stored. A recent error takes precedence over staleness: a
/// device erroring every few minutes is "failing", not "healthy".
pub fn derive_health_category(status: &DeviceStatus, now_ms: i64) -> HealthCategory {
    if let Some(last_error_at_ms) = status.last_error_at_ms {
        let hours_since_error = (now_ms - last_error_at_ms) as f64 / (3_600_000.0);
        if hours_since_error <= d::FAILING_WITHIN_HOURS as f64 {
            return HealthCategory::Failing;
        }
    }
    let Some(last_seen_ms) = status.last_seen_ingest_time_ms else {
        return HealthCategory::Missing;
    };
    let hours_since_seen = (now_ms - last_seen_ms) as f64 / (3_600_000.0);
    if hours_since_seen <= d::HEALTHY_WITHIN_HOURS as f64 {
        HealthCategory::Healthy
    } else if hours_since_seen <= d::STALE_WITHIN_HOURS as f64 {
        HealthCategory::Stale
    } else {
        HealthCategory::Missing
    }
}

/// Map a coverage fraction (`min(1.0, total_count / expected)`)
/// onto the coarse summary stored on [`DeviceStatus`].
pub fn coverage_to_status_summary(coverage_pct: f64) -> SensorStatusSummary {
    if coverage_pct >= d::COVERAGE_OK_THRESHOLD {
        SensorStatusSummary::Ok
    } else if coverage_pct >= d::COVERAGE_DEGRADED_THRESHOLD {
        SensorStatusSummary::Degraded
    } else {
        SensorStatusSummary::Missing
    }
}

impl DeviceStatusPatch {
    /// Ingestion's fields: last-seen timestamps, clock skew, and the
    /// device's configured reporting interval.
    pub fn from_ingestion(ingest_time_ms: i64, event_time_ms: i64, expected_interval_sec: i64) -> Self {
        Self {
            last_seen_ingest_time_ms: Some(ingest_time_ms),
            last_seen_event_time_ms: Some(event_time_ms),
            ingest_event_skew_seconds: Some((ingest_time_ms - event_time_ms) as f64 / 1000.0),
            expected_interval_sec: Some(expected_interval_sec),
            ..Default::default()
        }
    }

    /// The aggregator's fields: when it last ran for this device and the
    /// coverage it computed, with the derived status summary alongside it.
    pub fn from_aggregator(computed_at_ms: i64, coverage_pct: f64) -> Self {
        Self {
            last_aggregate_computed_at_ms: Some(computed_at_ms),
            coverage_pct_last_hour: Some(coverage_pct),
            sensor_status_summary: Some(coverage_to_status_summary(coverage_pct)),
            ..Default::default()
        }
    }

    /// The event detector's fields: when it last ran and the event-time it
    /// processed up to, plus pipeline lag (detection time minus event time).
    pub fn from_event_detector(detected_at_ms: i64, event_time_ms: i64) -> Self {
        Self {
            last_event_detected_at_ms: Some(detected_at_ms),
            last_processed_event_time_ms: Some(event_time_ms),
            pipeline_lag_seconds: Some((detected_at_ms - event_time_ms) as f64 / 1000.0),
            ..Default::default()
        }
    }

    /// The insight generator's single owned field.
    pub fn from_insight_generator(generated_at_ms: i64) -> Self {
        Self { last_insight_generated_at_ms: Some(generated_at_ms), ..Default::default() }
    }

    /// The shared error-append patch, usable by any component.
    pub fn error(error_code: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self { append_error: Some((error_code.into(), error_message.into())), ..Default::default() }
    }
}

/// Convenience wrapper so a call site doesn't need to construct a patch by
/// hand just to record a failure.
pub async fn record_error<S: DeviceStatusStore + ?Sized>(
    store: &S,
    hardware_id: &str,
    now_ms: i64,
    error_code: &str,
    error_message: &str,
) -> Result<(), PersistenceError> {
    store.apply_patch(hardware_id, DeviceStatusPatch::error(error_code, error_message), now_ms).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_leaves_short_messages_untouched() {
        assert_eq!(truncate_error_message("short", 256), "short");
    }

    #[test]
    fn truncate_caps_at_max_length() {
        let long = "x".repeat(300);
        assert_eq!(truncate_error_message(&long, 256).len(), 256);
    }

    #[test]
    fn append_error_keeps_only_most_recent_ten() {
        let mut status = DeviceStatus::new("dev-1");
        for i in 0..15 {
            append_error(&mut status, i, "E_TEST", "boom");
        }
        assert_eq!(status.last_errors.len(), d::MAX_ERROR_RECORDS);
        assert_eq!(status.last_errors.first().unwrap().timestamp_ms, 5);
        assert_eq!(status.last_errors.last().unwrap().timestamp_ms, 14);
        assert_eq!(status.last_error_at_ms, Some(14));
    }

    #[test]
    fn recent_error_overrides_otherwise_healthy_status() {
        let mut status = DeviceStatus::new("dev-1");
        status.last_seen_ingest_time_ms = Some(0);
        append_error(&mut status, 0, "E_TEST", "boom");
        assert_eq!(derive_health_category(&status, 0), HealthCategory::Failing);
    }

    #[test]
    fn health_category_falls_through_without_errors() {
        let mut status = DeviceStatus::new("dev-1");
        let hour_ms = 3_600_000;
        status.last_seen_ingest_time_ms = Some(0);
        assert_eq!(derive_health_category(&status, hour_ms), HealthCategory::Healthy);
        assert_eq!(derive_health_category(&status, 3 * hour_ms), HealthCategory::Stale);
        assert_eq!(derive_health_category(&status, 7 * hour_ms), HealthCategory::Missing);
    }

    #[test]
    fn missing_without_any_ingest_timestamp() {
        let status = DeviceStatus::new("dev-1");
        assert_eq!(derive_health_category(&status, 1_000_000), HealthCategory::Missing);
    }

    #[test]
    fn coverage_thresholds_map_to_expected_summary() {
        assert_eq!(coverage_to_status_summary(0.95), SensorStatusSummary::Ok);
        assert_eq!(coverage_to_status_summary(0.5), SensorStatusSummary::Degraded);
        assert_eq!(coverage_to_status_summary(0.1), SensorStatusSummary::Missing);
    }
}
