//! Per-sensor reading validation.
//!
//! The reference this crate is modeled on never implemented this module —
//! only documented the intended checks (range, staleness, noise, missing).
//! This is that implementation, built from those documented thresholds
//! ([`crate::config::defaults::sensor_validation`]).

use crate::config::defaults::sensor_validation as d;
use crate::types::SensorStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    Temperature,
    Humidity,
    Pressure,
    SoilMoisture,
}

impl SensorKind {
    fn range(self) -> (f64, f64) {
        match self {
            SensorKind::Temperature => d::TEMPERATURE_RANGE_C,
            SensorKind::Humidity => d::HUMIDITY_RANGE_PCT,
            SensorKind::Pressure => d::PRESSURE_RANGE_HPA,
            SensorKind::SoilMoisture => d::SOIL_MOISTURE_RANGE_PCT,
        }
    }
}

/// Validate one sensor value against its physical range and, if in range,
/// against the staleness/noise patterns visible in `recent_values` (the
/// sensor's prior values for this device, oldest first, most recent last).
/// Range is checked first: an out-of-range value is reported as such even if
/// it also happens to look "stale" or "noisy".
pub fn validate_value(kind: SensorKind, value: Option<f64>, recent_values: &[f64]) -> SensorStatus {
    let Some(v) = value else {
        return SensorStatus::Missing;
    };
    let (min, max) = kind.range();
    if v < min || v > max {
        return SensorStatus::OutOfRange;
    }
    if is_stale(v, recent_values) {
        return SensorStatus::Stale;
    }
    if let Some(&previous) = recent_values.last() {
        if is_noisy(previous, v) {
            return SensorStatus::Noisy;
        }
    }
    SensorStatus::Ok
}

/// True if `value` matches its `STALENESS_CONSECUTIVE_COUNT - 1` immediate
/// predecessors exactly, i.e. the sensor has reported the same reading for
/// `STALENESS_CONSECUTIVE_COUNT` samples in a row.
fn is_stale(value: f64, recent_values: &[f64]) -> bool {
    let needed = d::STALENESS_CONSECUTIVE_COUNT - 1;
    if recent_values.len() < needed {
        return false;
    }
    recent_values.iter().rev().take(needed).all(|&v| (v - value).abs() < f64::EPSILON)
}

/// True if the single-step change from `previous` to `current` exceeds
/// `NOISE_CHANGE_FRACTION` of `previous`'s magnitude.
fn is_noisy(previous: f64, current: f64) -> bool {
    if previous == 0.0 {
        return false;
    }
    ((current - previous).abs() / previous.abs()) > d::NOISE_CHANGE_FRACTION
}

/// True if a device hasn't reported at all within
/// [`crate::config::defaults::sensor_validation::MISSING_AFTER_HOURS`].
pub fn is_device_missing(last_seen_ingest_time_ms: Option<i64>, now_ms: i64) -> bool {
    match last_seen_ingest_time_ms {
        None => true,
        Some(last) => (now_ms - last) > d::MISSING_AFTER_HOURS * 3_600_000,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_value_is_reported_missing() {
        assert_eq!(validate_value(SensorKind::Temperature, None, &[]), SensorStatus::Missing);
    }

    #[test]
    fn out_of_range_wins_over_staleness() {
        let recent = vec![200.0; 6];
        assert_eq!(validate_value(SensorKind::Temperature, Some(200.0), &recent), SensorStatus::OutOfRange);
    }

    #[test]
    fn identical_run_is_flagged_stale() {
        let recent = vec![22.0, 22.0, 22.0, 22.0, 22.0];
        assert_eq!(validate_value(SensorKind::Temperature, Some(22.0), &recent), SensorStatus::Stale);
    }

    #[test]
    fn short_run_of_identical_values_is_not_yet_stale() {
        let recent = vec![22.0, 22.0];
        assert_eq!(validate_value(SensorKind::Temperature, Some(22.0), &recent), SensorStatus::Ok);
    }

    #[test]
    fn large_single_step_change_is_flagged_noisy() {
        let recent = vec![20.0];
        assert_eq!(validate_value(SensorKind::Temperature, Some(40.0), &recent), SensorStatus::Noisy);
    }

    #[test]
    fn small_step_change_is_ok() {
        let recent = vec![20.0];
        assert_eq!(validate_value(SensorKind::Temperature, Some(21.0), &recent), SensorStatus::Ok);
    }

    #[test]
    fn device_missing_after_threshold_hours() {
        let two_hours_ms = 2 * 3_600_000;
        assert!(!is_device_missing(Some(0), two_hours_ms));
        assert!(is_device_missing(Some(0), two_hours_ms + 1));
        assert!(is_device_missing(None, 0));
    }
}
