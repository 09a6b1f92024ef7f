//! Watering_Event detector.

use serde_json::json;

use crate::config::defaults::event_detector as d;
use crate::types::{Event, EventType, Reading};

use super::{in_window, valid};

/// Rapid spike takes precedence over gradual rise; only one of the two
/// candidates is ever returned.
pub(super) fn detect(combined: &[Reading], current: &Reading) -> Option<Event> {
    rapid_spike(combined, current).or_else(|| gradual_rise(combined, current))
}

fn rapid_spike(combined: &[Reading], current: &Reading) -> Option<Event> {
    let current_moisture = valid(current.soil_moisture_status, current.soil_moisture)?;
    let window = in_window(combined, current.timestamp_ms, d::WATERING_RAPID_SPIKE_WINDOW_MIN * 60_000);
    let baseline = min_moisture(&window)?;
    let increase_pct = current_moisture - baseline.1;
    if increase_pct <= d::WATERING_RAPID_SPIKE_THRESHOLD_PCT {
        return None;
    }
    Some(build_event(baseline.0, current, baseline.1, current_moisture, "rapid_spike"))
}

fn gradual_rise(combined: &[Reading], current: &Reading) -> Option<Event> {
    let current_moisture = valid(current.soil_moisture_status, current.soil_moisture)?;
    let window = in_window(combined, current.timestamp_ms, d::WATERING_GRADUAL_RISE_WINDOW_MIN * 60_000);
    let prior_count = window.iter().filter(|r| r.timestamp_ms != current.timestamp_ms).count();
    if prior_count < 2 {
        return None;
    }
    let baseline = min_moisture(&window)?;
    let increase_pct = current_moisture - baseline.1;
    if increase_pct < d::WATERING_GRADUAL_RISE_THRESHOLD_PCT {
        return None;
    }
    if positive_slope_count(&window) < 2 {
        return None;
    }
    Some(build_event(baseline.0, current, baseline.1, current_moisture, "gradual_rise"))
}

/// `(timestamp of earliest occurrence of the minimum, minimum value)` across
/// valid soil-moisture readings in the window.
fn min_moisture(window: &[Reading]) -> Option<(i64, f64)> {
    let mut best: Option<(i64, f64)> = None;
    for r in window {
        let Some(value) = valid(r.soil_moisture_status, r.soil_moisture) else { continue };
        if best.map_or(true, |(_, min)| value < min) {
            best = Some((r.timestamp_ms, value));
        }
    }
    best
}

fn positive_slope_count(window: &[Reading]) -> usize {
    let values: Vec<f64> = window.iter().filter_map(|r| valid(r.soil_moisture_status, r.soil_moisture)).collect();
    values.windows(2).filter(|pair| pair[1] > pair[0]).count()
}

fn build_event(start_ms: i64, current: &Reading, baseline: f64, current_moisture: f64, mode: &str) -> Event {
    Event {
        hardware_id: current.hardware_id.clone(),
        event_type: EventType::WateringEvent,
        start_time_ms: start_ms,
        end_time_ms: current.timestamp_ms,
        sensor_values: [
            ("moisture_start".to_string(), json!(baseline)),
            ("moisture_end".to_string(), json!(current_moisture)),
            ("increase_pct".to_string(), json!(current_moisture - baseline)),
        ]
        .into_iter()
        .collect(),
        detection_metadata: [("mode".to_string(), json!(mode))].into_iter().collect(),
        created_at_ms: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SensorStatus;

    fn reading(ts_ms: i64, moisture: f64) -> Reading {
        Reading {
            hardware_id: "dev-1".to_string(),
            batch_id: format!("b-{ts_ms}"),
            timestamp_ms: ts_ms,
            ingest_time_ms: ts_ms,
            temperature: Some(20.0),
            humidity: Some(50.0),
            pressure: Some(1000.0),
            soil_moisture: Some(moisture),
            temperature_status: SensorStatus::Ok,
            humidity_status: SensorStatus::Ok,
            pressure_status: SensorStatus::Ok,
            soil_moisture_status: SensorStatus::Ok,
        }
    }

    #[test]
    fn rapid_spike_is_detected_from_a_steep_moisture_jump() {
        let r0 = reading(0, 30.0);
        let r1 = reading(600_000, 31.0);
        let r2 = reading(1_500_000, 50.0);
        let combined = vec![r0, r1, r2.clone()];
        let event = detect(&combined, &r2).expect("rapid spike expected");
        assert_eq!(event.start_time_ms, 0);
        assert_eq!(event.end_time_ms, 1_500_000);
        assert_eq!(event.detection_metadata.get("mode").unwrap(), "rapid_spike");
    }

    #[test]
    fn small_increase_does_not_trigger() {
        let r0 = reading(0, 30.0);
        let r1 = reading(600_000, 33.0);
        let combined = vec![r0, r1.clone()];
        assert!(detect(&combined, &r1).is_none());
    }

    #[test]
    fn gradual_rise_requires_consistent_upward_slope() {
        let r0 = reading(0, 20.0);
        let r1 = reading(20 * 60_000, 25.0);
        let r2 = reading(40 * 60_000, 31.0);
        let combined = vec![r0, r1, r2.clone()];
        let event = detect(&combined, &r2).expect("gradual rise expected");
        assert_eq!(event.detection_metadata.get("mode").unwrap(), "gradual_rise");
    }
}
