//! Humidity_Anomaly detector.

use serde_json::json;

use crate::config::defaults::event_detector as d;
use crate::types::{Event, EventType, Reading};

use super::{in_window, valid};

pub(super) fn detect(combined: &[Reading], current: &Reading) -> Option<Event> {
    valid(current.humidity_status, current.humidity)?;
    let window = in_window(combined, current.timestamp_ms, d::HUMIDITY_ANOMALY_WINDOW_HOURS * 3_600_000);
    let values: Vec<(i64, f64)> =
        window.iter().filter_map(|r| valid(r.humidity_status, r.humidity).map(|v| (r.timestamp_ms, v))).collect();
    if values.is_empty() {
        return None;
    }

    let min = values.iter().cloned().fold((i64::MAX, f64::MAX), |acc, (ts, v)| if v < acc.1 { (ts, v) } else { acc });
    let max = values.iter().cloned().fold((i64::MIN, f64::MIN), |acc, (ts, v)| if v > acc.1 { (ts, v) } else { acc });
    let range_pct = max.1 - min.1;
    if range_pct <= d::HUMIDITY_ANOMALY_RANGE_THRESHOLD_PCT {
        return None;
    }

    let start_ms = values.iter().map(|(ts, _)| *ts).min().unwrap_or(current.timestamp_ms);
    Some(Event {
        hardware_id: current.hardware_id.clone(),
        event_type: EventType::HumidityAnomaly,
        start_time_ms: start_ms,
        end_time_ms: current.timestamp_ms,
        sensor_values: [
            ("humidity_min".to_string(), json!(min.1)),
            ("humidity_max".to_string(), json!(max.1)),
            ("range_pct".to_string(), json!(range_pct)),
        ]
        .into_iter()
        .collect(),
        detection_metadata: std::collections::HashMap::new(),
        created_at_ms: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SensorStatus;

    fn reading(ts_ms: i64, humidity: f64) -> Reading {
        Reading {
            hardware_id: "dev-1".to_string(),
            batch_id: format!("b-{ts_ms}"),
            timestamp_ms: ts_ms,
            ingest_time_ms: ts_ms,
            temperature: Some(20.0),
            humidity: Some(humidity),
            pressure: Some(1000.0),
            soil_moisture: Some(40.0),
            temperature_status: SensorStatus::Ok,
            humidity_status: SensorStatus::Ok,
            pressure_status: SensorStatus::Ok,
            soil_moisture_status: SensorStatus::Ok,
        }
    }

    #[test]
    fn wide_swing_within_an_hour_is_detected() {
        let r0 = reading(0, 40.0);
        let r1 = reading(30 * 60_000, 65.0);
        let combined = vec![r0, r1.clone()];
        let event = detect(&combined, &r1).expect("anomaly expected");
        assert_eq!(event.event_type, EventType::HumidityAnomaly);
    }

    #[test]
    fn small_swing_does_not_trigger() {
        let r0 = reading(0, 40.0);
        let r1 = reading(30 * 60_000, 45.0);
        let combined = vec![r0, r1.clone()];
        assert!(detect(&combined, &r1).is_none());
    }
}
