//! Environmental_Change detector. Requires temperature, humidity,
//! and pressure to all be `ok` on every reading considered.

use serde_json::json;

use crate::config::defaults::event_detector as d;
use crate::types::{Event, EventType, Reading, SensorStatus};

use super::in_window;

fn fully_ok(r: &Reading) -> bool {
    r.temperature_status == SensorStatus::Ok
        && r.humidity_status == SensorStatus::Ok
        && r.pressure_status == SensorStatus::Ok
        && r.temperature.is_some()
        && r.humidity.is_some()
        && r.pressure.is_some()
}

fn range(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (min, max) = values.fold((None, None), |(min, max): (Option<f64>, Option<f64>), v| {
        (Some(min.map_or(v, |m: f64| m.min(v))), Some(max.map_or(v, |m: f64| m.max(v))))
    });
    Some(max? - min?)
}

pub(super) fn detect(combined: &[Reading], current: &Reading) -> Option<Event> {
    if !fully_ok(current) {
        return None;
    }
    let window = in_window(combined, current.timestamp_ms, d::ENVIRONMENTAL_CHANGE_WINDOW_HOURS * 3_600_000);
    let qualifying: Vec<&&Reading> = window.iter().filter(|r| fully_ok(r)).collect();
    if qualifying.is_empty() {
        return None;
    }

    let temp_range = range(qualifying.iter().filter_map(|r| r.temperature))?;
    let humidity_range = range(qualifying.iter().filter_map(|r| r.humidity))?;
    let pressure_range = range(qualifying.iter().filter_map(|r| r.pressure))?;

    if temp_range <= d::ENVIRONMENTAL_TEMP_RANGE_THRESHOLD_C
        || humidity_range <= d::ENVIRONMENTAL_HUMIDITY_RANGE_THRESHOLD_PCT
        || pressure_range <= d::ENVIRONMENTAL_PRESSURE_RANGE_THRESHOLD
    {
        return None;
    }

    let start_ms = qualifying.iter().map(|r| r.timestamp_ms).min().unwrap_or(current.timestamp_ms);
    Some(Event {
        hardware_id: current.hardware_id.clone(),
        event_type: EventType::EnvironmentalChange,
        start_time_ms: start_ms,
        end_time_ms: current.timestamp_ms,
        sensor_values: [
            ("temperature_range".to_string(), json!(temp_range)),
            ("humidity_range".to_string(), json!(humidity_range)),
            ("pressure_range".to_string(), json!(pressure_range)),
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

    fn reading(ts_ms: i64, temperature: f64, humidity: f64, pressure: f64) -> Reading {
        Reading {
            hardware_id: "dev-1".to_string(),
            batch_id: format!("b-{ts_ms}"),
            timestamp_ms: ts_ms,
            ingest_time_ms: ts_ms,
            temperature: Some(temperature),
            humidity: Some(humidity),
            pressure: Some(pressure),
            soil_moisture: Some(40.0),
            temperature_status: SensorStatus::Ok,
            humidity_status: SensorStatus::Ok,
            pressure_status: SensorStatus::Ok,
            soil_moisture_status: SensorStatus::Ok,
        }
    }

    #[test]
    fn coordinated_swing_across_all_three_sensors_is_detected() {
        let r0 = reading(0, 15.0, 40.0, 1000.0);
        let r1 = reading(3_600_000, 27.0, 60.0, 1012.0);
        let combined = vec![r0, r1.clone()];
        let event = detect(&combined, &r1).expect("environmental change expected");
        assert_eq!(event.event_type, EventType::EnvironmentalChange);
    }

    #[test]
    fn temperature_alone_does_not_trigger() {
        let r0 = reading(0, 15.0, 40.0, 1000.0);
        let r1 = reading(3_600_000, 27.0, 41.0, 1001.0);
        let combined = vec![r0, r1.clone()];
        assert!(detect(&combined, &r1).is_none());
    }
}
