//! Temperature_Stress detector. Single-sample: strict boundaries,
//! 35.0/5.0 exactly do not trigger.

use serde_json::json;

use crate::config::defaults::event_detector as d;
use crate::types::{Event, EventType, Reading};

use super::valid;

pub(super) fn detect(current: &Reading) -> Option<Event> {
    let temperature = valid(current.temperature_status, current.temperature)?;
    let stress_type = if temperature > d::TEMPERATURE_HIGH_THRESHOLD_C {
        "high"
    } else if temperature < d::TEMPERATURE_LOW_THRESHOLD_C {
        "low"
    } else {
        return None;
    };

    Some(Event {
        hardware_id: current.hardware_id.clone(),
        event_type: EventType::TemperatureStress,
        start_time_ms: current.timestamp_ms,
        end_time_ms: current.timestamp_ms,
        sensor_values: [("temperature".to_string(), json!(temperature))].into_iter().collect(),
        detection_metadata: [("stress_type".to_string(), json!(stress_type))].into_iter().collect(),
        created_at_ms: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SensorStatus;

    fn reading(temperature: f64) -> Reading {
        Reading {
            hardware_id: "dev-1".to_string(),
            batch_id: "b1".to_string(),
            timestamp_ms: 0,
            ingest_time_ms: 0,
            temperature: Some(temperature),
            humidity: Some(50.0),
            pressure: Some(1000.0),
            soil_moisture: Some(40.0),
            temperature_status: SensorStatus::Ok,
            humidity_status: SensorStatus::Ok,
            pressure_status: SensorStatus::Ok,
            soil_moisture_status: SensorStatus::Ok,
        }
    }

    #[test]
    fn exactly_at_high_boundary_does_not_trigger() {
        assert!(detect(&reading(35.0)).is_none());
    }

    #[test]
    fn just_above_high_boundary_triggers() {
        let event = detect(&reading(35.1)).expect("stress expected");
        assert_eq!(event.detection_metadata.get("stress_type").unwrap(), "high");
    }

    #[test]
    fn exactly_at_low_boundary_does_not_trigger() {
        assert!(detect(&reading(5.0)).is_none());
    }

    #[test]
    fn below_low_boundary_triggers() {
        let event = detect(&reading(4.9)).expect("stress expected");
        assert_eq!(event.detection_metadata.get("stress_type").unwrap(), "low");
    }
}
