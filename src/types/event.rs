//! Detected physical events.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    WateringEvent,
    DryingCycle,
    TemperatureStress,
    HumidityAnomaly,
    EnvironmentalChange,
}

impl EventType {
    /// Matches the source system's wire representation exactly
    /// (`Watering_Event`, not `watering_event`).
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::WateringEvent => "Watering_Event",
            EventType::DryingCycle => "Drying_Cycle",
            EventType::TemperatureStress => "Temperature_Stress",
            EventType::HumidityAnomaly => "Humidity_Anomaly",
            EventType::EnvironmentalChange => "Environmental_Change",
        }
    }

    /// Cooldown window for this event type, or `None` for "no cooldown".
    pub fn cooldown(self) -> Option<std::time::Duration> {
        use crate::config::defaults::event_detector as d;
        match self {
            EventType::WateringEvent => Some(d::WATERING_COOLDOWN),
            EventType::TemperatureStress => Some(d::TEMPERATURE_STRESS_COOLDOWN),
            EventType::HumidityAnomaly => Some(d::HUMIDITY_ANOMALY_COOLDOWN),
            EventType::EnvironmentalChange => Some(d::ENVIRONMENTAL_CHANGE_COOLDOWN),
            EventType::DryingCycle => None,
        }
    }
}

/// A detected event, keyed by `(hardware_id, start_time_ms)`. A second insert
/// with the same key is a no-op dedup, not an error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub hardware_id: String,
    pub event_type: EventType,
    pub start_time_ms: i64,
    pub end_time_ms: i64,
    pub sensor_values: HashMap<String, Value>,
    pub detection_metadata: HashMap<String, Value>,
    pub created_at_ms: Option<i64>,
}
