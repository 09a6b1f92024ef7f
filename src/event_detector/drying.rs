//! Drying_Cycle detector. No cooldown: the event key
//! (hardware_id, start_time_ms) is fixed while the qualifying maximum stays
//! the earliest sample in the lookback window, so a later reading that keeps
//! declining naturally dedups against the conditional insert instead of
//! needing an explicit cooldown.

use serde_json::json;

use crate::config::defaults::event_detector as d;
use crate::types::{Event, EventType, Reading};

use super::{in_window, valid};

pub(super) fn detect(combined: &[Reading], current: &Reading) -> Option<Event> {
    let current_moisture = valid(current.soil_moisture_status, current.soil_moisture)?;
    let window = in_window(combined, current.timestamp_ms, d::CONTEXT_LOOKBACK_HOURS * 3_600_000);
    let samples: Vec<&Reading> =
        window.iter().filter(|r| valid(r.soil_moisture_status, r.soil_moisture).is_some()).collect();
    if samples.len() < d::DRYING_MIN_SAMPLES {
        return None;
    }

    let max_moisture =
        samples.iter().filter_map(|r| r.soil_moisture).fold(f64::MIN, f64::max);
    let decline_pct = max_moisture - current_moisture;
    if decline_pct <= d::DRYING_DECLINE_THRESHOLD_PCT {
        return None;
    }

    let values: Vec<f64> = samples.iter().filter_map(|r| r.soil_moisture).collect();
    let pairs = values.windows(2).count();
    if pairs == 0 {
        return None;
    }
    let declining = values.windows(2).filter(|pair| pair[1] < pair[0]).count();
    if (declining as f64 / pairs as f64) < d::DRYING_DECLINING_PAIR_FRACTION {
        return None;
    }

    let start_ms = samples.first()?.timestamp_ms;
    Some(Event {
        hardware_id: current.hardware_id.clone(),
        event_type: EventType::DryingCycle,
        start_time_ms: start_ms,
        end_time_ms: current.timestamp_ms,
        sensor_values: [
            ("moisture_max".to_string(), json!(max_moisture)),
            ("moisture_current".to_string(), json!(current_moisture)),
            ("decline_pct".to_string(), json!(decline_pct)),
        ]
        .into_iter()
        .collect(),
        detection_metadata: std::collections::HashMap::new(),
        created_at_ms: None,
    })
}
