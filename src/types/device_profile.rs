//! Per-device learned patterns and user-owned configuration.

use serde::{Deserialize, Serialize};

/// Invariant: user-owned fields (`plant_type`, `soil_type`,
/// `pot_size_liters`, `expected_interval_sec`) are never touched by the
/// profile learner; learned fields are never touched by the user-facing API.
/// The type does not enforce this by itself (both halves live on one struct,
/// matching the source row shape) — [`crate::profile_learner`] only ever
/// constructs a learned-fields patch, never a full-row overwrite.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceProfile {
    pub hardware_id: String,

    // User-owned.
    pub plant_type: Option<String>,
    pub soil_type: Option<String>,
    pub pot_size_liters: Option<f64>,
    pub expected_interval_sec: i64,

    // System-learned.
    pub typical_watering_interval_sec: Option<i64>,
    pub baseline_moisture_range: Option<MoistureRange>,
    pub last_watering_events: Vec<i64>,

    pub updated_at_ms: Option<i64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MoistureRange {
    pub min: f64,
    pub max: f64,
}

impl DeviceProfile {
    pub fn new(hardware_id: impl Into<String>) -> Self {
        Self {
            hardware_id: hardware_id.into(),
            plant_type: None,
            soil_type: None,
            pot_size_liters: None,
            expected_interval_sec: crate::config::defaults::profile::DEFAULT_EXPECTED_INTERVAL_SEC,
            typical_watering_interval_sec: None,
            baseline_moisture_range: None,
            last_watering_events: Vec::new(),
            updated_at_ms: None,
        }
    }
}

/// The subset of [`DeviceProfile`] the learner is allowed to write. Kept as
/// its own type so the learner's update function cannot accidentally cross
/// into user-owned fields — the compiler enforces the split instead of a
/// runtime check.
#[derive(Debug, Clone, Default)]
pub struct LearnedProfileFields {
    pub typical_watering_interval_sec: Option<i64>,
    pub baseline_moisture_range: Option<MoistureRange>,
    pub last_watering_events: Option<Vec<i64>>,
}

impl LearnedProfileFields {
    pub fn apply(self, profile: &mut DeviceProfile, now_ms: i64) {
        if let Some(interval) = self.typical_watering_interval_sec {
            profile.typical_watering_interval_sec = Some(interval);
        }
        if let Some(range) = self.baseline_moisture_range {
            profile.baseline_moisture_range = Some(range);
        }
        if let Some(events) = self.last_watering_events {
            profile.last_watering_events = events;
        }
        profile.updated_at_ms = Some(now_ms);
    }
}
