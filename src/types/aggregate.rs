//! Time-windowed statistical aggregates.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WindowType {
    Hourly,
    Daily,
    Weekly,
}

impl WindowType {
    pub fn as_str(self) -> &'static str {
        match self {
            WindowType::Hourly => "hourly",
            WindowType::Daily => "daily",
            WindowType::Weekly => "weekly",
        }
    }
}

/// Running statistics for one sensor over one window.
///
/// `sum`/`sumsq`/`valid_count`/`total_count` are the accumulator fields used
/// for incremental updates; `min`/`max`/`avg`/`stddev` are derived and are
/// only meaningful once `valid_count > 0`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SensorStats {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub avg: Option<f64>,
    pub stddev: Option<f64>,
    pub valid_count: u64,
    pub total_count: u64,
    pub sum: f64,
    pub sumsq: f64,
}

impl SensorStats {
    /// Recompute `avg`/`stddev` from the accumulators. Leaves `min`/`max`
    /// untouched — callers own those (incremental seed-if-absent, or rebuild
    /// full recompute).
    pub fn recompute_derived(&mut self) {
        if self.valid_count == 0 {
            self.avg = None;
            self.stddev = None;
            return;
        }
        let n = self.valid_count as f64;
        let avg = self.sum / n;
        // Population variance; clamp against floating-point under-shoot that
        // can otherwise push the value fractionally below zero.
        let variance = (self.sumsq / n - avg * avg).max(0.0);
        self.avg = Some(avg);
        self.stddev = Some(variance.sqrt());
    }

    /// True if this stats block satisfies the aggregate invariants
    /// (`0 <= valid_count <= total_count`, `min <= avg <= max`, `stddev >= 0`).
    pub fn is_internally_consistent(&self) -> bool {
        if self.valid_count > self.total_count {
            return false;
        }
        if self.valid_count > 0 {
            let (Some(min), Some(max), Some(avg), Some(stddev)) =
                (self.min, self.max, self.avg, self.stddev)
            else {
                return false;
            };
            if !(min <= avg && avg <= max) || stddev < 0.0 {
                return false;
            }
        }
        true
    }
}

/// Per-device, per-window statistical aggregate across all four sensors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Aggregate {
    pub hardware_id: String,
    pub window_type: WindowType,
    pub window_start_ms: i64,
    pub window_end_ms: i64,
    pub temperature_stats: SensorStats,
    pub humidity_stats: SensorStats,
    pub pressure_stats: SensorStats,
    pub soil_moisture_stats: SensorStats,
    pub computed_at_ms: Option<i64>,
    pub is_complete: bool,
}

impl Aggregate {
    pub fn device_window_key(hardware_id: &str, window_type: WindowType) -> String {
        format!("{hardware_id}#{}", window_type.as_str())
    }

    pub fn new_empty(hardware_id: &str, window_type: WindowType, window_start_ms: i64, window_end_ms: i64) -> Self {
        Self {
            hardware_id: hardware_id.to_string(),
            window_type,
            window_start_ms,
            window_end_ms,
            temperature_stats: SensorStats::default(),
            humidity_stats: SensorStats::default(),
            pressure_stats: SensorStats::default(),
            soil_moisture_stats: SensorStats::default(),
            computed_at_ms: None,
            is_complete: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_stats_have_no_derived_values() {
        let mut stats = SensorStats::default();
        stats.recompute_derived();
        assert_eq!(stats.avg, None);
        assert_eq!(stats.stddev, None);
        assert!(stats.is_internally_consistent());
    }

    #[test]
    fn stddev_clamps_at_zero_under_floating_point_noise() {
        let mut stats = SensorStats {
            valid_count: 4,
            total_count: 4,
            sum: 80.0,
            // sumsq chosen so sumsq/n - avg^2 is a hair below zero before clamping.
            sumsq: 1600.0 - 1e-9,
            ..Default::default()
        };
        stats.recompute_derived();
        assert!(stats.stddev.expect("stddev should be set") >= 0.0);
    }
}
