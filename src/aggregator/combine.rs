//! Combines several already-computed aggregates into a coarser one
//! (hourly -> daily, daily -> weekly). Pure functions only; persistence
//! and rollups are the caller's job.

use crate::time_utils::Window;
use crate::types::{Aggregate, SensorStats, WindowType};

/// Combine several per-window `SensorStats` blocks into one covering their
/// union. Counts and sums add; `min`/`max` take the extreme across rows that
/// saw any valid data; `avg`/`stddev` are recomputed from the combined
/// accumulators.
pub fn combine_sensor_stats(stats: &[&SensorStats]) -> SensorStats {
    let mut combined = SensorStats::default();
    for s in stats {
        combined.valid_count += s.valid_count;
        combined.total_count += s.total_count;
        combined.sum += s.sum;
        combined.sumsq += s.sumsq;
        if let Some(min) = s.min {
            combined.min = Some(combined.min.map_or(min, |m| m.min(min)));
        }
        if let Some(max) = s.max {
            combined.max = Some(combined.max.map_or(max, |m| m.max(max)));
        }
    }
    combined.recompute_derived();
    combined
}

/// Combine a slice of source aggregates (all for the same device, all one
/// level finer than `window_type`) into a single coarser aggregate. Marked
/// complete unconditionally: by the time the scheduler runs daily/weekly
/// combination, every source window it read is itself closed.
pub(crate) fn combine_into(
    hardware_id: &str,
    window_type: WindowType,
    window: Window,
    sources: &[Aggregate],
    now_ms: i64,
) -> Aggregate {
    let temperature: Vec<&SensorStats> = sources.iter().map(|a| &a.temperature_stats).collect();
    let humidity: Vec<&SensorStats> = sources.iter().map(|a| &a.humidity_stats).collect();
    let pressure: Vec<&SensorStats> = sources.iter().map(|a| &a.pressure_stats).collect();
    let soil_moisture: Vec<&SensorStats> = sources.iter().map(|a| &a.soil_moisture_stats).collect();

    Aggregate {
        hardware_id: hardware_id.to_string(),
        window_type,
        window_start_ms: window.start_ms,
        window_end_ms: window.end_ms,
        temperature_stats: combine_sensor_stats(&temperature),
        humidity_stats: combine_sensor_stats(&humidity),
        pressure_stats: combine_sensor_stats(&pressure),
        soil_moisture_stats: combine_sensor_stats(&soil_moisture),
        computed_at_ms: Some(now_ms),
        is_complete: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(valid: u64, total: u64, sum: f64, sumsq: f64, min: f64, max: f64) -> SensorStats {
        let mut s = SensorStats {
            valid_count: valid,
            total_count: total,
            sum,
            sumsq,
            min: Some(min),
            max: Some(max),
            ..Default::default()
        };
        s.recompute_derived();
        s
    }

    #[test]
    fn combine_adds_counts_and_extends_range() {
        let a = stats(3, 3, 60.0, 1204.0, 18.0, 22.0);
        let b = stats(2, 2, 10.0, 52.0, 4.0, 6.0);
        let combined = combine_sensor_stats(&[&a, &b]);
        assert_eq!(combined.valid_count, 5);
        assert_eq!(combined.total_count, 5);
        assert_eq!(combined.sum, 70.0);
        assert_eq!(combined.min, Some(4.0));
        assert_eq!(combined.max, Some(22.0));
        assert!(combined.is_internally_consistent());
    }

    #[test]
    fn combine_of_empty_stats_stays_empty() {
        let a = SensorStats::default();
        let b = SensorStats::default();
        let combined = combine_sensor_stats(&[&a, &b]);
        assert_eq!(combined.valid_count, 0);
        assert_eq!(combined.avg, None);
    }

    #[test]
    fn combine_into_marks_complete() {
        let window = Window { start_ms: 0, end_ms: 86_400_000 };
        let hourly = Aggregate::new_empty("dev-1", WindowType::Hourly, 0, 3_600_000);
        let daily = combine_into("dev-1", WindowType::Daily, window, &[hourly], 1_000);
        assert!(daily.is_complete);
        assert_eq!(daily.window_type, WindowType::Daily);
    }
}
