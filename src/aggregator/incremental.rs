//! Open-window incremental updates and closed-window full rebuilds for a
//! single hourly aggregate.

use crate::persistence::{AggregateStore, PersistenceError, Store};
use crate::time_utils::{self, Window};
use crate::types::{Aggregate, Reading, SensorStats, WindowType};

/// Apply one reading to its (still open) hourly window: unconditionally bump
/// `total_count` for every sensor, and for sensors with a valid, in-range
/// value also bump `valid_count`/`sum`/`sumsq` and seed `min`/`max` the first
/// time a valid value is seen.
pub(crate) async fn apply(
    store: &dyn Store,
    reading: &Reading,
    window: Window,
    now_ms: i64,
) -> Result<(), PersistenceError> {
    let mut aggregate = AggregateStore::get(store, &reading.hardware_id, WindowType::Hourly, window.start_ms)
        .await?
        .unwrap_or_else(|| Aggregate::new_empty(&reading.hardware_id, WindowType::Hourly, window.start_ms, window.end_ms));

    accumulate(&mut aggregate.temperature_stats, reading.temperature, reading.temperature_status);
    accumulate(&mut aggregate.humidity_stats, reading.humidity, reading.humidity_status);
    accumulate(&mut aggregate.pressure_stats, reading.pressure, reading.pressure_status);
    accumulate(&mut aggregate.soil_moisture_stats, reading.soil_moisture, reading.soil_moisture_status);

    aggregate.computed_at_ms = Some(now_ms);
    AggregateStore::put(store, aggregate).await
}

fn accumulate(stats: &mut SensorStats, value: Option<f64>, status: crate::types::SensorStatus) {
    stats.total_count += 1;
    if status != crate::types::SensorStatus::Ok {
        return;
    }
    let Some(value) = value else { return };
    stats.valid_count += 1;
    stats.sum += value;
    stats.sumsq += value * value;
    stats.min = Some(stats.min.map_or(value, |m| m.min(value)));
    stats.max = Some(stats.max.map_or(value, |m| m.max(value)));
    stats.recompute_derived();
}

/// Recompute an hourly aggregate from scratch from the readings that fall
/// within its window. `is_complete` is set once the window's 24-hour
/// lateness allowance has fully elapsed, mirroring the discard rule in
/// [`crate::aggregator::process_reading`]: a rebuilt row can still receive
/// another late reading until then.
pub(crate) fn rebuild_from_readings(
    hardware_id: &str,
    window_type: WindowType,
    window: Window,
    readings: &[Reading],
    now_ms: i64,
) -> Aggregate {
    let mut aggregate = Aggregate::new_empty(hardware_id, window_type, window.start_ms, window.end_ms);
    for reading in readings {
        accumulate(&mut aggregate.temperature_stats, reading.temperature, reading.temperature_status);
        accumulate(&mut aggregate.humidity_stats, reading.humidity, reading.humidity_status);
        accumulate(&mut aggregate.pressure_stats, reading.pressure, reading.pressure_status);
        accumulate(&mut aggregate.soil_moisture_stats, reading.soil_moisture, reading.soil_moisture_status);
    }
    aggregate.computed_at_ms = Some(now_ms);
    aggregate.is_complete = !time_utils::is_within_lateness_window(window.end_ms, now_ms);
    aggregate
}

/// Fraction of the expected reading count for an hour that actually arrived,
/// capped at 1.0. Uses `soil_moisture_stats` as the representative sensor:
/// every device reports soil moisture, while the others are optional
/// per-device capabilities.
pub(crate) fn coverage_pct(aggregate: &Aggregate, expected_interval_sec: i64) -> f64 {
    if expected_interval_sec <= 0 {
        return 0.0;
    }
    let expected_readings = 3_600.0 / expected_interval_sec as f64;
    if expected_readings <= 0.0 {
        return 0.0;
    }
    (aggregate.soil_moisture_stats.total_count as f64 / expected_readings).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;
    use crate::types::SensorStatus;

    fn reading(ts_ms: i64, moisture: Option<f64>, status: SensorStatus) -> Reading {
        Reading {
            hardware_id: "dev-1".to_string(),
            batch_id: "b1".to_string(),
            timestamp_ms: ts_ms,
            ingest_time_ms: ts_ms,
            temperature: Some(20.0),
            humidity: Some(50.0),
            pressure: Some(1000.0),
            soil_moisture: moisture,
            temperature_status: SensorStatus::Ok,
            humidity_status: SensorStatus::Ok,
            pressure_status: SensorStatus::Ok,
            soil_moisture_status: status,
        }
    }

    #[tokio::test]
    async fn apply_skips_non_ok_status_for_valid_count_but_counts_total() {
        let store = MemoryStore::new();
        let window = Window { start_ms: 0, end_ms: 3_600_000 };
        let r = reading(100, Some(40.0), SensorStatus::OutOfRange);
        apply(&store, &r, window, 100).await.unwrap();
        let agg = AggregateStore::get(&store, "dev-1", WindowType::Hourly, 0).await.unwrap().unwrap();
        assert_eq!(agg.soil_moisture_stats.total_count, 1);
        assert_eq!(agg.soil_moisture_stats.valid_count, 0);
    }

    #[tokio::test]
    async fn apply_accumulates_valid_readings() {
        let store = MemoryStore::new();
        let window = Window { start_ms: 0, end_ms: 3_600_000 };
        apply(&store, &reading(100, Some(30.0), SensorStatus::Ok), window, 100).await.unwrap();
        apply(&store, &reading(200, Some(50.0), SensorStatus::Ok), window, 200).await.unwrap();
        let agg = AggregateStore::get(&store, "dev-1", WindowType::Hourly, 0).await.unwrap().unwrap();
        assert_eq!(agg.soil_moisture_stats.valid_count, 2);
        assert_eq!(agg.soil_moisture_stats.min, Some(30.0));
        assert_eq!(agg.soil_moisture_stats.max, Some(50.0));
        assert_eq!(agg.soil_moisture_stats.avg, Some(40.0));
    }

    #[test]
    fn rebuild_marks_incomplete_within_lateness_window() {
        let window = Window { start_ms: 0, end_ms: 3_600_000 };
        let readings = vec![reading(100, Some(30.0), SensorStatus::Ok)];
        let agg = rebuild_from_readings("dev-1", WindowType::Hourly, window, &readings, 3_600_000 + 1_000);
        assert!(!agg.is_complete);
    }

    #[test]
    fn rebuild_marks_complete_after_lateness_window_elapses() {
        let window = Window { start_ms: 0, end_ms: 3_600_000 };
        let readings = vec![reading(100, Some(30.0), SensorStatus::Ok)];
        let agg = rebuild_from_readings("dev-1", WindowType::Hourly, window, &readings, 3_600_000 + 25 * 3_600_000);
        assert!(agg.is_complete);
    }

    #[test]
    fn coverage_caps_at_one() {
        let mut agg = Aggregate::new_empty("dev-1", WindowType::Hourly, 0, 3_600_000);
        agg.soil_moisture_stats.total_count = 100;
        assert_eq!(coverage_pct(&agg, 60), 1.0);
    }

    #[test]
    fn coverage_reflects_partial_reporting() {
        let mut agg = Aggregate::new_empty("dev-1", WindowType::Hourly, 0, 3_600_000);
        agg.soil_moisture_stats.total_count = 6;
        assert_eq!(coverage_pct(&agg, 300), 1.0);
        agg.soil_moisture_stats.total_count = 3;
        assert_eq!(coverage_pct(&agg, 300), 0.5);
    }
}
