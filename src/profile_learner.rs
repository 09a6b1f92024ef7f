//! Per-device profile learning.
//!
//! Three independent learned quantities: the typical interval between
//! watering events, the baseline (10th/90th percentile) moisture range from
//! hourly aggregates, and the moisture-stress condition check used to flag a
//! device as needing attention. Every function here returns a
//! [`LearnedProfileFields`] patch or a plain value — never a full
//! [`crate::types::DeviceProfile`] — so a caller cannot accidentally
//! overwrite the user-owned half of the row.

use thiserror::Error;

use crate::clock::Clock;
use crate::config::defaults::profile as d;
use crate::persistence::{AggregateStore, DeviceProfileStore, PersistenceError, Store};
use crate::types::{DeviceProfile, LearnedProfileFields, MoistureRange, WindowType};

/// Mean of consecutive gaps between watering-event timestamps, in seconds.
/// Requires at least [`d::MIN_WATERING_EVENTS_FOR_INTERVAL`] events; `events`
/// must be sorted ascending.
pub fn calculate_watering_interval_sec(events_ms: &[i64]) -> Option<i64> {
    if events_ms.len() < d::MIN_WATERING_EVENTS_FOR_INTERVAL {
        return None;
    }
    let gaps: Vec<i64> = events_ms.windows(2).map(|pair| pair[1] - pair[0]).collect();
    if gaps.is_empty() {
        return None;
    }
    let mean_ms = gaps.iter().sum::<i64>() as f64 / gaps.len() as f64;
    Some((mean_ms / 1000.0).round() as i64)
}

/// Append `new_event_ms` to the tracked watering-event history, keeping at
/// most [`d::MAX_WATERING_EVENTS_TRACKED`] most-recent entries.
pub fn append_watering_event(existing: &[i64], new_event_ms: i64) -> Vec<i64> {
    let mut events = existing.to_vec();
    events.push(new_event_ms);
    events.sort_unstable();
    if events.len() > d::MAX_WATERING_EVENTS_TRACKED {
        let overflow = events.len() - d::MAX_WATERING_EVENTS_TRACKED;
        events.drain(0..overflow);
    }
    events
}

/// Fold in one newly observed watering event: updates the tracked history
/// and, if enough events are now present, recalculates the typical interval.
pub fn learn_from_watering_event(existing_events: &[i64], new_event_ms: i64) -> LearnedProfileFields {
    let events = append_watering_event(existing_events, new_event_ms);
    let interval = calculate_watering_interval_sec(&events);
    LearnedProfileFields {
        typical_watering_interval_sec: interval,
        baseline_moisture_range: None,
        last_watering_events: Some(events),
    }
}

/// Linear-interpolated percentile (numpy's default method) over an
/// already-sorted ascending slice.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }
    let idx = p * (sorted.len() as f64 - 1.0);
    let lower = idx.floor() as usize;
    let upper = idx.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let frac = idx - lower as f64;
        sorted[lower] + (sorted[upper] - sorted[lower]) * frac
    }
}

/// Baseline moisture range from hourly average-moisture values. Requires at
/// least [`d::MIN_AGGREGATES_FOR_BASELINE`] data points.
pub fn calculate_baseline_moisture_range(hourly_avg_moisture: &[f64]) -> Option<MoistureRange> {
    if hourly_avg_moisture.len() < d::MIN_AGGREGATES_FOR_BASELINE {
        return None;
    }
    let mut sorted = hourly_avg_moisture.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    Some(MoistureRange {
        min: percentile(&sorted, d::BASELINE_PERCENTILE_LOW),
        max: percentile(&sorted, d::BASELINE_PERCENTILE_HIGH),
    })
}

pub fn learn_baseline_moisture_range(hourly_avg_moisture: &[f64]) -> LearnedProfileFields {
    LearnedProfileFields {
        typical_watering_interval_sec: None,
        baseline_moisture_range: calculate_baseline_moisture_range(hourly_avg_moisture),
        last_watering_events: None,
    }
}

/// True if `current_moisture_pct` is below the stress threshold AND either
/// no watering history exists or it has been too long since the last
/// watering event.
pub fn check_stress_condition(current_moisture_pct: f64, last_watering_events_ms: &[i64], now_ms: i64) -> bool {
    if current_moisture_pct >= d::STRESS_MOISTURE_THRESHOLD_PCT {
        return false;
    }
    match last_watering_events_ms.last() {
        None => true,
        Some(&last) => {
            let hours_since = (now_ms - last) as f64 / 3_600_000.0;
            hours_since >= d::STRESS_WATERING_GAP_HOURS
        }
    }
}

#[derive(Debug, Error)]
pub enum ProfileLearnerError {
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Fold a newly detected watering event into the device's profile. Called
/// by [`crate::event_detector`] right after a `WateringEvent` is persisted.
pub async fn on_watering_event_detected<S: Store + ?Sized>(
    store: &S,
    hardware_id: &str,
    event_start_ms: i64,
    now_ms: i64,
) -> Result<(), ProfileLearnerError> {
    let mut profile = DeviceProfileStore::get(store, hardware_id)
        .await?
        .unwrap_or_else(|| DeviceProfile::new(hardware_id));
    let fields = learn_from_watering_event(&profile.last_watering_events, event_start_ms);
    fields.apply(&mut profile, now_ms);
    DeviceProfileStore::put(store, profile).await?;
    Ok(())
}

/// Recompute `baseline_moisture_range` for every device with enough recent
/// hourly history. Intended to run on the same daily cadence as
/// [`crate::aggregator::compute_daily`]; devices with too little history are
/// left untouched rather than cleared.
pub async fn recompute_baselines<S: Store + ?Sized>(
    store: &S,
    clock: &dyn Clock,
    hardware_ids: &[String],
) -> Result<usize, ProfileLearnerError> {
    let now_ms = clock.now_ms();
    let lookback_ms = d::BASELINE_LOOKBACK_DAYS * 24 * 3_600_000;
    let mut updated = 0;
    for hardware_id in hardware_ids {
        let hourlies =
            AggregateStore::range(store, hardware_id, WindowType::Hourly, now_ms - lookback_ms, now_ms).await?;
        let moisture_avgs: Vec<f64> = hourlies.iter().filter_map(|a| a.soil_moisture_stats.avg).collect();
        let Some(range) = calculate_baseline_moisture_range(&moisture_avgs) else { continue };

        let mut profile =
            DeviceProfileStore::get(store, hardware_id).await?.unwrap_or_else(|| DeviceProfile::new(hardware_id));
        LearnedProfileFields { baseline_moisture_range: Some(range), ..Default::default() }.apply(&mut profile, now_ms);
        DeviceProfileStore::put(store, profile).await?;
        updated += 1;
    }
    Ok(updated)
}
