//! UTC-aligned window and rollup-bucket math.
//!
//! Hour/day windows align to natural UTC boundaries; week alignment is ISO
//! (Monday 00:00 UTC). All windows are half-open `[start, end)`.

use chrono::{DateTime, Datelike, Duration as ChronoDuration, TimeZone, Timelike, Utc, Weekday};

use crate::config::defaults::time as time_defaults;
use crate::types::WindowType;

/// A half-open `[start, end)` interval, in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start_ms: i64,
    pub end_ms: i64,
}

fn to_datetime(timestamp_ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(timestamp_ms).single().unwrap_or_else(|| Utc.timestamp_millis_opt(0).unwrap())
}

/// The window containing `timestamp_ms` for the given window type.
pub fn get_window(timestamp_ms: i64, window_type: WindowType) -> Window {
    let dt = to_datetime(timestamp_ms);
    match window_type {
        WindowType::Hourly => {
            let start = dt
                .with_minute(0)
                .and_then(|d| d.with_second(0))
                .and_then(|d| d.with_nanosecond(0))
                .unwrap_or(dt);
            let start_ms = start.timestamp_millis();
            Window { start_ms, end_ms: start_ms + time_defaults::HOUR_SECS * 1_000 }
        }
        WindowType::Daily => {
            let start = dt
                .with_hour(0)
                .and_then(|d| d.with_minute(0))
                .and_then(|d| d.with_second(0))
                .and_then(|d| d.with_nanosecond(0))
                .unwrap_or(dt);
            let start_ms = start.timestamp_millis();
            Window { start_ms, end_ms: start_ms + 24 * time_defaults::HOUR_SECS * 1_000 }
        }
        WindowType::Weekly => {
            let start_of_day = dt
                .with_hour(0)
                .and_then(|d| d.with_minute(0))
                .and_then(|d| d.with_second(0))
                .and_then(|d| d.with_nanosecond(0))
                .unwrap_or(dt);
            let days_since_monday = start_of_day.weekday().num_days_from_monday() as i64;
            let monday = start_of_day - ChronoDuration::days(days_since_monday);
            let start_ms = monday.timestamp_millis();
            Window { start_ms, end_ms: start_ms + 7 * 24 * time_defaults::HOUR_SECS * 1_000 }
        }
    }
}

/// True iff `now` is still within the lateness window for a closed window
/// ending at `window_end_ms` (including the "still open" case, since an
/// event before close trivially satisfies `now <= window_end`).
pub fn is_within_lateness_window(window_end_ms: i64, now_ms: i64) -> bool {
    now_ms <= window_end_ms + time_defaults::LATENESS_WINDOW.as_millis() as i64
}

/// True iff the skew between event time and ingest time exceeds the warning
/// threshold. Strictly greater-than; the boundary value itself does not warn.
pub fn check_clock_skew(event_time_ms: i64, ingest_time_ms: i64) -> bool {
    (event_time_ms - ingest_time_ms) > time_defaults::CLOCK_SKEW_WARNING.as_millis() as i64
}

/// Align a timestamp to the start of its UTC minute.
pub fn align_to_minute(timestamp_ms: i64) -> i64 {
    let dt = to_datetime(timestamp_ms);
    dt.with_second(0).and_then(|d| d.with_nanosecond(0)).unwrap_or(dt).timestamp_millis()
}

/// Align a timestamp to the start of its UTC hour.
pub fn align_to_hour(timestamp_ms: i64) -> i64 {
    get_window(timestamp_ms, WindowType::Hourly).start_ms
}

/// Monday 00:00 UTC on or before `timestamp_ms` (used by the weekly combiner
/// and by callers that need just the boundary, not a full window).
pub fn iso_week_start(timestamp_ms: i64) -> i64 {
    get_window(timestamp_ms, WindowType::Weekly).start_ms
}

#[allow(dead_code)]
fn is_monday(dt: DateTime<Utc>) -> bool {
    dt.weekday() == Weekday::Mon
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hourly_window_aligns_to_hour_boundary() {
        // 2024-01-01T13:45:30Z
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 13, 45, 30).unwrap().timestamp_millis();
        let window = get_window(ts, WindowType::Hourly);
        assert_eq!(window.start_ms, Utc.with_ymd_and_hms(2024, 1, 1, 13, 0, 0).unwrap().timestamp_millis());
        assert_eq!(window.end_ms, Utc.with_ymd_and_hms(2024, 1, 1, 14, 0, 0).unwrap().timestamp_millis());
    }

    #[test]
    fn weekly_window_aligns_to_iso_monday() {
        // 2024-01-04 is a Thursday.
        let ts = Utc.with_ymd_and_hms(2024, 1, 4, 10, 0, 0).unwrap().timestamp_millis();
        let window = get_window(ts, WindowType::Weekly);
        let expected_monday = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap().timestamp_millis();
        assert_eq!(window.start_ms, expected_monday);
    }

    #[test]
    fn lateness_window_allows_exactly_24h_after_close() {
        let window_end = 1_000_000_i64;
        let lateness_ms = time_defaults::LATENESS_WINDOW.as_millis() as i64;
        assert!(is_within_lateness_window(window_end, window_end + lateness_ms));
        assert!(!is_within_lateness_window(window_end, window_end + lateness_ms + 1));
    }

    #[test]
    fn clock_skew_is_strict_greater_than() {
        let threshold_ms = time_defaults::CLOCK_SKEW_WARNING.as_millis() as i64;
        assert!(!check_clock_skew(threshold_ms, 0));
        assert!(check_clock_skew(threshold_ms + 1, 0));
    }
}
