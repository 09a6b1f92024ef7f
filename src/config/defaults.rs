//! System-wide default constants.
//!
//! Centralises magic numbers named throughout the component design so they
//! are not scattered across call sites. Grouped by subsystem for discovery.

// ============================================================================
// Time & bucket utilities
// ============================================================================

pub mod time {
    /// Width of an hourly aggregation window (seconds).
    pub const HOUR_SECS: i64 = 3_600;

    /// How long after a window closes a late-arriving reading still triggers
    /// a rebuild rather than being discarded.
    pub const LATENESS_WINDOW: std::time::Duration = std::time::Duration::from_secs(24 * 3_600);

    /// Threshold above which `event_time - ingest_time` is flagged as clock
    /// skew (non-fatal, logged only).
    pub const CLOCK_SKEW_WARNING: std::time::Duration = std::time::Duration::from_secs(5 * 60);
}

// ============================================================================
// Idempotency ledger
// ============================================================================

pub mod idempotency {
    /// TTL applied to a `ProcessedReadings` row from the moment any stage
    /// column is first set.
    pub const PROCESSED_READING_TTL: std::time::Duration =
        std::time::Duration::from_secs(30 * 24 * 3_600);
}

// ============================================================================
// Aggregator
// ============================================================================

pub mod aggregator {
    /// Daily rollup fires for "yesterday" at this UTC hour:minute.
    pub const DAILY_ROLLUP_HOUR_UTC: u32 = 0;
    pub const DAILY_ROLLUP_MINUTE_UTC: u32 = 10;

    /// Weekly rollup fires at this UTC hour:minute, aligned to ISO Monday.
    pub const WEEKLY_ROLLUP_HOUR_UTC: u32 = 0;
    pub const WEEKLY_ROLLUP_MINUTE_UTC: u32 = 20;
}

// ============================================================================
// Event detector
// ============================================================================

pub mod event_detector {
    use std::time::Duration;

    /// How many hours of prior readings are fetched as detector context.
    pub const CONTEXT_LOOKBACK_HOURS: i64 = 6;

    /// Cap on context rows fetched per reading (bounds detector cost).
    pub const MAX_CONTEXT_ROWS: usize = 200;

    // --- Watering_Event ---
    pub const WATERING_RAPID_SPIKE_WINDOW_MIN: i64 = 30;
    pub const WATERING_RAPID_SPIKE_THRESHOLD_PCT: f64 = 15.0;
    pub const WATERING_GRADUAL_RISE_WINDOW_MIN: i64 = 60;
    pub const WATERING_GRADUAL_RISE_THRESHOLD_PCT: f64 = 10.0;
    pub const WATERING_COOLDOWN: Duration = Duration::from_secs(60 * 60);

    // --- Drying_Cycle ---
    pub const DRYING_MIN_SAMPLES: usize = 3;
    pub const DRYING_DECLINE_THRESHOLD_PCT: f64 = 10.0;
    pub const DRYING_DECLINING_PAIR_FRACTION: f64 = 0.70;

    // --- Temperature_Stress ---
    pub const TEMPERATURE_HIGH_THRESHOLD_C: f64 = 35.0;
    pub const TEMPERATURE_LOW_THRESHOLD_C: f64 = 5.0;
    pub const TEMPERATURE_STRESS_COOLDOWN: Duration = Duration::from_secs(30 * 60);

    // --- Humidity_Anomaly ---
    pub const HUMIDITY_ANOMALY_WINDOW_HOURS: i64 = 1;
    pub const HUMIDITY_ANOMALY_RANGE_THRESHOLD_PCT: f64 = 20.0;
    pub const HUMIDITY_ANOMALY_COOLDOWN: Duration = Duration::from_secs(30 * 60);

    // --- Environmental_Change ---
    pub const ENVIRONMENTAL_CHANGE_WINDOW_HOURS: i64 = 2;
    pub const ENVIRONMENTAL_TEMP_RANGE_THRESHOLD_C: f64 = 10.0;
    pub const ENVIRONMENTAL_HUMIDITY_RANGE_THRESHOLD_PCT: f64 = 15.0;
    pub const ENVIRONMENTAL_PRESSURE_RANGE_THRESHOLD: f64 = 10.0;
    pub const ENVIRONMENTAL_CHANGE_COOLDOWN: Duration = Duration::from_secs(120 * 60);
}

// ============================================================================
// Device status / profile
// ============================================================================

pub mod profile {
    /// Default expected reporting interval for a device that has not
    /// configured one explicitly.
    pub const DEFAULT_EXPECTED_INTERVAL_SEC: i64 = 300;

    /// Maximum number of watering-event timestamps retained for interval
    /// learning.
    pub const MAX_WATERING_EVENTS_TRACKED: usize = 20;

    /// Minimum consecutive watering events required to learn an interval.
    pub const MIN_WATERING_EVENTS_FOR_INTERVAL: usize = 2;

    /// Minimum hourly aggregates required to learn a baseline moisture range.
    pub const MIN_AGGREGATES_FOR_BASELINE: usize = 10;
    pub const BASELINE_PERCENTILE_LOW: f64 = 0.1;
    pub const BASELINE_PERCENTILE_HIGH: f64 = 0.9;

    /// How far back the baseline recompute job looks for hourly aggregates.
    pub const BASELINE_LOOKBACK_DAYS: i64 = 14;

    /// Stress-condition thresholds.
    pub const STRESS_MOISTURE_THRESHOLD_PCT: f64 = 30.0;
    pub const STRESS_WATERING_GAP_HOURS: f64 = 48.0;
}

pub mod device_status {
    /// Maximum retained error records and per-message truncation length.
    pub const MAX_ERROR_RECORDS: usize = 10;
    pub const MAX_ERROR_MESSAGE_LEN: usize = 256;

    /// Coverage-to-summary thresholds.
    pub const COVERAGE_OK_THRESHOLD: f64 = 0.8;
    pub const COVERAGE_DEGRADED_THRESHOLD: f64 = 0.3;

    /// Health-category time thresholds (hours).
    pub const HEALTHY_WITHIN_HOURS: i64 = 2;
    pub const STALE_WITHIN_HOURS: i64 = 6;
    pub const FAILING_WITHIN_HOURS: i64 = 24;
}

// ============================================================================
// Rollup updater
// ============================================================================

pub mod rollup {
    /// TTL for minute-bucketed rollup rows (days).
    pub const MINUTE_BUCKET_TTL_DAYS: i64 = 7;
    /// TTL for hour-bucketed rollup rows (days).
    pub const HOUR_BUCKET_TTL_DAYS: i64 = 90;
}

// ============================================================================
// Insight scheduler / generator
// ============================================================================

pub mod insight {
    use std::time::Duration;

    /// A device is "active" (eligible for scheduled insight requests) if it
    /// has reported within this many hours.
    pub const ACTIVE_DEVICE_THRESHOLD_HOURS: i64 = 24;

    /// Maximum event-driven insight requests per device per rolling 24h.
    pub const EVENT_DRIVEN_DAILY_CAP: u32 = 6;

    /// Event-driven requests within this window of an existing pending
    /// request for the same device are suppressed (batching).
    pub const EVENT_BATCHING_WINDOW_HOURS: i64 = 1;

    /// Requests fetched per generator tick.
    pub const INSIGHT_BATCH_SIZE: usize = 10;

    /// Minimum hourly aggregates with valid temperature data required to
    /// generate any insight at all.
    pub const MIN_VALID_HOURS_REQUIRED: usize = 6;

    /// Below this many valid hours, confidence is forced to `low` and a
    /// caveat is prepended to the summary.
    pub const LOW_CONFIDENCE_VALID_HOURS_THRESHOLD: usize = 12;

    /// LLM call retry policy: up to 3 attempts at 1s, 2s, 4s.
    pub const MAX_LLM_RETRIES: u32 = 3;
    pub const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);
    pub const RETRY_MAX_DELAY: Duration = Duration::from_secs(60);
    pub const RETRY_EXPONENTIAL_BASE: f64 = 2.0;

    /// Per-call and end-to-end LLM timeouts.
    pub const LLM_PER_CALL_TIMEOUT: Duration = Duration::from_secs(30);
    pub const LLM_OVERALL_BUDGET: Duration = Duration::from_secs(30);

    /// Words the sanitizer replaces with `condition` wherever they appear in
    /// generated text, to keep insights out of disease-diagnosis territory.
    pub const DISALLOWED_KEYWORDS: &[&str] =
        &["disease", "infection", "pathogen", "fungus", "bacteria", "virus", "blight", "rot", "mold"];
}

// ============================================================================
// Sensor validation
// ============================================================================

pub mod sensor_validation {
    /// Consecutive identical readings required to flag a sensor as stale.
    pub const STALENESS_CONSECUTIVE_COUNT: usize = 6;

    /// Single-step change fraction above which a reading is flagged noisy.
    pub const NOISE_CHANGE_FRACTION: f64 = 0.5;

    /// No report for this long flags a sensor as missing.
    pub const MISSING_AFTER_HOURS: i64 = 2;

    /// Physically possible ranges, inclusive. Values outside these are
    /// `out_of_range` regardless of staleness/noise checks.
    pub const TEMPERATURE_RANGE_C: (f64, f64) = (-40.0, 85.0);
    pub const HUMIDITY_RANGE_PCT: (f64, f64) = (0.0, 100.0);
    pub const PRESSURE_RANGE_HPA: (f64, f64) = (300.0, 1_100.0);
    pub const SOIL_MOISTURE_RANGE_PCT: (f64, f64) = (0.0, 100.0);
}
