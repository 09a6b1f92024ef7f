//! Raw sensor reading shape.

use serde::{Deserialize, Serialize};

/// Per-sensor data-quality tag.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SensorStatus {
    #[default]
    Ok,
    Missing,
    Stale,
    OutOfRange,
    Noisy,
}

/// A single sensor reading from a device, as delivered by ingestion.
///
/// Immutable once written: a second write for the same `(hardware_id,
/// timestamp_ms)` key is a deduplication signal, not an update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reading {
    pub hardware_id: String,
    pub batch_id: String,
    pub timestamp_ms: i64,
    pub ingest_time_ms: i64,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
    pub soil_moisture: Option<f64>,
    #[serde(default)]
    pub temperature_status: SensorStatus,
    #[serde(default)]
    pub humidity_status: SensorStatus,
    #[serde(default)]
    pub pressure_status: SensorStatus,
    #[serde(default)]
    pub soil_moisture_status: SensorStatus,
}

impl Reading {
    /// Derived identifier for the idempotency ledger: uniquely identifies a
    /// logical ingestion independent of which stage is processing it.
    pub fn reading_id(&self) -> String {
        generate_reading_id(&self.batch_id, self.timestamp_ms)
    }
}

/// Pure helper so any component (not only the aggregator) can construct the
/// idempotency ledger key without holding a full `Reading`.
pub fn generate_reading_id(batch_id: &str, timestamp_ms: i64) -> String {
    format!("{batch_id}#{timestamp_ms}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reading_id_is_stable_for_same_inputs() {
        assert_eq!(generate_reading_id("batch-1", 1000), generate_reading_id("batch-1", 1000));
    }

    #[test]
    fn reading_id_differs_across_timestamps() {
        assert_ne!(generate_reading_id("batch-1", 1000), generate_reading_id("batch-1", 2000));
    }
}
