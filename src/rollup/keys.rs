//! Rollup key generation: deterministic bucket and metric keys so repeated
//! increments for the same bucket/metric/dimension combination land on the
//! same row.

use std::collections::BTreeMap;

use crate::config::defaults::rollup as d;
use crate::types::BucketType;

/// `"{bucket_type}#{bucket_start_ms}"`.
pub fn bucket_key(bucket_type: BucketType, bucket_start_ms: i64) -> String {
    format!("{}#{bucket_start_ms}", bucket_type.as_str())
}

/// `"{metric_name}#{dim1=val1,dim2=val2}"`, dimensions sorted by key for a
/// stable key regardless of insertion order; `"{metric_name}#"` if there are
/// no dimensions. `dimensions` is a `BTreeMap` so callers get that ordering
/// for free.
pub fn metric_key(metric_name: &str, dimensions: &BTreeMap<String, String>) -> String {
    if dimensions.is_empty() {
        return format!("{metric_name}#");
    }
    let joined = dimensions.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join(",");
    format!("{metric_name}#{joined}")
}

/// Absolute TTL (unix seconds) for a rollup row created now, given its bucket
/// granularity.
pub fn calculate_ttl(bucket_type: BucketType, now_unix_secs: i64) -> i64 {
    let days = match bucket_type {
        BucketType::Minute => d::MINUTE_BUCKET_TTL_DAYS,
        BucketType::Hour => d::HOUR_BUCKET_TTL_DAYS,
    };
    now_unix_secs + days * 24 * 3_600
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_key_format() {
        assert_eq!(bucket_key(BucketType::Minute, 60_000), "minute#60000");
    }

    #[test]
    fn metric_key_with_no_dimensions() {
        let dims = BTreeMap::new();
        assert_eq!(metric_key("readings_ingested", &dims), "readings_ingested#");
    }

    #[test]
    fn metric_key_sorts_dimensions_by_key() {
        let mut dims = BTreeMap::new();
        dims.insert("hardware_id".to_string(), "dev-1".to_string());
        dims.insert("event_type".to_string(), "Watering_Event".to_string());
        assert_eq!(
            metric_key("events_detected", &dims),
            "events_detected#event_type=Watering_Event,hardware_id=dev-1"
        );
    }

    #[test]
    fn ttl_differs_by_bucket_granularity() {
        assert_eq!(calculate_ttl(BucketType::Minute, 0), 7 * 24 * 3_600);
        assert_eq!(calculate_ttl(BucketType::Hour, 0), 90 * 24 * 3_600);
    }
}
