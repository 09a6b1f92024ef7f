//! Operational metric rollups, bucketed by minute/hour. Never cross-references
//! business tables — see [`crate::rollup`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BucketType {
    Minute,
    Hour,
}

impl BucketType {
    pub fn as_str(self) -> &'static str {
        match self {
            BucketType::Minute => "minute",
            BucketType::Hour => "hour",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rollup {
    pub bucket_key: String,
    pub metric_key: String,
    pub bucket_type: BucketType,
    pub bucket_start_ms: i64,
    pub metric_name: String,
    pub dimensions: BTreeMap<String, String>,
    pub count: i64,
    pub sum: Option<f64>,
    pub ttl_unix_secs: i64,
}
