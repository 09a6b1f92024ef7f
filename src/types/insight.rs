//! LLM-generated natural-language insights.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TrendClassification {
    Improving,
    Declining,
    Stable,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recommendation {
    pub action: String,
    pub reason: String,
    pub urgency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Insight {
    pub hardware_id: String,
    pub timestamp_ms: i64,
    pub summary: String,
    pub recommendations: Vec<Recommendation>,
    pub confidence: ConfidenceLevel,
    pub trend: TrendClassification,
    pub growth_stage_suggestion: Option<String>,
    pub evidence: Option<HashMap<String, Value>>,
    pub llm_model: Option<String>,
    pub generation_duration_ms: Option<i64>,
}
