//! Evidence gathering and prompt construction for the insight generator.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::insight::client::ChatMessage;
use crate::types::{Aggregate, DeviceProfile, Event};

/// Everything the generator fetched before calling the LLM, passed through
/// unmodified into the prompt.
pub struct Evidence {
    pub hardware_id: String,
    pub hourly_aggregates_24h: Vec<Aggregate>,
    pub daily_aggregates_7d: Vec<Aggregate>,
    pub events_24h: Vec<Event>,
    pub profile: Option<DeviceProfile>,
}

impl Evidence {
    /// Number of hourly aggregates with any valid temperature reading — the
    /// count checked against `MIN_VALID_HOURS_REQUIRED` and
    /// `LOW_CONFIDENCE_VALID_HOURS_THRESHOLD`.
    pub fn valid_hours(&self) -> usize {
        self.hourly_aggregates_24h.iter().filter(|a| a.temperature_stats.valid_count > 0).count()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParsedRecommendation {
    pub action: String,
    pub reason: String,
    pub urgency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParsedInsight {
    pub summary: String,
    #[serde(default)]
    pub recommendations: Vec<ParsedRecommendation>,
    pub confidence: String,
    pub trend: String,
    #[serde(default)]
    pub growth_stage_suggestion: Option<String>,
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("response was not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Build the two-message chat payload: a system message constraining the
/// model's role and output shape, and a user message carrying the evidence.
pub fn build_prompt(evidence: &Evidence) -> Vec<ChatMessage> {
    let system = ChatMessage::system(
        "You are an assistant that summarizes houseplant sensor telemetry for a home \
         gardener. Respond with a single strict JSON object matching this shape: \
         {\"summary\": string, \"recommendations\": [{\"action\": string, \"reason\": string, \
         \"urgency\": string}], \"confidence\": \"low\"|\"medium\"|\"high\", \"trend\": \
         \"improving\"|\"declining\"|\"stable\", \"growth_stage_suggestion\": string|null}. \
         Do not include any text outside the JSON object. You must never diagnose, name, or \
         speculate about plant disease, infection, or pests; discuss only the physical \
         environment (moisture, temperature, humidity, pressure, watering pattern).",
    );

    let user = ChatMessage::user(serde_json::to_string_pretty(&evidence_payload(evidence)).unwrap_or_default());

    vec![system, user]
}

fn evidence_payload(evidence: &Evidence) -> Value {
    serde_json::json!({
        "hardware_id": evidence.hardware_id,
        "hourly_aggregates_last_24h": evidence.hourly_aggregates_24h.iter().map(aggregate_summary).collect::<Vec<_>>(),
        "daily_aggregates_last_7d": evidence.daily_aggregates_7d.iter().map(aggregate_summary).collect::<Vec<_>>(),
        "events_last_24h": evidence.events_24h.iter().map(event_summary).collect::<Vec<_>>(),
        "device_profile": evidence.profile.as_ref().map(profile_summary),
    })
}

/// Snapshot of the evidence fed into the prompt, stored alongside the
/// generated [`crate::types::Insight`] so a later read can see exactly what
/// informed it without re-deriving it from aggregates that may since have
/// changed.
pub fn evidence_snapshot(evidence: &Evidence) -> HashMap<String, Value> {
    match evidence_payload(evidence) {
        Value::Object(map) => map.into_iter().collect(),
        other => [("evidence".to_string(), other)].into_iter().collect(),
    }
}

fn aggregate_summary(aggregate: &Aggregate) -> Value {
    serde_json::json!({
        "window_start_ms": aggregate.window_start_ms,
        "window_end_ms": aggregate.window_end_ms,
        "temperature_avg": aggregate.temperature_stats.avg,
        "humidity_avg": aggregate.humidity_stats.avg,
        "pressure_avg": aggregate.pressure_stats.avg,
        "soil_moisture_avg": aggregate.soil_moisture_stats.avg,
        "soil_moisture_min": aggregate.soil_moisture_stats.min,
        "soil_moisture_max": aggregate.soil_moisture_stats.max,
    })
}

fn event_summary(event: &Event) -> Value {
    serde_json::json!({
        "event_type": event.event_type.as_str(),
        "start_time_ms": event.start_time_ms,
        "end_time_ms": event.end_time_ms,
    })
}

fn profile_summary(profile: &DeviceProfile) -> Value {
    serde_json::json!({
        "plant_type": profile.plant_type,
        "soil_type": profile.soil_type,
        "typical_watering_interval_sec": profile.typical_watering_interval_sec,
        "baseline_moisture_range": profile.baseline_moisture_range.map(|r| serde_json::json!({"min": r.min, "max": r.max})),
    })
}

/// Parse the model's raw text content into [`ParsedInsight`]. The model is
/// asked to return a bare JSON object; this is tolerant of a fenced code
/// block around it, which chat models sometimes add despite instructions.
pub fn parse_response(raw: &str) -> Result<ParsedInsight, ParseError> {
    let trimmed = strip_code_fence(raw.trim());
    Ok(serde_json::from_str(trimmed)?)
}

fn strip_code_fence(text: &str) -> &str {
    let text = text.strip_prefix("```json").or_else(|| text.strip_prefix("```")).unwrap_or(text);
    text.strip_suffix("```").unwrap_or(text).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SensorStats;

    fn evidence_with_hours(valid_hours: usize) -> Evidence {
        let hourly = (0..valid_hours)
            .map(|i| {
                let mut a = Aggregate::new_empty("dev-1", crate::types::WindowType::Hourly, i as i64 * 3_600_000, (i as i64 + 1) * 3_600_000);
                a.temperature_stats = SensorStats { valid_count: 1, total_count: 1, ..Default::default() };
                a
            })
            .collect();
        Evidence {
            hardware_id: "dev-1".to_string(),
            hourly_aggregates_24h: hourly,
            daily_aggregates_7d: Vec::new(),
            events_24h: Vec::new(),
            profile: None,
        }
    }

    #[test]
    fn valid_hours_counts_only_aggregates_with_temperature_data() {
        assert_eq!(evidence_with_hours(6).valid_hours(), 6);
        assert_eq!(evidence_with_hours(0).valid_hours(), 0);
    }

    #[test]
    fn parse_response_accepts_bare_json() {
        let raw = r#"{"summary":"ok","recommendations":[],"confidence":"medium","trend":"stable"}"#;
        let parsed = parse_response(raw).unwrap();
        assert_eq!(parsed.summary, "ok");
        assert_eq!(parsed.confidence, "medium");
    }

    #[test]
    fn parse_response_strips_markdown_code_fence() {
        let raw = "```json\n{\"summary\":\"ok\",\"recommendations\":[],\"confidence\":\"low\",\"trend\":\"improving\"}\n```";
        let parsed = parse_response(raw).unwrap();
        assert_eq!(parsed.trend, "improving");
    }

    #[test]
    fn parse_response_rejects_invalid_json() {
        assert!(parse_response("not json").is_err());
    }

    #[test]
    fn build_prompt_forbids_disease_language_in_system_message() {
        let evidence = evidence_with_hours(1);
        let messages = build_prompt(&evidence);
        assert_eq!(messages.len(), 2);
        assert!(messages[0].content.contains("disease"));
    }
}
