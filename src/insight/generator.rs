//! Insight generator.
//!
//! Drains up to [`crate::config::defaults::insight::INSIGHT_BATCH_SIZE`]
//! pending requests per tick. Each request is claimed with a CAS
//! `pending -> processing` so concurrent generator instances never do the
//! same work twice; the loser of the race silently moves on.

use thiserror::Error;

use crate::clock::Clock;
use crate::config::engine_config::LlmConfig;
use crate::device_status;
use crate::insight::client::{self, ChatMessage, LlmClient, LlmClientError};
use crate::insight::prompt::{self, Evidence, ParseError};
use crate::insight::sanitize::sanitize;
use crate::persistence::{
    AggregateStore, DeviceProfileStore, DeviceStatusStore, EventStore, InsightRequestStore, InsightStore,
    PersistenceError, Store,
};
use crate::rollup;
use crate::types::{ConfidenceLevel, Insight, InsightRequest, InsightRequestStatus, Recommendation, TrendClassification, WindowType};

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Fetch and process up to `batch_size` pending requests. Returns the number
/// this call actually claimed and ran (excludes requests lost to a
/// concurrent claim race).
pub async fn run_once(
    store: &dyn Store,
    clock: &dyn Clock,
    llm: &LlmConfig,
    batch_size: usize,
) -> Result<usize, GeneratorError> {
    let pending = InsightRequestStore::fetch_pending(store, batch_size).await?;
    let mut claimed = 0;
    for request in pending {
        let won = InsightRequestStore::try_transition(
            store,
            &request.hardware_id,
            request.request_time_ms,
            InsightRequestStatus::Pending,
            InsightRequestStatus::Processing,
            None,
            None,
        )
        .await?;
        if !won {
            continue;
        }
        claimed += 1;
        process_claimed_request(store, clock, llm, &request).await;
    }
    Ok(claimed)
}

async fn process_claimed_request(store: &dyn Store, clock: &dyn Clock, llm: &LlmConfig, request: &InsightRequest) {
    let started_at_ms = clock.now_ms();
    let outcome = generate_one(store, clock, llm, &request.hardware_id).await;
    let now_ms = clock.now_ms();
    let duration_ms = now_ms - started_at_ms;

    let (next_status, error_message, success) = match &outcome {
        Ok(insight) => {
            let success = !insight.summary.is_empty() || !insight.recommendations.is_empty();
            (InsightRequestStatus::Done, None, success)
        }
        Err(err) => {
            let message = device_status::truncate_error_message(&err.to_string(), 256);
            (InsightRequestStatus::Failed, Some(message), false)
        }
    };

    if let Err(err) = InsightRequestStore::try_transition(
        store,
        &request.hardware_id,
        request.request_time_ms,
        InsightRequestStatus::Processing,
        next_status,
        error_message,
        Some(now_ms),
    )
    .await
    {
        tracing::error!(hardware_id = %request.hardware_id, error = %err, "failed to close out insight request");
    }

    if let Err(err) = rollup::on_insight_generated(store, clock, success, duration_ms).await {
        tracing::error!(hardware_id = %request.hardware_id, error = %err, "failed to record insight rollup");
    }

    if outcome.is_ok() {
        if let Err(err) =
            DeviceStatusStore::apply_patch(store, &request.hardware_id, crate::persistence::DeviceStatusPatch::from_insight_generator(now_ms), now_ms)
                .await
        {
            tracing::error!(hardware_id = %request.hardware_id, error = %err, "failed to update device status after insight generation");
        }
    }
}

#[derive(Debug, Error)]
enum GenerationFailure {
    #[error("insufficient data: fewer than the minimum required hours of valid readings")]
    InsufficientData,
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Llm(#[from] LlmClientError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

async fn generate_one(
    store: &dyn Store,
    clock: &dyn Clock,
    llm: &LlmConfig,
    hardware_id: &str,
) -> Result<Insight, GenerationFailure> {
    use crate::config::defaults::insight as d;

    let now_ms = clock.now_ms();
    let generation_started_ms = now_ms;
    let day_ms = 24 * 3_600_000;
    let week_ms = 7 * day_ms;

    let hourly_aggregates_24h = AggregateStore::range(store, hardware_id, WindowType::Hourly, now_ms - day_ms, now_ms).await?;
    let daily_aggregates_7d = AggregateStore::range(store, hardware_id, WindowType::Daily, now_ms - week_ms, now_ms).await?;
    let events_24h = EventStore::range(store, hardware_id, now_ms - day_ms, now_ms).await?;
    let profile = DeviceProfileStore::get(store, hardware_id).await?;

    let evidence = Evidence { hardware_id: hardware_id.to_string(), hourly_aggregates_24h, daily_aggregates_7d, events_24h, profile };
    let valid_hours = evidence.valid_hours();

    if valid_hours < d::MIN_VALID_HOURS_REQUIRED {
        return Err(GenerationFailure::InsufficientData);
    }
    let force_low_confidence = valid_hours < d::LOW_CONFIDENCE_VALID_HOURS_THRESHOLD;

    let evidence_snapshot = prompt::evidence_snapshot(&evidence);

    let parsed = match &llm.api_key {
        Some(api_key) if !api_key.is_empty() => {
            let client = LlmClient::new(&llm.endpoint_url, &llm.model, api_key.as_str());
            let messages: Vec<ChatMessage> = prompt::build_prompt(&evidence);
            let raw = client::chat_with_retry(&client, &messages).await?;
            prompt::parse_response(&raw)?
        }
        _ => degraded_placeholder(),
    };

    let mut confidence = parse_confidence(&parsed.confidence);
    let mut summary = sanitize(&parsed.summary);
    if force_low_confidence {
        confidence = ConfidenceLevel::Low;
        summary = format!("(Limited data available — confidence is low.) {summary}");
    }

    let recommendations = parsed
        .recommendations
        .into_iter()
        .map(|r| Recommendation { action: sanitize(&r.action), reason: sanitize(&r.reason), urgency: r.urgency })
        .collect();

    let insight = Insight {
        hardware_id: hardware_id.to_string(),
        timestamp_ms: now_ms,
        summary,
        recommendations,
        confidence,
        trend: parse_trend(&parsed.trend),
        growth_stage_suggestion: parsed.growth_stage_suggestion,
        evidence: Some(evidence_snapshot),
        llm_model: llm.api_key.as_ref().filter(|k| !k.is_empty()).map(|_| llm.model.clone()),
        generation_duration_ms: Some(clock.now_ms() - generation_started_ms),
    };

    InsightStore::put(store, insight.clone()).await?;
    Ok(insight)
}

fn parse_confidence(raw: &str) -> ConfidenceLevel {
    match raw {
        "high" => ConfidenceLevel::High,
        "low" => ConfidenceLevel::Low,
        _ => ConfidenceLevel::Medium,
    }
}

fn parse_trend(raw: &str) -> TrendClassification {
    match raw {
        "improving" => TrendClassification::Improving,
        "declining" => TrendClassification::Declining,
        _ => TrendClassification::Stable,
    }
}

/// Degraded-mode response used when no LLM API key is configured. Missing
/// credentials are an expected deployment mode, not a failure.
fn degraded_placeholder() -> prompt::ParsedInsight {
    prompt::ParsedInsight {
        summary: "Automatic insight generation is unavailable (no LLM API key configured); \
                  this is a placeholder based on recorded telemetry only."
            .to_string(),
        recommendations: Vec::new(),
        confidence: "low".to_string(),
        trend: "stable".to_string(),
        growth_stage_suggestion: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::persistence::MemoryStore;
    use crate::types::{SensorStats, WindowType};

    fn config_without_api_key() -> LlmConfig {
        LlmConfig { endpoint_url: "https://example.invalid".to_string(), model: "test-model".to_string(), api_key: None }
    }

    async fn seed_hourly_aggregates(store: &MemoryStore, hardware_id: &str, hours: i64, now_ms: i64) {
        for h in 0..hours {
            let start = now_ms - (h + 1) * 3_600_000;
            let mut agg = crate::types::Aggregate::new_empty(hardware_id, WindowType::Hourly, start, start + 3_600_000);
            agg.temperature_stats = SensorStats { valid_count: 1, total_count: 1, sum: 20.0, avg: Some(20.0), ..Default::default() };
            AggregateStore::put(store, agg).await.unwrap();
        }
    }

    #[tokio::test]
    async fn insufficient_data_fails_the_request() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(10 * 24 * 3_600_000);
        let config = config_without_api_key();
        let request = InsightRequest::new_scheduled("dev-1", clock.now_ms());
        InsightRequestStore::put(&store, request).await.unwrap();

        let claimed = run_once(&store, &clock, &config, 10).await.unwrap();
        assert_eq!(claimed, 1);
    }

    #[tokio::test]
    async fn degraded_mode_without_api_key_still_produces_insight() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(10 * 24 * 3_600_000);
        seed_hourly_aggregates(&store, "dev-1", 20, clock.now_ms()).await;
        let config = config_without_api_key();

        let outcome = generate_one(&store, &clock, &config, "dev-1").await.unwrap();
        assert_eq!(outcome.confidence, ConfidenceLevel::Low);
    }

    #[tokio::test]
    async fn low_valid_hours_forces_low_confidence_caveat() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(10 * 24 * 3_600_000);
        seed_hourly_aggregates(&store, "dev-1", 8, clock.now_ms()).await;
        let config = config_without_api_key();

        let outcome = generate_one(&store, &clock, &config, "dev-1").await.unwrap();
        assert_eq!(outcome.confidence, ConfidenceLevel::Low);
        assert!(outcome.summary.contains("Limited data"));
    }

    #[tokio::test]
    async fn run_once_respects_batch_size() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(10 * 24 * 3_600_000);
        let config = config_without_api_key();
        for i in 0..15 {
            let hardware_id = format!("dev-{i}");
            seed_hourly_aggregates(&store, &hardware_id, 20, clock.now_ms()).await;
            InsightRequestStore::put(&store, InsightRequest::new_scheduled(hardware_id, clock.now_ms())).await.unwrap();
        }
        let claimed = run_once(&store, &clock, &config, 10).await.unwrap();
        assert_eq!(claimed, 10);
    }
}
