//! Operator-tunable settings, loaded from TOML with built-in fallbacks.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

use super::defaults;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TableNames {
    pub readings: String,
    pub events: String,
    pub aggregates: String,
    pub insights: String,
    pub insight_requests: String,
    pub device_profiles: String,
    pub device_status: String,
    pub rollups: String,
    pub processed_readings: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            readings: "readings".to_string(),
            events: "events".to_string(),
            aggregates: "aggregates".to_string(),
            insights: "insights".to_string(),
            insight_requests: "insight_requests".to_string(),
            device_profiles: "device_profiles".to_string(),
            device_status: "device_status".to_string(),
            rollups: "rollups".to_string(),
            processed_readings: "processed_readings".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub endpoint_url: String,
    pub model: String,
    /// Read from `LLM_API_KEY` at load time rather than persisted in TOML;
    /// `None` puts the generator into degraded (canned-response) mode.
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint_url: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub tables: TableNames,
    pub llm: LlmConfig,
    pub active_device_threshold_hours: i64,
    pub event_driven_daily_cap: u32,
    pub insight_batch_size: usize,
    pub sled_path: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tables: TableNames::default(),
            llm: LlmConfig::default(),
            active_device_threshold_hours: defaults::insight::ACTIVE_DEVICE_THRESHOLD_HOURS,
            event_driven_daily_cap: defaults::insight::EVENT_DRIVEN_DAILY_CAP,
            insight_batch_size: defaults::insight::INSIGHT_BATCH_SIZE,
            sled_path: "./data/insights-engine.sled".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load per the documented search order, falling back to defaults if no
    /// file is found or the file fails to parse.
    pub fn load() -> Self {
        let path = env::var("INSIGHTS_CONFIG").ok();
        let candidate = path.as_deref().unwrap_or("insights_engine.toml");

        let mut config = if Path::new(candidate).exists() {
            match std::fs::read_to_string(candidate) {
                Ok(raw) => toml::from_str(&raw).unwrap_or_else(|err| {
                    tracing::warn!(path = candidate, error = %err, "failed to parse config file, using defaults");
                    EngineConfig::default()
                }),
                Err(err) => {
                    tracing::warn!(path = candidate, error = %err, "failed to read config file, using defaults");
                    EngineConfig::default()
                }
            }
        } else {
            EngineConfig::default()
        };

        config.llm.api_key = env::var("LLM_API_KEY").ok().filter(|key| !key.is_empty());
        config
    }
}
