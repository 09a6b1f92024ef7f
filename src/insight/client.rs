//! HTTP client for the external LLM chat-completion endpoint.
//!
//! Wire contract: POST `{model, messages:[{role, content}], temperature,
//! max_tokens}`, response `choices[0].message.content` holding the model's
//! raw text (expected to be a JSON document the caller parses separately).

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const TEMPERATURE: f64 = 0.7;
const MAX_TOKENS: u32 = 1000;

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system", content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user", content: content.into() }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Debug, Error)]
pub enum LlmClientError {
    #[error("llm request timed out")]
    Timeout,
    #[error("llm request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("llm returned no choices")]
    EmptyResponse,
}

/// Thin wrapper around a `reqwest::Client` bound to one endpoint/model/key.
#[derive(Debug, Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    endpoint_url: String,
    model: String,
    api_key: String,
}

impl LlmClient {
    pub fn new(endpoint_url: impl Into<String>, model: impl Into<String>, api_key: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(crate::config::defaults::insight::LLM_PER_CALL_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { http, endpoint_url: endpoint_url.into(), model: model.into(), api_key: api_key.into() }
    }

    /// Send one chat-completion request and return the raw assistant content
    /// string. Does not retry or parse — callers compose with
    /// [`crate::retry::retry_llm_call`] and their own JSON parsing.
    pub async fn chat(&self, messages: &[ChatMessage]) -> Result<String, LlmClientError> {
        let body = ChatRequest { model: &self.model, messages, temperature: TEMPERATURE, max_tokens: MAX_TOKENS };

        let response = self
            .http
            .post(&self.endpoint_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| if err.is_timeout() { LlmClientError::Timeout } else { LlmClientError::Request(err) })?;

        let response = response.error_for_status()?;
        let parsed: ChatResponse = response.json().await?;
        parsed.choices.into_iter().next().map(|c| c.message.content).ok_or(LlmClientError::EmptyResponse)
    }
}

/// Run `chat` with exponential-backoff retry and an overall wall-clock budget
/// on top of it — the budget bounds total retry time, not any single call
/// (each call already carries its own per-attempt timeout via the client).
pub async fn chat_with_retry(client: &LlmClient, messages: &[ChatMessage]) -> Result<String, LlmClientError> {
    let overall = crate::config::defaults::insight::LLM_OVERALL_BUDGET;
    match tokio::time::timeout(overall, crate::retry::retry_llm_call(|| client.chat(messages))).await {
        Ok(result) => result,
        Err(_) => Err(LlmClientError::Timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_message_constructors_set_role() {
        let sys = ChatMessage::system("be helpful");
        let user = ChatMessage::user("hello");
        assert_eq!(sys.role, "system");
        assert_eq!(user.role, "user");
    }
}
