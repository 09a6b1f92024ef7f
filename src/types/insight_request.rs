//! The insight generation queue / audit log.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InsightRequestType {
    Scheduled,
    Event,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InsightRequestStatus {
    Pending,
    Processing,
    Done,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InsightRequest {
    pub hardware_id: String,
    pub request_time_ms: i64,
    pub request_type: InsightRequestType,
    pub status: InsightRequestStatus,
    pub event_type: Option<String>,
    pub processed_at_ms: Option<i64>,
    pub error_message: Option<String>,
}

impl InsightRequest {
    pub fn new_scheduled(hardware_id: impl Into<String>, now_ms: i64) -> Self {
        Self {
            hardware_id: hardware_id.into(),
            request_time_ms: now_ms,
            request_type: InsightRequestType::Scheduled,
            status: InsightRequestStatus::Pending,
            event_type: None,
            processed_at_ms: None,
            error_message: None,
        }
    }

    pub fn new_event_driven(hardware_id: impl Into<String>, event_type: &str, now_ms: i64) -> Self {
        Self {
            hardware_id: hardware_id.into(),
            request_time_ms: now_ms,
            request_type: InsightRequestType::Event,
            status: InsightRequestStatus::Pending,
            event_type: Some(event_type.to_string()),
            processed_at_ms: None,
            error_message: None,
        }
    }
}
