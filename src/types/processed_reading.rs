//! The idempotency ledger row shape. See [`crate::idempotency`].

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStage {
    Event,
    Aggregate,
    Status,
}

impl ProcessingStage {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessingStage::Event => "event",
            ProcessingStage::Aggregate => "aggregate",
            ProcessingStage::Status => "status",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProcessedReading {
    pub reading_id: String,
    pub event_processed_at_ms: Option<i64>,
    pub aggregate_processed_at_ms: Option<i64>,
    pub status_processed_at_ms: Option<i64>,
    pub ttl_unix_secs: i64,
}

impl ProcessedReading {
    pub fn is_processed(&self, stage: ProcessingStage) -> bool {
        match stage {
            ProcessingStage::Event => self.event_processed_at_ms.is_some(),
            ProcessingStage::Aggregate => self.aggregate_processed_at_ms.is_some(),
            ProcessingStage::Status => self.status_processed_at_ms.is_some(),
        }
    }
}
