use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};

static ENVELOPE_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Block,
    Tournament,
    Group,
    BettingOpportunityUpdated,
    ParticipantRegistered,
    ParticipantWithdrawn,
    ResultsProcessed,
    BettingGroupFinalized,
    BettingGroupCancelled,
    System,
}

/// Message published to live subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub message: String,
    pub timestamp_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl EventEnvelope {
    pub fn new(event_type: EventType, message: impl Into<String>) -> Self {
        Self::with_prefix("event", event_type, message)
    }

    pub fn system(message: impl Into<String>) -> Self {
        Self::with_prefix("system", EventType::System, message)
    }

    pub fn with_prefix(prefix: &str, event_type: EventType, message: impl Into<String>) -> Self {
        let timestamp_ms = chrono::Utc::now().timestamp_millis();
        let seq = ENVELOPE_SEQ.fetch_add(1, Ordering::Relaxed);
        Self {
            id: format!("{}-{}-{}", prefix, timestamp_ms, seq),
            event_type,
            message: message.into(),
            timestamp_ms,
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}
