//! services/api/src/web/protocol.rs
//!
//! Defines the event envelope streamed to every listener of a generation
//! session, over both server-sent events and WebSocket text frames.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// The recognized event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Metadata,
    Text,
    ProgressUpdate,
    AgentMessage,
    StatusUpdate,
    SlideGenerated,
    WorkflowTransition,
    /// Marks the end of a stage or pipeline run. Terminal unless a transition follows.
    Complete,
    /// Always terminal.
    Error,
    ConnectionEstablished,
    GenerationComplete,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Metadata => "metadata",
            Self::Text => "text",
            Self::ProgressUpdate => "progress_update",
            Self::AgentMessage => "agent_message",
            Self::StatusUpdate => "status_update",
            Self::SlideGenerated => "slide_generated",
            Self::WorkflowTransition => "workflow_transition",
            Self::Complete => "complete",
            Self::Error => "error",
            Self::ConnectionEstablished => "connection_established",
            Self::GenerationComplete => "generation_complete",
        }
    }
}

/// One sequenced event as delivered to listeners.
///
/// `sequence` starts at 1 for every session and increases by exactly one per event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventType,
    #[schema(value_type = Object)]
    pub data: Value,
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(kind: EventType, data: Value, sequence: u64) -> Self {
        Self {
            kind,
            data,
            sequence,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_wire_shape() {
        let event = Event::new(EventType::ProgressUpdate, json!({ "current_step": 2 }), 7);
        let wire = serde_json::to_value(&event).unwrap();

        assert_eq!(wire["type"], "progress_update");
        assert_eq!(wire["sequence"], 7);
        assert_eq!(wire["data"]["current_step"], 2);
        assert!(wire["timestamp"].as_str().unwrap().contains('T'));
        assert_eq!(EventType::ProgressUpdate.as_str(), "progress_update");
    }
}
