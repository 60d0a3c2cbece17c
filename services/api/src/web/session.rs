//! services/api/src/web/session.rs
//!
//! A `GenerationSession` is the single writer of a session's event sequence.
//! Stage runs and the slide pipeline emit through it; the registry fans the
//! sequenced events out to listeners.

use crate::web::protocol::{Event, EventType};
use crate::web::registry::ConnectionRegistry;
use serde_json::{json, Value};
use std::sync::Arc;

pub struct GenerationSession {
    id: String,
    sequence: u64,
    registry: Arc<ConnectionRegistry>,
}

impl GenerationSession {
    /// Opens the session in the registry and emits `connection_established` as event 1.
    pub async fn open(registry: Arc<ConnectionRegistry>, id: impl Into<String>) -> Self {
        let id = id.into();
        registry.open(&id).await;
        let mut session = Self {
            id,
            sequence: 0,
            registry,
        };
        let data = json!({ "session_id": session.id });
        session.emit(EventType::ConnectionEstablished, data).await;
        session
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Stamps the next sequence number on an event and broadcasts it.
    pub async fn emit(&mut self, kind: EventType, data: Value) -> Event {
        self.sequence += 1;
        let event = Event::new(kind, data, self.sequence);
        self.registry.broadcast(&self.id, &event).await;
        event
    }

    /// Tears the session down. Call only after the terminal event was emitted.
    pub async fn close(self) {
        self.registry.close(&self.id).await;
    }
}
