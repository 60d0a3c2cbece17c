//! services/api/src/adapters/chat_log.rs
//!
//! Records workflow narration as chat messages in the document store.

use async_trait::async_trait;
use chrono::Utc;
use course_forge_core::ports::{DocumentStore, PortResult, TransitionLog};
use serde_json::json;
use std::sync::Arc;

pub const CHAT_MESSAGES_COLLECTION: &str = "chat_messages";

pub struct DocumentTransitionLog {
    store: Arc<dyn DocumentStore>,
}

impl DocumentTransitionLog {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl TransitionLog for DocumentTransitionLog {
    async fn store_message(&self, session_id: &str, role: &str, text: &str) -> PortResult<()> {
        self.store
            .insert(
                CHAT_MESSAGES_COLLECTION,
                json!({
                    "session_id": session_id,
                    "role": role,
                    "content": text,
                    "created_at": Utc::now(),
                }),
            )
            .await?;
        Ok(())
    }
}
