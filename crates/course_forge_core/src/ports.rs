//! crates/course_forge_core/src/ports.rs
//!
//! Defines the service contracts (traits) the course pipeline consumes.
//! These traits form the boundary of the hexagonal architecture: the extraction,
//! checklist and materialization logic never touches a concrete database,
//! blob store or LLM client.

use async_trait::async_trait;
use serde_json::Value;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// The key under which stored documents expose their identifier.
pub const ID_FIELD: &str = "_id";

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Blob storage for raw source documents (design docs, research notes).
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Returns `None` when nothing is stored under `key`.
    async fn get(&self, key: &str) -> PortResult<Option<String>>;

    /// Stores `text` under `key`, replacing any previous value, and returns the key.
    async fn put(&self, key: &str, text: &str) -> PortResult<String>;
}

/// A generic collection-oriented document store.
///
/// Documents returned by `find_one` carry their identifier under [`ID_FIELD`].
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert(&self, collection: &str, doc: Value) -> PortResult<String>;

    /// Finds the first document whose fields contain every key/value in `filter`.
    async fn find_one(&self, collection: &str, filter: Value) -> PortResult<Option<Value>>;

    /// Merges `patch` into the document; returns `false` when no document matched.
    async fn update(&self, collection: &str, id: &str, patch: Value) -> PortResult<bool>;
}

/// A black-box text completion model.
///
/// No function calling or structured-output mode is assumed: all structure comes
/// from prompt instructions plus post-hoc parsing, and the text may be malformed.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        max_tokens: u32,
    ) -> PortResult<String>;
}

/// Hook for recording human-readable workflow narration (chat/audit log).
#[async_trait]
pub trait TransitionLog: Send + Sync {
    async fn store_message(&self, session_id: &str, role: &str, text: &str) -> PortResult<()>;
}
