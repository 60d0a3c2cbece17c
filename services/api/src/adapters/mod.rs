pub mod chat_log;
pub mod db;
pub mod llm;
pub mod memory;

pub use chat_log::DocumentTransitionLog;
pub use db::DbAdapter;
pub use llm::OpenAiLlmAdapter;
pub use memory::{InMemoryDocumentStore, InMemoryObjectStore};
