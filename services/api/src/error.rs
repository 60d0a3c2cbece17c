//! services/api/src/error.rs
//!
//! Errors that stop the server or a listener socket. Request-level failures
//! never reach this type; handlers answer them with `web::rest::Failure`.

use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The environment did not describe a runnable service.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Connecting to PostgreSQL or applying the migrations failed.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// A listener socket failed while a session was streaming to it.
    #[error("WebSocket Error: {0}")]
    Websocket(#[from] axum::Error),

    /// Binding or serving the HTTP listener failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
