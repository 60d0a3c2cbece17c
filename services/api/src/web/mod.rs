pub mod extract;
pub mod protocol;
pub mod registry;
pub mod rest;
pub mod session;
pub mod state;
pub mod ws_handler;

// Re-export the handlers for the OpenAPI document and the router below.
pub use rest::{
    extract_structure_handler, materialize_handler, run_stage_handler, start_slides_handler,
    update_material_status_handler, upload_document_handler,
};
pub use ws_handler::ws_handler;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, patch, post, put},
    Router,
};
use state::AppState;
use std::sync::Arc;

/// All API routes, bound to the shared state.
pub fn api_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/courses/{course_id}/documents/{kind}", put(upload_document_handler))
        .route("/courses/{course_id}/stages/{stage}", post(run_stage_handler))
        .route("/courses/{course_id}/structure", post(extract_structure_handler))
        .route("/courses/{course_id}/materials", post(materialize_handler))
        .route("/courses/{course_id}/slides", post(start_slides_handler))
        .route("/materials/{material_id}/status", patch(update_material_status_handler))
        .route("/ws/{session_id}", get(ws_handler))
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024))
        .with_state(app_state)
}
