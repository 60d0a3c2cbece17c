//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use crate::pipeline::{MultiAgentSlidePipeline, StageOrchestrator};
use crate::web::registry::ConnectionRegistry;
use course_forge_core::ports::ObjectStore;
use course_forge_core::CoursePlanner;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub objects: Arc<dyn ObjectStore>,
    pub planner: Arc<CoursePlanner>,
    pub orchestrator: Arc<StageOrchestrator>,
    pub slides: Arc<MultiAgentSlidePipeline>,
    /// Live listeners of every running generation session.
    pub registry: Arc<ConnectionRegistry>,
}
