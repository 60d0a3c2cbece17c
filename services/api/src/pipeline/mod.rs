//! services/api/src/pipeline/mod.rs
//!
//! The generation pipelines: the stage orchestrator with its four stage
//! producers, and the multi-agent slide pipeline.

pub mod orchestrator;
pub mod slides;
pub mod stages;

pub use orchestrator::{
    StageContext, StageError, StageEvent, StageOrchestrator, StageProducer, StageSignal,
};
pub use slides::{MultiAgentSlidePipeline, Slide, SlideRequest};
pub use stages::{ContentStage, DesignStage, ResearchStage, StructureStage};
