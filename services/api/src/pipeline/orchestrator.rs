//! services/api/src/pipeline/orchestrator.rs
//!
//! The stage state machine.
//!
//! Every stage is a producer of typed [`StageSignal`]s. The orchestrator forwards
//! `Forward` events unchanged, and on the stage's completion signal either stops
//! (`Halt`) or starts the immediately following stage in the same session
//! (`Advance`). A producer error emits exactly one `error` event and ends the run.

use crate::web::protocol::EventType;
use crate::web::session::GenerationSession;
use course_forge_core::{ports::TransitionLog, Stage};
use futures::stream::{BoxStream, StreamExt};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

//=========================================================================================
// Signals and Errors
//=========================================================================================

/// An event a stage wants delivered to the session's listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct StageEvent {
    pub kind: EventType,
    pub data: Value,
}

impl StageEvent {
    pub fn new(kind: EventType, data: Value) -> Self {
        Self { kind, data }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StageSignal {
    Forward(StageEvent),
    /// The stage finished and the next stage should start right away.
    Advance { next: Stage, summary: Value },
    /// The stage finished; the next stage needs an explicit request.
    Halt { summary: Value },
}

impl StageSignal {
    pub fn forward(kind: EventType, data: Value) -> Self {
        Self::Forward(StageEvent::new(kind, data))
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("Stage '{stage}' failed: {message}")]
pub struct StageError {
    pub stage: Stage,
    pub message: String,
}

impl StageError {
    pub fn new(stage: Stage, message: impl ToString) -> Self {
        Self {
            stage,
            message: message.to_string(),
        }
    }
}

pub type StageStream<'a> = BoxStream<'a, Result<StageSignal, StageError>>;

//=========================================================================================
// Producers
//=========================================================================================

/// Inputs shared by every stage of one run.
#[derive(Debug, Clone, Default)]
pub struct StageContext {
    pub course_id: String,
    pub course_name: String,
    pub description: String,
    /// Stages whose completion chains into the next stage.
    pub auto_advance: HashSet<Stage>,
}

impl StageContext {
    /// The completion signal for `stage` under this run's auto-advance set.
    pub fn completion(&self, stage: Stage, summary: Value) -> StageSignal {
        match stage.next() {
            Some(next) if self.auto_advance.contains(&stage) => StageSignal::Advance { next, summary },
            _ => StageSignal::Halt { summary },
        }
    }
}

pub trait StageProducer: Send + Sync {
    fn stage(&self) -> Stage;

    fn run<'a>(&'a self, ctx: &'a StageContext) -> StageStream<'a>;
}

//=========================================================================================
// The Orchestrator
//=========================================================================================

pub struct StageOrchestrator {
    producers: HashMap<Stage, Arc<dyn StageProducer>>,
    log: Arc<dyn TransitionLog>,
    chain_delay: Duration,
}

impl StageOrchestrator {
    pub fn new(log: Arc<dyn TransitionLog>, chain_delay: Duration) -> Self {
        Self {
            producers: HashMap::new(),
            log,
            chain_delay,
        }
    }

    /// Registers the producer for its stage, replacing any previous one.
    pub fn with_producer(mut self, producer: Arc<dyn StageProducer>) -> Self {
        self.producers.insert(producer.stage(), producer);
        self
    }

    /// Runs `start` and any stages it chains into, streaming through `session`.
    ///
    /// Returns the last stage that completed, or the error that stopped the run.
    /// Either way the session's final event is terminal.
    pub async fn run(
        &self,
        session: &mut GenerationSession,
        start: Stage,
        ctx: &StageContext,
    ) -> Result<Stage, StageError> {
        let mut current = start;

        loop {
            let Some(producer) = self.producers.get(&current) else {
                let e = StageError::new(current, "no producer registered for this stage");
                return Err(self.fail(session, e).await);
            };

            info!("Session {}: running stage '{}'.", session.id(), current);

            let mut next_stage = None;
            let mut completed = false;
            let mut stream = producer.run(ctx);

            while let Some(item) = stream.next().await {
                match item {
                    Ok(StageSignal::Forward(event)) => {
                        session.emit(event.kind, event.data).await;
                    }
                    Ok(StageSignal::Advance { next, summary }) => {
                        if current.next() != Some(next) {
                            let e = StageError::new(
                                current,
                                format!("cannot chain into '{}' from '{}'", next, current),
                            );
                            return Err(self.fail(session, e).await);
                        }
                        let data = json!({
                            "stage": current,
                            "summary": summary,
                            "workflow_transition": {
                                "from": current,
                                "to": next,
                                "automatic": true,
                            },
                        });
                        session.emit(EventType::Complete, data).await;
                        next_stage = Some(next);
                        break;
                    }
                    Ok(StageSignal::Halt { summary }) => {
                        let data = json!({ "stage": current, "summary": summary });
                        session.emit(EventType::Complete, data).await;
                        completed = true;
                        break;
                    }
                    Err(e) => return Err(self.fail(session, e).await),
                }
            }
            drop(stream);

            let Some(next) = next_stage else {
                if !completed {
                    // Stream ended without a completion signal.
                    let data = json!({ "stage": current, "summary": {} });
                    session.emit(EventType::Complete, data).await;
                }
                self.narrate(session.id(), &format!("The {} stage is complete.", current))
                    .await;
                info!("Session {}: finished after stage '{}'.", session.id(), current);
                return Ok(current);
            };

            self.narrate(
                session.id(),
                &format!("{} complete, starting {}...", capitalize(current.as_str()), next),
            )
            .await;
            info!(
                "Session {}: auto-advancing '{}' -> '{}'.",
                session.id(),
                current,
                next
            );

            tokio::time::sleep(self.chain_delay).await;
            let data = json!({ "from": current, "to": next, "automatic": true });
            session.emit(EventType::WorkflowTransition, data).await;
            current = next;
        }
    }

    async fn fail(&self, session: &mut GenerationSession, e: StageError) -> StageError {
        error!("Session {}: {}", session.id(), e);
        let data = json!({ "stage": e.stage, "message": e.message });
        session.emit(EventType::Error, data).await;
        self.narrate(
            session.id(),
            &format!("The {} stage failed: {}", e.stage, e.message),
        )
        .await;
        e
    }

    async fn narrate(&self, session_id: &str, text: &str) {
        if let Err(e) = self.log.store_message(session_id, "assistant", text).await {
            warn!("Failed to record narration for session {}: {}", session_id, e);
        }
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
