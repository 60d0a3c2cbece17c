//! In-test fakes shared by the service's unit tests.

use crate::adapters::{InMemoryDocumentStore, InMemoryObjectStore};
use crate::config::Config;
use crate::pipeline::{
    ContentStage, DesignStage, MultiAgentSlidePipeline, ResearchStage, StageOrchestrator,
    StructureStage,
};
use crate::web::protocol::{Event, EventType};
use crate::web::registry::{ConnectionRegistry, EventSink, TransportError};
use crate::web::state::AppState;
use async_trait::async_trait;
use course_forge_core::ports::{LanguageModel, PortError, PortResult, TransitionLog};
use course_forge_core::{CoursePlanner, StructureExtractor};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Records every event it receives.
#[derive(Default)]
pub struct CollectingSink(pub Mutex<Vec<Event>>);

impl CollectingSink {
    pub fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }

    pub fn sequences(&self) -> Vec<u64> {
        self.events().iter().map(|e| e.sequence).collect()
    }

    pub fn kinds(&self) -> Vec<EventType> {
        self.events().iter().map(|e| e.kind).collect()
    }

    pub fn of_kind(&self, kind: EventType) -> Vec<Event> {
        self.events().into_iter().filter(|e| e.kind == kind).collect()
    }
}

#[async_trait]
impl EventSink for CollectingSink {
    async fn send(&self, event: &Event) -> Result<(), TransportError> {
        self.0.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Replays canned completions in order; errors once the script runs out.
#[derive(Default)]
pub struct ScriptedLlm {
    responses: Mutex<VecDeque<PortResult<String>>>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(|r| Ok(r.into())).collect()),
            prompts: Mutex::default(),
        }
    }

    pub fn push_err(&self, message: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(PortError::Unexpected(message.to_string())));
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedLlm {
    async fn complete(&self, _system: &str, user: &str, _max_tokens: u32) -> PortResult<String> {
        self.prompts.lock().unwrap().push(user.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(PortError::Unexpected("script exhausted".into())))
    }
}

/// Captures narration as `(session_id, role, text)` triples.
#[derive(Default)]
pub struct RecordingLog(pub Mutex<Vec<(String, String, String)>>);

impl RecordingLog {
    pub fn texts(&self) -> Vec<String> {
        self.0.lock().unwrap().iter().map(|(_, _, t)| t.clone()).collect()
    }
}

#[async_trait]
impl TransitionLog for RecordingLog {
    async fn store_message(&self, session_id: &str, role: &str, text: &str) -> PortResult<()> {
        self.0
            .lock()
            .unwrap()
            .push((session_id.to_string(), role.to_string(), text.to_string()));
        Ok(())
    }
}

/// A configuration that never auto-advances and never waits between stages.
pub fn test_config() -> Config {
    Config {
        bind_address: "127.0.0.1:0".parse().unwrap(),
        database_url: None,
        log_level: tracing::Level::INFO,
        openai_api_key: "sk-test".to_string(),
        openai_base_url: None,
        llm_model: "test-model".to_string(),
        llm_fast_model: "test-model".to_string(),
        chain_delay: Duration::ZERO,
        auto_advance: HashSet::new(),
    }
}

/// The full application state wired to in-memory stores and a scripted model.
pub struct TestApp {
    pub state: Arc<AppState>,
    pub objects: Arc<InMemoryObjectStore>,
    pub documents: Arc<InMemoryDocumentStore>,
}

pub fn test_app(llm: Arc<ScriptedLlm>) -> TestApp {
    let objects = Arc::new(InMemoryObjectStore::new());
    let documents = Arc::new(InMemoryDocumentStore::new());
    let llm: Arc<dyn LanguageModel> = llm;

    let planner = Arc::new(CoursePlanner::new(
        objects.clone(),
        documents.clone(),
        StructureExtractor::with_default_chain(llm.clone()),
    ));
    let orchestrator = StageOrchestrator::new(Arc::new(RecordingLog::default()), Duration::ZERO)
        .with_producer(Arc::new(ResearchStage::new(llm.clone(), objects.clone())))
        .with_producer(Arc::new(DesignStage::new(llm.clone(), objects.clone())))
        .with_producer(Arc::new(StructureStage::new(planner.clone())))
        .with_producer(Arc::new(ContentStage::new(planner.clone())));

    let state = Arc::new(AppState {
        config: Arc::new(test_config()),
        objects: objects.clone(),
        planner,
        orchestrator: Arc::new(orchestrator),
        slides: Arc::new(MultiAgentSlidePipeline::new(llm, documents.clone())),
        registry: Arc::new(ConnectionRegistry::new()),
    });
    TestApp {
        state,
        objects,
        documents,
    }
}
