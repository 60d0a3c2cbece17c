//! services/api/src/pipeline/stages.rs
//!
//! The producers for the four generation stages. Each one emits `metadata`
//! first, then its `text` / `progress_update` events, then the completion
//! signal chosen by the run's auto-advance set.

use crate::pipeline::orchestrator::{
    StageContext, StageError, StageProducer, StageSignal, StageStream,
};
use crate::web::protocol::EventType;
use async_stream::try_stream;
use course_forge_core::planning::{design_key, research_key};
use course_forge_core::ports::{LanguageModel, ObjectStore};
use course_forge_core::{Checklist, ChecklistBuilder, CoursePlanner, Stage};
use futures::{Stream, StreamExt};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

const RESEARCH_SYSTEM_PROMPT: &str = "You are a curriculum researcher. \
Write concise, well-organized research notes in markdown for the course you are given: \
the target audience, the core concepts in the order a learner meets them, the tools and \
versions in current use, common misconceptions, and realistic hands-on exercises.";

const DESIGN_SYSTEM_PROMPT: &str = "You are an instructional designer. \
Turn the research notes into a course design document using EXACTLY this markdown layout:\n\
# <Course Title>\n\
**Level:** <Beginner|Intermediate|Advanced>\n\
**Duration:** <e.g. 6 weeks>\n\
**Prerequisites:**\n\
- <one bullet per prerequisite>\n\
**Tools:** <comma separated list>\n\n\
## **Module 1 — <Module Title>**\n\
| **Chapter 1.1: <Chapter Title>** |\n\
| <one line describing what the chapter covers> |\n\n\
Repeat the module heading for every module and the two table rows for every chapter, \
numbering chapters <module>.<chapter> from 1. End with the heading `## **Final Project**`. \
Chapter titles must be specific to the subject, never generic.";

const RESEARCH_MAX_TOKENS: u32 = 4000;
const DESIGN_MAX_TOKENS: u32 = 6000;

fn display_name(ctx: &StageContext) -> &str {
    if ctx.course_name.trim().is_empty() {
        &ctx.course_id
    } else {
        &ctx.course_name
    }
}

fn started(stage: Stage, ctx: &StageContext) -> StageSignal {
    StageSignal::forward(
        EventType::Metadata,
        json!({
            "stage": stage,
            "status": "started",
            "course_id": ctx.course_id,
        }),
    )
}

//=========================================================================================
// Research
//=========================================================================================

/// Generates research notes and stores them as `courses/{id}/research.md`.
pub struct ResearchStage {
    llm: Arc<dyn LanguageModel>,
    objects: Arc<dyn ObjectStore>,
}

impl ResearchStage {
    pub fn new(llm: Arc<dyn LanguageModel>, objects: Arc<dyn ObjectStore>) -> Self {
        Self { llm, objects }
    }

    fn stream<'a>(
        &'a self,
        ctx: &'a StageContext,
    ) -> impl Stream<Item = Result<StageSignal, StageError>> + Send + 'a {
        try_stream! {
            const STAGE: Stage = Stage::Research;
            yield started(STAGE, ctx);

            let prompt = format!(
                "Course: {}\n\nDescription:\n{}",
                display_name(ctx),
                if ctx.description.is_empty() { "(none provided)" } else { ctx.description.as_str() }
            );
            let notes = self
                .llm
                .complete(RESEARCH_SYSTEM_PROMPT, &prompt, RESEARCH_MAX_TOKENS)
                .await
                .map_err(|e| StageError::new(STAGE, e))?;
            yield StageSignal::forward(EventType::Text, json!({ "content": notes }));

            let key = self
                .objects
                .put(&research_key(&ctx.course_id), &notes)
                .await
                .map_err(|e| StageError::new(STAGE, e))?;
            info!("Stored research notes for course {} at {}.", ctx.course_id, key);

            yield ctx.completion(STAGE, json!({ "key": key, "characters": notes.len() }));
        }
    }
}

impl StageProducer for ResearchStage {
    fn stage(&self) -> Stage {
        Stage::Research
    }

    fn run<'a>(&'a self, ctx: &'a StageContext) -> StageStream<'a> {
        self.stream(ctx).boxed()
    }
}

//=========================================================================================
// Design
//=========================================================================================

/// Turns the research notes into the markdown design document.
pub struct DesignStage {
    llm: Arc<dyn LanguageModel>,
    objects: Arc<dyn ObjectStore>,
}

impl DesignStage {
    pub fn new(llm: Arc<dyn LanguageModel>, objects: Arc<dyn ObjectStore>) -> Self {
        Self { llm, objects }
    }

    fn stream<'a>(
        &'a self,
        ctx: &'a StageContext,
    ) -> impl Stream<Item = Result<StageSignal, StageError>> + Send + 'a {
        try_stream! {
            const STAGE: Stage = Stage::Design;
            yield started(STAGE, ctx);

            let research = self
                .objects
                .get(&research_key(&ctx.course_id))
                .await
                .map_err(|e| StageError::new(STAGE, e))?;
            let research = match research {
                Some(notes) => notes,
                None => {
                    warn!("No research notes for course {}; designing from the description.", ctx.course_id);
                    ctx.description.clone()
                }
            };

            let prompt = format!(
                "Course: {}\n\nResearch notes:\n{}",
                display_name(ctx),
                research
            );
            let design = self
                .llm
                .complete(DESIGN_SYSTEM_PROMPT, &prompt, DESIGN_MAX_TOKENS)
                .await
                .map_err(|e| StageError::new(STAGE, e))?;
            yield StageSignal::forward(EventType::Text, json!({ "content": design }));

            let key = self
                .objects
                .put(&design_key(&ctx.course_id), &design)
                .await
                .map_err(|e| StageError::new(STAGE, e))?;
            info!("Stored design document for course {} at {}.", ctx.course_id, key);

            yield ctx.completion(STAGE, json!({ "key": key, "characters": design.len() }));
        }
    }
}

impl StageProducer for DesignStage {
    fn stage(&self) -> Stage {
        Stage::Design
    }

    fn run<'a>(&'a self, ctx: &'a StageContext) -> StageStream<'a> {
        self.stream(ctx).boxed()
    }
}

//=========================================================================================
// Structure
//=========================================================================================

/// Extracts and persists the course structure from the stored documents.
pub struct StructureStage {
    planner: Arc<CoursePlanner>,
}

impl StructureStage {
    pub fn new(planner: Arc<CoursePlanner>) -> Self {
        Self { planner }
    }

    fn stream<'a>(
        &'a self,
        ctx: &'a StageContext,
    ) -> impl Stream<Item = Result<StageSignal, StageError>> + Send + 'a {
        try_stream! {
            const STAGE: Stage = Stage::Structure;
            yield started(STAGE, ctx);

            let structure = self
                .planner
                .extract_course_structure(&ctx.course_id, display_name(ctx))
                .await
                .map_err(|e| StageError::new(STAGE, e))?;

            yield StageSignal::forward(EventType::Text, json!({ "content": structure.rendered }));

            let counts = checklist_counts(&structure.checklist);
            let mut metadata = counts.clone();
            metadata["strategy"] = json!(structure.strategy);
            metadata["modules"] = json!(structure.tree.modules.len());
            yield StageSignal::forward(EventType::Metadata, metadata);

            yield ctx.completion(STAGE, counts);
        }
    }
}

impl StageProducer for StructureStage {
    fn stage(&self) -> Stage {
        Stage::Structure
    }

    fn run<'a>(&'a self, ctx: &'a StageContext) -> StageStream<'a> {
        self.stream(ctx).boxed()
    }
}

fn checklist_counts(checklist: &Checklist) -> serde_json::Value {
    json!({
        "total_items": checklist.total_items,
        "total_slides": checklist.total_slides,
        "total_quizzes": checklist.total_quizzes,
        "total_assessments": checklist.total_assessments,
    })
}

//=========================================================================================
// Content
//=========================================================================================

/// Materializes the stored structure, one module at a time.
pub struct ContentStage {
    planner: Arc<CoursePlanner>,
}

impl ContentStage {
    pub fn new(planner: Arc<CoursePlanner>) -> Self {
        Self { planner }
    }

    fn stream<'a>(
        &'a self,
        ctx: &'a StageContext,
    ) -> impl Stream<Item = Result<StageSignal, StageError>> + Send + 'a {
        try_stream! {
            const STAGE: Stage = Stage::Content;
            yield started(STAGE, ctx);

            let structure = self
                .planner
                .load_structure(&ctx.course_id)
                .await
                .map_err(|e| StageError::new(STAGE, e))?;
            let checklist = ChecklistBuilder::build(&structure.tree);
            let total_steps = checklist.modules.len();
            let mut created = 0;

            for (index, module) in checklist.modules.iter().enumerate() {
                let slice = Checklist {
                    course_title: checklist.course_title.clone(),
                    modules: vec![module.clone()],
                    ..Checklist::default()
                };
                let report = self
                    .planner
                    .materializer()
                    .materialize(&ctx.course_id, &slice)
                    .await
                    .map_err(|e| StageError::new(STAGE, e))?;
                created += report.created_count;

                yield StageSignal::forward(
                    EventType::ProgressUpdate,
                    json!({
                        "current_step": index + 1,
                        "total_steps": total_steps,
                        "module_number": module.module_number,
                        "module_title": module.title,
                        "created_count": report.created_count,
                    }),
                );
            }

            info!("Materialized {} items for course {}.", created, ctx.course_id);
            yield ctx.completion(STAGE, json!({ "created_count": created }));
        }
    }
}

impl StageProducer for ContentStage {
    fn stage(&self) -> Stage {
        Stage::Content
    }

    fn run<'a>(&'a self, ctx: &'a StageContext) -> StageStream<'a> {
        self.stream(ctx).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryDocumentStore, InMemoryObjectStore};
    use crate::test_support::ScriptedLlm;
    use course_forge_core::materialize::MATERIALS_COLLECTION;
    use course_forge_core::StructureExtractor;
    use futures::TryStreamExt;

    const DESIGN: &str = "\
# Practical Rust
## **Module 1 — Foundations**
| **Chapter 1.1: Introduction to Ownership** |
| Moves, borrows and lifetimes |
| **Chapter 1.2: Toolchain Setup** |
## **Module 2 — Services**
| **Chapter 2.1: Building an HTTP API** |
## **Final Project**
";

    fn ctx(auto: &[Stage]) -> StageContext {
        StageContext {
            course_id: "c1".into(),
            course_name: "Practical Rust".into(),
            description: "Rust for backend developers".into(),
            auto_advance: auto.iter().copied().collect(),
        }
    }

    async fn collect(producer: &dyn StageProducer, ctx: &StageContext) -> Vec<StageSignal> {
        producer.run(ctx).try_collect().await.unwrap()
    }

    #[tokio::test]
    async fn research_stores_notes_and_requests_design() {
        let llm = Arc::new(ScriptedLlm::new(["## Notes\nOwnership first."]));
        let objects = Arc::new(InMemoryObjectStore::new());
        let stage = ResearchStage::new(llm.clone(), objects.clone());

        let signals = collect(&stage, &ctx(&[Stage::Research])).await;

        assert!(matches!(&signals[0], StageSignal::Forward(e) if e.kind == EventType::Metadata));
        assert!(matches!(&signals[1], StageSignal::Forward(e) if e.kind == EventType::Text));
        assert!(matches!(
            signals.last(),
            Some(StageSignal::Advance { next: Stage::Design, .. })
        ));
        assert_eq!(
            objects.get(&research_key("c1")).await.unwrap().as_deref(),
            Some("## Notes\nOwnership first.")
        );
        assert!(llm.prompts.lock().unwrap()[0].contains("Rust for backend developers"));
    }

    #[tokio::test]
    async fn design_failure_surfaces_as_stage_error() {
        let llm = Arc::new(ScriptedLlm::default());
        llm.push_err("rate limited");
        let stage = DesignStage::new(llm, Arc::new(InMemoryObjectStore::new()));

        let result: Result<Vec<StageSignal>, StageError> = stage.run(&ctx(&[])).try_collect().await;

        let err = result.unwrap_err();
        assert_eq!(err.stage, Stage::Design);
        assert!(err.message.contains("rate limited"));
    }

    #[tokio::test]
    async fn structure_then_content_materializes_per_module() {
        let objects = Arc::new(InMemoryObjectStore::new());
        objects.put(&design_key("c1"), DESIGN).await.unwrap();
        let documents = Arc::new(InMemoryDocumentStore::new());
        // The model is down, so the heuristic parser produces the tree.
        let llm = Arc::new(ScriptedLlm::default());
        let planner = Arc::new(CoursePlanner::new(
            objects,
            documents.clone(),
            StructureExtractor::with_default_chain(llm),
        ));

        let structure = collect(&StructureStage::new(planner.clone()), &ctx(&[])).await;
        let Some(StageSignal::Halt { summary }) = structure.last() else {
            panic!("expected halt, got {:?}", structure.last());
        };
        let total_items = summary["total_items"].as_u64().unwrap() as usize;
        let metadata = structure
            .iter()
            .filter_map(|s| match s {
                StageSignal::Forward(e) if e.kind == EventType::Metadata => Some(e),
                _ => None,
            })
            .last()
            .unwrap();
        assert_eq!(metadata.data["strategy"], "heuristic");
        assert_eq!(metadata.data["modules"], 3);

        let content = collect(&ContentStage::new(planner), &ctx(&[])).await;
        let progress: Vec<_> = content
            .iter()
            .filter_map(|s| match s {
                StageSignal::Forward(e) if e.kind == EventType::ProgressUpdate => Some(e),
                _ => None,
            })
            .collect();
        assert_eq!(progress.len(), 3);
        assert_eq!(progress[2].data["current_step"], 3);
        assert_eq!(progress[2].data["total_steps"], 3);
        assert_eq!(documents.all(MATERIALS_COLLECTION).await.len(), total_items);
    }

    #[tokio::test]
    async fn content_without_structure_fails() {
        let planner = Arc::new(CoursePlanner::new(
            Arc::new(InMemoryObjectStore::new()),
            Arc::new(InMemoryDocumentStore::new()),
            StructureExtractor::new(vec![]),
        ));
        let result: Result<Vec<StageSignal>, StageError> =
            ContentStage::new(planner).run(&ctx(&[])).try_collect().await;
        assert_eq!(result.unwrap_err().stage, Stage::Content);
    }
}
