//! services/api/src/pipeline/slides.rs
//!
//! A four-phase slide pipeline run by simulated specialist agents:
//! strategy (outline), layout, writing (one call per slide) and review.
//!
//! Every LLM-backed phase has a deterministic fallback, so a run always ends
//! with one slide per outline entry. Only persistence failures end it early.

use crate::web::protocol::EventType;
use crate::web::session::GenerationSession;
use chrono::{DateTime, Utc};
use course_forge_core::extraction::json::{extract_json_span, strip_code_fences};
use course_forge_core::extraction::llm::truncate_chars;
use course_forge_core::ports::{DocumentStore, LanguageModel, PortError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

pub const SLIDES_COLLECTION: &str = "slides";

const TOTAL_STEPS: usize = 4;
const FALLBACK_TEMPLATE: &str = "content_slide";
const FALLBACK_LAYOUT: &str = "single_column";
const WRITER_SOURCE_LIMIT: usize = 4_000;

const STRATEGY_PROMPT: &str = r#"You are a presentation strategist. Plan a slide deck for the course material you are given. Respond with JSON only: {"slides": [{"slide_number": 1, "title": "", "type": "title|objectives|content|example|exercise|summary|qa", "objective": ""}]}. Use between 8 and 20 slides."#;

const LAYOUT_PROMPT: &str = r#"You are a slide layout designer. For every slide in the outline choose a template and a layout. Respond with JSON only: {"layouts": [{"slide_number": 1, "template": "title_slide|content_slide|section_header|comparison|code_example", "layout": "single_column|two_column|image_left|image_right|full_bleed"}]}."#;

const WRITER_PROMPT: &str = r#"You are a slide writer. Write one slide from its outline entry, its layout and the course material. Respond with JSON only: {"title": "", "body": "markdown bullet points", "speaker_notes": ""}."#;

//=========================================================================================
// Types
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentRole {
    Strategist,
    LayoutDesigner,
    Writer,
    Reviewer,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strategist => "strategist",
            Self::LayoutDesigner => "layout_designer",
            Self::Writer => "writer",
            Self::Reviewer => "reviewer",
        }
    }

    fn phase(&self) -> &'static str {
        match self {
            Self::Strategist => "strategy",
            Self::LayoutDesigner => "layout",
            Self::Writer => "writing",
            Self::Reviewer => "review",
        }
    }

    fn step(&self) -> usize {
        match self {
            Self::Strategist => 1,
            Self::LayoutDesigner => 2,
            Self::Writer => 3,
            Self::Reviewer => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlineEntry {
    #[serde(default)]
    pub slide_number: u32,
    pub title: String,
    #[serde(rename = "type", default = "default_slide_type")]
    pub slide_type: String,
    #[serde(default)]
    pub objective: String,
}

fn default_slide_type() -> String {
    "content".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlideLayout {
    pub slide_number: u32,
    pub template: String,
    pub layout: String,
}

impl SlideLayout {
    fn uniform(slide_number: u32) -> Self {
        Self {
            slide_number,
            template: FALLBACK_TEMPLATE.to_string(),
            layout: FALLBACK_LAYOUT.to_string(),
        }
    }
}

/// One slide record as persisted in the `slides` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slide {
    pub course_id: String,
    pub slide_number: u32,
    pub title: String,
    pub body: String,
    pub speaker_notes: String,
    pub template: String,
    pub layout: String,
    /// Set when the writer's output was unusable and stand-in content was used.
    pub placeholder: bool,
    pub reviewed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct WrittenSlide {
    #[serde(default)]
    title: Option<String>,
    body: String,
    #[serde(default)]
    speaker_notes: String,
}

/// What the pipeline generates slides from.
#[derive(Debug, Clone)]
pub struct SlideRequest {
    pub course_id: String,
    pub course_name: String,
    /// Design document and/or rendered structure.
    pub source: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SlideError {
    #[error("Failed to persist slide {slide_number}: {source}")]
    Persistence {
        slide_number: u32,
        #[source]
        source: PortError,
    },
    #[error("Failed to serialize slide {0}: {1}")]
    Serialization(u32, String),
}

//=========================================================================================
// Fallbacks and Parsing
//=========================================================================================

/// The generic ten-slide deck used when the strategist's outline is unusable.
pub fn fallback_outline(course_name: &str) -> Vec<OutlineEntry> {
    let mut entries = vec![
        (course_name.to_string(), "title", format!("Introduce {}", course_name)),
        ("Learning Objectives".to_string(), "objectives", "Set expectations for the course".to_string()),
    ];
    for module in 1..=6 {
        entries.push((
            format!("Module {}", module),
            "content",
            format!("Cover the key ideas of module {}", module),
        ));
    }
    entries.push(("Summary".to_string(), "summary", "Recap the main takeaways".to_string()));
    entries.push(("Questions & Answers".to_string(), "qa", "Address open questions".to_string()));

    entries
        .into_iter()
        .enumerate()
        .map(|(index, (title, slide_type, objective))| OutlineEntry {
            slide_number: index as u32 + 1,
            title,
            slide_type: slide_type.to_string(),
            objective,
        })
        .collect()
}

fn json_value(raw: &str) -> Option<Value> {
    let candidate = extract_json_span(raw).unwrap_or_else(|| strip_code_fences(raw));
    serde_json::from_str(candidate).ok()
}

/// Reads `{"<key>": [...]}` or a bare array out of model output.
fn json_list<T: for<'de> Deserialize<'de>>(raw: &str, key: &str) -> Option<Vec<T>> {
    let value = match json_value(raw) {
        Some(Value::Object(mut map)) => map.remove(key)?,
        Some(array @ Value::Array(_)) => array,
        _ => serde_json::from_str(strip_code_fences(raw)).ok()?,
    };
    serde_json::from_value(value).ok()
}

/// Parses the strategist's outline, renumbering entries 1..N in the order given.
pub fn parse_outline(raw: &str) -> Option<Vec<OutlineEntry>> {
    let mut outline: Vec<OutlineEntry> = json_list(raw, "slides")?;
    outline.retain(|entry| !entry.title.trim().is_empty());
    if outline.is_empty() {
        return None;
    }
    for (index, entry) in outline.iter_mut().enumerate() {
        entry.slide_number = index as u32 + 1;
    }
    Some(outline)
}

pub fn parse_layouts(raw: &str) -> Option<HashMap<u32, SlideLayout>> {
    let layouts: Vec<SlideLayout> = json_list(raw, "layouts")?;
    if layouts.is_empty() {
        return None;
    }
    Some(layouts.into_iter().map(|l| (l.slide_number, l)).collect())
}

fn parse_written(raw: &str) -> Option<WrittenSlide> {
    let written: WrittenSlide = serde_json::from_value(json_value(raw)?).ok()?;
    (!written.body.trim().is_empty()).then_some(written)
}

/// The reviewer: trims text fields and stamps the review time. No model call.
pub fn review(slides: Vec<Slide>, reviewed_at: DateTime<Utc>) -> Vec<Slide> {
    slides
        .into_iter()
        .map(|slide| Slide {
            title: slide.title.trim().to_string(),
            body: slide.body.trim().to_string(),
            speaker_notes: slide.speaker_notes.trim().to_string(),
            reviewed_at: Some(reviewed_at),
            ..slide
        })
        .collect()
}

//=========================================================================================
// The Pipeline
//=========================================================================================

pub struct MultiAgentSlidePipeline {
    llm: Arc<dyn LanguageModel>,
    documents: Arc<dyn DocumentStore>,
}

impl MultiAgentSlidePipeline {
    pub fn new(llm: Arc<dyn LanguageModel>, documents: Arc<dyn DocumentStore>) -> Self {
        Self { llm, documents }
    }

    /// Runs all four phases and persists the result.
    ///
    /// The session always ends with `complete` or, on persistence failure, `error`.
    pub async fn run(
        &self,
        session: &mut GenerationSession,
        request: &SlideRequest,
    ) -> Result<Vec<Slide>, SlideError> {
        match self.generate(session, request).await {
            Ok(slides) => {
                let placeholders = slides.iter().filter(|s| s.placeholder).count();
                session
                    .emit(
                        EventType::GenerationComplete,
                        json!({ "slide_count": slides.len(), "placeholders": placeholders }),
                    )
                    .await;
                session
                    .emit(
                        EventType::Complete,
                        json!({ "course_id": request.course_id, "slide_count": slides.len() }),
                    )
                    .await;
                info!(
                    "Generated {} slides for course {} ({} placeholders).",
                    slides.len(),
                    request.course_id,
                    placeholders
                );
                Ok(slides)
            }
            Err(e) => {
                error!("Slide generation for course {} failed: {}", request.course_id, e);
                session
                    .emit(EventType::Error, json!({ "message": e.to_string() }))
                    .await;
                Err(e)
            }
        }
    }

    async fn generate(
        &self,
        session: &mut GenerationSession,
        request: &SlideRequest,
    ) -> Result<Vec<Slide>, SlideError> {
        // --- 1. Strategy ---
        start_phase(session, AgentRole::Strategist, "Planning the slide outline.").await;
        let outline = match self.call(STRATEGY_PROMPT, &request.source, 2000).await {
            Some(raw) => parse_outline(&raw),
            None => None,
        };
        let outline = match outline {
            Some(outline) => outline,
            None => {
                warn!("Outline unusable for course {}; using the generic deck.", request.course_id);
                say(session, AgentRole::Strategist, "Falling back to the standard outline.").await;
                fallback_outline(&request.course_name)
            }
        };
        say(
            session,
            AgentRole::Strategist,
            &format!("Outline ready with {} slides.", outline.len()),
        )
        .await;
        finish_phase(session, AgentRole::Strategist).await;

        // --- 2. Layout ---
        start_phase(session, AgentRole::LayoutDesigner, "Choosing templates and layouts.").await;
        let outline_json = serde_json::to_string(&outline)
            .map_err(|e| SlideError::Serialization(0, e.to_string()))?;
        let mut layouts = match self.call(LAYOUT_PROMPT, &outline_json, 1500).await {
            Some(raw) => parse_layouts(&raw),
            None => None,
        }
        .unwrap_or_else(|| {
            warn!("Layouts unusable for course {}; using uniform layout.", request.course_id);
            HashMap::new()
        });
        let layouts: Vec<SlideLayout> = outline
            .iter()
            .map(|entry| {
                layouts
                    .remove(&entry.slide_number)
                    .unwrap_or_else(|| SlideLayout::uniform(entry.slide_number))
            })
            .collect();
        finish_phase(session, AgentRole::LayoutDesigner).await;

        // --- 3. Writing, one slide per call ---
        start_phase(session, AgentRole::Writer, "Writing slides.").await;
        let source = truncate_chars(&request.source, WRITER_SOURCE_LIMIT);
        let mut slides = Vec::with_capacity(outline.len());
        for (entry, layout) in outline.iter().zip(&layouts) {
            let prompt = format!(
                "Outline entry:\n{}\n\nLayout:\n{}\n\nCourse material:\n{}",
                json!(entry),
                json!(layout),
                source
            );
            let written = match self.call(WRITER_PROMPT, &prompt, 1200).await {
                Some(raw) => parse_written(&raw),
                None => None,
            };
            let slide = match written {
                Some(written) => Slide {
                    course_id: request.course_id.clone(),
                    slide_number: entry.slide_number,
                    title: written.title.unwrap_or_else(|| entry.title.clone()),
                    body: written.body,
                    speaker_notes: written.speaker_notes,
                    template: layout.template.clone(),
                    layout: layout.layout.clone(),
                    placeholder: false,
                    reviewed_at: None,
                },
                None => {
                    warn!(
                        "Slide {} for course {} unusable; inserting placeholder.",
                        entry.slide_number, request.course_id
                    );
                    placeholder_slide(&request.course_id, entry, layout)
                }
            };

            session
                .emit(
                    EventType::SlideGenerated,
                    json!({
                        "slide_number": slide.slide_number,
                        "title": slide.title,
                        "placeholder": slide.placeholder,
                        "total_slides": outline.len(),
                    }),
                )
                .await;
            slides.push(slide);
        }
        finish_phase(session, AgentRole::Writer).await;

        // --- 4. Review ---
        start_phase(session, AgentRole::Reviewer, "Reviewing the deck.").await;
        let slides = review(slides, Utc::now());
        for slide in &slides {
            let doc = serde_json::to_value(slide)
                .map_err(|e| SlideError::Serialization(slide.slide_number, e.to_string()))?;
            self.documents
                .insert(SLIDES_COLLECTION, doc)
                .await
                .map_err(|source| SlideError::Persistence {
                    slide_number: slide.slide_number,
                    source,
                })?;
        }
        say(
            session,
            AgentRole::Reviewer,
            &format!("Reviewed and saved {} slides.", slides.len()),
        )
        .await;
        finish_phase(session, AgentRole::Reviewer).await;

        Ok(slides)
    }

    /// One model call; failures are logged and reported as `None`.
    async fn call(&self, system: &str, user: &str, max_tokens: u32) -> Option<String> {
        match self.llm.complete(system, user, max_tokens).await {
            Ok(text) => Some(text),
            Err(e) => {
                warn!("Agent model call failed: {}", e);
                None
            }
        }
    }
}

fn placeholder_slide(course_id: &str, entry: &OutlineEntry, layout: &SlideLayout) -> Slide {
    Slide {
        course_id: course_id.to_string(),
        slide_number: entry.slide_number,
        title: entry.title.clone(),
        body: format!("Content for \"{}\" is being prepared.", entry.title),
        speaker_notes: entry.objective.clone(),
        template: layout.template.clone(),
        layout: layout.layout.clone(),
        placeholder: true,
        reviewed_at: None,
    }
}

async fn say(session: &mut GenerationSession, agent: AgentRole, message: &str) {
    session
        .emit(
            EventType::AgentMessage,
            json!({ "agent": agent.as_str(), "message": message }),
        )
        .await;
}

async fn start_phase(session: &mut GenerationSession, agent: AgentRole, message: &str) {
    session
        .emit(
            EventType::StatusUpdate,
            json!({ "phase": agent.phase(), "agent": agent.as_str(), "status": "started" }),
        )
        .await;
    say(session, agent, message).await;
}

async fn finish_phase(session: &mut GenerationSession, agent: AgentRole) {
    session
        .emit(
            EventType::ProgressUpdate,
            json!({
                "current_step": agent.step(),
                "total_steps": TOTAL_STEPS,
                "phase": agent.phase(),
            }),
        )
        .await;
}
