//! crates/course_forge_core/src/domain.rs
//!
//! Defines the pure, core data structures for the course pipeline.
//! These types are shared by the extractor, the checklist projection and the
//! persisted material records. They carry serde derives because the structure
//! tree travels as JSON between the LLM, the document store and the web layer.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

//=========================================================================================
// Materials
//=========================================================================================

/// The closed set of content units a chapter can contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterialKind {
    Slide,
    Quiz,
    Assessment,
    Interactive,
    Resource,
    Discussion,
}

impl MaterialKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Slide => "slide",
            Self::Quiz => "quiz",
            Self::Assessment => "assessment",
            Self::Interactive => "interactive",
            Self::Resource => "resource",
            Self::Discussion => "discussion",
        }
    }
}

impl fmt::Display for MaterialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One planned content unit inside a chapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialSpec {
    #[serde(rename = "type")]
    pub kind: MaterialKind,
    pub title: String,
}

impl MaterialSpec {
    pub fn new(kind: MaterialKind, title: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
        }
    }
}

//=========================================================================================
// Structure Tree
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub chapter_number: u32,
    pub title: String,
    #[serde(default)]
    pub details: String,
    pub materials: Vec<MaterialSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub module_number: u32,
    pub title: String,
    pub chapters: Vec<Chapter>,
}

/// The validated hierarchy of modules, chapters and materials for one course.
///
/// The scalar course fields are optional on input; `modules` and everything
/// beneath it are required, so a response missing them fails to parse.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureTree {
    #[serde(default)]
    pub course_title: String,
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub prerequisites: Vec<String>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub tools: String,
    pub modules: Vec<Module>,
}

impl StructureTree {
    /// Total number of materials across every chapter of every module.
    pub fn material_count(&self) -> usize {
        self.modules
            .iter()
            .flat_map(|m| m.chapters.iter())
            .map(|c| c.materials.len())
            .sum()
    }
}

/// Models frequently answer `"tools": ["git", "cargo"]` instead of a string.
fn string_or_list<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Tools {
        One(String),
        Many(Vec<String>),
        Nothing,
    }

    Ok(match Tools::deserialize(deserializer)? {
        Tools::One(s) => s,
        Tools::Many(list) => list.join(", "),
        Tools::Nothing => String::new(),
    })
}

//=========================================================================================
// Checklist (read-only projection of a tree)
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    #[serde(rename = "type")]
    pub kind: MaterialKind,
    pub title: String,
    pub status: MaterialStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistChapter {
    pub chapter_number: u32,
    pub title: String,
    pub items: Vec<ChecklistItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistModule {
    pub module_number: u32,
    pub title: String,
    pub chapters: Vec<ChecklistChapter>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checklist {
    pub course_title: String,
    pub modules: Vec<ChecklistModule>,
    pub total_items: usize,
    pub total_slides: usize,
    pub total_quizzes: usize,
    pub total_assessments: usize,
}

//=========================================================================================
// Persisted Content Materials
//=========================================================================================

/// Lifecycle of a persisted material:
/// `pending -> generating -> completed -> approved | needs_revision`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterialStatus {
    Pending,
    Generating,
    Completed,
    Approved,
    NeedsRevision,
}

impl MaterialStatus {
    /// Whether a material in `self` may move to `next`.
    ///
    /// A material flagged for revision goes back through generation.
    pub fn can_transition_to(self, next: MaterialStatus) -> bool {
        use MaterialStatus::*;
        matches!(
            (self, next),
            (Pending, Generating)
                | (Generating, Completed)
                | (Completed, Approved)
                | (Completed, NeedsRevision)
                | (NeedsRevision, Generating)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Generating => "generating",
            Self::Completed => "completed",
            Self::Approved => "approved",
            Self::NeedsRevision => "needs_revision",
        }
    }
}

impl fmt::Display for MaterialStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One persisted row per checklist item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentMaterial {
    pub course_id: String,
    pub module_number: u32,
    pub chapter_number: u32,
    pub material_type: MaterialKind,
    pub title: String,
    pub status: MaterialStatus,
    /// Only set for slides: 1-based, reset for every chapter.
    pub slide_number: Option<u32>,
}

/// The outcome of persisting a checklist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterializationReport {
    pub created_count: usize,
    pub material_ids: Vec<String>,
}

//=========================================================================================
// Pipeline Stages
//=========================================================================================

/// One phase of the whole-document generation workflow, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Research,
    Design,
    Structure,
    Content,
}

impl Stage {
    /// The stage immediately following this one, if any.
    pub fn next(self) -> Option<Stage> {
        match self {
            Self::Research => Some(Self::Design),
            Self::Design => Some(Self::Structure),
            Self::Structure => Some(Self::Content),
            Self::Content => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Research => "research",
            Self::Design => "design",
            Self::Structure => "structure",
            Self::Content => "content",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "research" => Ok(Self::Research),
            "design" => Ok(Self::Design),
            "structure" => Ok(Self::Structure),
            "content" => Ok(Self::Content),
            other => Err(format!("unknown stage '{}'", other)),
        }
    }
}
