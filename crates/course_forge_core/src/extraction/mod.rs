//! crates/course_forge_core/src/extraction/mod.rs
//!
//! Turns free-form course documents into a validated [`StructureTree`].
//!
//! Extraction is an ordered chain of interchangeable [`ExtractionStrategy`]
//! implementations. [`StructureExtractor`] tries them in priority order and
//! accepts the first tree that passes [`validate`]; parse and validation
//! failures simply move the chain on to the next strategy.

pub mod heuristic;
pub mod json;
pub mod llm;
pub mod render;
pub mod synthetic;

use crate::domain::StructureTree;
use crate::ports::{LanguageModel, PortError};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

pub use heuristic::HeuristicStrategy;
pub use llm::{RichLlmStrategy, SimplifiedLlmStrategy};
pub use synthetic::SyntheticStrategy;

//=========================================================================================
// Errors and Inputs
//=========================================================================================

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("LLM call failed: {0}")]
    Llm(#[from] PortError),
    #[error("Unparsable structure JSON: {0}")]
    Parse(String),
    #[error("Structure failed validation: {0}")]
    Validation(String),
    #[error("All extraction strategies failed; last error: {0}")]
    Exhausted(String),
}

/// The source documents handed to every strategy.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionInput<'a> {
    pub design_text: &'a str,
    pub research_text: &'a str,
    pub course_name: &'a str,
}

/// One way of producing a structure tree from source documents.
#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    /// Short identifier used in logs and extraction reports.
    fn name(&self) -> &'static str;

    async fn attempt(&self, input: &ExtractionInput<'_>) -> Result<StructureTree, ExtractionError>;
}

/// A successful extraction.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub tree: StructureTree,
    /// Name of the strategy whose output was accepted.
    pub strategy: &'static str,
    /// Indented, human-readable rendering of `tree`.
    pub rendered: String,
}

//=========================================================================================
// Validation
//=========================================================================================

/// Checks the structural invariants of a tree.
///
/// Violations are reported, never repaired.
pub fn validate(tree: &StructureTree) -> Result<(), ExtractionError> {
    if tree.modules.is_empty() {
        return Err(ExtractionError::Validation("structure has no modules".into()));
    }

    let mut previous_module = 0;
    for module in &tree.modules {
        if module.module_number <= previous_module {
            return Err(ExtractionError::Validation(format!(
                "module numbers must be unique, ascending and 1-based (found {} after {})",
                module.module_number, previous_module
            )));
        }
        previous_module = module.module_number;

        if module.chapters.is_empty() {
            return Err(ExtractionError::Validation(format!(
                "module {} has no chapters",
                module.module_number
            )));
        }

        for (index, chapter) in module.chapters.iter().enumerate() {
            let expected = index as u32 + 1;
            if chapter.chapter_number != expected {
                return Err(ExtractionError::Validation(format!(
                    "module {} chapter numbers must run 1..N (expected {}, found {})",
                    module.module_number, expected, chapter.chapter_number
                )));
            }
            if chapter.materials.is_empty() {
                return Err(ExtractionError::Validation(format!(
                    "chapter {}.{} has no materials",
                    module.module_number, chapter.chapter_number
                )));
            }
        }
    }

    Ok(())
}

//=========================================================================================
// The Strategy Runner
//=========================================================================================

/// Runs an ordered strategy chain and returns the first valid tree.
pub struct StructureExtractor {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
}

impl StructureExtractor {
    pub fn new(strategies: Vec<Box<dyn ExtractionStrategy>>) -> Self {
        Self { strategies }
    }

    /// The production chain: rich LLM, simplified LLM, markdown heuristics, synthetic.
    pub fn with_default_chain(llm: Arc<dyn LanguageModel>) -> Self {
        Self::with_models(llm.clone(), llm)
    }

    /// Same chain, with a separate (usually smaller) model for the simplified tier.
    pub fn with_models(rich: Arc<dyn LanguageModel>, simplified: Arc<dyn LanguageModel>) -> Self {
        Self::new(vec![
            Box::new(RichLlmStrategy::new(rich)),
            Box::new(SimplifiedLlmStrategy::new(simplified)),
            Box::new(HeuristicStrategy),
            Box::new(SyntheticStrategy),
        ])
    }

    pub async fn extract(
        &self,
        design_text: &str,
        research_text: &str,
        course_name: &str,
    ) -> Result<Extraction, ExtractionError> {
        let input = ExtractionInput {
            design_text,
            research_text,
            course_name,
        };

        let mut last_error = String::from("no strategies configured");
        for strategy in &self.strategies {
            let outcome = match strategy.attempt(&input).await {
                Ok(tree) => validate(&tree).map(|()| tree),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(tree) => {
                    info!(
                        "Structure extracted by '{}' strategy: {} modules, {} materials.",
                        strategy.name(),
                        tree.modules.len(),
                        tree.material_count()
                    );
                    let rendered = render::render_tree(&tree)
                        .unwrap_or_else(|e| format!("[Error rendering structure: {}]", e));
                    return Ok(Extraction {
                        tree,
                        strategy: strategy.name(),
                        rendered,
                    });
                }
                Err(e) => {
                    warn!("Extraction strategy '{}' failed: {}", strategy.name(), e);
                    last_error = e.to_string();
                }
            }
        }

        Err(ExtractionError::Exhausted(last_error))
    }
}
