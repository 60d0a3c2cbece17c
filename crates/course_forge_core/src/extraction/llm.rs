//! crates/course_forge_core/src/extraction/llm.rs
//!
//! The two LLM-backed extraction strategies. Both ask the model for a JSON
//! object matching the structure schema and differ in prompt size, output
//! budget and how forgiving they are when locating the JSON in the reply.

use super::json::{extract_json_span, parse_tree, strip_code_fences};
use super::{ExtractionError, ExtractionInput, ExtractionStrategy};
use crate::domain::StructureTree;
use crate::ports::LanguageModel;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

const RICH_SYSTEM_PROMPT: &str = r#"You are an expert instructional designer. You convert course design documents into a precise, hierarchical course structure.

Rules:
- Organize the course into modules; each module contains chapters; each chapter contains materials.
- Number modules from 1 upward. Number chapters from 1 upward within each module, with no gaps.
- Every module has at least one chapter. Every chapter has at least one material.
- Plan 3 to 6 slides per chapter, plus quizzes, assessments, interactive exercises, resources or discussions where they fit.
- Material titles must be specific to the domain and the chapter. NEVER use generic titles such as "Introduction", "Slide 1", "Overview" or "Quiz" on their own.
- Allowed material types: slide, quiz, assessment, interactive, resource, discussion.

Respond with ONLY a JSON object of this shape:
{
  "course_title": "string",
  "level": "string",
  "duration": "string",
  "prerequisites": ["string"],
  "tools": "string",
  "modules": [
    {
      "module_number": 1,
      "title": "string",
      "chapters": [
        {
          "chapter_number": 1,
          "title": "string",
          "details": "string",
          "materials": [ { "type": "slide", "title": "string" } ]
        }
      ]
    }
  ]
}"#;

const RICH_USER_TEMPLATE: &str = r#"COURSE NAME: {course}

DESIGN DOCUMENT:
---
{design}
---

RESEARCH NOTES:
---
{research}
---

Produce the complete course structure as JSON."#;

const SIMPLE_SYSTEM_PROMPT: &str = r#"Convert the course design into JSON. Shape: {"course_title": "", "modules": [{"module_number": 1, "title": "", "chapters": [{"chapter_number": 1, "title": "", "materials": [{"type": "slide|quiz|assessment|interactive|resource|discussion", "title": ""}]}]}]}. Every module needs chapters, every chapter needs materials. Output JSON only."#;

/// Source text beyond this many characters is dropped from the simplified prompt.
const SIMPLE_SOURCE_LIMIT: usize = 12_000;

pub fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

//=========================================================================================
// Rich Strategy
//=========================================================================================

/// Detailed instructions, full documents, large output budget.
pub struct RichLlmStrategy {
    llm: Arc<dyn LanguageModel>,
    max_tokens: u32,
}

impl RichLlmStrategy {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self {
            llm,
            max_tokens: 8_000,
        }
    }
}

#[async_trait]
impl ExtractionStrategy for RichLlmStrategy {
    fn name(&self) -> &'static str {
        "rich_llm"
    }

    async fn attempt(&self, input: &ExtractionInput<'_>) -> Result<StructureTree, ExtractionError> {
        let user_prompt = RICH_USER_TEMPLATE
            .replace("{course}", input.course_name)
            .replace("{design}", input.design_text)
            .replace("{research}", input.research_text);

        let raw = self
            .llm
            .complete(RICH_SYSTEM_PROMPT, &user_prompt, self.max_tokens)
            .await?;
        debug!("Rich extraction response: {} chars", raw.len());

        parse_tree(strip_code_fences(&raw))
    }
}

//=========================================================================================
// Simplified Strategy
//=========================================================================================

/// Short instructions, truncated documents, small output budget and a
/// permissive search for the JSON object inside the reply.
pub struct SimplifiedLlmStrategy {
    llm: Arc<dyn LanguageModel>,
    max_tokens: u32,
}

impl SimplifiedLlmStrategy {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self {
            llm,
            max_tokens: 3_000,
        }
    }
}

#[async_trait]
impl ExtractionStrategy for SimplifiedLlmStrategy {
    fn name(&self) -> &'static str {
        "simplified_llm"
    }

    async fn attempt(&self, input: &ExtractionInput<'_>) -> Result<StructureTree, ExtractionError> {
        let user_prompt = format!(
            "Course: {}\n\nDesign:\n{}\n\nResearch:\n{}",
            input.course_name,
            truncate_chars(input.design_text, SIMPLE_SOURCE_LIMIT),
            truncate_chars(input.research_text, SIMPLE_SOURCE_LIMIT / 2),
        );

        let raw = self
            .llm
            .complete(SIMPLE_SYSTEM_PROMPT, &user_prompt, self.max_tokens)
            .await?;

        let span = extract_json_span(&raw)
            .ok_or_else(|| ExtractionError::Parse("no JSON object in response".into()))?;
        parse_tree(span)
    }
}
