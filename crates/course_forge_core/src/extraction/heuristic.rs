//! crates/course_forge_core/src/extraction/heuristic.rs
//!
//! Deterministic, LLM-free parsing of a design document written as
//! semi-structured markdown:
//!
//! ```text
//! # Course Title
//! **Level:** Beginner
//! **Duration:** 6 weeks
//! **Prerequisites:**
//! - Basic programming
//! **Tools:** Rust, Cargo
//!
//! ## **Module 1 — Foundations**
//! | **Chapter 1.1: Basics** |
//! | Variables, types and control flow |
//!
//! ## **Final Project**
//! ```
//!
//! Chapter materials are synthesized from keywords in the chapter title.

use super::{ExtractionError, ExtractionInput, ExtractionStrategy};
use crate::domain::{Chapter, MaterialKind, MaterialSpec, Module, StructureTree};
use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;

fn module_heading() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^##\s*\*\*Module\s+(\d+)\s*[—–:-]\s*(.+?)\s*\*\*\s*$")
            .expect("module heading pattern is valid")
    })
}

fn chapter_row() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\|\s*\*\*Chapter\s+(\d+)\.(\d+):\s*(.+?)\s*\*\*\s*\|")
            .expect("chapter row pattern is valid")
    })
}

fn final_project_heading() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^##\s*\*\*Final Project\*\*").expect("final project pattern is valid")
    })
}

/// The markdown parser exposed as the third link of the extraction chain.
pub struct HeuristicStrategy;

#[async_trait]
impl ExtractionStrategy for HeuristicStrategy {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    async fn attempt(&self, input: &ExtractionInput<'_>) -> Result<StructureTree, ExtractionError> {
        if input.design_text.trim().is_empty() {
            return Err(ExtractionError::Parse("design document is empty".into()));
        }
        Ok(parse_design_markdown(input.design_text, input.course_name))
    }
}

//=========================================================================================
// Markdown Parsing
//=========================================================================================

/// Parses a design document into a (not yet validated) structure tree.
pub fn parse_design_markdown(design_text: &str, course_name: &str) -> StructureTree {
    let lines: Vec<&str> = design_text.lines().map(str::trim).collect();

    let mut tree = StructureTree::default();
    let mut collecting_prerequisites = false;
    let mut current: Option<Module> = None;
    let mut has_final_project = false;

    let mut index = 0;
    while index < lines.len() {
        let line = lines[index];
        index += 1;

        if line.is_empty() {
            continue;
        }

        if line.starts_with('#') && !line.starts_with("##") {
            if tree.course_title.is_empty() {
                tree.course_title = clean(line.trim_start_matches('#'));
            }
            continue;
        }

        if collecting_prerequisites {
            if let Some(item) = bullet_text(line) {
                tree.prerequisites.push(clean(item));
                continue;
            }
            if line.starts_with("**Tools") {
                collecting_prerequisites = false;
            }
        }

        if let Some(value) = field_value(line, "**Level:**") {
            tree.level = value;
            continue;
        }
        if let Some(value) = field_value(line, "**Duration:**") {
            tree.duration = value;
            continue;
        }
        if let Some(value) = field_value(line, "**Prerequisites:**") {
            collecting_prerequisites = true;
            if !value.is_empty() {
                tree.prerequisites.push(value);
            }
            continue;
        }
        if line.starts_with("**Tools") {
            tree.tools = tools_value(line);
            continue;
        }

        if let Some(caps) = module_heading().captures(line) {
            collecting_prerequisites = false;
            let Ok(module_number) = caps[1].parse::<u32>() else {
                continue;
            };
            if let Some(done) = current.take() {
                tree.modules.push(done);
            }
            current = Some(Module {
                module_number,
                title: clean(&caps[2]),
                chapters: Vec::new(),
            });
            continue;
        }

        if final_project_heading().is_match(line) {
            collecting_prerequisites = false;
            if let Some(done) = current.take() {
                tree.modules.push(done);
            }
            has_final_project = true;
            continue;
        }

        if let (Some(module), Some(caps)) = (current.as_mut(), chapter_row().captures(line)) {
            let Ok(chapter_number) = caps[2].parse::<u32>() else {
                continue;
            };
            let title = clean(&caps[3]);

            let (details, consumed) = details_after(&lines[index..]);
            index += consumed;

            module.chapters.push(Chapter {
                chapter_number,
                materials: materials_for_chapter(&title),
                title,
                details,
            });
        }
    }

    if let Some(done) = current.take() {
        tree.modules.push(done);
    }

    if has_final_project {
        let next_number = tree
            .modules
            .iter()
            .map(|m| m.module_number)
            .max()
            .unwrap_or(0)
            .saturating_add(1);
        tree.modules.push(final_project_module(next_number));
    }

    if tree.course_title.is_empty() {
        tree.course_title = course_name.trim().to_string();
    }

    tree
}

/// Looks for a free-text details row right after a chapter row.
///
/// Returns the details and how many lines were consumed.
fn details_after(rest: &[&str]) -> (String, usize) {
    let mut offset = 0;
    while offset < rest.len() && is_separator_row(rest[offset]) {
        offset += 1;
    }

    match rest.get(offset) {
        Some(row) if row.starts_with('|') && !chapter_row().is_match(row) => {
            let text = row
                .trim_matches('|')
                .split('|')
                .map(clean)
                .filter(|cell| !cell.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            (text, offset + 1)
        }
        _ => (String::new(), offset),
    }
}

fn is_separator_row(line: &str) -> bool {
    line.starts_with('|') && line.chars().all(|c| matches!(c, '|' | '-' | ':' | ' '))
}

fn bullet_text(line: &str) -> Option<&str> {
    line.strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))
        .or_else(|| line.strip_prefix("• "))
}

fn field_value(line: &str, marker: &str) -> Option<String> {
    line.find(marker)
        .map(|start| clean(&line[start + marker.len()..]))
}

fn tools_value(line: &str) -> String {
    let value = match line.find(":**") {
        Some(at) => &line[at + 3..],
        None => line.split_once(':').map(|(_, rest)| rest).unwrap_or(""),
    };
    clean(value)
}

fn clean(text: &str) -> String {
    text.replace("**", "").trim().trim_matches('|').trim().to_string()
}

fn final_project_module(module_number: u32) -> Module {
    Module {
        module_number,
        title: "Final Project".to_string(),
        chapters: vec![Chapter {
            chapter_number: 1,
            title: "Final Project".to_string(),
            details: "Capstone project applying the skills from every module.".to_string(),
            materials: vec![
                MaterialSpec::new(MaterialKind::Slide, "Final Project Overview"),
                MaterialSpec::new(MaterialKind::Slide, "Project Requirements"),
                MaterialSpec::new(MaterialKind::Slide, "Grading Rubric"),
                MaterialSpec::new(MaterialKind::Assessment, "Final Project Submission"),
            ],
        }],
    }
}

//=========================================================================================
// Keyword Buckets
//=========================================================================================

/// Chapter title categories, checked in declaration order; the first match wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeywordBucket {
    Introduction,
    Setup,
    Advanced,
    Testing,
    Implementation,
    General,
}

impl KeywordBucket {
    const ORDERED: [(KeywordBucket, &'static [&'static str]); 5] = [
        (KeywordBucket::Introduction, &["introduction", "overview"]),
        (KeywordBucket::Setup, &["setup", "set up", "installation", "install"]),
        (KeywordBucket::Advanced, &["advanced", "mastery", "mastering"]),
        (KeywordBucket::Testing, &["testing", "test", "debugging", "debug"]),
        (KeywordBucket::Implementation, &["implementation", "implement", "building", "build"]),
    ];

    pub fn classify(chapter_title: &str) -> Self {
        let lower = chapter_title.to_lowercase();
        Self::ORDERED
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
            .map(|(bucket, _)| *bucket)
            .unwrap_or(KeywordBucket::General)
    }

    pub fn materials(self, t: &str) -> Vec<MaterialSpec> {
        use MaterialKind::*;
        let specs: Vec<(MaterialKind, String)> = match self {
            Self::Introduction => vec![
                (Slide, format!("{}: What and Why", t)),
                (Slide, format!("{}: Key Concepts", t)),
                (Slide, format!("{}: Roadmap", t)),
                (Quiz, format!("{} Knowledge Check", t)),
            ],
            Self::Setup => vec![
                (Slide, format!("{}: Requirements", t)),
                (Slide, format!("{}: Step-by-Step Guide", t)),
                (Interactive, format!("{} Hands-On Lab", t)),
                (Resource, format!("{} Troubleshooting Guide", t)),
            ],
            Self::Advanced => vec![
                (Slide, format!("{}: Deep Dive", t)),
                (Slide, format!("{}: Expert Techniques", t)),
                (Slide, format!("{}: Real-World Patterns", t)),
                (Assessment, format!("{} Challenge", t)),
                (Discussion, format!("{} Expert Discussion", t)),
            ],
            Self::Testing => vec![
                (Slide, format!("{}: Strategies", t)),
                (Slide, format!("{}: Common Pitfalls", t)),
                (Interactive, format!("{} Debugging Exercise", t)),
                (Quiz, format!("{} Quiz", t)),
            ],
            Self::Implementation => vec![
                (Slide, format!("{}: Architecture", t)),
                (Slide, format!("{}: Walkthrough", t)),
                (Slide, format!("{}: Best Practices", t)),
                (Interactive, format!("{} Coding Exercise", t)),
                (Assessment, format!("{} Project Check", t)),
            ],
            Self::General => vec![
                (Slide, format!("{}: Core Concepts", t)),
                (Slide, format!("{}: Worked Examples", t)),
                (Slide, format!("{}: Summary", t)),
                (Quiz, format!("{} Quiz", t)),
            ],
        };
        specs
            .into_iter()
            .map(|(kind, title)| MaterialSpec::new(kind, title))
            .collect()
    }
}

/// Deterministic material list for a chapter, chosen by title keywords.
pub fn materials_for_chapter(chapter_title: &str) -> Vec<MaterialSpec> {
    KeywordBucket::classify(chapter_title).materials(chapter_title)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::validate;

    const SCENARIO: &str = "\
## **Module 1 — Foundations**

| **Chapter 1.1: Basics** |
| Core vocabulary and first programs |

## **Final Project**

| **Chapter 9.9: Ignored** |
";

    const FULL_DOC: &str = "\
# Practical Rust

**Level:** Intermediate
**Duration:** 8 weeks
**Prerequisites:**
- Basic programming
- Command line familiarity
**Tools & Environment:** rustup, VS Code

## **Module 1 — Getting Started**

| **Chapter 1.1: Introduction to Rust** |
|---|
| Why Rust exists |
| **Chapter 1.2: Toolchain Setup** |
| Installing rustup |

## **Module 2 — Going Further**

| **Chapter 2.1: Advanced Testing Techniques** |
| **Chapter 2.2: Building a CLI** |
";

    #[test]
    fn scenario_parses_module_and_final_project() {
        let tree = parse_design_markdown(SCENARIO, "Fallback Name");
        validate(&tree).unwrap();

        assert_eq!(tree.modules.len(), 2);
        let foundations = &tree.modules[0];
        assert_eq!(foundations.module_number, 1);
        assert_eq!(foundations.title, "Foundations");
        assert_eq!(foundations.chapters.len(), 1);
        assert_eq!(foundations.chapters[0].title, "Basics");
        assert_eq!(foundations.chapters[0].details, "Core vocabulary and first programs");
        assert_eq!(foundations.chapters[0].materials, materials_for_chapter("Basics"));

        let final_project = &tree.modules[1];
        assert_eq!(final_project.title, "Final Project");
        assert_eq!(final_project.module_number, 2);
        assert_eq!(final_project.chapters.len(), 1);
        let materials = &final_project.chapters[0].materials;
        assert_eq!(materials.len(), 4);
        assert_eq!(materials.iter().filter(|m| m.kind == MaterialKind::Slide).count(), 3);
        assert_eq!(
            materials.iter().filter(|m| m.kind == MaterialKind::Assessment).count(),
            1
        );

        assert_eq!(tree.course_title, "Fallback Name");
    }

    #[test]
    fn parsing_is_deterministic() {
        assert_eq!(
            parse_design_markdown(FULL_DOC, "x"),
            parse_design_markdown(FULL_DOC, "x")
        );
    }

    #[test]
    fn header_fields_and_prerequisites() {
        let tree = parse_design_markdown(FULL_DOC, "ignored");
        assert_eq!(tree.course_title, "Practical Rust");
        assert_eq!(tree.level, "Intermediate");
        assert_eq!(tree.duration, "8 weeks");
        assert_eq!(
            tree.prerequisites,
            vec!["Basic programming".to_string(), "Command line familiarity".to_string()]
        );
        assert_eq!(tree.tools, "rustup, VS Code");
    }

    #[test]
    fn chapters_pick_details_and_skip_separators() {
        let tree = parse_design_markdown(FULL_DOC, "x");
        validate(&tree).unwrap();

        let first = &tree.modules[0].chapters;
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].details, "Why Rust exists");
        assert_eq!(first[1].title, "Toolchain Setup");
        assert_eq!(first[1].details, "Installing rustup");

        // A chapter row directly followed by another chapter row has no details.
        let second = &tree.modules[1].chapters;
        assert_eq!(second[0].details, "");
        assert_eq!(second[1].title, "Building a CLI");
    }

    #[test]
    fn first_matching_bucket_wins() {
        assert_eq!(
            KeywordBucket::classify("Advanced Testing Techniques"),
            KeywordBucket::Advanced
        );
        assert_eq!(KeywordBucket::classify("Course Overview"), KeywordBucket::Introduction);
        assert_eq!(KeywordBucket::classify("Installing Tools"), KeywordBucket::Setup);
        assert_eq!(KeywordBucket::classify("Debugging Lifetimes"), KeywordBucket::Testing);
        assert_eq!(KeywordBucket::classify("Building a CLI"), KeywordBucket::Implementation);
        assert_eq!(KeywordBucket::classify("Basics"), KeywordBucket::General);
    }

    #[test]
    fn bucket_materials_embed_chapter_title() {
        let materials = materials_for_chapter("Toolchain Setup");
        assert_eq!(materials[0].title, "Toolchain Setup: Requirements");
        assert_eq!(materials[2].kind, MaterialKind::Interactive);
    }

    #[test]
    fn chapters_outside_a_module_are_ignored() {
        let tree = parse_design_markdown("| **Chapter 1.1: Orphan** |\n", "x");
        assert!(tree.modules.is_empty());
        assert!(validate(&tree).is_err());
    }

    #[test]
    fn static_patterns_compile_and_match() {
        assert!(module_heading().is_match("## **Module 3 – Traits**"));
        assert!(module_heading().is_match("## **Module 4: Async**"));
        assert!(chapter_row().is_match("| **Chapter 3.2: Generics** |"));
        assert!(final_project_heading().is_match("## **final project**"));
        assert!(!chapter_row().is_match("| Chapter 3.2: Generics |"));
    }

    #[test]
    fn final_project_number_saturates_at_the_top_module() {
        let doc = "\
## **Module 4294967295 — Last**

| **Chapter 1.1: Basics** |

## **Final Project**
";
        let tree = parse_design_markdown(doc, "x");
        assert_eq!(tree.modules.len(), 2);
        assert_eq!(tree.modules[0].module_number, u32::MAX);
        assert_eq!(tree.modules[1].title, "Final Project");
        assert_eq!(tree.modules[1].module_number, u32::MAX);
    }

    #[tokio::test]
    async fn empty_design_fails_the_strategy() {
        let input = ExtractionInput {
            design_text: "   ",
            research_text: "",
            course_name: "x",
        };
        assert!(HeuristicStrategy.attempt(&input).await.is_err());
    }
}
