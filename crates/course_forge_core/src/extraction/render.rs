//! Plain-text rendering of a structure tree for human review.

use crate::domain::{MaterialKind, StructureTree};
use std::fmt::{self, Write};

/// Renders the tree as an indented outline.
///
/// Slide and assessment counters restart in every chapter.
pub fn render_tree(tree: &StructureTree) -> Result<String, fmt::Error> {
    let mut out = String::new();

    if !tree.course_title.is_empty() {
        writeln!(out, "{}", tree.course_title)?;
    }

    for module in &tree.modules {
        writeln!(out, "Module {}: {}", module.module_number, module.title)?;
        for chapter in &module.chapters {
            writeln!(
                out,
                "  Chapter {}.{}: {}",
                module.module_number, chapter.chapter_number, chapter.title
            )?;

            let mut slides = 0;
            let mut assessments = 0;
            for material in &chapter.materials {
                let prefix = match material.kind {
                    MaterialKind::Slide => {
                        slides += 1;
                        format!("Slide {}:", slides)
                    }
                    MaterialKind::Assessment => {
                        assessments += 1;
                        format!("Assessment {}:", assessments)
                    }
                    MaterialKind::Quiz => "Quiz:".to_string(),
                    MaterialKind::Interactive => "Interactive:".to_string(),
                    MaterialKind::Resource => "Resource:".to_string(),
                    MaterialKind::Discussion => "Discussion:".to_string(),
                };
                writeln!(out, "    {} {}", prefix, material.title)?;
            }
        }
    }

    Ok(out)
}
