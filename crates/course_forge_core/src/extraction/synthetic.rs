//! The last-resort strategy: a minimal, always-valid plan built from the course name.

use super::{ExtractionError, ExtractionInput, ExtractionStrategy};
use crate::domain::{Chapter, MaterialKind, MaterialSpec, Module, StructureTree};
use async_trait::async_trait;

pub struct SyntheticStrategy;

#[async_trait]
impl ExtractionStrategy for SyntheticStrategy {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    async fn attempt(&self, input: &ExtractionInput<'_>) -> Result<StructureTree, ExtractionError> {
        Ok(minimal_structure(input.course_name))
    }
}

/// One module, one chapter, four materials.
pub fn minimal_structure(course_name: &str) -> StructureTree {
    let course = match course_name.trim() {
        "" => "Course",
        name => name,
    };

    StructureTree {
        course_title: course.to_string(),
        modules: vec![Module {
            module_number: 1,
            title: format!("{} Fundamentals", course),
            chapters: vec![Chapter {
                chapter_number: 1,
                title: format!("Getting Started with {}", course),
                details: format!("A first pass over the essentials of {}.", course),
                materials: vec![
                    MaterialSpec::new(MaterialKind::Slide, format!("Welcome to {}", course)),
                    MaterialSpec::new(MaterialKind::Slide, format!("{} Key Concepts", course)),
                    MaterialSpec::new(MaterialKind::Slide, format!("{} Summary", course)),
                    MaterialSpec::new(MaterialKind::Quiz, format!("{} Knowledge Check", course)),
                ],
            }],
        }],
        ..StructureTree::default()
    }
}
