//! crates/course_forge_core/src/checklist.rs
//!
//! Flattens a structure tree into the ordered, counted checklist that drives
//! persistence. The projection is pure: the same tree always yields the same
//! checklist, and no synthetic module-level items are added.

use crate::domain::{
    Checklist, ChecklistChapter, ChecklistItem, ChecklistModule, MaterialKind, MaterialStatus,
    StructureTree,
};

pub struct ChecklistBuilder;

impl ChecklistBuilder {
    /// Builds a fresh checklist in document order (modules and chapters ascending).
    pub fn build(tree: &StructureTree) -> Checklist {
        let mut checklist = Checklist {
            course_title: tree.course_title.clone(),
            ..Checklist::default()
        };

        let mut modules: Vec<_> = tree.modules.iter().collect();
        modules.sort_by_key(|m| m.module_number);

        for module in modules {
            let mut chapters: Vec<_> = module.chapters.iter().collect();
            chapters.sort_by_key(|c| c.chapter_number);

            let mut checklist_chapters = Vec::with_capacity(chapters.len());
            for chapter in chapters {
                let items: Vec<ChecklistItem> = chapter
                    .materials
                    .iter()
                    .map(|material| ChecklistItem {
                        kind: material.kind,
                        title: material.title.clone(),
                        status: MaterialStatus::Pending,
                    })
                    .collect();

                for item in &items {
                    checklist.total_items += 1;
                    match item.kind {
                        MaterialKind::Slide => checklist.total_slides += 1,
                        MaterialKind::Quiz => checklist.total_quizzes += 1,
                        MaterialKind::Assessment => checklist.total_assessments += 1,
                        MaterialKind::Interactive
                        | MaterialKind::Resource
                        | MaterialKind::Discussion => {}
                    }
                }

                checklist_chapters.push(ChecklistChapter {
                    chapter_number: chapter.chapter_number,
                    title: chapter.title.clone(),
                    items,
                });
            }

            checklist.modules.push(ChecklistModule {
                module_number: module.module_number,
                title: module.title.clone(),
                chapters: checklist_chapters,
            });
        }

        checklist
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::heuristic::parse_design_markdown;

    const DOC: &str = "\
# Web Services
## **Module 1 — Foundations**
| **Chapter 1.1: Introduction to HTTP** |
| **Chapter 1.2: Server Setup** |
## **Module 2 — Depth**
| **Chapter 2.1: Advanced Routing** |
| **Chapter 2.2: Testing Handlers** |
## **Final Project**
";

    #[test]
    fn totals_match_tree() {
        let tree = parse_design_markdown(DOC, "x");
        let checklist = ChecklistBuilder::build(&tree);

        assert_eq!(checklist.total_items, tree.material_count());

        let all_items: Vec<_> = checklist
            .modules
            .iter()
            .flat_map(|m| m.chapters.iter())
            .flat_map(|c| c.items.iter())
            .collect();
        assert_eq!(all_items.len(), checklist.total_items);
        assert_eq!(
            all_items.iter().filter(|i| i.kind == MaterialKind::Slide).count(),
            checklist.total_slides
        );
        assert_eq!(
            all_items.iter().filter(|i| i.kind == MaterialKind::Quiz).count(),
            checklist.total_quizzes
        );
        assert_eq!(
            all_items.iter().filter(|i| i.kind == MaterialKind::Assessment).count(),
            checklist.total_assessments
        );
        assert!(all_items.iter().all(|i| i.status == MaterialStatus::Pending));
    }

    #[test]
    fn no_module_level_items_are_added() {
        let tree = parse_design_markdown(DOC, "x");
        let checklist = ChecklistBuilder::build(&tree);
        for (module, source) in checklist.modules.iter().zip(&tree.modules) {
            assert_eq!(module.chapters.len(), source.chapters.len());
        }
    }

    #[test]
    fn build_is_idempotent() {
        let tree = parse_design_markdown(DOC, "x");
        let first = serde_json::to_string(&ChecklistBuilder::build(&tree)).unwrap();
        let second = serde_json::to_string(&ChecklistBuilder::build(&tree)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn preserves_material_order() {
        let tree = parse_design_markdown(DOC, "x");
        let checklist = ChecklistBuilder::build(&tree);
        let titles: Vec<_> = checklist.modules[0].chapters[0]
            .items
            .iter()
            .map(|i| i.title.as_str())
            .collect();
        let expected: Vec<_> = tree.modules[0].chapters[0]
            .materials
            .iter()
            .map(|m| m.title.as_str())
            .collect();
        assert_eq!(titles, expected);
    }
}
