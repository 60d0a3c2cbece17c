//! crates/course_forge_core/src/planning.rs
//!
//! Ties the extractor, the checklist projection and materialization to the
//! storage ports: source documents come from the object store, extracted
//! structures and materials go to the document store.

use crate::checklist::ChecklistBuilder;
use crate::domain::{Checklist, MaterializationReport, StructureTree};
use crate::extraction::{ExtractionError, StructureExtractor};
use crate::materialize::{MaterializationError, MaterializationService};
use crate::ports::{DocumentStore, ObjectStore, PortError, ID_FIELD};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

/// Collection holding the latest extracted structure of every course.
pub const STRUCTURES_COLLECTION: &str = "course_structures";

pub fn design_key(course_id: &str) -> String {
    format!("courses/{}/design.md", course_id)
}

pub fn research_key(course_id: &str) -> String {
    format!("courses/{}/research.md", course_id)
}

#[derive(Debug, thiserror::Error)]
pub enum PlanningError {
    #[error("No design document stored for course {0}")]
    MissingDesign(String),
    #[error("No structure extracted yet for course {0}")]
    MissingStructure(String),
    #[error("Stored structure is malformed: {0}")]
    Malformed(String),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error(transparent)]
    Materialization(#[from] MaterializationError),
    #[error(transparent)]
    Port(#[from] PortError),
}

/// The persisted result of one structure extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseStructure {
    pub course_id: String,
    pub course_name: String,
    pub strategy: String,
    pub tree: StructureTree,
    pub checklist: Checklist,
    pub rendered: String,
    pub extracted_at: DateTime<Utc>,
}

pub struct CoursePlanner {
    objects: Arc<dyn ObjectStore>,
    documents: Arc<dyn DocumentStore>,
    extractor: StructureExtractor,
    materializer: MaterializationService,
}

impl CoursePlanner {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        documents: Arc<dyn DocumentStore>,
        extractor: StructureExtractor,
    ) -> Self {
        Self {
            materializer: MaterializationService::new(documents.clone()),
            objects,
            documents,
            extractor,
        }
    }

    pub fn materializer(&self) -> &MaterializationService {
        &self.materializer
    }

    /// Extracts the course structure from the stored documents and persists it.
    ///
    /// The design document is required; research notes are optional.
    pub async fn extract_course_structure(
        &self,
        course_id: &str,
        course_name: &str,
    ) -> Result<CourseStructure, PlanningError> {
        let design = self
            .objects
            .get(&design_key(course_id))
            .await?
            .ok_or_else(|| PlanningError::MissingDesign(course_id.to_string()))?;
        let research = self
            .objects
            .get(&research_key(course_id))
            .await?
            .unwrap_or_else(|| {
                warn!("No research notes for course {}; extracting from design only.", course_id);
                String::new()
            });

        let extraction = self.extractor.extract(&design, &research, course_name).await?;
        let structure = CourseStructure {
            course_id: course_id.to_string(),
            course_name: course_name.to_string(),
            strategy: extraction.strategy.to_string(),
            checklist: ChecklistBuilder::build(&extraction.tree),
            tree: extraction.tree,
            rendered: extraction.rendered,
            extracted_at: Utc::now(),
        };

        self.save_structure(&structure).await?;
        info!(
            "Stored structure for course {} ({} items, strategy '{}').",
            course_id, structure.checklist.total_items, structure.strategy
        );
        Ok(structure)
    }

    /// Loads the latest persisted structure for a course.
    pub async fn load_structure(&self, course_id: &str) -> Result<CourseStructure, PlanningError> {
        let mut doc = self
            .documents
            .find_one(STRUCTURES_COLLECTION, json!({ "course_id": course_id }))
            .await?
            .ok_or_else(|| PlanningError::MissingStructure(course_id.to_string()))?;

        if let Value::Object(map) = &mut doc {
            map.remove(ID_FIELD);
        }
        serde_json::from_value(doc).map_err(|e| PlanningError::Malformed(e.to_string()))
    }

    /// Materializes the persisted checklist of a course in one pass.
    pub async fn materialize_course(
        &self,
        course_id: &str,
    ) -> Result<MaterializationReport, PlanningError> {
        let structure = self.load_structure(course_id).await?;
        Ok(self
            .materializer
            .materialize(course_id, &structure.checklist)
            .await?)
    }

    async fn save_structure(&self, structure: &CourseStructure) -> Result<(), PlanningError> {
        let doc = serde_json::to_value(structure)
            .map_err(|e| PlanningError::Malformed(e.to_string()))?;

        let existing = self
            .documents
            .find_one(
                STRUCTURES_COLLECTION,
                json!({ "course_id": structure.course_id }),
            )
            .await?;

        match existing.as_ref().and_then(|d| d.get(ID_FIELD)).and_then(Value::as_str) {
            Some(id) => {
                self.documents.update(STRUCTURES_COLLECTION, id, doc).await?;
            }
            None => {
                self.documents.insert(STRUCTURES_COLLECTION, doc).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{LanguageModel, PortResult};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct MapObjects(Mutex<HashMap<String, String>>);

    #[async_trait]
    impl ObjectStore for MapObjects {
        async fn get(&self, key: &str) -> PortResult<Option<String>> {
            Ok(self.0.lock().await.get(key).cloned())
        }

        async fn put(&self, key: &str, text: &str) -> PortResult<String> {
            self.0.lock().await.insert(key.to_string(), text.to_string());
            Ok(key.to_string())
        }
    }

    #[derive(Default)]
    struct VecDocuments(Mutex<Vec<(String, String, Value)>>);

    #[async_trait]
    impl DocumentStore for VecDocuments {
        async fn insert(&self, collection: &str, mut doc: Value) -> PortResult<String> {
            let mut docs = self.0.lock().await;
            let id = format!("d{}", docs.len() + 1);
            doc[ID_FIELD] = json!(id);
            docs.push((collection.to_string(), id.clone(), doc));
            Ok(id)
        }

        async fn find_one(&self, collection: &str, filter: Value) -> PortResult<Option<Value>> {
            let docs = self.0.lock().await;
            let filter = filter.as_object().cloned().unwrap_or_default();
            Ok(docs
                .iter()
                .filter(|(c, _, _)| c == collection)
                .find(|(_, _, d)| filter.iter().all(|(k, v)| d.get(k) == Some(v)))
                .map(|(_, _, d)| d.clone()))
        }

        async fn update(&self, collection: &str, id: &str, patch: Value) -> PortResult<bool> {
            let mut docs = self.0.lock().await;
            let Some((_, _, doc)) = docs.iter_mut().find(|(c, i, _)| c == collection && i == id)
            else {
                return Ok(false);
            };
            for (k, v) in patch.as_object().cloned().unwrap_or_default() {
                doc[k.as_str()] = v;
            }
            Ok(true)
        }
    }

    struct DownLlm;

    #[async_trait]
    impl LanguageModel for DownLlm {
        async fn complete(&self, _: &str, _: &str, _: u32) -> PortResult<String> {
            Err(PortError::Unexpected("503 from upstream".into()))
        }
    }

    fn planner(objects: Arc<MapObjects>, documents: Arc<VecDocuments>) -> CoursePlanner {
        CoursePlanner::new(
            objects,
            documents,
            StructureExtractor::with_default_chain(Arc::new(DownLlm)),
        )
    }

    const DESIGN: &str = "# Go\n## **Module 1 — Basics**\n| **Chapter 1.1: Syntax** |\n";

    #[tokio::test]
    async fn missing_design_is_reported() {
        let planner = planner(Arc::default(), Arc::default());
        let err = planner.extract_course_structure("c1", "Go").await.unwrap_err();
        assert!(matches!(err, PlanningError::MissingDesign(_)));
    }

    #[tokio::test]
    async fn extraction_is_persisted_and_reloadable() {
        let objects = Arc::new(MapObjects::default());
        objects.put(&design_key("c1"), DESIGN).await.unwrap();
        let documents = Arc::new(VecDocuments::default());
        let planner = planner(objects, documents.clone());

        let extracted = planner.extract_course_structure("c1", "Go").await.unwrap();
        assert_eq!(extracted.strategy, "heuristic");

        // Re-extraction replaces the stored structure instead of adding another.
        planner.extract_course_structure("c1", "Go").await.unwrap();
        let structures = documents
            .0
            .lock()
            .await
            .iter()
            .filter(|(c, _, _)| c == STRUCTURES_COLLECTION)
            .count();
        assert_eq!(structures, 1);

        let loaded = planner.load_structure("c1").await.unwrap();
        assert_eq!(loaded.tree, extracted.tree);
        assert_eq!(loaded.checklist, extracted.checklist);
    }

    #[tokio::test]
    async fn materialize_course_uses_stored_checklist() {
        let objects = Arc::new(MapObjects::default());
        objects.put(&design_key("c1"), DESIGN).await.unwrap();
        let planner = planner(objects, Arc::default());

        assert!(matches!(
            planner.materialize_course("c1").await,
            Err(PlanningError::MissingStructure(_))
        ));

        let structure = planner.extract_course_structure("c1", "Go").await.unwrap();
        let report = planner.materialize_course("c1").await.unwrap();
        assert_eq!(report.created_count, structure.checklist.total_items);
    }
}
