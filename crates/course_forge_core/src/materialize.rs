//! crates/course_forge_core/src/materialize.rs
//!
//! Persists checklist items as individual content-material records.

use crate::domain::{
    Checklist, ContentMaterial, MaterialKind, MaterialStatus, MaterializationReport,
};
use crate::ports::{DocumentStore, PortError, ID_FIELD};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

/// Collection holding one document per planned material.
pub const MATERIALS_COLLECTION: &str = "content_materials";

#[derive(Debug, thiserror::Error)]
pub enum MaterializationError {
    /// Rows written before the failure stay in place.
    #[error("Persistence failed after {} inserts: {source}", .inserted.len())]
    Persistence {
        inserted: Vec<String>,
        #[source]
        source: PortError,
    },
    #[error("Material not found: {0}")]
    NotFound(String),
    #[error("Illegal status transition {from} -> {to}")]
    IllegalTransition {
        from: MaterialStatus,
        to: MaterialStatus,
    },
    #[error("Stored material is malformed: {0}")]
    Malformed(String),
    #[error(transparent)]
    Port(#[from] PortError),
}

/// Expands a checklist into material records, in checklist order.
///
/// Slides are numbered from 1 within each chapter; other kinds get no number.
pub fn plan_materials(course_id: &str, checklist: &Checklist) -> Vec<ContentMaterial> {
    let mut planned = Vec::with_capacity(checklist.total_items);

    for module in &checklist.modules {
        for chapter in &module.chapters {
            let mut slide_counter = 1;
            for item in &chapter.items {
                let slide_number = match item.kind {
                    MaterialKind::Slide => {
                        let number = slide_counter;
                        slide_counter += 1;
                        Some(number)
                    }
                    _ => None,
                };

                planned.push(ContentMaterial {
                    course_id: course_id.to_string(),
                    module_number: module.module_number,
                    chapter_number: chapter.chapter_number,
                    material_type: item.kind,
                    title: item.title.clone(),
                    status: item.status,
                    slide_number,
                });
            }
        }
    }

    planned
}

pub struct MaterializationService {
    store: Arc<dyn DocumentStore>,
}

impl MaterializationService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Inserts one record per checklist item. No deduplication, no rollback.
    pub async fn materialize(
        &self,
        course_id: &str,
        checklist: &Checklist,
    ) -> Result<MaterializationReport, MaterializationError> {
        let planned = plan_materials(course_id, checklist);
        let mut material_ids = Vec::with_capacity(planned.len());

        for material in planned {
            let inserted = match serde_json::to_value(&material) {
                Ok(doc) => self.store.insert(MATERIALS_COLLECTION, doc).await,
                Err(e) => Err(PortError::Unexpected(e.to_string())),
            };

            match inserted {
                Ok(id) => material_ids.push(id),
                Err(source) => {
                    error!(
                        "Materialization for course {} failed after {} inserts: {}",
                        course_id,
                        material_ids.len(),
                        source
                    );
                    return Err(MaterializationError::Persistence {
                        inserted: material_ids,
                        source,
                    });
                }
            }
        }

        info!(
            "Materialized {} content materials for course {}.",
            material_ids.len(),
            course_id
        );
        Ok(MaterializationReport {
            created_count: material_ids.len(),
            material_ids,
        })
    }

    /// Moves a stored material to `next`, rejecting transitions outside the lifecycle.
    pub async fn update_status(
        &self,
        material_id: &str,
        next: MaterialStatus,
    ) -> Result<MaterialStatus, MaterializationError> {
        let doc = self
            .store
            .find_one(MATERIALS_COLLECTION, json!({ ID_FIELD: material_id }))
            .await?
            .ok_or_else(|| MaterializationError::NotFound(material_id.to_string()))?;

        let current: MaterialStatus = doc
            .get("status")
            .cloned()
            .ok_or_else(|| MaterializationError::Malformed("missing status".into()))
            .and_then(|v| {
                serde_json::from_value(v).map_err(|e| MaterializationError::Malformed(e.to_string()))
            })?;

        if !current.can_transition_to(next) {
            return Err(MaterializationError::IllegalTransition {
                from: current,
                to: next,
            });
        }

        let updated = self
            .store
            .update(MATERIALS_COLLECTION, material_id, json!({ "status": next }))
            .await?;
        if !updated {
            return Err(MaterializationError::NotFound(material_id.to_string()));
        }

        Ok(current)
    }
}
