pub mod checklist;
pub mod domain;
pub mod extraction;
pub mod materialize;
pub mod planning;
pub mod ports;

pub use checklist::ChecklistBuilder;
pub use domain::{
    Chapter, Checklist, ChecklistChapter, ChecklistItem, ChecklistModule, ContentMaterial,
    MaterialKind, MaterialSpec, MaterialStatus, MaterializationReport, Module, Stage,
    StructureTree,
};
pub use extraction::{Extraction, ExtractionError, ExtractionStrategy, StructureExtractor};
pub use materialize::{MaterializationError, MaterializationService};
pub use planning::{CoursePlanner, CourseStructure, PlanningError};
pub use ports::{
    DocumentStore, LanguageModel, ObjectStore, PortError, PortResult, TransitionLog,
};
