//! Services for imageleuth-ai
//!
//! Leaves first: field normalizer → recognition invoker → batch orchestrator.
//! The vision client, workspace housekeeping, exporter and rename planner
//! are the collaborators around that pipeline.

pub mod batch_orchestrator;
pub mod exporter;
pub mod field_normalizer;
pub mod recognition_invoker;
pub mod rename_planner;
pub mod vision_client;
pub mod workspace;

pub use batch_orchestrator::{
    BatchError, BatchOrchestrator, BatchOutcome, BatchRequest, PartialBatch, UploadedImage,
};
pub use exporter::{ExportArtifact, ExportError, Exporter};
pub use recognition_invoker::RecognitionInvoker;
pub use rename_planner::{plan_renames, RenameError, RenamePlan, RenameSource};
pub use vision_client::{Recognizer, VisionClient, VisionError};
pub use workspace::BatchWorkspace;
