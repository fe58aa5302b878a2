//! Pipeline Orchestration
//!
//! Drives one parcel through the full processing sequence: concurrent source
//! fetches, normalization, sensor fusion, historical alignment, cycle
//! detection, environmental adjustment and estimation, ending in a persisted
//! `PipelineResult`. Status follows the PENDING → PROCESSING →
//! {SUCCESS | PARTIAL | ERROR} state machine; failures are captured into the
//! result rather than propagated to the caller.

mod context;
mod orchestrator;

pub use context::ProcessingContext;
pub use orchestrator::{PipelineOrchestrator, PipelineSources};
