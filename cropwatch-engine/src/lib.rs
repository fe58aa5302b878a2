//! cropwatch-engine - Agronomic Processing Core
//!
//! Derives crop-cycle events (emergence, peak vigor, harvest readiness),
//! yield estimates and confidence scores from satellite vegetation-index
//! time series, optionally cross-validated against imagery by an AI agent
//! pair (curator + judge).
//!
//! Data flows one way through the pipeline orchestrator:
//! raw observations → normalizer → cycle detector → history alignment /
//! sensor fusion / environmental adjusters (concurrent enrichment) →
//! estimator → persisted result → optional AI validation.

pub mod adjusters;
pub mod config;
pub mod error;
pub mod estimator;
pub mod fusion;
pub mod history;
pub mod imagery;
pub mod phenology;
pub mod pipeline;
pub mod queue;
pub mod series;
pub mod sources;
pub mod types;
pub mod validation;

pub use crate::error::{EngineError, EngineResult};
pub use crate::pipeline::{PipelineOrchestrator, ProcessingContext};
pub use crate::types::{CycleResult, PipelineResult, PipelineStatus};
pub use crate::validation::{AIValidationResult, ValidationOrchestrator, ValidationOutcome};
