//! AI Validation
//!
//! A two-agent pass over a finished pipeline result: the curator inspects
//! satellite imagery at the key cycle dates and labels what it sees, then the
//! judge weighs those labels against the numeric result and returns a
//! verdict. Validation is strictly advisory: any failure degrades to a
//! reasoned fallback and never disturbs the already-persisted core result.
//! Every model call is metered into a cost report.

mod cost;
mod curator;
mod judge;
mod llm_client;
mod orchestrator;
mod types;

pub use cost::{AgentCost, CostLedger, CostReport};
pub use curator::{CuratorAgent, CuratorReport, SceneObservation};
pub use judge::JudgeAgent;
pub use llm_client::LlmClient;
pub use orchestrator::ValidationOrchestrator;
pub use types::{
    Agreement, AIValidationResult, AlertCategory, AlertSeverity, HarvestReadiness, RiskLevel,
    ValidationOutcome, VisualAlert,
};
