//! Validation verdict types
//!
//! These are the strict JSON contracts the judge must answer in; parsing is
//! unforgiving so a rambling model reply degrades the pass instead of
//! smuggling free text into the persisted verdict.

use crate::validation::cost::CostReport;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Judge's position on the numeric pipeline result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Agreement {
    /// Imagery supports the detected cycle and estimate
    Confirmed,
    /// Imagery is ambiguous or partially contradicts the result
    Questioned,
    /// Imagery contradicts the result
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HarvestReadiness {
    NotReady,
    Approaching,
    Ready,
    Overdue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertCategory {
    /// Weather-driven: drought scars, flooding, frost burn
    Climatic,
    /// Disease or pest pressure visible in the canopy
    Phytosanitary,
    /// Human activity: early harvest, mowing, replanting
    Operational,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

/// One anomaly the agents flagged from imagery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualAlert {
    pub category: AlertCategory,
    pub severity: AlertSeverity,
    pub description: String,
    /// Scene date the anomaly was seen on, ISO format
    pub observed_on: Option<String>,
}

/// The judge's full verdict
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AIValidationResult {
    pub agreement: Agreement,
    /// Judge's own confidence in the verdict, 0-100
    pub confidence: f64,
    pub harvest_readiness: HarvestReadiness,
    pub risk_level: RiskLevel,
    /// Harvest date the imagery suggests instead of the numeric projection
    #[serde(default)]
    pub adjusted_eos_date: Option<NaiveDate>,
    /// Required whenever an adjusted EOS is proposed
    #[serde(default)]
    pub adjustment_reasoning: Option<String>,
    #[serde(default)]
    pub alerts: Vec<VisualAlert>,
    /// Free-form reasoning summary
    pub notes: String,
}

/// Terminal state of a validation pass. Degradation is a normal outcome,
/// not an error: the core pipeline result stands either way.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationOutcome {
    Completed {
        result: AIValidationResult,
        cost: CostReport,
    },
    Degraded {
        reason: String,
        cost: CostReport,
    },
}

impl ValidationOutcome {
    pub fn is_degraded(&self) -> bool {
        matches!(self, ValidationOutcome::Degraded { .. })
    }

    pub fn cost(&self) -> &CostReport {
        match self {
            ValidationOutcome::Completed { cost, .. } => cost,
            ValidationOutcome::Degraded { cost, .. } => cost,
        }
    }
}
