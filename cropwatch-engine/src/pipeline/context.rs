//! Per-run mutable state threaded through the orchestrator phases

use crate::types::{
    CombinedAdjustment, CycleResult, FusionMetrics, ParcelContext, PipelineResult, PipelineStatus,
    YieldEstimate,
};
use chrono::Utc;
use tracing::{info, warn};

/// Accumulates warnings, diagnostics and hypotheses while a parcel moves
/// through the pipeline, and renders the final `PipelineResult`.
pub struct ProcessingContext {
    pub parcel: ParcelContext,
    status: PipelineStatus,
    short_circuited: bool,
    warnings: Vec<String>,
    diagnostics: Vec<String>,
    hypotheses: Vec<String>,
}

impl ProcessingContext {
    pub fn new(parcel: ParcelContext) -> Self {
        Self {
            parcel,
            status: PipelineStatus::Pending,
            short_circuited: false,
            warnings: Vec::new(),
            diagnostics: Vec::new(),
            hypotheses: Vec::new(),
        }
    }

    pub fn status(&self) -> PipelineStatus {
        self.status
    }

    /// PENDING → PROCESSING
    pub fn begin(&mut self) {
        debug_assert_eq!(self.status, PipelineStatus::Pending);
        self.status = PipelineStatus::Processing;
        info!(parcel_id = %self.parcel.parcel_id, "Pipeline run started");
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(parcel_id = %self.parcel.parcel_id, "{}", message);
        self.warnings.push(message);
    }

    pub fn note(&mut self, message: impl Into<String>) {
        self.diagnostics.push(message.into());
    }

    /// Mark the run short-circuited: the crop pattern was not identifiable
    /// and the listed hypotheses describe the likely causes.
    pub fn short_circuit(&mut self, hypotheses: Vec<String>) {
        self.short_circuited = true;
        self.hypotheses = hypotheses;
    }

    pub fn is_short_circuited(&self) -> bool {
        self.short_circuited
    }

    /// Terminal transition into an ERROR result.
    pub fn fail(self, message: String) -> PipelineResult {
        let mut result = self.finish(PipelineStatus::Error, None, None, None, None, None);
        result.error_message = Some(message);
        result
    }

    /// Terminal transition into a SUCCESS or PARTIAL result.
    pub fn finish(
        mut self,
        status: PipelineStatus,
        cycle: Option<CycleResult>,
        estimate: Option<YieldEstimate>,
        historical_correlation: Option<f64>,
        fusion_metrics: Option<FusionMetrics>,
        adjustments: Option<CombinedAdjustment>,
    ) -> PipelineResult {
        self.status = status;
        info!(
            parcel_id = %self.parcel.parcel_id,
            status = ?status,
            short_circuited = self.short_circuited,
            "Pipeline run finished"
        );
        PipelineResult {
            parcel_id: self.parcel.parcel_id,
            status,
            short_circuited: self.short_circuited,
            hypotheses: self.hypotheses,
            warnings: self.warnings,
            diagnostics: self.diagnostics,
            cycle,
            estimate,
            historical_correlation,
            fusion_metrics,
            adjustments,
            error_message: None,
            completed_at: Utc::now(),
        }
    }
}
