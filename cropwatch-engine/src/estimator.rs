//! Yield & Confidence Estimator
//!
//! Combines cycle length, peak vigor, historical correlation, environmental
//! adjustments and the farmer-supplied planting date into a 0-100 confidence
//! score, a discrete label, and a volume estimate. Deterministic given
//! identical inputs; every scoring factor is recorded for explainability.

use crate::config::EstimatorConfig;
use crate::types::{
    CombinedAdjustment, ConfidenceLabel, CropType, CycleResult, HealthLabel, YieldEstimate,
};
use chrono::NaiveDate;
use cropwatch_common::calendar::days_between;
use tracing::debug;

pub struct YieldEstimator {
    config: EstimatorConfig,
}

/// Everything the estimator consumes from earlier stages
pub struct EstimateInputs<'a> {
    pub cycle: &'a CycleResult,
    pub crop: CropType,
    pub area_hectares: f64,
    pub historical_correlation: Option<f64>,
    pub adjustments: Option<&'a CombinedAdjustment>,
    pub planting_date: Option<NaiveDate>,
    /// Clamp for the adjustment penalty scale
    pub max_total_shift_days: i64,
}

impl YieldEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        Self { config }
    }

    pub fn estimate(&self, inputs: EstimateInputs<'_>) -> YieldEstimate {
        let profile = inputs.crop.profile();
        let mut factors = Vec::new();
        let mut score = 0.0;

        // Cycle length vs. the crop's expected range
        let w = self.config.cycle_length_weight;
        score += match inputs.cycle.cycle_length_days {
            Some(days) => {
                let days = days as f64;
                let (lo, hi) = profile.cycle_days_range;
                if days >= lo && days <= hi {
                    factors.push(format!("cycle length {:.0} days within expected range", days));
                    w
                } else if days >= lo * 0.8 && days <= hi * 1.2 {
                    factors.push(format!("cycle length {:.0} days marginal", days));
                    w * 0.5
                } else {
                    factors.push(format!("cycle length {:.0} days outside expected range", days));
                    0.0
                }
            }
            None => {
                factors.push("cycle length unavailable".to_string());
                0.0
            }
        };

        // Peak vigor
        let w = self.config.peak_vigor_weight;
        score += match inputs.cycle.peak_value {
            Some(peak) => {
                let (lo, hi) = profile.peak_range;
                let (mlo, mhi) = profile.marginal_peak_range;
                if peak >= lo && peak <= hi {
                    factors.push(format!("peak vigor {:.2} within expected range", peak));
                    w
                } else if peak >= mlo && peak <= mhi {
                    factors.push(format!("peak vigor {:.2} marginal", peak));
                    w * 0.5
                } else {
                    factors.push(format!("peak vigor {:.2} outside expected range", peak));
                    0.0
                }
            }
            None => {
                factors.push("peak vigor unavailable".to_string());
                0.0
            }
        };

        // Historical correlation; an undefined correlation contributes a
        // neutral half-credit, never a penalty
        let w = self.config.history_weight;
        score += match inputs.historical_correlation {
            Some(correlation) => {
                factors.push(format!("historical correlation {:.2}", correlation));
                correlation.clamp(0.0, 1.0) * w
            }
            None => {
                factors.push("no historical contribution".to_string());
                w * 0.5
            }
        };

        // Environmental adjustments: large combined shifts and quality risk
        // erode trust in the projection
        let w = self.config.adjustment_weight;
        score += match inputs.adjustments {
            Some(combined) if !combined.applied.is_empty() => {
                let scale = inputs.max_total_shift_days.max(1) as f64;
                let penalty = (combined.total_shift_days.unsigned_abs() as f64 / scale).min(1.0);
                let risk_penalty = if combined.quality_risk { 0.25 } else { 0.0 };
                factors.push(format!(
                    "{} environmental adjusters fired, net shift {} days{}",
                    combined.applied.len(),
                    combined.total_shift_days,
                    if combined.quality_risk { ", quality risk" } else { "" }
                ));
                w * (1.0 - penalty - risk_penalty).max(0.0)
            }
            _ => {
                factors.push("no environmental adjustments".to_string());
                w
            }
        };

        // Farmer-supplied planting date consistent with detection
        let w = self.config.planting_date_weight;
        score += match (inputs.planting_date, inputs.cycle.sos_date) {
            (Some(planting), Some(sos)) => {
                let gap = days_between(planting, sos).abs();
                if gap <= self.config.planting_consistency_days {
                    factors.push(format!(
                        "planting date consistent with detected SOS ({} days apart)",
                        gap
                    ));
                    w
                } else {
                    factors.push(format!(
                        "planting date {} days from detected SOS",
                        gap
                    ));
                    w * 0.25
                }
            }
            _ => {
                factors.push("no planting date supplied".to_string());
                w * 0.5
            }
        };

        let score = score.clamp(0.0, 100.0);
        let label = self.label_for(score);

        let health_factor = match inputs.cycle.health {
            HealthLabel::Good => 1.0,
            HealthLabel::Fair => 0.85,
            HealthLabel::Poor => 0.65,
        };
        let confidence_factor = 0.7 + 0.3 * score / 100.0;
        let volume_tons =
            inputs.area_hectares * profile.baseline_yield_t_ha * health_factor * confidence_factor;

        debug!(score, ?label, volume_tons, "Yield estimate computed");

        YieldEstimate {
            area_hectares: inputs.area_hectares,
            volume_tons,
            confidence_score: score,
            confidence_label: label,
            factors,
        }
    }

    fn label_for(&self, score: f64) -> ConfidenceLabel {
        if score >= self.config.high_threshold {
            ConfidenceLabel::High
        } else if score >= self.config.medium_threshold {
            ConfidenceLabel::Medium
        } else {
            ConfidenceLabel::Low
        }
    }
}
