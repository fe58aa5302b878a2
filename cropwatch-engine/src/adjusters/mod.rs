//! Environmental Adjusters
//!
//! Independent, feature-flag-gated modules that nudge the detected EOS from
//! environmental evidence. Shifts are additive but each adjuster's shift is
//! capped before summation, and the combined shift is clamped to a maximum
//! total window so stacked errors cannot compound unboundedly.

mod precipitation;
mod thermal;
mod water;

pub use precipitation::precipitation_adjustment;
pub use thermal::thermal_adjustment;
pub use water::water_adjustment;

use crate::config::AdjusterConfig;
use crate::types::{CombinedAdjustment, EnvironmentalAdjustment};

/// Deterministic combination rule: sum the (already capped) per-adjuster
/// shifts, then clamp the total to the configured window. Quality-risk flags
/// survive combination regardless of the shift outcome.
pub fn combine_adjustments(
    adjustments: Vec<EnvironmentalAdjustment>,
    config: &AdjusterConfig,
) -> CombinedAdjustment {
    let raw_total: i64 = adjustments.iter().map(|a| a.days_shift).sum();
    let cap = config.max_total_shift_days;
    let total = raw_total.clamp(-cap, cap);

    CombinedAdjustment {
        total_shift_days: total,
        clamped: total != raw_total,
        quality_risk: adjustments.iter().any(|a| a.quality_risk),
        applied: adjustments,
    }
}
