//! Growth-regime classification
//!
//! Where "today" falls relative to the observed series decides how EOS is
//! projected. The cutoffs here are heuristic tunables (`CycleConfig`), not
//! hard invariants.

use crate::config::CycleConfig;
use crate::types::GrowthRegime;

/// Classify the regime of an effective-value series given the peak position.
///
/// - **Senescence**: enough post-peak points and the last value has dropped
///   below `senescence_entry_fraction` of the peak.
/// - **Vegetative**: the peak sits within the trailing `peak_tail_points`
///   observations and no material decline is seen.
/// - **Reproductive/plateau**: everything in between (near-maximum values,
///   slow decline).
pub fn classify_regime(values: &[f64], peak_idx: usize, config: &CycleConfig) -> GrowthRegime {
    let peak = values[peak_idx];
    let last = *values.last().unwrap_or(&peak);
    let post_peak_points = values.len() - 1 - peak_idx;

    if post_peak_points >= config.min_decline_points
        && last <= config.senescence_entry_fraction * peak
    {
        return GrowthRegime::Senescence;
    }

    let peak_near_end = peak_idx + config.peak_tail_points >= values.len();
    if peak_near_end && last >= config.plateau_fraction * peak {
        return GrowthRegime::Vegetative;
    }

    GrowthRegime::ReproductivePlateau
}
