//! Engine configuration
//!
//! Every stage receives an explicit config struct; no ambient or global
//! lookup happens inside algorithmic code. Feature flags gate the optional
//! stages (fusion, environmental adjusters, AI validation).
//!
//! The regime-classification cutoffs are heuristic tunables, not hard
//! invariants; defaults were chosen to reproduce known seasons.

use cropwatch_common::calendar::DEFAULT_SEASON_CUTOVER_MONTH;
use serde::{Deserialize, Serialize};

/// Time-series normalizer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizerConfig {
    /// Minimum usable points after cleaning (SOS + peak + EOS candidates)
    pub min_points: usize,
    /// Maximum gap bridged by linear interpolation, in days
    pub max_interpolation_gap_days: i64,
    /// Cadence of inserted interpolated points inside a bridgeable gap, days
    pub interpolation_step_days: i64,
    /// Biological index bounds; values outside are dropped as invalid
    pub index_bounds: (f64, f64),
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            min_points: 3,
            max_interpolation_gap_days: 16,
            interpolation_step_days: 8,
            index_bounds: (0.0, 1.0),
        }
    }
}

/// Cycle detector settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleConfig {
    /// Points used for the pre-season baseline median
    pub baseline_points: usize,
    /// Green-up crossing: baseline + this delta marks SOS
    pub greenup_delta: f64,
    /// Peaks below this value disqualify the series (crop unidentifiable)
    pub min_vigor_threshold: f64,
    /// Index value at which the cycle is considered ended
    pub senescence_threshold: f64,
    /// Biologically plausible projection bounds (NDVI-equivalent)
    pub projection_bounds: (f64, f64),
    /// Last value >= this fraction of peak rules out senescence
    pub plateau_fraction: f64,
    /// Last value <= this fraction of peak (with enough post-peak points)
    /// selects the senescence regime
    pub senescence_entry_fraction: f64,
    /// Minimum observed post-peak points for a decay fit
    pub min_decline_points: usize,
    /// Peak within this many trailing points suggests the series is still rising
    pub peak_tail_points: usize,
    /// Fallback expected cycle length when history offers none, in days
    pub default_cycle_length_days: f64,
    /// Hard cap on any forward EOS projection, in days past the last observation
    pub max_projection_days: i64,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            baseline_points: 5,
            greenup_delta: 0.10,
            min_vigor_threshold: 0.35,
            senescence_threshold: 0.22,
            projection_bounds: (0.18, 0.92),
            plateau_fraction: 0.90,
            senescence_entry_fraction: 0.75,
            min_decline_points: 3,
            peak_tail_points: 3,
            default_cycle_length_days: 125.0,
            max_projection_days: 90,
        }
    }
}

/// Historical aligner settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignerConfig {
    /// Month boundary of the agricultural season-year cutover rule
    pub season_cutover_month: u32,
    /// Date-matching tolerance when pairing aligned and current points, days
    pub match_tolerance_days: i64,
    /// Fewer overlapping pairs than this means "no contribution"
    pub min_overlap_pairs: usize,
    /// Values above this count toward a season's observed green span
    pub green_span_threshold: f64,
}

impl Default for AlignerConfig {
    fn default() -> Self {
        Self {
            season_cutover_month: DEFAULT_SEASON_CUTOVER_MONTH,
            match_tolerance_days: 3,
            min_overlap_pairs: 4,
            green_span_threshold: 0.35,
        }
    }
}

/// Sensor fusion settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionConfig {
    pub enabled: bool,
    /// Radar/optical observations pair when within this many days
    pub pair_window_days: i64,
    /// Minimum paired samples before a calibration is fit
    pub min_samples: usize,
    /// Calibrations below this R² are unusable (skip fusion, diagnose)
    pub min_r_squared: f64,
    /// Refit once this many new pairs accumulate past the last fit
    pub refit_sample_delta: usize,
    /// Fused values are clipped to these bounds
    pub index_bounds: (f64, f64),
    /// A day counts as covered when within this many days of an observation
    pub coverage_window_days: i64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pair_window_days: 2,
            min_samples: 8,
            min_r_squared: 0.65,
            refit_sample_delta: 5,
            index_bounds: (0.18, 0.92),
            coverage_window_days: 8,
        }
    }
}

/// Environmental adjuster settings (each adjuster independently gated)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjusterConfig {
    pub thermal_enabled: bool,
    pub water_enabled: bool,
    pub precipitation_enabled: bool,
    /// Per-adjuster cap on the thermal shift, days
    pub thermal_cap_days: i64,
    /// Per-adjuster cap on the water-stress delay, days
    pub water_cap_days: i64,
    /// Accumulated deficit (mm) per day of EOS delay
    pub water_deficit_mm_per_day: f64,
    /// Daily deficit above this counts as a stress day
    pub water_stress_day_mm: f64,
    /// Rain within this window around projected EOS is inspected, days
    pub precip_window_days: i64,
    /// Accumulated rain (mm) in the window that raises the quality risk
    pub precip_risk_mm: f64,
    /// Clamp on the combined shift from all adjusters, days
    pub max_total_shift_days: i64,
}

impl Default for AdjusterConfig {
    fn default() -> Self {
        Self {
            thermal_enabled: true,
            water_enabled: true,
            precipitation_enabled: true,
            thermal_cap_days: 10,
            water_cap_days: 7,
            water_deficit_mm_per_day: 25.0,
            water_stress_day_mm: 3.0,
            precip_window_days: 5,
            precip_risk_mm: 30.0,
            max_total_shift_days: 21,
        }
    }
}

/// Yield & confidence estimator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimatorConfig {
    /// Score weights, in points of the 0-100 scale
    pub cycle_length_weight: f64,
    pub peak_vigor_weight: f64,
    pub history_weight: f64,
    pub adjustment_weight: f64,
    pub planting_date_weight: f64,
    /// Label thresholds (monotonic: score >= high → HIGH, >= medium → MEDIUM)
    pub medium_threshold: f64,
    pub high_threshold: f64,
    /// Confidence below this floor marks the run PARTIAL
    pub confidence_floor: f64,
    /// Planting date within this many days of detected SOS counts as consistent
    pub planting_consistency_days: i64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            cycle_length_weight: 25.0,
            peak_vigor_weight: 25.0,
            history_weight: 20.0,
            adjustment_weight: 15.0,
            planting_date_weight: 15.0,
            medium_threshold: 40.0,
            high_threshold: 70.0,
            confidence_floor: 20.0,
            planting_consistency_days: 12,
        }
    }
}

/// AI validation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    pub enabled: bool,
    /// Completion model identifier
    pub model: String,
    /// Base URL of the completion service
    pub base_url: String,
    /// Per-call timeout, seconds
    pub call_timeout_secs: u64,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Initial backoff between retries, milliseconds (doubles per attempt)
    pub initial_backoff_ms: u64,
    /// Minimum interval between completion calls, milliseconds
    pub min_call_interval_ms: u64,
    /// Token prices per 1k tokens, for the cost report
    pub prompt_price_per_1k: f64,
    pub completion_price_per_1k: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            call_timeout_secs: 60,
            max_retries: 2,
            initial_backoff_ms: 500,
            min_call_interval_ms: 250,
            prompt_price_per_1k: 0.00015,
            completion_price_per_1k: 0.0006,
        }
    }
}

/// Reprocessing queue settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Attempts per item (first run + retries)
    pub max_attempts: u32,
    /// Initial retry backoff, milliseconds (doubles per attempt)
    pub initial_backoff_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 1_000,
        }
    }
}

/// Complete engine configuration, passed into each stage constructor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    pub normalizer: NormalizerConfig,
    pub cycle: CycleConfig,
    pub aligner: AlignerConfig,
    pub fusion: FusionConfig,
    pub adjusters: AdjusterConfig,
    pub estimator: EstimatorConfig,
    pub validation: ValidationConfig,
    pub queue: QueueConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_internally_consistent() {
        let config = EngineConfig::default();
        assert!(config.cycle.senescence_threshold > config.cycle.projection_bounds.0);
        assert!(config.cycle.min_vigor_threshold > config.cycle.senescence_threshold);
        assert!(config.estimator.high_threshold > config.estimator.medium_threshold);
        assert!(
            config.adjusters.max_total_shift_days
                >= config.adjusters.thermal_cap_days.max(config.adjusters.water_cap_days)
        );
    }

    #[test]
    fn test_estimator_weights_sum_to_full_scale() {
        let e = EstimatorConfig::default();
        let total = e.cycle_length_weight
            + e.peak_vigor_weight
            + e.history_weight
            + e.adjustment_weight
            + e.planting_date_weight;
        assert!((total - 100.0).abs() < f64::EPSILON);
    }
}
