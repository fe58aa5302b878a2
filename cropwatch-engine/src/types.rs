//! Shared types and data contracts
//!
//! This module defines the explicit contracts between pipeline stages. Each
//! type is a well-defined interface between independent modules, and every
//! result type serializes to a flat structure with dates as ISO calendar
//! strings.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Index Points (Normalizer Output)
// ============================================================================

/// Quality flag attached to a raw observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityFlag {
    Clear,
    Cloudy,
    Invalid,
}

impl QualityFlag {
    /// Rank for last-quality-wins duplicate merging (higher wins)
    pub fn rank(self) -> u8 {
        match self {
            QualityFlag::Invalid => 0,
            QualityFlag::Cloudy => 1,
            QualityFlag::Clear => 2,
        }
    }
}

/// Raw observation as delivered by an index source
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RawObservation {
    pub date: NaiveDate,
    pub value: f64,
    pub quality: Option<QualityFlag>,
}

/// Radar-derived observation as delivered by a radar index source
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RadarObservation {
    pub date: NaiveDate,
    pub value: f64,
    pub signal: SecondarySignal,
}

/// Provenance of a point's effective value (for fusion auditability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    /// Observed optical index value
    Optical,
    /// Gap filled from the calibrated radar signal
    RadarFused,
    /// Linearly interpolated between optical neighbors
    Interpolated,
}

/// One point of a normalized vegetation-index series
///
/// Invariant: dates within one series are strictly increasing. Exactly one
/// of raw/interpolated/smoothed is used as the effective value, with
/// precedence smoothed > interpolated > raw.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IndexPoint {
    pub date: NaiveDate,
    pub raw: Option<f64>,
    pub interpolated: Option<f64>,
    pub smoothed: Option<f64>,
    pub source: SignalSource,
    /// True for points belonging to a prior season
    pub historical: bool,
    /// Agricultural season year per the cutover rule
    pub season_year: i32,
}

impl IndexPoint {
    /// Effective value with precedence smoothed > interpolated > raw
    pub fn effective_value(&self) -> Option<f64> {
        self.smoothed.or(self.interpolated).or(self.raw)
    }
}

// ============================================================================
// Cycle Detection (Phenology Output)
// ============================================================================

/// Phenological health label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthLabel {
    Good,
    Fair,
    Poor,
}

/// Growth regime at detection time, driving the EOS projection method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthRegime {
    /// Series still rising; EOS projected from trend vs. historical length
    Vegetative,
    /// Near-maximum, declining slowly; EOS from trend continuation
    ReproductivePlateau,
    /// Clear post-peak decline; EOS from exponential-decay extrapolation
    Senescence,
}

/// Detected crop cycle for one season
///
/// Invariant: `sos_date <= peak_date <= eos_date` whenever all three are
/// present; `cycle_length_days = eos_date - sos_date`.
///
/// A disqualified result (no peak above the minimum-vigor threshold) has all
/// dates `None` and a diagnostic explaining why. It is a valid outcome, not
/// an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleResult {
    pub sos_date: Option<NaiveDate>,
    pub peak_date: Option<NaiveDate>,
    pub eos_date: Option<NaiveDate>,
    pub peak_value: Option<f64>,
    pub cycle_length_days: Option<i64>,
    pub regime: Option<GrowthRegime>,
    pub health: HealthLabel,
    /// SOS fell back to the first available date (no green-up crossing)
    pub sos_low_confidence: bool,
    /// Ordered human-readable record of every rule applied
    pub diagnostics: Vec<String>,
}

impl CycleResult {
    /// Disqualified result: crop pattern not identifiable from the series
    pub fn disqualified(diagnostic: String) -> Self {
        Self {
            sos_date: None,
            peak_date: None,
            eos_date: None,
            peak_value: None,
            cycle_length_days: None,
            regime: None,
            health: HealthLabel::Poor,
            sos_low_confidence: false,
            diagnostics: vec![diagnostic],
        }
    }

    /// Whether a crop cycle was identified at all
    pub fn is_identifiable(&self) -> bool {
        self.peak_date.is_some()
    }
}

// ============================================================================
// Historical Alignment
// ============================================================================

/// One prior-season series, immutable after construction
#[derive(Debug, Clone)]
pub struct HistoricalSeason {
    pub season_year: i32,
    /// Whole years between this season and the current one
    pub year_offset: i32,
    pub points: Vec<IndexPoint>,
}

/// A historical season mapped onto the current season's calendar frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignedSeason {
    pub season_year: i32,
    pub year_offset: i32,
    /// Points with dates projected forward by `year_offset` whole years
    pub points: Vec<IndexPoint>,
    /// Pearson correlation against the current series over the overlapping
    /// window; `None` when the overlap is too small to contribute
    pub correlation: Option<f64>,
}

/// Aggregate output of the historical aligner
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoricalOverlay {
    pub seasons: Vec<AlignedSeason>,
    /// Best defined correlation across seasons
    pub correlation: Option<f64>,
    /// Median green-span length observed across prior seasons, in days
    pub expected_cycle_length_days: Option<f64>,
}

// ============================================================================
// Sensor Fusion
// ============================================================================

/// Secondary signal calibrated against the optical index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecondarySignal {
    /// Radar vegetation index
    Rvi,
    /// Cross-polarization backscatter ratio
    BackscatterRatio,
}

/// Per-parcel linear calibration of the radar signal
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FusionCalibration {
    pub slope: f64,
    pub intercept: f64,
    pub signal: SecondarySignal,
    pub sample_size: usize,
    /// Fit quality (coefficient of determination)
    pub r_squared: f64,
    pub fitted_at: DateTime<Utc>,
}

impl FusionCalibration {
    /// Apply the calibration to a radar value (unclipped)
    pub fn apply(&self, radar_value: f64) -> f64 {
        self.slope * radar_value + self.intercept
    }
}

/// Fusion audit metrics for one season
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FusionMetrics {
    /// Cloud gaps filled from the calibrated radar signal
    pub gaps_filled: usize,
    /// Fraction of effective points contributed by radar
    pub radar_fraction: f64,
    /// Fraction of the season with some signal after fusion
    pub continuity_score: f64,
}

// ============================================================================
// Environmental Adjustments
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdjustmentKind {
    Thermal,
    Water,
    Precipitation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StressLevel {
    None,
    Low,
    Moderate,
    High,
    Severe,
}

/// One adjuster's contribution, capped before combination
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentalAdjustment {
    pub kind: AdjustmentKind,
    /// Signed EOS shift in days (already capped per-adjuster)
    pub days_shift: i64,
    pub stress_level: StressLevel,
    /// The metric that triggered the adjustment, for explainability
    pub triggering_metric: String,
    /// Grain-quality risk raised without necessarily shifting the date
    pub quality_risk: bool,
}

/// Deterministic combination of all fired adjusters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CombinedAdjustment {
    /// Sum of capped shifts, clamped to the configured total window
    pub total_shift_days: i64,
    /// True when the sum hit the total clamp
    pub clamped: bool,
    pub quality_risk: bool,
    pub applied: Vec<EnvironmentalAdjustment>,
}

// ============================================================================
// Yield & Confidence Estimation
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfidenceLabel {
    Low,
    Medium,
    High,
}

/// Final estimate combining cycle shape, history and adjustments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YieldEstimate {
    pub area_hectares: f64,
    /// Estimated production volume in tons
    pub volume_tons: f64,
    /// Confidence score in [0, 100]
    pub confidence_score: f64,
    pub confidence_label: ConfidenceLabel,
    /// Human-readable record of scoring factors
    pub factors: Vec<String>,
}

// ============================================================================
// Crop Profiles
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CropType {
    Soybean,
    Corn,
    Cotton,
    Wheat,
}

/// Expected agronomic ranges for a declared crop type
#[derive(Debug, Clone, Copy)]
pub struct CropProfile {
    /// Expected peak vigor range (NDVI-equivalent)
    pub peak_range: (f64, f64),
    /// Marginal peak band outside which health is POOR
    pub marginal_peak_range: (f64, f64),
    /// Expected cycle length range in days
    pub cycle_days_range: (f64, f64),
    /// Expected post-peak decline rate range (index units per day)
    pub decline_rate_range: (f64, f64),
    /// Base temperature for degree-day accumulation (°C)
    pub base_temp_c: f64,
    /// Degree-day requirement from emergence to maturity (°C·day)
    pub thermal_requirement: f64,
    /// Baseline yield in tons per hectare
    pub baseline_yield_t_ha: f64,
}

impl CropType {
    pub fn profile(self) -> CropProfile {
        match self {
            CropType::Soybean => CropProfile {
                peak_range: (0.75, 0.92),
                marginal_peak_range: (0.60, 0.95),
                cycle_days_range: (100.0, 150.0),
                decline_rate_range: (0.004, 0.025),
                base_temp_c: 10.0,
                thermal_requirement: 1300.0,
                baseline_yield_t_ha: 3.4,
            },
            CropType::Corn => CropProfile {
                peak_range: (0.78, 0.92),
                marginal_peak_range: (0.65, 0.95),
                cycle_days_range: (110.0, 160.0),
                decline_rate_range: (0.004, 0.022),
                base_temp_c: 10.0,
                thermal_requirement: 1500.0,
                baseline_yield_t_ha: 9.5,
            },
            CropType::Cotton => CropProfile {
                peak_range: (0.70, 0.88),
                marginal_peak_range: (0.55, 0.92),
                cycle_days_range: (140.0, 200.0),
                decline_rate_range: (0.003, 0.018),
                base_temp_c: 15.0,
                thermal_requirement: 1600.0,
                baseline_yield_t_ha: 1.6,
            },
            CropType::Wheat => CropProfile {
                peak_range: (0.65, 0.85),
                marginal_peak_range: (0.50, 0.90),
                cycle_days_range: (110.0, 170.0),
                decline_rate_range: (0.004, 0.020),
                base_temp_c: 4.0,
                thermal_requirement: 1400.0,
                baseline_yield_t_ha: 3.0,
            },
        }
    }
}

// ============================================================================
// Pipeline Contract
// ============================================================================

/// Per-parcel run input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParcelContext {
    pub parcel_id: Uuid,
    pub crop: CropType,
    pub area_hectares: f64,
    /// Season window to analyze
    pub season_start: NaiveDate,
    pub season_end: NaiveDate,
    /// "Today" for regime classification and projections
    pub reference_date: NaiveDate,
    /// Farmer-supplied planting date, if any
    pub planting_date: Option<NaiveDate>,
    /// How many prior seasons to align (0 disables alignment)
    pub historical_years: u8,
}

/// Pipeline run status state machine:
/// PENDING → PROCESSING → {SUCCESS | PARTIAL | ERROR}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStatus {
    Pending,
    Processing,
    Success,
    /// Ran without error but critical fields are missing
    Partial,
    Error,
}

/// Final structured result handed to the caller and persisted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    pub parcel_id: Uuid,
    pub status: PipelineStatus,
    pub short_circuited: bool,
    /// Likely causes when short-circuited
    pub hypotheses: Vec<String>,
    pub warnings: Vec<String>,
    pub diagnostics: Vec<String>,
    pub cycle: Option<CycleResult>,
    pub estimate: Option<YieldEstimate>,
    pub historical_correlation: Option<f64>,
    pub fusion_metrics: Option<FusionMetrics>,
    pub adjustments: Option<CombinedAdjustment>,
    pub error_message: Option<String>,
    pub completed_at: DateTime<Utc>,
}

// ============================================================================
// Pipeline Events
// ============================================================================

/// Progress events broadcast during a pipeline run
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    RunStarted {
        parcel_id: Uuid,
    },
    SeriesNormalized {
        parcel_id: Uuid,
        points: usize,
    },
    CycleDetected {
        parcel_id: Uuid,
        identifiable: bool,
    },
    EnrichmentComplete {
        parcel_id: Uuid,
        historical_seasons: usize,
        gaps_filled: usize,
        adjusters_fired: usize,
    },
    RunCompleted {
        parcel_id: Uuid,
        status: PipelineStatus,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_effective_value_precedence() {
        let mut point = IndexPoint {
            date: d(2025, 10, 1),
            raw: Some(0.4),
            interpolated: Some(0.45),
            smoothed: Some(0.5),
            source: SignalSource::Optical,
            historical: false,
            season_year: 2025,
        };
        assert_eq!(point.effective_value(), Some(0.5));

        point.smoothed = None;
        assert_eq!(point.effective_value(), Some(0.45));

        point.interpolated = None;
        assert_eq!(point.effective_value(), Some(0.4));

        point.raw = None;
        assert_eq!(point.effective_value(), None);
    }

    #[test]
    fn test_disqualified_cycle_is_not_identifiable() {
        let result = CycleResult::disqualified("no peak above minimum vigor".to_string());
        assert!(!result.is_identifiable());
        assert!(result.sos_date.is_none());
        assert!(result.eos_date.is_none());
        assert_eq!(result.diagnostics.len(), 1);
    }

    #[test]
    fn test_result_serializes_dates_as_iso_strings() {
        let cycle = CycleResult {
            sos_date: Some(d(2025, 10, 5)),
            peak_date: Some(d(2025, 12, 20)),
            eos_date: Some(d(2026, 2, 26)),
            peak_value: Some(0.85),
            cycle_length_days: Some(144),
            regime: Some(GrowthRegime::Senescence),
            health: HealthLabel::Good,
            sos_low_confidence: false,
            diagnostics: vec![],
        };
        let json = serde_json::to_value(&cycle).unwrap();
        assert_eq!(json["sos_date"], "2025-10-05");
        assert_eq!(json["eos_date"], "2026-02-26");
        assert_eq!(json["health"], "GOOD");
    }

    #[test]
    fn test_quality_rank_ordering() {
        assert!(QualityFlag::Clear.rank() > QualityFlag::Cloudy.rank());
        assert!(QualityFlag::Cloudy.rank() > QualityFlag::Invalid.rank());
    }
}
