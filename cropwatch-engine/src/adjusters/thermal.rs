//! Thermal-sum adjuster
//!
//! Accumulates degree-days from SOS against the crop's requirement and
//! shifts the projected EOS toward the thermally projected maturity date.
//! An unusually warm season pulls harvest earlier, a cool one pushes it out.

use crate::config::AdjusterConfig;
use crate::sources::DailyTemperature;
use crate::types::{
    AdjustmentKind, CropType, CycleResult, EnvironmentalAdjustment, StressLevel,
};
use chrono::NaiveDate;
use cropwatch_common::calendar::{days_between, shift_days};
use tracing::debug;

/// Days of recent history used to estimate the current degree-day rate
const RATE_WINDOW_DAYS: usize = 14;

pub fn thermal_adjustment(
    temperatures: &[DailyTemperature],
    cycle: &CycleResult,
    crop: CropType,
    reference_date: NaiveDate,
    config: &AdjusterConfig,
) -> Option<EnvironmentalAdjustment> {
    if !config.thermal_enabled {
        return None;
    }
    let sos = cycle.sos_date?;
    let eos = cycle.eos_date?;
    let profile = crop.profile();

    let contributions: Vec<f64> = temperatures
        .iter()
        .filter(|t| t.date >= sos && t.date <= reference_date)
        .map(|t| (t.mean_temp_c - profile.base_temp_c).max(0.0))
        .collect();
    if contributions.is_empty() {
        return None;
    }

    let accumulated: f64 = contributions.iter().sum();
    let progress = accumulated / profile.thermal_requirement;

    let projected_maturity = if progress >= 1.0 {
        reference_date
    } else {
        let window = contributions.len().min(RATE_WINDOW_DAYS);
        let recent_rate: f64 =
            contributions[contributions.len() - window..].iter().sum::<f64>() / window as f64;
        if recent_rate <= f64::EPSILON {
            return None;
        }
        let remaining_days = ((profile.thermal_requirement - accumulated) / recent_rate).ceil();
        shift_days(reference_date, remaining_days as i64)
    };

    let shift = days_between(eos, projected_maturity)
        .clamp(-config.thermal_cap_days, config.thermal_cap_days);
    if shift == 0 {
        return None;
    }

    debug!(
        accumulated,
        progress,
        %projected_maturity,
        shift,
        "Thermal adjustment fired"
    );

    Some(EnvironmentalAdjustment {
        kind: AdjustmentKind::Thermal,
        days_shift: shift,
        stress_level: StressLevel::None,
        triggering_metric: format!(
            "thermal progress {:.0}% ({:.0}/{:.0} degree-days), projected maturity {}",
            progress * 100.0,
            accumulated,
            profile.thermal_requirement,
            projected_maturity
        ),
        quality_risk: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GrowthRegime, HealthLabel};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn cycle(sos: NaiveDate, eos: NaiveDate) -> CycleResult {
        CycleResult {
            sos_date: Some(sos),
            peak_date: Some(shift_days(sos, 60)),
            eos_date: Some(eos),
            peak_value: Some(0.85),
            cycle_length_days: Some(days_between(sos, eos)),
            regime: Some(GrowthRegime::Senescence),
            health: HealthLabel::Good,
            sos_low_confidence: false,
            diagnostics: vec![],
        }
    }

    fn constant_temps(from: NaiveDate, days: i64, mean_temp_c: f64) -> Vec<DailyTemperature> {
        (0..days)
            .map(|i| DailyTemperature { date: shift_days(from, i), mean_temp_c })
            .collect()
    }

    #[test]
    fn test_warm_season_pulls_eos_earlier() {
        // 25°C over base 10 → 15 degree-days/day. Soybean needs 1300:
        // maturity after ~87 days, well before the detected EOS at 120 days.
        let sos = d(2025, 10, 5);
        let reference = shift_days(sos, 80);
        let temps = constant_temps(sos, 81, 25.0);
        let result = thermal_adjustment(
            &temps,
            &cycle(sos, shift_days(sos, 120)),
            CropType::Soybean,
            reference,
            &AdjusterConfig::default(),
        )
        .unwrap();

        assert!(result.days_shift < 0, "warm season must shift EOS earlier");
        assert_eq!(result.days_shift, -AdjusterConfig::default().thermal_cap_days);
        assert_eq!(result.kind, AdjustmentKind::Thermal);
    }

    #[test]
    fn test_cool_season_delays_eos() {
        // 14°C → 4 degree-days/day: 1300 requires 325 days, far past EOS
        let sos = d(2025, 10, 5);
        let reference = shift_days(sos, 80);
        let temps = constant_temps(sos, 81, 14.0);
        let result = thermal_adjustment(
            &temps,
            &cycle(sos, shift_days(sos, 120)),
            CropType::Soybean,
            reference,
            &AdjusterConfig::default(),
        )
        .unwrap();

        assert_eq!(result.days_shift, AdjusterConfig::default().thermal_cap_days);
    }

    #[test]
    fn test_shift_respects_per_adjuster_cap() {
        let config = AdjusterConfig::default();
        let sos = d(2025, 10, 5);
        let temps = constant_temps(sos, 81, 30.0);
        let result = thermal_adjustment(
            &temps,
            &cycle(sos, shift_days(sos, 150)),
            CropType::Soybean,
            shift_days(sos, 80),
            &config,
        )
        .unwrap();
        assert!(result.days_shift.abs() <= config.thermal_cap_days);
    }

    #[test]
    fn test_disabled_or_missing_data_yields_none() {
        let sos = d(2025, 10, 5);
        let config = AdjusterConfig { thermal_enabled: false, ..AdjusterConfig::default() };
        assert!(thermal_adjustment(
            &constant_temps(sos, 10, 25.0),
            &cycle(sos, shift_days(sos, 120)),
            CropType::Soybean,
            shift_days(sos, 9),
            &config,
        )
        .is_none());

        assert!(thermal_adjustment(
            &[],
            &cycle(sos, shift_days(sos, 120)),
            CropType::Soybean,
            shift_days(sos, 9),
            &AdjusterConfig::default(),
        )
        .is_none());
    }
}
