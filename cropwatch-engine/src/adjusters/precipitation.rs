//! Harvest-window precipitation adjuster
//!
//! Rain around the projected harvest date threatens grain quality. This
//! adjuster raises a quality-risk flag without necessarily shifting the
//! date: wet fields delay machinery, but the crop itself is already mature.

use crate::config::AdjusterConfig;
use crate::sources::DailyPrecipitation;
use crate::types::{AdjustmentKind, EnvironmentalAdjustment, StressLevel};
use chrono::NaiveDate;
use cropwatch_common::calendar::days_between;
use tracing::debug;

pub fn precipitation_adjustment(
    precipitation: &[DailyPrecipitation],
    projected_eos: NaiveDate,
    config: &AdjusterConfig,
) -> Option<EnvironmentalAdjustment> {
    if !config.precipitation_enabled {
        return None;
    }

    let window_total: f64 = precipitation
        .iter()
        .filter(|p| days_between(projected_eos, p.date).abs() <= config.precip_window_days)
        .map(|p| p.precipitation_mm.max(0.0))
        .sum();

    if window_total < config.precip_risk_mm {
        return None;
    }

    // Heavy rain (twice the risk threshold) also costs field-access days
    let heavy = window_total >= config.precip_risk_mm * 2.0;
    let days_shift = if heavy { 2 } else { 0 };
    let stress_level = if heavy { StressLevel::High } else { StressLevel::Moderate };

    debug!(window_total, days_shift, "Precipitation risk fired");

    Some(EnvironmentalAdjustment {
        kind: AdjustmentKind::Precipitation,
        days_shift,
        stress_level,
        triggering_metric: format!(
            "{:.0} mm within {} days of projected harvest {}",
            window_total, config.precip_window_days, projected_eos
        ),
        quality_risk: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cropwatch_common::calendar::shift_days;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn rain(around: NaiveDate, offsets_and_mm: &[(i64, f64)]) -> Vec<DailyPrecipitation> {
        offsets_and_mm
            .iter()
            .map(|&(offset, precipitation_mm)| DailyPrecipitation {
                date: shift_days(around, offset),
                precipitation_mm,
            })
            .collect()
    }

    #[test]
    fn test_rain_near_harvest_raises_quality_risk() {
        let eos = d(2026, 2, 26);
        let result = precipitation_adjustment(
            &rain(eos, &[(-2, 15.0), (0, 12.0), (3, 8.0)]),
            eos,
            &AdjusterConfig::default(),
        )
        .unwrap();

        assert!(result.quality_risk);
        assert_eq!(result.days_shift, 0);
        assert_eq!(result.stress_level, StressLevel::Moderate);
    }

    #[test]
    fn test_heavy_rain_also_shifts() {
        let eos = d(2026, 2, 26);
        let result = precipitation_adjustment(
            &rain(eos, &[(-1, 30.0), (1, 25.0), (2, 20.0)]),
            eos,
            &AdjusterConfig::default(),
        )
        .unwrap();
        assert_eq!(result.days_shift, 2);
        assert_eq!(result.stress_level, StressLevel::High);
    }

    #[test]
    fn test_rain_outside_window_ignored() {
        let eos = d(2026, 2, 26);
        assert!(precipitation_adjustment(
            &rain(eos, &[(-20, 50.0), (15, 40.0)]),
            eos,
            &AdjusterConfig::default(),
        )
        .is_none());
    }

    #[test]
    fn test_light_rain_below_threshold_ignored() {
        let eos = d(2026, 2, 26);
        assert!(precipitation_adjustment(
            &rain(eos, &[(0, 10.0), (1, 5.0)]),
            eos,
            &AdjusterConfig::default(),
        )
        .is_none());
    }
}
