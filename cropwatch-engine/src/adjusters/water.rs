//! Water-balance stress adjuster
//!
//! Accumulated deficit slows crop development and delays EOS; sustained
//! stress raises a stress-level flag consumed by the estimator.

use crate::config::AdjusterConfig;
use crate::sources::DailyWaterBalance;
use crate::types::{AdjustmentKind, CycleResult, EnvironmentalAdjustment, StressLevel};
use tracing::debug;

pub fn water_adjustment(
    balance: &[DailyWaterBalance],
    cycle: &CycleResult,
    config: &AdjusterConfig,
) -> Option<EnvironmentalAdjustment> {
    if !config.water_enabled {
        return None;
    }
    let sos = cycle.sos_date?;

    let mut accumulated = 0.0f64;
    let mut consecutive = 0u32;
    let mut max_consecutive = 0u32;
    for day in balance.iter().filter(|b| b.date >= sos) {
        let deficit = day.deficit_mm.max(0.0);
        accumulated += deficit;
        if deficit > config.water_stress_day_mm {
            consecutive += 1;
            max_consecutive = max_consecutive.max(consecutive);
        } else {
            consecutive = 0;
        }
    }

    let stress_level = match max_consecutive {
        0..=1 => StressLevel::None,
        2..=4 => StressLevel::Low,
        5..=9 => StressLevel::Moderate,
        10..=14 => StressLevel::High,
        _ => StressLevel::Severe,
    };

    let delay = ((accumulated / config.water_deficit_mm_per_day).round() as i64)
        .min(config.water_cap_days);

    if delay == 0 && stress_level == StressLevel::None {
        return None;
    }

    debug!(accumulated, max_consecutive, delay, ?stress_level, "Water adjustment fired");

    Some(EnvironmentalAdjustment {
        kind: AdjustmentKind::Water,
        days_shift: delay,
        stress_level,
        triggering_metric: format!(
            "accumulated deficit {:.0} mm, longest stress run {} days",
            accumulated, max_consecutive
        ),
        quality_risk: false,
    })
}
