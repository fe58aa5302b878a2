//! Per-parcel radar/optical calibration
//!
//! A linear model `optical = slope * radar + intercept` fit from paired
//! observations taken on the same or adjacent dates. The fit quality (R²)
//! gates whether the calibration may be used for gap filling at all:
//! correctness is prioritized over coverage.

use crate::config::FusionConfig;
use crate::types::{FusionCalibration, IndexPoint, RadarObservation, SecondarySignal};
use cropwatch_common::calendar::days_between;

/// Pair radar observations with optical points within the configured date
/// window. Returns `(radar_value, optical_value)` samples.
pub fn pair_samples(
    optical: &[IndexPoint],
    radar: &[RadarObservation],
    config: &FusionConfig,
) -> Vec<(f64, f64)> {
    let observed: Vec<(chrono::NaiveDate, f64)> = optical
        .iter()
        .filter_map(|p| p.raw.map(|v| (p.date, v)))
        .collect();

    let mut pairs = Vec::new();
    for obs in radar {
        let nearest = observed
            .iter()
            .min_by_key(|(date, _)| days_between(*date, obs.date).abs());
        if let Some(&(date, optical_value)) = nearest {
            if days_between(date, obs.date).abs() <= config.pair_window_days {
                pairs.push((obs.value, optical_value));
            }
        }
    }
    pairs
}

/// Least-squares fit of the calibration; `None` below the minimum sample
/// count or when the radar values carry no spread.
pub fn fit_calibration(
    pairs: &[(f64, f64)],
    signal: SecondarySignal,
    config: &FusionConfig,
) -> Option<FusionCalibration> {
    if pairs.len() < config.min_samples {
        return None;
    }

    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|&(x, _)| x).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|&(_, y)| y).sum::<f64>() / n;

    let mut ss_xx = 0.0;
    let mut ss_yy = 0.0;
    let mut ss_xy = 0.0;
    for &(x, y) in pairs {
        ss_xx += (x - mean_x).powi(2);
        ss_yy += (y - mean_y).powi(2);
        ss_xy += (x - mean_x) * (y - mean_y);
    }
    if ss_xx < 1.0e-12 {
        return None;
    }

    let slope = ss_xy / ss_xx;
    let intercept = mean_y - slope * mean_x;
    let r_squared = if ss_yy < 1.0e-12 {
        0.0
    } else {
        (ss_xy * ss_xy) / (ss_xx * ss_yy)
    };

    Some(FusionCalibration {
        slope,
        intercept,
        signal,
        sample_size: pairs.len(),
        r_squared,
        fitted_at: chrono::Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SignalSource;
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn optical(date: NaiveDate, value: f64) -> IndexPoint {
        IndexPoint {
            date,
            raw: Some(value),
            interpolated: None,
            smoothed: None,
            source: SignalSource::Optical,
            historical: false,
            season_year: 2025,
        }
    }

    fn radar(date: NaiveDate, value: f64) -> RadarObservation {
        RadarObservation { date, value, signal: SecondarySignal::Rvi }
    }

    #[test]
    fn test_pairing_respects_date_window() {
        let config = FusionConfig::default();
        let optical_points = vec![optical(d(2025, 10, 1), 0.40), optical(d(2025, 10, 20), 0.60)];
        let radar_obs = vec![
            radar(d(2025, 10, 2), 0.35),  // 1 day away: paired
            radar(d(2025, 10, 10), 0.50), // 8 days from both: dropped
        ];
        let pairs = pair_samples(&optical_points, &radar_obs, &config);
        assert_eq!(pairs, vec![(0.35, 0.40)]);
    }

    #[test]
    fn test_fit_recovers_linear_relation() {
        let config = FusionConfig::default();
        // optical = 0.8 * radar + 0.1, exactly
        let pairs: Vec<(f64, f64)> = (0..10)
            .map(|i| {
                let x = 0.1 + 0.07 * i as f64;
                (x, 0.8 * x + 0.1)
            })
            .collect();
        let calibration = fit_calibration(&pairs, SecondarySignal::Rvi, &config).unwrap();
        assert!((calibration.slope - 0.8).abs() < 1e-9);
        assert!((calibration.intercept - 0.1).abs() < 1e-9);
        assert!(calibration.r_squared > 0.999);
        assert_eq!(calibration.sample_size, 10);
    }

    #[test]
    fn test_too_few_samples_yield_no_calibration() {
        let config = FusionConfig::default();
        let pairs = vec![(0.2, 0.3), (0.4, 0.5), (0.6, 0.7)];
        assert!(fit_calibration(&pairs, SecondarySignal::Rvi, &config).is_none());
    }

    #[test]
    fn test_noisy_relation_has_lower_r_squared() {
        let config = FusionConfig::default();
        let pairs = vec![
            (0.10, 0.30),
            (0.20, 0.70),
            (0.30, 0.25),
            (0.40, 0.80),
            (0.50, 0.40),
            (0.60, 0.90),
            (0.70, 0.35),
            (0.80, 0.85),
        ];
        let calibration = fit_calibration(&pairs, SecondarySignal::Rvi, &config).unwrap();
        assert!(calibration.r_squared < config.min_r_squared);
    }
}
