//! Cycle Detector
//!
//! Identifies SOS, peak and EOS from the effective-value sequence of one
//! season and derives a health label. Every rule applied appends a
//! human-readable diagnostic.
//!
//! EOS projection depends on the growth regime:
//! - vegetative: minimum of a trend-line projection and the historical
//!   expected cycle length, clipped to biologically plausible index bounds;
//! - reproductive/plateau: trend continuation only;
//! - senescence: exponential-decay extrapolation from the observed decline
//!   segment, which matches the concave decay shape (a linear fallback
//!   underestimates the remaining days to harvest).
//!
//! A series whose peak never exceeds the minimum-vigor threshold yields a
//! disqualified result with all dates `None`. That is a valid outcome the
//! orchestrator treats as a short-circuit condition, not an error.

use crate::config::CycleConfig;
use crate::phenology::classify_regime;
use crate::types::{CropType, CycleResult, GrowthRegime, HealthLabel, IndexPoint};
use chrono::NaiveDate;
use cropwatch_common::calendar::{days_between, shift_days};
use tracing::debug;

pub struct CycleDetector {
    config: CycleConfig,
}

impl CycleDetector {
    pub fn new(config: CycleConfig) -> Self {
        Self { config }
    }

    /// Detect the crop cycle of a normalized series.
    ///
    /// `expected_cycle_length_days` comes from the historical aligner when
    /// prior seasons exist; otherwise the configured default is used for the
    /// vegetative-regime projection.
    pub fn detect(
        &self,
        points: &[IndexPoint],
        crop: CropType,
        expected_cycle_length_days: Option<f64>,
    ) -> CycleResult {
        let series: Vec<(NaiveDate, f64)> = points
            .iter()
            .filter_map(|p| p.effective_value().map(|v| (p.date, v)))
            .collect();

        if series.is_empty() {
            return CycleResult::disqualified(
                "no effective values available for detection".to_string(),
            );
        }

        let mut diagnostics = Vec::new();

        // 1. Peak: global maximum of effective values
        let (peak_idx, &(peak_date, peak_value)) = series
            .iter()
            .enumerate()
            .max_by(|a, b| a.1 .1.total_cmp(&b.1 .1))
            .expect("non-empty series");

        if peak_value < self.config.min_vigor_threshold {
            let diagnostic = format!(
                "crop pattern not identifiable: peak vigor {:.2} below minimum threshold {:.2}",
                peak_value, self.config.min_vigor_threshold
            );
            debug!(peak_value, "Series disqualified");
            return CycleResult::disqualified(diagnostic);
        }
        diagnostics.push(format!("peak vigor {:.2} on {}", peak_value, peak_date));

        // 2. SOS: backward scan from the peak for the green-up crossing
        let values: Vec<f64> = series.iter().map(|&(_, v)| v).collect();
        let baseline = median(&values[..self.config.baseline_points.min(values.len())]);
        let greenup_threshold = baseline + self.config.greenup_delta;
        let (sos_date, sos_low_confidence) =
            self.find_sos(&series, peak_idx, greenup_threshold, &mut diagnostics);

        // 3. EOS: regime-dependent projection
        let regime = classify_regime(&values, peak_idx, &self.config);
        let (last_date, last_value) = *series.last().expect("non-empty series");
        let eos_date = match regime {
            GrowthRegime::Senescence => self.project_eos_decay(
                &series[peak_idx..],
                last_date,
                last_value,
                &mut diagnostics,
            ),
            GrowthRegime::Vegetative => self.project_eos_vegetative(
                crop,
                sos_date,
                last_date,
                last_value,
                expected_cycle_length_days,
                &mut diagnostics,
            ),
            GrowthRegime::ReproductivePlateau => self.project_eos_trend(
                crop,
                &series[peak_idx..],
                last_date,
                last_value,
                &mut diagnostics,
            ),
        };
        // peak <= EOS invariant: projections never land before the peak
        let eos_date = eos_date.map(|d| d.max(peak_date));

        let cycle_length_days = match (sos_date, eos_date) {
            (Some(sos), Some(eos)) => Some(days_between(sos, eos)),
            _ => None,
        };

        // 4. Health label from peak vigor and observed decline rate
        let health = self.assess_health(
            crop,
            peak_value,
            peak_date,
            last_date,
            last_value,
            regime,
            &mut diagnostics,
        );

        CycleResult {
            sos_date,
            peak_date: Some(peak_date),
            eos_date,
            peak_value: Some(peak_value),
            cycle_length_days,
            regime: Some(regime),
            health,
            sos_low_confidence,
            diagnostics,
        }
    }

    /// Backward scan from the peak for the first crossing above the green-up
    /// threshold. Falls back to the first available date (low confidence)
    /// when the series never crosses from below.
    fn find_sos(
        &self,
        series: &[(NaiveDate, f64)],
        peak_idx: usize,
        threshold: f64,
        diagnostics: &mut Vec<String>,
    ) -> (Option<NaiveDate>, bool) {
        for i in (1..=peak_idx).rev() {
            if series[i].1 >= threshold && series[i - 1].1 < threshold {
                diagnostics.push(format!(
                    "SOS on {} (green-up crossing above {:.2})",
                    series[i].0, threshold
                ));
                return (Some(series[i].0), false);
            }
        }
        let first_date = series[0].0;
        diagnostics.push(format!(
            "no green-up crossing above {:.2}; SOS fell back to first observation {} (low confidence)",
            threshold, first_date
        ));
        (Some(first_date), true)
    }

    /// Senescence regime: exponential-decay fit over the observed decline.
    ///
    /// v(t) = v_peak * exp(-k t); k comes from a least-squares fit of ln(v)
    /// against days since peak. Remaining days from the last observation to
    /// the senescence threshold: ln(v_last / threshold) / k.
    fn project_eos_decay(
        &self,
        decline: &[(NaiveDate, f64)],
        last_date: NaiveDate,
        last_value: f64,
        diagnostics: &mut Vec<String>,
    ) -> Option<NaiveDate> {
        let origin = decline[0].0;
        let samples: Vec<(f64, f64)> = decline
            .iter()
            .filter(|&&(_, v)| v > 0.0)
            .map(|&(date, v)| (days_between(origin, date) as f64, v.ln()))
            .collect();

        let k = linear_fit(&samples).map(|(slope, _)| -slope).unwrap_or(0.0);
        if k <= 1.0e-4 {
            // decline too flat for a decay fit; trend continuation is safer
            diagnostics.push(
                "decay fit degenerate (flat decline); EOS from trend continuation".to_string(),
            );
            return self.days_at_rate(last_date, last_value, self.mid_decline_rate_fallback());
        }

        let target = self.projection_target();
        if last_value <= target {
            diagnostics.push(format!(
                "series already below senescence threshold {:.2}; EOS at last observation {}",
                target, last_date
            ));
            return Some(last_date);
        }

        let days = (last_value / target).ln() / k;
        let days = (days.round() as i64).clamp(0, self.config.max_projection_days);
        let eos = shift_days(last_date, days);
        diagnostics.push(format!(
            "senescence regime: decay constant {:.4}/day, EOS projected {} ({} days past last observation)",
            k, eos, days
        ));
        Some(eos)
    }

    /// Vegetative regime: minimum of (a) trend-line extrapolation through the
    /// plausible index ceiling down to the senescence threshold and (b) the
    /// historical expected cycle length from SOS.
    fn project_eos_vegetative(
        &self,
        crop: CropType,
        sos_date: Option<NaiveDate>,
        last_date: NaiveDate,
        last_value: f64,
        expected_cycle_length_days: Option<f64>,
        diagnostics: &mut Vec<String>,
    ) -> Option<NaiveDate> {
        let (_, bound_hi) = self.config.projection_bounds;
        let profile = crop.profile();
        let decline_rate = (profile.decline_rate_range.0 + profile.decline_rate_range.1) / 2.0;

        // (a) climb to the plausible ceiling at a nominal green-up rate, then
        // decline at the crop's typical rate to the senescence threshold
        let climb_days = ((bound_hi - last_value).max(0.0) / self.config.greenup_delta * 8.0).ceil();
        let decline_days = ((bound_hi - self.projection_target()) / decline_rate).ceil();
        let trend_eos = shift_days(
            last_date,
            (climb_days + decline_days) as i64,
        );

        // (b) expected cycle length applied from SOS
        let expected =
            expected_cycle_length_days.unwrap_or(self.config.default_cycle_length_days);
        let history_eos = sos_date.map(|sos| shift_days(sos, expected.round() as i64));

        let eos = match history_eos {
            Some(h) => trend_eos.min(h),
            None => trend_eos,
        };
        let capped = eos.min(shift_days(last_date, self.config.max_projection_days));
        let eos = capped.max(last_date);
        diagnostics.push(format!(
            "vegetative regime: EOS projected {} (trend {}, expected length {:.0} days)",
            eos, trend_eos, expected
        ));
        Some(eos)
    }

    /// Reproductive/plateau regime: continue the observed post-peak trend to
    /// the senescence threshold.
    fn project_eos_trend(
        &self,
        crop: CropType,
        post_peak: &[(NaiveDate, f64)],
        last_date: NaiveDate,
        last_value: f64,
        diagnostics: &mut Vec<String>,
    ) -> Option<NaiveDate> {
        let origin = post_peak[0].0;
        let samples: Vec<(f64, f64)> = post_peak
            .iter()
            .map(|&(date, v)| (days_between(origin, date) as f64, v))
            .collect();

        let slope = linear_fit(&samples).map(|(s, _)| s).unwrap_or(0.0);
        let profile = crop.profile();
        let rate = if slope < -1.0e-4 {
            -slope
        } else {
            // plateau still flat; assume the crop's typical decline rate
            (profile.decline_rate_range.0 + profile.decline_rate_range.1) / 2.0
        };

        let eos = self.days_at_rate(last_date, last_value, rate);
        if let Some(date) = eos {
            diagnostics.push(format!(
                "plateau regime: trend continuation at {:.4}/day, EOS projected {}",
                rate, date
            ));
        }
        eos
    }

    fn days_at_rate(&self, last_date: NaiveDate, last_value: f64, rate: f64) -> Option<NaiveDate> {
        if rate <= 0.0 {
            return None;
        }
        let remaining = (last_value - self.projection_target()).max(0.0);
        let days = ((remaining / rate).round() as i64).clamp(0, self.config.max_projection_days);
        Some(shift_days(last_date, days))
    }

    /// Extrapolation target for every EOS projection: the senescence
    /// threshold, clipped into the plausible index bounds. A threshold
    /// configured below the index floor would otherwise push projections
    /// toward values the signal never reaches.
    fn projection_target(&self) -> f64 {
        let (bound_lo, bound_hi) = self.config.projection_bounds;
        self.config.senescence_threshold.clamp(bound_lo, bound_hi)
    }

    fn mid_decline_rate_fallback(&self) -> f64 {
        // used only when a decay fit degenerates; generic middle-ground rate
        0.012
    }

    #[allow(clippy::too_many_arguments)]
    fn assess_health(
        &self,
        crop: CropType,
        peak_value: f64,
        peak_date: NaiveDate,
        last_date: NaiveDate,
        last_value: f64,
        regime: GrowthRegime,
        diagnostics: &mut Vec<String>,
    ) -> HealthLabel {
        let profile = crop.profile();

        let peak_check = range_check(
            peak_value,
            profile.peak_range,
            profile.marginal_peak_range,
        );
        diagnostics.push(format!(
            "peak vigor {:.2} is {} for {:?} (expected {:.2}-{:.2})",
            peak_value,
            peak_check.describe(),
            crop,
            profile.peak_range.0,
            profile.peak_range.1
        ));

        // Observed mean decline rate, only meaningful once past the peak
        let decline_check = if regime == GrowthRegime::Vegetative {
            diagnostics.push("post-peak decline not yet observable (vegetative)".to_string());
            RangeCheck::Within
        } else {
            let days = days_between(peak_date, last_date).max(1) as f64;
            let rate = (peak_value - last_value).max(0.0) / days;
            let (lo, hi) = profile.decline_rate_range;
            let check = range_check(rate, (lo, hi), (lo * 0.5, hi * 2.0));
            diagnostics.push(format!(
                "post-peak decline {:.4}/day is {} (expected {:.3}-{:.3})",
                rate,
                check.describe(),
                lo,
                hi
            ));
            check
        };

        match (peak_check, decline_check) {
            (RangeCheck::Within, RangeCheck::Within) => HealthLabel::Good,
            (RangeCheck::Within, RangeCheck::Marginal)
            | (RangeCheck::Marginal, RangeCheck::Within) => HealthLabel::Fair,
            _ => HealthLabel::Poor,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RangeCheck {
    Within,
    Marginal,
    Outside,
}

impl RangeCheck {
    fn describe(self) -> &'static str {
        match self {
            RangeCheck::Within => "within expected range",
            RangeCheck::Marginal => "marginal",
            RangeCheck::Outside => "outside expected range",
        }
    }
}

fn range_check(value: f64, expected: (f64, f64), marginal: (f64, f64)) -> RangeCheck {
    if value >= expected.0 && value <= expected.1 {
        RangeCheck::Within
    } else if value >= marginal.0 && value <= marginal.1 {
        RangeCheck::Marginal
    } else {
        RangeCheck::Outside
    }
}

/// Median of a slice (not required to be sorted)
fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Least-squares linear fit over (x, y) samples; `None` with < 2 samples or
/// a degenerate x spread.
fn linear_fit(samples: &[(f64, f64)]) -> Option<(f64, f64)> {
    if samples.len() < 2 {
        return None;
    }
    let n = samples.len() as f64;
    let mean_x = samples.iter().map(|&(x, _)| x).sum::<f64>() / n;
    let mean_y = samples.iter().map(|&(_, y)| y).sum::<f64>() / n;
    let ss_xx: f64 = samples.iter().map(|&(x, _)| (x - mean_x).powi(2)).sum();
    if ss_xx < 1.0e-12 {
        return None;
    }
    let ss_xy: f64 = samples
        .iter()
        .map(|&(x, y)| (x - mean_x) * (y - mean_y))
        .sum();
    let slope = ss_xy / ss_xx;
    Some((slope, mean_y - slope * mean_x))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SignalSource;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn point(date: NaiveDate, value: f64) -> IndexPoint {
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

    fn detector() -> CycleDetector {
        CycleDetector::new(CycleConfig::default())
    }

    /// Clean soybean season: baseline, green-up on 2025-10-05, peak 0.85 on
    /// 2025-12-20, exponential decline to 0.30 by 2026-02-10.
    fn soybean_season() -> Vec<IndexPoint> {
        let mut points = vec![
            point(d(2025, 9, 10), 0.18),
            point(d(2025, 9, 17), 0.19),
            point(d(2025, 9, 24), 0.18),
            point(d(2025, 10, 1), 0.20),
            point(d(2025, 10, 5), 0.32),
            point(d(2025, 10, 15), 0.42),
            point(d(2025, 10, 25), 0.54),
            point(d(2025, 11, 5), 0.66),
            point(d(2025, 11, 18), 0.76),
            point(d(2025, 12, 1), 0.82),
            point(d(2025, 12, 20), 0.85),
        ];
        // exponential decay from 0.85 to 0.30 over 52 days
        let k = (0.85f64 / 0.30).ln() / 52.0;
        let peak = d(2025, 12, 20);
        for offset in [8i64, 16, 24, 32, 40, 52] {
            let date = shift_days(peak, offset);
            let value = 0.85 * (-k * offset as f64).exp();
            points.push(point(date, value));
        }
        points
    }

    #[test]
    fn test_soybean_senescence_scenario() {
        let result = detector().detect(&soybean_season(), CropType::Soybean, None);

        assert_eq!(result.sos_date, Some(d(2025, 10, 5)));
        assert_eq!(result.peak_date, Some(d(2025, 12, 20)));
        assert!((result.peak_value.unwrap() - 0.85).abs() < 1e-9);
        assert_eq!(result.regime, Some(GrowthRegime::Senescence));
        assert_eq!(result.health, HealthLabel::Good);
        assert!(!result.sos_low_confidence);

        // decay extrapolation to the 0.22 threshold lands around 2026-02-26
        let eos = result.eos_date.unwrap();
        assert!(
            eos >= d(2026, 2, 22) && eos <= d(2026, 3, 2),
            "EOS {} outside expected window",
            eos
        );

        let length = result.cycle_length_days.unwrap();
        assert_eq!(length, days_between(d(2025, 10, 5), eos));
    }

    #[test]
    fn test_sos_peak_eos_ordering_invariant() {
        let result = detector().detect(&soybean_season(), CropType::Soybean, None);
        let sos = result.sos_date.unwrap();
        let peak = result.peak_date.unwrap();
        let eos = result.eos_date.unwrap();
        assert!(sos <= peak && peak <= eos);
    }

    #[test]
    fn test_low_vigor_series_disqualified() {
        let points = vec![
            point(d(2025, 10, 1), 0.18),
            point(d(2025, 10, 9), 0.22),
            point(d(2025, 10, 17), 0.25),
            point(d(2025, 10, 25), 0.21),
        ];
        let result = detector().detect(&points, CropType::Soybean, None);
        assert!(!result.is_identifiable());
        assert!(result.diagnostics[0].contains("not identifiable"));
    }

    #[test]
    fn test_vegetative_regime_uses_expected_cycle_length() {
        let points = vec![
            point(d(2025, 9, 25), 0.18),
            point(d(2025, 10, 2), 0.19),
            point(d(2025, 10, 5), 0.30),
            point(d(2025, 10, 15), 0.42),
            point(d(2025, 10, 25), 0.55),
            point(d(2025, 11, 5), 0.68),
        ];
        let result = detector().detect(&points, CropType::Soybean, Some(120.0));
        assert_eq!(result.regime, Some(GrowthRegime::Vegetative));

        // the minimum of the trend projection and SOS + 120 days applies,
        // and both land well before the history bound from early October
        let eos = result.eos_date.unwrap();
        assert!(eos <= shift_days(result.sos_date.unwrap(), 120));
        assert!(eos > d(2025, 11, 5));
    }

    #[test]
    fn test_plateau_regime_trend_continuation() {
        let points = vec![
            point(d(2025, 9, 25), 0.20),
            point(d(2025, 10, 5), 0.35),
            point(d(2025, 10, 20), 0.60),
            point(d(2025, 11, 5), 0.80),
            point(d(2025, 11, 15), 0.79),
            point(d(2025, 11, 25), 0.77),
            point(d(2025, 12, 5), 0.75),
        ];
        let result = detector().detect(&points, CropType::Soybean, None);
        assert_eq!(result.regime, Some(GrowthRegime::ReproductivePlateau));
        // ~0.002/day observed decline: capped at the projection limit
        let eos = result.eos_date.unwrap();
        assert_eq!(eos, shift_days(d(2025, 12, 5), 90));
    }

    #[test]
    fn test_projection_target_clipped_to_index_floor() {
        // a threshold below the plausible index floor must behave like the
        // floor itself, not stretch the projection toward unreachable values
        let below_floor = CycleDetector::new(CycleConfig {
            senescence_threshold: 0.05,
            ..CycleConfig::default()
        });
        let at_floor = CycleDetector::new(CycleConfig {
            senescence_threshold: 0.18,
            ..CycleConfig::default()
        });
        let season = soybean_season();
        assert_eq!(
            below_floor.detect(&season, CropType::Soybean, None).eos_date,
            at_floor.detect(&season, CropType::Soybean, None).eos_date
        );
    }

    #[test]
    fn test_sos_fallback_is_low_confidence() {
        // series starts already green and stays flat: the green-up threshold
        // (baseline + delta) sits above every value, so no crossing exists
        let points = vec![
            point(d(2025, 10, 1), 0.78),
            point(d(2025, 10, 9), 0.80),
            point(d(2025, 10, 17), 0.79),
            point(d(2025, 10, 25), 0.81),
        ];
        let result = detector().detect(&points, CropType::Soybean, None);
        assert_eq!(result.sos_date, Some(d(2025, 10, 1)));
        assert!(result.sos_low_confidence);
    }

    #[test]
    fn test_linear_fit_recovers_slope() {
        let samples: Vec<(f64, f64)> =
            (0..10).map(|i| (i as f64, 2.0 + 0.5 * i as f64)).collect();
        let (slope, intercept) = linear_fit(&samples).unwrap();
        assert!((slope - 0.5).abs() < 1e-9);
        assert!((intercept - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_median_even_and_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
    }
}
