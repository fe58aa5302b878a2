//! Sensor Fusion Engine
//!
//! Fills cloud gaps in the optical index series from the calibrated radar
//! signal. Calibrations are cached per parcel; the cache supports concurrent
//! reads with single-writer refits. When no usable calibration exists (cold
//! start or poor fit quality) fusion is skipped for the parcel and a
//! diagnostic is surfaced instead of injecting low-quality synthetic values.

use crate::config::FusionConfig;
use crate::fusion::{fit_calibration, pair_samples};
use crate::types::{
    FusionCalibration, FusionMetrics, IndexPoint, RadarObservation, SignalSource,
};
use chrono::NaiveDate;
use cropwatch_common::calendar::days_between;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

/// Result of one fusion pass
#[derive(Debug, Clone, Default)]
pub struct FusionOutcome {
    /// `None` when fusion was skipped entirely
    pub metrics: Option<FusionMetrics>,
    pub diagnostics: Vec<String>,
}

pub struct SensorFusionEngine {
    config: FusionConfig,
    calibrations: RwLock<HashMap<Uuid, FusionCalibration>>,
}

impl SensorFusionEngine {
    pub fn new(config: FusionConfig) -> Self {
        Self {
            config,
            calibrations: RwLock::new(HashMap::new()),
        }
    }

    /// Current cached calibration for a parcel, if any.
    pub async fn calibration_for(&self, parcel_id: Uuid) -> Option<FusionCalibration> {
        self.calibrations.read().await.get(&parcel_id).copied()
    }

    /// Calibrate (refitting when warranted) and fill optical gaps from radar.
    ///
    /// `points` is the normalized optical series; filled points are inserted
    /// in date order, tagged `SignalSource::RadarFused`, and clipped to the
    /// configured index bounds.
    pub async fn fuse(
        &self,
        parcel_id: Uuid,
        points: &mut Vec<IndexPoint>,
        radar: &[RadarObservation],
        season_start: NaiveDate,
        season_end: NaiveDate,
    ) -> FusionOutcome {
        let mut outcome = FusionOutcome::default();
        if !self.config.enabled {
            return outcome;
        }
        if radar.is_empty() {
            outcome
                .diagnostics
                .push("no radar coverage for season; fusion skipped".to_string());
            return outcome;
        }

        let pairs = pair_samples(points, radar, &self.config);
        let calibration = self.resolve_calibration(parcel_id, &pairs, radar).await;

        let Some(calibration) = calibration else {
            outcome.diagnostics.push(format!(
                "no usable radar calibration ({} paired samples, minimum {}); fusion skipped",
                pairs.len(),
                self.config.min_samples
            ));
            return outcome;
        };

        if calibration.r_squared < self.config.min_r_squared {
            outcome.diagnostics.push(format!(
                "radar calibration quality too low (R² {:.2} < {:.2}); fusion skipped",
                calibration.r_squared, self.config.min_r_squared
            ));
            return outcome;
        }

        // Fill dates where the optical signal is missing but radar exists
        let (lo, hi) = self.config.index_bounds;
        let mut filled = 0usize;
        for obs in radar {
            if obs.date < season_start || obs.date > season_end {
                continue;
            }
            let covered = points
                .iter()
                .any(|p| days_between(p.date, obs.date).abs() <= 1 && p.raw.is_some());
            if covered {
                continue;
            }
            if points.iter().any(|p| p.date == obs.date) {
                continue;
            }

            let value = calibration.apply(obs.value).clamp(lo, hi);
            let season_year = points.first().map(|p| p.season_year).unwrap_or(0);
            let historical = points.first().map(|p| p.historical).unwrap_or(false);
            let insert_at = points.partition_point(|p| p.date < obs.date);
            points.insert(
                insert_at,
                IndexPoint {
                    date: obs.date,
                    raw: None,
                    interpolated: Some(value),
                    smoothed: None,
                    source: SignalSource::RadarFused,
                    historical,
                    season_year,
                },
            );
            filled += 1;
        }

        let total = points.len().max(1);
        let metrics = FusionMetrics {
            gaps_filled: filled,
            radar_fraction: filled as f64 / total as f64,
            continuity_score: self.continuity(points, season_start, season_end),
        };
        info!(
            parcel_id = %parcel_id,
            gaps_filled = metrics.gaps_filled,
            continuity = metrics.continuity_score,
            "Sensor fusion applied"
        );
        if filled > 0 {
            outcome.diagnostics.push(format!(
                "{} cloud gaps filled from calibrated radar (R² {:.2})",
                filled, calibration.r_squared
            ));
        }
        outcome.metrics = Some(metrics);
        outcome
    }

    /// Lazily fit, and refit when enough new pairs accumulated or the cached
    /// fit quality dropped below the threshold. Write lock held only for the
    /// actual store (single-writer refit).
    async fn resolve_calibration(
        &self,
        parcel_id: Uuid,
        pairs: &[(f64, f64)],
        radar: &[RadarObservation],
    ) -> Option<FusionCalibration> {
        let cached = self.calibration_for(parcel_id).await;

        let needs_refit = match cached {
            None => true,
            Some(c) => {
                pairs.len() >= c.sample_size + self.config.refit_sample_delta
                    || c.r_squared < self.config.min_r_squared
            }
        };

        if needs_refit {
            let signal = radar.first().map(|r| r.signal)?;
            if let Some(fresh) = fit_calibration(pairs, signal, &self.config) {
                debug!(
                    parcel_id = %parcel_id,
                    samples = fresh.sample_size,
                    r_squared = fresh.r_squared,
                    "Radar calibration refit"
                );
                self.calibrations.write().await.insert(parcel_id, fresh);
                return Some(fresh);
            }
        }

        cached
    }

    /// Fraction of the season within the coverage window of some signal.
    fn continuity(&self, points: &[IndexPoint], start: NaiveDate, end: NaiveDate) -> f64 {
        let season_days = days_between(start, end).max(1);
        let window = self.config.coverage_window_days;
        let mut covered = 0i64;
        let mut day = start;
        while day <= end {
            if points
                .iter()
                .any(|p| days_between(p.date, day).abs() <= window)
            {
                covered += 1;
            }
            day = cropwatch_common::calendar::shift_days(day, 1);
        }
        (covered as f64 / (season_days + 1) as f64).min(1.0)
    }
}
