//! Time-Series Normalizer
//!
//! Turns an unordered set of raw observations for one parcel and season
//! window into a canonical ordered point sequence: invalid values dropped,
//! duplicate dates merged last-quality-wins, short cloud gaps bridged by
//! linear interpolation, and a 3-point moving-average smoothing pass that
//! populates the `smoothed` field consumed by the cycle detector.

use crate::config::NormalizerConfig;
use crate::error::{EngineError, EngineResult};
use crate::types::{IndexPoint, QualityFlag, RawObservation, SignalSource};
use chrono::NaiveDate;
use cropwatch_common::calendar::{days_between, shift_days};
use std::collections::BTreeMap;
use tracing::debug;

pub struct SeriesNormalizer {
    config: NormalizerConfig,
}

impl SeriesNormalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    /// Normalize raw observations into an ordered effective-value sequence.
    ///
    /// `season_year` tags every output point; `historical` marks prior-season
    /// series. Fails with `EmptySeries` when fewer than the configured
    /// minimum observations survive cleaning (phenology detection needs at
    /// least SOS + peak + EOS candidates).
    pub fn normalize(
        &self,
        observations: &[RawObservation],
        season_year: i32,
        historical: bool,
    ) -> EngineResult<Vec<IndexPoint>> {
        let (lo, hi) = self.config.index_bounds;

        // Clean and merge duplicate dates. BTreeMap keeps dates strictly
        // increasing; on a duplicate the higher quality rank wins, with the
        // later observation winning ties.
        let mut by_date: BTreeMap<NaiveDate, (RawObservation, u8)> = BTreeMap::new();
        for obs in observations {
            if !obs.value.is_finite() || obs.value < lo || obs.value > hi {
                continue;
            }
            if obs.quality == Some(QualityFlag::Invalid) {
                continue;
            }
            let rank = obs.quality.map(QualityFlag::rank).unwrap_or(1);
            match by_date.get(&obs.date) {
                Some((_, existing_rank)) if *existing_rank > rank => {}
                _ => {
                    by_date.insert(obs.date, (*obs, rank));
                }
            }
        }

        if by_date.len() < self.config.min_points {
            return Err(EngineError::EmptySeries {
                remaining: by_date.len(),
                minimum: self.config.min_points,
            });
        }

        let observed: Vec<(NaiveDate, f64)> =
            by_date.into_iter().map(|(date, (obs, _))| (date, obs.value)).collect();

        let mut points = self.bridge_gaps(&observed, season_year, historical);
        self.smooth(&mut points);

        debug!(
            observed = observed.len(),
            total = points.len(),
            season_year,
            "Series normalized"
        );

        Ok(points)
    }

    /// Insert interpolated points inside gaps no longer than the configured
    /// maximum, at the configured cadence. Longer gaps are left for the
    /// fusion engine (or surface as reduced continuity).
    fn bridge_gaps(
        &self,
        observed: &[(NaiveDate, f64)],
        season_year: i32,
        historical: bool,
    ) -> Vec<IndexPoint> {
        let step = self.config.interpolation_step_days.max(1);
        let mut points = Vec::with_capacity(observed.len());

        for (i, &(date, value)) in observed.iter().enumerate() {
            points.push(IndexPoint {
                date,
                raw: Some(value),
                interpolated: None,
                smoothed: None,
                source: SignalSource::Optical,
                historical,
                season_year,
            });

            if let Some(&(next_date, next_value)) = observed.get(i + 1) {
                let gap = days_between(date, next_date);
                if gap > step && gap <= self.config.max_interpolation_gap_days {
                    let mut t = shift_days(date, step);
                    while t < next_date {
                        let frac = days_between(date, t) as f64 / gap as f64;
                        let v = value + (next_value - value) * frac;
                        points.push(IndexPoint {
                            date: t,
                            raw: None,
                            interpolated: Some(v),
                            smoothed: None,
                            source: SignalSource::Interpolated,
                            historical,
                            season_year,
                        });
                        t = shift_days(t, step);
                    }
                }
            }
        }

        points
    }

    /// 3-point centered moving average over effective values. Endpoints are
    /// left unsmoothed so the precedence chain falls through to their
    /// interpolated/raw value.
    fn smooth(&self, points: &mut [IndexPoint]) {
        if points.len() < 3 {
            return;
        }
        let effective: Vec<f64> = points
            .iter()
            .map(|p| p.effective_value().unwrap_or_default())
            .collect();
        for i in 1..points.len() - 1 {
            let mean = (effective[i - 1] + effective[i] + effective[i + 1]) / 3.0;
            points[i].smoothed = Some(mean);
        }
    }
}
