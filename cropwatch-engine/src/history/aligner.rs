//! Historical Season Aligner
//!
//! Maps prior-year index sequences onto the current season's calendar frame
//! so they can be overlaid and correlated. Dates are projected by whole
//! years (not elapsed days): agricultural phenology repeats by calendar
//! date, so a point observed 2023-11-01 two seasons back belongs on
//! 2025-11-01 in the current frame.

use crate::config::AlignerConfig;
use crate::types::{AlignedSeason, HistoricalOverlay, HistoricalSeason, IndexPoint};
use chrono::NaiveDate;
use cropwatch_common::calendar::{days_between, project_years, season_year};
use tracing::debug;

pub struct HistoricalAligner {
    config: AlignerConfig,
}

impl HistoricalAligner {
    pub fn new(config: AlignerConfig) -> Self {
        Self { config }
    }

    /// Agricultural season year of a date under the configured cutover rule.
    pub fn season_year_of(&self, date: NaiveDate) -> i32 {
        season_year(date, self.config.season_cutover_month)
    }

    /// Construct a historical season from its normalized points. The season
    /// year comes from the first observation; empty input yields `None`.
    pub fn build_season(
        &self,
        points: Vec<IndexPoint>,
        current_season_year: i32,
    ) -> Option<HistoricalSeason> {
        let first = points.first()?;
        let year = self.season_year_of(first.date);
        Some(HistoricalSeason {
            season_year: year,
            year_offset: current_season_year - year,
            points,
        })
    }

    /// Align each historical season to the current frame and correlate the
    /// overlap. Seasons whose mapped window shares too few days with the
    /// current series contribute no correlation (`None`, never zero).
    pub fn align(
        &self,
        current: &[IndexPoint],
        historical: &[HistoricalSeason],
    ) -> HistoricalOverlay {
        let mut seasons = Vec::with_capacity(historical.len());
        let mut green_spans = Vec::new();

        for season in historical {
            if let Some(span) = self.green_span_days(&season.points) {
                green_spans.push(span);
            }

            let mapped: Vec<IndexPoint> = season
                .points
                .iter()
                .map(|p| IndexPoint {
                    date: project_years(p.date, season.year_offset),
                    ..*p
                })
                .collect();

            let correlation = self.correlate(current, &mapped);
            debug!(
                season_year = season.season_year,
                year_offset = season.year_offset,
                points = mapped.len(),
                correlation = ?correlation,
                "Historical season aligned"
            );

            seasons.push(AlignedSeason {
                season_year: season.season_year,
                year_offset: season.year_offset,
                points: mapped,
                correlation,
            });
        }

        let correlation = seasons
            .iter()
            .filter_map(|s| s.correlation)
            .max_by(f64::total_cmp);

        green_spans.sort_by(f64::total_cmp);
        let expected_cycle_length_days = if green_spans.is_empty() {
            None
        } else {
            let mid = green_spans.len() / 2;
            Some(if green_spans.len() % 2 == 0 {
                (green_spans[mid - 1] + green_spans[mid]) / 2.0
            } else {
                green_spans[mid]
            })
        };

        HistoricalOverlay {
            seasons,
            correlation,
            expected_cycle_length_days,
        }
    }

    /// Pearson correlation over date-matched pairs (nearest current point
    /// within the match tolerance). `None` below the minimum pair count or
    /// when either side has no variance.
    fn correlate(&self, current: &[IndexPoint], mapped: &[IndexPoint]) -> Option<f64> {
        let current_values: Vec<(NaiveDate, f64)> = current
            .iter()
            .filter_map(|p| p.effective_value().map(|v| (p.date, v)))
            .collect();

        let mut pairs = Vec::new();
        for point in mapped {
            let Some(value) = point.effective_value() else {
                continue;
            };
            let nearest = current_values
                .iter()
                .min_by_key(|(date, _)| days_between(*date, point.date).abs());
            if let Some(&(date, current_value)) = nearest {
                if days_between(date, point.date).abs() <= self.config.match_tolerance_days {
                    pairs.push((value, current_value));
                }
            }
        }

        if pairs.len() < self.config.min_overlap_pairs {
            return None;
        }
        pearson(&pairs)
    }

    /// Days between the first and last observation above the green-span
    /// threshold; the season's rough cycle length.
    fn green_span_days(&self, points: &[IndexPoint]) -> Option<f64> {
        let green: Vec<NaiveDate> = points
            .iter()
            .filter(|p| {
                p.effective_value()
                    .map(|v| v >= self.config.green_span_threshold)
                    .unwrap_or(false)
            })
            .map(|p| p.date)
            .collect();
        let (first, last) = (green.first()?, green.last()?);
        let span = days_between(*first, *last);
        (span > 0).then_some(span as f64)
    }
}

/// Pearson correlation coefficient; `None` when either side is constant.
fn pearson(pairs: &[(f64, f64)]) -> Option<f64> {
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

    if ss_xx < 1.0e-12 || ss_yy < 1.0e-12 {
        return None;
    }
    Some(ss_xy / (ss_xx * ss_yy).sqrt())
}
