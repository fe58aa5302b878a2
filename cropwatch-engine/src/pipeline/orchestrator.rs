//! Pipeline orchestrator
//!
//! One instance serves all parcels. Stages are owned components constructed
//! from `EngineConfig`; external data arrives through the source seams so the
//! whole pipeline runs against mocks in tests. Source fetches for a run are
//! issued concurrently, then the compute stages execute in data order:
//! normalize → fuse → align → detect → adjust → estimate.

use crate::adjusters::{
    combine_adjustments, precipitation_adjustment, thermal_adjustment, water_adjustment,
};
use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::estimator::{EstimateInputs, YieldEstimator};
use crate::fusion::{FusionOutcome, SensorFusionEngine};
use crate::history::HistoricalAligner;
use crate::phenology::CycleDetector;
use crate::pipeline::ProcessingContext;
use crate::series::SeriesNormalizer;
use crate::sources::{
    DailyPrecipitation, DailyTemperature, DailyWaterBalance, PrecipitationSource,
    RadarIndexSource, ResultStore, ThermalSource, VegetationIndexSource, WaterBalanceSource,
};
use crate::types::{
    CycleResult, HistoricalSeason, ParcelContext, PipelineEvent, PipelineResult, PipelineStatus,
    RadarObservation, RawObservation,
};
use chrono::NaiveDate;
use cropwatch_common::calendar::{days_between, project_years, shift_days};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

/// External collaborators the pipeline reads from and writes to. Radar and
/// the environmental sources are optional; missing ones degrade the run to
/// optical-only with warnings instead of failing it.
#[derive(Clone)]
pub struct PipelineSources {
    pub vegetation: Arc<dyn VegetationIndexSource>,
    pub radar: Option<Arc<dyn RadarIndexSource>>,
    pub thermal: Option<Arc<dyn ThermalSource>>,
    pub water: Option<Arc<dyn WaterBalanceSource>>,
    pub precipitation: Option<Arc<dyn PrecipitationSource>>,
    pub results: Arc<dyn ResultStore>,
}

pub struct PipelineOrchestrator {
    config: EngineConfig,
    sources: PipelineSources,
    normalizer: SeriesNormalizer,
    detector: CycleDetector,
    aligner: HistoricalAligner,
    fusion: SensorFusionEngine,
    estimator: YieldEstimator,
    events: broadcast::Sender<PipelineEvent>,
    shutdown: CancellationToken,
}

impl PipelineOrchestrator {
    pub fn new(config: EngineConfig, sources: PipelineSources) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            normalizer: SeriesNormalizer::new(config.normalizer.clone()),
            detector: CycleDetector::new(config.cycle.clone()),
            aligner: HistoricalAligner::new(config.aligner.clone()),
            fusion: SensorFusionEngine::new(config.fusion.clone()),
            estimator: YieldEstimator::new(config.estimator.clone()),
            config,
            sources,
            events,
            shutdown: CancellationToken::new(),
        }
    }

    /// Subscribe to progress events for all runs.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    /// Token cancelling in-flight runs on shutdown.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run one parcel through the full pipeline. Never returns an error:
    /// failures become an ERROR-status result, which is persisted like any
    /// other outcome.
    pub async fn run_pipeline(&self, parcel: ParcelContext) -> PipelineResult {
        let parcel_id = parcel.parcel_id;
        let mut ctx = ProcessingContext::new(parcel);
        ctx.begin();
        let _ = self.events.send(PipelineEvent::RunStarted { parcel_id });

        let result = self.execute(ctx).await;

        if let Err(e) = self.sources.results.save_result(&result).await {
            error!(parcel_id = %parcel_id, error = %e, "Failed to persist pipeline result");
        }
        let _ = self.events.send(PipelineEvent::RunCompleted {
            parcel_id,
            status: result.status,
        });
        result
    }

    async fn execute(&self, mut ctx: ProcessingContext) -> PipelineResult {
        let parcel_id = ctx.parcel.parcel_id;
        let crop = ctx.parcel.crop;
        let area_hectares = ctx.parcel.area_hectares;
        let season_start = ctx.parcel.season_start;
        let season_end = ctx.parcel.season_end;
        let reference_date = ctx.parcel.reference_date;
        let planting_date = ctx.parcel.planting_date;
        let historical_years = ctx.parcel.historical_years;

        // ====================================================================
        // Phase 1: concurrent source fetches
        // ====================================================================
        let (optical, radar, temperatures, water_balance, precipitation, historical_raw) = tokio::join!(
            self.sources
                .vegetation
                .fetch_index_series(parcel_id, season_start, season_end),
            self.fetch_radar(parcel_id, season_start, season_end),
            self.fetch_temperatures(parcel_id, season_start, season_end),
            self.fetch_water_balance(parcel_id, season_start, season_end),
            self.fetch_precipitation(parcel_id, season_start, season_end),
            self.fetch_historical(parcel_id, season_start, season_end, historical_years),
        );

        let optical: Vec<RawObservation> = match optical {
            Ok(observations) => observations,
            Err(e) => return ctx.fail(format!("vegetation index fetch failed: {e}")),
        };
        let radar = self.degrade(&mut ctx, "radar source", radar);
        let temperatures = self.degrade(&mut ctx, "thermal source", temperatures);
        let water_balance = self.degrade(&mut ctx, "water balance source", water_balance);
        let precipitation = self.degrade(&mut ctx, "precipitation source", precipitation);

        if self.shutdown.is_cancelled() {
            return ctx.fail("run cancelled during shutdown".to_string());
        }

        // ====================================================================
        // Phase 2: normalize the current season
        // ====================================================================
        let season_year = self.aligner.season_year_of(season_start);
        let mut points = match self.normalizer.normalize(&optical, season_year, false) {
            Ok(points) => points,
            Err(e) => return ctx.fail(format!("series normalization failed: {e}")),
        };
        ctx.note(format!(
            "{} of {} raw observations survived normalization",
            points.iter().filter(|p| p.raw.is_some()).count(),
            optical.len()
        ));
        let _ = self.events.send(PipelineEvent::SeriesNormalized {
            parcel_id,
            points: points.len(),
        });

        // ====================================================================
        // Phase 3: sensor fusion fills optical gaps before detection
        // ====================================================================
        let fusion_outcome = if radar.is_empty() {
            // no radar configured or no coverage; the optical series stands
            FusionOutcome::default()
        } else {
            self.fusion
                .fuse(parcel_id, &mut points, &radar, season_start, season_end)
                .await
        };
        for diagnostic in fusion_outcome.diagnostics {
            ctx.note(diagnostic);
        }

        // ====================================================================
        // Phase 4: historical alignment
        // ====================================================================
        let seasons = self.normalize_historical(&mut ctx, historical_raw, season_year);
        let overlay = self.aligner.align(&points, &seasons);
        if historical_years > 0 && overlay.correlation.is_none() {
            ctx.note("no historical contribution (insufficient overlap)".to_string());
        }

        // ====================================================================
        // Phase 5: cycle detection and short-circuit
        // ====================================================================
        let mut cycle = self
            .detector
            .detect(&points, crop, overlay.expected_cycle_length_days);
        let _ = self.events.send(PipelineEvent::CycleDetected {
            parcel_id,
            identifiable: cycle.is_identifiable(),
        });

        if !cycle.is_identifiable() {
            info!(parcel_id = %parcel_id, "Crop pattern not identifiable, short-circuiting");
            ctx.short_circuit(unidentifiable_hypotheses(&points, planting_date));
            return ctx.finish(
                PipelineStatus::Partial,
                Some(cycle),
                None,
                overlay.correlation,
                fusion_outcome.metrics,
                None,
            );
        }

        // ====================================================================
        // Phase 6: environmental adjusters
        // ====================================================================
        let mut fired = Vec::new();
        if let Some(adjustment) = thermal_adjustment(
            &temperatures,
            &cycle,
            crop,
            reference_date,
            &self.config.adjusters,
        ) {
            fired.push(adjustment);
        }
        if let Some(adjustment) = water_adjustment(&water_balance, &cycle, &self.config.adjusters)
        {
            fired.push(adjustment);
        }
        if let Some(eos) = cycle.eos_date {
            if let Some(adjustment) =
                precipitation_adjustment(&precipitation, eos, &self.config.adjusters)
            {
                fired.push(adjustment);
            }
        }
        let combined = combine_adjustments(fired, &self.config.adjusters);
        self.apply_adjustment(&mut ctx, &mut cycle, combined.total_shift_days);

        let _ = self.events.send(PipelineEvent::EnrichmentComplete {
            parcel_id,
            historical_seasons: overlay.seasons.len(),
            gaps_filled: fusion_outcome
                .metrics
                .as_ref()
                .map(|m| m.gaps_filled)
                .unwrap_or(0),
            adjusters_fired: combined.applied.len(),
        });

        // ====================================================================
        // Phase 7: estimation and status resolution
        // ====================================================================
        let estimate = self.estimator.estimate(EstimateInputs {
            cycle: &cycle,
            crop,
            area_hectares,
            historical_correlation: overlay.correlation,
            adjustments: Some(&combined),
            planting_date,
            max_total_shift_days: self.config.adjusters.max_total_shift_days,
        });

        let mut status = PipelineStatus::Success;
        if cycle.sos_date.is_none() || cycle.eos_date.is_none() {
            ctx.warn("cycle boundaries unresolved, result is partial");
            status = PipelineStatus::Partial;
        }
        if estimate.confidence_score < self.config.estimator.confidence_floor {
            ctx.warn(format!(
                "confidence {:.0} below floor {:.0}, result is partial",
                estimate.confidence_score, self.config.estimator.confidence_floor
            ));
            status = PipelineStatus::Partial;
        }

        ctx.finish(
            status,
            Some(cycle),
            Some(estimate),
            overlay.correlation,
            fusion_outcome.metrics,
            Some(combined),
        )
    }

    /// Optional-source failures degrade the run instead of aborting it.
    fn degrade<T>(
        &self,
        ctx: &mut ProcessingContext,
        source: &str,
        fetched: EngineResult<Vec<T>>,
    ) -> Vec<T> {
        match fetched {
            Ok(values) => values,
            Err(e) => {
                ctx.warn(format!("{source} unavailable, continuing without it: {e}"));
                Vec::new()
            }
        }
    }

    fn apply_adjustment(
        &self,
        ctx: &mut ProcessingContext,
        cycle: &mut CycleResult,
        shift: i64,
    ) {
        if shift == 0 {
            return;
        }
        if let Some(eos) = cycle.eos_date {
            let mut adjusted = shift_days(eos, shift);
            // EOS never moves before the detected peak
            if let Some(peak) = cycle.peak_date {
                adjusted = adjusted.max(peak);
            }
            cycle.eos_date = Some(adjusted);
            if let Some(sos) = cycle.sos_date {
                cycle.cycle_length_days = Some(days_between(sos, adjusted));
            }
            ctx.note(format!(
                "environmental adjusters moved projected EOS {} days to {}",
                shift, adjusted
            ));
        }
    }

    async fn fetch_radar(
        &self,
        parcel_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> EngineResult<Vec<RadarObservation>> {
        match &self.sources.radar {
            Some(source) if self.config.fusion.enabled => {
                source.fetch_radar_series(parcel_id, from, to).await
            }
            _ => Ok(Vec::new()),
        }
    }

    async fn fetch_temperatures(
        &self,
        parcel_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> EngineResult<Vec<DailyTemperature>> {
        match &self.sources.thermal {
            Some(source) if self.config.adjusters.thermal_enabled => {
                source.fetch_temperatures(parcel_id, from, to).await
            }
            _ => Ok(Vec::new()),
        }
    }

    async fn fetch_water_balance(
        &self,
        parcel_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> EngineResult<Vec<DailyWaterBalance>> {
        match &self.sources.water {
            Some(source) if self.config.adjusters.water_enabled => {
                source.fetch_water_balance(parcel_id, from, to).await
            }
            _ => Ok(Vec::new()),
        }
    }

    async fn fetch_precipitation(
        &self,
        parcel_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> EngineResult<Vec<DailyPrecipitation>> {
        match &self.sources.precipitation {
            Some(source) if self.config.adjusters.precipitation_enabled => {
                source.fetch_precipitation(parcel_id, from, to).await
            }
            _ => Ok(Vec::new()),
        }
    }

    /// Fetch each requested prior season over the current window projected
    /// back year by year. Fetch failures are reported per season, not fatal.
    async fn fetch_historical(
        &self,
        parcel_id: Uuid,
        season_start: NaiveDate,
        season_end: NaiveDate,
        years: u8,
    ) -> EngineResult<Vec<(u8, EngineResult<Vec<RawObservation>>)>> {
        let mut fetches = Vec::with_capacity(years as usize);
        for offset in 1..=i32::from(years) {
            let from = project_years(season_start, -offset);
            let to = project_years(season_end, -offset);
            let vegetation = Arc::clone(&self.sources.vegetation);
            fetches.push(async move {
                (
                    offset as u8,
                    vegetation.fetch_index_series(parcel_id, from, to).await,
                )
            });
        }
        Ok(futures::future::join_all(fetches).await)
    }

    fn normalize_historical(
        &self,
        ctx: &mut ProcessingContext,
        fetched: EngineResult<Vec<(u8, EngineResult<Vec<RawObservation>>)>>,
        current_season_year: i32,
    ) -> Vec<HistoricalSeason> {
        let mut seasons = Vec::new();
        let fetched = match fetched {
            Ok(fetched) => fetched,
            Err(_) => return seasons,
        };
        for (offset, observations) in fetched {
            let observations = match observations {
                Ok(observations) => observations,
                Err(e) => {
                    ctx.warn(format!("historical season -{offset} fetch failed: {e}"));
                    continue;
                }
            };
            match self
                .normalizer
                .normalize(&observations, current_season_year - i32::from(offset), true)
            {
                Ok(points) => {
                    if let Some(season) = self.aligner.build_season(points, current_season_year) {
                        debug!(
                            season_year = season.season_year,
                            points = season.points.len(),
                            "Historical season normalized"
                        );
                        seasons.push(season);
                    }
                }
                Err(e) => {
                    ctx.note(format!("historical season -{offset} skipped: {e}"));
                }
            }
        }
        seasons
    }
}

/// Likely causes for an unidentifiable crop pattern, ordered most to least
/// plausible from what the series shows.
fn unidentifiable_hypotheses(
    points: &[crate::types::IndexPoint],
    planting_date: Option<NaiveDate>,
) -> Vec<String> {
    let mut hypotheses = Vec::new();
    let effective: Vec<f64> = points.iter().filter_map(|p| p.effective_value()).collect();
    let max = effective.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    if effective.len() < 8 {
        hypotheses.push("persistent cloud cover left too few usable observations".to_string());
    }
    if max.is_finite() && max < 0.35 {
        hypotheses.push("parcel may be fallow or bare soil this season".to_string());
    } else {
        hypotheses.push("vigor pattern does not match the declared crop".to_string());
    }
    if planting_date.is_none() {
        hypotheses.push("planting may have occurred outside the analyzed window".to_string());
    }
    hypotheses
}
