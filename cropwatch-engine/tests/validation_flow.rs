//! Validation layered over a real pipeline run
//!
//! The contract under test: whatever happens to the AI pass, the already
//! computed pipeline result is untouched, and the spend is accounted for.

use async_trait::async_trait;
use chrono::NaiveDate;
use cropwatch_common::calendar::shift_days;
use cropwatch_engine::config::{EngineConfig, ValidationConfig};
use cropwatch_engine::error::EngineResult;
use cropwatch_engine::pipeline::{PipelineOrchestrator, PipelineSources};
use cropwatch_engine::sources::{
    CompletionRequest, CompletionResponse, CompletionService, ResultStore, VegetationIndexSource,
};
use cropwatch_engine::types::{
    CropType, ParcelContext, PipelineResult, PipelineStatus, RawObservation,
};
use cropwatch_engine::validation::{
    Agreement, CuratorAgent, JudgeAgent, ValidationOrchestrator, ValidationOutcome,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use uuid::Uuid;

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn obs(date: NaiveDate, value: f64) -> RawObservation {
    RawObservation { date, value, quality: None }
}

fn soybean_observations() -> Vec<RawObservation> {
    let mut observations = vec![
        obs(d(2025, 9, 10), 0.18),
        obs(d(2025, 9, 17), 0.19),
        obs(d(2025, 9, 24), 0.18),
        obs(d(2025, 10, 1), 0.20),
        obs(d(2025, 10, 5), 0.32),
        obs(d(2025, 10, 15), 0.42),
        obs(d(2025, 10, 25), 0.54),
        obs(d(2025, 11, 5), 0.66),
        obs(d(2025, 11, 18), 0.76),
        obs(d(2025, 12, 1), 0.82),
        obs(d(2025, 12, 20), 0.85),
    ];
    let k = (0.85f64 / 0.30).ln() / 52.0;
    for offset in [8i64, 16, 24, 32, 40, 52] {
        observations.push(obs(
            shift_days(d(2025, 12, 20), offset),
            0.85 * (-k * offset as f64).exp(),
        ));
    }
    observations
}

struct MockVegetationSource {
    observations: Vec<RawObservation>,
}

#[async_trait]
impl VegetationIndexSource for MockVegetationSource {
    async fn fetch_index_series(
        &self,
        _parcel_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> EngineResult<Vec<RawObservation>> {
        Ok(self
            .observations
            .iter()
            .filter(|o| o.date >= from && o.date <= to)
            .cloned()
            .collect())
    }
}

struct NullResultStore;

#[async_trait]
impl ResultStore for NullResultStore {
    async fn save_result(&self, _result: &PipelineResult) -> EngineResult<()> {
        Ok(())
    }
}

/// Alternates curator/judge replies; stalls forever when asked to.
struct ScriptedCompletions {
    calls: AtomicU32,
    stall: bool,
}

#[async_trait]
impl CompletionService for ScriptedCompletions {
    async fn complete(&self, _request: CompletionRequest) -> EngineResult<CompletionResponse> {
        if self.stall {
            tokio::time::sleep(std::time::Duration::from_secs(3_600)).await;
        }
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let content = if call % 2 == 0 {
            r#"{"scenes": [{"date": "2026-02-10", "stage": "senescence", "observations": "drying canopy"}]}"#
        } else {
            r#"{"agreement": "CONFIRMED", "confidence": 78.0,
                "harvest_readiness": "APPROACHING", "risk_level": "LOW",
                "alerts": [], "notes": "imagery matches"}"#
        };
        Ok(CompletionResponse {
            content: content.to_string(),
            prompt_tokens: 150,
            completion_tokens: 60,
        })
    }
}

fn parcel() -> ParcelContext {
    ParcelContext {
        parcel_id: Uuid::new_v4(),
        crop: CropType::Soybean,
        area_hectares: 120.0,
        season_start: d(2025, 9, 1),
        season_end: d(2026, 3, 31),
        reference_date: d(2026, 2, 10),
        planting_date: Some(d(2025, 10, 1)),
        historical_years: 0,
    }
}

async fn run_pipeline(parcel: &ParcelContext) -> PipelineResult {
    let sources = PipelineSources {
        vegetation: Arc::new(MockVegetationSource { observations: soybean_observations() }),
        radar: None,
        thermal: None,
        water: None,
        precipitation: None,
        results: Arc::new(NullResultStore),
    };
    PipelineOrchestrator::new(EngineConfig::default(), sources)
        .run_pipeline(parcel.clone())
        .await
}

fn validator(service: Arc<ScriptedCompletions>) -> ValidationOrchestrator {
    let config = ValidationConfig {
        enabled: true,
        call_timeout_secs: 2,
        max_retries: 1,
        initial_backoff_ms: 1,
        ..ValidationConfig::default()
    };
    ValidationOrchestrator::new(
        config,
        CuratorAgent::new(Arc::clone(&service) as Arc<dyn CompletionService>, None),
        JudgeAgent::new(service as Arc<dyn CompletionService>),
    )
}

#[tokio::test]
async fn test_validation_confirms_pipeline_result() {
    let parcel = parcel();
    let result = run_pipeline(&parcel).await;
    assert_eq!(result.status, PipelineStatus::Success);

    let outcome = validator(Arc::new(ScriptedCompletions {
        calls: AtomicU32::new(0),
        stall: false,
    }))
    .validate(&parcel, &result)
    .await;

    match outcome {
        ValidationOutcome::Completed { result: verdict, cost } => {
            assert_eq!(verdict.agreement, Agreement::Confirmed);
            assert!(cost.total_usd > 0.0);
        }
        other => panic!("expected completion, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_stalled_validation_degrades_without_touching_result() {
    let parcel = parcel();
    let result = run_pipeline(&parcel).await;
    assert_eq!(result.status, PipelineStatus::Success);
    let confidence = result.estimate.as_ref().unwrap().confidence_score;

    let outcome = validator(Arc::new(ScriptedCompletions {
        calls: AtomicU32::new(0),
        stall: true,
    }))
    .validate(&parcel, &result)
    .await;

    assert!(outcome.is_degraded());
    // the numeric result stands exactly as computed
    assert_eq!(result.status, PipelineStatus::Success);
    assert_eq!(result.estimate.as_ref().unwrap().confidence_score, confidence);
}
