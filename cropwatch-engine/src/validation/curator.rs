//! Curator agent
//!
//! Selects the scene dates that matter for a season (planting, emergence,
//! peak, projected harvest, today), makes sure imagery exists for them, and
//! asks the model to label each scene. The labels feed the judge; the curator
//! itself takes no position on the pipeline result.

use crate::error::{EngineError, EngineResult};
use crate::imagery::ImageryService;
use crate::sources::{CompletionRequest, CompletionService};
use crate::types::{ParcelContext, PipelineResult};
use crate::validation::cost::CostLedger;
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

const EVALUATION_SCRIPT: &str = "true-color-ndvi-overlay";
const MAX_RESPONSE_TOKENS: u32 = 900;

const SYSTEM_PROMPT: &str = "You are an agronomist reviewing satellite scenes of a crop parcel. \
For each scene date, describe the visible growth stage and any anomalies \
(clouds, flooding, drought scarring, mowing, harvest activity). \
Answer strictly as JSON: \
{\"scenes\": [{\"date\": \"YYYY-MM-DD\", \"stage\": \"...\", \"observations\": \"...\"}]}";

/// One labeled scene
#[derive(Debug, Clone, Deserialize)]
pub struct SceneObservation {
    pub date: NaiveDate,
    pub stage: String,
    pub observations: String,
}

#[derive(Debug, Deserialize)]
struct CuratorPayload {
    scenes: Vec<SceneObservation>,
}

/// Curator output handed to the judge
#[derive(Debug, Clone)]
pub struct CuratorReport {
    pub scenes: Vec<SceneObservation>,
    pub imagery_fetched: usize,
    pub imagery_failures: usize,
}

pub struct CuratorAgent {
    completions: Arc<dyn CompletionService>,
    imagery: Option<Arc<ImageryService>>,
}

impl CuratorAgent {
    pub fn new(
        completions: Arc<dyn CompletionService>,
        imagery: Option<Arc<ImageryService>>,
    ) -> Self {
        Self { completions, imagery }
    }

    /// The scene dates worth inspecting for this run, deduplicated and ordered.
    pub fn key_dates(parcel: &ParcelContext, result: &PipelineResult) -> Vec<NaiveDate> {
        let mut dates = BTreeSet::new();
        if let Some(planting) = parcel.planting_date {
            dates.insert(planting);
        }
        if let Some(cycle) = &result.cycle {
            dates.extend(cycle.sos_date);
            dates.extend(cycle.peak_date);
            dates.extend(cycle.eos_date);
        }
        dates.insert(parcel.reference_date);
        dates.into_iter().collect()
    }

    pub async fn curate(
        &self,
        parcel: &ParcelContext,
        result: &PipelineResult,
        ledger: &mut CostLedger,
    ) -> EngineResult<CuratorReport> {
        let dates = Self::key_dates(parcel, result);

        let (imagery_fetched, imagery_failures) = match &self.imagery {
            Some(imagery) => {
                let batch = imagery
                    .ensure_images(parcel.parcel_id, &dates, EVALUATION_SCRIPT)
                    .await?;
                (batch.fetched.len(), batch.failures.len())
            }
            None => (0, 0),
        };

        let response = self
            .completions
            .complete(CompletionRequest {
                system_prompt: SYSTEM_PROMPT.to_string(),
                user_prompt: self.scene_prompt(parcel, result, &dates),
                json_response: true,
                max_tokens: MAX_RESPONSE_TOKENS,
            })
            .await?;
        ledger.record("curator", &response);

        let payload: CuratorPayload = serde_json::from_str(&response.content)
            .map_err(|e| EngineError::Agent(format!("curator reply was not valid JSON: {e}")))?;

        debug!(
            parcel_id = %parcel.parcel_id,
            scenes = payload.scenes.len(),
            imagery_fetched,
            "Curator labeled scenes"
        );

        Ok(CuratorReport {
            scenes: payload.scenes,
            imagery_fetched,
            imagery_failures,
        })
    }

    fn scene_prompt(
        &self,
        parcel: &ParcelContext,
        result: &PipelineResult,
        dates: &[NaiveDate],
    ) -> String {
        let mut prompt = format!(
            "Parcel {} of {:.1} ha, declared crop {:?}. Season window {} to {}.\n",
            parcel.parcel_id, parcel.area_hectares, parcel.crop, parcel.season_start,
            parcel.season_end
        );
        if let Some(cycle) = &result.cycle {
            prompt.push_str(&format!(
                "Detected cycle: SOS {:?}, peak {:?} at vigor {:?}, projected EOS {:?}.\n",
                cycle.sos_date, cycle.peak_date, cycle.peak_value, cycle.eos_date
            ));
        }
        prompt.push_str("Label the scene at each of these dates:\n");
        for date in dates {
            prompt.push_str(&format!("- {date}\n"));
        }
        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::CompletionResponse;
    use crate::types::{CropType, CycleResult, GrowthRegime, HealthLabel, PipelineStatus};
    use async_trait::async_trait;
    use chrono::Utc;
    use uuid::Uuid;

    struct CannedCompletions {
        reply: String,
    }

    #[async_trait]
    impl CompletionService for CannedCompletions {
        async fn complete(&self, _request: CompletionRequest) -> EngineResult<CompletionResponse> {
            Ok(CompletionResponse {
                content: self.reply.clone(),
                prompt_tokens: 200,
                completion_tokens: 80,
            })
        }
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn parcel() -> ParcelContext {
        ParcelContext {
            parcel_id: Uuid::new_v4(),
            crop: CropType::Soybean,
            area_hectares: 80.0,
            season_start: d(2025, 9, 1),
            season_end: d(2026, 3, 31),
            reference_date: d(2026, 2, 10),
            planting_date: Some(d(2025, 10, 1)),
            historical_years: 2,
        }
    }

    fn result_with_cycle() -> PipelineResult {
        PipelineResult {
            parcel_id: Uuid::new_v4(),
            status: PipelineStatus::Success,
            short_circuited: false,
            hypotheses: vec![],
            warnings: vec![],
            diagnostics: vec![],
            cycle: Some(CycleResult {
                sos_date: Some(d(2025, 10, 5)),
                peak_date: Some(d(2025, 12, 20)),
                eos_date: Some(d(2026, 2, 26)),
                peak_value: Some(0.85),
                cycle_length_days: Some(144),
                regime: Some(GrowthRegime::Senescence),
                health: HealthLabel::Good,
                sos_low_confidence: false,
                diagnostics: vec![],
            }),
            estimate: None,
            historical_correlation: None,
            fusion_metrics: None,
            adjustments: None,
            error_message: None,
            completed_at: Utc::now(),
        }
    }

    #[test]
    fn test_key_dates_ordered_and_deduplicated() {
        let mut parcel = parcel();
        // planting coincides with SOS candidate
        parcel.planting_date = Some(d(2025, 10, 5));
        let dates = CuratorAgent::key_dates(&parcel, &result_with_cycle());
        assert_eq!(
            dates,
            vec![d(2025, 10, 5), d(2025, 12, 20), d(2026, 2, 10), d(2026, 2, 26)]
        );
    }

    #[tokio::test]
    async fn test_curate_parses_scene_labels() {
        let curator = CuratorAgent::new(
            Arc::new(CannedCompletions {
                reply: r#"{"scenes": [
                    {"date": "2025-10-05", "stage": "emergence", "observations": "uniform rows"},
                    {"date": "2026-02-26", "stage": "senescence", "observations": "browning canopy"}
                ]}"#
                .to_string(),
            }),
            None,
        );
        let mut ledger = CostLedger::new(0.001, 0.002);
        let report = curator
            .curate(&parcel(), &result_with_cycle(), &mut ledger)
            .await
            .unwrap();

        assert_eq!(report.scenes.len(), 2);
        assert_eq!(report.scenes[0].stage, "emergence");
        assert_eq!(ledger.report().agents["curator"].calls, 1);
    }

    #[tokio::test]
    async fn test_malformed_reply_is_agent_error() {
        let curator = CuratorAgent::new(
            Arc::new(CannedCompletions {
                reply: "the crop looks nice".to_string(),
            }),
            None,
        );
        let mut ledger = CostLedger::new(0.001, 0.002);
        let outcome = curator
            .curate(&parcel(), &result_with_cycle(), &mut ledger)
            .await;
        assert!(matches!(outcome, Err(EngineError::Agent(_))));
        // the failed call is still metered
        assert_eq!(ledger.report().agents["curator"].calls, 1);
    }
}
