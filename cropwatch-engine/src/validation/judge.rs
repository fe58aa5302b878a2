//! Judge agent
//!
//! Weighs the curator's scene labels against the numeric pipeline result and
//! delivers the verdict. The reply must match the `AIValidationResult` JSON
//! contract exactly; anything else degrades the pass.

use crate::error::{EngineError, EngineResult};
use crate::sources::{CompletionRequest, CompletionService};
use crate::types::{ParcelContext, PipelineResult};
use crate::validation::cost::CostLedger;
use crate::validation::curator::CuratorReport;
use crate::validation::types::AIValidationResult;
use std::sync::Arc;
use tracing::debug;

const MAX_RESPONSE_TOKENS: u32 = 700;

const SYSTEM_PROMPT: &str = "You are the reviewing agronomist. Given a numeric crop-cycle \
analysis and scene-by-scene imagery labels from a colleague, decide whether the imagery \
supports the analysis. If the imagery suggests a different harvest date than the numeric \
projection, propose it as adjusted_eos_date and explain why in adjustment_reasoning; \
otherwise leave both null. Answer strictly as JSON: \
{\"agreement\": \"CONFIRMED|QUESTIONED|REJECTED\", \
\"confidence\": 0-100, \
\"harvest_readiness\": \"NOT_READY|APPROACHING|READY|OVERDUE\", \
\"risk_level\": \"LOW|MEDIUM|HIGH\", \
\"adjusted_eos_date\": \"YYYY-MM-DD or null\", \
\"adjustment_reasoning\": \"... or null\", \
\"alerts\": [{\"category\": \"CLIMATIC|PHYTOSANITARY|OPERATIONAL\", \
\"severity\": \"INFO|WARNING|CRITICAL\", \"description\": \"...\", \
\"observed_on\": \"YYYY-MM-DD or null\"}], \
\"notes\": \"...\"}";

pub struct JudgeAgent {
    completions: Arc<dyn CompletionService>,
}

impl JudgeAgent {
    pub fn new(completions: Arc<dyn CompletionService>) -> Self {
        Self { completions }
    }

    pub async fn verdict(
        &self,
        parcel: &ParcelContext,
        result: &PipelineResult,
        curator: &CuratorReport,
        ledger: &mut CostLedger,
    ) -> EngineResult<AIValidationResult> {
        let response = self
            .completions
            .complete(CompletionRequest {
                system_prompt: SYSTEM_PROMPT.to_string(),
                user_prompt: self.verdict_prompt(parcel, result, curator),
                json_response: true,
                max_tokens: MAX_RESPONSE_TOKENS,
            })
            .await?;
        ledger.record("judge", &response);

        let verdict: AIValidationResult = serde_json::from_str(&response.content)
            .map_err(|e| EngineError::Agent(format!("judge reply was not valid JSON: {e}")))?;

        debug!(
            parcel_id = %parcel.parcel_id,
            agreement = ?verdict.agreement,
            alerts = verdict.alerts.len(),
            "Judge delivered verdict"
        );
        Ok(verdict)
    }

    fn verdict_prompt(
        &self,
        parcel: &ParcelContext,
        result: &PipelineResult,
        curator: &CuratorReport,
    ) -> String {
        let mut prompt = format!(
            "Parcel {} ({:?}, {:.1} ha). Pipeline status {:?}.\n",
            parcel.parcel_id, parcel.crop, parcel.area_hectares, result.status
        );
        if let Some(cycle) = &result.cycle {
            prompt.push_str(&format!(
                "Numeric analysis: SOS {:?}, peak {:?} at vigor {:?}, projected EOS {:?}, \
                 health {:?}.\n",
                cycle.sos_date, cycle.peak_date, cycle.peak_value, cycle.eos_date, cycle.health
            ));
        }
        if let Some(estimate) = &result.estimate {
            prompt.push_str(&format!(
                "Estimate: {:.0} t at confidence {:.0} ({:?}).\n",
                estimate.volume_tons, estimate.confidence_score, estimate.confidence_label
            ));
        }
        prompt.push_str("Imagery labels:\n");
        for scene in &curator.scenes {
            prompt.push_str(&format!(
                "- {}: {} ({})\n",
                scene.date, scene.stage, scene.observations
            ));
        }
        if curator.imagery_failures > 0 {
            prompt.push_str(&format!(
                "Note: {} scene(s) could not be fetched.\n",
                curator.imagery_failures
            ));
        }
        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::CompletionResponse;
    use crate::types::{CropType, PipelineStatus};
    use crate::validation::curator::SceneObservation;
    use crate::validation::types::Agreement;
    use async_trait::async_trait;
    use chrono::{NaiveDate, Utc};
    use uuid::Uuid;

    struct CannedCompletions {
        reply: String,
    }

    #[async_trait]
    impl CompletionService for CannedCompletions {
        async fn complete(&self, _request: CompletionRequest) -> EngineResult<CompletionResponse> {
            Ok(CompletionResponse {
                content: self.reply.clone(),
                prompt_tokens: 300,
                completion_tokens: 90,
            })
        }
    }

    fn parcel() -> ParcelContext {
        ParcelContext {
            parcel_id: Uuid::new_v4(),
            crop: CropType::Soybean,
            area_hectares: 80.0,
            season_start: NaiveDate::from_ymd_opt(2025, 9, 1).unwrap(),
            season_end: NaiveDate::from_ymd_opt(2026, 3, 31).unwrap(),
            reference_date: NaiveDate::from_ymd_opt(2026, 2, 10).unwrap(),
            planting_date: None,
            historical_years: 0,
        }
    }

    fn empty_result() -> PipelineResult {
        PipelineResult {
            parcel_id: Uuid::new_v4(),
            status: PipelineStatus::Success,
            short_circuited: false,
            hypotheses: vec![],
            warnings: vec![],
            diagnostics: vec![],
            cycle: None,
            estimate: None,
            historical_correlation: None,
            fusion_metrics: None,
            adjustments: None,
            error_message: None,
            completed_at: Utc::now(),
        }
    }

    fn report() -> CuratorReport {
        CuratorReport {
            scenes: vec![SceneObservation {
                date: NaiveDate::from_ymd_opt(2026, 2, 10).unwrap(),
                stage: "senescence".to_string(),
                observations: "browning canopy, dry soil".to_string(),
            }],
            imagery_fetched: 1,
            imagery_failures: 0,
        }
    }

    #[tokio::test]
    async fn test_verdict_parses_strict_contract() {
        let judge = JudgeAgent::new(Arc::new(CannedCompletions {
            reply: r#"{
                "agreement": "CONFIRMED",
                "confidence": 85.0,
                "harvest_readiness": "APPROACHING",
                "risk_level": "LOW",
                "adjusted_eos_date": null,
                "adjustment_reasoning": null,
                "alerts": [],
                "notes": "imagery matches the projected senescence"
            }"#
            .to_string(),
        }));
        let mut ledger = CostLedger::new(0.001, 0.002);
        let verdict = judge
            .verdict(&parcel(), &empty_result(), &report(), &mut ledger)
            .await
            .unwrap();
        assert_eq!(verdict.agreement, Agreement::Confirmed);
        assert_eq!(verdict.confidence, 85.0);
        assert!(verdict.adjusted_eos_date.is_none());
        assert_eq!(ledger.report().agents["judge"].calls, 1);
    }

    #[tokio::test]
    async fn test_adjusted_eos_with_reasoning_is_kept() {
        let judge = JudgeAgent::new(Arc::new(CannedCompletions {
            reply: r#"{
                "agreement": "QUESTIONED",
                "confidence": 64.0,
                "harvest_readiness": "NOT_READY",
                "risk_level": "MEDIUM",
                "adjusted_eos_date": "2026-03-05",
                "adjustment_reasoning": "canopy still green on the final scene",
                "alerts": [],
                "notes": "projection looks a week early"
            }"#
            .to_string(),
        }));
        let mut ledger = CostLedger::new(0.001, 0.002);
        let verdict = judge
            .verdict(&parcel(), &empty_result(), &report(), &mut ledger)
            .await
            .unwrap();
        assert_eq!(
            verdict.adjusted_eos_date,
            NaiveDate::from_ymd_opt(2026, 3, 5)
        );
        assert!(verdict
            .adjustment_reasoning
            .as_deref()
            .unwrap()
            .contains("still green"));
    }

    #[tokio::test]
    async fn test_invalid_enum_value_rejected() {
        let judge = JudgeAgent::new(Arc::new(CannedCompletions {
            reply: r#"{
                "agreement": "MOSTLY_FINE",
                "confidence": 50.0,
                "harvest_readiness": "READY",
                "risk_level": "LOW",
                "alerts": [],
                "notes": ""
            }"#
            .to_string(),
        }));
        let mut ledger = CostLedger::new(0.001, 0.002);
        let outcome = judge
            .verdict(&parcel(), &empty_result(), &report(), &mut ledger)
            .await;
        assert!(matches!(outcome, Err(EngineError::Agent(_))));
    }
}
