//! Validation orchestrator
//!
//! Runs the curator → judge sequence with per-call timeouts and retried
//! attempts. The orchestrator is infallible by contract: whatever goes wrong
//! becomes a `Degraded` outcome carrying the spend so far, and the caller's
//! pipeline result is never touched.

use crate::config::ValidationConfig;
use crate::error::{EngineError, EngineResult};
use crate::types::{ParcelContext, PipelineResult};
use crate::validation::cost::CostLedger;
use crate::validation::curator::CuratorAgent;
use crate::validation::judge::JudgeAgent;
use crate::validation::types::{AIValidationResult, ValidationOutcome};
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

pub struct ValidationOrchestrator {
    config: ValidationConfig,
    curator: CuratorAgent,
    judge: JudgeAgent,
}

impl ValidationOrchestrator {
    pub fn new(config: ValidationConfig, curator: CuratorAgent, judge: JudgeAgent) -> Self {
        Self { config, curator, judge }
    }

    /// Validate a finished pipeline result. Degradation, not failure, is the
    /// worst case.
    pub async fn validate(
        &self,
        parcel: &ParcelContext,
        result: &PipelineResult,
    ) -> ValidationOutcome {
        let mut ledger = CostLedger::new(
            self.config.prompt_price_per_1k,
            self.config.completion_price_per_1k,
        );

        if !self.config.enabled {
            return ValidationOutcome::Degraded {
                reason: "validation disabled by configuration".to_string(),
                cost: ledger.report(),
            };
        }

        let attempts = 1 + self.config.max_retries;
        let mut last_error = String::new();
        for attempt in 1..=attempts {
            match self.attempt(parcel, result, &mut ledger).await {
                Ok(verdict) => {
                    info!(
                        parcel_id = %parcel.parcel_id,
                        attempt,
                        agreement = ?verdict.agreement,
                        "Validation completed"
                    );
                    return ValidationOutcome::Completed {
                        result: verdict,
                        cost: ledger.report(),
                    };
                }
                Err(e) => {
                    warn!(
                        parcel_id = %parcel.parcel_id,
                        attempt,
                        error = %e,
                        "Validation attempt failed"
                    );
                    last_error = e.to_string();
                    if attempt < attempts {
                        let backoff = Duration::from_millis(
                            self.config.initial_backoff_ms * 2u64.pow(attempt - 1),
                        );
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }

        ValidationOutcome::Degraded {
            reason: format!("validation failed after {attempts} attempts: {last_error}"),
            cost: ledger.report(),
        }
    }

    async fn attempt(
        &self,
        parcel: &ParcelContext,
        result: &PipelineResult,
        ledger: &mut CostLedger,
    ) -> EngineResult<AIValidationResult> {
        let report = self
            .timed("curator", self.curator.curate(parcel, result, ledger))
            .await?;
        self.timed("judge", self.judge.verdict(parcel, result, &report, ledger))
            .await
    }

    async fn timed<T>(
        &self,
        agent: &str,
        call: impl Future<Output = EngineResult<T>>,
    ) -> EngineResult<T> {
        let timeout = Duration::from_secs(self.config.call_timeout_secs);
        tokio::time::timeout(timeout, call)
            .await
            .map_err(|_| EngineError::Agent(format!("{agent} call timed out")))?
    }
}
