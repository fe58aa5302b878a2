//! Reprocessing queue
//!
//! Serializes re-analysis requests per analysis key (parcel + season), so a
//! parcel is never processed twice concurrently, and retries transient
//! failures with exponential backoff. Item state is kept behind the
//! `QueueStore` seam so callers can poll progress.

use crate::config::QueueConfig;
use crate::error::{EngineError, EngineResult};
use crate::pipeline::PipelineOrchestrator;
use crate::types::{ParcelContext, PipelineResult, PipelineStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

// ============================================================================
// Queue items
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueItemStatus {
    Pending,
    Processing,
    Done,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    /// Analysis key, unique per parcel and season window
    pub key: String,
    pub status: QueueItemStatus,
    /// Attempts consumed so far (first run included)
    pub attempts: u32,
    pub last_error: Option<String>,
    pub enqueued_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QueueItem {
    fn new(key: String) -> Self {
        let now = Utc::now();
        Self {
            key,
            status: QueueItemStatus::Pending,
            attempts: 0,
            last_error: None,
            enqueued_at: now,
            updated_at: now,
        }
    }
}

/// Canonical analysis key for a parcel run.
pub fn analysis_key(parcel: &ParcelContext) -> String {
    format!("{}:{}", parcel.parcel_id, parcel.season_start)
}

// ============================================================================
// Store seam
// ============================================================================

#[async_trait]
pub trait QueueStore: Send + Sync {
    async fn upsert(&self, item: &QueueItem) -> EngineResult<()>;
    async fn get(&self, key: &str) -> EngineResult<Option<QueueItem>>;
}

/// In-memory store, the default for embedded use and tests.
#[derive(Default)]
pub struct MemoryQueueStore {
    items: RwLock<HashMap<String, QueueItem>>,
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn upsert(&self, item: &QueueItem) -> EngineResult<()> {
        self.items
            .write()
            .await
            .insert(item.key.clone(), item.clone());
        Ok(())
    }

    async fn get(&self, key: &str) -> EngineResult<Option<QueueItem>> {
        Ok(self.items.read().await.get(key).cloned())
    }
}

// ============================================================================
// Runner seam
// ============================================================================

/// What the queue drives; the orchestrator is the production implementation.
#[async_trait]
pub trait PipelineRunner: Send + Sync {
    async fn run(&self, parcel: ParcelContext) -> PipelineResult;
}

#[async_trait]
impl PipelineRunner for PipelineOrchestrator {
    async fn run(&self, parcel: ParcelContext) -> PipelineResult {
        self.run_pipeline(parcel).await
    }
}

// ============================================================================
// Queue
// ============================================================================

pub struct ReprocessQueue {
    config: QueueConfig,
    store: Arc<dyn QueueStore>,
    runner: Arc<dyn PipelineRunner>,
    in_flight: Mutex<HashSet<String>>,
}

impl ReprocessQueue {
    pub fn new(
        config: QueueConfig,
        store: Arc<dyn QueueStore>,
        runner: Arc<dyn PipelineRunner>,
    ) -> Self {
        Self {
            config,
            store,
            runner,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Current state of an item, if it was ever enqueued.
    pub async fn status(&self, key: &str) -> EngineResult<Option<QueueItem>> {
        self.store.get(key).await
    }

    /// Process a parcel under its analysis key. A second submission for a key
    /// already in flight is rejected; the caller polls `status` instead.
    pub async fn process(&self, parcel: ParcelContext) -> EngineResult<PipelineResult> {
        let key = analysis_key(&parcel);
        {
            let mut in_flight = self.in_flight.lock().await;
            if !in_flight.insert(key.clone()) {
                return Err(EngineError::InvalidInput(format!(
                    "analysis {key} is already being processed"
                )));
            }
        }

        let outcome = self.process_locked(&key, parcel).await;

        self.in_flight.lock().await.remove(&key);
        outcome
    }

    async fn process_locked(
        &self,
        key: &str,
        parcel: ParcelContext,
    ) -> EngineResult<PipelineResult> {
        let mut item = QueueItem::new(key.to_string());
        self.store.upsert(&item).await?;

        let mut last_result: Option<PipelineResult> = None;
        for attempt in 1..=self.config.max_attempts {
            item.status = QueueItemStatus::Processing;
            item.attempts = attempt;
            item.updated_at = Utc::now();
            self.store.upsert(&item).await?;

            let result = self.runner.run(parcel.clone()).await;
            if result.status != PipelineStatus::Error {
                item.status = QueueItemStatus::Done;
                item.last_error = None;
                item.updated_at = Utc::now();
                self.store.upsert(&item).await?;
                info!(key, attempt, "Queue item completed");
                return Ok(result);
            }

            item.last_error = result.error_message.clone();
            last_result = Some(result);
            if attempt < self.config.max_attempts {
                let backoff = Duration::from_millis(
                    self.config.initial_backoff_ms * 2u64.pow(attempt - 1),
                );
                warn!(
                    key,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    "Pipeline run failed, retrying"
                );
                tokio::time::sleep(backoff).await;
            }
        }

        item.status = QueueItemStatus::Error;
        item.updated_at = Utc::now();
        self.store.upsert(&item).await?;
        warn!(key, attempts = item.attempts, "Queue item exhausted retries");

        last_result.ok_or_else(|| {
            EngineError::Internal("queue processed zero attempts".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CropType;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicU32, Ordering};
    use uuid::Uuid;

    struct FlakyRunner {
        failures_before_success: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl PipelineRunner for FlakyRunner {
        async fn run(&self, parcel: ParcelContext) -> PipelineResult {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let mut result = crate::pipeline::ProcessingContext::new(parcel)
                .fail("upstream outage".to_string());
            if call >= self.failures_before_success {
                result.status = PipelineStatus::Success;
                result.error_message = None;
            }
            result
        }
    }

    fn parcel() -> ParcelContext {
        ParcelContext {
            parcel_id: Uuid::new_v4(),
            crop: CropType::Soybean,
            area_hectares: 10.0,
            season_start: NaiveDate::from_ymd_opt(2025, 9, 1).unwrap(),
            season_end: NaiveDate::from_ymd_opt(2026, 3, 31).unwrap(),
            reference_date: NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
            planting_date: None,
            historical_years: 0,
        }
    }

    fn queue(failures: u32, config: QueueConfig) -> ReprocessQueue {
        ReprocessQueue::new(
            config,
            Arc::new(MemoryQueueStore::default()),
            Arc::new(FlakyRunner {
                failures_before_success: failures,
                calls: AtomicU32::new(0),
            }),
        )
    }

    fn fast_config() -> QueueConfig {
        QueueConfig {
            max_attempts: 3,
            initial_backoff_ms: 1,
        }
    }

    #[tokio::test]
    async fn test_success_marks_item_done() {
        let queue = queue(0, fast_config());
        let parcel = parcel();
        let key = analysis_key(&parcel);

        let result = queue.process(parcel).await.unwrap();
        assert_eq!(result.status, PipelineStatus::Success);

        let item = queue.status(&key).await.unwrap().unwrap();
        assert_eq!(item.status, QueueItemStatus::Done);
        assert_eq!(item.attempts, 1);
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let queue = queue(2, fast_config());
        let parcel = parcel();
        let key = analysis_key(&parcel);

        let result = queue.process(parcel).await.unwrap();
        assert_eq!(result.status, PipelineStatus::Success);

        let item = queue.status(&key).await.unwrap().unwrap();
        assert_eq!(item.attempts, 3);
        assert_eq!(item.status, QueueItemStatus::Done);
    }

    #[tokio::test]
    async fn test_exhausted_retries_yield_error_item() {
        let queue = queue(10, fast_config());
        let parcel = parcel();
        let key = analysis_key(&parcel);

        let result = queue.process(parcel).await.unwrap();
        assert_eq!(result.status, PipelineStatus::Error);

        let item = queue.status(&key).await.unwrap().unwrap();
        assert_eq!(item.status, QueueItemStatus::Error);
        assert_eq!(item.last_error.as_deref(), Some("upstream outage"));
    }

    #[tokio::test]
    async fn test_concurrent_submission_for_same_key_rejected() {
        struct SlowRunner;
        #[async_trait]
        impl PipelineRunner for SlowRunner {
            async fn run(&self, parcel: ParcelContext) -> PipelineResult {
                tokio::time::sleep(Duration::from_millis(200)).await;
                let mut ctx = crate::pipeline::ProcessingContext::new(parcel);
                ctx.begin();
                ctx.finish(PipelineStatus::Success, None, None, None, None, None)
            }
        }

        let queue = Arc::new(ReprocessQueue::new(
            fast_config(),
            Arc::new(MemoryQueueStore::default()),
            Arc::new(SlowRunner),
        ));
        let parcel = parcel();

        let first = tokio::spawn({
            let queue = Arc::clone(&queue);
            let parcel = parcel.clone();
            async move { queue.process(parcel).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let second = queue.process(parcel).await;
        assert!(matches!(second, Err(EngineError::InvalidInput(_))));
        assert!(first.await.unwrap().is_ok());
    }
}
