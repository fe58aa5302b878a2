//! Incremental imagery acquisition
//!
//! Fetches rendered satellite images for the dates the AI curator wants to
//! inspect, persisting them as they arrive. Already-stored dates are never
//! re-fetched, and a per-parcel lock serializes acquisition so two validation
//! runs cannot download the same scene twice.

use crate::error::EngineResult;
use crate::sources::{ImageStore, ImagerySource, SatelliteImage};
use chrono::NaiveDate;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

/// Outcome of one acquisition pass.
#[derive(Debug, Default)]
pub struct ImageryBatch {
    /// Images fetched and persisted by this pass
    pub fetched: Vec<SatelliteImage>,
    /// Requested dates that were already in the store
    pub already_stored: usize,
    /// Dates that could not be fetched, with the reason
    pub failures: Vec<(NaiveDate, String)>,
}

pub struct ImageryService {
    source: Arc<dyn ImagerySource>,
    store: Arc<dyn ImageStore>,
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl ImageryService {
    pub fn new(source: Arc<dyn ImagerySource>, store: Arc<dyn ImageStore>) -> Self {
        Self {
            source,
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Make sure images exist for the given dates, fetching only the missing
    /// ones. Individual fetch failures are reported in the batch rather than
    /// aborting it; the caller decides whether partial imagery is usable.
    pub async fn ensure_images(
        &self,
        parcel_id: Uuid,
        dates: &[NaiveDate],
        evaluation_script: &str,
    ) -> EngineResult<ImageryBatch> {
        let parcel_lock = self.parcel_lock(parcel_id).await;
        let _guard = parcel_lock.lock().await;

        let stored: BTreeSet<NaiveDate> =
            self.store.stored_dates(parcel_id).await?.into_iter().collect();
        let wanted: BTreeSet<NaiveDate> = dates.iter().copied().collect();

        let mut batch = ImageryBatch {
            already_stored: wanted.intersection(&stored).count(),
            ..ImageryBatch::default()
        };

        let missing: Vec<NaiveDate> = wanted.difference(&stored).copied().collect();
        if missing.is_empty() {
            debug!(parcel_id = %parcel_id, "All requested imagery already stored");
            return Ok(batch);
        }

        let fetches = missing.iter().map(|&date| {
            let source = Arc::clone(&self.source);
            async move { (date, source.fetch_image(parcel_id, date, evaluation_script).await) }
        });
        for (date, fetched) in futures::future::join_all(fetches).await {
            match fetched {
                Ok(image) => {
                    self.store.save_image(&image).await?;
                    batch.fetched.push(image);
                }
                Err(e) => {
                    warn!(parcel_id = %parcel_id, %date, error = %e, "Image fetch failed");
                    batch.failures.push((date, e.to_string()));
                }
            }
        }

        debug!(
            parcel_id = %parcel_id,
            fetched = batch.fetched.len(),
            already_stored = batch.already_stored,
            failures = batch.failures.len(),
            "Imagery acquisition pass complete"
        );
        Ok(batch)
    }

    async fn parcel_lock(&self, parcel_id: Uuid) -> Arc<Mutex<()>> {
        Arc::clone(
            self.locks
                .lock()
                .await
                .entry(parcel_id)
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }
}
