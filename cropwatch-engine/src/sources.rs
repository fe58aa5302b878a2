//! External data-source interfaces
//!
//! The core consumes upstream systems through these narrow seams; the owning
//! collaborators (persistence, HTTP clients for index/weather providers)
//! live outside this crate. Upstream JSON is parsed into the typed structs
//! below at the boundary; no untyped blobs reach the detector or estimator.

use crate::error::EngineResult;
use crate::types::{PipelineResult, RadarObservation, RawObservation};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Environmental daily records
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DailyTemperature {
    pub date: NaiveDate,
    pub mean_temp_c: f64,
}

/// Positive deficit means evapotranspiration demand exceeded supply
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DailyWaterBalance {
    pub date: NaiveDate,
    pub deficit_mm: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DailyPrecipitation {
    pub date: NaiveDate,
    pub precipitation_mm: f64,
}

/// A rendered satellite image for one date
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SatelliteImage {
    pub parcel_id: Uuid,
    pub date: NaiveDate,
    /// Rendering recipe used by the imagery provider
    pub evaluation_script: String,
    pub png_bytes: Vec<u8>,
}

// ============================================================================
// Source traits
// ============================================================================

/// Optical vegetation-index series for a parcel and date range
#[async_trait]
pub trait VegetationIndexSource: Send + Sync {
    async fn fetch_index_series(
        &self,
        parcel_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> EngineResult<Vec<RawObservation>>;
}

/// Radar-derived index series for the same parcel and range
#[async_trait]
pub trait RadarIndexSource: Send + Sync {
    async fn fetch_radar_series(
        &self,
        parcel_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> EngineResult<Vec<RadarObservation>>;
}

/// Daily mean temperatures for degree-day accumulation
#[async_trait]
pub trait ThermalSource: Send + Sync {
    async fn fetch_temperatures(
        &self,
        parcel_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> EngineResult<Vec<DailyTemperature>>;
}

/// Daily water-balance deficit
#[async_trait]
pub trait WaterBalanceSource: Send + Sync {
    async fn fetch_water_balance(
        &self,
        parcel_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> EngineResult<Vec<DailyWaterBalance>>;
}

/// Daily precipitation (observed + forecast around harvest)
#[async_trait]
pub trait PrecipitationSource: Send + Sync {
    async fn fetch_precipitation(
        &self,
        parcel_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> EngineResult<Vec<DailyPrecipitation>>;
}

/// Rendered satellite imagery for specific dates
#[async_trait]
pub trait ImagerySource: Send + Sync {
    async fn fetch_image(
        &self,
        parcel_id: Uuid,
        date: NaiveDate,
        evaluation_script: &str,
    ) -> EngineResult<SatelliteImage>;
}

/// Persistent storage for fetched imagery (incremental: already-stored dates
/// are not re-fetched)
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn stored_dates(&self, parcel_id: Uuid) -> EngineResult<Vec<NaiveDate>>;
    async fn save_image(&self, image: &SatelliteImage) -> EngineResult<()>;
}

/// Persistence seam for pipeline results (owned by the storage collaborator)
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn save_result(&self, result: &PipelineResult) -> EngineResult<()>;
}

/// Generative-AI text/JSON completion service used by the agent pair
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> EngineResult<CompletionResponse>;
}

/// One completion call
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    /// Request strict JSON output from the model
    pub json_response: bool,
    pub max_tokens: u32,
}

/// Completion output with metered token usage
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionResponse {
    pub content: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}
