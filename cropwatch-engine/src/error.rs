//! Error types for the agronomic processing core
//!
//! The taxonomy distinguishes caller-fixable input problems from retryable
//! upstream outages. Crop-unidentifiable outcomes are deliberately *not*
//! errors: the cycle detector returns a valid low-information result and the
//! orchestrator short-circuits on it.

use thiserror::Error;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine error taxonomy
#[derive(Debug, Error)]
pub enum EngineError {
    /// Fewer than the minimum usable observations after cleaning.
    /// Fixable by the caller (widen the window, fix the source); not retried.
    #[error("Empty series: {remaining} usable points after cleaning (minimum {minimum})")]
    EmptySeries { remaining: usize, minimum: usize },

    /// Malformed input (non-finite values, inverted windows, bad geometry keys)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Upstream data source down or unreachable. Retried with backoff by the
    /// queue; surfaces as pipeline ERROR status when exhausted.
    /// (`upstream` rather than `source` so thiserror does not treat the
    /// field as the error's cause chain.)
    #[error("Data unavailable from {upstream}: {message}")]
    DataUnavailable { upstream: String, message: String },

    /// Generative-AI agent call failed (network, parse, timeout). Always
    /// converted into a degraded validation outcome, never fatal.
    #[error("Agent error: {0}")]
    Agent(String),

    /// Common crate error
    #[error("Common error: {0}")]
    Common(#[from] cropwatch_common::Error),

    /// Unexpected internal failure
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Whether a retry with backoff can plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::DataUnavailable { .. } | EngineError::Agent(_))
    }
}
