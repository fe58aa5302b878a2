//! # Cropwatch Common Library
//!
//! Shared code for the cropwatch workspace:
//! - Common error type
//! - TOML configuration loading
//! - Logging initialization
//! - Agricultural calendar utilities (season years, date projection)

pub mod calendar;
pub mod config;
pub mod error;
pub mod logging;

pub use error::{Error, Result};
