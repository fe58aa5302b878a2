//! Optical/radar sensor fusion

mod calibration;
mod engine;

pub use calibration::{fit_calibration, pair_samples};
pub use engine::{FusionOutcome, SensorFusionEngine};
