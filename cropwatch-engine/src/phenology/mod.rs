//! Crop-cycle (phenology) detection

mod cycle_detector;
mod regime;

pub use cycle_detector::CycleDetector;
pub use regime::classify_regime;
