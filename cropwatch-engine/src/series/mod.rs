//! Time-series cleaning and normalization

mod normalizer;

pub use normalizer::SeriesNormalizer;
