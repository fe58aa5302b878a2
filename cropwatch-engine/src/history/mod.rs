//! Historical season alignment

mod aligner;

pub use aligner::HistoricalAligner;
