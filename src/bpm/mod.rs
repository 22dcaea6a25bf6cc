pub mod detector;
pub mod utils;

pub use detector::{TempoAnalysis, TempoEstimate, TempoEstimator, estimate_tempo};
