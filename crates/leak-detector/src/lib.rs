//! Leak Detection
//!
//! Maps a pressure or flow reading (plus recent history) to a classified
//! leak analysis: severity tier, leak probability, loss estimate and the
//! evidence behind it. Pure and deterministic.

mod detector;
mod error;
mod thresholds;

pub use detector::LeakDetector;
pub use error::{SensorError, ThresholdError};
pub use thresholds::{DetectorConfig, SeverityThresholds, TierProbabilities};
