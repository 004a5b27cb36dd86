//! Detection Error Types

use thiserror::Error;
use water_model::SensorKind;

/// Reasons a reading cannot be analyzed. Recovered into a flagged result.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SensorError {
    /// Sensor kind has no leak model
    #[error("Unsupported sensor type: {0}")]
    UnsupportedType(SensorKind),

    /// Neither the reading nor the registry provides a usable baseline
    #[error("Missing baseline for sensor {0}")]
    MissingBaseline(String),

    /// Reading kind disagrees with the registered sensor
    #[error("Reading kind {reading} does not match sensor kind {sensor}")]
    KindMismatch { reading: SensorKind, sensor: SensorKind },

    /// Reading value is NaN or infinite
    #[error("Non-finite reading value: {0}")]
    NonFiniteValue(f64),
}

/// Invalid detector configuration
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ThresholdError {
    #[error("{name} thresholds must be positive and strictly decreasing from critical to minor")]
    Unordered { name: &'static str },

    #[error("{name} probabilities must lie in [0, 1] and not decrease with severity")]
    InvalidProbabilities { name: &'static str },

    #[error("{field} must be {expected}, got {value}")]
    OutOfRange {
        field: &'static str,
        expected: &'static str,
        value: f64,
    },
}
