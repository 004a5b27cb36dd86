//! Telemetry Error Types

use thiserror::Error;
use water_model::SensorKind;

/// Errors that can occur while fetching a reading
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Sensor did not answer
    #[error("Sensor {0} is offline")]
    SensorOffline(String),

    /// Gateway or transport failure
    #[error("Gateway error for sensor {sensor}: {message}")]
    Gateway { sensor: String, message: String },

    /// The reading could not be produced for this sensor type
    #[error("Sensor type {0:?} cannot be simulated")]
    UnsupportedKind(SensorKind),
}
