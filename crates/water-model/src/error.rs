//! Registry Error Types

use thiserror::Error;

/// Errors raised while building the static catalogs
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    /// An entry with the same id is already registered
    #[error("Duplicate {kind} id: {id}")]
    DuplicateId { kind: &'static str, id: String },

    /// Coordinates outside the valid lat/lon range
    #[error("Invalid location for {id}: ({lat}, {lon})")]
    InvalidLocation { id: String, lat: f64, lon: f64 },

    /// A required numeric attribute is not positive
    #[error("{field} for {id} must be positive, got {value}")]
    NonPositive {
        id: String,
        field: &'static str,
        value: f64,
    },
}
