//! Storage Layer
//!
//! Persists leak alerts and emergency cases behind the [`CaseStore`]
//! trait, with an in-memory repository and a SQLite backend.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use thiserror::Error;
use water_model::{Alert, CaseStatus, EmergencyCase};

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        StorageError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::SerializationError(err.to_string())
    }
}

/// Persistence for alerts and emergency cases. Saves are upserts keyed by id.
#[async_trait]
pub trait CaseStore: Send + Sync {
    /// Insert or replace a case, keyed by alert id
    async fn save_case(&self, case: &EmergencyCase) -> Result<(), StorageError>;

    async fn load_case(&self, alert_id: &str) -> Result<Option<EmergencyCase>, StorageError>;

    /// Most recently created cases first, optionally filtered by status
    async fn list_cases(
        &self,
        status: Option<CaseStatus>,
        limit: usize,
    ) -> Result<Vec<EmergencyCase>, StorageError>;

    /// Insert or replace an alert, keyed by alert id
    async fn save_alert(&self, alert: &Alert) -> Result<(), StorageError>;

    async fn load_alert(&self, alert_id: &str) -> Result<Option<Alert>, StorageError>;

    async fn case_count(&self) -> Result<usize, StorageError>;
}
