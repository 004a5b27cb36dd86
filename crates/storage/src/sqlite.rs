//! SQLite Backend
//!
//! Cases and alerts are stored as JSON payloads keyed by alert id, with the
//! columns needed for filtering and ordering kept alongside.

use crate::{CaseStore, StorageError};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{debug, info};
use water_model::{Alert, CaseStatus, EmergencyCase};

const SCHEMA: [&str; 3] = [
    "CREATE TABLE IF NOT EXISTS emergency_cases (
        alert_id   TEXT PRIMARY KEY,
        status     TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        payload    TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_cases_status ON emergency_cases (status, created_at)",
    "CREATE TABLE IF NOT EXISTS leak_alerts (
        alert_id  TEXT PRIMARY KEY,
        sensor_id TEXT NOT NULL,
        status    TEXT NOT NULL,
        payload   TEXT NOT NULL
    )",
];

/// SQLite-backed case store
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `url` and apply the schema.
    ///
    /// `sqlite::memory:` is supported; the pool then pins a single
    /// connection so the database lives as long as the store.
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let in_memory = url.contains(":memory:");

        let mut pool_options = SqlitePoolOptions::new();
        if in_memory {
            pool_options = pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        } else {
            pool_options = pool_options.max_connections(5);
        }
        let pool = pool_options.connect_with(options).await?;

        let store = Self { pool };
        store.migrate().await?;
        info!("SQLite case store ready at {}", url);
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StorageError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

fn alert_status(alert: &Alert) -> &'static str {
    if alert.is_active() {
        "active"
    } else {
        "resolved"
    }
}

#[async_trait]
impl CaseStore for SqliteStore {
    async fn save_case(&self, case: &EmergencyCase) -> Result<(), StorageError> {
        let payload = serde_json::to_string(case)?;
        sqlx::query(
            "INSERT INTO emergency_cases (alert_id, status, created_at, payload)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(alert_id) DO UPDATE SET
                status = excluded.status,
                payload = excluded.payload",
        )
        .bind(case.alert_id.as_str())
        .bind(case.status.as_str())
        .bind(case.created_at.timestamp_millis())
        .bind(payload)
        .execute(&self.pool)
        .await?;

        debug!("Saved case {} ({})", case.alert_id, case.status.as_str());
        Ok(())
    }

    async fn load_case(&self, alert_id: &str) -> Result<Option<EmergencyCase>, StorageError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT payload FROM emergency_cases WHERE alert_id = ?")
                .bind(alert_id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(|(payload,)| serde_json::from_str(&payload).map_err(StorageError::from))
            .transpose()
    }

    async fn list_cases(
        &self,
        status: Option<CaseStatus>,
        limit: usize,
    ) -> Result<Vec<EmergencyCase>, StorageError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<(String,)> = match status {
            Some(status) => {
                sqlx::query_as(
                    "SELECT payload FROM emergency_cases WHERE status = ?
                     ORDER BY created_at DESC, rowid DESC LIMIT ?",
                )
                .bind(status.as_str())
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    "SELECT payload FROM emergency_cases
                     ORDER BY created_at DESC, rowid DESC LIMIT ?",
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter()
            .map(|(payload,)| serde_json::from_str(&payload).map_err(StorageError::from))
            .collect()
    }

    async fn save_alert(&self, alert: &Alert) -> Result<(), StorageError> {
        let payload = serde_json::to_string(alert)?;
        sqlx::query(
            "INSERT INTO leak_alerts (alert_id, sensor_id, status, payload)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(alert_id) DO UPDATE SET
                status = excluded.status,
                payload = excluded.payload",
        )
        .bind(alert.id.as_str())
        .bind(alert.sensor_id.as_str())
        .bind(alert_status(alert))
        .bind(payload)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_alert(&self, alert_id: &str) -> Result<Option<Alert>, StorageError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT payload FROM leak_alerts WHERE alert_id = ?")
                .bind(alert_id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(|(payload,)| serde_json::from_str(&payload).map_err(StorageError::from))
            .transpose()
    }

    async fn case_count(&self) -> Result<usize, StorageError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM emergency_cases")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as usize)
    }
}
