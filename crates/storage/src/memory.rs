//! In-Memory Repository

use crate::{CaseStore, StorageError};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tracing::{debug, info};
use water_model::{Alert, CaseStatus, EmergencyCase};

/// Mutex-protected maps with a retention limit on cases and alerts
pub struct MemoryStore {
    /// Cases by alert id
    cases: Mutex<HashMap<String, EmergencyCase>>,
    /// Case ids in insertion order, for retention
    case_order: Mutex<VecDeque<String>>,
    /// Alerts by alert id
    alerts: Mutex<HashMap<String, Alert>>,
    alert_order: Mutex<VecDeque<String>>,
    /// Max retained records of each kind
    retention: usize,
}

fn lock_error<T>(e: std::sync::PoisonError<T>) -> StorageError {
    StorageError::DatabaseError(format!("Lock error: {}", e))
}

impl MemoryStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self::with_retention(10_000)
    }

    /// Create a store that keeps at most `retention` cases and as many alerts;
    /// the oldest record is dropped first
    pub fn with_retention(retention: usize) -> Self {
        info!("Creating in-memory case store (retention: {})", retention);
        Self {
            cases: Mutex::new(HashMap::new()),
            case_order: Mutex::new(VecDeque::new()),
            alerts: Mutex::new(HashMap::new()),
            alert_order: Mutex::new(VecDeque::new()),
            retention: retention.max(1),
        }
    }

    /// Clear all data (for testing)
    pub fn clear(&self) {
        if let Ok(mut cases) = self.cases.lock() {
            cases.clear();
        }
        if let Ok(mut order) = self.case_order.lock() {
            order.clear();
        }
        if let Ok(mut alerts) = self.alerts.lock() {
            alerts.clear();
        }
        if let Ok(mut order) = self.alert_order.lock() {
            order.clear();
        }
    }
}

/// Upsert `value`, evicting the oldest keys beyond `retention`
fn insert_retained<T>(
    map: &mut HashMap<String, T>,
    order: &mut VecDeque<String>,
    retention: usize,
    key: &str,
    value: T,
) {
    if map.insert(key.to_string(), value).is_none() {
        order.push_back(key.to_string());
        while order.len() > retention {
            if let Some(old) = order.pop_front() {
                map.remove(&old);
            }
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CaseStore for MemoryStore {
    async fn save_case(&self, case: &EmergencyCase) -> Result<(), StorageError> {
        let mut cases = self.cases.lock().map_err(lock_error)?;
        let mut order = self.case_order.lock().map_err(lock_error)?;

        insert_retained(
            &mut cases,
            &mut order,
            self.retention,
            &case.alert_id,
            case.clone(),
        );
        debug!("Saved case {} ({})", case.alert_id, case.status.as_str());
        Ok(())
    }

    async fn load_case(&self, alert_id: &str) -> Result<Option<EmergencyCase>, StorageError> {
        let cases = self.cases.lock().map_err(lock_error)?;
        Ok(cases.get(alert_id).cloned())
    }

    async fn list_cases(
        &self,
        status: Option<CaseStatus>,
        limit: usize,
    ) -> Result<Vec<EmergencyCase>, StorageError> {
        let cases = self.cases.lock().map_err(lock_error)?;
        let order = self.case_order.lock().map_err(lock_error)?;

        Ok(order
            .iter()
            .rev()
            .filter_map(|id| cases.get(id))
            .filter(|c| status.map_or(true, |s| c.status == s))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn save_alert(&self, alert: &Alert) -> Result<(), StorageError> {
        let mut alerts = self.alerts.lock().map_err(lock_error)?;
        let mut order = self.alert_order.lock().map_err(lock_error)?;
        insert_retained(&mut alerts, &mut order, self.retention, &alert.id, alert.clone());
        Ok(())
    }

    async fn load_alert(&self, alert_id: &str) -> Result<Option<Alert>, StorageError> {
        let alerts = self.alerts.lock().map_err(lock_error)?;
        Ok(alerts.get(alert_id).cloned())
    }

    async fn case_count(&self) -> Result<usize, StorageError> {
        Ok(self.cases.lock().map_err(lock_error)?.len())
    }
}
