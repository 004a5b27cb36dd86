//! Leak Alert Record

use crate::geo::GeoPoint;
use crate::reading::Severity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Active,
    Resolved,
}

/// A persistent, deduplicated leak alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// `LEAK_<sensor>_<unix seconds>`
    pub id: String,
    pub sensor_id: String,
    pub location: GeoPoint,
    pub severity: Severity,
    /// Estimated loss in litres per minute
    pub estimated_loss_lpm: f64,
    pub confidence: f64,
    pub description: String,
    pub recommended_actions: Vec<String>,
    pub detection_time: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: AlertStatus,
    /// Dispatch failed fatally; needs manual follow-up
    #[serde(default)]
    pub undispatched: bool,
}

impl Alert {
    /// Deterministic alert id for a sensor and detection time
    pub fn make_id(sensor_id: &str, detection_time: DateTime<Utc>) -> String {
        format!("LEAK_{}_{}", sensor_id, detection_time.timestamp())
    }

    pub fn is_active(&self) -> bool {
        self.status == AlertStatus::Active
    }
}
