//! Status Snapshots

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use water_model::{Authority, SensorKind, Severity};

/// Minutes per day, for daily loss projection
pub const MINUTES_PER_DAY: f64 = 1440.0;

/// Point-in-time view of the monitored network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStatus {
    /// Whether the polling loop is running
    pub monitoring: bool,
    pub total_sensors: usize,
    pub sensor_breakdown: BTreeMap<SensorKind, usize>,
    pub active_alerts: usize,
    /// Active alerts per alarm tier, every tier present
    pub severity_breakdown: BTreeMap<Severity, usize>,
    pub total_estimated_loss_lpm: f64,
    pub estimated_daily_loss_liters: f64,
    pub coverage_by_authority: BTreeMap<Authority, usize>,
    pub open_cases: usize,
    pub cycles_completed: u64,
    pub last_update: Option<DateTime<Utc>>,
}

/// Counters for one polling cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    /// 1-based cycle number
    pub cycle: u64,
    pub sensors_polled: usize,
    pub readings_analyzed: usize,
    /// Sensors whose reading could not be fetched, in registration order
    pub failed_sensors: Vec<String>,
    /// Readings the analyzer rejected (unsupported type, missing baseline)
    pub analysis_errors: usize,
    pub alerts_created: usize,
    pub alerts_updated: usize,
    pub cases_dispatched: usize,
    pub undispatched: usize,
    /// Dispatches not started because shutdown was requested
    pub dispatches_skipped: usize,
    pub escalations: usize,
}
