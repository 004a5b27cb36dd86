//! Emergency Case Records

use crate::reading::Severity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Notification channel, in the order channels are usually prioritized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Chat,
    Email,
    Sms,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Chat => "chat",
            ChannelKind::Email => "email",
            ChannelKind::Sms => "sms",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one notification attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationResult {
    pub channel: ChannelKind,
    pub recipient: Option<String>,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub error: Option<String>,
}

/// Outcome of closing one valve, after retries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValveCloseResult {
    pub valve_id: String,
    pub distance_km: f64,
    pub success: bool,
    pub attempts: u32,
    pub timestamp: DateTime<Utc>,
    pub error: Option<String>,
}

/// Lifecycle of an emergency case; `Resolved` is only set externally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseStatus {
    Created,
    Dispatched,
    Resolved,
}

impl CaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseStatus::Created => "created",
            CaseStatus::Dispatched => "dispatched",
            CaseStatus::Resolved => "resolved",
        }
    }
}

/// Response record created once per dispatched alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyCase {
    pub alert_id: String,
    pub sensor_id: String,
    pub severity: Severity,
    pub assigned_team_id: String,
    pub assigned_team_name: String,
    /// Distance from the team base to the alert location
    pub distance_km: f64,
    pub estimated_eta_minutes: f64,
    pub isolation_attempted: bool,
    /// Valves confirmed closed
    pub isolated_valve_ids: Vec<String>,
    pub valve_results: Vec<ValveCloseResult>,
    pub manual_action_required: bool,
    pub isolation_note: Option<String>,
    pub notification_results: Vec<NotificationResult>,
    pub all_channels_failed: bool,
    pub status: CaseStatus,
    pub created_at: DateTime<Utc>,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub escalation_count: u32,
    pub last_escalated_at: Option<DateTime<Utc>>,
}

impl EmergencyCase {
    /// Number of channels that delivered the message
    pub fn notifications_delivered(&self) -> usize {
        self.notification_results.iter().filter(|r| r.success).count()
    }

    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged_at.is_some()
    }
}
