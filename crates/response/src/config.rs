//! Dispatcher Configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use water_model::{ChannelKind, Severity};

/// Response dispatcher settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseConfig {
    /// Search radius for isolation valves around the leak (km)
    pub isolation_radius_km: f64,
    /// Channels attempted for every notification, in order
    pub channel_priority: Vec<ChannelKind>,
    /// Per-channel delivery timeout
    pub channel_timeout_ms: u64,
    /// Per-attempt valve acknowledgement timeout
    pub valve_timeout_ms: u64,
    /// Close attempts per valve before giving up
    pub valve_max_attempts: u32,
    /// Backoff unit between valve attempts, multiplied by the attempt number
    pub valve_retry_backoff_ms: u64,
    /// Unacknowledged time before a case is re-notified
    pub escalation_timeout_secs: u64,
    /// Severities whose cases are escalated
    pub escalate_severities: Vec<Severity>,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            isolation_radius_km: 2.0,
            channel_priority: vec![ChannelKind::Chat, ChannelKind::Email, ChannelKind::Sms],
            channel_timeout_ms: 8000,
            valve_timeout_ms: 5000,
            valve_max_attempts: 3,
            valve_retry_backoff_ms: 500,
            escalation_timeout_secs: 900,
            escalate_severities: vec![Severity::Major, Severity::Critical],
        }
    }
}

impl ResponseConfig {
    pub fn channel_timeout(&self) -> Duration {
        Duration::from_millis(self.channel_timeout_ms)
    }

    pub fn valve_timeout(&self) -> Duration {
        Duration::from_millis(self.valve_timeout_ms)
    }

    pub fn escalation_timeout(&self) -> chrono::Duration {
        // Capped at a year to stay inside chrono's range
        let secs = self.escalation_timeout_secs.min(365 * 24 * 3600);
        chrono::Duration::seconds(secs as i64)
    }

    /// Check ranges; returns the name of the first offending field
    pub fn validate(&self) -> Result<(), String> {
        if !(self.isolation_radius_km.is_finite() && self.isolation_radius_km > 0.0) {
            return Err("response.isolation_radius_km must be > 0".to_string());
        }
        if self.channel_priority.is_empty() {
            return Err("response.channel_priority must not be empty".to_string());
        }
        if self.channel_timeout_ms == 0 || self.valve_timeout_ms == 0 {
            return Err("response timeouts must be > 0".to_string());
        }
        if self.valve_max_attempts == 0 {
            return Err("response.valve_max_attempts must be >= 1".to_string());
        }
        if self.escalation_timeout_secs == 0 {
            return Err("response.escalation_timeout_secs must be > 0".to_string());
        }
        Ok(())
    }
}
