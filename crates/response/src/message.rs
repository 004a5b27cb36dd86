//! Emergency Message Formatting

use chrono::{DateTime, Utc};
use water_model::{Alert, EmergencyCase, ResponseTeam};

/// Maximum length of an SMS body, in characters
pub const SMS_MAX_CHARS: usize = 160;

/// Crew assignment details quoted in a message
#[derive(Debug, Clone, Copy)]
pub struct Assignment<'a> {
    pub team: &'a ResponseTeam,
    pub distance_km: f64,
    pub eta_minutes: f64,
}

/// Render the notification sent to the assigned crew
pub fn emergency_message(alert: &Alert, assignment: &Assignment<'_>) -> String {
    let location = alert.location;
    let lines = [
        format!("LEAK ALERT {}", alert.id),
        format!("Location: {:.6}, {:.6}", location.lat, location.lon),
        format!("Map: {}", location.map_link()),
        format!("Severity: {}", alert.severity.as_str().to_uppercase()),
        format!("Estimated loss: {:.0} L/min", alert.estimated_loss_lpm),
        format!("Confidence: {:.0}%", alert.confidence * 100.0),
        format!(
            "Detected: {}",
            alert.detection_time.format("%Y-%m-%d %H:%M:%S UTC")
        ),
        format!("Assigned team: {}", assignment.team.name),
        format!("Distance: {:.1} km", assignment.distance_km),
        format!("ETA: {:.0} min", assignment.eta_minutes),
        format!("Reply RECEIVED {} to acknowledge", alert.id),
    ];
    lines.join("\n")
}

/// Prefix an original message with an escalation header
pub fn escalation_message(case: &EmergencyCase, original: &str, now: DateTime<Utc>) -> String {
    let since = case.dispatched_at.unwrap_or(case.created_at);
    let waiting = (now - since).num_minutes().max(0);
    format!(
        "ESCALATION #{}: alert {} ({}) unacknowledged for {} min\n{}",
        case.escalation_count + 1,
        case.alert_id,
        case.severity.as_str(),
        waiting,
        original
    )
}

/// Truncate to the SMS limit on a character boundary
pub fn truncate_sms(message: &str) -> String {
    message.chars().take(SMS_MAX_CHARS).collect()
}
