//! Response Error Types

use thiserror::Error;

/// Errors from a valve controller
#[derive(Debug, Error)]
pub enum ValveError {
    /// Controller could not reach the actuator
    #[error("Valve {0} unreachable")]
    Unreachable(String),

    /// Actuator answered but did not close
    #[error("Valve {0} failed to close")]
    Jammed(String),

    /// No acknowledgement within the per-attempt timeout
    #[error("Valve {valve} did not acknowledge within {ms}ms")]
    Timeout { valve: String, ms: u64 },
}

/// Errors from a notification channel
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// SMTP server refused or dropped the message
    #[error("SMTP delivery failed: {0}")]
    Smtp(String),

    /// Sender or recipient is not a valid mailbox
    #[error("Invalid email address: {0}")]
    Address(String),

    /// Gateway answered with a non-success status
    #[error("Gateway returned {status}: {body}")]
    Rejected { status: u16, body: String },

    /// The team has no address for this channel
    #[error("No {0} contact for the assigned team")]
    NoRecipient(String),

    /// The channel is in the priority list but no sender is configured
    #[error("Channel {0} is not configured")]
    NotConfigured(String),

    #[error("Delivery timed out after {0}ms")]
    Timeout(u64),

    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// Errors from the response dispatcher
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No crew can be assigned; the alert stays undispatched
    #[error("No response team available for alert {0}")]
    NoResponseTeam(String),

    /// Another dispatch for the same alert is still running
    #[error("Dispatch for alert {0} already in progress")]
    InProgress(String),

    /// No case exists for the alert
    #[error("No emergency case for alert {0}")]
    UnknownCase(String),
}
