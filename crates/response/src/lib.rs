//! Emergency Response
//!
//! Dispatches the nearest field crew to a leak alert, isolates the pipe
//! section through remote valves, and notifies the crew over redundant
//! channels, escalating cases nobody acknowledges.

mod channel;
mod config;
mod dispatcher;
mod error;
mod message;
mod valve;

pub use channel::{
    EmailChannel, LogChannel, NotificationChannel, ScriptedChannel, WebhookChannel,
};
pub use config::ResponseConfig;
pub use dispatcher::ResponseDispatcher;
pub use error::{DispatchError, NotifyError, ValveError};
pub use message::{emergency_message, escalation_message, truncate_sms, Assignment, SMS_MAX_CHARS};
pub use valve::{SimulatedValveController, ValveAck, ValveController};
