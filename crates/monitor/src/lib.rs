//! Leak Monitoring Service
//!
//! Wires telemetry, leak detection, alerting and emergency response into
//! a periodic polling loop, with layered configuration and logging for
//! the `leak-monitor` binary.

mod logging;
mod monitor;
mod settings;
mod status;

pub use logging::init_logging;
pub use monitor::Monitor;
pub use settings::{
    ConfigError, LogFormat, MonitorSettings, SmtpSettings, StorageSettings, WebhookSettings,
    DEFAULT_CONFIG_FILE,
};
pub use status::{CycleReport, SystemStatus, MINUTES_PER_DAY};
