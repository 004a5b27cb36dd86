//! Service Configuration
//!
//! Settings come from an optional TOML file layered under `LEAKWATCH_*`
//! environment variables; nested keys use `__`, e.g.
//! `LEAKWATCH_RESPONSE__ISOLATION_RADIUS_KM=1.5`.

use alerting::AlertConfig;
use leak_detector::{DetectorConfig, ThresholdError};
use response::ResponseConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Default configuration file, resolved against the working directory
pub const DEFAULT_CONFIG_FILE: &str = "leak-monitor.toml";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid detector configuration: {0}")]
    Detector(#[from] ThresholdError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Case persistence
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// SQLite URL; the in-memory store is used when unset
    pub database_url: Option<String>,
}

/// SMTP relay for crew email; email falls back to the log channel when
/// `host` is unset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpSettings {
    pub host: Option<String>,
    pub port: u16,
    /// Upgrade with STARTTLS; port 465 always uses implicit TLS
    pub starttls: bool,
    pub from: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for SmtpSettings {
    fn default() -> Self {
        Self {
            host: None,
            port: 587,
            starttls: true,
            from: "LeakWatch <leakwatch@localhost>".to_string(),
            username: None,
            password: None,
        }
    }
}

impl SmtpSettings {
    /// Username and password, when both are set
    pub fn credentials(&self) -> Option<(String, String)> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Some((username.clone(), password.clone())),
            _ => None,
        }
    }
}

/// Notification gateways; log channels are used for unset URLs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookSettings {
    pub chat_url: Option<String>,
    pub sms_url: Option<String>,
}

/// Complete service settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub poll_interval_secs: u64,
    pub sensor_timeout_ms: u64,
    pub max_concurrent_polls: usize,
    /// Readings kept per sensor for trend analysis
    pub trend_samples: usize,
    pub detector: DetectorConfig,
    pub alerting: AlertConfig,
    pub response: ResponseConfig,
    pub storage: StorageSettings,
    pub webhooks: WebhookSettings,
    pub smtp: SmtpSettings,
    /// Prometheus listener address; no exporter when unset
    pub metrics_addr: Option<SocketAddr>,
    pub log_format: LogFormat,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            sensor_timeout_ms: 5000,
            max_concurrent_polls: 8,
            trend_samples: 5,
            detector: DetectorConfig::default(),
            alerting: AlertConfig::default(),
            response: ResponseConfig::default(),
            storage: StorageSettings::default(),
            webhooks: WebhookSettings::default(),
            smtp: SmtpSettings::default(),
            metrics_addr: None,
            log_format: LogFormat::default(),
        }
    }
}

impl MonitorSettings {
    /// Load from `path` (optional) and the environment, then validate
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let settings: MonitorSettings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix("LEAKWATCH")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid("poll_interval_secs must be > 0".into()));
        }
        if self.sensor_timeout_ms == 0 {
            return Err(ConfigError::Invalid("sensor_timeout_ms must be > 0".into()));
        }
        if self.max_concurrent_polls == 0 {
            return Err(ConfigError::Invalid("max_concurrent_polls must be > 0".into()));
        }
        if self.smtp.host.is_some() {
            if self.smtp.port == 0 {
                return Err(ConfigError::Invalid("smtp.port must be > 0".into()));
            }
            if self.smtp.from.trim().is_empty() {
                return Err(ConfigError::Invalid("smtp.from must be set".into()));
            }
        }
        self.detector.validate()?;
        self.response.validate().map_err(ConfigError::Invalid)?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn sensor_timeout(&self) -> Duration {
        Duration::from_millis(self.sensor_timeout_ms)
    }

    /// Log the effective configuration once at startup
    pub fn log_settings(&self) {
        info!("Poll interval: {}s", self.poll_interval_secs);
        info!(
            "Sensor timeout: {}ms, max concurrent polls: {}",
            self.sensor_timeout_ms, self.max_concurrent_polls
        );
        info!("Trend samples: {}", self.trend_samples);
        info!(
            "Action threshold: {}, isolation radius: {} km",
            self.detector.action_threshold, self.response.isolation_radius_km
        );
        info!(
            "Channels: {:?} (timeout {}ms), escalation after {}s",
            self.response.channel_priority,
            self.response.channel_timeout_ms,
            self.response.escalation_timeout_secs
        );
        match &self.storage.database_url {
            Some(url) => info!("Case store: {}", url),
            None => info!("Case store: in-memory"),
        }
        match &self.smtp.host {
            Some(host) => info!("SMTP relay: {}:{} as {}", host, self.smtp.port, self.smtp.from),
            None => info!("SMTP relay: none, email is logged only"),
        }
        if let Some(addr) = self.metrics_addr {
            info!("Metrics exporter: {}", addr);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use water_model::{ChannelKind, Severity};

    fn write_config(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("{}-{}.toml", name, std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_defaults() {
        let settings = MonitorSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.poll_interval(), Duration::from_secs(60));
        assert_eq!(settings.trend_samples, 5);
        assert_eq!(settings.log_format, LogFormat::Pretty);
        assert!(settings.storage.database_url.is_none());
        assert!(settings.smtp.host.is_none());
        assert_eq!(settings.smtp.port, 587);
    }

    #[test]
    fn test_smtp_section() {
        let path = write_config(
            "leakwatch-smtp",
            r#"
[smtp]
host = "smtp.aya.example"
port = 465
from = "alerts@aya.example"
username = "monitor"
password = "hunter2"
"#,
        );
        let settings = MonitorSettings::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(settings.smtp.host.as_deref(), Some("smtp.aya.example"));
        assert_eq!(settings.smtp.port, 465);
        assert!(settings.smtp.starttls);
        assert_eq!(
            settings.smtp.credentials(),
            Some(("monitor".to_string(), "hunter2".to_string()))
        );

        let missing_password = SmtpSettings {
            password: None,
            ..settings.smtp.clone()
        };
        assert!(missing_password.credentials().is_none());

        let invalid = MonitorSettings {
            smtp: SmtpSettings {
                from: " ".to_string(),
                ..settings.smtp
            },
            ..MonitorSettings::default()
        };
        assert!(matches!(invalid.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let path = std::env::temp_dir().join("leakwatch-does-not-exist.toml");
        let settings = MonitorSettings::load(&path).unwrap();
        assert_eq!(settings.response.isolation_radius_km, 2.0);
    }

    #[test]
    fn test_file_overrides_nested_sections() {
        let path = write_config(
            "leakwatch-nested",
            r#"
poll_interval_secs = 30
log_format = "json"

[response]
isolation_radius_km = 1.5
channel_priority = ["sms", "email"]
escalate_severities = ["critical"]

[detector]
action_threshold = 0.7

[alerting.recommendations]
critical = ["Close the main valve"]
"#,
        );
        let settings = MonitorSettings::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(settings.poll_interval_secs, 30);
        assert_eq!(settings.log_format, LogFormat::Json);
        assert_eq!(settings.response.isolation_radius_km, 1.5);
        assert_eq!(
            settings.response.channel_priority,
            vec![ChannelKind::Sms, ChannelKind::Email]
        );
        assert_eq!(settings.response.escalate_severities, vec![Severity::Critical]);
        // Unset fields in a section keep their defaults
        assert_eq!(settings.response.channel_timeout_ms, 8000);
        assert_eq!(settings.detector.action_threshold, 0.7);
        assert_eq!(
            settings.alerting.recommendations.for_severity(Severity::Critical),
            ["Close the main valve".to_string()]
        );
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let path = write_config(
            "leakwatch-invalid",
            "[response]\nisolation_radius_km = 0.0\n",
        );
        let result = MonitorSettings::load(&path);
        std::fs::remove_file(&path).ok();
        assert!(matches!(result, Err(ConfigError::Invalid(_))));

        let settings = MonitorSettings {
            poll_interval_secs: 0,
            ..MonitorSettings::default()
        };
        assert!(settings.validate().is_err());
    }
}
