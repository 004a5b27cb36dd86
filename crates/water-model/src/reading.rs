//! Readings and Analysis Results

use crate::sensor::SensorKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single telemetry sample, produced once per poll
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub sensor_id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: SensorKind,
    pub current_value: f64,
    /// Baseline reported by the gateway, if any
    #[serde(default)]
    pub baseline_value: Option<f64>,
}

impl Reading {
    pub fn new(
        sensor_id: impl Into<String>,
        kind: SensorKind,
        current_value: f64,
        baseline_value: Option<f64>,
    ) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            timestamp: Utc::now(),
            kind,
            current_value,
            baseline_value,
        }
    }
}

/// Leak severity tier, ordered from least to most severe
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Normal,
    Minor,
    Moderate,
    Major,
    Critical,
}

impl Severity {
    /// Alarm tiers, most severe first
    pub const TIERS: [Severity; 4] = [
        Severity::Critical,
        Severity::Major,
        Severity::Moderate,
        Severity::Minor,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Normal => "normal",
            Severity::Minor => "minor",
            Severity::Moderate => "moderate",
            Severity::Major => "major",
            Severity::Critical => "critical",
        }
    }

    /// Whether automatic valve isolation applies
    pub fn warrants_isolation(&self) -> bool {
        *self >= Severity::Major
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified outcome of analyzing one reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub sensor_id: String,
    /// Probability that the anomaly is a physical leak, in [0, 1]
    pub leak_probability: f64,
    pub severity: Severity,
    pub confidence: f64,
    /// Human-readable evidence that led to the classification
    pub indicators: Vec<String>,
    /// Estimated water loss in litres per minute
    pub estimated_loss_lpm: f64,
    /// Absolute deviation from baseline, as a percentage of baseline
    pub deviation_percent: f64,
    pub requires_action: bool,
    pub timestamp: DateTime<Utc>,
    /// Set when the reading could not be analyzed
    #[serde(default)]
    pub error: Option<String>,
}

impl AnalysisResult {
    /// Neutral result flagged with an analysis error
    pub fn failed(sensor_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            leak_probability: 0.0,
            severity: Severity::Normal,
            confidence: 0.0,
            indicators: Vec::new(),
            estimated_loss_lpm: 0.0,
            deviation_percent: 0.0,
            requires_action: false,
            timestamp: Utc::now(),
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
