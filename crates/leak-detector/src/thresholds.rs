//! Severity Thresholds and Tier Probabilities

use crate::error::ThresholdError;
use serde::{Deserialize, Serialize};
use water_model::Severity;

/// Minimum deviation, in the alarming direction, for each severity tier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeverityThresholds {
    pub critical: f64,
    pub major: f64,
    pub moderate: f64,
    pub minor: f64,
}

impl SeverityThresholds {
    /// Pressure drop thresholds in bar
    pub const PRESSURE: Self = Self {
        critical: 3.0,
        major: 1.5,
        moderate: 0.8,
        minor: 0.3,
    };

    /// Flow increase thresholds in L/s
    pub const FLOW: Self = Self {
        critical: 100.0,
        major: 50.0,
        moderate: 20.0,
        minor: 8.0,
    };

    /// Map a deviation to its tier; below `minor` is normal
    pub fn classify(&self, deviation: f64) -> Severity {
        if deviation >= self.critical {
            Severity::Critical
        } else if deviation >= self.major {
            Severity::Major
        } else if deviation >= self.moderate {
            Severity::Moderate
        } else if deviation >= self.minor {
            Severity::Minor
        } else {
            Severity::Normal
        }
    }

    /// Threshold that opens a tier
    pub fn for_severity(&self, severity: Severity) -> Option<f64> {
        match severity {
            Severity::Normal => None,
            Severity::Minor => Some(self.minor),
            Severity::Moderate => Some(self.moderate),
            Severity::Major => Some(self.major),
            Severity::Critical => Some(self.critical),
        }
    }

    pub fn validate(&self, name: &'static str) -> Result<(), ThresholdError> {
        let ordered = self.minor > 0.0
            && self.moderate > self.minor
            && self.major > self.moderate
            && self.critical > self.major;
        if ordered {
            Ok(())
        } else {
            Err(ThresholdError::Unordered { name })
        }
    }
}

/// Base leak probability assigned to each tier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierProbabilities {
    pub critical: f64,
    pub major: f64,
    pub moderate: f64,
    pub minor: f64,
}

impl TierProbabilities {
    pub const PRESSURE: Self = Self {
        critical: 0.95,
        major: 0.85,
        moderate: 0.65,
        minor: 0.35,
    };

    pub const FLOW: Self = Self {
        critical: 0.92,
        major: 0.82,
        moderate: 0.68,
        minor: 0.40,
    };

    pub fn for_severity(&self, severity: Severity) -> f64 {
        match severity {
            Severity::Normal => 0.0,
            Severity::Minor => self.minor,
            Severity::Moderate => self.moderate,
            Severity::Major => self.major,
            Severity::Critical => self.critical,
        }
    }

    pub fn validate(&self, name: &'static str) -> Result<(), ThresholdError> {
        let values = [self.minor, self.moderate, self.major, self.critical];
        let in_range = values.iter().all(|p| (0.0..=1.0).contains(p));
        let monotonic = values.windows(2).all(|w| w[0] <= w[1]);
        if in_range && monotonic {
            Ok(())
        } else {
            Err(ThresholdError::InvalidProbabilities { name })
        }
    }
}

/// Detector configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Pressure drop thresholds (bar)
    pub pressure_thresholds: SeverityThresholds,
    /// Flow increase thresholds (L/s)
    pub flow_thresholds: SeverityThresholds,
    pub pressure_probabilities: TierProbabilities,
    pub flow_probabilities: TierProbabilities,
    /// Probability multiplier for a sustained falling pressure trend
    pub pressure_trend_factor: f64,
    /// Probability multiplier for a sustained rising flow trend
    pub flow_trend_factor: f64,
    /// Upper bound on a trend-boosted probability
    pub probability_cap: f64,
    /// Minimum history samples for trend analysis
    pub trend_window: usize,
    /// Probability above which a result requires action
    pub action_threshold: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            pressure_thresholds: SeverityThresholds::PRESSURE,
            flow_thresholds: SeverityThresholds::FLOW,
            pressure_probabilities: TierProbabilities::PRESSURE,
            flow_probabilities: TierProbabilities::FLOW,
            pressure_trend_factor: 1.3,
            flow_trend_factor: 1.2,
            probability_cap: 0.99,
            trend_window: 3,
            action_threshold: 0.6,
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<(), ThresholdError> {
        self.pressure_thresholds.validate("pressure")?;
        self.flow_thresholds.validate("flow")?;
        self.pressure_probabilities.validate("pressure")?;
        self.flow_probabilities.validate("flow")?;

        for (field, value) in [
            ("pressure_trend_factor", self.pressure_trend_factor),
            ("flow_trend_factor", self.flow_trend_factor),
        ] {
            if !(value >= 1.0) {
                return Err(ThresholdError::OutOfRange {
                    field,
                    expected: ">= 1.0",
                    value,
                });
            }
        }
        for (field, value) in [
            ("probability_cap", self.probability_cap),
            ("action_threshold", self.action_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ThresholdError::OutOfRange {
                    field,
                    expected: "within [0, 1]",
                    value,
                });
            }
        }
        if self.trend_window < 2 {
            return Err(ThresholdError::OutOfRange {
                field: "trend_window",
                expected: ">= 2",
                value: self.trend_window as f64,
            });
        }
        Ok(())
    }
}
