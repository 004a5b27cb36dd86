//! Leak Scenario Injection

use crate::error::TelemetryError;
use chrono::Utc;
use water_model::{Reading, SensorKind, Severity, WaterSensor};

/// Field signature of a leak of a given severity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeakScenario {
    /// Pressure drop below baseline (bar)
    pub pressure_drop_bar: f64,
    /// Flow increase above baseline (L/s)
    pub flow_increase_lps: f64,
    /// Typical water loss for this class of leak (L/min)
    pub loss_rate_lpm: f64,
}

impl LeakScenario {
    /// Scenario parameters for a severity tier; `None` for normal
    pub fn for_severity(severity: Severity) -> Option<Self> {
        let (pressure_drop_bar, flow_increase_lps, loss_rate_lpm) = match severity {
            Severity::Normal => return None,
            Severity::Minor => (0.5, 15.0, 25.0),
            Severity::Moderate => (1.2, 35.0, 85.0),
            Severity::Major => (2.5, 75.0, 250.0),
            Severity::Critical => (4.0, 150.0, 600.0),
        };
        Some(Self {
            pressure_drop_bar,
            flow_increase_lps,
            loss_rate_lpm,
        })
    }

    /// Apply the scenario to a baseline value of the given sensor type
    pub fn apply(&self, kind: SensorKind, baseline: f64) -> Result<f64, TelemetryError> {
        match kind {
            SensorKind::Pressure => Ok((baseline - self.pressure_drop_bar).max(0.0)),
            SensorKind::Flow => Ok(baseline + self.flow_increase_lps),
            other => Err(TelemetryError::UnsupportedKind(other)),
        }
    }
}

/// Build the reading a sensor would report during a leak of `severity`.
///
/// A normal severity yields the baseline reading.
pub fn simulate_leak_scenario(
    sensor: &WaterSensor,
    severity: Severity,
) -> Result<Reading, TelemetryError> {
    let current_value = match LeakScenario::for_severity(severity) {
        Some(scenario) => scenario.apply(sensor.kind, sensor.baseline_value)?,
        None => match sensor.kind {
            SensorKind::Pressure | SensorKind::Flow => sensor.baseline_value,
            other => return Err(TelemetryError::UnsupportedKind(other)),
        },
    };

    Ok(Reading {
        sensor_id: sensor.id.clone(),
        timestamp: Utc::now(),
        kind: sensor.kind,
        current_value,
        baseline_value: Some(sensor.baseline_value),
    })
}
