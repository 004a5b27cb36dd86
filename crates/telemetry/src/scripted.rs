//! Scripted Telemetry
//!
//! Deterministic per-sensor queues of readings, failures and delays.
//! Sensors with an empty queue report their registered baseline.

use crate::error::TelemetryError;
use crate::TelemetrySource;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;
use water_model::{Reading, WaterSensor};

#[derive(Debug, Clone)]
enum Outcome {
    Value(f64),
    Reading(Reading),
    Fail(String),
}

#[derive(Debug, Clone)]
struct Step {
    delay: Option<Duration>,
    outcome: Outcome,
}

#[derive(Debug, Default)]
struct Script {
    queues: HashMap<String, VecDeque<Step>>,
    calls: HashMap<String, usize>,
}

/// Telemetry double that replays queued values per sensor
#[derive(Debug, Default)]
pub struct ScriptedSource {
    script: Mutex<Script>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, sensor_id: &str, step: Step) {
        if let Ok(mut script) = self.script.lock() {
            script
                .queues
                .entry(sensor_id.to_string())
                .or_default()
                .push_back(step);
        }
    }

    /// Queue a value; the sensor's baseline is attached to the reading
    pub fn push_value(&self, sensor_id: &str, value: f64) -> &Self {
        self.push(
            sensor_id,
            Step {
                delay: None,
                outcome: Outcome::Value(value),
            },
        );
        self
    }

    /// Queue several values in order
    pub fn push_values(&self, sensor_id: &str, values: impl IntoIterator<Item = f64>) -> &Self {
        for value in values {
            self.push_value(sensor_id, value);
        }
        self
    }

    /// Queue a fully specified reading, returned as is
    pub fn push_reading(&self, reading: Reading) -> &Self {
        let sensor_id = reading.sensor_id.clone();
        self.push(
            &sensor_id,
            Step {
                delay: None,
                outcome: Outcome::Reading(reading),
            },
        );
        self
    }

    /// Queue a failure
    pub fn push_error(&self, sensor_id: &str, message: &str) -> &Self {
        self.push(
            sensor_id,
            Step {
                delay: None,
                outcome: Outcome::Fail(message.to_string()),
            },
        );
        self
    }

    /// Queue a value that is only returned after `delay`
    pub fn push_delayed(&self, sensor_id: &str, delay: Duration, value: f64) -> &Self {
        self.push(
            sensor_id,
            Step {
                delay: Some(delay),
                outcome: Outcome::Value(value),
            },
        );
        self
    }

    /// Number of readings requested for a sensor so far
    pub fn calls(&self, sensor_id: &str) -> usize {
        self.script
            .lock()
            .map(|script| script.calls.get(sensor_id).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    fn next_step(&self, sensor_id: &str) -> Option<Step> {
        let mut script = self.script.lock().ok()?;
        *script.calls.entry(sensor_id.to_string()).or_insert(0) += 1;
        let step = script.queues.get_mut(sensor_id).and_then(VecDeque::pop_front);
        step
    }
}

#[async_trait]
impl TelemetrySource for ScriptedSource {
    async fn get_reading(&self, sensor: &WaterSensor) -> Result<Reading, TelemetryError> {
        let Some(step) = self.next_step(&sensor.id) else {
            return Ok(Reading::new(
                sensor.id.as_str(),
                sensor.kind,
                sensor.baseline_value,
                Some(sensor.baseline_value),
            ));
        };

        if let Some(delay) = step.delay {
            debug!("Delaying scripted reading for {} by {:?}", sensor.id, delay);
            tokio::time::sleep(delay).await;
        }

        match step.outcome {
            Outcome::Value(value) => Ok(Reading {
                sensor_id: sensor.id.clone(),
                timestamp: Utc::now(),
                kind: sensor.kind,
                current_value: value,
                baseline_value: Some(sensor.baseline_value),
            }),
            Outcome::Reading(reading) => Ok(reading),
            Outcome::Fail(message) => Err(TelemetryError::Gateway {
                sensor: sensor.id.clone(),
                message,
            }),
        }
    }
}
