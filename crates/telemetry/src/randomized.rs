//! Randomized Telemetry
//!
//! Seeded noise around each sensor's baseline with occasional injected
//! leaks. Demo use only: the same seed replays the same sequence for the
//! same polling order.

use crate::error::TelemetryError;
use crate::TelemetrySource;
use async_trait::async_trait;
use chrono::Utc;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::Mutex;
use tracing::debug;
use water_model::{Reading, SensorKind, WaterSensor};

/// Probability and magnitude of injected leaks per sensor type
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeakInjection {
    /// Chance per pressure reading of an injected drop
    pub pressure_rate: f64,
    /// Injected pressure drop range (bar)
    pub pressure_drop: (f64, f64),
    /// Chance per flow reading of an injected surge
    pub flow_rate: f64,
    /// Injected flow increase range (L/s)
    pub flow_increase: (f64, f64),
}

impl Default for LeakInjection {
    fn default() -> Self {
        Self {
            pressure_rate: 0.02,
            pressure_drop: (0.5, 2.0),
            flow_rate: 0.015,
            flow_increase: (10.0, 50.0),
        }
    }
}

const PRESSURE_NOISE_STD: f64 = 0.2;
const FLOW_NOISE_STD: f64 = 2.0;

/// Seeded random telemetry generator
pub struct RandomizedSource {
    rng: Mutex<ChaCha8Rng>,
    injection: LeakInjection,
}

impl RandomizedSource {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
            injection: LeakInjection::default(),
        }
    }

    pub fn with_injection(mut self, injection: LeakInjection) -> Self {
        self.injection = injection;
        self
    }

    fn sample(&self, sensor: &WaterSensor) -> Result<f64, TelemetryError> {
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| TelemetryError::Gateway {
                sensor: sensor.id.clone(),
                message: "random generator poisoned".to_string(),
            })?;

        let baseline = sensor.baseline_value;
        let value = match sensor.kind {
            SensorKind::Pressure => {
                let mut value = baseline + gaussian(&mut *rng, PRESSURE_NOISE_STD);
                if rng.gen_bool(self.injection.pressure_rate) {
                    let (lo, hi) = self.injection.pressure_drop;
                    let drop = rng.gen_range(lo..=hi);
                    debug!("Injecting {:.2} bar drop at {}", drop, sensor.id);
                    value -= drop;
                }
                value.max(0.0)
            }
            SensorKind::Flow => {
                let mut value = baseline + gaussian(&mut *rng, FLOW_NOISE_STD);
                if rng.gen_bool(self.injection.flow_rate) {
                    let (lo, hi) = self.injection.flow_increase;
                    let surge = rng.gen_range(lo..=hi);
                    debug!("Injecting {:.1} L/s surge at {}", surge, sensor.id);
                    value += surge;
                }
                value.max(0.0)
            }
            // Quality and valve sensors report their baseline unchanged
            SensorKind::Quality | SensorKind::Valve => baseline,
        };
        Ok(value)
    }
}

/// Normal sample with mean 0 (Box-Muller)
fn gaussian<R: Rng + ?Sized>(rng: &mut R, std_dev: f64) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos() * std_dev
}

#[async_trait]
impl TelemetrySource for RandomizedSource {
    async fn get_reading(&self, sensor: &WaterSensor) -> Result<Reading, TelemetryError> {
        let current_value = self.sample(sensor)?;
        Ok(Reading {
            sensor_id: sensor.id.clone(),
            timestamp: Utc::now(),
            kind: sensor.kind,
            current_value,
            baseline_value: Some(sensor.baseline_value),
        })
    }
}
