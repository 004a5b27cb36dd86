//! Telemetry Sources
//!
//! The monitor pulls one reading per sensor per cycle through the
//! [`TelemetrySource`] trait. Field gateways are out of scope here; this
//! crate ships a deterministic scripted source for tests, a seeded
//! randomized source for demos, and leak scenario injection.

mod error;
mod randomized;
mod scenario;
mod scripted;

pub use error::TelemetryError;
pub use randomized::{LeakInjection, RandomizedSource};
pub use scenario::{simulate_leak_scenario, LeakScenario};
pub use scripted::ScriptedSource;

use async_trait::async_trait;
use water_model::{Reading, WaterSensor};

/// A provider of current sensor readings
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Fetch the current reading for `sensor`
    async fn get_reading(&self, sensor: &WaterSensor) -> Result<Reading, TelemetryError>;
}
