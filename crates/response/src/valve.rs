//! Valve Control
//!
//! Remote shut-off of isolation valves. The dispatcher owns timeouts and
//! retries; a controller performs a single close attempt per call.

use crate::error::ValveError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

/// Confirmation that a valve reached the closed position
#[derive(Debug, Clone, PartialEq)]
pub struct ValveAck {
    pub valve_id: String,
    pub closed_at: DateTime<Utc>,
}

/// Remote valve actuator interface (SCADA or field gateway)
#[async_trait]
pub trait ValveController: Send + Sync {
    /// Issue one close command and wait for the acknowledgement
    async fn close_valve(&self, valve_id: &str) -> Result<ValveAck, ValveError>;
}

#[derive(Debug, Default)]
struct SimState {
    commands: Vec<String>,
    jammed: HashSet<String>,
    /// Remaining failures before a valve starts closing
    flaky: HashMap<String, u32>,
}

/// In-process valve controller with configurable latency and faults
#[derive(Debug, Default)]
pub struct SimulatedValveController {
    latency: Duration,
    state: Mutex<SimState>,
}

impl SimulatedValveController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Actuation delay applied to every command
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make a valve fail every close attempt
    pub fn jam(self, valve_id: &str) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.jammed.insert(valve_id.to_string());
        }
        self
    }

    /// Make a valve fail its next `failures` attempts, then close
    pub fn flaky(self, valve_id: &str, failures: u32) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.flaky.insert(valve_id.to_string(), failures);
        }
        self
    }

    /// Close commands received, in order
    pub fn commands(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|state| state.commands.clone())
            .unwrap_or_default()
    }

    fn record(&self, valve_id: &str) -> Result<(), ValveError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| ValveError::Unreachable(valve_id.to_string()))?;
        state.commands.push(valve_id.to_string());

        if state.jammed.contains(valve_id) {
            return Err(ValveError::Jammed(valve_id.to_string()));
        }
        if let Some(remaining) = state.flaky.get_mut(valve_id) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ValveError::Unreachable(valve_id.to_string()));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ValveController for SimulatedValveController {
    async fn close_valve(&self, valve_id: &str) -> Result<ValveAck, ValveError> {
        debug!("Close command issued to valve {}", valve_id);
        self.record(valve_id)?;

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        info!("Valve {} closed remotely", valve_id);
        Ok(ValveAck {
            valve_id: valve_id.to_string(),
            closed_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_jammed_valve_always_fails() {
        let controller = SimulatedValveController::new().jam("valve_002");
        assert!(controller.close_valve("valve_001").await.is_ok());
        assert!(matches!(
            controller.close_valve("valve_002").await,
            Err(ValveError::Jammed(_))
        ));
        assert!(controller.close_valve("valve_002").await.is_err());
        assert_eq!(
            controller.commands(),
            vec!["valve_001", "valve_002", "valve_002"]
        );
    }

    #[tokio::test]
    async fn test_flaky_valve_recovers() {
        let controller = SimulatedValveController::new().flaky("valve_001", 2);
        assert!(controller.close_valve("valve_001").await.is_err());
        assert!(controller.close_valve("valve_001").await.is_err());
        let ack = controller.close_valve("valve_001").await.unwrap();
        assert_eq!(ack.valve_id, "valve_001");
    }
}
