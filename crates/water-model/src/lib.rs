//! Water Network Data Model
//!
//! Sensor catalog, response teams, isolation valves, and the records that
//! flow through the leak response pipeline (readings, analysis results,
//! alerts, emergency cases).

mod alert;
mod error;
mod geo;
mod incident;
pub mod network;
mod reading;
mod sensor;
mod team;

pub use alert::{Alert, AlertStatus};
pub use error::RegistryError;
pub use geo::{distance_km, GeoPoint, EARTH_RADIUS_KM};
pub use incident::{CaseStatus, ChannelKind, EmergencyCase, NotificationResult, ValveCloseResult};
pub use reading::{AnalysisResult, Reading, Severity};
pub use sensor::{Authority, SensorKind, SensorRegistry, WaterSensor};
pub use team::{ContactChannels, ResponseTeam, TeamRegistry, Valve, ValveKind, ValveRegistry};
