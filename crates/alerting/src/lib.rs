//! Alerting System
//!
//! Turns actionable leak analyses into deduplicated, persistent alerts
//! (at most one active alert per sensor) with severity-keyed
//! recommendations.

mod manager;
mod recommendations;

pub use manager::{AlertConfig, AlertError, AlertManager};
pub use recommendations::RecommendationTable;
