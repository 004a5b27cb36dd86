//! Alert Manager Implementation

use crate::recommendations::RecommendationTable;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use thiserror::Error;
use tracing::{debug, info, warn};
use water_model::{Alert, AlertStatus, AnalysisResult, Severity, WaterSensor};

/// Alert lifecycle errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AlertError {
    #[error("Alert not found: {0}")]
    NotFound(String),
    #[error("Alert already resolved: {0}")]
    AlreadyResolved(String),
}

/// Alert configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Recommended actions per severity tier
    pub recommendations: RecommendationTable,
    /// Resolved alerts kept for lookup before the oldest is evicted
    pub resolved_retention: usize,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            recommendations: RecommendationTable::default(),
            resolved_retention: 1000,
        }
    }
}

/// Alert manager for per-sensor deduplication
pub struct AlertManager {
    /// Configuration
    config: AlertConfig,
    /// All retained alerts by alert id
    alerts: HashMap<String, Alert>,
    /// Active alert id by sensor id
    active_by_sensor: HashMap<String, String>,
    /// Resolved alert ids, oldest first
    resolved: VecDeque<String>,
}

impl AlertManager {
    /// Create a new alert manager
    pub fn new(config: AlertConfig) -> Self {
        info!(
            "Creating alert manager (resolved retention: {})",
            config.resolved_retention
        );
        Self {
            config,
            alerts: HashMap::new(),
            active_by_sensor: HashMap::new(),
            resolved: VecDeque::new(),
        }
    }

    /// Ingest an analysis result.
    ///
    /// Returns the alert when one was created, or when the active alert for
    /// the sensor was updated because the new estimate has higher
    /// confidence or higher loss. Returns `None` otherwise.
    pub fn on_analysis(&mut self, sensor: &WaterSensor, result: &AnalysisResult) -> Option<Alert> {
        if result.is_error() || !result.requires_action {
            return None;
        }

        if let Some(alert_id) = self.active_by_sensor.get(&sensor.id) {
            let recommendations = &self.config.recommendations;
            let alert = self.alerts.get_mut(alert_id)?;

            let higher_confidence = result.confidence > alert.confidence;
            let higher_loss = result.estimated_loss_lpm > alert.estimated_loss_lpm;
            if !higher_confidence && !higher_loss {
                debug!(
                    "Duplicate analysis for sensor {} suppressed (alert {})",
                    sensor.id, alert.id
                );
                return None;
            }

            alert.confidence = alert.confidence.max(result.confidence);
            alert.estimated_loss_lpm = alert.estimated_loss_lpm.max(result.estimated_loss_lpm);
            if result.severity > alert.severity {
                alert.severity = result.severity;
                alert.recommended_actions = recommendations.for_severity(result.severity);
            }
            alert.description = Self::describe(sensor, result);
            alert.updated_at = result.timestamp;

            info!(
                "Alert {} updated: severity {}, loss {:.1} L/min, confidence {:.2}",
                alert.id, alert.severity, alert.estimated_loss_lpm, alert.confidence
            );
            return Some(alert.clone());
        }

        let alert = self.create(sensor, result);
        Some(alert)
    }

    fn create(&mut self, sensor: &WaterSensor, result: &AnalysisResult) -> Alert {
        let mut id = Alert::make_id(&sensor.id, result.timestamp);
        let mut suffix = 1;
        while self.alerts.contains_key(&id) {
            suffix += 1;
            id = format!("{}_{}", Alert::make_id(&sensor.id, result.timestamp), suffix);
        }

        let alert = Alert {
            id: id.clone(),
            sensor_id: sensor.id.clone(),
            location: sensor.location,
            severity: result.severity,
            estimated_loss_lpm: result.estimated_loss_lpm,
            confidence: result.confidence,
            description: Self::describe(sensor, result),
            recommended_actions: self.config.recommendations.for_severity(result.severity),
            detection_time: result.timestamp,
            updated_at: result.timestamp,
            status: AlertStatus::Active,
            undispatched: false,
        };

        warn!(
            "LEAK DETECTED: {} | severity {} | loss {:.1} L/min | {}",
            alert.id, alert.severity, alert.estimated_loss_lpm, sensor.municipality
        );

        self.active_by_sensor.insert(sensor.id.clone(), id.clone());
        self.alerts.insert(id, alert.clone());
        alert
    }

    fn describe(sensor: &WaterSensor, result: &AnalysisResult) -> String {
        format!(
            "Leak suspected at {} ({}): {}",
            sensor.municipality,
            sensor.id,
            result.indicators.join("; ")
        )
    }

    /// Resolve an alert (external action); frees the sensor for new alerts
    pub fn resolve(&mut self, alert_id: &str) -> Result<Alert, AlertError> {
        let alert = self
            .alerts
            .get_mut(alert_id)
            .ok_or_else(|| AlertError::NotFound(alert_id.to_string()))?;
        if alert.status == AlertStatus::Resolved {
            return Err(AlertError::AlreadyResolved(alert_id.to_string()));
        }

        alert.status = AlertStatus::Resolved;
        alert.updated_at = Utc::now();
        let resolved = alert.clone();
        self.active_by_sensor.remove(&resolved.sensor_id);
        info!("Alert resolved: {}", alert_id);

        self.resolved.push_back(alert_id.to_string());
        while self.resolved.len() > self.config.resolved_retention {
            if let Some(old) = self.resolved.pop_front() {
                self.alerts.remove(&old);
            }
        }
        Ok(resolved)
    }

    /// Flag an alert whose dispatch failed fatally
    pub fn mark_undispatched(&mut self, alert_id: &str) -> Result<(), AlertError> {
        let alert = self
            .alerts
            .get_mut(alert_id)
            .ok_or_else(|| AlertError::NotFound(alert_id.to_string()))?;
        alert.undispatched = true;
        warn!("Alert {} flagged undispatched; manual follow-up required", alert_id);
        Ok(())
    }

    /// Look up any retained alert
    pub fn get(&self, alert_id: &str) -> Option<&Alert> {
        self.alerts.get(alert_id)
    }

    /// Active alert for a sensor, if any
    pub fn active_for_sensor(&self, sensor_id: &str) -> Option<&Alert> {
        self.active_by_sensor
            .get(sensor_id)
            .and_then(|id| self.alerts.get(id))
    }

    /// Active alerts, oldest detection first
    pub fn active_alerts(&self) -> Vec<&Alert> {
        let mut active: Vec<_> = self
            .active_by_sensor
            .values()
            .filter_map(|id| self.alerts.get(id))
            .collect();
        active.sort_by(|a, b| {
            a.detection_time
                .cmp(&b.detection_time)
                .then_with(|| a.id.cmp(&b.id))
        });
        active
    }

    pub fn active_count(&self) -> usize {
        self.active_by_sensor.len()
    }

    pub fn resolved_count(&self) -> usize {
        self.resolved.len()
    }

    /// Active alert count per alarm tier (all tiers present)
    pub fn active_by_severity(&self) -> BTreeMap<Severity, usize> {
        let mut breakdown: BTreeMap<Severity, usize> =
            Severity::TIERS.iter().map(|s| (*s, 0)).collect();
        for alert in self.active_alerts() {
            *breakdown.entry(alert.severity).or_insert(0) += 1;
        }
        breakdown
    }

    /// Sum of estimated losses of active alerts, L/min
    pub fn total_active_loss_lpm(&self) -> f64 {
        self.active_alerts()
            .iter()
            .map(|a| a.estimated_loss_lpm)
            .sum()
    }
}

impl Default for AlertManager {
    fn default() -> Self {
        Self::new(AlertConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone};
    use water_model::{Authority, GeoPoint, SensorKind};

    fn sensor(id: &str) -> WaterSensor {
        WaterSensor::new(
            id,
            SensorKind::Pressure,
            GeoPoint::new(9.9333, -84.0833),
            0.6,
            4.5,
            "San José",
            Authority::Aya,
        )
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_709_294_400 + secs, 0).unwrap()
    }

    fn result(
        sensor_id: &str,
        severity: Severity,
        probability: f64,
        loss: f64,
        t: DateTime<Utc>,
    ) -> AnalysisResult {
        AnalysisResult {
            sensor_id: sensor_id.to_string(),
            leak_probability: probability,
            severity,
            confidence: probability,
            indicators: vec!["Critical pressure drop".to_string()],
            estimated_loss_lpm: loss,
            deviation_percent: 70.0,
            requires_action: probability > 0.6,
            timestamp: t,
            error: None,
        }
    }

    #[test]
    fn test_creates_alert_for_actionable_result() {
        let mut manager = AlertManager::default();
        let s = sensor("S1");
        let alert = manager
            .on_analysis(&s, &result("S1", Severity::Critical, 0.95, 165.6, at(0)))
            .unwrap();

        assert_eq!(alert.id, "LEAK_S1_1709294400");
        assert_eq!(alert.status, AlertStatus::Active);
        assert_eq!(alert.severity, Severity::Critical);
        assert_eq!(alert.location, s.location);
        assert_eq!(alert.recommended_actions.len(), 5);
        assert!(alert.description.contains("San José"));
        assert_eq!(manager.active_count(), 1);
    }

    #[test]
    fn test_non_actionable_result_ignored() {
        let mut manager = AlertManager::default();
        let s = sensor("S2");
        assert!(manager
            .on_analysis(&s, &result("S2", Severity::Minor, 0.35, 2.0, at(0)))
            .is_none());

        let failed = AnalysisResult::failed("S2", "missing baseline");
        assert!(manager.on_analysis(&s, &failed).is_none());
        assert_eq!(manager.active_count(), 0);
    }

    #[test]
    fn test_same_result_twice_yields_one_alert() {
        let mut manager = AlertManager::default();
        let s = sensor("S1");
        let r = result("S1", Severity::Critical, 0.95, 165.6, at(0));

        assert!(manager.on_analysis(&s, &r).is_some());
        assert!(manager.on_analysis(&s, &r).is_none());
        assert_eq!(manager.active_count(), 1);
        assert_eq!(manager.active_alerts().len(), 1);
    }

    #[test]
    fn test_update_only_on_higher_estimate() {
        let mut manager = AlertManager::default();
        let s = sensor("S1");
        let first = manager
            .on_analysis(&s, &result("S1", Severity::Moderate, 0.65, 20.0, at(0)))
            .unwrap();

        // lower estimate: ignored
        assert!(manager
            .on_analysis(&s, &result("S1", Severity::Moderate, 0.62, 18.0, at(60)))
            .is_none());

        // higher estimate: updates in place, same id
        let updated = manager
            .on_analysis(&s, &result("S1", Severity::Major, 0.85, 60.0, at(120)))
            .unwrap();
        assert_eq!(updated.id, first.id);
        assert_eq!(updated.severity, Severity::Major);
        assert_eq!(updated.detection_time, first.detection_time);
        assert_eq!(updated.updated_at, at(120));
        assert_eq!(updated.recommended_actions[0], "Deploy emergency crew immediately");
        assert_eq!(manager.active_count(), 1);
    }

    #[test]
    fn test_resolve_frees_sensor() {
        let mut manager = AlertManager::default();
        let s = sensor("S1");
        let alert = manager
            .on_analysis(&s, &result("S1", Severity::Critical, 0.95, 100.0, at(0)))
            .unwrap();

        let resolved = manager.resolve(&alert.id).unwrap();
        assert_eq!(resolved.status, AlertStatus::Resolved);
        assert!(manager.active_for_sensor("S1").is_none());
        assert_eq!(manager.resolved_count(), 1);
        assert_eq!(
            manager.resolve(&alert.id),
            Err(AlertError::AlreadyResolved(alert.id.clone()))
        );

        // same detection second gets a distinct id
        let again = manager
            .on_analysis(&s, &result("S1", Severity::Critical, 0.95, 100.0, at(0)))
            .unwrap();
        assert_eq!(again.id, format!("{}_2", alert.id));
    }

    #[test]
    fn test_mark_undispatched() {
        let mut manager = AlertManager::default();
        let s = sensor("S1");
        let alert = manager
            .on_analysis(&s, &result("S1", Severity::Critical, 0.95, 100.0, at(0)))
            .unwrap();

        manager.mark_undispatched(&alert.id).unwrap();
        assert!(manager.get(&alert.id).unwrap().undispatched);
        assert!(manager.mark_undispatched("missing").is_err());
    }

    #[test]
    fn test_severity_breakdown_and_loss() {
        let mut manager = AlertManager::default();
        manager.on_analysis(&sensor("A"), &result("A", Severity::Critical, 0.95, 100.0, at(0)));
        manager.on_analysis(&sensor("B"), &result("B", Severity::Major, 0.85, 40.0, at(1)));
        manager.on_analysis(&sensor("C"), &result("C", Severity::Major, 0.85, 10.0, at(2)));

        let breakdown = manager.active_by_severity();
        assert_eq!(breakdown[&Severity::Critical], 1);
        assert_eq!(breakdown[&Severity::Major], 2);
        assert_eq!(breakdown[&Severity::Minor], 0);
        assert!((manager.total_active_loss_lpm() - 150.0).abs() < 1e-9);

        let ids: Vec<_> = manager.active_alerts().iter().map(|a| a.sensor_id.clone()).collect();
        assert_eq!(ids, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_resolved_retention() {
        let mut manager = AlertManager::new(AlertConfig {
            resolved_retention: 1,
            ..Default::default()
        });
        let a = manager
            .on_analysis(&sensor("A"), &result("A", Severity::Major, 0.85, 1.0, at(0)))
            .unwrap();
        let b = manager
            .on_analysis(&sensor("B"), &result("B", Severity::Major, 0.85, 1.0, at(0)))
            .unwrap();
        manager.resolve(&a.id).unwrap();
        manager.resolve(&b.id).unwrap();

        assert!(manager.get(&a.id).is_none());
        assert!(manager.get(&b.id).is_some());
        assert_eq!(manager.resolved_count(), 1);
    }
}
