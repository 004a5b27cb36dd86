//! Leak Detector Implementation

use crate::error::SensorError;
use crate::thresholds::{DetectorConfig, SeverityThresholds, TierProbabilities};
use tracing::{debug, warn};
use water_model::{AnalysisResult, Reading, SensorKind, Severity, WaterSensor};

/// Loss model constant, L/min per unit of factor x diameter^1.5 x probability
const LOSS_SCALE: f64 = 15.0;

/// Stateless leak classifier
#[derive(Debug, Clone, Default)]
pub struct LeakDetector {
    config: DetectorConfig,
}

/// Per-kind view of the configuration
struct KindModel<'a> {
    thresholds: &'a SeverityThresholds,
    probabilities: &'a TierProbabilities,
    trend_factor: f64,
    /// Sign applied to (current - baseline) so alarms are positive
    direction: f64,
    tier_label: &'static str,
    trend_label: &'static str,
}

impl LeakDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Classify a reading. Never fails: analysis errors produce a
    /// normal-severity result with `error` set.
    pub fn analyze(
        &self,
        reading: &Reading,
        sensor: &WaterSensor,
        recent_history: &[f64],
    ) -> AnalysisResult {
        match self.try_analyze(reading, sensor, recent_history) {
            Ok(result) => result,
            Err(e) => {
                warn!(
                    "Analysis error for sensor {} at {}: {}",
                    sensor.id, reading.timestamp, e
                );
                let mut result = AnalysisResult::failed(&reading.sensor_id, e.to_string());
                result.timestamp = reading.timestamp;
                result
            }
        }
    }

    fn try_analyze(
        &self,
        reading: &Reading,
        sensor: &WaterSensor,
        recent_history: &[f64],
    ) -> Result<AnalysisResult, SensorError> {
        if reading.kind != sensor.kind {
            return Err(SensorError::KindMismatch {
                reading: reading.kind,
                sensor: sensor.kind,
            });
        }
        let model = self.model_for(sensor.kind)?;

        if !reading.current_value.is_finite() {
            return Err(SensorError::NonFiniteValue(reading.current_value));
        }
        let baseline = Self::resolve_baseline(reading, sensor)?;
        let current = reading.current_value;

        let deviation = model.direction * (current - baseline);
        let severity = model.thresholds.classify(deviation);
        let mut probability = model.probabilities.for_severity(severity);
        let mut indicators = Vec::new();

        if severity > Severity::Normal {
            indicators.push(format!(
                "{} {} ({:.2} {} from baseline {:.2})",
                capitalize(severity.as_str()),
                model.tier_label,
                deviation,
                sensor.kind.unit(),
                baseline
            ));

            if self.has_sustained_trend(recent_history, model.direction) {
                probability *= model.trend_factor;
                indicators.push(model.trend_label.to_string());
            }
        }
        probability = probability.min(self.config.probability_cap).clamp(0.0, 1.0);

        let estimated_loss_lpm = self.estimate_loss(severity, sensor.pipe_diameter_m, probability);
        let deviation_percent = (current - baseline).abs() / baseline * 100.0;
        let requires_action = probability > self.config.action_threshold;

        debug!(
            "Sensor {}: deviation {:.3} {} -> {} (p={:.2})",
            sensor.id,
            deviation,
            sensor.kind.unit(),
            severity,
            probability
        );

        Ok(AnalysisResult {
            sensor_id: reading.sensor_id.clone(),
            leak_probability: probability,
            severity,
            confidence: probability,
            indicators,
            estimated_loss_lpm,
            deviation_percent,
            requires_action,
            timestamp: reading.timestamp,
            error: None,
        })
    }

    fn model_for(&self, kind: SensorKind) -> Result<KindModel<'_>, SensorError> {
        match kind {
            SensorKind::Pressure => Ok(KindModel {
                thresholds: &self.config.pressure_thresholds,
                probabilities: &self.config.pressure_probabilities,
                trend_factor: self.config.pressure_trend_factor,
                direction: -1.0,
                tier_label: "pressure drop",
                trend_label: "Sustained falling pressure trend",
            }),
            SensorKind::Flow => Ok(KindModel {
                thresholds: &self.config.flow_thresholds,
                probabilities: &self.config.flow_probabilities,
                trend_factor: self.config.flow_trend_factor,
                direction: 1.0,
                tier_label: "flow increase",
                trend_label: "Sustained rising flow trend",
            }),
            other => Err(SensorError::UnsupportedType(other)),
        }
    }

    fn resolve_baseline(reading: &Reading, sensor: &WaterSensor) -> Result<f64, SensorError> {
        let usable = |v: f64| v.is_finite() && v > 0.0;
        reading
            .baseline_value
            .filter(|v| usable(*v))
            .or_else(|| Some(sensor.baseline_value).filter(|v| usable(*v)))
            .ok_or_else(|| SensorError::MissingBaseline(sensor.id.clone()))
    }

    /// Last `trend_window` samples move monotonically in the alarming
    /// direction with a net change in that direction
    fn has_sustained_trend(&self, history: &[f64], direction: f64) -> bool {
        let window = self.config.trend_window;
        if window < 2 || history.len() < window {
            return false;
        }
        let recent = &history[history.len() - window..];
        if recent.iter().any(|v| !v.is_finite()) {
            return false;
        }
        let monotonic = recent
            .windows(2)
            .all(|w| direction * (w[1] - w[0]) >= 0.0);
        let net = direction * (recent[window - 1] - recent[0]);
        monotonic && net > 0.0
    }

    /// Loss factor per severity tier
    pub fn loss_factor(severity: Severity) -> f64 {
        match severity {
            Severity::Normal => 0.0,
            Severity::Minor => 0.8,
            Severity::Moderate => 2.5,
            Severity::Major => 8.0,
            Severity::Critical => 25.0,
        }
    }

    /// Estimated loss in L/min, rounded to one decimal
    pub fn estimate_loss(&self, severity: Severity, pipe_diameter_m: f64, probability: f64) -> f64 {
        let raw = Self::loss_factor(severity) * pipe_diameter_m.powf(1.5) * probability * LOSS_SCALE;
        (raw * 10.0).round() / 10.0
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use water_model::{Authority, GeoPoint};

    fn sensor(id: &str, kind: SensorKind, baseline: f64, diameter: f64) -> WaterSensor {
        WaterSensor::new(
            id,
            kind,
            GeoPoint::new(9.9333, -84.0833),
            diameter,
            baseline,
            "San José",
            Authority::Aya,
        )
    }

    fn reading(sensor: &WaterSensor, value: f64) -> Reading {
        Reading::new(&sensor.id, sensor.kind, value, Some(sensor.baseline_value))
    }

    #[test]
    fn test_critical_pressure_drop() {
        let detector = LeakDetector::default();
        let s1 = sensor("S1", SensorKind::Pressure, 4.5, 0.6);
        let result = detector.analyze(&reading(&s1, 1.0), &s1, &[]);

        assert_eq!(result.severity, Severity::Critical);
        assert!((result.leak_probability - 0.95).abs() < 1e-9);
        assert_eq!(result.confidence, result.leak_probability);
        assert!(result.requires_action);
        assert!(result.error.is_none());
        assert!((result.deviation_percent - 77.777).abs() < 0.01);
        assert_eq!(result.indicators.len(), 1);
    }

    #[test]
    fn test_small_flow_increase_is_normal() {
        let detector = LeakDetector::default();
        let s2 = sensor("S2", SensorKind::Flow, 50.0, 0.4);
        let result = detector.analyze(&reading(&s2, 52.0), &s2, &[]);

        assert_eq!(result.severity, Severity::Normal);
        assert_eq!(result.leak_probability, 0.0);
        assert!(!result.requires_action);
        assert_eq!(result.estimated_loss_lpm, 0.0);
        assert!(result.indicators.is_empty());
    }

    #[test]
    fn test_pressure_rise_does_not_alarm() {
        let detector = LeakDetector::default();
        let s = sensor("S", SensorKind::Pressure, 4.5, 0.6);
        let result = detector.analyze(&reading(&s, 9.0), &s, &[]);
        assert_eq!(result.severity, Severity::Normal);
        assert!((result.deviation_percent - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_flow_drop_does_not_alarm() {
        let detector = LeakDetector::default();
        let s = sensor("S", SensorKind::Flow, 280.0, 0.8);
        let result = detector.analyze(&reading(&s, 100.0), &s, &[]);
        assert_eq!(result.severity, Severity::Normal);
    }

    #[test]
    fn test_flow_tiers() {
        let detector = LeakDetector::default();
        let s = sensor("S", SensorKind::Flow, 100.0, 0.5);
        let cases = [
            (110.0, Severity::Minor, 0.40),
            (125.0, Severity::Moderate, 0.68),
            (160.0, Severity::Major, 0.82),
            (230.0, Severity::Critical, 0.92),
        ];
        for (value, severity, probability) in cases {
            let result = detector.analyze(&reading(&s, value), &s, &[]);
            assert_eq!(result.severity, severity, "value {value}");
            assert!((result.leak_probability - probability).abs() < 1e-9);
        }
    }

    #[test]
    fn test_moderate_pressure_requires_action_minor_does_not() {
        let detector = LeakDetector::default();
        let s = sensor("S", SensorKind::Pressure, 4.5, 0.6);

        let moderate = detector.analyze(&reading(&s, 3.5), &s, &[]);
        assert_eq!(moderate.severity, Severity::Moderate);
        assert!(moderate.requires_action);

        let minor = detector.analyze(&reading(&s, 4.0), &s, &[]);
        assert_eq!(minor.severity, Severity::Minor);
        assert!(!minor.requires_action);
    }

    #[test]
    fn test_falling_pressure_trend_boosts_probability() {
        let detector = LeakDetector::default();
        let s = sensor("S", SensorKind::Pressure, 4.5, 0.6);
        let history = [4.4, 4.3, 4.0, 3.8];

        let result = detector.analyze(&reading(&s, 4.0), &s, &history);
        assert_eq!(result.severity, Severity::Minor);
        assert!((result.leak_probability - 0.35 * 1.3).abs() < 1e-9);
        assert_eq!(result.indicators.len(), 2);
        assert!(!result.requires_action);
    }

    #[test]
    fn test_trend_probability_is_capped() {
        let detector = LeakDetector::default();
        let s = sensor("S", SensorKind::Pressure, 4.5, 0.6);
        let result = detector.analyze(&reading(&s, 1.0), &s, &[4.0, 3.0, 2.0]);
        assert!((result.leak_probability - 0.99).abs() < 1e-9);
    }

    #[test]
    fn test_rising_flow_trend() {
        let detector = LeakDetector::default();
        let s = sensor("S", SensorKind::Flow, 50.0, 0.4);
        let result = detector.analyze(&reading(&s, 75.0), &s, &[52.0, 60.0, 70.0]);
        assert_eq!(result.severity, Severity::Moderate);
        assert!((result.leak_probability - 0.68 * 1.2).abs() < 1e-9);
    }

    #[test]
    fn test_trend_requires_window_and_direction() {
        let detector = LeakDetector::default();
        let s = sensor("S", SensorKind::Pressure, 4.5, 0.6);

        // too short
        let r = detector.analyze(&reading(&s, 3.5), &s, &[4.0, 3.8]);
        assert!((r.leak_probability - 0.65).abs() < 1e-9);

        // flat
        let r = detector.analyze(&reading(&s, 3.5), &s, &[4.0, 4.0, 4.0]);
        assert!((r.leak_probability - 0.65).abs() < 1e-9);

        // wrong direction
        let r = detector.analyze(&reading(&s, 3.5), &s, &[3.6, 3.8, 4.0]);
        assert!((r.leak_probability - 0.65).abs() < 1e-9);
    }

    #[test]
    fn test_trend_ignored_when_reading_is_normal() {
        let detector = LeakDetector::default();
        let s = sensor("S", SensorKind::Pressure, 4.5, 0.6);
        let r = detector.analyze(&reading(&s, 4.4), &s, &[4.6, 4.5, 4.45]);
        assert_eq!(r.severity, Severity::Normal);
        assert_eq!(r.leak_probability, 0.0);
        assert!(r.indicators.is_empty());
    }

    #[test]
    fn test_loss_estimate() {
        let detector = LeakDetector::default();
        // 25 * 1.0^1.5 * 0.95 * 15 = 356.25
        assert_eq!(detector.estimate_loss(Severity::Critical, 1.0, 0.95), 356.3);
        assert_eq!(detector.estimate_loss(Severity::Normal, 1.0, 0.95), 0.0);
    }

    #[test]
    fn test_unsupported_type_is_flagged() {
        let detector = LeakDetector::default();
        let s = sensor("Q", SensorKind::Quality, 1.0, 0.3);
        let result = detector.analyze(&reading(&s, 5.0), &s, &[]);
        assert!(result.is_error());
        assert_eq!(result.severity, Severity::Normal);
        assert_eq!(result.confidence, 0.0);
        assert!(!result.requires_action);
    }

    #[test]
    fn test_missing_baseline_is_flagged() {
        let detector = LeakDetector::default();
        let s = sensor("S", SensorKind::Pressure, 0.0, 0.6);
        let r = Reading::new("S", SensorKind::Pressure, 1.0, None);
        let result = detector.analyze(&r, &s, &[]);
        assert!(result.error.as_deref().unwrap().contains("Missing baseline"));
    }

    #[test]
    fn test_registry_baseline_used_when_reading_has_none() {
        let detector = LeakDetector::default();
        let s = sensor("S", SensorKind::Pressure, 4.5, 0.6);
        let r = Reading::new("S", SensorKind::Pressure, 1.0, None);
        assert_eq!(detector.analyze(&r, &s, &[]).severity, Severity::Critical);
    }

    #[test]
    fn test_kind_mismatch_and_nan_are_flagged() {
        let detector = LeakDetector::default();
        let s = sensor("S", SensorKind::Pressure, 4.5, 0.6);

        let r = Reading::new("S", SensorKind::Flow, 1.0, Some(4.5));
        assert!(detector.analyze(&r, &s, &[]).is_error());

        let r = Reading::new("S", SensorKind::Pressure, f64::NAN, Some(4.5));
        assert!(detector.analyze(&r, &s, &[]).is_error());
    }

    #[test]
    fn test_analysis_is_deterministic() {
        let detector = LeakDetector::default();
        let s = sensor("S", SensorKind::Flow, 50.0, 0.4);
        let r = reading(&s, 130.0);
        let history = [60.0, 80.0, 120.0];
        assert_eq!(
            detector.analyze(&r, &s, &history),
            detector.analyze(&r, &s, &history)
        );
    }

    proptest! {
        #[test]
        fn prop_large_pressure_drop_is_critical(
            drop in 3.001f64..50.0,
            remaining in 0.0f64..20.0,
            diameter in 0.05f64..3.0,
        ) {
            let detector = LeakDetector::default();
            let baseline = drop + remaining;
            let s = sensor("P", SensorKind::Pressure, baseline, diameter);
            let result = detector.analyze(&reading(&s, remaining), &s, &[]);
            prop_assert_eq!(result.severity, Severity::Critical);
            prop_assert!(result.leak_probability >= 0.9);
        }

        #[test]
        fn prop_small_flow_increase_never_requires_action(
            baseline in 1.0f64..500.0,
            increase in -50.0f64..7.99,
            history in proptest::collection::vec(0.0f64..600.0, 0..6),
        ) {
            let detector = LeakDetector::default();
            let s = sensor("F", SensorKind::Flow, baseline, 0.5);
            let result = detector.analyze(&reading(&s, baseline + increase), &s, &history);
            prop_assert!(!result.requires_action);
        }

        #[test]
        fn prop_loss_monotonic_in_severity(
            diameter in 0.05f64..3.0,
            probability in 0.0f64..1.0,
        ) {
            let detector = LeakDetector::default();
            let tiers = [
                Severity::Normal,
                Severity::Minor,
                Severity::Moderate,
                Severity::Major,
                Severity::Critical,
            ];
            let losses: Vec<f64> = tiers
                .iter()
                .map(|s| detector.estimate_loss(*s, diameter, probability))
                .collect();
            for pair in losses.windows(2) {
                prop_assert!(pair[0] <= pair[1]);
            }
        }
    }
}
