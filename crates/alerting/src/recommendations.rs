//! Severity Recommendation Table

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use water_model::Severity;

/// Recommended field actions per severity tier, independent of sensor type.
///
/// Serialized as a map keyed by lowercase severity name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, Vec<String>>",
    into = "BTreeMap<String, Vec<String>>"
)]
pub struct RecommendationTable(BTreeMap<Severity, Vec<String>>);

impl TryFrom<BTreeMap<String, Vec<String>>> for RecommendationTable {
    type Error = String;

    fn try_from(entries: BTreeMap<String, Vec<String>>) -> Result<Self, Self::Error> {
        let mut table = BTreeMap::new();
        for (name, actions) in entries {
            let severity = std::iter::once(Severity::Normal)
                .chain(Severity::TIERS)
                .find(|s| s.as_str().eq_ignore_ascii_case(name.trim()))
                .ok_or_else(|| format!("unknown severity '{}'", name))?;
            table.insert(severity, actions);
        }
        Ok(Self(table))
    }
}

impl From<RecommendationTable> for BTreeMap<String, Vec<String>> {
    fn from(table: RecommendationTable) -> Self {
        table
            .0
            .into_iter()
            .map(|(severity, actions)| (severity.as_str().to_string(), actions))
            .collect()
    }
}

impl RecommendationTable {
    pub fn new(entries: BTreeMap<Severity, Vec<String>>) -> Self {
        Self(entries)
    }

    /// Actions for a tier; unknown tiers fall back to a generic assessment
    pub fn for_severity(&self, severity: Severity) -> Vec<String> {
        self.0
            .get(&severity)
            .filter(|actions| !actions.is_empty())
            .cloned()
            .unwrap_or_else(|| vec!["Assess the situation on site".to_string()])
    }

    /// Replace the actions of one tier
    pub fn set(&mut self, severity: Severity, actions: Vec<String>) {
        self.0.insert(severity, actions);
    }
}

impl Default for RecommendationTable {
    fn default() -> Self {
        let table = [
            (
                Severity::Minor,
                &[
                    "Monitor evolution over the next 2 hours",
                    "Schedule a routine visual inspection",
                    "Check pressure on adjacent sensors",
                ][..],
            ),
            (
                Severity::Moderate,
                &[
                    "Send technical crew for inspection",
                    "Reduce sector pressure if possible",
                    "Prepare repair materials",
                    "Notify users of a possible interruption",
                ][..],
            ),
            (
                Severity::Major,
                &[
                    "Deploy emergency crew immediately",
                    "Isolate the affected section",
                    "Activate alternative supply",
                    "Coordinate with the local municipality",
                ][..],
            ),
            (
                Severity::Critical,
                &[
                    "IMMEDIATE RESPONSE REQUIRED",
                    "Isolate automatically if possible",
                    "Activate the water emergency protocol",
                    "Notify media and authorities",
                    "Deploy water tanker trucks",
                ][..],
            ),
        ];

        Self(
            table
                .iter()
                .map(|(severity, actions)| {
                    (*severity, actions.iter().map(|a| a.to_string()).collect())
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_covers_alarm_tiers() {
        let table = RecommendationTable::default();
        for severity in Severity::TIERS {
            assert!(!table.for_severity(severity).is_empty());
        }
        assert_eq!(table.for_severity(Severity::Critical).len(), 5);
        assert_eq!(
            table.for_severity(Severity::Normal),
            vec!["Assess the situation on site".to_string()]
        );
    }

    #[test]
    fn test_table_deserializes_from_severity_keys() {
        let json = r#"{"major": ["Close valve 7"], "critical": ["Call 911"]}"#;
        let table: RecommendationTable = serde_json::from_str(json).unwrap();
        assert_eq!(table.for_severity(Severity::Major), vec!["Close valve 7"]);
        assert_eq!(table.for_severity(Severity::Minor).len(), 1);

        let unknown = serde_json::from_str::<RecommendationTable>(r#"{"severe": []}"#);
        assert!(unknown.is_err());
    }
}
