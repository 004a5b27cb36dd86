//! Response Teams and Isolation Valves

use crate::error::RegistryError;
use crate::geo::GeoPoint;
use crate::incident::ChannelKind;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Contact endpoints for a field crew
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactChannels {
    /// Chat handle or phone number for the chat channel
    #[serde(default)]
    pub chat: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// Phone number for SMS
    #[serde(default)]
    pub phone: Option<String>,
}

impl ContactChannels {
    /// Recipient address for a notification channel
    pub fn recipient(&self, channel: ChannelKind) -> Option<&str> {
        match channel {
            ChannelKind::Chat => self.chat.as_deref().or(self.phone.as_deref()),
            ChannelKind::Email => self.email.as_deref(),
            ChannelKind::Sms => self.phone.as_deref(),
        }
    }
}

/// A field crew that can be dispatched to a leak
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseTeam {
    pub id: String,
    pub name: String,
    pub contacts: ContactChannels,
    /// Municipalities the crew normally covers
    pub coverage_area: Vec<String>,
    pub base_location: GeoPoint,
    pub response_time_target_minutes: f64,
    pub equipment: Vec<String>,
}

/// Static, read-only list of response teams
#[derive(Debug, Clone, Default)]
pub struct TeamRegistry {
    teams: Vec<ResponseTeam>,
}

impl TeamRegistry {
    pub fn new(teams: Vec<ResponseTeam>) -> Result<Self, RegistryError> {
        let mut seen = HashSet::new();
        for team in &teams {
            if !seen.insert(team.id.as_str()) {
                return Err(RegistryError::DuplicateId {
                    kind: "team",
                    id: team.id.clone(),
                });
            }
            if !team.base_location.is_valid() {
                return Err(RegistryError::InvalidLocation {
                    id: team.id.clone(),
                    lat: team.base_location.lat,
                    lon: team.base_location.lon,
                });
            }
        }
        Ok(Self { teams })
    }

    /// Team whose base is geodesically closest; ties keep registry order
    pub fn nearest(&self, point: &GeoPoint) -> Option<(&ResponseTeam, f64)> {
        let mut best: Option<(&ResponseTeam, f64)> = None;
        for team in &self.teams {
            let distance = team.base_location.distance_km(point);
            match best {
                Some((_, d)) if d <= distance => {}
                _ => best = Some((team, distance)),
            }
        }
        best
    }

    pub fn get(&self, id: &str) -> Option<&ResponseTeam> {
        self.teams.iter().find(|t| t.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResponseTeam> {
        self.teams.iter()
    }

    pub fn len(&self) -> usize {
        self.teams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }
}

/// Role of an isolation valve in the network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValveKind {
    MainShutOff,
    Sector,
    Distribution,
}

/// A remotely operable isolation valve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Valve {
    pub id: String,
    pub location: GeoPoint,
    pub kind: ValveKind,
}

/// Catalog of controllable valves
#[derive(Debug, Clone, Default)]
pub struct ValveRegistry {
    valves: Vec<Valve>,
}

impl ValveRegistry {
    pub fn new(valves: Vec<Valve>) -> Result<Self, RegistryError> {
        let mut seen = HashSet::new();
        for valve in &valves {
            if !seen.insert(valve.id.as_str()) {
                return Err(RegistryError::DuplicateId {
                    kind: "valve",
                    id: valve.id.clone(),
                });
            }
        }
        Ok(Self { valves })
    }

    /// Valves within `radius_km` of `point`, nearest first
    pub fn within_radius(&self, point: &GeoPoint, radius_km: f64) -> Vec<(&Valve, f64)> {
        let mut found: Vec<_> = self
            .valves
            .iter()
            .map(|v| (v, v.location.distance_km(point)))
            .filter(|(_, d)| *d <= radius_km)
            .collect();
        found.sort_by(|a, b| a.1.total_cmp(&b.1));
        found
    }

    pub fn len(&self) -> usize {
        self.valves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.valves.is_empty()
    }
}
