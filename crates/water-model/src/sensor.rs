//! Sensor Catalog

use crate::error::RegistryError;
use crate::geo::GeoPoint;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::{debug, info};

/// Measured quantity of a field sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    /// Line pressure in bar
    Pressure,
    /// Volumetric flow in L/s
    Flow,
    /// Water quality probe (not used for leak detection)
    Quality,
    /// Valve position feedback (not used for leak detection)
    Valve,
}

impl SensorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorKind::Pressure => "pressure",
            SensorKind::Flow => "flow",
            SensorKind::Quality => "quality",
            SensorKind::Valve => "valve",
        }
    }

    /// Engineering unit of readings of this kind
    pub fn unit(&self) -> &'static str {
        match self {
            SensorKind::Pressure => "bar",
            SensorKind::Flow => "L/s",
            SensorKind::Quality => "NTU",
            SensorKind::Valve => "%",
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operator that owns the sensor's water system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Authority {
    /// National water utility (AyA)
    Aya,
    /// Municipal aqueduct
    Municipal,
    /// Rural community association (ASADA)
    Asada,
}

impl Authority {
    pub const ALL: [Authority; 3] = [Authority::Aya, Authority::Municipal, Authority::Asada];

    pub fn as_str(&self) -> &'static str {
        match self {
            Authority::Aya => "aya",
            Authority::Municipal => "municipal",
            Authority::Asada => "asada",
        }
    }
}

impl fmt::Display for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered field sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterSensor {
    /// Unique sensor id
    pub id: String,
    /// Measured quantity
    pub kind: SensorKind,
    /// Installation coordinates
    pub location: GeoPoint,
    /// Diameter of the monitored pipe in metres
    pub pipe_diameter_m: f64,
    /// Expected value under normal operation (bar or L/s)
    pub baseline_value: f64,
    /// Municipality the sensor is installed in
    pub municipality: String,
    /// Owning water authority
    pub authority: Authority,
    /// Installation date, when known
    #[serde(default)]
    pub installed_on: Option<NaiveDate>,
}

impl WaterSensor {
    /// Create a sensor with no installation date
    pub fn new(
        id: impl Into<String>,
        kind: SensorKind,
        location: GeoPoint,
        pipe_diameter_m: f64,
        baseline_value: f64,
        municipality: impl Into<String>,
        authority: Authority,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            location,
            pipe_diameter_m,
            baseline_value,
            municipality: municipality.into(),
            authority,
            installed_on: None,
        }
    }

    /// Set the installation date
    pub fn installed_on(mut self, date: NaiveDate) -> Self {
        self.installed_on = Some(date);
        self
    }
}

/// Ordered, immutable-once-registered sensor catalog
#[derive(Debug, Clone, Default)]
pub struct SensorRegistry {
    sensors: Vec<WaterSensor>,
    index: HashMap<String, usize>,
}

impl SensorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a list, preserving order
    pub fn from_sensors(
        sensors: impl IntoIterator<Item = WaterSensor>,
    ) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for sensor in sensors {
            registry.register(sensor)?;
        }
        info!("Sensor registry built with {} sensors", registry.len());
        Ok(registry)
    }

    /// Register a sensor; ids must be unique
    pub fn register(&mut self, sensor: WaterSensor) -> Result<(), RegistryError> {
        if self.index.contains_key(&sensor.id) {
            return Err(RegistryError::DuplicateId {
                kind: "sensor",
                id: sensor.id,
            });
        }
        if !sensor.location.is_valid() {
            return Err(RegistryError::InvalidLocation {
                id: sensor.id,
                lat: sensor.location.lat,
                lon: sensor.location.lon,
            });
        }
        if !(sensor.pipe_diameter_m > 0.0) {
            return Err(RegistryError::NonPositive {
                id: sensor.id,
                field: "pipe_diameter_m",
                value: sensor.pipe_diameter_m,
            });
        }

        debug!("Registered sensor {} ({})", sensor.id, sensor.kind);
        self.index.insert(sensor.id.clone(), self.sensors.len());
        self.sensors.push(sensor);
        Ok(())
    }

    /// Look up a sensor by id
    pub fn get(&self, id: &str) -> Option<&WaterSensor> {
        self.index.get(id).map(|&i| &self.sensors[i])
    }

    /// Iterate in registration order
    pub fn iter(&self) -> impl Iterator<Item = &WaterSensor> {
        self.sensors.iter()
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    /// Sensor count per owning authority (every authority present, possibly zero)
    pub fn coverage_by_authority(&self) -> BTreeMap<Authority, usize> {
        let mut coverage: BTreeMap<Authority, usize> =
            Authority::ALL.iter().map(|a| (*a, 0)).collect();
        for sensor in &self.sensors {
            *coverage.entry(sensor.authority).or_insert(0) += 1;
        }
        coverage
    }

    /// Sensor count per measured quantity
    pub fn count_by_kind(&self) -> BTreeMap<SensorKind, usize> {
        let mut counts = BTreeMap::new();
        for sensor in &self.sensors {
            *counts.entry(sensor.kind).or_insert(0) += 1;
        }
        counts
    }
}
