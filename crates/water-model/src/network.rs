//! Reference Network
//!
//! Representative Costa Rica water network: intakes, storage tanks, urban
//! distribution points and rural ASADAs, the regional response crews and
//! the downtown San José isolation valves. Used by the demo binary and the
//! integration tests.

use crate::error::RegistryError;
use crate::geo::GeoPoint;
use crate::sensor::{Authority, SensorKind, SensorRegistry, WaterSensor};
use crate::team::{ContactChannels, ResponseTeam, TeamRegistry, Valve, ValveKind, ValveRegistry};
use chrono::NaiveDate;

#[allow(clippy::too_many_arguments)]
fn sensor(
    id: &str,
    kind: SensorKind,
    lat: f64,
    lon: f64,
    diameter: f64,
    baseline: f64,
    installed: (i32, u32, u32),
    municipality: &str,
    authority: Authority,
) -> WaterSensor {
    let sensor = WaterSensor::new(
        id,
        kind,
        GeoPoint::new(lat, lon),
        diameter,
        baseline,
        municipality,
        authority,
    );
    match NaiveDate::from_ymd_opt(installed.0, installed.1, installed.2) {
        Some(date) => sensor.installed_on(date),
        None => sensor,
    }
}

/// Reference sensor catalog, in polling order
pub fn reference_sensors() -> Vec<WaterSensor> {
    use Authority::*;
    use SensorKind::*;

    vec![
        // Intakes and treatment
        sensor("orosi_intake", Flow, 9.7987, -83.8553, 1.2, 450.0, (2024, 1, 15), "Paraíso", Aya),
        sensor("tres_rios_plant", Pressure, 9.8833, -84.0167, 1.5, 12.0, (2024, 2, 1), "La Unión", Aya),
        sensor("puente_mulas", Flow, 9.9667, -84.0833, 0.8, 280.0, (2024, 1, 20), "San José", Aya),
        // Storage tanks
        sensor("curridabat_tank", Pressure, 9.9167, -84.0167, 2.0, 25.0, (2024, 1, 10), "Curridabat", Aya),
        sensor("escazu_tank", Pressure, 9.9167, -84.1333, 1.8, 22.0, (2024, 1, 12), "Escazú", Aya),
        sensor("cartago_tank", Pressure, 9.8667, -83.9167, 1.5, 18.0, (2024, 1, 8), "Cartago", Municipal),
        // Urban distribution
        sensor("san_jose_centro", Pressure, 9.9333, -84.0833, 0.6, 4.5, (2024, 1, 25), "San José", Aya),
        sensor("san_pedro_mall", Flow, 9.9333, -84.0500, 0.4, 85.0, (2024, 2, 5), "Montes de Oca", Aya),
        sensor("alajuela_centro", Pressure, 10.0167, -84.2167, 0.5, 3.8, (2024, 1, 30), "Alajuela", Municipal),
        sensor("heredia_universidad", Flow, 9.9833, -84.1167, 0.4, 75.0, (2024, 2, 10), "Heredia", Municipal),
        // Rural ASADAs
        sensor("monteverde_asada", Pressure, 10.3167, -84.8000, 0.3, 2.1, (2024, 1, 18), "Puntarenas", Asada),
        sensor("santa_elena_source", Flow, 10.3000, -84.8167, 0.25, 38.0, (2024, 1, 22), "Puntarenas", Asada),
        sensor("puerto_viejo_asada", Pressure, 9.6500, -82.7500, 0.2, 1.5, (2024, 2, 15), "Limón", Asada),
    ]
}

#[allow(clippy::too_many_arguments)]
fn team(
    id: &str,
    name: &str,
    phone: &str,
    email: &str,
    coverage: &[&str],
    base: (f64, f64),
    target_minutes: f64,
    equipment: &[&str],
) -> ResponseTeam {
    ResponseTeam {
        id: id.to_string(),
        name: name.to_string(),
        contacts: ContactChannels {
            chat: Some(phone.to_string()),
            email: Some(email.to_string()),
            phone: Some(phone.to_string()),
        },
        coverage_area: coverage.iter().map(|s| s.to_string()).collect(),
        base_location: GeoPoint::new(base.0, base.1),
        response_time_target_minutes: target_minutes,
        equipment: equipment.iter().map(|s| s.to_string()).collect(),
    }
}

/// Regional response crews
pub fn reference_teams() -> Vec<ResponseTeam> {
    vec![
        team(
            "san_jose",
            "Equipo GAM Norte",
            "+506-8888-1001",
            "gam-norte@aya.go.cr",
            &["San José", "Montes de Oca", "Goicoechea"],
            (9.9333, -84.0833),
            45.0,
            &["leak_detector", "mini_excavator", "emergency_pipes"],
        ),
        team(
            "cartago",
            "Equipo Cartago",
            "+506-8888-1002",
            "cartago@aya.go.cr",
            &["Cartago", "Paraíso", "Oreamuno"],
            (9.8667, -83.9167),
            60.0,
            &["leak_detector", "pipe_welding", "emergency_pump"],
        ),
        team(
            "alajuela",
            "Equipo Alajuela",
            "+506-8888-1003",
            "alajuela@aya.go.cr",
            &["Alajuela", "San Ramón", "Grecia"],
            (10.0167, -84.2167),
            50.0,
            &["leak_detector", "excavator", "pvc_materials"],
        ),
        team(
            "guanacaste",
            "Equipo Pacífico Norte",
            "+506-8888-1004",
            "guanacaste@aya.go.cr",
            &["Liberia", "Santa Cruz", "Nicoya"],
            (10.6333, -85.4333),
            90.0,
            &["4x4_vehicle", "emergency_water_tank", "generator"],
        ),
        team(
            "limon",
            "Equipo Caribe",
            "+506-8888-1005",
            "caribe@aya.go.cr",
            &["Limón", "Pococí", "Talamanca"],
            (10.0000, -83.0333),
            120.0,
            &["boat", "jungle_kit", "satellite_radio"],
        ),
    ]
}

/// Remotely operable valves around downtown San José
pub fn reference_valves() -> Vec<Valve> {
    vec![
        Valve {
            id: "valve_001".to_string(),
            location: GeoPoint::new(9.9333, -84.0833),
            kind: ValveKind::MainShutOff,
        },
        Valve {
            id: "valve_002".to_string(),
            location: GeoPoint::new(9.9300, -84.0800),
            kind: ValveKind::Sector,
        },
        Valve {
            id: "valve_003".to_string(),
            location: GeoPoint::new(9.9350, -84.0850),
            kind: ValveKind::Distribution,
        },
    ]
}

/// All three reference catalogs, validated
pub fn reference_network() -> Result<(SensorRegistry, TeamRegistry, ValveRegistry), RegistryError>
{
    Ok((
        SensorRegistry::from_sensors(reference_sensors())?,
        TeamRegistry::new(reference_teams())?,
        ValveRegistry::new(reference_valves())?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_network_is_valid() {
        let (sensors, teams, valves) = reference_network().unwrap();
        assert_eq!(sensors.len(), 13);
        assert_eq!(teams.len(), 5);
        assert_eq!(valves.len(), 3);
        assert!(sensors.get("orosi_intake").is_some());
        assert!(sensors.get("monteverde_asada").is_some());
    }

    #[test]
    fn test_reference_sensors_are_leak_monitorable() {
        for sensor in reference_sensors() {
            assert!(matches!(sensor.kind, SensorKind::Pressure | SensorKind::Flow));
            assert!(sensor.baseline_value > 0.0, "{} has no baseline", sensor.id);
            assert!(sensor.installed_on.is_some());
        }
    }

    #[test]
    fn test_reference_coverage() {
        let (sensors, _, _) = reference_network().unwrap();
        let coverage = sensors.coverage_by_authority();
        assert_eq!(coverage[&Authority::Aya], 7);
        assert_eq!(coverage[&Authority::Municipal], 3);
        assert_eq!(coverage[&Authority::Asada], 3);
    }
}
