//! Geodesic Distance

use serde::{Deserialize, Serialize};

/// Mean earth radius in kilometres (IUGG)
pub const EARTH_RADIUS_KM: f64 = 6371.0088;

/// A point in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Whether the point lies in the valid coordinate range
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }

    /// Great-circle distance to another point
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        distance_km(*self, *other)
    }

    /// Map link used in field notifications
    pub fn map_link(&self) -> String {
        format!("https://maps.google.com/maps?q={},{}", self.lat, self.lon)
    }
}

/// Haversine great-circle distance between two points
pub fn distance_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_distance() {
        let p = GeoPoint::new(9.9333, -84.0833);
        assert!(p.distance_km(&p).abs() < 1e-9);
    }

    #[test]
    fn test_one_degree_of_latitude() {
        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(1.0, 0.0);
        // 2 * pi * R / 360
        assert!((distance_km(a, b) - 111.195).abs() < 0.01);
    }

    #[test]
    fn test_san_jose_to_cartago() {
        let san_jose = GeoPoint::new(9.9333, -84.0833);
        let cartago = GeoPoint::new(9.8667, -83.9167);
        let d = distance_km(san_jose, cartago);
        assert!((d - 19.7).abs() < 0.2, "got {d}");
        assert!((d - distance_km(cartago, san_jose)).abs() < 1e-9);
    }

    #[test]
    fn test_validity() {
        assert!(GeoPoint::new(10.0, -84.0).is_valid());
        assert!(!GeoPoint::new(91.0, 0.0).is_valid());
        assert!(!GeoPoint::new(0.0, f64::NAN).is_valid());
    }

    #[test]
    fn test_map_link() {
        let p = GeoPoint::new(9.5, -84.25);
        assert_eq!(p.map_link(), "https://maps.google.com/maps?q=9.5,-84.25");
    }
}
