//! Coordinate types and distance math.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

const EARTH_RADIUS_KM: f64 = 6371.0;
const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Maximum decimal places kept on a submitted coordinate (~0.11 m).
pub const GPS_MAX_DECIMAL_PLACES: i32 = 6;

/// Rectangular plausibility region for reports (not physical validity).
pub const PAKISTAN_LAT_MIN: f64 = 23.0;
pub const PAKISTAN_LAT_MAX: f64 = 37.0;
pub const PAKISTAN_LON_MIN: f64 = 60.0;
pub const PAKISTAN_LON_MAX: f64 = 78.0;

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Build a point only when both halves were submitted.
    pub fn from_parts(latitude: Option<f64>, longitude: Option<f64>) -> Option<Self> {
        match (latitude, longitude) {
            (Some(lat), Some(lon)) => Some(Self::new(lat, lon)),
            _ => None,
        }
    }

    /// Physically valid: finite, |lat| <= 90 and |lon| <= 180.
    pub fn is_valid(&self) -> bool {
        is_valid_coordinate(self.latitude, self.longitude)
    }

    /// Inside the Pakistan bounding rectangle (inclusive).
    pub fn in_pakistan(&self) -> bool {
        (PAKISTAN_LAT_MIN..=PAKISTAN_LAT_MAX).contains(&self.latitude)
            && (PAKISTAN_LON_MIN..=PAKISTAN_LON_MAX).contains(&self.longitude)
    }

    /// Copy with both coordinates clamped to `GPS_MAX_DECIMAL_PLACES`.
    pub fn rounded(&self) -> Self {
        Self::new(
            round_coordinate(self.latitude),
            round_coordinate(self.longitude),
        )
    }

    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        haversine_km(self.latitude, self.longitude, other.latitude, other.longitude)
    }

    pub fn distance_m(&self, other: &GeoPoint) -> f64 {
        haversine_m(self.latitude, self.longitude, other.latitude, other.longitude)
    }
}

fn haversine_central_angle(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let to_rad = |deg: f64| deg * PI / 180.0;

    let dlat = to_rad(lat2 - lat1);
    let dlon = to_rad(lon2 - lon1);

    let a = (dlat / 2.0).sin().powi(2)
        + to_rad(lat1).cos() * to_rad(lat2).cos() * (dlon / 2.0).sin().powi(2);

    2.0 * a.sqrt().atan2((1.0 - a).max(0.0).sqrt())
}

/// Haversine distance in kilometres.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    EARTH_RADIUS_KM * haversine_central_angle(lat1, lon1, lat2, lon2)
}

/// Haversine distance in metres.
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    EARTH_RADIUS_METERS * haversine_central_angle(lat1, lon1, lat2, lon2)
}

pub fn is_valid_coordinate(latitude: f64, longitude: f64) -> bool {
    latitude.is_finite()
        && longitude.is_finite()
        && (-90.0..=90.0).contains(&latitude)
        && (-180.0..=180.0).contains(&longitude)
}

/// Round to `GPS_MAX_DECIMAL_PLACES`. Idempotent.
pub fn round_coordinate(value: f64) -> f64 {
    round_to(value, GPS_MAX_DECIMAL_PLACES)
}

/// Round to a fixed number of decimal places.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_lahore_to_islamabad() {
        let d = haversine_km(31.5204, 74.3587, 33.6844, 73.0479);
        assert!((d - 270.0).abs() < 10.0, "Expected ~270 km, got {d}");
    }

    #[test]
    fn test_meters_and_km_agree() {
        let km = haversine_km(24.8607, 67.0011, 24.8700, 67.0100);
        let m = haversine_m(24.8607, 67.0011, 24.8700, 67.0100);
        assert!((m / 1000.0 - km).abs() < 1e-9);
    }

    #[test]
    fn test_coordinate_validity() {
        assert!(is_valid_coordinate(90.0, -180.0));
        assert!(!is_valid_coordinate(90.0001, 0.0));
        assert!(!is_valid_coordinate(0.0, 180.5));
        assert!(!is_valid_coordinate(f64::NAN, 0.0));
    }

    #[test]
    fn test_pakistan_bounds_edges() {
        assert!(GeoPoint::new(23.0, 60.0).in_pakistan());
        assert!(GeoPoint::new(37.0, 78.0).in_pakistan());
        assert!(!GeoPoint::new(22.9999, 70.0).in_pakistan());
        assert!(!GeoPoint::new(51.5, -0.12).in_pakistan());
    }

    #[test]
    fn test_rounding_pulls_into_bounds() {
        let p = GeoPoint::new(23.0000001, 70.0).rounded();
        assert_eq!(p.latitude, 23.0);
        assert!(p.in_pakistan());
    }

    #[test]
    fn test_from_parts_needs_both() {
        assert!(GeoPoint::from_parts(Some(31.0), None).is_none());
        assert!(GeoPoint::from_parts(None, Some(74.0)).is_none());
        assert_eq!(
            GeoPoint::from_parts(Some(31.0), Some(74.0)),
            Some(GeoPoint::new(31.0, 74.0))
        );
    }

    proptest! {
        #[test]
        fn prop_haversine_symmetric(
            lat1 in -90.0f64..90.0, lon1 in -180.0f64..180.0,
            lat2 in -90.0f64..90.0, lon2 in -180.0f64..180.0,
        ) {
            let ab = haversine_km(lat1, lon1, lat2, lon2);
            let ba = haversine_km(lat2, lon2, lat1, lon1);
            prop_assert!((ab - ba).abs() < 1e-6);
        }

        #[test]
        fn prop_haversine_identity(lat in -90.0f64..90.0, lon in -180.0f64..180.0) {
            prop_assert_eq!(haversine_km(lat, lon, lat, lon), 0.0);
        }

        #[test]
        fn prop_rounding_idempotent(value in -180.0f64..180.0) {
            let once = round_coordinate(value);
            prop_assert_eq!(round_coordinate(once), once);
        }
    }
}
