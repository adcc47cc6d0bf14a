//! Great-circle distance between geopoints.

/// Mean Earth radius in meters.
const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Haversine distance in meters between `(lat, lng)` pairs given in degrees.
pub fn distance_meters(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lat1, lng1) = (a.0.to_radians(), a.1.to_radians());
    let (lat2, lng2) = (b.0.to_radians(), b.1.to_radians());

    let dlat = lat2 - lat1;
    let dlng = lng2 - lng1;

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_METERS * h.sqrt().asin()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_distance() {
        let p = (48.8584, 2.2945);
        assert!(distance_meters(p, p) < 1e-6);
    }

    #[test]
    fn test_paris_landmarks() {
        // Eiffel Tower to Notre-Dame is roughly 4.1 km.
        let eiffel = (48.85821022164442, 2.294239067890161);
        let notre_dame = (48.852455825574495, 2.35071182406452);
        let d = distance_meters(eiffel, notre_dame);
        assert!((3_900.0..4_400.0).contains(&d), "distance was {d}");
    }

    #[test]
    fn test_symmetry() {
        let a = (32.24678, 77.19239);
        let b = (32.23959, 77.18763);
        let d1 = distance_meters(a, b);
        let d2 = distance_meters(b, a);
        assert!((d1 - d2).abs() < 1e-9);
    }
}
