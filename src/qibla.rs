const KAABA_LATITUDE: f64 = 21.4225;
const KAABA_LONGITUDE: f64 = 39.8262;

// Initial great-circle bearing from the given point toward the Kaaba,
// normalized to [0, 360) degrees from true north.
pub fn qibla_direction(latitude: f64, longitude: f64) -> f64 {
    let lat = latitude.to_radians();
    let lon = longitude.to_radians();
    let kaaba_lat = KAABA_LATITUDE.to_radians();
    let kaaba_lon = KAABA_LONGITUDE.to_radians();

    let delta_lon = kaaba_lon - lon;
    let y = delta_lon.sin() * kaaba_lat.cos();
    let x = lat.cos() * kaaba_lat.sin() - lat.sin() * kaaba_lat.cos() * delta_lon.cos();
    let bearing = y.atan2(x).to_degrees();
    bearing.rem_euclid(360.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 0.05,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn london_faces_east_southeast() {
        assert_close(qibla_direction(51.5074, -0.1278), 118.99);
    }

    #[test]
    fn jakarta_faces_west_northwest() {
        assert_close(qibla_direction(-6.2088, 106.8456), 295.15);
    }

    #[test]
    fn new_york_faces_northeast() {
        assert_close(qibla_direction(40.7128, -74.0060), 58.48);
    }

    #[test]
    fn due_north_of_kaaba_points_south() {
        assert_close(qibla_direction(30.0, KAABA_LONGITUDE), 180.0);
    }

    #[test]
    fn direction_is_always_in_compass_range() {
        for &(lat, lon) in &[
            (51.5074, -0.1278),
            (-33.8688, 151.2093),
            (64.1466, -21.9426),
            (-54.8019, -68.3030),
        ] {
            let direction = qibla_direction(lat, lon);
            assert!((0.0..360.0).contains(&direction));
        }
    }
}
