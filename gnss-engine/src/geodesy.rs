//! ECEF to WGS84 geodetic conversion.

const WGS84A: f64 = 6_378_137.0; // equatorial radius, meters
const WGS84B: f64 = 6_356_752.3142; // polar radius, meters

/// A geodetic fix derived from an ECEF position/velocity solution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Wgs84Fix {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    /// Horizontal speed, m/s.
    pub speed: f64,
    /// Course over ground, degrees from true north in [0, 360).
    pub track: f64,
    /// Vertical speed, m/s, positive up.
    pub climb: f64,
}

/// Convert an ECEF position (meters) and velocity (m/s) to a WGS84 fix.
pub fn ecef_to_wgs84(x: f64, y: f64, z: f64, vx: f64, vy: f64, vz: f64) -> Wgs84Fix {
    let e2 = (WGS84A * WGS84A - WGS84B * WGS84B) / (WGS84A * WGS84A);
    let e_2 = (WGS84A * WGS84A - WGS84B * WGS84B) / (WGS84B * WGS84B);

    let lambda = y.atan2(x);
    let p = x.hypot(y);
    let theta = (z * WGS84A).atan2(p * WGS84B);
    let phi = (z + e_2 * WGS84B * theta.sin().powi(3))
        .atan2(p - e2 * WGS84A * theta.cos().powi(3));
    let n = WGS84A / (1.0 - e2 * phi.sin().powi(2)).sqrt();
    let altitude = p / phi.cos() - n;

    let vnorth =
        -vx * phi.sin() * lambda.cos() - vy * phi.sin() * lambda.sin() + vz * phi.cos();
    let veast = -vx * lambda.sin() + vy * lambda.cos();
    let climb = vx * phi.cos() * lambda.cos() + vy * phi.cos() * lambda.sin() + vz * phi.sin();

    let speed = vnorth.hypot(veast);
    let mut track = veast.atan2(vnorth).to_degrees();
    if track < 0.0 {
        track += 360.0;
    }

    Wgs84Fix {
        latitude: phi.to_degrees(),
        longitude: lambda.to_degrees(),
        altitude,
        speed,
        track,
        climb,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equator_prime_meridian() {
        let fix = ecef_to_wgs84(WGS84A, 0.0, 0.0, 0.0, 0.0, 0.0);
        assert!(fix.latitude.abs() < 1e-9);
        assert!(fix.longitude.abs() < 1e-9);
        assert!(fix.altitude.abs() < 1e-6);
    }

    #[test]
    fn northward_velocity_gives_zero_track() {
        let fix = ecef_to_wgs84(WGS84A, 0.0, 0.0, 0.0, 0.0, 10.0);
        assert!((fix.speed - 10.0).abs() < 1e-9);
        assert!(fix.track.abs() < 1e-9);
    }

    #[test]
    fn eastward_velocity_gives_090_track() {
        let fix = ecef_to_wgs84(WGS84A, 0.0, 0.0, 0.0, 10.0, 0.0);
        assert!((fix.track - 90.0).abs() < 1e-9);
        assert!((fix.speed - 10.0).abs() < 1e-9);
    }

    #[test]
    fn known_point() {
        let fix = ecef_to_wgs84(1_000_000.0, 2_000_000.0, 3_000_000.0, 0.0, 0.0, 0.0);
        assert!((fix.latitude - 53.613_705_372_558_19).abs() < 1e-9);
        assert!((fix.longitude - 63.434_948_822_922_01).abs() < 1e-9);
    }
}
