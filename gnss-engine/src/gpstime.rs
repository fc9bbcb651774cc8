//! GPS time scale conversions.
//!
//! GPS time is a (week, time-of-week) pair counted from 1980-01-06T00:00:00.
//! The converters are leap-second agnostic: the UTC correction is applied at
//! the call sites from the session [`Context`](crate::session::Context).

const GPS_EPOCH: i64 = 315_964_800; // 1980-01-06T00:00:00Z as Unix seconds
const SECS_PER_WEEK: i64 = 7 * 24 * 3600;

/// Convert a GPS (week, seconds-into-week) pair to Unix seconds.
pub fn gpstime_to_unix(week: i32, tow: f64) -> f64 {
    (GPS_EPOCH + i64::from(week) * SECS_PER_WEEK) as f64 + tow
}

/// Convert Unix seconds to a GPS (week, seconds-into-week) pair.
pub fn unix_to_gpstime(unixtime: f64) -> (i32, f64) {
    let since_epoch = unixtime - GPS_EPOCH as f64;
    let week = (since_epoch / SECS_PER_WEEK as f64).floor() as i32;
    let tow = since_epoch - f64::from(week) * SECS_PER_WEEK as f64;
    (week, tow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gps_epoch_is_week_zero() {
        assert_eq!(gpstime_to_unix(0, 0.0), 315_964_800.0);
    }

    #[test]
    fn week_1500_tow_600000() {
        assert_eq!(gpstime_to_unix(1500, 600_000.0), 1_223_764_800.0);
    }

    #[test]
    fn unix_round_trip() {
        let t = 1_223_764_800.0 + 0.25;
        let (week, tow) = unix_to_gpstime(t);
        assert_eq!(week, 1500);
        assert!((tow - 600_000.25).abs() < 1e-6);
        assert_eq!(gpstime_to_unix(week, tow), t);
    }
}
