//! The unified navigation model shared by every driver.

use bitflags::bitflags;

use crate::constants::MAXCHANNELS;

bitflags! {
    /// Field categories of the navigation record.
    ///
    /// Every parse call returns the mask of categories it mutated; consumers
    /// use it to publish minimal updates. A set bit with an unchanged value
    /// never happens; a changed value with a clear bit is a driver bug.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct DirtyMask: u32 {
        const ONLINE      = 1;
        const TIME        = 1 << 1;
        const TIMERR      = 1 << 2;
        const LATLON      = 1 << 3;
        const ALTITUDE    = 1 << 4;
        const SPEED       = 1 << 5;
        const TRACK       = 1 << 6;
        const CLIMB       = 1 << 7;
        const STATUS      = 1 << 8;
        const MODE        = 1 << 9;
        const DOP         = 1 << 10;
        const HERR        = 1 << 11;
        const VERR        = 1 << 12;
        const SATELLITE   = 1 << 13;
        const USED        = 1 << 14;
        const CYCLE_START = 1 << 15;
        const DEVICEID    = 1 << 16;
        const RTCM        = 1 << 17;
        const AIS         = 1 << 18;
        const ERROR       = 1 << 19;
    }
}

/// Dimensionality of the position solution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FixMode {
    #[default]
    NoFix,
    Fix2d,
    Fix3d,
}

/// Quality of the position solution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FixStatus {
    #[default]
    NoFix,
    Fix,
    DgpsFix,
}

/// One tracked satellite channel.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Satellite {
    pub prn: u16,
    /// Elevation, degrees.
    pub elevation: i16,
    /// Azimuth, degrees from true north.
    pub azimuth: u16,
    /// Signal strength, dB or dBHz as the receiver reports it.
    pub snr: f64,
}

/// Wall-clock stamps of when each field category last changed.
///
/// `NaN` marks a category never reported on this session.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FieldStamps {
    pub time: f64,
    pub latlon: f64,
    pub altitude: f64,
    pub speed: f64,
    pub track: f64,
    pub climb: f64,
    pub status: f64,
    pub mode: f64,
    pub dop: f64,
    pub satellite: f64,
    pub used: f64,
}

impl Default for FieldStamps {
    fn default() -> Self {
        FieldStamps {
            time: f64::NAN,
            latlon: f64::NAN,
            altitude: f64::NAN,
            speed: f64::NAN,
            track: f64::NAN,
            climb: f64::NAN,
            status: f64::NAN,
            mode: f64::NAN,
            dop: f64::NAN,
            satellite: f64::NAN,
            used: f64::NAN,
        }
    }
}

/// The unified fix record, updated incrementally by whichever driver owns
/// the session.
///
/// DOPs and error estimates are `NaN` when not reported this cycle.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NavigationRecord {
    /// Seconds since the Unix epoch, UTC. NaN before the first timed fix.
    pub time: f64,
    /// Timestamp carried by the most recent sentence or packet.
    pub sentence_time: f64,

    pub latitude: f64,
    pub longitude: f64,
    /// Altitude above mean sea level, meters.
    pub altitude: f64,
    /// Geoid separation (ellipsoid height minus MSL altitude), meters.
    pub separation: f64,
    /// Horizontal speed, m/s.
    pub speed: f64,
    /// Course over ground, degrees from true north.
    pub track: f64,
    /// Vertical speed, m/s.
    pub climb: f64,

    /// Estimated horizontal position error, meters.
    pub eph: f64,
    /// Estimated vertical position error, meters.
    pub epv: f64,
    /// Estimated track error, degrees.
    pub epd: f64,
    /// Estimated speed error, m/s.
    pub eps: f64,
    /// Estimated climb error, m/s.
    pub epc: f64,

    pub mode: FixMode,
    pub status: FixStatus,

    pub gdop: f64,
    pub pdop: f64,
    pub hdop: f64,
    pub vdop: f64,
    pub tdop: f64,

    /// Channels currently visible, bounded by the active driver's channel
    /// count.
    pub satellites: Vec<Satellite>,
    /// PRNs used in the current solution.
    pub used: Vec<u16>,

    pub online: bool,

    /// When each category was last updated, Unix seconds.
    pub stamps: FieldStamps,
}

impl Default for NavigationRecord {
    fn default() -> Self {
        NavigationRecord {
            time: f64::NAN,
            sentence_time: f64::NAN,
            latitude: f64::NAN,
            longitude: f64::NAN,
            altitude: f64::NAN,
            separation: f64::NAN,
            speed: f64::NAN,
            track: f64::NAN,
            climb: f64::NAN,
            eph: f64::NAN,
            epv: f64::NAN,
            epd: f64::NAN,
            eps: f64::NAN,
            epc: f64::NAN,
            mode: FixMode::NoFix,
            status: FixStatus::NoFix,
            gdop: f64::NAN,
            pdop: f64::NAN,
            hdop: f64::NAN,
            vdop: f64::NAN,
            tdop: f64::NAN,
            satellites: Vec::with_capacity(MAXCHANNELS),
            used: Vec::with_capacity(MAXCHANNELS),
            online: false,
            stamps: FieldStamps::default(),
        }
    }
}

impl NavigationRecord {
    /// Clear the satellite view and used list, ahead of a fresh report.
    pub fn zero_satellites(&mut self) {
        self.satellites.clear();
        self.used.clear();
    }

    /// Record `when` against every category named in `mask`.
    pub fn stamp(&mut self, mask: DirtyMask, when: f64) {
        let pairs = [
            (DirtyMask::TIME, &mut self.stamps.time),
            (DirtyMask::LATLON, &mut self.stamps.latlon),
            (DirtyMask::ALTITUDE, &mut self.stamps.altitude),
            (DirtyMask::SPEED, &mut self.stamps.speed),
            (DirtyMask::TRACK, &mut self.stamps.track),
            (DirtyMask::CLIMB, &mut self.stamps.climb),
            (DirtyMask::STATUS, &mut self.stamps.status),
            (DirtyMask::MODE, &mut self.stamps.mode),
            (DirtyMask::DOP, &mut self.stamps.dop),
            (DirtyMask::SATELLITE, &mut self.stamps.satellite),
            (DirtyMask::USED, &mut self.stamps.used),
        ];
        for (bit, slot) in pairs {
            if mask.contains(bit) {
                *slot = when;
            }
        }
    }
}
