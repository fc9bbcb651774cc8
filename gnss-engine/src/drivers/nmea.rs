//! Generic NMEA 0183 driver and the trigger-string family that rides on it.
//!
//! The generic driver is the auto-detection fallback: every new session
//! starts here, and sentences that parse to nothing are offered to the
//! registry's trigger strings by the session. The initializer fires the
//! probe strings that make known receiver families reveal themselves.

use std::io::{self, Write};

use chrono::{NaiveDate, Utc};
use log::{debug, info};

use crate::drivers::Driver;
use crate::error::EngineError;
use crate::lexer::{Packet, PacketType};
use crate::navdata::{DirtyMask, FixMode, FixStatus, Satellite};
use crate::session::{Context, DriverMode, SessionState};

const KNOTS_TO_MPS: f64 = 0.514_444_444_444_444_4;

/// Write one NMEA string. A `$`-prefixed body gets its checksum appended;
/// anything else is passed through raw, in either case CRLF-terminated.
pub(crate) fn nmea_send(device: &mut dyn Write, body: &str) -> io::Result<()> {
    if let Some(stripped) = body.strip_prefix('$') {
        let csum = stripped.bytes().fold(0u8, |acc, b| acc ^ b);
        write!(device, "{body}*{csum:02X}\r\n")
    } else {
        write!(device, "{body}\r\n")
    }
}

fn num<T: core::str::FromStr>(fields: &[&str], index: usize) -> Option<T> {
    fields
        .get(index)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse().ok())
}

/// Parse a ddmm.mmmm coordinate plus its hemisphere field.
fn coordinate(fields: &[&str], index: usize, negative: char) -> Option<f64> {
    let raw: f64 = num(fields, index)?;
    let hemisphere = fields.get(index + 1)?.chars().next()?;
    let degrees = (raw / 100.0).trunc();
    let minutes = raw - degrees * 100.0;
    let value = degrees + minutes / 60.0;
    Some(if hemisphere == negative { -value } else { value })
}

fn parse_hms(s: &str) -> Option<(u32, u32, f64)> {
    if s.len() < 6 {
        return None;
    }
    let h = s[0..2].parse().ok()?;
    let m = s[2..4].parse().ok()?;
    let sec = s[4..].parse().ok()?;
    Some((h, m, sec))
}

/// Merge a sentence's time-of-day with the session's date state. With no
/// date seen yet, the result is day-relative.
fn merge_time(state: &mut SessionState, fields: &[&str], index: usize) -> Option<f64> {
    let (h, m, s) = parse_hms(fields.get(index)?)?;
    let day_seconds = f64::from(h * 3600 + m * 60) + s;
    let base = state
        .nmea
        .date
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map_or(0.0, |dt| dt.and_utc().timestamp() as f64);
    Some(base + day_seconds)
}

fn set_time(state: &mut SessionState, fields: &[&str], index: usize, mask: &mut DirtyMask) {
    if let Some(t) = merge_time(state, fields, index) {
        state.nav.time = t;
        state.nav.sentence_time = t;
        *mask |= DirtyMask::TIME;
    }
}

/// Parse one checksum-validated NMEA sentence into the navigation record.
///
/// Empty fields leave the record untouched and set no mask bit; unknown
/// sentence types return an empty mask so trigger matching can run.
pub(crate) fn parse_sentence(
    sentence: &[u8],
    state: &mut SessionState,
    _context: &Context,
) -> DirtyMask {
    let text = match core::str::from_utf8(sentence) {
        Ok(t) => t.trim_end(),
        Err(_) => return DirtyMask::empty(),
    };
    let body = text
        .strip_prefix('$')
        .unwrap_or(text)
        .split('*')
        .next()
        .unwrap_or_default();
    let fields: Vec<&str> = body.split(',').collect();
    let tag = fields[0];
    if tag.len() < 3 {
        return DirtyMask::empty();
    }
    state.tag = tag.to_string();

    match &tag[tag.len() - 3..] {
        "GGA" => gga(&fields, state),
        "RMC" => rmc(&fields, state),
        "GSA" => gsa(&fields, state),
        "GSV" => gsv(&fields, state),
        "GLL" => gll(&fields, state),
        "VTG" => vtg(&fields, state),
        "ZDA" => zda(&fields, state),
        other => {
            debug!("nmea: unknown sentence type {other}");
            DirtyMask::empty()
        },
    }
}

fn gga(fields: &[&str], state: &mut SessionState) -> DirtyMask {
    let mut mask = DirtyMask::empty();
    set_time(state, fields, 1, &mut mask);

    let status = match num::<u8>(fields, 6) {
        Some(0) | None => FixStatus::NoFix,
        Some(2) => FixStatus::DgpsFix,
        Some(_) => FixStatus::Fix,
    };
    state.nav.status = status;
    mask |= DirtyMask::STATUS;

    if status != FixStatus::NoFix {
        if let (Some(lat), Some(lon)) = (
            coordinate(fields, 2, 'S'),
            coordinate(fields, 4, 'W'),
        ) {
            state.nav.latitude = lat;
            state.nav.longitude = lon;
            mask |= DirtyMask::LATLON;
        }
        if let Some(alt) = num::<f64>(fields, 9) {
            state.nav.altitude = alt;
            state.nav.mode = FixMode::Fix3d;
            mask |= DirtyMask::ALTITUDE | DirtyMask::MODE;
        }
        if let Some(sep) = num::<f64>(fields, 11) {
            state.nav.separation = sep;
        }
    } else {
        state.nav.mode = FixMode::NoFix;
        mask |= DirtyMask::MODE;
    }
    if let Some(hdop) = num::<f64>(fields, 8) {
        state.nav.hdop = hdop;
        mask |= DirtyMask::DOP;
    }
    mask
}

fn rmc(fields: &[&str], state: &mut SessionState) -> DirtyMask {
    let mut mask = DirtyMask::empty();
    if let Some(datestr) = fields.get(9).filter(|s| s.len() == 6) {
        let day: u32 = datestr[0..2].parse().unwrap_or(0);
        let month: u32 = datestr[2..4].parse().unwrap_or(0);
        let yy: i32 = datestr[4..6].parse().unwrap_or(0);
        let year = if yy < 80 { 2000 + yy } else { 1900 + yy };
        state.nmea.date = NaiveDate::from_ymd_opt(year, month, day);
    }
    set_time(state, fields, 1, &mut mask);

    match fields.get(2) {
        Some(&"A") => {
            state.nav.status = FixStatus::Fix;
            mask |= DirtyMask::STATUS;
            if state.nav.mode == FixMode::NoFix {
                state.nav.mode = FixMode::Fix2d;
                mask |= DirtyMask::MODE;
            }
            if let (Some(lat), Some(lon)) = (
                coordinate(fields, 3, 'S'),
                coordinate(fields, 5, 'W'),
            ) {
                state.nav.latitude = lat;
                state.nav.longitude = lon;
                mask |= DirtyMask::LATLON;
            }
            if let Some(knots) = num::<f64>(fields, 7) {
                state.nav.speed = knots * KNOTS_TO_MPS;
                mask |= DirtyMask::SPEED;
            }
            if let Some(track) = num::<f64>(fields, 8) {
                state.nav.track = track;
                mask |= DirtyMask::TRACK;
            }
        },
        Some(&"V") => {
            state.nav.status = FixStatus::NoFix;
            mask |= DirtyMask::STATUS;
        },
        _ => {},
    }
    mask
}

fn gsa(fields: &[&str], state: &mut SessionState) -> DirtyMask {
    let mut mask = DirtyMask::empty();
    match num::<u8>(fields, 2) {
        Some(2) => {
            state.nav.mode = FixMode::Fix2d;
            mask |= DirtyMask::MODE;
        },
        Some(3) => {
            state.nav.mode = FixMode::Fix3d;
            mask |= DirtyMask::MODE;
        },
        Some(_) => {
            state.nav.mode = FixMode::NoFix;
            mask |= DirtyMask::MODE;
        },
        None => {},
    }
    let used: Vec<u16> = (3..15).filter_map(|i| num::<u16>(fields, i)).collect();
    if !used.is_empty() {
        state.nav.used = used;
        mask |= DirtyMask::USED;
    }
    let mut dop = false;
    if let Some(pdop) = num::<f64>(fields, 15) {
        state.nav.pdop = pdop;
        dop = true;
    }
    if let Some(hdop) = num::<f64>(fields, 16) {
        state.nav.hdop = hdop;
        dop = true;
    }
    if let Some(vdop) = num::<f64>(fields, 17) {
        state.nav.vdop = vdop;
        dop = true;
    }
    if dop {
        mask |= DirtyMask::DOP;
    }
    mask
}

fn gsv(fields: &[&str], state: &mut SessionState) -> DirtyMask {
    let total: u8 = match num(fields, 1) {
        Some(t) => t,
        None => return DirtyMask::empty(),
    };
    let index: u8 = match num(fields, 2) {
        Some(i) => i,
        None => return DirtyMask::empty(),
    };
    if index == 1 {
        state.nmea.gsv_pending.clear();
    }
    for group in 0..4 {
        let base = 4 + group * 4;
        if let Some(prn) = num::<u16>(fields, base) {
            state.nmea.gsv_pending.push(Satellite {
                prn,
                elevation: num(fields, base + 1).unwrap_or(0),
                azimuth: num(fields, base + 2).unwrap_or(0),
                snr: num(fields, base + 3).unwrap_or(0.0),
            });
        }
    }
    if index == total {
        state.nav.satellites = core::mem::take(&mut state.nmea.gsv_pending);
        DirtyMask::SATELLITE
    } else {
        DirtyMask::empty()
    }
}

fn gll(fields: &[&str], state: &mut SessionState) -> DirtyMask {
    let mut mask = DirtyMask::empty();
    if fields.get(6) == Some(&"A") {
        state.nav.status = FixStatus::Fix;
        mask |= DirtyMask::STATUS;
        if let (Some(lat), Some(lon)) = (
            coordinate(fields, 1, 'S'),
            coordinate(fields, 3, 'W'),
        ) {
            state.nav.latitude = lat;
            state.nav.longitude = lon;
            mask |= DirtyMask::LATLON;
        }
        set_time(state, fields, 5, &mut mask);
    }
    mask
}

fn vtg(fields: &[&str], state: &mut SessionState) -> DirtyMask {
    let mut mask = DirtyMask::empty();
    if let Some(track) = num::<f64>(fields, 1) {
        state.nav.track = track;
        mask |= DirtyMask::TRACK;
    }
    if let Some(knots) = num::<f64>(fields, 5) {
        state.nav.speed = knots * KNOTS_TO_MPS;
        mask |= DirtyMask::SPEED;
    }
    mask
}

fn zda(fields: &[&str], state: &mut SessionState) -> DirtyMask {
    let mut mask = DirtyMask::empty();
    if let (Some(day), Some(month), Some(year)) = (
        num::<u32>(fields, 2),
        num::<u32>(fields, 3),
        num::<i32>(fields, 4),
    ) {
        state.nmea.date = NaiveDate::from_ymd_opt(year, month, day);
    }
    set_time(state, fields, 1, &mut mask);
    mask
}

/// Straight NMEA 0183: the default driver and auto-detection fallback.
pub struct GenericNmea;

pub static GENERIC_NMEA: GenericNmea = GenericNmea;

impl Driver for GenericNmea {
    fn name(&self) -> &'static str {
        "Generic NMEA"
    }

    fn channels(&self) -> usize {
        12
    }

    fn native_packet(&self) -> Option<PacketType> {
        Some(PacketType::Nmea)
    }

    fn initializer(&self, device: &mut dyn Write) -> io::Result<()> {
        // Tell an FV18 to send GSAs so we'll know if 3D is accurate.
        // Suppress GLL and VTG, enable ZDA so dates stay accurate.
        nmea_send(
            device,
            "$PFEC,GPint,GSA01,DTM00,ZDA01,RMC01,GLL00,VTG00,GSV05",
        )?;
        // Sony CXD2951 chips
        nmea_send(device, "@NC10151010")?;
        // enable GPZDA on a Motorola Oncore GT+
        nmea_send(device, "$PMOTG,ZDA,1")?;
        // enable GPGSA on Garmin serial GPS
        nmea_send(device, "$PGRM0,GSA,1")?;
        // probe for SiRF-II
        nmea_send(device, "$PSRF105,1")?;
        // probe for iTrax, looking for "OK"
        nmea_send(device, "$PFST")?;
        // probe for EverMore by trying to read the LogConfig
        device.write_all(b"\x10\x02\x04\x81\x13\x94\x10\x03")?;
        Ok(())
    }

    fn parse(&self, packet: &Packet, state: &mut SessionState, context: &Context) -> DirtyMask {
        match packet.ptype {
            PacketType::Nmea => {
                state.driver_mode = DriverMode::Nmea;
                parse_sentence(&packet.data, state, context)
            },
            _ => DirtyMask::empty(),
        }
    }
}

/// SiRF-II in NMEA mode, detected by the reply to the PSRF105 probe.
pub struct SirfNmea;

pub static SIRF_NMEA: SirfNmea = SirfNmea;

impl SirfNmea {
    fn switcher(device: &mut dyn Write, nmea: u8, speed: u32) -> io::Result<()> {
        nmea_send(device, &format!("$PSRF100,{nmea},{speed},8,1,0"))
    }
}

impl Driver for SirfNmea {
    fn name(&self) -> &'static str {
        "SiRF-II NMEA"
    }

    fn trigger(&self) -> Option<&'static [u8]> {
        Some(b"$Ack Input105.")
    }

    fn channels(&self) -> usize {
        12
    }

    fn initializer(&self, device: &mut dyn Write) -> io::Result<()> {
        nmea_send(device, "$PSRF105,0")?;
        nmea_send(device, "$PSRF103,05,00,00,01")?; // no VTG
        nmea_send(device, "$PSRF103,01,00,00,01")?; // no GLL
        Ok(())
    }

    fn parse(&self, packet: &Packet, state: &mut SessionState, context: &Context) -> DirtyMask {
        GENERIC_NMEA.parse(packet, state, context)
    }

    fn speed_switcher(&self, device: &mut dyn Write, speed: u32) -> Result<(), EngineError> {
        info!("sirf: switching to {speed} baud");
        SirfNmea::switcher(device, 1, speed)?;
        Ok(())
    }
}

/// San Jose Navigation FV18, which echoes the configuration probe.
pub struct Fv18;

pub static FV18: Fv18 = Fv18;

impl Driver for Fv18 {
    fn name(&self) -> &'static str {
        "San Jose Navigation FV18"
    }

    fn trigger(&self) -> Option<&'static [u8]> {
        Some(b"$PFEC,GPint")
    }

    fn channels(&self) -> usize {
        12
    }

    fn parse(&self, packet: &Packet, state: &mut SessionState, context: &Context) -> DirtyMask {
        GENERIC_NMEA.parse(packet, state, context)
    }
}

/// Delorme TripMate, which announces itself with ASTRAL at boot.
pub struct TripMate;

pub static TRIPMATE: TripMate = TripMate;

impl Driver for TripMate {
    fn name(&self) -> &'static str {
        "Delorme TripMate"
    }

    fn trigger(&self) -> Option<&'static [u8]> {
        Some(b"$ASTRAL")
    }

    fn channels(&self) -> usize {
        12
    }

    fn initializer(&self, device: &mut dyn Write) -> io::Result<()> {
        // the TripMate requires this response to the ASTRAL it sends at boot
        nmea_send(device, "$IIGPQ,ASTRAL")?;
        // stop it sending PRWIZCH
        nmea_send(device, "$PRWIILOG,ZCH,V,,")?;
        Ok(())
    }

    fn parse(&self, packet: &Packet, state: &mut SessionState, context: &Context) -> DirtyMask {
        GENERIC_NMEA.parse(packet, state, context)
    }
}

/// iTrax chipset in NMEA mode, as used in the FastTrax.
pub struct Itrax;

pub static ITRAX: Itrax = Itrax;

const ITRAX_MODESTRING: &str = "$PFST,NMEA,A007";

impl Driver for Itrax {
    fn name(&self) -> &'static str {
        "iTrax"
    }

    fn trigger(&self) -> Option<&'static [u8]> {
        Some(b"$PFST,OK")
    }

    fn channels(&self) -> usize {
        12
    }

    fn initializer(&self, device: &mut dyn Write) -> io::Result<()> {
        // initialize the GPS clock with the current system time
        let now = Utc::now();
        nmea_send(
            device,
            &format!("$PFST,INITAID,{}.00,{}", now.format("%H%M%S"), now.format("%d%m%y")),
        )?;
        nmea_send(device, "$PFST,START")?;
        nmea_send(device, "$PFST,SYNCMODE,1")?;
        Ok(())
    }

    fn parse(&self, packet: &Packet, state: &mut SessionState, context: &Context) -> DirtyMask {
        GENERIC_NMEA.parse(packet, state, context)
    }

    fn speed_switcher(&self, device: &mut dyn Write, speed: u32) -> Result<(), EngineError> {
        nmea_send(device, &format!("{ITRAX_MODESTRING},{speed}"))?;
        Ok(())
    }

    fn rate_switcher(&self, device: &mut dyn Write, rate: f64) -> Result<(), EngineError> {
        nmea_send(device, &format!("$PSFT,FIXRATE,{rate}"))?;
        Ok(())
    }

    fn cycle_chars(&self) -> Option<usize> {
        Some(438)
    }

    fn wrapup(&self, device: &mut dyn Write) -> io::Result<()> {
        // stop navigation, this cuts the power drain
        nmea_send(device, "$PFST,SYNCMODE,0")?;
        nmea_send(device, "$PFST,STOP")
    }
}
