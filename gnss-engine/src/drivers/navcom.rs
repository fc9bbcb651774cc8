//! Navcom NCT binary driver.
//!
//! Frames are `02 99 66 CMD LEN_LE payload XOR 03`, XOR taken over cmd,
//! length and payload. Understood responses are 0xb1 (PVT block) and 0x86
//! (channel status); the initializer requests them plus the raw measurement
//! block at a 10-decisecond rate.

use std::io::{self, Write};

use log::{debug, info};

use crate::bits::{get_i24_le, get_i32_le, get_u16_le, get_u32_le, get_u8, put_u16_le};
use crate::drivers::{nmea, Driver};
use crate::gpstime::gpstime_to_unix;
use crate::lexer::{Packet, PacketType};
use crate::navdata::{DirtyMask, FixMode, FixStatus, Satellite};
use crate::session::{Context, DriverMode, SessionState};

const NAVCOM_CHANNELS: usize = 26; // 12 L1 + 12 L2 + 2 L-band

/// Lat/lon base resolution, 2^-11 arcseconds.
const LL_RES: f64 = 0.000_488_281_25;
/// Lat/lon fraction resolution, 2^-15 arcseconds.
const LL_FRAC_RES: f64 = 0.000_030_517_578_125;
/// Height and altitude resolution, 2^-10 meters.
const EL_RES: f64 = 0.000_976_562_5;
/// Velocity resolution, 2^-10 m/s.
const VEL_RES: f64 = 0.000_976_562_5;
/// DOP wire value meaning "undefined".
const DOP_UNDEFINED: u8 = 255;

fn xor(buf: &[u8]) -> u8 {
    buf.iter().fold(0, |acc, &b| acc ^ b)
}

fn send_cmd(device: &mut dyn Write, cmd: u8, payload: &[u8]) -> io::Result<()> {
    let mut msg = vec![0x02, 0x99, 0x66, cmd, 0, 0];
    put_u16_le(&mut msg, 4, (payload.len() + 4) as u16);
    msg.extend_from_slice(payload);
    msg.push(xor(&msg[3..]));
    msg.push(0x03);
    debug!("navcom: sending command 0x{cmd:02x}");
    device.write_all(&msg)
}

/// Data request: ask for `block_id` on the serial port at `rate`.
fn cmd_data_request(device: &mut dyn Write, block_id: u8, rate: u16) -> io::Result<()> {
    let mut payload = [0u8; 6];
    payload[2] = block_id;
    payload[3] = 0x02; // logical ports
    put_u16_le(&mut payload, 4, rate);
    send_cmd(device, 0x20, &payload)
}

/// LED configuration, used as a liveness blink during probing.
fn cmd_led_config(device: &mut dyn Write) -> io::Result<()> {
    send_cmd(device, 0x3f, &[0x01, 0x00, 0x02, 0x0a])
}

/// Test support block, blinks the front panel lights.
fn cmd_test_support(device: &mut dyn Write, mode: u8) -> io::Result<()> {
    send_cmd(device, 0x1c, &[0x00, mode, mode, 0x00])
}

/// PVT block.
fn handle_pvt(buf: &[u8], state: &mut SessionState, context: &Context) -> DirtyMask {
    if buf.len() < 46 {
        return DirtyMask::empty();
    }
    let week = i32::from(get_u16_le(buf, 3));
    let tow = f64::from(get_u32_le(buf, 5)) / 1000.0;
    let t = gpstime_to_unix(week, tow) - f64::from(context.leap_seconds);
    state.nav.time = t;
    state.nav.sentence_time = t;

    let sats_used = get_u32_le(buf, 9);
    state.nav.used = (0u32..31)
        .filter(|n| sats_used & (1 << n) != 0)
        .map(|n| n as u16 + 1)
        .collect();

    let lat = f64::from(get_i32_le(buf, 13));
    let lon = f64::from(get_i32_le(buf, 17));
    let lat_fraction = f64::from(get_u8(buf, 21) >> 4);
    let lon_fraction = f64::from(get_u8(buf, 21) & 0x0f);
    state.nav.latitude = (lat * LL_RES + lat_fraction * LL_FRAC_RES) / 3600.0;
    state.nav.longitude = (lon * LL_RES + lon_fraction * LL_FRAC_RES) / 3600.0;

    let nav_mode = get_u8(buf, 22);
    if nav_mode & 0xc0 == 0xc0 {
        state.nav.mode = FixMode::Fix3d;
    } else if nav_mode & 0x80 != 0 {
        state.nav.mode = FixMode::Fix2d;
    } else {
        state.nav.mode = FixMode::NoFix;
    }
    state.nav.status = if state.nav.mode == FixMode::NoFix {
        FixStatus::NoFix
    } else if nav_mode & 0x03 != 0 {
        FixStatus::DgpsFix
    } else {
        FixStatus::Fix
    };

    // both heights are preserved; the consumer picks
    let ellips_height = f64::from(get_i32_le(buf, 23));
    let altitude = f64::from(get_i32_le(buf, 27));
    state.nav.altitude = altitude * EL_RES;
    state.nav.separation = (ellips_height - altitude) * EL_RES;

    let vel_north = f64::from(get_i24_le(buf, 31));
    let vel_east = f64::from(get_i24_le(buf, 34));
    let vel_up = f64::from(get_i24_le(buf, 37));
    let mut track = vel_north.atan2(vel_east);
    if track < 0.0 {
        track += 2.0 * core::f64::consts::PI;
    }
    state.nav.track = track.to_degrees();
    state.nav.speed = (vel_east * VEL_RES).hypot(vel_north * VEL_RES);
    state.nav.climb = vel_up * VEL_RES;

    let fom = get_u8(buf, 40);
    state.nav.eph = f64::from(fom) / 100.0;
    let dop = |offset: usize| {
        let raw = get_u8(buf, offset);
        if raw == DOP_UNDEFINED {
            f64::NAN
        } else {
            f64::from(raw) / 10.0
        }
    };
    let gdop = dop(41);
    let pdop = dop(42);
    let hdop = dop(43);
    let vdop = dop(44);
    let tdop = dop(45);
    // no vertical error on the wire; scale the FOM by the DOP ratio
    state.nav.epv = f64::from(fom) / f64::from(get_u8(buf, 43)) * f64::from(get_u8(buf, 44)) / 100.0;
    state.nav.gdop = gdop;
    state.nav.pdop = pdop;
    state.nav.hdop = hdop;
    state.nav.vdop = vdop;
    state.nav.tdop = tdop;

    debug!(
        "navcom: PVT week {week} tow {tow:.3} lat {:.6} lon {:.6} mode {:?}",
        state.nav.latitude, state.nav.longitude, state.nav.mode
    );

    DirtyMask::LATLON
        | DirtyMask::ALTITUDE
        | DirtyMask::CLIMB
        | DirtyMask::SPEED
        | DirtyMask::TRACK
        | DirtyMask::TIME
        | DirtyMask::STATUS
        | DirtyMask::MODE
        | DirtyMask::USED
        | DirtyMask::HERR
        | DirtyMask::VERR
        | DirtyMask::DOP
        | DirtyMask::CYCLE_START
}

/// Channel status block.
fn handle_channel_status(buf: &[u8], state: &mut SessionState, context: &Context) -> DirtyMask {
    if buf.len() < 17 {
        return DirtyMask::empty();
    }
    let msg_len = usize::from(get_u16_le(buf, 1));
    let week = i32::from(get_u16_le(buf, 3));
    let tow = f64::from(get_u32_le(buf, 5)) / 1000.0;
    let status = get_u16_le(buf, 10);
    let sats_visible = get_u8(buf, 12);
    let sats_tracked = get_u8(buf, 13);
    let sats_used = get_u8(buf, 14);

    state.nav.time = gpstime_to_unix(week, tow) - f64::from(context.leap_seconds);
    state.nav.pdop = f64::from(get_u8(buf, 15)) / 10.0;

    state.nav.status = match status & 0x05 {
        0x05 => FixStatus::DgpsFix,
        0x01 => FixStatus::Fix,
        _ => FixStatus::NoFix,
    };

    debug!(
        "navcom: channel status, visible {sats_visible} tracked {sats_tracked} used {sats_used}"
    );

    state.nav.satellites.clear();
    let mut at = 17;
    while at + 14 <= msg_len.min(buf.len()) {
        let tracking_status = get_u8(buf, at + 1);
        if tracking_status != 0 {
            let p2_snr = get_u8(buf, at + 10);
            let ca_snr = get_u8(buf, at + 8);
            state.nav.satellites.push(Satellite {
                prn: u16::from(get_u8(buf, at)),
                elevation: i16::from(get_u8(buf, at + 5)),
                azimuth: get_u16_le(buf, at + 6),
                snr: f64::from(if p2_snr != 0 { p2_snr } else { ca_snr }) / 4.0,
            });
        }
        at += 14;
    }

    DirtyMask::TIME | DirtyMask::DOP | DirtyMask::SATELLITE | DirtyMask::STATUS
}

/// Decode one complete Navcom frame.
pub(crate) fn navcom_decode(frame: &[u8], state: &mut SessionState, context: &Context) -> DirtyMask {
    if frame.len() < 8 {
        return DirtyMask::empty();
    }
    let buf = &frame[3..];
    let cmd_id = get_u8(buf, 0);
    state.tag = format!("0x{cmd_id:02x}");

    match cmd_id {
        0xb1 => handle_pvt(buf, state, context),
        0x86 => handle_channel_status(buf, state, context),
        _ => {
            info!(
                "navcom: unknown or unimplemented packet id 0x{cmd_id:02x}, length {}",
                get_u16_le(buf, 1)
            );
            DirtyMask::empty()
        },
    }
}

/// Navcom receivers speaking the proprietary NCT binary protocol.
pub struct NavcomBinary;

pub static NAVCOM_BINARY: NavcomBinary = NavcomBinary;

impl Driver for NavcomBinary {
    fn name(&self) -> &'static str {
        "Navcom binary"
    }

    fn trigger(&self) -> Option<&'static [u8]> {
        Some(b"\x02\x99\x66")
    }

    fn channels(&self) -> usize {
        NAVCOM_CHANNELS
    }

    fn native_packet(&self) -> Option<PacketType> {
        Some(PacketType::Navcom)
    }

    fn initializer(&self, device: &mut dyn Write) -> io::Result<()> {
        cmd_led_config(device)?;
        cmd_test_support(device, 0x02)?;
        cmd_data_request(device, 0xb1, 0x000a)?;
        cmd_data_request(device, 0xb0, 0x000a)?;
        cmd_data_request(device, 0x86, 0x000a)?;
        Ok(())
    }

    fn parse(&self, packet: &Packet, state: &mut SessionState, context: &Context) -> DirtyMask {
        match packet.ptype {
            PacketType::Navcom => {
                state.driver_mode = DriverMode::Binary;
                navcom_decode(&packet.data, state, context)
            },
            PacketType::Nmea => {
                state.driver_mode = DriverMode::Nmea;
                nmea::parse_sentence(&packet.data, state, context)
            },
            _ => DirtyMask::empty(),
        }
    }
}
