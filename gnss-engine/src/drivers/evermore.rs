//! EverMore binary driver.
//!
//! Frames are `10 02 LEN payload CRC 10 03` with every `0x10` in the counted
//! region doubled. CRC is the sum of the payload bytes mod 256. About the
//! only thing binary mode gives us that NMEA won't is TDOP, but position
//! reports arrive atomically, which is good.

use std::io::{self, Write};

use log::{debug, info, warn};

use crate::bits::{get_i16_le, get_i32_le, get_u16_le, get_u32_le, get_u8};
use crate::constants::{DLE, ETX, STX};
use crate::drivers::{nmea, Driver};
use crate::error::EngineError;
use crate::geodesy::ecef_to_wgs84;
use crate::gpstime::gpstime_to_unix;
use crate::lexer::{Packet, PacketType};
use crate::navdata::{DirtyMask, FixMode, FixStatus, Satellite};
use crate::session::{Context, DriverMode, SessionState};

const EVERMORE_CHANNELS: usize = 12;

/// Wrap a message payload in a DLE-stuffed frame and write it out.
pub(crate) fn evermore_write(device: &mut dyn Write, msg: &[u8]) -> io::Result<()> {
    let mut stuffed = Vec::with_capacity(msg.len() * 2 + 6);
    stuffed.push(DLE);
    stuffed.push(STX);

    let len = (msg.len() + 2) as u8;
    stuffed.push(len);
    if len == DLE {
        stuffed.push(DLE);
    }

    let mut crc: u8 = 0;
    for &b in msg {
        stuffed.push(b);
        crc = crc.wrapping_add(b);
        if b == DLE {
            stuffed.push(DLE);
        }
    }

    stuffed.push(crc);
    if crc == DLE {
        stuffed.push(DLE);
    }
    stuffed.push(DLE);
    stuffed.push(ETX);

    debug!("evermore: writing control type 0x{:02x}", msg[0]);
    device.write_all(&stuffed)
}

/// Strip the framing and stuffing from a complete frame, returning the
/// payload (message id onward, CRC excluded).
pub(crate) fn unstuff(frame: &[u8]) -> Option<Vec<u8>> {
    let mut at = 2;
    if *frame.get(at)? == DLE {
        at += 1;
    }
    let datalen = usize::from(*frame.get(at)?).checked_sub(2)?;
    at += 1;

    let mut payload = Vec::with_capacity(datalen);
    while payload.len() < datalen {
        let b = *frame.get(at)?;
        at += 1;
        if b == DLE {
            if *frame.get(at)? != DLE {
                return None;
            }
            at += 1;
        }
        payload.push(b);
    }
    Some(payload)
}

/// Configure elevation mask, DOP mask and protocol selection to defaults.
fn evermore_default(device: &mut dyn Write, binary: bool) -> io::Result<()> {
    // elevation mask, degrees
    evermore_write(device, &[0x86, 5])?;
    // DOP mask: auto select, GDOP 20, PDOP 15, HDOP 8
    evermore_write(device, &[0x87, 1, 20, 15, 8])?;

    let mut protocol = [0x84u8, 0x01, 0x00, 0x00];
    if binary {
        info!("evermore: switching chip to binary protocol");
        protocol[1] = 0;
    }
    evermore_write(device, &protocol)
}

fn packet_time(payload: &[u8], state: &mut SessionState, context: &Context) -> f64 {
    let week = i32::from(get_u16_le(payload, 2));
    let tow = f64::from(get_u32_le(payload, 4)) * 0.01;
    let t = gpstime_to_unix(week, tow) - f64::from(context.leap_seconds);
    state.nav.time = t;
    state.nav.sentence_time = t;
    t
}

/// Decode one destuffed EverMore message into the navigation record.
pub(crate) fn evermore_decode(
    payload: &[u8],
    state: &mut SessionState,
    context: &Context,
) -> DirtyMask {
    if payload.is_empty() {
        return DirtyMask::empty();
    }
    let id = get_u8(payload, 0);
    state.tag = format!("EID{id}");

    match id {
        0x02 => {
            // Navigation Data Output
            if payload.len() < 29 {
                return DirtyMask::empty();
            }
            packet_time(payload, state, context);
            let fix = ecef_to_wgs84(
                f64::from(get_i32_le(payload, 8)),
                f64::from(get_i32_le(payload, 12)),
                f64::from(get_i32_le(payload, 16)),
                f64::from(get_i16_le(payload, 20)) / 10.0,
                f64::from(get_i16_le(payload, 22)) / 10.0,
                f64::from(get_i16_le(payload, 24)) / 10.0,
            );
            state.nav.latitude = fix.latitude;
            state.nav.longitude = fix.longitude;
            state.nav.speed = fix.speed;
            state.nav.track = fix.track;

            let used = get_u8(payload, 26) & 0x0f;
            let visible = (get_u8(payload, 26) & 0xf0) >> 4;
            let version = f64::from(get_u16_le(payload, 27)) / 100.0;

            let mut mask = DirtyMask::TIME
                | DirtyMask::LATLON
                | DirtyMask::TRACK
                | DirtyMask::SPEED
                | DirtyMask::MODE
                | DirtyMask::CYCLE_START;
            state.nav.mode = match used {
                0..=2 => FixMode::NoFix,
                3 => FixMode::Fix2d,
                _ => {
                    state.nav.altitude = fix.altitude;
                    state.nav.climb = fix.climb;
                    mask |= DirtyMask::ALTITUDE | DirtyMask::CLIMB;
                    FixMode::Fix3d
                },
            };
            debug!(
                "evermore: NDO 0x02 version {version:.2}, mode {:?}, visible {visible}, used {used}",
                state.nav.mode
            );
            mask
        },
        0x04 => {
            // DOP Data Output
            if payload.len() < 14 {
                return DirtyMask::empty();
            }
            packet_time(payload, state, context);
            state.nav.gdop = f64::from(get_u8(payload, 8)) * 0.1;
            state.nav.pdop = f64::from(get_u8(payload, 9)) * 0.1;
            state.nav.hdop = f64::from(get_u8(payload, 10)) * 0.1;
            state.nav.vdop = f64::from(get_u8(payload, 11)) * 0.1;
            state.nav.tdop = f64::from(get_u8(payload, 12)) * 0.1;
            let (status, mode) = match get_u8(payload, 13) {
                2 => (FixStatus::Fix, FixMode::Fix2d),
                3 => (FixStatus::Fix, FixMode::Fix3d),
                4 => (FixStatus::DgpsFix, FixMode::Fix3d),
                _ => (FixStatus::NoFix, FixMode::NoFix),
            };
            state.nav.status = status;
            state.nav.mode = mode;
            debug!("evermore: DDO 0x04 mode {mode:?}, status {status:?}");
            DirtyMask::TIME | DirtyMask::DOP | DirtyMask::MODE | DirtyMask::STATUS
        },
        0x06 => {
            // Channel Status Output
            if payload.len() < 9 {
                return DirtyMask::empty();
            }
            packet_time(payload, state, context);
            let mut reported = usize::from(get_u8(payload, 8));
            if reported > EVERMORE_CHANNELS {
                warn!("evermore: packet reports {reported} satellites, clamping");
                reported = EVERMORE_CHANNELS;
            }
            state.nav.zero_satellites();
            for i in 0..reported {
                let base = 7 * i + 9;
                if payload.len() < base + 7 {
                    break;
                }
                let prn = u16::from(get_u8(payload, base + 1));
                if prn == 0 {
                    // satellite record is not valid
                    continue;
                }
                state.nav.satellites.push(Satellite {
                    prn,
                    azimuth: get_u16_le(payload, base + 2),
                    elevation: i16::from(get_u8(payload, base + 4)),
                    snr: f64::from(get_u8(payload, base + 5)),
                });
                // status bit 6 marks the satellite as used in the fix
                if get_u8(payload, base + 6) & 0x40 != 0 {
                    state.nav.used.push(prn);
                }
            }
            debug!("evermore: CSO 0x06, {} satellites used", state.nav.used.len());
            DirtyMask::TIME | DirtyMask::SATELLITE | DirtyMask::USED
        },
        0x08 => {
            // Measurement Data Output; only the timestamp is of interest
            if payload.len() < 8 {
                return DirtyMask::empty();
            }
            packet_time(payload, state, context);
            DirtyMask::TIME
        },
        0x20 | 0x22 => {
            // LogConfig / LogData, also the reply to the detection probe
            debug!("evermore: log packet 0x{id:02x}, length {}", payload.len());
            DirtyMask::ONLINE
        },
        _ => {
            info!(
                "evermore: unknown packet id 0x{id:02x}, length {}",
                payload.len()
            );
            DirtyMask::empty()
        },
    }
}

/// EverMore receivers in binary mode.
pub struct EverMoreBinary;

pub static EVERMORE_BINARY: EverMoreBinary = EverMoreBinary;

impl Driver for EverMoreBinary {
    fn name(&self) -> &'static str {
        "EverMore binary"
    }

    fn trigger(&self) -> Option<&'static [u8]> {
        // ack to the 0x8d control message
        Some(b"\x10\x02\x04\x38\x8d\xc5\x10\x03")
    }

    fn channels(&self) -> usize {
        EVERMORE_CHANNELS
    }

    fn native_packet(&self) -> Option<PacketType> {
        Some(PacketType::EverMore)
    }

    fn initializer(&self, device: &mut dyn Write) -> io::Result<()> {
        evermore_default(device, true)
    }

    fn parse(&self, packet: &Packet, state: &mut SessionState, context: &Context) -> DirtyMask {
        match packet.ptype {
            PacketType::EverMore => {
                state.driver_mode = DriverMode::Binary;
                match unstuff(&packet.data) {
                    Some(payload) => evermore_decode(&payload, state, context),
                    None => {
                        warn!("evermore: malformed frame survived the lexer");
                        DirtyMask::ERROR
                    },
                }
            },
            PacketType::Nmea => {
                state.driver_mode = DriverMode::Nmea;
                nmea::parse_sentence(&packet.data, state, context)
            },
            _ => DirtyMask::empty(),
        }
    }

    fn speed_switcher(&self, device: &mut dyn Write, speed: u32) -> Result<(), EngineError> {
        let code = match speed {
            4800 => 0,
            9600 => 1,
            19_200 => 2,
            38_400 => 3,
            _ => return Err(EngineError::UnsupportedSpeed { baud: speed }),
        };
        debug!("evermore: speed switch to {speed}");
        // serial port configuration: main port only
        evermore_write(device, &[0x89, 0x01, code, 0x00])?;
        Ok(())
    }

    fn mode_switcher(
        &self,
        device: &mut dyn Write,
        mode: DriverMode,
    ) -> Result<Option<&'static str>, EngineError> {
        match mode {
            DriverMode::Nmea => {
                evermore_default(device, false)?;
                Ok(Some("Generic NMEA"))
            },
            DriverMode::Binary => {
                evermore_default(device, true)?;
                Ok(None)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // id 0x02, week 1500, TOW 60000000 cs, ECEF (1000000, 2000000, 3000000),
    // velocities zero, 8 visible / 5 used, version 5.42
    const NAV_FRAME: [u8; 35] = [
        0x10, 0x02, 0x1f, 0x02, 0x00, 0xdc, 0x05, 0x00, 0x87, 0x93, 0x03, 0x40, 0x42, 0x0f, 0x00,
        0x80, 0x84, 0x1e, 0x00, 0xc0, 0xc6, 0x2d, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x85,
        0x1e, 0x02, 0x0b, 0x10, 0x03,
    ];

    fn nav_packet() -> Packet {
        Packet {
            ptype: PacketType::EverMore,
            data: NAV_FRAME.to_vec(),
        }
    }

    #[test]
    fn unstuff_strips_framing() {
        let payload = unstuff(&NAV_FRAME).unwrap();
        assert_eq!(payload.len(), 29);
        assert_eq!(payload[0], 0x02);
        assert_eq!(get_u16_le(&payload, 2), 1500);
    }

    #[test]
    fn unstuff_removes_exactly_one_dle() {
        let frame = [0x10, 0x02, 0x06, 0x20, 0xe1, 0x10, 0x10, 0x00, 0x11, 0x10, 0x03];
        let payload = unstuff(&frame).unwrap();
        assert_eq!(payload, vec![0x20, 0xe1, 0x10, 0x00]);
    }

    #[test]
    fn navigation_packet_fills_the_fix() {
        let mut state = SessionState::new();
        let context = Context { leap_seconds: 14 };
        let mask = EVERMORE_BINARY.parse(&nav_packet(), &mut state, &context);

        assert_eq!(state.nav.time, 1_223_764_800.0 - 14.0);
        assert_eq!(state.nav.mode, FixMode::Fix3d);
        assert_eq!(state.tag, "EID2");
        assert_eq!(state.driver_mode, DriverMode::Binary);
        assert!((state.nav.latitude - 53.613_705_372_558_19).abs() < 1e-9);
        assert!((state.nav.longitude - 63.434_948_822_922_01).abs() < 1e-9);
        assert_eq!(state.nav.speed, 0.0);
        assert!(mask.contains(
            DirtyMask::TIME
                | DirtyMask::LATLON
                | DirtyMask::TRACK
                | DirtyMask::SPEED
                | DirtyMask::MODE
                | DirtyMask::CYCLE_START
                | DirtyMask::ALTITUDE
                | DirtyMask::CLIMB
        ));
    }

    #[test]
    fn dop_packet_sets_dops_and_mode() {
        let mut payload = vec![0x04, 0x00];
        payload.extend_from_slice(&1500u16.to_le_bytes());
        payload.extend_from_slice(&60_000_000u32.to_le_bytes());
        payload.extend_from_slice(&[20, 15, 8, 10, 12, 3]); // gdop..tdop, 3D
        let mut state = SessionState::new();
        let mask = evermore_decode(&payload, &mut state, &Context::default());
        assert_eq!(
            mask,
            DirtyMask::TIME | DirtyMask::DOP | DirtyMask::MODE | DirtyMask::STATUS
        );
        assert!((state.nav.gdop - 2.0).abs() < 1e-9);
        assert!((state.nav.tdop - 1.2).abs() < 1e-9);
        assert_eq!(state.nav.mode, FixMode::Fix3d);
        assert_eq!(state.nav.status, FixStatus::Fix);
    }

    #[test]
    fn channel_status_reports_used_satellites() {
        let mut payload = vec![0x06, 0x00];
        payload.extend_from_slice(&1500u16.to_le_bytes());
        payload.extend_from_slice(&60_000_000u32.to_le_bytes());
        payload.push(2); // satellites
        // channel 0, prn 12, az 228, el 22, snr 45, used
        payload.extend_from_slice(&[0, 12, 228, 0, 22, 45, 0x41]);
        // channel 1, prn 0: invalid record
        payload.extend_from_slice(&[1, 0, 0, 0, 0, 0, 0]);
        let mut state = SessionState::new();
        let mask = evermore_decode(&payload, &mut state, &Context::default());
        assert_eq!(
            mask,
            DirtyMask::TIME | DirtyMask::SATELLITE | DirtyMask::USED
        );
        assert_eq!(state.nav.satellites.len(), 1);
        assert_eq!(state.nav.satellites[0].prn, 12);
        assert_eq!(state.nav.satellites[0].azimuth, 228);
        assert_eq!(state.nav.satellites[0].elevation, 22);
        assert_eq!(state.nav.used, vec![12]);
    }

    #[test]
    fn foreign_packet_is_ignored() {
        let mut state = SessionState::new();
        let before = format!("{:?}", state.nav);
        let packet = Packet {
            ptype: PacketType::Navcom,
            data: vec![0x02, 0x99, 0x66],
        };
        let mask = EVERMORE_BINARY.parse(&packet, &mut state, &Context::default());
        assert!(mask.is_empty());
        assert_eq!(before, format!("{:?}", state.nav));
    }

    #[test]
    fn speed_switcher_encodes_baud_codes() {
        let mut out = Vec::new();
        EVERMORE_BINARY.speed_switcher(&mut out, 19_200).unwrap();
        // 0x89 0x01 0x02 0x00 framed: 10 02 06 89 01 02 00 8c 10 03
        assert_eq!(
            out,
            vec![0x10, 0x02, 0x06, 0x89, 0x01, 0x02, 0x00, 0x8c, 0x10, 0x03]
        );
        assert!(matches!(
            EVERMORE_BINARY.speed_switcher(&mut out, 57_600),
            Err(EngineError::UnsupportedSpeed { baud: 57_600 })
        ));
    }

    #[test]
    fn mode_switcher_to_nmea_redirects_to_generic_driver() {
        let mut out = Vec::new();
        let redirect = EVERMORE_BINARY
            .mode_switcher(&mut out, DriverMode::Nmea)
            .unwrap();
        assert_eq!(redirect, Some("Generic NMEA"));
        assert!(!out.is_empty());
    }
}
