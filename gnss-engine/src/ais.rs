//! AIVDM assembly and AIS message decoding.
//!
//! AIS messages arrive as one or more `!AIVDM,N,n,seq,ch,payload,fill*CS`
//! sentences whose payload is binary data armored into a 6-bit subset of
//! ASCII. [`AivdmAssembler`] strips the armor, accumulates multi-sentence
//! payloads, and dispatches on the message id in the first six bits.
//! Field offsets and widths follow ITU-R M.1371.

use log::{debug, info, warn};

use crate::bits::{sbits, ubits};

/// Divisor taking the 1/10000-minute wire encoding to degrees.
pub const AIS_LATLON_SCALE: f64 = 600_000.0;

/// Accumulated payload bound: the longest defined message is 1008 bits.
const AIVDM_PAYLOAD_BYTES: usize = 128;

/// An auxiliary-craft MMSI (98xxxxxxx) selects the mothership branch of a
/// type 24 part B report.
pub fn is_auxiliary_mmsi(mmsi: u32) -> bool {
    mmsi / 10_000_000 == 98
}

/// The 6-bit AIS code page.
const SIXCHR: &[u8; 64] = b"@ABCDEFGHIJKLMNOPQRSTUVWXYZ[\\]^_ !\"#$%&'()*+,-./0123456789:;<=>?";

/// Decode `count` six-bit characters starting at `start` bits, trimming
/// trailing `@` and spaces.
fn from_sixbit(buf: &[u8], start: usize, count: usize) -> String {
    let mut out = String::with_capacity(count);
    for i in 0..count {
        out.push(SIXCHR[ubits(buf, start + 6 * i, 6) as usize] as char);
    }
    while out.ends_with('@') || out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Rate of turn as reported by position reports, including the sentinel
/// encodings.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RateOfTurn {
    NotAvailable,
    /// Turning left faster than 5 degrees per 30 seconds.
    FastLeft,
    /// Turning right faster than 5 degrees per 30 seconds.
    FastRight,
    /// Degrees per minute, negative to port.
    DegreesPerMinute(f64),
}

impl RateOfTurn {
    /// Interpret the signed square-root wire encoding.
    pub fn from_raw(raw: i8) -> RateOfTurn {
        match raw {
            -128 => RateOfTurn::NotAvailable,
            -127 => RateOfTurn::FastLeft,
            127 => RateOfTurn::FastRight,
            _ => {
                let deg = (f64::from(raw) / 4.733).powi(2);
                RateOfTurn::DegreesPerMinute(if raw < 0 { -deg } else { deg })
            },
        }
    }
}

/// Types 1, 2 and 3: position report.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PositionReport {
    pub status: u8,
    /// Raw rate-of-turn encoding; see [`RateOfTurn::from_raw`].
    pub rot: i8,
    /// Speed over ground, 0.1 knot units.
    pub sog: u16,
    pub accuracy: bool,
    /// 1/10000 minute units; divide by [`AIS_LATLON_SCALE`] for degrees.
    pub longitude: i32,
    pub latitude: i32,
    /// Course over ground, 0.1 degree units.
    pub cog: u16,
    pub heading: u16,
    pub utc_second: u8,
    pub maneuver: u8,
    pub raim: bool,
    pub radio: u32,
}

impl PositionReport {
    pub fn latitude_degrees(&self) -> f64 {
        f64::from(self.latitude) / AIS_LATLON_SCALE
    }

    pub fn longitude_degrees(&self) -> f64 {
        f64::from(self.longitude) / AIS_LATLON_SCALE
    }

    pub fn sog_knots(&self) -> f64 {
        f64::from(self.sog) / 10.0
    }

    pub fn cog_degrees(&self) -> f64 {
        f64::from(self.cog) / 10.0
    }

    pub fn rate_of_turn(&self) -> RateOfTurn {
        RateOfTurn::from_raw(self.rot)
    }
}

/// Types 4 and 11: base station report / UTC date response.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BaseStationReport {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub accuracy: bool,
    pub longitude: i32,
    pub latitude: i32,
    pub epfd: u8,
    pub raim: bool,
    pub radio: u32,
}

/// Type 5: ship static and voyage related data.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StaticVoyageData {
    pub ais_version: u8,
    pub imo_id: u32,
    pub callsign: String,
    pub vessel_name: String,
    pub ship_type: u8,
    pub to_bow: u16,
    pub to_stern: u16,
    pub to_port: u8,
    pub to_starboard: u8,
    pub epfd: u8,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    /// 0.1 meter units.
    pub draught: u8,
    pub destination: String,
    pub dte: u8,
}

/// Type 6: addressed binary message.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AddressedBinary {
    pub seqno: u8,
    pub dest_mmsi: u32,
    pub retransmit: bool,
    pub application_id: u16,
    pub bitcount: usize,
    pub bitdata: Vec<u8>,
}

/// Type 8: binary broadcast message.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BinaryBroadcast {
    pub application_id: u16,
    pub bitcount: usize,
    pub bitdata: Vec<u8>,
}

/// Type 9: standard SAR aircraft position report.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SarAircraftPosition {
    pub altitude: u16,
    pub sog: u16,
    pub accuracy: bool,
    pub longitude: i32,
    pub latitude: i32,
    pub cog: u16,
    pub utc_second: u8,
    pub regional: u8,
    pub dte: u8,
    pub assigned: bool,
    pub raim: bool,
    pub radio: u32,
}

/// Type 12: addressed safety-related message.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SafetyMessage {
    pub seqno: u8,
    pub dest_mmsi: u32,
    pub retransmit: bool,
    pub text: String,
}

/// Type 18: standard Class B CS position report.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StandardClassB {
    pub reserved: u8,
    pub sog: u16,
    pub accuracy: bool,
    pub longitude: i32,
    pub latitude: i32,
    pub cog: u16,
    pub heading: u16,
    pub utc_second: u8,
    pub regional: u8,
    pub cs_flag: bool,
    pub display_flag: bool,
    pub dsc_flag: bool,
    pub band_flag: bool,
    pub msg22_flag: bool,
    pub assigned: bool,
    pub raim: bool,
    pub radio: u32,
}

/// Type 19: extended Class B CS position report.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExtendedClassB {
    pub reserved: u8,
    pub sog: u16,
    pub accuracy: bool,
    pub longitude: i32,
    pub latitude: i32,
    pub cog: u16,
    pub heading: u16,
    pub utc_second: u8,
    pub regional: u8,
    pub vessel_name: String,
    pub ship_type: u8,
    pub to_bow: u16,
    pub to_stern: u16,
    pub to_port: u8,
    pub to_starboard: u8,
    pub epfd: u8,
    pub raim: bool,
    pub dte: bool,
    pub assigned: bool,
}

/// Type 21: aid-to-navigation report.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AidToNavigation {
    pub aid_type: u8,
    pub name: String,
    pub accuracy: bool,
    pub longitude: i32,
    pub latitude: i32,
    pub to_bow: u16,
    pub to_stern: u16,
    pub to_port: u8,
    pub to_starboard: u8,
    pub epfd: u8,
    pub utc_second: u8,
    pub off_position: bool,
    pub regional: u8,
    pub raim: bool,
    pub virtual_aid: bool,
    pub assigned: bool,
}

/// Type 24 part B carries either hull dimensions or, for an auxiliary
/// craft, the mothership's MMSI.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum HullReference {
    Dimensions {
        to_bow: u16,
        to_stern: u16,
        to_port: u8,
        to_starboard: u8,
    },
    MothershipMmsi(u32),
}

/// Type 24: Class B CS static data report.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StaticDataReport {
    /// Part A: vessel name.
    PartA { vessel_name: String },
    /// Part B: ship type, vendor, callsign and hull reference.
    PartB {
        ship_type: u8,
        vendor_id: String,
        callsign: String,
        hull: HullReference,
    },
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AisBody {
    PositionReport(PositionReport),
    BaseStationReport(BaseStationReport),
    StaticVoyageData(StaticVoyageData),
    AddressedBinary(AddressedBinary),
    BinaryAck { mmsi: [u32; 4] },
    BinaryBroadcast(BinaryBroadcast),
    SarAircraftPosition(SarAircraftPosition),
    UtcInquiry { dest_mmsi: u32 },
    SafetyMessage(SafetyMessage),
    SafetyAck { mmsi: [u32; 4] },
    SafetyBroadcast { text: String },
    StandardClassB(StandardClassB),
    ExtendedClassB(ExtendedClassB),
    AidToNavigation(AidToNavigation),
    StaticDataReport(StaticDataReport),
    /// Message types the decoder does not interpret.
    Unhandled,
}

/// A decoded AIS message: the common header plus the type-specific body.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AisMessage {
    pub msgtype: u8,
    pub repeat: u8,
    pub mmsi: u32,
    pub body: AisBody,
}

/// Reassembles multi-sentence AIVDM payloads and decodes completed ones.
///
/// Bits accumulate only along an unbroken part sequence beginning at part 1;
/// a stale partial assembly is discarded silently when the next part 1
/// arrives.
#[derive(Debug, Clone)]
pub struct AivdmAssembler {
    expected: u8,
    parts_seen: u8,
    bits: [u8; AIVDM_PAYLOAD_BYTES],
    bitlen: usize,
}

impl Default for AivdmAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl AivdmAssembler {
    pub fn new() -> Self {
        AivdmAssembler {
            expected: 0,
            parts_seen: 0,
            bits: [0; AIVDM_PAYLOAD_BYTES],
            bitlen: 0,
        }
    }

    pub fn reset(&mut self) {
        *self = AivdmAssembler::new();
    }

    /// Feed one complete AIVDM sentence (checksum already validated).
    /// Returns a decoded message when the final part arrives.
    pub fn feed(&mut self, sentence: &[u8]) -> Option<AisMessage> {
        let text = core::str::from_utf8(sentence).ok()?.trim_end();
        let body = text.strip_prefix('!').unwrap_or(text);
        let body = body.split('*').next()?;
        let fields: Vec<&str> = body.split(',').collect();
        if fields.len() < 7 {
            warn!("aivdm: short sentence: {text:?}");
            return None;
        }
        let total: u8 = fields[1].parse().ok()?;
        let part: u8 = fields[2].parse().ok()?;
        let payload = fields[5];
        debug!("aivdm: part {part} of {total}, payload {payload}");

        if part == 1 {
            self.bits = [0; AIVDM_PAYLOAD_BYTES];
            self.bitlen = 0;
            self.expected = total;
            self.parts_seen = 0;
        } else if part != self.parts_seen + 1 || total != self.expected {
            debug!("aivdm: out-of-sequence part {part}, dropping assembly");
            self.reset();
            return None;
        }
        self.parts_seen = part;

        for ch in payload.bytes() {
            let mut v = ch.wrapping_sub(48);
            if v >= 40 {
                v -= 8;
            }
            for i in (0..6).rev() {
                if self.bitlen / 8 >= AIVDM_PAYLOAD_BYTES {
                    warn!("aivdm: payload overflow, dropping assembly");
                    self.reset();
                    return None;
                }
                if (v >> i) & 1 != 0 {
                    self.bits[self.bitlen / 8] |= 1 << (7 - self.bitlen % 8);
                }
                self.bitlen += 1;
            }
        }

        if part == total {
            let msg = decode(&self.bits, self.bitlen);
            self.reset();
            Some(msg)
        } else {
            None
        }
    }
}

/// Dispatch an assembled payload by message id.
fn decode(bits: &[u8], bitlen: usize) -> AisMessage {
    let msgtype = ubits(bits, 0, 6) as u8;
    let repeat = ubits(bits, 6, 2) as u8;
    let mmsi = ubits(bits, 8, 30) as u32;
    info!("aivdm: message type {msgtype}, MMSI {mmsi:09}");

    let body = match msgtype {
        1..=3 => AisBody::PositionReport(PositionReport {
            status: ubits(bits, 38, 4) as u8,
            rot: sbits(bits, 42, 8) as i8,
            sog: ubits(bits, 50, 10) as u16,
            accuracy: ubits(bits, 60, 1) != 0,
            longitude: sbits(bits, 61, 28) as i32,
            latitude: sbits(bits, 89, 27) as i32,
            cog: ubits(bits, 116, 12) as u16,
            heading: ubits(bits, 128, 9) as u16,
            utc_second: ubits(bits, 137, 6) as u8,
            maneuver: ubits(bits, 143, 2) as u8,
            raim: ubits(bits, 148, 1) != 0,
            radio: ubits(bits, 149, 20) as u32,
        }),
        4 | 11 => AisBody::BaseStationReport(BaseStationReport {
            year: ubits(bits, 38, 14) as u16,
            month: ubits(bits, 52, 4) as u8,
            day: ubits(bits, 56, 5) as u8,
            hour: ubits(bits, 61, 5) as u8,
            minute: ubits(bits, 66, 6) as u8,
            second: ubits(bits, 72, 6) as u8,
            accuracy: ubits(bits, 78, 1) != 0,
            longitude: sbits(bits, 79, 28) as i32,
            latitude: sbits(bits, 107, 27) as i32,
            epfd: ubits(bits, 134, 4) as u8,
            raim: ubits(bits, 148, 1) != 0,
            radio: ubits(bits, 149, 19) as u32,
        }),
        5 => AisBody::StaticVoyageData(StaticVoyageData {
            ais_version: ubits(bits, 38, 2) as u8,
            imo_id: ubits(bits, 40, 30) as u32,
            callsign: from_sixbit(bits, 70, 7),
            vessel_name: from_sixbit(bits, 112, 20),
            ship_type: ubits(bits, 232, 8) as u8,
            to_bow: ubits(bits, 240, 9) as u16,
            to_stern: ubits(bits, 249, 9) as u16,
            to_port: ubits(bits, 258, 6) as u8,
            to_starboard: ubits(bits, 264, 6) as u8,
            epfd: ubits(bits, 270, 4) as u8,
            month: ubits(bits, 274, 4) as u8,
            day: ubits(bits, 278, 5) as u8,
            hour: ubits(bits, 283, 5) as u8,
            minute: ubits(bits, 288, 6) as u8,
            draught: ubits(bits, 294, 8) as u8,
            destination: from_sixbit(bits, 302, 20),
            dte: ubits(bits, 422, 1) as u8,
        }),
        6 => {
            let bitcount = bitlen.saturating_sub(88);
            AisBody::AddressedBinary(AddressedBinary {
                seqno: ubits(bits, 38, 2) as u8,
                dest_mmsi: ubits(bits, 40, 30) as u32,
                retransmit: ubits(bits, 70, 1) != 0,
                application_id: ubits(bits, 72, 16) as u16,
                bitcount,
                bitdata: bits[11..11 + bitcount.div_ceil(8)].to_vec(),
            })
        },
        7 | 13 => {
            let mut mmsis = [0u32; 4];
            for (i, slot) in mmsis.iter_mut().enumerate() {
                if bitlen > 40 + 32 * i {
                    *slot = ubits(bits, 40 + 32 * i, 30) as u32;
                }
            }
            if msgtype == 7 {
                AisBody::BinaryAck { mmsi: mmsis }
            } else {
                AisBody::SafetyAck { mmsi: mmsis }
            }
        },
        8 => {
            let bitcount = bitlen.saturating_sub(56);
            AisBody::BinaryBroadcast(BinaryBroadcast {
                application_id: ubits(bits, 40, 16) as u16,
                bitcount,
                bitdata: bits[7..7 + bitcount.div_ceil(8)].to_vec(),
            })
        },
        9 => AisBody::SarAircraftPosition(SarAircraftPosition {
            altitude: ubits(bits, 38, 12) as u16,
            sog: ubits(bits, 50, 10) as u16,
            accuracy: ubits(bits, 60, 1) != 0,
            longitude: sbits(bits, 61, 28) as i32,
            latitude: sbits(bits, 89, 27) as i32,
            cog: ubits(bits, 116, 12) as u16,
            utc_second: ubits(bits, 128, 6) as u8,
            regional: ubits(bits, 134, 8) as u8,
            dte: ubits(bits, 142, 1) as u8,
            assigned: ubits(bits, 144, 1) != 0,
            raim: ubits(bits, 145, 1) != 0,
            radio: ubits(bits, 146, 22) as u32,
        }),
        10 => AisBody::UtcInquiry {
            dest_mmsi: ubits(bits, 40, 30) as u32,
        },
        12 => AisBody::SafetyMessage(SafetyMessage {
            seqno: ubits(bits, 38, 2) as u8,
            dest_mmsi: ubits(bits, 40, 30) as u32,
            retransmit: ubits(bits, 70, 1) != 0,
            text: from_sixbit(bits, 72, bitlen.saturating_sub(72) / 6),
        }),
        14 => AisBody::SafetyBroadcast {
            text: from_sixbit(bits, 40, bitlen.saturating_sub(40) / 6),
        },
        18 => AisBody::StandardClassB(StandardClassB {
            reserved: ubits(bits, 38, 8) as u8,
            sog: ubits(bits, 46, 10) as u16,
            accuracy: ubits(bits, 56, 1) != 0,
            longitude: sbits(bits, 57, 28) as i32,
            latitude: sbits(bits, 85, 27) as i32,
            cog: ubits(bits, 112, 12) as u16,
            heading: ubits(bits, 124, 9) as u16,
            utc_second: ubits(bits, 133, 6) as u8,
            regional: ubits(bits, 139, 2) as u8,
            cs_flag: ubits(bits, 141, 1) != 0,
            display_flag: ubits(bits, 142, 1) != 0,
            dsc_flag: ubits(bits, 143, 1) != 0,
            band_flag: ubits(bits, 144, 1) != 0,
            msg22_flag: ubits(bits, 145, 1) != 0,
            assigned: ubits(bits, 146, 1) != 0,
            raim: ubits(bits, 147, 1) != 0,
            radio: ubits(bits, 148, 20) as u32,
        }),
        19 => AisBody::ExtendedClassB(ExtendedClassB {
            reserved: ubits(bits, 38, 8) as u8,
            sog: ubits(bits, 46, 10) as u16,
            accuracy: ubits(bits, 56, 1) != 0,
            longitude: sbits(bits, 57, 28) as i32,
            latitude: sbits(bits, 85, 27) as i32,
            cog: ubits(bits, 112, 12) as u16,
            heading: ubits(bits, 124, 9) as u16,
            utc_second: ubits(bits, 133, 6) as u8,
            regional: ubits(bits, 139, 4) as u8,
            vessel_name: from_sixbit(bits, 143, 20),
            ship_type: ubits(bits, 263, 8) as u8,
            to_bow: ubits(bits, 271, 9) as u16,
            to_stern: ubits(bits, 280, 9) as u16,
            to_port: ubits(bits, 289, 6) as u8,
            to_starboard: ubits(bits, 295, 6) as u8,
            epfd: ubits(bits, 299, 4) as u8,
            raim: ubits(bits, 302, 1) != 0,
            dte: ubits(bits, 305, 1) != 0,
            assigned: ubits(bits, 306, 1) != 0,
        }),
        21 => AisBody::AidToNavigation(AidToNavigation {
            aid_type: ubits(bits, 38, 5) as u8,
            name: from_sixbit(bits, 43, 20),
            accuracy: ubits(bits, 163, 1) != 0,
            longitude: sbits(bits, 164, 28) as i32,
            latitude: sbits(bits, 192, 27) as i32,
            to_bow: ubits(bits, 219, 9) as u16,
            to_stern: ubits(bits, 228, 9) as u16,
            to_port: ubits(bits, 237, 6) as u8,
            to_starboard: ubits(bits, 243, 6) as u8,
            epfd: ubits(bits, 249, 4) as u8,
            utc_second: ubits(bits, 253, 6) as u8,
            off_position: ubits(bits, 259, 1) != 0,
            regional: ubits(bits, 260, 8) as u8,
            raim: ubits(bits, 268, 1) != 0,
            virtual_aid: ubits(bits, 269, 1) != 0,
            assigned: ubits(bits, 270, 1) != 0,
        }),
        24 => {
            let part = ubits(bits, 38, 2);
            if part == 0 {
                AisBody::StaticDataReport(StaticDataReport::PartA {
                    vessel_name: from_sixbit(bits, 40, 20),
                })
            } else {
                let hull = if is_auxiliary_mmsi(mmsi) {
                    HullReference::MothershipMmsi(ubits(bits, 132, 30) as u32)
                } else {
                    HullReference::Dimensions {
                        to_bow: ubits(bits, 132, 9) as u16,
                        to_stern: ubits(bits, 141, 9) as u16,
                        to_port: ubits(bits, 150, 6) as u8,
                        to_starboard: ubits(bits, 156, 6) as u8,
                    }
                };
                AisBody::StaticDataReport(StaticDataReport::PartB {
                    ship_type: ubits(bits, 40, 8) as u8,
                    vendor_id: from_sixbit(bits, 48, 7),
                    callsign: from_sixbit(bits, 90, 7),
                    hull,
                })
            }
        },
        other => {
            info!("aivdm: unparsed message type {other}");
            AisBody::Unhandled
        },
    };
    AisMessage {
        msgtype,
        repeat,
        mmsi,
        body,
    }
}
