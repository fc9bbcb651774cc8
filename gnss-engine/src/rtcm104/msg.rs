//! Typed RTCM-104 message bodies and the word-level packers.
//!
//! Field positions are given as (lsb, width) within a 30-bit word held in
//! the low bits of a `u32`; bits 0..6 are parity, bits 6..30 are data.

const ZCOUNT_SCALE: f64 = 0.6; // seconds
const PCSMALL: f64 = 0.02; // meters
const PCLARGE: f64 = 0.32; // meters
const RRSMALL: f64 = 0.002; // meters/second
const RRLARGE: f64 = 0.032; // meters/second
const XYZ_SCALE: f64 = 0.01; // meters
const DXYZ_SCALE: f64 = 0.1; // meters
const LA_SCALE: f64 = 90.0 / 32767.0; // degrees
const LO_SCALE: f64 = 180.0 / 32767.0; // degrees
const FREQ_SCALE: f64 = 0.1; // kHz
const FREQ_OFFSET: f64 = 190.0; // kHz
const CNR_OFFSET: i32 = 24; // dB
const TU_SCALE: u8 = 5; // minutes

/// SNR value marking "no signal reported".
pub const SNR_BAD: i32 = -1;

const TX_SPEED: [u16; 8] = [25, 50, 100, 110, 150, 200, 250, 300];

const PREAMBLE_PATTERN: u32 = 0x66;

fn uf(w: u32, lsb: u32, width: u32) -> u32 {
    (w >> lsb) & ((1 << width) - 1)
}

fn sf(w: u32, lsb: u32, width: u32) -> i32 {
    let raw = uf(w, lsb, width);
    if raw & (1 << (width - 1)) != 0 {
        (raw | !((1u32 << width) - 1)) as i32
    } else {
        raw as i32
    }
}

fn put(w: &mut u32, lsb: u32, width: u32, value: u32) {
    let mask = ((1u32 << width) - 1) << lsb;
    *w = (*w & !mask) | ((value << lsb) & mask);
}

/// Fields common to every message: header words 1 and 2.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RtcmHeader {
    pub msgtype: u8,
    /// Reference station ID.
    pub refstaid: u16,
    /// Modified Z-count, seconds.
    pub zcount: f64,
    pub seqnum: u8,
    /// Station health.
    pub stathlth: u8,
}

/// One satellite's pseudorange correction (types 1 and 9).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RangeCorrection {
    pub ident: u8,
    /// User differential range error class.
    pub udre: u8,
    pub issuedata: u8,
    pub largescale: bool,
    /// Pseudorange correction, meters.
    pub rangerr: f64,
    /// Range-rate correction, meters/second.
    pub rangerate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NavSystem {
    Gps,
    Glonass,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DatumSense {
    Global,
    Local,
    Invalid,
}

/// Type 4 reference-station datum.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DatumParams {
    pub valid: bool,
    pub system: NavSystem,
    pub sense: DatumSense,
    /// Alphanumeric datum tag, at most 5 characters.
    pub datum: String,
    pub dx: f64,
    pub dy: f64,
    pub dz: f64,
}

/// One satellite's health entry (type 5).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SatHealth {
    pub ident: u8,
    pub iodl: bool,
    pub health: u8,
    /// Carrier-to-noise ratio, dB; [`SNR_BAD`] when not reported.
    pub snr: i32,
    pub health_en: u8,
    pub new_data: bool,
    pub los_warning: bool,
    /// Time to unhealthy, minutes.
    pub tou: u8,
}

/// One beacon station (type 7 almanac).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BeaconStation {
    pub latitude: f64,
    pub longitude: f64,
    /// Service range, km.
    pub range: u16,
    /// Broadcast frequency, kHz.
    pub frequency: f64,
    pub health: u8,
    pub station_id: u16,
    /// Transmission rate, bits/second.
    pub bitrate: u16,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RtcmBody {
    /// Types 1 and 9: chains of satellite corrections.
    RangeCorrections(Vec<RangeCorrection>),
    /// Type 3: ECEF reference-station position, meters.
    ReferenceStation { valid: bool, x: f64, y: f64, z: f64 },
    /// Type 4: reference-station datum.
    Datum(DatumParams),
    /// Type 5: constellation health.
    ConstellationHealth(Vec<SatHealth>),
    /// Type 6: null filler.
    NullFrame,
    /// Type 7: radiobeacon almanac.
    BeaconAlmanac(Vec<BeaconStation>),
    /// Type 16: ASCII broadcast text.
    Text(String),
    /// Anything else: the raw body words.
    Unknown(Vec<u32>),
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RtcmMessage {
    pub header: RtcmHeader,
    pub body: RtcmBody,
}

impl RtcmMessage {
    /// Break the parity-checked words of one message into content fields.
    pub fn unpack(words: &[u32]) -> RtcmMessage {
        let w1 = words[0];
        let w2 = words[1];
        let header = RtcmHeader {
            msgtype: uf(w1, 16, 6) as u8,
            refstaid: uf(w1, 6, 10) as u16,
            zcount: f64::from(uf(w2, 17, 13)) * ZCOUNT_SCALE,
            seqnum: uf(w2, 14, 3) as u8,
            stathlth: uf(w2, 6, 3) as u8,
        };
        let body_words = &words[2..];
        let body = match header.msgtype {
            1 | 9 => RtcmBody::RangeCorrections(unpack_corrections(body_words)),
            3 => unpack_reference(body_words),
            4 => RtcmBody::Datum(unpack_datum(body_words)),
            5 => RtcmBody::ConstellationHealth(body_words.iter().map(unpack_health).collect()),
            6 => RtcmBody::NullFrame,
            7 => RtcmBody::BeaconAlmanac(body_words.chunks_exact(3).map(unpack_station).collect()),
            16 => RtcmBody::Text(unpack_text(body_words)),
            _ => RtcmBody::Unknown(body_words.to_vec()),
        };
        RtcmMessage { header, body }
    }

    /// Pack the content fields back into data words (parity bits zero).
    pub fn pack(&self) -> Vec<u32> {
        let mut body = Vec::new();
        match &self.body {
            RtcmBody::RangeCorrections(sats) => pack_corrections(sats, &mut body),
            RtcmBody::ReferenceStation { valid, x, y, z } => {
                if *valid {
                    pack_reference(*x, *y, *z, &mut body);
                }
            },
            RtcmBody::Datum(datum) => pack_datum(datum, &mut body),
            RtcmBody::ConstellationHealth(sats) => {
                body.extend(sats.iter().map(pack_health));
            },
            RtcmBody::NullFrame => {},
            RtcmBody::BeaconAlmanac(stations) => {
                for st in stations {
                    body.extend_from_slice(&pack_station(st));
                }
            },
            RtcmBody::Text(text) => pack_text(text, &mut body),
            RtcmBody::Unknown(words) => body.extend_from_slice(words),
        }

        let mut w1 = 0;
        put(&mut w1, 22, 8, PREAMBLE_PATTERN);
        put(&mut w1, 16, 6, u32::from(self.header.msgtype));
        put(&mut w1, 6, 10, u32::from(self.header.refstaid));

        let mut w2 = 0;
        put(&mut w2, 17, 13, (self.header.zcount / ZCOUNT_SCALE).round() as u32);
        put(&mut w2, 14, 3, u32::from(self.header.seqnum));
        put(&mut w2, 9, 5, body.len() as u32);
        put(&mut w2, 6, 3, u32::from(self.header.stathlth));

        let mut words = vec![w1, w2];
        words.append(&mut body);
        words
    }
}

fn unpack_corrections(body: &[u32]) -> Vec<RangeCorrection> {
    let mut sats = Vec::new();
    let mut len = body.len() as i32;
    let mut base = 0;
    while len >= 0 {
        let b = &body[base.min(body.len())..];
        if len >= 2 {
            let scale = uf(b[0], 29, 1) != 0;
            sats.push(RangeCorrection {
                ident: uf(b[0], 22, 5) as u8,
                udre: uf(b[0], 27, 2) as u8,
                issuedata: uf(b[1], 14, 8) as u8,
                largescale: scale,
                rangerr: f64::from(sf(b[0], 6, 16)) * if scale { PCLARGE } else { PCSMALL },
                rangerate: f64::from(sf(b[1], 22, 8)) * if scale { RRLARGE } else { RRSMALL },
            });
        }
        if len >= 4 {
            let scale = uf(b[1], 13, 1) != 0;
            sats.push(RangeCorrection {
                ident: uf(b[1], 6, 5) as u8,
                udre: uf(b[1], 11, 2) as u8,
                issuedata: uf(b[3], 22, 8) as u8,
                largescale: scale,
                rangerr: f64::from(sf(b[2], 14, 16)) * if scale { PCLARGE } else { PCSMALL },
                rangerate: f64::from(sf(b[2], 6, 8)) * if scale { RRLARGE } else { RRSMALL },
            });
        }
        if len >= 5 {
            let scale = uf(b[3], 21, 1) != 0;
            let pc = (sf(b[3], 6, 8) << 8) | uf(b[4], 22, 8) as i32;
            sats.push(RangeCorrection {
                ident: uf(b[3], 14, 5) as u8,
                udre: uf(b[3], 19, 2) as u8,
                issuedata: uf(b[4], 6, 8) as u8,
                largescale: scale,
                rangerr: f64::from(pc) * if scale { PCLARGE } else { PCSMALL },
                rangerate: f64::from(sf(b[4], 14, 8)) * if scale { RRLARGE } else { RRSMALL },
            });
        }
        len -= 5;
        base += 5;
    }
    sats
}

fn pack_corrections(sats: &[RangeCorrection], body: &mut Vec<u32>) {
    for chunk in sats.chunks(3) {
        let mut w = [0u32; 5];
        {
            let s = &chunk[0];
            let (pcs, rrs) = scales(s.largescale);
            put(&mut w[0], 29, 1, u32::from(s.largescale));
            put(&mut w[0], 27, 2, u32::from(s.udre));
            put(&mut w[0], 22, 5, u32::from(s.ident));
            put(&mut w[0], 6, 16, ((s.rangerr / pcs).round() as i32) as u32);
            put(&mut w[1], 22, 8, ((s.rangerate / rrs).round() as i32) as u32);
            put(&mut w[1], 14, 8, u32::from(s.issuedata));
        }
        if let Some(s) = chunk.get(1) {
            let (pcs, rrs) = scales(s.largescale);
            put(&mut w[1], 13, 1, u32::from(s.largescale));
            put(&mut w[1], 11, 2, u32::from(s.udre));
            put(&mut w[1], 6, 5, u32::from(s.ident));
            put(&mut w[2], 14, 16, ((s.rangerr / pcs).round() as i32) as u32);
            put(&mut w[2], 6, 8, ((s.rangerate / rrs).round() as i32) as u32);
            put(&mut w[3], 22, 8, u32::from(s.issuedata));
        }
        if let Some(s) = chunk.get(2) {
            let (pcs, rrs) = scales(s.largescale);
            let pc = (s.rangerr / pcs).round() as i32;
            put(&mut w[3], 21, 1, u32::from(s.largescale));
            put(&mut w[3], 19, 2, u32::from(s.udre));
            put(&mut w[3], 14, 5, u32::from(s.ident));
            put(&mut w[3], 6, 8, (pc >> 8) as u32);
            put(&mut w[4], 22, 8, (pc & 0xff) as u32);
            put(&mut w[4], 14, 8, ((s.rangerate / rrs).round() as i32) as u32);
            put(&mut w[4], 6, 8, u32::from(s.issuedata));
        }
        let nwords = match chunk.len() {
            1 => 2,
            2 => 4,
            _ => 5,
        };
        body.extend_from_slice(&w[..nwords]);
    }
}

fn scales(largescale: bool) -> (f64, f64) {
    if largescale {
        (PCLARGE, RRLARGE)
    } else {
        (PCSMALL, RRSMALL)
    }
}

fn unpack_reference(body: &[u32]) -> RtcmBody {
    if body.len() < 4 {
        return RtcmBody::ReferenceStation {
            valid: false,
            x: 0.0,
            y: 0.0,
            z: 0.0,
        };
    }
    let x = (uf(body[0], 6, 24) << 8) | uf(body[1], 22, 8);
    let y = (uf(body[1], 6, 16) << 16) | uf(body[2], 14, 16);
    let z = (uf(body[2], 6, 8) << 24) | uf(body[3], 6, 24);
    RtcmBody::ReferenceStation {
        valid: true,
        x: f64::from(x) * XYZ_SCALE,
        y: f64::from(y) * XYZ_SCALE,
        z: f64::from(z) * XYZ_SCALE,
    }
}

fn pack_reference(x: f64, y: f64, z: f64, body: &mut Vec<u32>) {
    let x = (x / XYZ_SCALE).round() as u32;
    let y = (y / XYZ_SCALE).round() as u32;
    let z = (z / XYZ_SCALE).round() as u32;
    let mut w = [0u32; 4];
    put(&mut w[0], 6, 24, x >> 8);
    put(&mut w[1], 22, 8, x & 0xff);
    put(&mut w[1], 6, 16, y >> 16);
    put(&mut w[2], 14, 16, y & 0xffff);
    put(&mut w[2], 6, 8, z >> 24);
    put(&mut w[3], 6, 24, z & 0xff_ffff);
    body.extend_from_slice(&w);
}

fn unpack_datum(body: &[u32]) -> DatumParams {
    if body.len() < 2 {
        return DatumParams {
            valid: false,
            system: NavSystem::Unknown,
            sense: DatumSense::Invalid,
            datum: String::new(),
            dx: 0.0,
            dy: 0.0,
            dz: 0.0,
        };
    }
    let system = match uf(body[0], 27, 3) {
        0 => NavSystem::Gps,
        1 => NavSystem::Glonass,
        _ => NavSystem::Unknown,
    };
    let mut sense = if uf(body[0], 26, 1) != 0 {
        DatumSense::Global
    } else {
        DatumSense::Local
    };
    let mut datum = String::new();
    for ch in [
        uf(body[0], 14, 8),
        uf(body[0], 6, 8),
        uf(body[1], 14, 8),
        uf(body[1], 6, 8),
        uf(body[1], 22, 8),
    ] {
        if ch != 0 {
            datum.push(ch as u8 as char);
        }
    }
    let (mut dx, mut dy, mut dz) = (0.0, 0.0, 0.0);
    if body.len() >= 4 {
        dx = f64::from(uf(body[2], 14, 16)) * DXYZ_SCALE;
        dy = f64::from((uf(body[2], 6, 8) << 8) | uf(body[3], 22, 8)) * DXYZ_SCALE;
        dz = f64::from(uf(body[3], 6, 16)) * DXYZ_SCALE;
    } else {
        sense = DatumSense::Invalid;
    }
    DatumParams {
        valid: true,
        system,
        sense,
        datum,
        dx,
        dy,
        dz,
    }
}

fn pack_datum(datum: &DatumParams, body: &mut Vec<u32>) {
    if !datum.valid {
        return;
    }
    let mut w = [0u32; 4];
    let system = match datum.system {
        NavSystem::Gps => 0,
        NavSystem::Glonass => 1,
        NavSystem::Unknown => 2,
    };
    put(&mut w[0], 27, 3, system);
    put(&mut w[0], 26, 1, u32::from(datum.sense == DatumSense::Global));
    let mut chars = datum.datum.bytes().map(u32::from);
    put(&mut w[0], 14, 8, chars.next().unwrap_or(0));
    put(&mut w[0], 6, 8, chars.next().unwrap_or(0));
    put(&mut w[1], 14, 8, chars.next().unwrap_or(0));
    put(&mut w[1], 6, 8, chars.next().unwrap_or(0));
    put(&mut w[1], 22, 8, chars.next().unwrap_or(0));
    if datum.sense == DatumSense::Invalid {
        body.extend_from_slice(&w[..2]);
        return;
    }
    let dy = (datum.dy / DXYZ_SCALE).round() as u32;
    put(&mut w[2], 14, 16, (datum.dx / DXYZ_SCALE).round() as u32);
    put(&mut w[2], 6, 8, dy >> 8);
    put(&mut w[3], 22, 8, dy & 0xff);
    put(&mut w[3], 6, 16, (datum.dz / DXYZ_SCALE).round() as u32);
    body.extend_from_slice(&w);
}

fn unpack_health(word: &u32) -> SatHealth {
    let w = *word;
    let cn0 = uf(w, 15, 5) as i32;
    SatHealth {
        ident: uf(w, 24, 5) as u8,
        iodl: uf(w, 23, 1) != 0,
        health: uf(w, 20, 3) as u8,
        snr: if cn0 != 0 { cn0 + CNR_OFFSET } else { SNR_BAD },
        health_en: uf(w, 14, 1) as u8,
        new_data: uf(w, 13, 1) != 0,
        los_warning: uf(w, 12, 1) != 0,
        tou: uf(w, 8, 4) as u8 * TU_SCALE,
    }
}

fn pack_health(sat: &SatHealth) -> u32 {
    let mut w = 0;
    put(&mut w, 24, 5, u32::from(sat.ident));
    put(&mut w, 23, 1, u32::from(sat.iodl));
    put(&mut w, 20, 3, u32::from(sat.health));
    let cn0 = if sat.snr == SNR_BAD {
        0
    } else {
        (sat.snr - CNR_OFFSET) as u32
    };
    put(&mut w, 15, 5, cn0);
    put(&mut w, 14, 1, u32::from(sat.health_en));
    put(&mut w, 13, 1, u32::from(sat.new_data));
    put(&mut w, 12, 1, u32::from(sat.los_warning));
    put(&mut w, 8, 4, u32::from(sat.tou / TU_SCALE));
    w
}

fn unpack_station(words: &[u32]) -> BeaconStation {
    let lon = (sf(words[0], 6, 8) << 8) | uf(words[1], 22, 8) as i32;
    let freq = (uf(words[1], 6, 6) << 6) | uf(words[2], 24, 6);
    BeaconStation {
        latitude: f64::from(sf(words[0], 14, 16)) * LA_SCALE,
        longitude: f64::from(lon) * LO_SCALE,
        range: uf(words[1], 12, 10) as u16,
        frequency: f64::from(freq) * FREQ_SCALE + FREQ_OFFSET,
        health: uf(words[2], 22, 2) as u8,
        station_id: uf(words[2], 12, 10) as u16,
        bitrate: TX_SPEED[uf(words[2], 9, 3) as usize],
    }
}

fn pack_station(st: &BeaconStation) -> [u32; 3] {
    let mut w = [0u32; 3];
    let lon = (st.longitude / LO_SCALE).round() as i32;
    let freq = ((st.frequency - FREQ_OFFSET) / FREQ_SCALE).round() as u32;
    put(&mut w[0], 14, 16, ((st.latitude / LA_SCALE).round() as i32) as u32);
    put(&mut w[0], 6, 8, (lon >> 8) as u32);
    put(&mut w[1], 22, 8, (lon & 0xff) as u32);
    put(&mut w[1], 12, 10, u32::from(st.range));
    put(&mut w[1], 6, 6, freq >> 6);
    put(&mut w[2], 24, 6, freq & 0x3f);
    put(&mut w[2], 22, 2, u32::from(st.health));
    put(&mut w[2], 12, 10, u32::from(st.station_id));
    let rate = TX_SPEED.iter().position(|&r| r == st.bitrate).unwrap_or(0);
    put(&mut w[2], 9, 3, rate as u32);
    w
}

fn unpack_text(body: &[u32]) -> String {
    let mut text = String::new();
    'words: for &w in body {
        for ch in [uf(w, 22, 8), uf(w, 14, 8), uf(w, 6, 8)] {
            if ch == 0 {
                break 'words;
            }
            text.push(ch as u8 as char);
        }
    }
    text
}

fn pack_text(text: &str, body: &mut Vec<u32>) {
    for chunk in text.as_bytes().chunks(3) {
        let mut w = 0;
        put(&mut w, 22, 8, u32::from(chunk[0]));
        put(&mut w, 14, 8, chunk.get(1).map_or(0, |&c| u32::from(c)));
        put(&mut w, 6, 8, chunk.get(2).map_or(0, |&c| u32::from(c)));
        body.push(w);
    }
}
