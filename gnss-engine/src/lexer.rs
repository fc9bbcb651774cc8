//! Byte-at-a-time packet classifier and framer.
//!
//! The lexer is protocol-agnostic at entry: the first byte of each known
//! wire format opens a candidate frame, and the candidate survives only as
//! long as every subsequent byte fits its framing rules. The first candidate
//! to complete with a valid checksum wins and is emitted with a type tag.
//!
//! Recovery is byte-wise: when a candidate dies, the lexer drops exactly one
//! byte and reruns the remainder of the window through the automaton, so an
//! overlapping preamble hidden inside garbage is never skipped.

use std::collections::VecDeque;
use std::io::{self, Read};
use std::mem;

use log::{debug, trace, warn};

use crate::constants::{
    AIVDM_SYNC_CHAR, DLE, ETX, ITALK_LEADER_1, ITALK_LEADER_2, ITALK_TRAILER_2,
    MAX_PACKET_LENGTH, NMEA_END_CHAR_1, NMEA_END_CHAR_2, NMEA_MAX_SENTENCE_LENGTH, NMEA_SYNC_CHAR,
    SIRF_MAX_PAYLOAD, SIRF_SYNC_CHAR_1, SIRF_SYNC_CHAR_2, SIRF_TRAILER_1, SIRF_TRAILER_2, STX,
    ZODIAC_MAX_WORDS, ZODIAC_SYNC_CHAR_1, ZODIAC_SYNC_CHAR_2,
};
use crate::rtcm104::{RtcmDecoder, WordStatus};

/// Wire format of a completed packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    /// `$`-prefixed NMEA 0183 sentence, checksum validated.
    Nmea,
    /// `!`-prefixed NMEA framing carrying an armored AIS payload.
    Aivdm,
    /// SiRF binary, `A0 A2 … B0 B3`.
    Sirf,
    /// EverMore binary, DLE-STX framed with DLE stuffing.
    EverMore,
    /// Navcom NCT binary, `02 99 66 … 03`.
    Navcom,
    /// Trimble TSIP, DLE framed without a checksum.
    Tsip,
    /// Garmin binary layer, DLE framed with a complement checksum.
    Garmin,
    /// Zodiac binary, `FF 81` header with summed checksum words.
    Zodiac,
    /// iTalk binary, `<!` … `!>`.
    Italk,
    /// RTCM-104 message; payload is the locked word buffer, big-endian.
    Rtcm104,
}

/// A framed, validated packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub ptype: PacketType,
    /// The raw frame as received (for RTCM-104, the 30-bit words as
    /// big-endian `u32`s).
    pub data: Vec<u8>,
}

/// Result of one [`PacketLexer::get`] call.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    Packet(Packet),
    /// No complete packet and no more bytes available right now.
    Incomplete,
    /// The byte source reached end of stream.
    Eof,
}

enum Step {
    Continue,
    Emit(Packet),
    /// The candidate died: drop its first byte, rerun the rest.
    Reject,
}

#[derive(Debug)]
enum State {
    Ground,
    Nmea,
    Sirf,
    Dle,
    EverMoreLen { dle: bool },
    EverMoreBody { body: Vec<u8>, need: usize, dle: bool },
    EverMoreDle { body: Vec<u8> },
    EverMoreEtx { body: Vec<u8> },
    DleFramed { body: Vec<u8>, dle: bool },
    Navcom,
    Zodiac,
    Italk { bang: bool },
    Rtcm,
}

/// The packet classification automaton. One per session.
#[derive(Debug)]
pub struct PacketLexer {
    state: State,
    inbuf: Vec<u8>,
    pending: VecDeque<u8>,
    rtcm: RtcmDecoder,
    rtcm_hunt: bool,
}

impl Default for PacketLexer {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketLexer {
    pub fn new() -> Self {
        PacketLexer {
            state: State::Ground,
            inbuf: Vec::with_capacity(MAX_PACKET_LENGTH),
            pending: VecDeque::new(),
            rtcm: RtcmDecoder::new(),
            rtcm_hunt: false,
        }
    }

    /// Flush all partial state. Idempotent.
    pub fn reset(&mut self) {
        self.state = State::Ground;
        self.inbuf.clear();
        self.pending.clear();
        self.rtcm.reset();
    }

    /// Enable or disable hunting for RTCM-104 transport bytes.
    ///
    /// The 6-of-8 transport tag collides with printable ASCII, so the
    /// bit-synchronous machine only runs when a driver asks for it.
    pub fn set_rtcm_hunt(&mut self, hunt: bool) {
        self.rtcm_hunt = hunt;
        if !hunt {
            self.rtcm.reset();
            if matches!(self.state, State::Rtcm) {
                self.state = State::Ground;
            }
        }
    }

    /// Feed one byte; at most one completed packet comes back.
    pub fn push(&mut self, byte: u8) -> Option<Packet> {
        self.pending.push_back(byte);
        self.advance()
    }

    /// Read-and-push loop over an arbitrary byte source.
    pub fn get<R: Read>(&mut self, source: &mut R) -> io::Result<Outcome> {
        loop {
            if let Some(packet) = self.advance() {
                return Ok(Outcome::Packet(packet));
            }
            let mut chunk = [0u8; 256];
            let n = match source.read(&mut chunk) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(Outcome::Incomplete);
                },
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if n == 0 {
                return Ok(Outcome::Eof);
            }
            self.pending.extend(&chunk[..n]);
        }
    }

    fn advance(&mut self) -> Option<Packet> {
        while let Some(b) = self.pending.pop_front() {
            match self.step(b) {
                Step::Continue => {},
                Step::Emit(packet) => {
                    self.inbuf.clear();
                    return Some(packet);
                },
                Step::Reject => {
                    let tail: Vec<u8> = self.inbuf.drain(..).skip(1).collect();
                    for t in tail.into_iter().rev() {
                        self.pending.push_front(t);
                    }
                },
            }
        }
        None
    }

    fn step(&mut self, b: u8) -> Step {
        match mem::replace(&mut self.state, State::Ground) {
            State::Ground => self.ground(b),
            State::Nmea => self.nmea(b),
            State::Sirf => self.sirf(b),
            State::Dle => self.dle(b),
            State::EverMoreLen { dle } => self.evermore_len(b, dle),
            State::EverMoreBody { body, need, dle } => self.evermore_body(b, body, need, dle),
            State::EverMoreDle { body } => self.evermore_dle(b, body),
            State::EverMoreEtx { body } => self.evermore_etx(b, body),
            State::DleFramed { body, dle } => self.dle_framed(b, body, dle),
            State::Navcom => self.navcom(b),
            State::Zodiac => self.zodiac(b),
            State::Italk { bang } => self.italk(b, bang),
            State::Rtcm => self.rtcm_byte(b),
        }
    }

    fn ground(&mut self, b: u8) -> Step {
        match b {
            NMEA_SYNC_CHAR | AIVDM_SYNC_CHAR => self.open(b, State::Nmea),
            SIRF_SYNC_CHAR_1 => self.open(b, State::Sirf),
            DLE => self.open(b, State::Dle),
            STX => self.open(b, State::Navcom),
            ZODIAC_SYNC_CHAR_1 => self.open(b, State::Zodiac),
            ITALK_LEADER_1 => self.open(b, State::Italk { bang: false }),
            _ if self.rtcm_hunt && b & 0xc0 == 0x40 => {
                self.state = State::Rtcm;
                self.rtcm_byte(b)
            },
            _ => {
                trace!("lexer: dropping stray byte 0x{b:02x}");
                Step::Continue
            },
        }
    }

    fn open(&mut self, b: u8, next: State) -> Step {
        self.inbuf.clear();
        self.inbuf.push(b);
        self.state = next;
        Step::Continue
    }

    fn nmea(&mut self, b: u8) -> Step {
        self.inbuf.push(b);
        if b == NMEA_END_CHAR_2 {
            return self.finish_nmea();
        }
        if b != NMEA_END_CHAR_1 && !(0x20..=0x7e).contains(&b) {
            debug!("lexer: non-printable byte 0x{b:02x} inside NMEA candidate");
            return Step::Reject;
        }
        if self.inbuf.len() > NMEA_MAX_SENTENCE_LENGTH {
            debug!("lexer: NMEA candidate too long, rejecting");
            return Step::Reject;
        }
        self.state = State::Nmea;
        Step::Continue
    }

    fn finish_nmea(&mut self) -> Step {
        let frame = &self.inbuf;
        // a checksum field is validated when present; probe replies like
        // "$Ack Input105." carry none and pass through
        if let Some(star) = frame.iter().position(|&c| c == b'*') {
            if star + 2 >= frame.len() {
                debug!("lexer: truncated NMEA checksum field");
                return Step::Reject;
            }
            let mut csum = 0u8;
            for &c in &frame[1..star] {
                csum ^= c;
            }
            let hex = |c: u8| (c as char).to_digit(16).map(|d| d as u8);
            let wire = match (hex(frame[star + 1]), hex(frame[star + 2])) {
                (Some(hi), Some(lo)) => (hi << 4) | lo,
                _ => {
                    debug!("lexer: malformed NMEA checksum digits");
                    return Step::Reject;
                },
            };
            if csum != wire {
                debug!("lexer: NMEA checksum mismatch, computed {csum:02X} wire {wire:02X}");
                return Step::Reject;
            }
        }
        let ptype = if frame[0] == AIVDM_SYNC_CHAR {
            PacketType::Aivdm
        } else {
            PacketType::Nmea
        };
        Step::Emit(Packet {
            ptype,
            data: frame.clone(),
        })
    }

    fn sirf(&mut self, b: u8) -> Step {
        self.inbuf.push(b);
        let n = self.inbuf.len();
        if n == 2 {
            if b != SIRF_SYNC_CHAR_2 {
                return Step::Reject;
            }
            self.state = State::Sirf;
            return Step::Continue;
        }
        if n >= 4 {
            let len = usize::from(u16::from_be_bytes([self.inbuf[2], self.inbuf[3]]));
            if len > SIRF_MAX_PAYLOAD {
                debug!("lexer: SiRF length {len} out of range");
                return Step::Reject;
            }
            let total = 4 + len + 4;
            if n == total {
                let payload = &self.inbuf[4..4 + len];
                let csum: u16 = payload
                    .iter()
                    .fold(0u16, |acc, &c| acc.wrapping_add(u16::from(c)))
                    & 0x7fff;
                let wire = u16::from_be_bytes([self.inbuf[4 + len], self.inbuf[5 + len]]);
                if csum != wire
                    || self.inbuf[total - 2] != SIRF_TRAILER_1
                    || self.inbuf[total - 1] != SIRF_TRAILER_2
                {
                    debug!("lexer: SiRF frame failed validation");
                    return Step::Reject;
                }
                return Step::Emit(Packet {
                    ptype: PacketType::Sirf,
                    data: self.inbuf.clone(),
                });
            }
        }
        self.state = State::Sirf;
        Step::Continue
    }

    fn dle(&mut self, b: u8) -> Step {
        self.inbuf.push(b);
        match b {
            STX => {
                self.state = State::EverMoreLen { dle: false };
                Step::Continue
            },
            ETX => {
                // stray DLE ETX with no frame open
                self.inbuf.clear();
                Step::Continue
            },
            DLE => {
                self.state = State::DleFramed {
                    body: vec![DLE],
                    dle: false,
                };
                Step::Continue
            },
            _ => {
                self.state = State::DleFramed {
                    body: vec![b],
                    dle: false,
                };
                Step::Continue
            },
        }
    }

    fn evermore_len(&mut self, b: u8, dle: bool) -> Step {
        self.inbuf.push(b);
        if b == DLE && !dle {
            self.state = State::EverMoreLen { dle: true };
            return Step::Continue;
        }
        if dle && b != DLE {
            debug!("lexer: bad DLE stuffing in EverMore length");
            return Step::Reject;
        }
        let len = usize::from(b);
        if !(2..=254).contains(&len) {
            debug!("lexer: EverMore length {len} out of range");
            return Step::Reject;
        }
        self.state = State::EverMoreBody {
            body: Vec::with_capacity(len - 1),
            need: len - 1,
            dle: false,
        };
        Step::Continue
    }

    fn evermore_body(&mut self, b: u8, mut body: Vec<u8>, need: usize, dle: bool) -> Step {
        self.inbuf.push(b);
        if dle {
            if b == DLE {
                body.push(DLE);
            } else {
                // a lone DLE inside the counted region kills the frame
                debug!("lexer: stray DLE inside EverMore body");
                return Step::Reject;
            }
        } else if b == DLE {
            self.state = State::EverMoreBody {
                body,
                need,
                dle: true,
            };
            return Step::Continue;
        } else {
            body.push(b);
        }
        if body.len() == need {
            self.state = State::EverMoreDle { body };
        } else {
            self.state = State::EverMoreBody {
                body,
                need,
                dle: false,
            };
        }
        Step::Continue
    }

    fn evermore_dle(&mut self, b: u8, body: Vec<u8>) -> Step {
        self.inbuf.push(b);
        if b != DLE {
            return Step::Reject;
        }
        self.state = State::EverMoreEtx { body };
        Step::Continue
    }

    fn evermore_etx(&mut self, b: u8, body: Vec<u8>) -> Step {
        self.inbuf.push(b);
        if b != ETX {
            return Step::Reject;
        }
        let (payload, crc) = body.split_at(body.len() - 1);
        let sum = payload
            .iter()
            .fold(0u8, |acc, &c| acc.wrapping_add(c));
        if sum != crc[0] {
            debug!(
                "lexer: EverMore checksum mismatch, computed {sum:02x} wire {:02x}",
                crc[0]
            );
            return Step::Reject;
        }
        Step::Emit(Packet {
            ptype: PacketType::EverMore,
            data: self.inbuf.clone(),
        })
    }

    fn dle_framed(&mut self, b: u8, mut body: Vec<u8>, dle: bool) -> Step {
        self.inbuf.push(b);
        if dle {
            match b {
                DLE => body.push(DLE),
                ETX => return self.finish_dle_framed(body),
                _ => {
                    debug!("lexer: bad DLE stuffing in TSIP/Garmin candidate");
                    return Step::Reject;
                },
            }
        } else if b == DLE {
            self.state = State::DleFramed { body, dle: true };
            return Step::Continue;
        } else {
            body.push(b);
        }
        if body.len() > MAX_PACKET_LENGTH {
            warn!("lexer: DLE frame overflow, resetting");
            self.inbuf.clear();
            return Step::Continue;
        }
        self.state = State::DleFramed { body, dle: false };
        Step::Continue
    }

    /// A DLE-framed body completed: Garmin if the complement checksum
    /// validates, TSIP otherwise.
    fn finish_dle_framed(&mut self, body: Vec<u8>) -> Step {
        if body.is_empty() {
            return Step::Reject;
        }
        let garmin = body.len() >= 3
            && usize::from(body[1]) + 3 == body.len()
            && body.iter().fold(0u8, |acc, &c| acc.wrapping_add(c)) == 0;
        Step::Emit(Packet {
            ptype: if garmin {
                PacketType::Garmin
            } else {
                PacketType::Tsip
            },
            data: self.inbuf.clone(),
        })
    }

    fn navcom(&mut self, b: u8) -> Step {
        self.inbuf.push(b);
        let n = self.inbuf.len();
        match n {
            2 if b != 0x99 => return Step::Reject,
            3 if b != 0x66 => return Step::Reject,
            _ => {},
        }
        if n >= 6 {
            let msg_len = usize::from(u16::from_le_bytes([self.inbuf[4], self.inbuf[5]]));
            if !(4..=MAX_PACKET_LENGTH).contains(&msg_len) {
                debug!("lexer: Navcom length {msg_len} out of range");
                return Step::Reject;
            }
            let total = msg_len + 4;
            if n == total {
                if self.inbuf[total - 1] != ETX {
                    debug!("lexer: Navcom frame missing ETX");
                    return Step::Reject;
                }
                let csum = self.inbuf[3..total - 2]
                    .iter()
                    .fold(0u8, |acc, &c| acc ^ c);
                if csum != self.inbuf[total - 2] {
                    debug!(
                        "lexer: Navcom checksum mismatch, computed {csum:02x} wire {:02x}",
                        self.inbuf[total - 2]
                    );
                    return Step::Reject;
                }
                return Step::Emit(Packet {
                    ptype: PacketType::Navcom,
                    data: self.inbuf.clone(),
                });
            }
        }
        self.state = State::Navcom;
        Step::Continue
    }

    fn zodiac(&mut self, b: u8) -> Step {
        self.inbuf.push(b);
        let n = self.inbuf.len();
        if n == 2 && b != ZODIAC_SYNC_CHAR_2 {
            return Step::Reject;
        }
        if n >= 10 {
            let word = |i: usize| u16::from_le_bytes([self.inbuf[2 * i], self.inbuf[2 * i + 1]]);
            if n == 10 {
                let hsum = (0..5).fold(0u16, |acc, i| acc.wrapping_add(word(i)));
                if hsum != 0 {
                    debug!("lexer: Zodiac header checksum mismatch");
                    return Step::Reject;
                }
                let ndata = usize::from(word(2));
                if ndata == 0 {
                    return Step::Emit(Packet {
                        ptype: PacketType::Zodiac,
                        data: self.inbuf.clone(),
                    });
                }
                if ndata > ZODIAC_MAX_WORDS {
                    debug!("lexer: Zodiac data length {ndata} out of range");
                    return Step::Reject;
                }
            } else {
                let ndata = usize::from(word(2));
                let total = 10 + 2 * ndata + 2;
                if n == total {
                    let dsum =
                        (5..5 + ndata + 1).fold(0u16, |acc, i| acc.wrapping_add(word(i)));
                    if dsum != 0 {
                        debug!("lexer: Zodiac data checksum mismatch");
                        return Step::Reject;
                    }
                    return Step::Emit(Packet {
                        ptype: PacketType::Zodiac,
                        data: self.inbuf.clone(),
                    });
                }
            }
        }
        self.state = State::Zodiac;
        Step::Continue
    }

    fn italk(&mut self, b: u8, bang: bool) -> Step {
        self.inbuf.push(b);
        if self.inbuf.len() == 2 {
            if b != ITALK_LEADER_2 {
                return Step::Reject;
            }
            self.state = State::Italk { bang: false };
            return Step::Continue;
        }
        if bang && b == ITALK_TRAILER_2 {
            return Step::Emit(Packet {
                ptype: PacketType::Italk,
                data: self.inbuf.clone(),
            });
        }
        if self.inbuf.len() > MAX_PACKET_LENGTH {
            warn!("lexer: iTalk frame overflow, resetting");
            self.inbuf.clear();
            return Step::Continue;
        }
        self.state = State::Italk {
            bang: b == ITALK_LEADER_2,
        };
        Step::Continue
    }

    fn rtcm_byte(&mut self, b: u8) -> Step {
        if b & 0xc0 != 0x40 {
            // not a transport byte; hand it back to the ground dispatcher
            return self.ground(b);
        }
        self.state = State::Rtcm;
        match self.rtcm.decode(b) {
            WordStatus::Message(words) => {
                let data = words.iter().flat_map(|w| w.to_be_bytes()).collect();
                Step::Emit(Packet {
                    ptype: PacketType::Rtcm104,
                    data,
                })
            },
            _ => Step::Continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const GGA: &[u8] =
        b"$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47\r\n";

    const EVERMORE_NAV: [u8; 35] = [
        0x10, 0x02, 0x1f, 0x02, 0x00, 0xdc, 0x05, 0x00, 0x87, 0x93, 0x03, 0x40, 0x42, 0x0f, 0x00,
        0x80, 0x84, 0x1e, 0x00, 0xc0, 0xc6, 0x2d, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x85,
        0x1e, 0x02, 0x0b, 0x10, 0x03,
    ];

    // payload [0x20, 0xe1, 0x10, 0x00]: the interior 0x10 is stuffed
    const EVERMORE_STUFFED: [u8; 11] = [
        0x10, 0x02, 0x06, 0x20, 0xe1, 0x10, 0x10, 0x00, 0x11, 0x10, 0x03,
    ];

    const NAVCOM_EMPTY: [u8; 8] = [0x02, 0x99, 0x66, 0x06, 0x04, 0x00, 0x02, 0x03];

    const SIRF_ACK: [u8; 11] = [
        0xa0, 0xa2, 0x00, 0x03, 0x0a, 0x01, 0x02, 0x00, 0x0d, 0xb0, 0xb3,
    ];

    const GARMIN_FRAME: [u8; 8] = [0x10, 0x06, 0x02, 0x02, 0x00, 0xf6, 0x10, 0x03];

    const ZODIAC_FRAME: [u8; 18] = [
        0xff, 0x81, 0xe8, 0x03, 0x03, 0x00, 0x00, 0x00, 0x16, 0x7a, 0x01, 0x00, 0x02, 0x00, 0x03,
        0x00, 0xfa, 0xff,
    ];

    fn feed(lexer: &mut PacketLexer, bytes: &[u8]) -> Vec<Packet> {
        let mut out = Vec::new();
        for &b in bytes {
            if let Some(p) = lexer.push(b) {
                out.push(p);
            }
        }
        out
    }

    #[test]
    fn nmea_sentence_frames() {
        let mut lexer = PacketLexer::new();
        let got = feed(&mut lexer, GGA);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].ptype, PacketType::Nmea);
        assert_eq!(got[0].data, GGA.to_vec());
    }

    #[test]
    fn nmea_bad_checksum_is_discarded() {
        let mut lexer = PacketLexer::new();
        let bad = b"$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*48\r\n";
        assert!(feed(&mut lexer, bad).is_empty());
        // the lexer keeps working afterwards
        assert_eq!(feed(&mut lexer, GGA).len(), 1);
    }

    #[test]
    fn checksum_less_probe_reply_frames() {
        let mut lexer = PacketLexer::new();
        let got = feed(&mut lexer, b"$Ack Input105.\r\n");
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].ptype, PacketType::Nmea);
    }

    #[test]
    fn aivdm_gets_its_own_tag() {
        let mut lexer = PacketLexer::new();
        let got = feed(
            &mut lexer,
            b"!AIVDM,1,1,,A,13aEOK?P00PD2wVMdLDRhgvL289?,0*26\r\n",
        );
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].ptype, PacketType::Aivdm);
    }

    #[test]
    fn sirf_frame_with_leading_garbage() {
        let mut lexer = PacketLexer::new();
        let mut stream = vec![0x00, 0xa0, 0x17];
        stream.extend_from_slice(&SIRF_ACK);
        let got = feed(&mut lexer, &stream);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].ptype, PacketType::Sirf);
        assert_eq!(got[0].data, SIRF_ACK.to_vec());
    }

    #[test]
    fn overlapping_sync_bytes_resync_byte_wise() {
        // A0 A0 A2: the first candidate dies on the second byte, which must
        // then itself be considered as a frame start.
        let mut lexer = PacketLexer::new();
        let mut stream = vec![0xa0];
        stream.extend_from_slice(&SIRF_ACK);
        let got = feed(&mut lexer, &stream);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].ptype, PacketType::Sirf);
    }

    #[test]
    fn evermore_frame_parses() {
        let mut lexer = PacketLexer::new();
        let got = feed(&mut lexer, &EVERMORE_NAV);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].ptype, PacketType::EverMore);
        assert_eq!(got[0].data, EVERMORE_NAV.to_vec());
    }

    #[test]
    fn evermore_stuffed_payload_unstuffs_exactly_once() {
        let mut lexer = PacketLexer::new();
        let got = feed(&mut lexer, &EVERMORE_STUFFED);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].ptype, PacketType::EverMore);
    }

    #[test]
    fn evermore_stray_dle_kills_the_frame() {
        // same frame with the stuffing byte removed: 0x10 0x00 inside the
        // counted region is a violation
        let bad = [0x10, 0x02, 0x06, 0x20, 0xe1, 0x10, 0x00, 0x11, 0x10, 0x03];
        let mut lexer = PacketLexer::new();
        let got = feed(&mut lexer, &bad);
        assert!(got.iter().all(|p| p.ptype != PacketType::EverMore));
    }

    #[test]
    fn navcom_empty_payload_checksum() {
        // checksum of an empty payload is CMD ^ LEN_LO ^ LEN_HI
        assert_eq!(0x06 ^ 0x04 ^ 0x00, 0x02);
        let mut lexer = PacketLexer::new();
        let got = feed(&mut lexer, &NAVCOM_EMPTY);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].ptype, PacketType::Navcom);
    }

    #[test]
    fn garmin_and_tsip_share_dle_framing() {
        let mut lexer = PacketLexer::new();
        let got = feed(&mut lexer, &GARMIN_FRAME);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].ptype, PacketType::Garmin);

        // no valid Garmin checksum: classified as TSIP
        let tsip = [0x10, 0x8f, 0xaa, 0xbb, 0x10, 0x03];
        let got = feed(&mut lexer, &tsip);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].ptype, PacketType::Tsip);
    }

    #[test]
    fn zodiac_frame_parses() {
        let mut lexer = PacketLexer::new();
        let got = feed(&mut lexer, &ZODIAC_FRAME);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].ptype, PacketType::Zodiac);
    }

    #[test]
    fn italk_frame_parses() {
        let mut lexer = PacketLexer::new();
        let got = feed(&mut lexer, b"<!\x01\x02\x03!>");
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].ptype, PacketType::Italk);
    }

    #[test]
    fn rtcm_needs_explicit_hunt() {
        let stream = [
            0x66, 0x41, 0x7f, 0x75, 0x6e, 0x47, 0x74, 0x77, 0x7e, 0x63, 0x7f, 0x5f, 0x4f, 0x74,
            0x48, 0x62, 0x43, 0x40, 0x61, 0x5e, 0x57, 0x44, 0x47, 0x40, 0x47, 0x4c, 0x6d, 0x73,
            0x6a, 0x50,
        ];
        let mut lexer = PacketLexer::new();
        assert!(feed(&mut lexer, &stream).is_empty());

        let mut lexer = PacketLexer::new();
        lexer.set_rtcm_hunt(true);
        let got = feed(&mut lexer, &stream);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].ptype, PacketType::Rtcm104);
        assert_eq!(got[0].data.len(), 6 * 4); // six 30-bit words
    }

    #[test]
    fn reset_is_idempotent() {
        let mut lexer = PacketLexer::new();
        for &b in &GGA[..10] {
            lexer.push(b);
        }
        lexer.reset();
        lexer.reset();
        assert_eq!(feed(&mut lexer, GGA).len(), 1);
    }

    #[test]
    fn get_pulls_packets_from_a_reader() {
        let mut stream = Vec::new();
        stream.extend_from_slice(GGA);
        stream.extend_from_slice(&EVERMORE_NAV);
        stream.extend_from_slice(&NAVCOM_EMPTY);
        let mut cursor = Cursor::new(stream);
        let mut lexer = PacketLexer::new();

        let types: Vec<PacketType> = std::iter::from_fn(|| {
            match lexer.get(&mut cursor).unwrap() {
                Outcome::Packet(p) => Some(p.ptype),
                _ => None,
            }
        })
        .collect();
        assert_eq!(
            types,
            vec![PacketType::Nmea, PacketType::EverMore, PacketType::Navcom]
        );
        assert_eq!(lexer.get(&mut cursor).unwrap(), Outcome::Eof);
    }

    #[test]
    fn interleaved_protocols_classify_independently() {
        let mut stream = Vec::new();
        stream.extend_from_slice(&EVERMORE_NAV);
        stream.extend_from_slice(GGA);
        stream.extend_from_slice(&SIRF_ACK);
        let mut lexer = PacketLexer::new();
        let got = feed(&mut lexer, &stream);
        let types: Vec<PacketType> = got.iter().map(|p| p.ptype).collect();
        assert_eq!(
            types,
            vec![PacketType::EverMore, PacketType::Nmea, PacketType::Sirf]
        );
    }
}
