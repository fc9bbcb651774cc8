//! RTCM-104 differential-GPS correction decoding.
//!
//! RTCM-104 is a bit-synchronous stream of 30-bit words, each carrying 24
//! data bits and 6 parity bits computed per the GPS interface control
//! document: six parity equations over overlapping subsets of the data bits,
//! XORed with the previous word's trailing two bits (D29*, D30*). When D30*
//! is set, the incoming data bits arrive inverted.
//!
//! On the wire, each byte carries 6 payload bits under a 2-bit transport tag
//! ("data byte" = `01` in the top bits), with the payload bits reversed
//! end-for-end. [`RtcmDecoder`] strips the transport, hunts for the 8-bit
//! preamble at any of the six possible word offsets, and accumulates parity-
//! checked words until a full message is buffered. [`encode`] is the exact
//! inverse and is what the regression tests round-trip through.

use log::{debug, trace};

mod msg;

pub use msg::{
    BeaconStation, DatumParams, DatumSense, NavSystem, RangeCorrection, RtcmBody, RtcmHeader,
    RtcmMessage, SatHealth,
};

/// Upper bound on words in one message: 2 header words plus a 31-word body.
pub const RTCM_WORDS_MAX: usize = 33;

const MAG_SHIFT: u32 = 6;
const MAG_TAG_DATA: u8 = 1 << MAG_SHIFT;
const MAG_TAG_MASK: u8 = 3 << MAG_SHIFT;

const PREAMBLE_PATTERN: u32 = 0x66;
const PREAMBLE_SHIFT: u32 = 22;

const P_30_MASK: u32 = 0x4000_0000;
const W_DATA_MASK: u32 = 0x3fff_ffc0;

const PARITY_25: u32 = 0xbb1f_3480;
const PARITY_26: u32 = 0x5d8f_9a40;
const PARITY_27: u32 = 0xaec7_cd00;
const PARITY_28: u32 = 0x5763_e680;
const PARITY_29: u32 = 0x6bb1_f340;
const PARITY_30: u32 = 0x8b7a_89c0;

/// End-for-end reversal of the 6 payload bits of a transport byte.
const REVERSE_BITS: [u8; 64] = [
    0, 32, 16, 48, 8, 40, 24, 56, 4, 36, 20, 52, 12, 44, 28, 60, //
    2, 34, 18, 50, 10, 42, 26, 58, 6, 38, 22, 54, 14, 46, 30, 62, //
    1, 33, 17, 49, 9, 41, 25, 57, 5, 37, 21, 53, 13, 45, 29, 61, //
    3, 35, 19, 51, 11, 43, 27, 59, 7, 39, 23, 55, 15, 47, 31, 63,
];

/// The six parity bits for `word`, whose top two bits hold the previous
/// word's D29* and D30*.
fn rtcm_parity(word: u32) -> u32 {
    let mut p = 0;
    for mask in [
        PARITY_25, PARITY_26, PARITY_27, PARITY_28, PARITY_29, PARITY_30,
    ] {
        p = (p << 1) | ((word & mask).count_ones() & 1);
    }
    p
}

fn parity_ok(word: u32) -> bool {
    rtcm_parity(word) == word & 0x3f
}

fn has_preamble(word: u32) -> bool {
    (word >> PREAMBLE_SHIFT) & 0xff == PREAMBLE_PATTERN
}

/// Outcome of feeding one transport byte to the word machine.
#[derive(Debug, Clone, PartialEq)]
pub enum WordStatus {
    /// Transport tag was not "data byte"; the byte was ignored.
    Skip,
    /// Searching for (or having just lost) word synchronization.
    NoSync,
    /// Locked; a word is accumulating.
    Sync,
    /// A full message completed with this byte.
    Message(Vec<u32>),
}

/// Word-synchronous RTCM-104 decoder state.
///
/// Sub-state of the packet lexer: one instance per device stream.
#[derive(Debug, Clone)]
pub struct RtcmDecoder {
    curr_word: u32,
    curr_offset: i32,
    locked: bool,
    buf: [u32; RTCM_WORDS_MAX],
    bufindex: usize,
}

impl Default for RtcmDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl RtcmDecoder {
    pub fn new() -> Self {
        RtcmDecoder {
            curr_word: 0,
            curr_offset: 24,
            locked: false,
            buf: [0; RTCM_WORDS_MAX],
            bufindex: 0,
        }
    }

    pub fn reset(&mut self) {
        *self = RtcmDecoder::new();
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Feed one transport byte; up to one message can complete per call.
    pub fn decode(&mut self, c: u8) -> WordStatus {
        if c & MAG_TAG_MASK != MAG_TAG_DATA {
            trace!("rtcm104: byte 0x{c:02x} has no data tag, skipping");
            return WordStatus::Skip;
        }
        let c = u32::from(REVERSE_BITS[(c & 0x3f) as usize]);

        if !self.locked {
            self.curr_offset = -5;
            self.bufindex = 0;

            while self.curr_offset <= 0 {
                self.curr_word <<= 1;
                self.curr_word |= c >> (-self.curr_offset) as u32;
                if has_preamble(self.curr_word) && parity_ok(self.curr_word) {
                    debug!("rtcm104: preamble and parity ok, locked");
                    self.locked = true;
                    break;
                }
                self.curr_offset += 1;
            }
        }

        if !self.locked {
            return WordStatus::NoSync;
        }

        let mut status = WordStatus::Sync;
        self.shift_in(c);

        if self.curr_offset <= 0 {
            // Inversion propagated from the previous word's D30*.
            if self.curr_word & P_30_MASK != 0 {
                self.curr_word ^= W_DATA_MASK;
            }

            if parity_ok(self.curr_word) {
                if self.bufindex >= RTCM_WORDS_MAX {
                    // Overflow defense: wait for the next preamble.
                    debug!("rtcm104: word buffer overflowing, resetting");
                    self.bufindex = 0;
                    return WordStatus::NoSync;
                }
                self.buf[self.bufindex] = self.curr_word;
                if self.bufindex == 0 && !has_preamble(self.curr_word) {
                    debug!("rtcm104: word 0 is not a preamble, punting");
                    return WordStatus::NoSync;
                }
                self.bufindex += 1;
                if self.bufindex >= 2 {
                    let frmlen = ((self.buf[1] >> 9) & 0x1f) as usize;
                    if self.bufindex >= frmlen + 2 {
                        status = WordStatus::Message(self.buf[..frmlen + 2].to_vec());
                        self.bufindex = 0;
                    }
                }
                // Keep the low two bits for the next word's parity chaining.
                self.curr_word <<= 30;
                self.curr_offset += 30;
                self.shift_in(c);
            } else {
                debug!("rtcm104: parity failure, lost lock");
                self.locked = false;
                status = WordStatus::NoSync;
            }
        }
        self.curr_offset -= 6;
        status
    }

    fn shift_in(&mut self, c: u32) {
        if self.curr_offset > 0 {
            self.curr_word |= c << self.curr_offset as u32;
        } else {
            self.curr_word |= c >> (-self.curr_offset) as u32;
        }
    }
}

/// Re-encode a message to the tagged 6-bits-in-8 transport form.
///
/// Packs the content fields into 30-bit words, computes parity with
/// D29*/D30* chaining, applies the inversion rule, and emits each word as
/// five tagged, bit-reversed transport bytes.
pub fn encode(msg: &RtcmMessage) -> Vec<u8> {
    encode_all(core::slice::from_ref(msg))
}

/// Encode a sequence of messages into one transport stream.
///
/// Parity chains across message boundaries, so a decoder stays locked
/// through the whole stream. Encoding messages one at a time and
/// concatenating the results does NOT produce a valid stream.
pub fn encode_all(msgs: &[RtcmMessage]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut w: u32 = 0;
    for msg in msgs {
        for dw in msg.pack() {
            w = (w << 30) | (dw & W_DATA_MASK);
            w |= rtcm_parity(w);
            if w & P_30_MASK != 0 {
                w ^= W_DATA_MASK;
            }
            for shift in [24u32, 18, 12, 6, 0] {
                out.push(MAG_TAG_DATA | REVERSE_BITS[((w >> shift) & 0x3f) as usize]);
            }
        }
    }
    out
}

/// Run a byte slice through a fresh decoder and collect completed messages.
pub fn decode_stream(stream: &[u8]) -> Vec<RtcmMessage> {
    let mut dec = RtcmDecoder::new();
    let mut out = Vec::new();
    for &b in stream {
        if let WordStatus::Message(words) = dec.decode(b) {
            out.push(RtcmMessage::unpack(&words));
        }
    }
    out
}
