//! RTCM-104 driver: unpacks the lexer's locked word buffers.
//!
//! The bit-synchronous transport collides with printable ASCII, so the
//! session enables the lexer's RTCM hunt only while this driver is active.

use log::debug;

use crate::drivers::Driver;
use crate::error::EngineError;
use crate::lexer::{Packet, PacketType};
use crate::navdata::DirtyMask;
use crate::rtcm104::RtcmMessage;
use crate::session::{Context, SessionState};

/// Differential-GPS correction receivers broadcasting RTCM-104.
pub struct Rtcm104;

pub static RTCM104: Rtcm104 = Rtcm104;

impl Driver for Rtcm104 {
    fn name(&self) -> &'static str {
        "RTCM104"
    }

    fn channels(&self) -> usize {
        0
    }

    fn native_packet(&self) -> Option<PacketType> {
        Some(PacketType::Rtcm104)
    }

    fn parse(&self, packet: &Packet, state: &mut SessionState, _context: &Context) -> DirtyMask {
        if packet.ptype != PacketType::Rtcm104 {
            return DirtyMask::empty();
        }
        let words: Vec<u32> = packet
            .data
            .chunks_exact(4)
            .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        if words.len() < 2 {
            return DirtyMask::ERROR;
        }
        let message = RtcmMessage::unpack(&words);
        debug!(
            "rtcm104 driver: type {} from station {}",
            message.header.msgtype, message.header.refstaid
        );
        state.tag = "RTCM104".to_string();
        state.last_rtcm = Some(message);
        DirtyMask::RTCM
    }

    // corrections are what we read, not what we forward
    fn rtcm_writer(&self, _device: &mut dyn std::io::Write, _data: &[u8]) -> Result<usize, EngineError> {
        Err(EngineError::ControlRejected {
            driver: self.name(),
            operation: "rtcm_writer",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtcm104::RtcmBody;

    #[test]
    fn unpacks_word_buffers() {
        // type 3 reference station from the transport-level tests
        let words: [u32; 6] = [
            0x1983_fadd, 0x47d0_4831, 0x4004_3d04, 0x11c0_085e, 0xba23_8038, 0x0cb7_3542,
        ];
        let data: Vec<u8> = words.iter().flat_map(|w| w.to_be_bytes()).collect();
        let packet = Packet {
            ptype: PacketType::Rtcm104,
            data,
        };
        let mut state = SessionState::new();
        let mask = RTCM104.parse(&packet, &mut state, &Context::default());
        assert_eq!(mask, DirtyMask::RTCM);
        let msg = state.last_rtcm.as_ref().unwrap();
        assert_eq!(msg.header.msgtype, 3);
        assert_eq!(msg.header.refstaid, 1003);
        match msg.body {
            RtcmBody::ReferenceStation { x, y, z, .. } => {
                assert_eq!(x, 11111.11);
                assert_eq!(y, 22222.22);
                assert_eq!(z, 33333.33);
            },
            ref other => panic!("wrong body: {other:?}"),
        }
    }

    #[test]
    fn rejects_correction_passthrough() {
        let mut sink = Vec::new();
        assert!(matches!(
            RTCM104.rtcm_writer(&mut sink, &[0x66]),
            Err(EngineError::ControlRejected { .. })
        ));
    }
}
