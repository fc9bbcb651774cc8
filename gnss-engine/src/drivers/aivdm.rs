//! AIVDM driver: routes `!`-framed sentences into the AIS assembler.

use log::debug;

use crate::drivers::Driver;
use crate::lexer::{Packet, PacketType};
use crate::navdata::DirtyMask;
use crate::session::{Context, SessionState};

/// AIS receivers feeding AIVDM sentences.
pub struct Aivdm;

pub static AIVDM: Aivdm = Aivdm;

impl Driver for Aivdm {
    fn name(&self) -> &'static str {
        "AIVDM"
    }

    fn channels(&self) -> usize {
        0
    }

    fn native_packet(&self) -> Option<PacketType> {
        Some(PacketType::Aivdm)
    }

    fn parse(&self, packet: &Packet, state: &mut SessionState, _context: &Context) -> DirtyMask {
        if packet.ptype != PacketType::Aivdm {
            return DirtyMask::empty();
        }
        state.tag = "AIVDM".to_string();
        match state.aivdm.feed(&packet.data) {
            Some(message) => {
                debug!(
                    "aivdm driver: decoded type {} from {:09}",
                    message.msgtype, message.mmsi
                );
                state.last_ais = Some(message);
                DirtyMask::AIS
            },
            None => DirtyMask::empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ais::AisBody;

    fn packet(sentence: &str) -> Packet {
        Packet {
            ptype: PacketType::Aivdm,
            data: sentence.as_bytes().to_vec(),
        }
    }

    #[test]
    fn single_part_sets_the_ais_bit() {
        let mut state = SessionState::new();
        let mask = AIVDM.parse(
            &packet("!AIVDM,1,1,,A,13aEOK?P00PD2wVMdLDRhgvL289?,0*26\r\n"),
            &mut state,
            &Context::default(),
        );
        assert_eq!(mask, DirtyMask::AIS);
        let msg = state.last_ais.as_ref().unwrap();
        assert_eq!(msg.msgtype, 1);
        assert_eq!(msg.mmsi, 244_670_316);
        assert_eq!(state.tag, "AIVDM");
    }

    #[test]
    fn partial_assembly_mutates_nothing_visible() {
        let mut state = SessionState::new();
        let mask = AIVDM.parse(
            &packet("!AIVDM,2,1,3,B,55P5TL01VIaAL@7WKO@mBplU@<PDhh000000001S;AJ::4A80?4i@E53,0*3E\r\n"),
            &mut state,
            &Context::default(),
        );
        assert!(mask.is_empty());
        assert!(state.last_ais.is_none());

        let mask = AIVDM.parse(
            &packet("!AIVDM,2,2,3,B,1@0000000000000,2*55\r\n"),
            &mut state,
            &Context::default(),
        );
        assert_eq!(mask, DirtyMask::AIS);
        match state.last_ais.as_ref().unwrap().body {
            AisBody::StaticVoyageData(ref v) => assert_eq!(v.vessel_name, "MT.MITCHELL"),
            ref other => panic!("wrong body: {other:?}"),
        }
    }

    #[test]
    fn foreign_packets_are_ignored() {
        let mut state = SessionState::new();
        let p = Packet {
            ptype: PacketType::Nmea,
            data: b"$GPGGA,,,,,,0,,,,,,,,*66\r\n".to_vec(),
        };
        assert!(AIVDM.parse(&p, &mut state, &Context::default()).is_empty());
        assert!(state.last_ais.is_none());
    }
}
