//! A proptest generator for EverMore navigation frames.
//!
//! Builds byte-level frames that are structurally correct, including the
//! DLE-STX leader, stuffed length and payload, additive checksum and
//! DLE-ETX trailer, then drives them through a session over a mock device.

use std::io::{self, Cursor, Read, Write};
use std::sync::Arc;

use proptest::prelude::*;

use gnss_engine::{Context, DirtyMask, FixMode, Poll, Session};

struct MockDevice {
    input: Cursor<Vec<u8>>,
}

impl Read for MockDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.input.read(buf)
    }
}

impl Write for MockDevice {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct NavPayload {
    week: u16,
    tow_cs: u32,
    ecef: [i32; 3],
    vel: [i16; 3],
    visible: u8,
    used: u8,
    version: u16,
}

impl NavPayload {
    fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![0x02, 0x00];
        out.extend_from_slice(&self.week.to_le_bytes());
        out.extend_from_slice(&self.tow_cs.to_le_bytes());
        for v in self.ecef {
            out.extend_from_slice(&v.to_le_bytes());
        }
        for v in self.vel {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out.push((self.visible << 4) | self.used);
        out.extend_from_slice(&self.version.to_le_bytes());
        out
    }

    fn to_frame(&self) -> Vec<u8> {
        let payload = self.to_bytes();
        let mut frame = vec![0x10, 0x02];
        let len = (payload.len() + 2) as u8;
        frame.push(len);
        if len == 0x10 {
            frame.push(0x10);
        }
        let mut crc: u8 = 0;
        for &b in &payload {
            frame.push(b);
            crc = crc.wrapping_add(b);
            if b == 0x10 {
                frame.push(0x10);
            }
        }
        frame.push(crc);
        if crc == 0x10 {
            frame.push(0x10);
        }
        frame.extend_from_slice(&[0x10, 0x03]);
        frame
    }
}

fn nav_payload_strategy() -> impl Strategy<Value = NavPayload> {
    (
        0u16..4096,
        0u32..60_480_000,
        prop::array::uniform3(any::<i32>()),
        prop::array::uniform3(any::<i16>()),
        0u8..13,
        0u8..13,
        any::<u16>(),
    )
        .prop_map(
            |(week, tow_cs, ecef, vel, visible, used, version)| NavPayload {
                week,
                tow_cs,
                ecef,
                vel,
                visible,
                used,
                version,
            },
        )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn generated_frames_parse_and_switch_the_driver(
        payload in nav_payload_strategy(),
        // printable noise, avoiding bytes that open unterminated frames
        garbage in proptest::collection::vec(0x22u8..0x3c, 0..8),
    ) {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut input = garbage;
        input.extend_from_slice(&payload.to_frame());

        let device = MockDevice { input: Cursor::new(input) };
        let context = Arc::new(Context { leap_seconds: 14 });
        let mut session = Session::open(device, "/dev/mock0", None, context).unwrap();

        let mask = match session.poll().unwrap() {
            Poll::Update(mask) => mask,
            other => panic!("expected update, got {other:?}"),
        };
        prop_assert!(mask.contains(DirtyMask::TIME | DirtyMask::MODE));
        prop_assert_eq!(session.driver_name(), "EverMore binary");

        let expected_time =
            315_964_800.0 + f64::from(payload.week) * 604_800.0 + f64::from(payload.tow_cs) * 0.01
                - 14.0;
        prop_assert!((session.navigation().time - expected_time).abs() < 1e-6);

        let expected_mode = match payload.used {
            0..=2 => FixMode::NoFix,
            3 => FixMode::Fix2d,
            _ => FixMode::Fix3d,
        };
        prop_assert_eq!(session.navigation().mode, expected_mode);
    }
}
