//! A proptest generator for Navcom PVT blocks.
//!
//! Builds byte-level `02 99 66` frames with a randomized, structurally
//! valid 0xb1 payload and correct XOR checksum, then checks that the
//! decoded fix matches the generated fields.

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
struct PvtBlock {
    week: u16,
    tow_ms: u32,
    used_mask: u32,
    lat: i32,
    lon: i32,
    nav_mode: u8,
    altitude: i32,
    dops: [u8; 5],
}

impl PvtBlock {
    fn to_frame(&self) -> Vec<u8> {
        let mut payload = Vec::new();
        payload.extend_from_slice(&self.week.to_le_bytes());
        payload.extend_from_slice(&self.tow_ms.to_le_bytes());
        payload.extend_from_slice(&self.used_mask.to_le_bytes());
        payload.extend_from_slice(&self.lat.to_le_bytes());
        payload.extend_from_slice(&self.lon.to_le_bytes());
        payload.push(0); // lat/lon fractions
        payload.push(self.nav_mode);
        payload.extend_from_slice(&self.altitude.to_le_bytes()); // ellipsoid
        payload.extend_from_slice(&self.altitude.to_le_bytes()); // MSL
        payload.extend_from_slice(&[0u8; 9]); // velocities
        payload.push(100); // FOM
        payload.extend_from_slice(&self.dops);

        let mut frame = vec![0x02, 0x99, 0x66, 0xb1];
        frame.extend_from_slice(&((payload.len() + 4) as u16).to_le_bytes());
        frame.extend_from_slice(&payload);
        let csum = frame[3..].iter().fold(0u8, |acc, &b| acc ^ b);
        frame.push(csum);
        frame.push(0x03);
        frame
    }
}

fn pvt_strategy() -> impl Strategy<Value = PvtBlock> {
    (
        0u16..4096,
        0u32..604_800_000,
        any::<u32>(),
        -663_552_000i32..663_552_000,
        any::<u8>(),
        -1_000_000i32..10_000_000,
        prop::array::uniform5(any::<u8>()),
    )
        .prop_map(|(week, tow_ms, used_mask, lat, nav_mode, altitude, dops)| PvtBlock {
            week,
            tow_ms,
            used_mask,
            lat,
            lon: lat / 2,
            nav_mode,
            altitude,
            dops,
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn generated_pvt_blocks_decode(block in pvt_strategy()) {
        let _ = env_logger::builder().is_test(true).try_init();
        let device = MockDevice {
            input: Cursor::new(block.to_frame()),
        };
        let context = Arc::new(Context::default());
        let mut session = Session::open(device, "/dev/mock1", None, context).unwrap();

        let mask = match session.poll().unwrap() {
            Poll::Update(mask) => mask,
            other => panic!("expected update, got {other:?}"),
        };
        prop_assert_eq!(session.driver_name(), "Navcom binary");
        prop_assert!(mask.contains(DirtyMask::TIME | DirtyMask::LATLON | DirtyMask::MODE));

        let nav = session.navigation();
        let expected_mode = if block.nav_mode & 0xc0 == 0xc0 {
            FixMode::Fix3d
        } else if block.nav_mode & 0x80 != 0 {
            FixMode::Fix2d
        } else {
            FixMode::NoFix
        };
        prop_assert_eq!(nav.mode, expected_mode);

        let expected_lat = f64::from(block.lat) * 0.000_488_281_25 / 3600.0;
        prop_assert!((nav.latitude - expected_lat).abs() < 1e-12);
        // both heights ride the same raw value here, so separation is zero
        prop_assert_eq!(nav.separation, 0.0);
        for (raw, dop) in block.dops.iter().zip([nav.gdop, nav.pdop, nav.hdop, nav.vdop, nav.tdop]) {
            if *raw == 255 {
                prop_assert!(dop.is_nan());
            } else {
                prop_assert_eq!(dop, f64::from(*raw) / 10.0);
            }
        }
    }
}
