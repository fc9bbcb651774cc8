//! Per-device session: poll loop, auto-detection, and the control surface.
//!
//! A session owns its device exclusively and runs single-threaded: bytes
//! are processed strictly in arrival order, one packet decodes atomically,
//! and the dirty mask from packet N is visible before packet N+1 is parsed.

use std::io::{Read, Write};
use std::sync::Arc;
use std::time::Instant;

use chrono::{NaiveDate, Utc};
use log::{info, warn};

use crate::ais::{AisMessage, AivdmAssembler};
use crate::constants::SUPPORTED_SPEEDS;
use crate::drivers::{lookup, registry, Driver};
use crate::error::EngineError;
use crate::lexer::{Outcome, Packet, PacketLexer, PacketType};
use crate::navdata::{DirtyMask, NavigationRecord, Satellite};
use crate::rtcm104::RtcmMessage;

/// Packets inspected for a probe reply while the session is still running
/// the auto-detection fallback.
const SNIFF_WINDOW: u32 = 10;

/// Grace period on top of the driver's nominal cycle before a silent
/// device is reported offline.
const CYCLE_SLACK: f64 = 2.0;

/// Process-wide constants shared across sessions. Read-mostly; updated only
/// at startup and at leap-second events.
#[derive(Debug, Clone)]
pub struct Context {
    /// Current GPS-to-UTC offset, seconds.
    pub leap_seconds: i32,
}

impl Default for Context {
    fn default() -> Self {
        // as of 2017-01-01
        Context { leap_seconds: 18 }
    }
}

/// Whether the receiver is emitting text or its vendor binary protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DriverMode {
    #[default]
    Nmea,
    Binary,
}

/// NMEA sentence-parser state that survives between sentences.
#[derive(Debug, Clone, Default)]
pub struct NmeaState {
    /// Most recent date seen in RMC or ZDA, merged into time-only sentences.
    pub(crate) date: Option<NaiveDate>,
    /// Satellites collected across a multi-sentence GSV group.
    pub(crate) gsv_pending: Vec<Satellite>,
}

/// The mutable per-session state handed to driver parsers.
#[derive(Debug, Default)]
pub struct SessionState {
    pub nav: NavigationRecord,
    /// Tag of the last sentence or packet type, e.g. `GPGGA` or `EID2`.
    pub tag: String,
    pub driver_mode: DriverMode,
    pub baudrate: u32,
    pub(crate) nmea: NmeaState,
    pub(crate) aivdm: AivdmAssembler,
    /// Most recent decoded AIS message; the `AIS` mask bit marks updates.
    pub last_ais: Option<AisMessage>,
    /// Most recent decoded RTCM message; the `RTCM` mask bit marks updates.
    pub last_rtcm: Option<RtcmMessage>,
}

impl SessionState {
    pub fn new() -> Self {
        SessionState::default()
    }
}

/// Result of one [`Session::poll`] call.
#[derive(Debug, PartialEq)]
pub enum Poll {
    /// A packet was decoded; the mask covers exactly the mutated fields.
    Update(DirtyMask),
    /// No complete packet available yet.
    Incomplete,
    /// The device reached end of stream; the session is now offline.
    Eof,
}

/// One open device and its decoding pipeline.
pub struct Session<D: Read + Write> {
    device: D,
    path: String,
    lexer: PacketLexer,
    driver: &'static dyn Driver,
    context: Arc<Context>,
    state: SessionState,
    mask: DirtyMask,
    packet_count: u32,
    last_activity: Option<Instant>,
}

impl<D: Read + Write> Session<D> {
    /// Open a session over `device`, starting auto-detection from the
    /// registry's fallback driver.
    pub fn open(
        device: D,
        path: impl Into<String>,
        baud: Option<u32>,
        context: Arc<Context>,
    ) -> Result<Self, EngineError> {
        let driver = registry()
            .first()
            .copied()
            .ok_or(EngineError::NoSuchDriver {
                name: "Generic NMEA".into(),
            })?;
        let mut session = Session {
            device,
            path: path.into(),
            lexer: PacketLexer::new(),
            driver,
            context,
            state: SessionState::new(),
            mask: DirtyMask::empty(),
            packet_count: 0,
            last_activity: None,
        };
        session.state.baudrate = baud.unwrap_or(4800);
        session.sync_rtcm_hunt();
        Ok(session)
    }

    pub fn device_path(&self) -> &str {
        &self.path
    }

    pub fn driver_name(&self) -> &'static str {
        self.driver.name()
    }

    pub fn navigation(&self) -> &NavigationRecord {
        &self.state.nav
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// The accumulated dirty mask since the last take.
    pub fn take_mask(&mut self) -> DirtyMask {
        core::mem::take(&mut self.mask)
    }

    /// Pull bytes from the device, route any completed packet through the
    /// active driver, and merge the returned mask into the session mask.
    pub fn poll(&mut self) -> Result<Poll, EngineError> {
        match self.lexer.get(&mut self.device)? {
            Outcome::Eof => {
                if self.state.nav.online {
                    self.state.nav.online = false;
                    self.mask |= DirtyMask::ONLINE;
                }
                Ok(Poll::Eof)
            },
            Outcome::Incomplete => {
                // a device that has gone quiet past its cycle is offline
                if self.state.nav.online {
                    if let Some(last) = self.last_activity {
                        if last.elapsed().as_secs_f64() > self.driver.cycle() + CYCLE_SLACK {
                            info!("session {}: device went quiet, marking offline", self.path);
                            self.state.nav.online = false;
                            self.mask |= DirtyMask::ONLINE;
                            return Ok(Poll::Update(DirtyMask::ONLINE));
                        }
                    }
                }
                Ok(Poll::Incomplete)
            },
            Outcome::Packet(packet) => {
                self.packet_count += 1;
                self.last_activity = Some(Instant::now());
                let mut mask = DirtyMask::empty();
                if !self.state.nav.online {
                    self.state.nav.online = true;
                    mask |= DirtyMask::ONLINE;
                }
                mask |= self.dispatch(&packet);
                self.state.nav.stamp(mask, Utc::now().timestamp() as f64);
                self.mask |= mask;
                Ok(Poll::Update(mask))
            },
        }
    }

    fn dispatch(&mut self, packet: &Packet) -> DirtyMask {
        // A binary packet belonging to another driver redirects parsing
        // there and makes that driver active for all subsequent packets.
        if packet.ptype != PacketType::Nmea {
            if let Some(owner) = registry()
                .iter()
                .copied()
                .find(|d| d.native_packet() == Some(packet.ptype))
            {
                if owner.name() != self.driver.name() {
                    info!(
                        "session {}: {:?} packet seen while {} active, switching to {}",
                        self.path,
                        packet.ptype,
                        self.driver.name(),
                        owner.name()
                    );
                    self.driver = owner;
                    self.sync_rtcm_hunt();
                }
            }
        }

        let mask = self.driver.parse(packet, &mut self.state, &self.context);

        // A text sentence that parsed to nothing may be a probe reply:
        // match it against the registry's trigger strings.
        if packet.ptype == PacketType::Nmea && mask.is_empty() && self.sniffing() {
            let matched = registry()
                .iter()
                .copied()
                .find(|d| d.trigger().is_some_and(|t| packet.data.starts_with(t)));
            if let Some(found) = matched {
                if found.name() != self.driver.name() {
                    info!("session {}: trigger match for {}", self.path, found.name());
                    if let Err(e) = self.activate(found) {
                        warn!("session {}: initializer failed: {e}", self.path);
                    }
                }
            }
        }
        mask
    }

    fn sniffing(&self) -> bool {
        self.driver.name() == "Generic NMEA" || self.packet_count <= SNIFF_WINDOW
    }

    fn activate(&mut self, driver: &'static dyn Driver) -> Result<(), EngineError> {
        self.driver = driver;
        self.sync_rtcm_hunt();
        driver.initializer(&mut self.device)?;
        Ok(())
    }

    fn sync_rtcm_hunt(&mut self) {
        self.lexer
            .set_rtcm_hunt(self.driver.native_packet() == Some(PacketType::Rtcm104));
    }

    /// Replace the active driver by name and run its initializer.
    pub fn switch_driver(&mut self, name: &str) -> Result<(), EngineError> {
        let driver = lookup(name)?;
        self.activate(driver)
    }

    /// Ask the active driver to switch the receiver between text and
    /// binary protocols.
    pub fn set_mode(&mut self, mode: DriverMode) -> Result<(), EngineError> {
        let redirect = self.driver.mode_switcher(&mut self.device, mode)?;
        self.state.driver_mode = mode;
        if let Some(name) = redirect {
            self.switch_driver(name)?;
        }
        Ok(())
    }

    /// Ask the active driver to change the device baud rate.
    pub fn set_speed(&mut self, baud: u32) -> Result<(), EngineError> {
        if !SUPPORTED_SPEEDS.contains(&baud) {
            return Err(EngineError::UnsupportedSpeed { baud });
        }
        self.driver.speed_switcher(&mut self.device, baud)?;
        self.state.baudrate = baud;
        Ok(())
    }

    /// Ask the active driver to change the fix rate, in fixes per second.
    pub fn set_rate(&mut self, rate: f64) -> Result<(), EngineError> {
        self.driver.rate_switcher(&mut self.device, rate)
    }

    /// Raw control pass-through for low-level diagnostics.
    pub fn send_control(&mut self, bytes: &[u8]) -> Result<(), EngineError> {
        self.device.write_all(bytes)?;
        Ok(())
    }

    /// Forward differential corrections through the active driver.
    pub fn send_rtcm(&mut self, data: &[u8]) -> Result<usize, EngineError> {
        self.driver.rtcm_writer(&mut self.device, data)
    }

    /// Run the active driver's wrap-up and return the device.
    pub fn close(mut self) -> D {
        if let Err(e) = self.driver.wrapup(&mut self.device) {
            warn!("session {}: wrapup failed: {e}", self.path);
        }
        self.device
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor};

    struct MockDevice {
        input: Cursor<Vec<u8>>,
        written: Vec<u8>,
    }

    impl MockDevice {
        fn new(input: &[u8]) -> Self {
            MockDevice {
                input: Cursor::new(input.to_vec()),
                written: Vec::new(),
            }
        }
    }

    impl Read for MockDevice {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for MockDevice {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn session_over(input: &[u8]) -> Session<MockDevice> {
        Session::open(
            MockDevice::new(input),
            "/dev/mock0",
            None,
            Arc::new(Context::default()),
        )
        .unwrap()
    }

    const GGA: &[u8] =
        b"$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47\r\n";

    const EVERMORE_NAV: [u8; 35] = [
        0x10, 0x02, 0x1f, 0x02, 0x00, 0xdc, 0x05, 0x00, 0x87, 0x93, 0x03, 0x40, 0x42, 0x0f, 0x00,
        0x80, 0x84, 0x1e, 0x00, 0xc0, 0xc6, 0x2d, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x85,
        0x1e, 0x02, 0x0b, 0x10, 0x03,
    ];

    #[test]
    fn nmea_fix_reaches_the_record() {
        let mut session = session_over(GGA);
        match session.poll().unwrap() {
            Poll::Update(mask) => {
                assert!(mask.contains(
                    DirtyMask::TIME
                        | DirtyMask::LATLON
                        | DirtyMask::ALTITUDE
                        | DirtyMask::MODE
                        | DirtyMask::ONLINE
                ));
            },
            other => panic!("expected update, got {other:?}"),
        }
        let nav = session.navigation();
        assert!((nav.latitude - 48.1173).abs() < 1e-9);
        assert!((nav.longitude - 11.5167).abs() < 1e-9);
        assert_eq!(nav.altitude, 545.4);
        assert!(nav.online);
        assert!(nav.stamps.latlon > 0.0);
        assert!(nav.stamps.speed.is_nan());
        assert_eq!(session.driver_name(), "Generic NMEA");
        assert_eq!(session.state().tag, "GPGGA");
    }

    #[test]
    fn binary_packet_switches_the_active_driver() {
        let mut session = session_over(&EVERMORE_NAV);
        let mask = match session.poll().unwrap() {
            Poll::Update(m) => m,
            other => panic!("expected update, got {other:?}"),
        };
        assert_eq!(session.driver_name(), "EverMore binary");
        assert_eq!(session.state().driver_mode, DriverMode::Binary);
        assert!(mask.contains(DirtyMask::TIME | DirtyMask::LATLON | DirtyMask::MODE));
        assert_eq!(session.state().tag, "EID2");
    }

    #[test]
    fn probe_reply_trigger_switches_and_initializes() {
        let mut session = session_over(b"$Ack Input105.\r\n");
        match session.poll().unwrap() {
            Poll::Update(mask) => assert_eq!(mask, DirtyMask::ONLINE),
            other => panic!("expected update, got {other:?}"),
        }
        assert_eq!(session.driver_name(), "SiRF-II NMEA");
        // the initializer turned off debug messages
        let written = String::from_utf8(session.close().written).unwrap();
        assert!(written.contains("$PSRF105,0*3F"));
    }

    #[test]
    fn aivdm_two_part_assembly_through_the_session() {
        let mut input = Vec::new();
        input.extend_from_slice(
            b"!AIVDM,2,1,3,B,55P5TL01VIaAL@7WKO@mBplU@<PDhh000000001S;AJ::4A80?4i@E53,0*3E\r\n",
        );
        input.extend_from_slice(b"!AIVDM,2,2,3,B,1@0000000000000,2*55\r\n");
        let mut session = session_over(&input);

        match session.poll().unwrap() {
            Poll::Update(mask) => assert_eq!(mask, DirtyMask::ONLINE),
            other => panic!("expected update, got {other:?}"),
        }
        assert_eq!(session.driver_name(), "AIVDM");
        match session.poll().unwrap() {
            Poll::Update(mask) => assert_eq!(mask, DirtyMask::AIS),
            other => panic!("expected update, got {other:?}"),
        }
        let ais = session.state().last_ais.as_ref().unwrap();
        assert_eq!(ais.msgtype, 5);
        assert_eq!(ais.mmsi, 369_190_000);
    }

    #[test]
    fn rtcm_driver_enables_the_hunt() {
        let stream = [
            0x66, 0x41, 0x7f, 0x75, 0x6e, 0x47, 0x74, 0x77, 0x7e, 0x63, 0x7f, 0x5f, 0x4f, 0x74,
            0x48, 0x62, 0x43, 0x40, 0x61, 0x5e, 0x57, 0x44, 0x47, 0x40, 0x47, 0x4c, 0x6d, 0x73,
            0x6a, 0x50,
        ];
        let mut session = session_over(&stream);
        session.switch_driver("RTCM104").unwrap();
        match session.poll().unwrap() {
            Poll::Update(mask) => {
                assert!(mask.contains(DirtyMask::RTCM));
            },
            other => panic!("expected update, got {other:?}"),
        }
        let msg = session.state().last_rtcm.as_ref().unwrap();
        assert_eq!(msg.header.msgtype, 3);
    }

    #[test]
    fn control_rejection_keeps_the_session_alive() {
        let mut session = session_over(GGA);
        match session.set_mode(DriverMode::Binary) {
            Err(EngineError::ControlRejected { driver, operation }) => {
                assert_eq!(driver, "Generic NMEA");
                assert_eq!(operation, "mode_switcher");
            },
            other => panic!("expected rejection, got {other:?}"),
        }
        // still polls fine
        assert!(matches!(session.poll().unwrap(), Poll::Update(_)));
    }

    #[test]
    fn speed_switch_validates_the_rate_first() {
        let mut session = session_over(&[]);
        assert!(matches!(
            session.set_speed(57_600),
            Err(EngineError::UnsupportedSpeed { baud: 57_600 })
        ));
        session.switch_driver("EverMore").unwrap();
        session.set_speed(38_400).unwrap();
        assert_eq!(session.state().baudrate, 38_400);
        // the 0x89 serial config frame went out after the initializer
        let written = session.close().written;
        let tail = &written[written.len() - 10..];
        assert_eq!(tail, &[0x10, 0x02, 0x06, 0x89, 0x01, 0x03, 0x00, 0x8d, 0x10, 0x03]);
    }

    #[test]
    fn eof_takes_the_session_offline() {
        let mut session = session_over(GGA);
        assert!(matches!(session.poll().unwrap(), Poll::Update(_)));
        assert!(session.navigation().online);
        assert_eq!(session.poll().unwrap(), Poll::Eof);
        assert!(!session.navigation().online);
        assert!(session.take_mask().contains(DirtyMask::ONLINE));
    }

    #[test]
    fn cumulative_mask_accumulates_until_taken() {
        let mut input = Vec::new();
        input.extend_from_slice(GGA);
        input.extend_from_slice(b"$GPGSA,A,3,04,05,,09,12,,,24,,,,,2.5,1.3,2.1*39\r\n");
        let mut session = session_over(&input);
        assert!(matches!(session.poll().unwrap(), Poll::Update(_)));
        assert!(matches!(session.poll().unwrap(), Poll::Update(_)));
        let mask = session.take_mask();
        assert!(mask.contains(DirtyMask::LATLON | DirtyMask::USED | DirtyMask::DOP));
        assert!(session.take_mask().is_empty());
    }

    #[test]
    fn send_control_is_a_raw_passthrough() {
        let mut session = session_over(&[]);
        session.send_control(&[0x10, 0x02, 0x04, 0x81, 0x13, 0x94, 0x10, 0x03])
            .unwrap();
        let written = session.close().written;
        assert_eq!(written, vec![0x10, 0x02, 0x04, 0x81, 0x13, 0x94, 0x10, 0x03]);
    }
}
