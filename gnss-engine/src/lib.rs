//! Multi-protocol packet engine for GNSS receivers.
//!
//! The engine ingests raw byte streams from heterogeneous GPS devices,
//! identifies which binary or text protocol each device speaks, frames and
//! validates packets, and decodes them into a unified navigation record.
//!
//! Three subsystems carry the weight:
//!
//! - the [`PacketLexer`], a byte-at-a-time classification automaton over
//!   NMEA 0183, AIVDM, SiRF, EverMore, Navcom NCT, TSIP, Garmin, Zodiac,
//!   iTalk and bit-synchronous RTCM-104 framing;
//! - the framed protocol decoders: EverMore and Navcom binary
//!   ([`drivers::evermore`], [`drivers::navcom`]), multi-sentence AIS
//!   reassembly ([`ais`]), and the RTCM-104 word machine with parity
//!   recovery and an exact re-encoder ([`rtcm104`]);
//! - the [`Session`], which owns one device, auto-detects its driver by
//!   packet type or trigger string, and merges every parse into a
//!   [`NavigationRecord`] tagged with a [`DirtyMask`] of changed fields.
//!
//! ```no_run
//! use std::sync::Arc;
//! use gnss_engine::{Context, Poll, Session};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let device = std::fs::OpenOptions::new()
//!     .read(true)
//!     .write(true)
//!     .open("/dev/ttyUSB0")?;
//! let context = Arc::new(Context::default());
//! let mut session = Session::open(device, "/dev/ttyUSB0", Some(4800), context)?;
//! loop {
//!     match session.poll()? {
//!         Poll::Update(mask) => println!("fields changed: {mask:?}"),
//!         Poll::Incomplete => continue,
//!         Poll::Eof => break,
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub use crate::{
    error::EngineError,
    lexer::{Outcome, Packet, PacketLexer, PacketType},
    navdata::{DirtyMask, FieldStamps, FixMode, FixStatus, NavigationRecord, Satellite},
    session::{Context, DriverMode, Poll, Session, SessionState},
};

pub mod ais;
pub mod bits;
pub mod constants;
pub mod drivers;
mod error;
pub mod geodesy;
pub mod gpstime;
mod lexer;
mod navdata;
pub mod rtcm104;
mod session;
