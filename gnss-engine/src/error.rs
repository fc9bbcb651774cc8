use core::fmt;
use std::io;

/// Errors surfaced to the caller of a [`Session`](crate::session::Session).
///
/// Framing noise never appears here: the lexer recovers from checksum and
/// parity failures by byte-wise resync, and decoders report malformed packets
/// through the dirty mask's `ERROR` bit instead of failing the call.
#[derive(Debug)]
pub enum EngineError {
    /// Device I/O failed; the session should be torn down.
    Io(io::Error),
    /// No driver name contains the requested string.
    NoSuchDriver { name: String },
    /// More than one driver name contains the requested string.
    AmbiguousDriver {
        name: String,
        matches: Vec<&'static str>,
    },
    /// The active driver does not support the requested control operation,
    /// or the device rejected it. The session keeps running.
    ControlRejected {
        driver: &'static str,
        operation: &'static str,
    },
    /// The requested baud rate is not one the switchers can encode.
    UnsupportedSpeed { baud: u32 },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Io(e) => write!(f, "device I/O error: {e}"),
            EngineError::NoSuchDriver { name } => {
                write!(f, "no driver matching {name:?}")
            },
            EngineError::AmbiguousDriver { name, matches } => {
                write!(f, "driver name {name:?} is ambiguous: {matches:?}")
            },
            EngineError::ControlRejected { driver, operation } => {
                write!(f, "driver {driver:?} rejected control operation {operation}")
            },
            EngineError::UnsupportedSpeed { baud } => {
                write!(f, "unsupported baud rate {baud}")
            },
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for EngineError {
    fn from(e: io::Error) -> Self {
        EngineError::Io(e)
    }
}
