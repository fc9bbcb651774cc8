//! Driver descriptors, the registry, and per-receiver protocol handlers.
//!
//! Each driver is a stateless descriptor: a name, an optional trigger string
//! for auto-detection, and the operations the receiver family supports.
//! Optional capabilities keep their default bodies, which reject control
//! requests with the operation name so a caller can tell what was refused.
//!
//! The registry is an ordered, immutable list assembled once at startup from
//! the enabled cargo features, Generic NMEA first.

use std::io::{self, Write};
use std::sync::OnceLock;

use crate::error::EngineError;
use crate::lexer::{Packet, PacketType};
use crate::navdata::DirtyMask;
use crate::session::{Context, DriverMode, SessionState};

#[cfg(feature = "drv-aivdm")]
pub mod aivdm;
#[cfg(feature = "drv-evermore")]
pub mod evermore;
#[cfg(feature = "drv-navcom")]
pub mod navcom;
#[cfg(feature = "drv-nmea")]
pub mod nmea;
#[cfg(feature = "drv-rtcm104")]
pub mod rtcm;

/// Capability set of one receiver family.
///
/// `parse` is the only operation every driver must provide; everything else
/// defaults to "not supported" or a no-op.
pub trait Driver: Sync {
    /// Full name of the type, matched by [`lookup`].
    fn name(&self) -> &'static str;

    /// Literal byte sequence whose appearance identifies this family.
    fn trigger(&self) -> Option<&'static [u8]> {
        None
    }

    /// Satellite channels the receiver tracks.
    fn channels(&self) -> usize;

    /// The lexer packet type this driver natively owns, if any. The session
    /// redirects packets of this type here during auto-detection.
    fn native_packet(&self) -> Option<PacketType> {
        None
    }

    /// Device setup to run when this driver becomes active.
    fn initializer(&self, _device: &mut dyn Write) -> io::Result<()> {
        Ok(())
    }

    /// Interpret one complete packet, mutating the session state and
    /// returning exactly the mask of mutated field categories.
    fn parse(&self, packet: &Packet, state: &mut SessionState, context: &Context) -> DirtyMask;

    /// Forward differential-correction bytes to the receiver.
    fn rtcm_writer(&self, device: &mut dyn Write, data: &[u8]) -> Result<usize, EngineError> {
        device.write_all(data)?;
        Ok(data.len())
    }

    /// Change the device baud rate. `speed` is already validated against
    /// the supported set.
    fn speed_switcher(&self, _device: &mut dyn Write, _speed: u32) -> Result<(), EngineError> {
        Err(EngineError::ControlRejected {
            driver: self.name(),
            operation: "speed_switcher",
        })
    }

    /// Switch the receiver between text and binary protocols. A returned
    /// driver name asks the session to make that driver active.
    fn mode_switcher(
        &self,
        _device: &mut dyn Write,
        _mode: DriverMode,
    ) -> Result<Option<&'static str>, EngineError> {
        Err(EngineError::ControlRejected {
            driver: self.name(),
            operation: "mode_switcher",
        })
    }

    /// Change the fix rate, in fixes per second.
    fn rate_switcher(&self, _device: &mut dyn Write, _rate: f64) -> Result<(), EngineError> {
        Err(EngineError::ControlRejected {
            driver: self.name(),
            operation: "rate_switcher",
        })
    }

    /// Characters per cycle, for rate-switch arithmetic.
    fn cycle_chars(&self) -> Option<usize> {
        None
    }

    /// Put the receiver to rest when the session closes.
    fn wrapup(&self, _device: &mut dyn Write) -> io::Result<()> {
        Ok(())
    }

    /// Nominal seconds between updates.
    fn cycle(&self) -> f64 {
        1.0
    }
}

/// The ordered driver registry for this build.
pub fn registry() -> &'static [&'static dyn Driver] {
    static REGISTRY: OnceLock<Vec<&'static dyn Driver>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut drivers: Vec<&'static dyn Driver> = Vec::new();
        #[cfg(feature = "drv-nmea")]
        {
            drivers.push(&nmea::GENERIC_NMEA);
            drivers.push(&nmea::SIRF_NMEA);
            drivers.push(&nmea::FV18);
            drivers.push(&nmea::TRIPMATE);
            drivers.push(&nmea::ITRAX);
        }
        #[cfg(feature = "drv-evermore")]
        drivers.push(&evermore::EVERMORE_BINARY);
        #[cfg(feature = "drv-navcom")]
        drivers.push(&navcom::NAVCOM_BINARY);
        #[cfg(feature = "drv-aivdm")]
        drivers.push(&aivdm::AIVDM);
        #[cfg(feature = "drv-rtcm104")]
        drivers.push(&rtcm::RTCM104);
        drivers
    })
}

/// Find a driver by case-sensitive substring of its name.
///
/// Zero matches and multiple matches are distinct caller-visible errors;
/// there is no implicit tiebreak.
pub fn lookup(name: &str) -> Result<&'static dyn Driver, EngineError> {
    let matches: Vec<&'static dyn Driver> = registry()
        .iter()
        .copied()
        .filter(|d| d.name().contains(name))
        .collect();
    match matches.len() {
        0 => Err(EngineError::NoSuchDriver { name: name.into() }),
        1 => Ok(matches[0]),
        _ => Err(EngineError::AmbiguousDriver {
            name: name.into(),
            matches: matches.iter().map(|d| d.name()).collect(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_starts_with_generic_nmea() {
        assert_eq!(registry()[0].name(), "Generic NMEA");
    }

    #[test]
    fn lookup_exact_substring() {
        assert_eq!(lookup("EverMore").unwrap().name(), "EverMore binary");
        assert_eq!(lookup("Navcom").unwrap().name(), "Navcom binary");
    }

    #[test]
    fn lookup_is_case_sensitive() {
        assert!(matches!(
            lookup("evermore"),
            Err(EngineError::NoSuchDriver { .. })
        ));
    }

    #[test]
    fn ambiguous_lookup_is_an_error() {
        match lookup("NMEA") {
            Err(EngineError::AmbiguousDriver { matches, .. }) => {
                assert!(matches.contains(&"Generic NMEA"));
                assert!(matches.contains(&"SiRF-II NMEA"));
            },
            Ok(d) => panic!("expected ambiguity error, got Ok({})", d.name()),
            Err(other) => panic!("expected ambiguity error, got {other:?}"),
        }
    }

    #[test]
    fn triggers_are_distinct() {
        let triggers: Vec<&[u8]> = registry().iter().filter_map(|d| d.trigger()).collect();
        for (i, a) in triggers.iter().enumerate() {
            for b in &triggers[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
