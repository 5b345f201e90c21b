//! Simulation time and its negotiated wire representation.

use crate::constants::{TYPE_DOUBLE, TYPE_INTEGER, VAR_TIME, VAR_TIME_STEP};
use crate::error::ProtocolError;

/// Simulation time in seconds.
pub type SimTime = f64;

/// The largest time the manager ever sends, in s.
pub const MAX_SIM_TIME: SimTime = 9_223_372.0;

/// How the server encodes simulation time, decided by its API version.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeFormat {
    /// Integer milliseconds, used up to API version 17.
    Milliseconds,
    /// Double precision seconds, used from API version 18.
    Seconds,
}

impl TimeFormat {
    /// Picks the time format for a server reporting `api_version`.
    pub fn for_api_version(api_version: i32) -> Result<Self, ProtocolError> {
        match api_version {
            15..=17 => Ok(Self::Milliseconds),
            18..=21 => Ok(Self::Seconds),
            _ => Err(ProtocolError::UnsupportedApiVersion(api_version)),
        }
    }

    /// The type tag of a time value.
    pub fn type_tag(self) -> u8 {
        match self {
            Self::Milliseconds => TYPE_INTEGER,
            Self::Seconds => TYPE_DOUBLE,
        }
    }

    /// The simulation variable that reports the server's clock.
    pub fn clock_variable(self) -> u8 {
        match self {
            Self::Milliseconds => VAR_TIME_STEP,
            Self::Seconds => VAR_TIME,
        }
    }

    /// Converts seconds into whole milliseconds, saturating at the wire limits.
    pub(crate) fn to_millis(time: SimTime) -> i32 {
        (time * 1000.0).round().clamp(i32::MIN as f64, i32::MAX as f64) as i32
    }
}
