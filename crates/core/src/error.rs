//! Error types for open-chroma-core.

use crate::led::LedId;
use thiserror::Error;

/// Why an interactive bring-up session stopped without producing a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// The operator reported that the LEDs did not all turn off.
    LedsNotOff,
    /// No LED was confirmed as responsive.
    NoLedConfirmed,
    /// Every known LED was confirmed, which is almost always a single shared zone.
    AllLedsConfirmed,
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LedsNotOff => write!(f, "LEDs did not turn off"),
            Self::NoLedConfirmed => write!(f, "no LED is supported"),
            Self::AllLedsConfirmed => write!(
                f,
                "all LEDs confirmed; likely a single shared zone misreported as all zones"
            ),
        }
    }
}

/// Core library error type.
#[derive(Debug, Error)]
pub enum Error {
    /// The device handle could not be opened, usually a hidraw permission problem.
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    /// I/O failure or timeout on an opened handle.
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed, checksum-mismatched, or mis-sequenced response.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Firmware answered with the "not supported" status for this command.
    #[error("command not supported: class 0x{class:02X}, id 0x{id:02X}")]
    CommandNotSupported { class: u8, id: u8 },

    /// A round trip during LED initialization failed.
    #[error("initialization failed for LED {led}")]
    InitializationFailed { led: LedId },

    /// Bring-up exhausted every quirk combination.
    #[error("no quirk combination initialized the device")]
    NoWorkingQuirks,

    /// Bring-up stopped on operator input.
    #[error("bring-up aborted: {0}")]
    BringupAborted(AbortReason),

    /// Operation does not exist for this device class.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(&'static str),

    /// The LED is not managed by this device instance.
    #[error("LED {0} is not managed by this device")]
    UnknownLed(LedId),

    /// Value out of safe range.
    #[error("value out of range: {field} = {value} (allowed {min}..={max})")]
    OutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },

    /// Descriptor database could not be read or parsed.
    #[error("descriptor error: {0}")]
    Descriptor(String),

    /// Operator prompt I/O failure.
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, Error>;
