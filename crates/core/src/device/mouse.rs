//! DPI and polling rate of mouse-type devices.
//!
//! DPI is sent as two big-endian u16 axes: `[varstore, x_hi, x_lo, y_hi, y_lo, 0, 0]`.
//! The polling rate is sent as its report interval in ms:
//! 1 = 1000 Hz, 2 = 500 Hz, 8 = 125 Hz.

use super::Link;
use crate::error::{Error, Result};
use crate::report::VarStore;
use crate::safety;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Polling rate options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PollingRate {
    Hz125,
    Hz500,
    Hz1000,
}

impl PollingRate {
    pub const ALL: &'static [PollingRate] = &[Self::Hz125, Self::Hz500, Self::Hz1000];

    pub fn from_hz(hz: u16) -> Option<Self> {
        match hz {
            125 => Some(Self::Hz125),
            500 => Some(Self::Hz500),
            1000 => Some(Self::Hz1000),
            _ => None,
        }
    }

    pub fn as_hz(&self) -> u16 {
        match self {
            Self::Hz125 => 125,
            Self::Hz500 => 500,
            Self::Hz1000 => 1000,
        }
    }

    fn to_interval(self) -> u8 {
        match self {
            Self::Hz1000 => 0x01,
            Self::Hz500 => 0x02,
            Self::Hz125 => 0x08,
        }
    }

    fn from_interval(interval: u8) -> Result<Self> {
        match interval {
            0x01 => Ok(Self::Hz1000),
            0x02 => Ok(Self::Hz500),
            0x08 => Ok(Self::Hz125),
            other => Err(Error::Protocol(format!(
                "unknown polling interval 0x{other:02X}"
            ))),
        }
    }
}

impl std::fmt::Display for PollingRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} Hz", self.as_hz())
    }
}

/// Sensor resolution per axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dpi {
    pub x: u16,
    pub y: u16,
}

impl Dpi {
    /// Same resolution on both axes.
    pub fn uniform(dpi: u16) -> Self {
        Self { x: dpi, y: dpi }
    }
}

impl std::fmt::Display for Dpi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.x == self.y {
            write!(f, "{}", self.x)
        } else {
            write!(f, "{}x{}", self.x, self.y)
        }
    }
}

/// Mouse capability of an opened device.
///
/// Obtained from [`LightingDevice::mouse`](super::LightingDevice::mouse),
/// which returns `None` for every other device type.
pub struct Mouse<'a> {
    link: Link<'a>,
    max_dpi: u16,
}

impl<'a> Mouse<'a> {
    pub(crate) fn new(link: Link<'a>, max_dpi: u16) -> Self {
        Self { link, max_dpi }
    }

    pub fn max_dpi(&self) -> u16 {
        self.max_dpi
    }

    pub fn get_dpi(&self) -> Result<Dpi> {
        let raw = self.link.query(
            &self.link.commands.get_dpi,
            &[VarStore::NoStore as u8, 0, 0, 0, 0, 0, 0],
            4,
        )?;
        Ok(Dpi {
            x: u16::from_be_bytes([raw[0], raw[1]]),
            y: u16::from_be_bytes([raw[2], raw[3]]),
        })
    }

    /// Validate both axes against the device range, then send.
    pub fn set_dpi(&self, dpi: Dpi) -> Result<()> {
        let x = safety::validate_dpi(dpi.x, self.max_dpi)?.to_be_bytes();
        let y = safety::validate_dpi(dpi.y, self.max_dpi)?.to_be_bytes();
        let payload = [VarStore::NoStore as u8, x[0], x[1], y[0], y[1], 0x00, 0x00];
        self.link.exchange(self.link.commands.set_dpi.report(&payload)?)?;
        info!(%dpi, "DPI set");
        Ok(())
    }

    pub fn get_poll_rate(&self) -> Result<PollingRate> {
        let raw = self
            .link
            .query(&self.link.commands.get_poll_rate, &[0x00], 1)?;
        PollingRate::from_interval(raw[0])
    }

    pub fn set_poll_rate(&self, rate: PollingRate) -> Result<()> {
        self.link
            .exchange(self.link.commands.set_poll_rate.report(&[rate.to_interval()])?)?;
        info!(%rate, "polling rate set");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polling_rate_conversion() {
        for rate in PollingRate::ALL {
            assert_eq!(PollingRate::from_hz(rate.as_hz()), Some(*rate));
            assert_eq!(PollingRate::from_interval(rate.to_interval()).unwrap(), *rate);
        }
        assert_eq!(PollingRate::from_hz(250), None);
        assert!(PollingRate::from_interval(0x04).is_err());
    }

    #[test]
    fn polling_rate_interval_encoding() {
        assert_eq!(PollingRate::Hz1000.to_interval(), 1);
        assert_eq!(PollingRate::Hz500.to_interval(), 2);
        assert_eq!(PollingRate::Hz125.to_interval(), 8);
    }

    #[test]
    fn dpi_display() {
        assert_eq!(Dpi::uniform(800).to_string(), "800");
        assert_eq!(Dpi { x: 800, y: 1600 }.to_string(), "800x1600");
    }
}
