//! Device model: lifecycle, capability traits, and the closed set of device
//! variants.
//!
//! A device instance moves through
//! `Constructed -> Opened -> Initialized -> Closed`. Operations are split by
//! capability: [`LightingDevice`] is common to every class, while
//! [`MatrixEffects`] and [`ClassicEffects`] exist only on their own class.
//! DPI and polling rate are reached through the [`Mouse`] handle, which only
//! mouse-type devices hand out.

pub mod classic;
pub mod matrix;
pub mod mouse;

pub use classic::ClassicDevice;
pub use matrix::MatrixDevice;
pub use mouse::{Dpi, Mouse, PollingRate};

use crate::commands::{CommandTable, Query};
use crate::descriptor::{DeviceDescriptor, DeviceType, ProtocolClass};
use crate::error::{Error, Result};
use crate::fake::{FakeOpener, FakeTransport};
use crate::led::{Led, LedId, Rgb, WaveDirection};
use crate::report::{Report, DEFAULT_TRANSACTION_ID};
use crate::transport::{
    exchange, HidTransport, HidapiOpener, HidapiTransport, TransportConfig, TransportOpener,
};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Lifecycle state of a device instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Constructed,
    Opened,
    Initialized,
    Closed,
}

/// Firmware version reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareVersion {
    pub major: u8,
    pub minor: u8,
}

impl std::fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}.{}", self.major, self.minor)
    }
}

/// Physical keyboard layouts known to the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyboardLayout {
    Us,
    Greek,
    German,
    French,
    Russian,
    Uk,
    Nordic,
    Turkish,
    Japanese,
    Spanish,
    Italian,
    Portuguese,
    UsMac,
}

impl KeyboardLayout {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(Self::Us),
            0x02 => Some(Self::Greek),
            0x03 => Some(Self::German),
            0x04 => Some(Self::French),
            0x05 => Some(Self::Russian),
            0x06 => Some(Self::Uk),
            0x07 => Some(Self::Nordic),
            0x0A => Some(Self::Turkish),
            0x0C => Some(Self::Japanese),
            0x10 => Some(Self::Spanish),
            0x11 => Some(Self::Italian),
            0x12 => Some(Self::Portuguese),
            0x81 => Some(Self::UsMac),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Us => "en_US",
            Self::Greek => "el_GR",
            Self::German => "de_DE",
            Self::French => "fr_FR",
            Self::Russian => "ru_RU",
            Self::Uk => "en_GB",
            Self::Nordic => "Nordic",
            Self::Turkish => "tr_TR",
            Self::Japanese => "ja_JP",
            Self::Spanish => "es_ES",
            Self::Italian => "it_IT",
            Self::Portuguese => "pt_PT",
            Self::UsMac => "en_US_mac",
        }
    }
}

/// Outcome of a keyboard layout query that completed its round trip.
///
/// A failed round trip is an `Err` instead, so callers can tell "the
/// hardware does not know" apart from "the device did not answer".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutQuery {
    Recognized(KeyboardLayout),
    /// The firmware answered with a layout id this library does not know.
    Unrecognized(u8),
    /// The firmware does not implement the layout command.
    Unsupported,
}

/// Operations common to every device class.
pub trait LightingDevice {
    fn descriptor(&self) -> &DeviceDescriptor;
    fn state(&self) -> DeviceState;

    /// Query every descriptor LED and create its entity; all or nothing.
    fn initialize(&mut self) -> Result<()>;

    /// Release the handle and drop every LED entity.
    fn close(&mut self);

    /// Snapshot of one LED entity.
    fn led(&self, id: LedId) -> Option<Led>;
    fn leds(&self) -> Vec<Led>;

    fn set_none(&mut self, led: LedId) -> Result<()>;
    fn set_static(&mut self, led: LedId, color: Rgb) -> Result<()>;
    fn set_spectrum(&mut self, led: LedId) -> Result<()>;
    fn set_wave(&mut self, led: LedId, direction: WaveDirection) -> Result<()>;
    fn set_brightness(&mut self, led: LedId, brightness: u8) -> Result<()>;
    fn get_brightness(&self, led: LedId) -> Result<u8>;

    fn get_serial(&self) -> Result<String>;
    fn get_firmware_version(&self) -> Result<FirmwareVersion>;
    fn get_keyboard_layout(&self) -> Result<LayoutQuery>;

    /// DPI and polling-rate handle; `None` unless this is an opened mouse.
    fn mouse(&self) -> Option<Mouse<'_>>;
}

/// Effects only the matrix protocol class can express.
pub trait MatrixEffects: LightingDevice {
    fn set_breathing(&mut self, led: LedId, color: Rgb) -> Result<()>;
    fn set_breathing_dual(&mut self, led: LedId, color: Rgb, color2: Rgb) -> Result<()>;
    fn set_breathing_random(&mut self, led: LedId) -> Result<()>;
    /// Upload one row of per-key colors for the custom frame.
    fn define_custom_frame(&mut self, row: u8, start: u8, end: u8, colors: &[Rgb]) -> Result<()>;
    /// Display the uploaded custom frame.
    fn set_custom_frame(&mut self, led: LedId) -> Result<()>;
}

/// Per-LED register operations of the classic protocol class.
pub trait ClassicEffects: LightingDevice {
    fn set_breathing(&mut self, led: LedId, color: Rgb) -> Result<()>;
    fn set_breathing_dual(&mut self, led: LedId, color: Rgb, color2: Rgb) -> Result<()>;
    fn set_breathing_random(&mut self, led: LedId) -> Result<()>;
    fn set_blinking(&mut self, led: LedId, color: Rgb) -> Result<()>;
    /// Switch the LED on or off without touching its effect.
    fn set_led_state(&mut self, led: LedId, on: bool) -> Result<()>;
}

/// Borrowed view of an opened handle, enough to run one round trip.
pub(crate) struct Link<'a> {
    transport: &'a dyn HidTransport,
    config: TransportConfig,
    transaction_id: u8,
    pub(crate) commands: &'a CommandTable,
}

impl Link<'_> {
    pub(crate) fn exchange(&self, request: Report) -> Result<Report> {
        let request = request.with_transaction_id(self.transaction_id);
        exchange(self.transport, &request, &self.config)
    }

    /// Run a get command and copy `len` value bytes out of the response.
    pub(crate) fn query(&self, query: &Query, payload: &[u8], len: usize) -> Result<Vec<u8>> {
        let response = self.exchange(query.command.report(payload)?)?;
        Ok(query.value(&response, len)?.to_vec())
    }
}

/// State shared by the matrix and classic devices.
pub(crate) struct DeviceCore<T, L> {
    pub(crate) descriptor: DeviceDescriptor,
    pub(crate) commands: CommandTable,
    pub(crate) leds: BTreeMap<LedId, L>,
    transport: Option<T>,
    config: TransportConfig,
    transaction_id: u8,
    state: DeviceState,
}

impl<T: HidTransport, L> DeviceCore<T, L> {
    pub(crate) fn new(descriptor: DeviceDescriptor, commands: CommandTable) -> Self {
        Self {
            descriptor,
            commands,
            leds: BTreeMap::new(),
            transport: None,
            config: TransportConfig::default(),
            transaction_id: DEFAULT_TRANSACTION_ID,
            state: DeviceState::Constructed,
        }
    }

    pub(crate) fn state(&self) -> DeviceState {
        self.state
    }

    pub(crate) fn set_transport_config(&mut self, config: TransportConfig) {
        self.config = config;
    }

    pub(crate) fn set_transaction_id(&mut self, transaction_id: u8) {
        self.transaction_id = transaction_id;
    }

    pub(crate) fn open<O>(&mut self, opener: &O, path: &str) -> Result<()>
    where
        O: TransportOpener<Transport = T>,
    {
        let transport = opener.open(path).inspect_err(|e| {
            warn!(device = %self.descriptor.name, path, error = %e, "failed to open device handle");
        })?;
        self.transport = Some(transport);
        self.state = DeviceState::Opened;
        debug!(device = %self.descriptor.name, path, "device handle opened");
        Ok(())
    }

    pub(crate) fn link(&self) -> Result<Link<'_>> {
        let transport = self
            .transport
            .as_ref()
            .ok_or_else(|| Error::Transport("device handle is not open".into()))?;
        Ok(Link {
            transport,
            config: self.config,
            transaction_id: self.transaction_id,
            commands: &self.commands,
        })
    }

    pub(crate) fn cached(&self, id: LedId) -> Result<&L> {
        self.leds.get(&id).ok_or(Error::UnknownLed(id))
    }

    pub(crate) fn led_mut(&mut self, id: LedId) -> Result<&mut L> {
        self.leds.get_mut(&id).ok_or(Error::UnknownLed(id))
    }

    pub(crate) fn require_led(&self, id: LedId) -> Result<()> {
        if self.leds.contains_key(&id) {
            Ok(())
        } else {
            Err(Error::UnknownLed(id))
        }
    }

    /// Install a fully initialized LED set.
    pub(crate) fn finish_init(&mut self, leds: BTreeMap<LedId, L>) {
        info!(device = %self.descriptor.name, count = leds.len(), "LEDs initialized");
        self.leds = leds;
        self.state = DeviceState::Initialized;
    }

    pub(crate) fn close(&mut self) {
        self.transport = None;
        self.leds.clear();
        self.state = DeviceState::Closed;
        debug!(device = %self.descriptor.name, "device closed");
    }

    pub(crate) fn get_serial(&self) -> Result<String> {
        let link = self.link()?;
        let raw = link.query(&link.commands.get_serial, &[0u8; 22], 22)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        Ok(String::from_utf8_lossy(&raw[..end]).trim().to_string())
    }

    pub(crate) fn get_firmware_version(&self) -> Result<FirmwareVersion> {
        let link = self.link()?;
        let raw = link.query(&link.commands.get_firmware, &[0x00, 0x00], 2)?;
        Ok(FirmwareVersion {
            major: raw[0],
            minor: raw[1],
        })
    }

    pub(crate) fn get_keyboard_layout(&self) -> Result<LayoutQuery> {
        let link = self.link()?;
        match link.query(&link.commands.get_keyboard_layout, &[0x00, 0x00], 1) {
            Ok(raw) => Ok(KeyboardLayout::from_byte(raw[0])
                .map(LayoutQuery::Recognized)
                .unwrap_or(LayoutQuery::Unrecognized(raw[0]))),
            Err(Error::CommandNotSupported { .. }) => Ok(LayoutQuery::Unsupported),
            Err(e) => Err(e),
        }
    }

    pub(crate) fn mouse(&self) -> Option<Mouse<'_>> {
        if self.descriptor.device_type != DeviceType::Mouse {
            return None;
        }
        let max_dpi = self.descriptor.max_dpi?;
        self.link().ok().map(|link| Mouse::new(link, max_dpi))
    }
}

/// Log and convert a failed initialization round trip.
pub(crate) fn init_failure(led: LedId, step: &str, err: Error) -> Error {
    warn!(%led, step, error = %err, "LED initialization round trip failed");
    Error::InitializationFailed { led }
}

/// Every device variant this library can drive.
pub enum AnyDevice {
    Classic(ClassicDevice<HidapiTransport>),
    Matrix(MatrixDevice<HidapiTransport>),
    /// Matrix protocol over simulated firmware.
    Fake(MatrixDevice<FakeTransport>),
}

impl AnyDevice {
    /// Construct the variant selected by `pclass`, open `path`, and initialize.
    pub fn open(descriptor: DeviceDescriptor, opener: &HidapiOpener, path: &str) -> Result<Self> {
        info!(
            name = %descriptor.name,
            vid = format_args!("{:04x}", descriptor.vid),
            pid = format_args!("{:04x}", descriptor.pid),
            "initializing device"
        );
        let mut device = match descriptor.pclass {
            ProtocolClass::Classic => {
                let mut d = ClassicDevice::new(descriptor);
                d.open_handle(opener, path)?;
                Self::Classic(d)
            }
            ProtocolClass::Matrix => {
                let mut d = MatrixDevice::new(descriptor);
                d.open_handle(opener, path)?;
                Self::Matrix(d)
            }
        };
        device.lighting_mut().initialize()?;
        Ok(device)
    }

    /// A fake device for `descriptor`, backed by fresh simulated firmware.
    pub fn fake(descriptor: DeviceDescriptor) -> Result<Self> {
        let mut device = MatrixDevice::new(descriptor);
        device.open_handle(&FakeOpener::new(FakeTransport::new()), "fake")?;
        device.initialize()?;
        Ok(Self::Fake(device))
    }

    pub fn lighting(&self) -> &dyn LightingDevice {
        match self {
            Self::Classic(d) => d,
            Self::Matrix(d) => d,
            Self::Fake(d) => d,
        }
    }

    pub fn lighting_mut(&mut self) -> &mut dyn LightingDevice {
        match self {
            Self::Classic(d) => d,
            Self::Matrix(d) => d,
            Self::Fake(d) => d,
        }
    }

    /// Matrix-only operations, when this is a matrix-class device.
    pub fn matrix_mut(&mut self) -> Option<&mut dyn MatrixEffects> {
        match self {
            Self::Matrix(d) => Some(d),
            Self::Fake(d) => Some(d),
            Self::Classic(_) => None,
        }
    }

    /// Classic-only operations, when this is a classic-class device.
    pub fn classic_mut(&mut self) -> Option<&mut dyn ClassicEffects> {
        match self {
            Self::Classic(d) => Some(d),
            _ => None,
        }
    }
}
