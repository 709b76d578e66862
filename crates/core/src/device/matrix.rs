//! Matrix protocol class.

use super::{
    init_failure, DeviceCore, DeviceState, FirmwareVersion, LayoutQuery, LightingDevice,
    MatrixEffects, Mouse,
};
use crate::commands::{CommandTable, EffectRequest};
use crate::descriptor::DeviceDescriptor;
use crate::error::Result;
use crate::led::{Led, LedId, MatrixLed, Rgb, WaveDirection};
use crate::safety;
use crate::transport::{HidTransport, TransportConfig, TransportOpener};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// A device whose effects go through the matrix effect command.
pub struct MatrixDevice<T> {
    core: DeviceCore<T, MatrixLed>,
}

impl<T: HidTransport> MatrixDevice<T> {
    /// Constructed state, with the stock command table for the descriptor's quirks.
    pub fn new(descriptor: DeviceDescriptor) -> Self {
        let commands = CommandTable::matrix(&descriptor.quirks);
        Self::with_commands(descriptor, commands)
    }

    /// Constructed state with a caller-supplied command table.
    pub fn with_commands(descriptor: DeviceDescriptor, commands: CommandTable) -> Self {
        Self {
            core: DeviceCore::new(descriptor, commands),
        }
    }

    pub fn set_transport_config(&mut self, config: TransportConfig) {
        self.core.set_transport_config(config);
    }

    pub fn set_transaction_id(&mut self, transaction_id: u8) {
        self.core.set_transaction_id(transaction_id);
    }

    /// Open the transport. On failure the device stays in its current state.
    pub fn open_handle<O>(&mut self, opener: &O, path: &str) -> Result<()>
    where
        O: TransportOpener<Transport = T>,
    {
        self.core.open(opener, path)
    }

    /// Send `request` for `led` and cache it once acknowledged.
    fn set_effect(&mut self, led: LedId, request: EffectRequest) -> Result<()> {
        self.core.require_led(led)?;
        let report = self.core.commands.effect_report(led, &request)?;
        self.core.link()?.exchange(report)?;

        let (color, color2) = request.colors();
        self.core.led_mut(led)?.apply(request.effect(), color, color2);
        debug!(%led, effect = ?request.effect(), "effect applied");
        Ok(())
    }

    fn query_brightness(&self, led: LedId) -> Result<u8> {
        let link = self.core.link()?;
        let response = link.exchange(self.core.commands.get_brightness_report(led)?)?;
        Ok(self.core.commands.get_brightness.value(&response, 1)?[0])
    }
}

impl<T: HidTransport> LightingDevice for MatrixDevice<T> {
    fn descriptor(&self) -> &DeviceDescriptor {
        &self.core.descriptor
    }

    fn state(&self) -> DeviceState {
        self.core.state()
    }

    fn initialize(&mut self) -> Result<()> {
        let mut leds = BTreeMap::new();
        for &id in &self.core.descriptor.leds {
            let brightness = self
                .query_brightness(id)
                .map_err(|e| init_failure(id, "get brightness", e))?;
            let report = self
                .core
                .commands
                .effect_report(id, &EffectRequest::Spectrum)
                .map_err(|e| init_failure(id, "encode spectrum", e))?;
            self.core
                .link()
                .and_then(|link| link.exchange(report))
                .map_err(|e| init_failure(id, "spectrum", e))?;
            leds.insert(id, MatrixLed::new(id, brightness));
        }
        self.core.finish_init(leds);
        Ok(())
    }

    fn close(&mut self) {
        self.core.close();
    }

    fn led(&self, id: LedId) -> Option<Led> {
        self.core.leds.get(&id).copied().map(Led::Matrix)
    }

    fn leds(&self) -> Vec<Led> {
        self.core.leds.values().copied().map(Led::Matrix).collect()
    }

    fn set_none(&mut self, led: LedId) -> Result<()> {
        self.set_effect(led, EffectRequest::None)
    }

    fn set_static(&mut self, led: LedId, color: Rgb) -> Result<()> {
        self.set_effect(led, EffectRequest::Static(color))
    }

    fn set_spectrum(&mut self, led: LedId) -> Result<()> {
        self.set_effect(led, EffectRequest::Spectrum)
    }

    fn set_wave(&mut self, led: LedId, direction: WaveDirection) -> Result<()> {
        self.set_effect(led, EffectRequest::Wave(direction))
    }

    fn set_brightness(&mut self, led: LedId, brightness: u8) -> Result<()> {
        self.core.require_led(led)?;
        let report = self.core.commands.set_brightness_report(led, brightness)?;
        self.core.link()?.exchange(report)?;
        self.core.led_mut(led)?.brightness = brightness;
        debug!(%led, brightness, "brightness set");
        Ok(())
    }

    fn get_brightness(&self, led: LedId) -> Result<u8> {
        self.core.require_led(led)?;
        self.query_brightness(led)
    }

    fn get_serial(&self) -> Result<String> {
        self.core.get_serial()
    }

    fn get_firmware_version(&self) -> Result<FirmwareVersion> {
        self.core.get_firmware_version()
    }

    fn get_keyboard_layout(&self) -> Result<LayoutQuery> {
        self.core.get_keyboard_layout()
    }

    fn mouse(&self) -> Option<Mouse<'_>> {
        self.core.mouse()
    }
}

impl<T: HidTransport> MatrixEffects for MatrixDevice<T> {
    fn set_breathing(&mut self, led: LedId, color: Rgb) -> Result<()> {
        self.set_effect(led, EffectRequest::Breathing(color))
    }

    fn set_breathing_dual(&mut self, led: LedId, color: Rgb, color2: Rgb) -> Result<()> {
        self.set_effect(led, EffectRequest::BreathingDual(color, color2))
    }

    fn set_breathing_random(&mut self, led: LedId) -> Result<()> {
        self.set_effect(led, EffectRequest::BreathingRandom)
    }

    fn define_custom_frame(&mut self, row: u8, start: u8, end: u8, colors: &[Rgb]) -> Result<()> {
        safety::validate_frame_row(
            self.core.descriptor.matrix_dimensions,
            row,
            start,
            end,
            colors.len(),
        )?;
        let report = self.core.commands.frame_row_report(row, start, end, colors)?;
        self.core.link()?.exchange(report)?;
        info!(row, start, end, "custom frame row uploaded");
        Ok(())
    }

    fn set_custom_frame(&mut self, led: LedId) -> Result<()> {
        self.set_effect(led, EffectRequest::Custom)
    }
}
