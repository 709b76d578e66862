//! Classic protocol class: effects are set per LED through separate on/off,
//! effect and RGB registers.
//!
//! An effect is applied in steps (switch on, write the color, write the
//! effect). The steps are staged on a copy of the cached entity, which is
//! committed only once the last step is acknowledged.

use super::{
    init_failure, ClassicEffects, DeviceCore, DeviceState, FirmwareVersion, LayoutQuery,
    LightingDevice, Mouse,
};
use crate::commands::{Command, CommandTable, Query};
use crate::descriptor::DeviceDescriptor;
use crate::error::{Error, Result};
use crate::led::{ClassicEffect, ClassicLed, Led, LedId, Rgb, WaveDirection};
use crate::report::VarStore;
use crate::transport::{HidTransport, TransportConfig, TransportOpener};
use std::collections::BTreeMap;
use tracing::debug;

/// Breathing mode byte appended to the effect register.
const BREATHING_DUAL: u8 = 0x02;
const BREATHING_RANDOM: u8 = 0x03;

pub struct ClassicDevice<T> {
    core: DeviceCore<T, ClassicLed>,
}

impl<T: HidTransport> ClassicDevice<T> {
    pub fn new(descriptor: DeviceDescriptor) -> Self {
        Self::with_commands(descriptor, CommandTable::classic())
    }

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

    pub fn open_handle<O>(&mut self, opener: &O, path: &str) -> Result<()>
    where
        O: TransportOpener<Transport = T>,
    {
        self.core.open(opener, path)
    }

    /// Write `[varstore, led, value...]` to an LED register.
    fn write(&self, command: Command, led: LedId, value: &[u8]) -> Result<()> {
        let mut payload = vec![VarStore::Store as u8, led.as_byte()];
        payload.extend_from_slice(value);
        self.core.link()?.exchange(command.report(&payload)?)?;
        Ok(())
    }

    fn read(&self, query: Query, led: LedId, len: usize) -> Result<Vec<u8>> {
        let mut payload = vec![VarStore::Store as u8, led.as_byte()];
        payload.resize(2 + len, 0x00);
        self.core.link()?.query(&query, &payload, len)
    }

    fn read_led(&self, id: LedId) -> Result<ClassicLed> {
        let registers = self.core.commands.classic;
        let on = self.read(registers.get_state, id, 1)?[0] != 0;
        let effect_byte = self.read(registers.get_effect, id, 1)?[0];
        let effect = ClassicEffect::from_byte(effect_byte).ok_or_else(|| {
            Error::Protocol(format!("unknown classic effect 0x{effect_byte:02X}"))
        })?;
        let rgb = self.read(registers.get_rgb, id, 3)?;
        let brightness = self.read(self.core.commands.get_brightness, id, 1)?[0];
        Ok(ClassicLed {
            id,
            on,
            effect,
            color: Rgb::new(rgb[0], rgb[1], rgb[2]),
            brightness,
        })
    }

    fn write_state(&self, led: &mut ClassicLed, on: bool) -> Result<()> {
        self.write(self.core.commands.classic.set_state, led.id, &[on as u8])?;
        led.on = on;
        Ok(())
    }

    fn write_color(&self, led: &mut ClassicLed, color: Rgb) -> Result<()> {
        self.write(self.core.commands.classic.set_rgb, led.id, &color.bytes())?;
        led.color = color;
        Ok(())
    }

    fn write_effect(
        &self,
        led: &mut ClassicLed,
        effect: ClassicEffect,
        extra: &[u8],
    ) -> Result<()> {
        let mut value = vec![effect as u8];
        value.extend_from_slice(extra);
        self.write(self.core.commands.classic.set_effect, led.id, &value)?;
        led.effect = effect;
        Ok(())
    }

    /// Switch on (unless already on), write the color, then the effect.
    fn apply(
        &mut self,
        id: LedId,
        effect: ClassicEffect,
        color: Option<Rgb>,
        extra: &[u8],
    ) -> Result<()> {
        let mut staged = *self.core.cached(id)?;
        if !staged.on {
            self.write_state(&mut staged, true)?;
        }
        if let Some(color) = color {
            self.write_color(&mut staged, color)?;
        }
        self.write_effect(&mut staged, effect, extra)?;
        *self.core.led_mut(id)? = staged;
        debug!(led = %id, ?effect, "classic effect applied");
        Ok(())
    }
}

impl<T: HidTransport> LightingDevice for ClassicDevice<T> {
    fn descriptor(&self) -> &DeviceDescriptor {
        &self.core.descriptor
    }

    fn state(&self) -> DeviceState {
        self.core.state()
    }

    fn initialize(&mut self) -> Result<()> {
        let mut leds = BTreeMap::new();
        for &id in &self.core.descriptor.leds {
            let led = self
                .read_led(id)
                .map_err(|e| init_failure(id, "read registers", e))?;
            leds.insert(id, led);
        }
        self.core.finish_init(leds);
        Ok(())
    }

    fn close(&mut self) {
        self.core.close();
    }

    fn led(&self, id: LedId) -> Option<Led> {
        self.core.leds.get(&id).copied().map(Led::Classic)
    }

    fn leds(&self) -> Vec<Led> {
        self.core.leds.values().copied().map(Led::Classic).collect()
    }

    fn set_none(&mut self, led: LedId) -> Result<()> {
        self.set_led_state(led, false)
    }

    fn set_static(&mut self, led: LedId, color: Rgb) -> Result<()> {
        self.apply(led, ClassicEffect::Static, Some(color), &[])
    }

    fn set_spectrum(&mut self, led: LedId) -> Result<()> {
        self.apply(led, ClassicEffect::Spectrum, None, &[])
    }

    fn set_wave(&mut self, led: LedId, direction: WaveDirection) -> Result<()> {
        self.apply(led, ClassicEffect::Wave, None, &[direction as u8])
    }

    fn set_brightness(&mut self, led: LedId, brightness: u8) -> Result<()> {
        self.core.require_led(led)?;
        self.write(self.core.commands.set_brightness, led, &[brightness])?;
        self.core.led_mut(led)?.brightness = brightness;
        Ok(())
    }

    fn get_brightness(&self, led: LedId) -> Result<u8> {
        self.core.require_led(led)?;
        Ok(self.read(self.core.commands.get_brightness, led, 1)?[0])
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

impl<T: HidTransport> ClassicEffects for ClassicDevice<T> {
    fn set_breathing(&mut self, led: LedId, color: Rgb) -> Result<()> {
        self.apply(led, ClassicEffect::Breathing, Some(color), &[])
    }

    fn set_breathing_dual(&mut self, led: LedId, color: Rgb, color2: Rgb) -> Result<()> {
        let mut extra = vec![BREATHING_DUAL];
        extra.extend_from_slice(&color2.bytes());
        self.apply(led, ClassicEffect::Breathing, Some(color), &extra)
    }

    fn set_breathing_random(&mut self, led: LedId) -> Result<()> {
        self.apply(led, ClassicEffect::Breathing, None, &[BREATHING_RANDOM])
    }

    fn set_blinking(&mut self, led: LedId, color: Rgb) -> Result<()> {
        self.apply(led, ClassicEffect::Blinking, Some(color), &[])
    }

    fn set_led_state(&mut self, led: LedId, on: bool) -> Result<()> {
        let mut staged = *self.core.cached(led)?;
        self.write_state(&mut staged, on)?;
        *self.core.led_mut(led)? = staged;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{DeviceType, Fx, MatrixDimensions, ProtocolClass};
    use crate::fake::{FakeOpener, FakeTransport};
    use crate::quirks::QuirkSet;

    fn descriptor() -> DeviceDescriptor {
        DeviceDescriptor {
            name: "Test Classic Keyboard".into(),
            vid: 0x1532,
            pid: 0x011A,
            device_type: DeviceType::Keyboard,
            pclass: ProtocolClass::Classic,
            leds: vec![LedId::Logo, LedId::Backlight],
            fx: vec![Fx::Off, Fx::Static, Fx::Breathing, Fx::Blinking, Fx::Spectrum],
            features: vec![],
            quirks: QuirkSet::empty(),
            matrix_dimensions: MatrixDimensions::default(),
            max_dpi: None,
        }
    }

    fn initialized(fake: &FakeTransport) -> ClassicDevice<FakeTransport> {
        let mut device = ClassicDevice::new(descriptor());
        device.set_transport_config(TransportConfig::immediate());
        device
            .open_handle(&FakeOpener::new(fake.clone()), "/dev/hidraw1")
            .unwrap();
        device.initialize().unwrap();
        device
    }

    fn classic(device: &ClassicDevice<FakeTransport>, id: LedId) -> ClassicLed {
        match device.led(id) {
            Some(Led::Classic(led)) => led,
            other => panic!("expected classic LED, got {other:?}"),
        }
    }

    #[test]
    fn initialize_reads_every_register() {
        let fake = FakeTransport::new();
        let device = initialized(&fake);
        let ids: Vec<_> = fake
            .requests()
            .iter()
            .map(|r| (r.command_class, r.command_id))
            .collect();
        let per_led = [(0x03, 0x80), (0x03, 0x82), (0x03, 0x81), (0x03, 0x83)];
        assert_eq!(ids.len(), 8);
        assert_eq!(&ids[..4], &per_led);
        assert_eq!(&ids[4..], &per_led);

        let logo = classic(&device, LedId::Logo);
        assert!(!logo.on);
        assert_eq!(logo.effect, ClassicEffect::Static);
    }

    #[test]
    fn static_switches_led_on_first() {
        let fake = FakeTransport::new();
        let mut device = initialized(&fake);
        fake.clear_requests();
        device.set_static(LedId::Logo, Rgb::YELLOW).unwrap();

        let sent: Vec<_> = fake.requests();
        assert_eq!(sent.len(), 3);
        assert_eq!((sent[0].command_id, sent[0].args[2]), (0x00, 0x01));
        assert_eq!(sent[1].command_id, 0x01);
        assert_eq!(&sent[1].args[2..5], &[0xFF, 0xFF, 0x00]);
        assert_eq!(sent[2].command_id, 0x02);

        let logo = classic(&device, LedId::Logo);
        assert!(logo.on);
        assert_eq!(logo.color, Rgb::YELLOW);
        assert_eq!(Led::Classic(logo).effect_name(), "static");

        // already on: no state write this time
        fake.clear_requests();
        device.set_spectrum(LedId::Logo).unwrap();
        assert_eq!(fake.requests().len(), 1);
    }

    #[test]
    fn none_turns_led_off_keeping_effect() {
        let fake = FakeTransport::new();
        let mut device = initialized(&fake);
        device.set_blinking(LedId::Backlight, Rgb::YELLOW).unwrap();
        device.set_none(LedId::Backlight).unwrap();
        let led = classic(&device, LedId::Backlight);
        assert!(!led.on);
        assert_eq!(led.effect, ClassicEffect::Blinking);
        assert_eq!(Led::Classic(led).effect_name(), "off");
    }

    #[test]
    fn failed_step_leaves_led_unchanged() {
        let fake = FakeTransport::new();
        let mut device = initialized(&fake);
        let before = classic(&device, LedId::Logo);
        fake.reject(Command::new(0x03, 0x02));
        assert!(matches!(
            device.set_static(LedId::Logo, Rgb::YELLOW),
            Err(Error::CommandNotSupported { .. })
        ));
        assert_eq!(classic(&device, LedId::Logo), before);

        // the switch-on step was not committed, so the next call sends it again
        fake.clear_requests();
        assert!(device.set_spectrum(LedId::Logo).is_err());
        assert_eq!(fake.requests()[0].command_id, 0x00);
        assert_eq!(classic(&device, LedId::Logo), before);
    }

    #[test]
    fn breathing_variants_append_mode() {
        let fake = FakeTransport::new();
        let mut device = initialized(&fake);
        device.set_breathing_random(LedId::Logo).unwrap();
        let last = fake.requests().pop().unwrap();
        assert_eq!(last.payload(), &[0x01, 0x04, 0x02, 0x03]);

        device
            .set_breathing_dual(LedId::Logo, Rgb::YELLOW, Rgb::new(0, 0, 0xFF))
            .unwrap();
        let last = fake.requests().pop().unwrap();
        assert_eq!(last.payload(), &[0x01, 0x04, 0x02, 0x02, 0x00, 0x00, 0xFF]);
        assert_eq!(classic(&device, LedId::Logo).effect, ClassicEffect::Breathing);
    }

    #[test]
    fn wave_writes_effect_register() {
        let fake = FakeTransport::new();
        let mut device = initialized(&fake);
        device.set_led_state(LedId::Logo, true).unwrap();
        fake.clear_requests();
        device
            .set_wave(LedId::Logo, WaveDirection::RightToLeft)
            .unwrap();

        let sent = fake.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!((sent[0].command_class, sent[0].command_id), (0x03, 0x02));
        assert_eq!(sent[0].payload(), &[0x01, 0x04, 0x03, 0x02]);

        let logo = classic(&device, LedId::Logo);
        assert_eq!(logo.effect, ClassicEffect::Wave);
        assert_eq!(Led::Classic(logo).effect_name(), "wave");
    }

    #[test]
    fn failing_led_fails_initialization() {
        let fake = FakeTransport::new();
        fake.fail_led(LedId::Backlight);
        let mut device = ClassicDevice::new(descriptor());
        device.set_transport_config(TransportConfig::immediate());
        device
            .open_handle(&FakeOpener::new(fake.clone()), "/dev/hidraw1")
            .unwrap();
        assert!(matches!(
            device.initialize(),
            Err(Error::InitializationFailed {
                led: LedId::Backlight
            })
        ));
        assert!(device.leds().is_empty());
    }
}
