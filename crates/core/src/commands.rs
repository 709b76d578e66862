//! Command conformance tables.
//!
//! Which class/id pair implements an operation, and where a get-response
//! carries its value, depends on the protocol class and the quirk set. The
//! table is resolved once when a device is constructed and can be replaced
//! per instance for firmware that deviates from the stock layout.

use crate::error::{Error, Result};
use crate::led::{LedId, MatrixEffect, Rgb, WaveDirection};
use crate::quirks::{Quirk, QuirkSet};
use crate::report::{Report, VarStore, ARGS_LEN};

/// A command class/id pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub class: u8,
    pub id: u8,
}

impl Command {
    pub const fn new(class: u8, id: u8) -> Self {
        Self { class, id }
    }

    pub fn report(&self, payload: &[u8]) -> Result<Report> {
        Report::build(self.class, self.id, payload)
    }
}

/// A get command plus the argument offset of its value in the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Query {
    pub command: Command,
    pub value_offset: usize,
}

impl Query {
    pub const fn new(class: u8, id: u8, value_offset: usize) -> Self {
        Self {
            command: Command::new(class, id),
            value_offset,
        }
    }

    /// Read `len` value bytes from a response.
    pub fn value<'a>(&self, response: &'a Report, len: usize) -> Result<&'a [u8]> {
        let end = self.value_offset + len;
        if end > ARGS_LEN {
            return Err(Error::Protocol(format!(
                "value offset {}..{end} outside argument block",
                self.value_offset
            )));
        }
        Ok(&response.args[self.value_offset..end])
    }
}

/// How effect commands are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectFormat {
    /// One global command: `[effect, params...]`.
    Standard(Command),
    /// Per-LED command: `[varstore, led, effect, params...]`.
    Extended(Command),
}

/// How a custom frame row is uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    /// `[0xFF, row, start, end, rgb...]`
    Standard(Command),
    /// `[0x00, 0x00, row, start, end, rgb...]`
    Extended(Command),
}

/// Matrix effect request with its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectRequest {
    None,
    Static(Rgb),
    Breathing(Rgb),
    BreathingDual(Rgb, Rgb),
    BreathingRandom,
    Spectrum,
    Wave(WaveDirection),
    Custom,
}

impl EffectRequest {
    pub fn effect(&self) -> MatrixEffect {
        match self {
            Self::None => MatrixEffect::Off,
            Self::Static(_) => MatrixEffect::Static,
            Self::Breathing(_) | Self::BreathingDual(..) | Self::BreathingRandom => {
                MatrixEffect::Breathing
            }
            Self::Spectrum => MatrixEffect::Spectrum,
            Self::Wave(_) => MatrixEffect::Wave,
            Self::Custom => MatrixEffect::Custom,
        }
    }

    /// Colors the LED entity caches after this effect is acknowledged.
    pub fn colors(&self) -> (Option<Rgb>, Option<Rgb>) {
        match *self {
            Self::Static(c) | Self::Breathing(c) => (Some(c), None),
            Self::BreathingDual(c, c2) => (Some(c), Some(c2)),
            _ => (None, None),
        }
    }

    /// Effect-specific argument bytes following the effect id, standard layout.
    fn standard_params(&self) -> Vec<u8> {
        match *self {
            Self::None | Self::Spectrum => vec![],
            Self::Static(c) => c.bytes().to_vec(),
            Self::Breathing(c) => with_colors(&[0x01], &[c]),
            Self::BreathingDual(c, c2) => with_colors(&[0x02], &[c, c2]),
            Self::BreathingRandom => vec![0x03],
            Self::Wave(dir) => vec![dir as u8],
            Self::Custom => vec![VarStore::NoStore as u8],
        }
    }

    /// Effect-specific argument bytes following the effect id, extended layout.
    fn extended_params(&self) -> Vec<u8> {
        match *self {
            Self::None | Self::Spectrum | Self::BreathingRandom | Self::Custom => {
                vec![0x00, 0x00, 0x00]
            }
            Self::Static(c) => with_colors(&[0x00, 0x00, 0x01], &[c]),
            Self::Breathing(c) => with_colors(&[0x01, 0x00, 0x01], &[c]),
            Self::BreathingDual(c, c2) => with_colors(&[0x02, 0x00, 0x02], &[c, c2]),
            Self::Wave(dir) => vec![dir as u8, 0x28, 0x00],
        }
    }
}

fn with_colors(prefix: &[u8], colors: &[Rgb]) -> Vec<u8> {
    let mut out = prefix.to_vec();
    out.extend(colors.iter().flat_map(Rgb::bytes));
    out
}

/// Per-LED state registers of the classic protocol class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassicRegisters {
    pub set_state: Command,
    pub get_state: Query,
    pub set_effect: Command,
    pub get_effect: Query,
    pub set_rgb: Command,
    pub get_rgb: Query,
}

/// Command table of one device instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTable {
    pub effect: EffectFormat,
    pub custom_frame: FrameFormat,
    pub set_brightness: Command,
    pub get_brightness: Query,
    pub classic: ClassicRegisters,
    pub get_serial: Query,
    pub get_firmware: Query,
    pub set_dpi: Command,
    pub get_dpi: Query,
    pub set_poll_rate: Command,
    pub get_poll_rate: Query,
    pub get_keyboard_layout: Query,
}

const STANDARD_BRIGHTNESS: (Command, Query) = (Command::new(0x03, 0x03), Query::new(0x03, 0x83, 2));
const EXTENDED_BRIGHTNESS: (Command, Query) = (Command::new(0x0F, 0x04), Query::new(0x0F, 0x84, 2));

impl CommandTable {
    /// Stock table for a matrix-class device with the given quirks.
    pub fn matrix(quirks: &QuirkSet) -> Self {
        let mut table = Self::base();
        if quirks.contains(Quirk::MouseMatrix) {
            table.effect = EffectFormat::Extended(Command::new(0x0D, 0x02));
            table.custom_frame = FrameFormat::Extended(Command::new(0x0F, 0x03));
        }
        if quirks.contains(Quirk::MatrixBrightness) {
            (table.set_brightness, table.get_brightness) = EXTENDED_BRIGHTNESS;
        }
        table
    }

    /// Stock table for a classic-class device. Classic firmware has no quirks.
    pub fn classic() -> Self {
        Self::base()
    }

    fn base() -> Self {
        Self {
            effect: EffectFormat::Standard(Command::new(0x03, 0x0A)),
            custom_frame: FrameFormat::Standard(Command::new(0x03, 0x0B)),
            set_brightness: STANDARD_BRIGHTNESS.0,
            get_brightness: STANDARD_BRIGHTNESS.1,
            classic: ClassicRegisters {
                set_state: Command::new(0x03, 0x00),
                get_state: Query::new(0x03, 0x80, 2),
                set_effect: Command::new(0x03, 0x02),
                get_effect: Query::new(0x03, 0x82, 2),
                set_rgb: Command::new(0x03, 0x01),
                get_rgb: Query::new(0x03, 0x81, 2),
            },
            get_serial: Query::new(0x00, 0x82, 0),
            get_firmware: Query::new(0x00, 0x81, 0),
            set_dpi: Command::new(0x04, 0x05),
            get_dpi: Query::new(0x04, 0x85, 1),
            set_poll_rate: Command::new(0x00, 0x05),
            get_poll_rate: Query::new(0x00, 0x85, 0),
            get_keyboard_layout: Query::new(0x00, 0x86, 0),
        }
    }

    /// Encode a matrix effect for `led`.
    pub fn effect_report(&self, led: LedId, request: &EffectRequest) -> Result<Report> {
        match self.effect {
            EffectFormat::Standard(cmd) => {
                let mut payload = vec![request.effect() as u8];
                payload.extend(request.standard_params());
                cmd.report(&payload)
            }
            EffectFormat::Extended(cmd) => {
                let mut payload = vec![
                    VarStore::Store as u8,
                    led.as_byte(),
                    request.effect().extended_id(),
                ];
                payload.extend(request.extended_params());
                cmd.report(&payload)
            }
        }
    }

    /// Encode one custom frame row.
    pub fn frame_row_report(&self, row: u8, start: u8, end: u8, colors: &[Rgb]) -> Result<Report> {
        let (cmd, mut payload) = match self.custom_frame {
            FrameFormat::Standard(cmd) => (cmd, vec![0xFF, row, start, end]),
            FrameFormat::Extended(cmd) => (cmd, vec![0x00, 0x00, row, start, end]),
        };
        payload.extend(colors.iter().flat_map(Rgb::bytes));
        cmd.report(&payload)
    }

    pub fn set_brightness_report(&self, led: LedId, brightness: u8) -> Result<Report> {
        self.set_brightness
            .report(&[VarStore::Store as u8, led.as_byte(), brightness])
    }

    pub fn get_brightness_report(&self, led: LedId) -> Result<Report> {
        self.get_brightness
            .command
            .report(&[VarStore::Store as u8, led.as_byte(), 0x00])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgb = Rgb::new(0xFF, 0x00, 0x00);
    const BLUE: Rgb = Rgb::new(0x00, 0x00, 0xFF);

    fn standard() -> CommandTable {
        CommandTable::matrix(&QuirkSet::empty())
    }

    #[test]
    fn breathing_dual_standard_payload() {
        let report = standard()
            .effect_report(LedId::Backlight, &EffectRequest::BreathingDual(RED, BLUE))
            .unwrap();
        assert_eq!((report.command_class, report.command_id), (0x03, 0x0A));
        assert_eq!(report.args[0], MatrixEffect::Breathing as u8);
        assert_eq!(
            &report.args[1..8],
            &[0x02, 0xFF, 0x00, 0x00, 0x00, 0x00, 0xFF]
        );
    }

    #[test]
    fn breathing_random_has_no_color_bytes() {
        let report = standard()
            .effect_report(LedId::Backlight, &EffectRequest::BreathingRandom)
            .unwrap();
        assert_eq!(report.payload(), &[0x03, 0x03]);
        assert!(report.args[2..].iter().all(|&b| b == 0));
    }

    #[test]
    fn breathing_single_standard_payload() {
        let report = standard()
            .effect_report(LedId::Logo, &EffectRequest::Breathing(RED))
            .unwrap();
        assert_eq!(report.payload(), &[0x03, 0x01, 0xFF, 0x00, 0x00]);
    }

    #[test]
    fn static_and_wave_standard_payloads() {
        let table = standard();
        let r = table
            .effect_report(LedId::Logo, &EffectRequest::Static(BLUE))
            .unwrap();
        assert_eq!(r.payload(), &[0x06, 0x00, 0x00, 0xFF]);
        let r = table
            .effect_report(LedId::Logo, &EffectRequest::Wave(WaveDirection::RightToLeft))
            .unwrap();
        assert_eq!(r.payload(), &[0x01, 0x02]);
    }

    #[test]
    fn mouse_matrix_uses_extended_per_led_command() {
        let table = CommandTable::matrix(&QuirkSet::from([Quirk::MouseMatrix]));
        let r = table
            .effect_report(LedId::ScrollWheel, &EffectRequest::Static(RED))
            .unwrap();
        assert_eq!((r.command_class, r.command_id), (0x0D, 0x02));
        assert_eq!(
            r.payload(),
            &[0x01, 0x01, 0x01, 0x00, 0x00, 0x01, 0xFF, 0x00, 0x00]
        );
        // brightness untouched by this quirk
        assert_eq!(table.set_brightness, Command::new(0x03, 0x03));
    }

    #[test]
    fn matrix_brightness_quirk_switches_pair() {
        let table = CommandTable::matrix(&QuirkSet::from([Quirk::MatrixBrightness]));
        assert_eq!(table.set_brightness, Command::new(0x0F, 0x04));
        assert_eq!(table.get_brightness.command, Command::new(0x0F, 0x84));
        let r = table.set_brightness_report(LedId::Logo, 0x80).unwrap();
        assert_eq!(r.payload(), &[0x01, 0x04, 0x80]);
        assert!(matches!(table.effect, EffectFormat::Standard(_)));
    }

    #[test]
    fn frame_row_standard_layout() {
        let r = standard()
            .frame_row_report(2, 0, 1, &[RED, BLUE])
            .unwrap();
        assert_eq!((r.command_class, r.command_id), (0x03, 0x0B));
        assert_eq!(
            r.payload(),
            &[0xFF, 0x02, 0x00, 0x01, 0xFF, 0x00, 0x00, 0x00, 0x00, 0xFF]
        );
    }

    #[test]
    fn query_value_bounds_checked() {
        let q = Query::new(0x03, 0x83, 79);
        let r = Report::build(0x03, 0x83, &[]).unwrap();
        assert!(q.value(&r, 1).is_ok());
        assert!(q.value(&r, 2).is_err());
    }
}
