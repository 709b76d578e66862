//! LED zones and their cached state.
//!
//! Entities are plain state holders. Only the owning device writes them, and
//! only after the firmware acknowledged the command that changed the state.

use serde::{Deserialize, Serialize};

/// Independently controllable lighting zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum LedId {
    /// Whole-device zone used by some extended commands.
    Zero = 0x00,
    ScrollWheel = 0x01,
    Battery = 0x03,
    Logo = 0x04,
    Backlight = 0x05,
    MacroRecording = 0x07,
    GameMode = 0x08,
    KeymapRed = 0x0C,
    KeymapGreen = 0x0D,
    KeymapBlue = 0x0E,
    RightSide = 0x10,
    LeftSide = 0x11,
}

impl LedId {
    /// Every zone a bring-up session probes, in probe order.
    pub const ALL: &'static [LedId] = &[
        LedId::ScrollWheel,
        LedId::Battery,
        LedId::Logo,
        LedId::Backlight,
        LedId::MacroRecording,
        LedId::GameMode,
        LedId::KeymapRed,
        LedId::KeymapGreen,
        LedId::KeymapBlue,
        LedId::RightSide,
        LedId::LeftSide,
    ];

    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Zero => "zero",
            Self::ScrollWheel => "scroll_wheel",
            Self::Battery => "battery",
            Self::Logo => "logo",
            Self::Backlight => "backlight",
            Self::MacroRecording => "macro_recording",
            Self::GameMode => "game_mode",
            Self::KeymapRed => "keymap_red",
            Self::KeymapGreen => "keymap_green",
            Self::KeymapBlue => "keymap_blue",
            Self::RightSide => "right_side",
            Self::LeftSide => "left_side",
        }
    }

    /// Parse a CLI-friendly zone name.
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.to_lowercase().replace('-', "_");
        std::iter::once(&LedId::Zero)
            .chain(Self::ALL)
            .copied()
            .find(|id| id.name() == lower)
    }
}

impl TryFrom<u8> for LedId {
    type Error = String;

    fn try_from(b: u8) -> std::result::Result<Self, Self::Error> {
        std::iter::once(&LedId::Zero)
            .chain(Self::ALL)
            .copied()
            .find(|id| id.as_byte() == b)
            .ok_or_else(|| format!("unknown LED id {b}"))
    }
}

impl From<LedId> for u8 {
    fn from(id: LedId) -> u8 {
        id.as_byte()
    }
}

impl std::fmt::Display for LedId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// RGB color value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub const BLACK: Self = Self::new(0x00, 0x00, 0x00);
    /// Probe color used during bring-up.
    pub const YELLOW: Self = Self::new(0xFF, 0xFF, 0x00);

    pub fn bytes(&self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }

    /// Parse `RRGGBB` or `#RRGGBB`.
    pub fn from_hex(s: &str) -> Option<Self> {
        let s = s.strip_prefix('#').unwrap_or(s);
        if s.len() != 6 || !s.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&s[i..i + 2], 16).ok();
        Some(Self::new(channel(0)?, channel(2)?, channel(4)?))
    }
}

impl std::fmt::Display for Rgb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

/// Direction of the wave effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WaveDirection {
    LeftToRight = 0x01,
    RightToLeft = 0x02,
}

/// Effects of the matrix protocol class, with their standard effect ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MatrixEffect {
    Off = 0x00,
    Wave = 0x01,
    Breathing = 0x03,
    Spectrum = 0x04,
    Custom = 0x05,
    Static = 0x06,
}

impl MatrixEffect {
    /// Effect id in the extended command format.
    pub fn extended_id(self) -> u8 {
        match self {
            Self::Off => 0x00,
            Self::Static => 0x01,
            Self::Breathing => 0x02,
            Self::Spectrum => 0x03,
            Self::Wave => 0x04,
            Self::Custom => 0x08,
        }
    }
}

/// Per-LED effect register values of the classic protocol class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ClassicEffect {
    Static = 0x00,
    Blinking = 0x01,
    Breathing = 0x02,
    Wave = 0x03,
    Spectrum = 0x04,
}

impl ClassicEffect {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x00 => Some(Self::Static),
            0x01 => Some(Self::Blinking),
            0x02 => Some(Self::Breathing),
            0x03 => Some(Self::Wave),
            0x04 => Some(Self::Spectrum),
            _ => None,
        }
    }
}

/// Cached state of a matrix-class LED.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatrixLed {
    pub id: LedId,
    pub effect: MatrixEffect,
    pub color: Option<Rgb>,
    pub color2: Option<Rgb>,
    pub brightness: u8,
}

impl MatrixLed {
    pub(crate) fn new(id: LedId, brightness: u8) -> Self {
        Self {
            id,
            effect: MatrixEffect::Spectrum,
            color: None,
            color2: None,
            brightness,
        }
    }

    pub(crate) fn apply(&mut self, effect: MatrixEffect, color: Option<Rgb>, color2: Option<Rgb>) {
        self.effect = effect;
        self.color = color;
        self.color2 = color2;
    }
}

/// Cached state of a classic-class LED.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassicLed {
    pub id: LedId,
    /// On/off register, independent of the effect.
    pub on: bool,
    pub effect: ClassicEffect,
    pub color: Rgb,
    pub brightness: u8,
}

/// Snapshot of any LED, tagged by protocol class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Led {
    Matrix(MatrixLed),
    Classic(ClassicLed),
}

impl Led {
    pub fn id(&self) -> LedId {
        match self {
            Self::Matrix(led) => led.id,
            Self::Classic(led) => led.id,
        }
    }

    pub fn brightness(&self) -> u8 {
        match self {
            Self::Matrix(led) => led.brightness,
            Self::Classic(led) => led.brightness,
        }
    }

    /// Primary color, if the current effect has one.
    pub fn color(&self) -> Option<Rgb> {
        match self {
            Self::Matrix(led) => led.color,
            Self::Classic(led) => Some(led.color),
        }
    }

    /// Human-readable effect name.
    pub fn effect_name(&self) -> &'static str {
        match self {
            Self::Matrix(led) => match led.effect {
                MatrixEffect::Off => "off",
                MatrixEffect::Wave => "wave",
                MatrixEffect::Breathing => "breathing",
                MatrixEffect::Spectrum => "spectrum",
                MatrixEffect::Custom => "custom",
                MatrixEffect::Static => "static",
            },
            Self::Classic(led) if !led.on => "off",
            Self::Classic(led) => match led.effect {
                ClassicEffect::Static => "static",
                ClassicEffect::Blinking => "blinking",
                ClassicEffect::Breathing => "breathing",
                ClassicEffect::Wave => "wave",
                ClassicEffect::Spectrum => "spectrum",
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn led_id_byte_roundtrip() {
        for id in LedId::ALL {
            assert_eq!(LedId::try_from(id.as_byte()), Ok(*id));
        }
        assert!(LedId::try_from(0x02).is_err());
        assert!(LedId::try_from(0xFF).is_err());
    }

    #[test]
    fn eleven_probeable_zones() {
        assert_eq!(LedId::ALL.len(), 11);
        assert!(!LedId::ALL.contains(&LedId::Zero));
    }

    #[test]
    fn led_id_from_name() {
        assert_eq!(LedId::from_name("logo"), Some(LedId::Logo));
        assert_eq!(LedId::from_name("Scroll-Wheel"), Some(LedId::ScrollWheel));
        assert_eq!(LedId::from_name("zero"), Some(LedId::Zero));
        assert_eq!(LedId::from_name("underglow"), None);
    }

    #[test]
    fn led_id_serializes_as_integer() {
        let json = serde_json::to_string(&vec![LedId::Logo, LedId::Backlight]).unwrap();
        assert_eq!(json, "[4,5]");
        let back: Vec<LedId> = serde_json::from_str("[1,17]").unwrap();
        assert_eq!(back, vec![LedId::ScrollWheel, LedId::LeftSide]);
        assert!(serde_json::from_str::<Vec<LedId>>("[2]").is_err());
    }

    #[test]
    fn rgb_from_hex() {
        assert_eq!(Rgb::from_hex("#FF8000"), Some(Rgb::new(0xFF, 0x80, 0x00)));
        assert_eq!(Rgb::from_hex("00ff00"), Some(Rgb::new(0, 0xFF, 0)));
        assert_eq!(Rgb::from_hex("#FFF"), None);
        assert_eq!(Rgb::from_hex("zzzzzz"), None);
        assert_eq!(Rgb::YELLOW.to_string(), "#FFFF00");
    }

    #[test]
    fn classic_off_overrides_effect_name() {
        let led = ClassicLed {
            id: LedId::Logo,
            on: false,
            effect: ClassicEffect::Breathing,
            color: Rgb::BLACK,
            brightness: 10,
        };
        assert_eq!(Led::Classic(led).effect_name(), "off");
        assert_eq!(
            Led::Classic(ClassicLed { on: true, ..led }).effect_name(),
            "breathing"
        );
    }
}
