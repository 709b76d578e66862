//! Device descriptors and the JSON descriptor database.
//!
//! Each database file holds a JSON array of records:
//!
//! ```json
//! {
//!   "name": "Razer DeathAdder Chroma",
//!   "vid": "1532", "pid": "0043",
//!   "type": "mouse", "pclass": "matrix",
//!   "leds": [1, 4],
//!   "fx": ["off", "static", "breathing", "spectrum"],
//!   "features": ["dpi", "poll_rate"],
//!   "quirks": [],
//!   "matrix_dimensions": [0, 0],
//!   "max_dpi": 10000
//! }
//! ```

use crate::error::{Error, Result};
use crate::led::LedId;
use crate::quirks::QuirkSet;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

/// Product category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Accessory,
    Headset,
    Keyboard,
    Keypad,
    Mouse,
    Mousemat,
}

impl DeviceType {
    pub const ALL: &'static [DeviceType] = &[
        DeviceType::Accessory,
        DeviceType::Headset,
        DeviceType::Keyboard,
        DeviceType::Keypad,
        DeviceType::Mouse,
        DeviceType::Mousemat,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Accessory => "accessory",
            Self::Headset => "headset",
            Self::Keyboard => "keyboard",
            Self::Keypad => "keypad",
            Self::Mouse => "mouse",
            Self::Mousemat => "mousemat",
        }
    }

    /// Exact, case-sensitive match against [`DeviceType::name`].
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.name() == name)
    }
}

/// Protocol class selecting the device variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolClass {
    Classic,
    Matrix,
}

/// Effect names advertised to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fx {
    Off,
    Static,
    Breathing,
    BreathingDual,
    BreathingRandom,
    Blinking,
    Spectrum,
    Wave,
    CustomFrame,
    Brightness,
}

impl Fx {
    /// Effects a matrix-class device can express.
    pub const MATRIX: &'static [Fx] = &[
        Fx::Off,
        Fx::Static,
        Fx::Breathing,
        Fx::BreathingDual,
        Fx::BreathingRandom,
        Fx::Spectrum,
        Fx::Wave,
        Fx::CustomFrame,
        Fx::Brightness,
    ];
}

/// Non-lighting capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Dpi,
    PollRate,
    KeyboardLayout,
}

impl Feature {
    pub const ALL: &'static [Feature] = &[Feature::Dpi, Feature::PollRate, Feature::KeyboardLayout];

    /// Whether only mouse-type devices carry this feature.
    pub fn is_mouse_only(&self) -> bool {
        matches!(self, Self::Dpi | Self::PollRate)
    }
}

/// Custom-frame matrix size, serialized as `[x, y]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[u8; 2]", into = "[u8; 2]")]
pub struct MatrixDimensions {
    /// Rows.
    pub x: u8,
    /// Columns.
    pub y: u8,
}

impl From<[u8; 2]> for MatrixDimensions {
    fn from([x, y]: [u8; 2]) -> Self {
        Self { x, y }
    }
}

impl From<MatrixDimensions> for [u8; 2] {
    fn from(d: MatrixDimensions) -> Self {
        [d.x, d.y]
    }
}

/// One supported product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub name: String,
    #[serde(with = "hex_id")]
    pub vid: u16,
    #[serde(with = "hex_id")]
    pub pid: u16,
    #[serde(rename = "type")]
    pub device_type: DeviceType,
    pub pclass: ProtocolClass,
    pub leds: Vec<LedId>,
    pub fx: Vec<Fx>,
    pub features: Vec<Feature>,
    pub quirks: QuirkSet,
    pub matrix_dimensions: MatrixDimensions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_dpi: Option<u16>,
}

impl DeviceDescriptor {
    /// Check the cross-field rules the schema cannot express.
    pub fn validate(&self) -> Result<()> {
        let mouse = self.device_type == DeviceType::Mouse;
        match self.max_dpi {
            Some(0) => return Err(self.invalid("max_dpi must be positive")),
            Some(_) if !mouse => return Err(self.invalid("max_dpi is only valid for mice")),
            None if mouse => return Err(self.invalid("mouse descriptor without max_dpi")),
            _ => {}
        }
        if !mouse && self.features.iter().any(Feature::is_mouse_only) {
            return Err(self.invalid("dpi/poll_rate features on a non-mouse device"));
        }
        if self.leds.is_empty() {
            return Err(self.invalid("no LEDs"));
        }
        Ok(())
    }

    fn invalid(&self, what: &str) -> Error {
        Error::Descriptor(format!("{}: {what}", self.name))
    }

    pub fn has_feature(&self, feature: Feature) -> bool {
        self.features.contains(&feature)
    }

    pub fn matches(&self, vid: u16, pid: u16) -> bool {
        self.vid == vid && self.pid == pid
    }

    /// Indented JSON record, as appended to the database.
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Descriptor(e.to_string()))
    }
}

/// Parse one database file's contents.
pub fn parse_database(json: &str) -> Result<Vec<DeviceDescriptor>> {
    let descriptors: Vec<DeviceDescriptor> =
        serde_json::from_str(json).map_err(|e| Error::Descriptor(e.to_string()))?;
    for d in &descriptors {
        d.validate()?;
    }
    Ok(descriptors)
}

/// Load every `*.json` file in `dir`, in file-name order.
///
/// Unreadable or invalid files are skipped with a warning.
pub fn load_database(dir: &Path) -> Result<Vec<DeviceDescriptor>> {
    let mut paths: Vec<_> = std::fs::read_dir(dir)
        .map_err(|e| Error::Descriptor(format!("{}: {e}", dir.display())))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut all = Vec::new();
    for path in paths {
        let parsed = std::fs::read_to_string(&path)
            .map_err(Error::from)
            .and_then(|s| parse_database(&s));
        match parsed {
            Ok(mut descriptors) => {
                debug!(path = %path.display(), count = descriptors.len(), "loaded descriptors");
                all.append(&mut descriptors);
            }
            Err(e) => warn!(path = %path.display(), error = %e, "skipping descriptor file"),
        }
    }
    Ok(all)
}

/// Serialize a USB id as a 4-digit lowercase hex string.
mod hex_id {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(id: &u16, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format!("{id:04x}"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u16, D::Error> {
        let s = String::deserialize(d)?;
        if s.len() != 4 {
            return Err(de::Error::custom(format!("expected 4 hex digits, got {s:?}")));
        }
        u16::from_str_radix(&s, 16).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quirks::Quirk;

    const MOUSE: &str = r#"[{
        "name": "Razer DeathAdder Chroma",
        "vid": "1532", "pid": "0043",
        "type": "mouse", "pclass": "matrix",
        "leds": [1, 4],
        "fx": ["off", "static", "spectrum"],
        "features": ["dpi", "poll_rate"],
        "quirks": ["mouse_matrix"],
        "matrix_dimensions": [0, 0],
        "max_dpi": 10000
    }]"#;

    #[test]
    fn parse_mouse_record() {
        let d = &parse_database(MOUSE).unwrap()[0];
        assert_eq!(d.vid, 0x1532);
        assert_eq!(d.pid, 0x0043);
        assert_eq!(d.device_type, DeviceType::Mouse);
        assert_eq!(d.pclass, ProtocolClass::Matrix);
        assert_eq!(d.leds, vec![LedId::ScrollWheel, LedId::Logo]);
        assert!(d.quirks.contains(Quirk::MouseMatrix));
        assert_eq!(d.max_dpi, Some(10000));
        assert!(d.has_feature(Feature::PollRate));
        assert!(d.matches(0x1532, 0x0043));
    }

    #[test]
    fn serialized_record_keeps_schema() {
        let d = parse_database(MOUSE).unwrap().remove(0);
        let value: serde_json::Value = serde_json::from_str(&d.to_json_pretty().unwrap()).unwrap();
        assert_eq!(value["vid"], "1532");
        assert_eq!(value["pid"], "0043");
        assert_eq!(value["type"], "mouse");
        assert_eq!(value["matrix_dimensions"], serde_json::json!([0, 0]));
        assert_eq!(value["leds"], serde_json::json!([1, 4]));
    }

    #[test]
    fn keyboard_omits_max_dpi() {
        let mut d = parse_database(MOUSE).unwrap().remove(0);
        d.device_type = DeviceType::Keyboard;
        d.max_dpi = None;
        d.features = vec![Feature::KeyboardLayout];
        d.validate().unwrap();
        let value: serde_json::Value = serde_json::from_str(&d.to_json_pretty().unwrap()).unwrap();
        assert!(value.get("max_dpi").is_none());
    }

    #[test]
    fn validate_rejects_inconsistent_records() {
        let base = parse_database(MOUSE).unwrap().remove(0);

        let mut no_dpi = base.clone();
        no_dpi.max_dpi = None;
        assert!(no_dpi.validate().is_err());

        let mut keyboard_with_dpi = base.clone();
        keyboard_with_dpi.device_type = DeviceType::Keyboard;
        assert!(keyboard_with_dpi.validate().is_err());

        let mut no_leds = base;
        no_leds.leds.clear();
        assert!(no_leds.validate().is_err());
    }

    #[test]
    fn rejects_malformed_ids() {
        let bad = MOUSE.replace(r#""pid": "0043""#, r#""pid": "43""#);
        assert!(matches!(parse_database(&bad), Err(Error::Descriptor(_))));
        let bad = MOUSE.replace(r#""vid": "1532""#, r#""vid": "zz32""#);
        assert!(parse_database(&bad).is_err());
    }

    #[test]
    fn shipped_database_is_valid() {
        let all = parse_database(include_str!("../../../data/devices/razer.json")).unwrap();
        assert!(all.iter().any(|d| d.pclass == ProtocolClass::Classic));
        assert!(all.iter().all(|d| d.vid == crate::RAZER_VID));
    }

    #[test]
    fn load_database_skips_invalid_files() {
        let dir = std::env::temp_dir().join(format!("open-chroma-db-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("a.json"), MOUSE).unwrap();
        std::fs::write(dir.join("b.json"), "{ not json").unwrap();
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let all = load_database(&dir).unwrap();
        std::fs::remove_dir_all(&dir).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "Razer DeathAdder Chroma");
    }

    #[test]
    fn device_type_names() {
        for t in DeviceType::ALL {
            assert_eq!(DeviceType::from_name(t.name()), Some(*t));
        }
        assert_eq!(DeviceType::from_name("Mouse"), None);
        assert_eq!(DeviceType::from_name("toaster"), None);
    }
}
