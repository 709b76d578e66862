//! open-chroma CLI: Razer lighting configuration and device bring-up.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use open_chroma_core::bringup::{BringupTarget, Outcome, Prober, TerminalOracle, PERMISSION_HINT};
use open_chroma_core::descriptor::{load_database, DeviceDescriptor, Feature};
use open_chroma_core::device::{
    AnyDevice, ClassicEffects, Dpi, LayoutQuery, LightingDevice, MatrixEffects,
};
use open_chroma_core::error::Error;
use open_chroma_core::led::{LedId, Rgb, WaveDirection};
use open_chroma_core::safety;
use open_chroma_core::transport::{HidDeviceInfo, HidapiOpener};
use open_chroma_core::RAZER_VID;
use std::path::PathBuf;
use tracing::{info, warn};

const DEFAULT_DATA_DIR: &str = "/usr/share/open-chroma/devices";
const DEVEL_DATA_DIR: &str = "../data/devices";

#[derive(Parser)]
#[command(
    name = "open-chroma",
    version,
    about = "Open-source Razer lighting configuration"
)]
struct Cli {
    /// Enable debug logging (RUST_LOG still takes precedence).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Directory holding the device descriptor database.
    #[arg(long, global = true, default_value = DEFAULT_DATA_DIR)]
    data_dir: PathBuf,

    /// Read descriptors from the source tree instead of the installed data.
    #[arg(long, global = true)]
    devel: bool,

    /// Create one simulated device per descriptor instead of opening hardware.
    #[arg(long, global = true)]
    fake_devices: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct Target {
    /// Product ID of the device (hex); defaults to the first device.
    #[arg(long, value_parser = parse_pid)]
    pid: Option<u16>,
}

#[derive(clap::Args)]
struct LedTarget {
    #[command(flatten)]
    device: Target,

    /// LED zone, e.g. logo, backlight, scroll_wheel.
    #[arg(long, value_parser = parse_led)]
    led: LedId,
}

#[derive(Subcommand)]
enum Commands {
    /// List initialized Razer devices.
    ListDevices,
    /// Show device details and cached LED state.
    Info {
        #[command(flatten)]
        target: Target,
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Apply a lighting effect to one LED.
    Effect {
        #[command(flatten)]
        target: LedTarget,
        #[command(subcommand)]
        effect: EffectCommand,
    },
    /// Get or set LED brightness (0-255).
    Brightness {
        #[command(flatten)]
        target: LedTarget,
        value: Option<u8>,
    },
    /// Get or set mouse DPI.
    Dpi {
        #[command(flatten)]
        target: Target,
        /// DPI for both axes, or X DPI when --y is given.
        value: Option<u16>,
        /// Separate Y-axis DPI.
        #[arg(long, requires = "value")]
        y: Option<u16>,
    },
    /// Get or set mouse polling rate (125, 500, or 1000 Hz).
    PollRate {
        #[command(flatten)]
        target: Target,
        value: Option<u16>,
    },
    /// Show the physical keyboard layout.
    Layout {
        #[command(flatten)]
        target: Target,
    },
    /// Interactively discover quirks and LEDs of unsupported devices.
    Bringup,
    /// Set every LED of every device to yellow at full brightness.
    Demo,
}

#[derive(Subcommand)]
enum EffectCommand {
    /// Turn the LED off.
    None,
    Static {
        #[arg(value_parser = parse_rgb)]
        color: Rgb,
    },
    Breathing {
        #[arg(value_parser = parse_rgb)]
        color: Rgb,
    },
    BreathingDual {
        #[arg(value_parser = parse_rgb)]
        color: Rgb,
        #[arg(value_parser = parse_rgb)]
        color2: Rgb,
    },
    BreathingRandom,
    /// Classic devices only.
    Blinking {
        #[arg(value_parser = parse_rgb)]
        color: Rgb,
    },
    Spectrum,
    Wave {
        #[arg(value_enum, default_value_t = Direction::Right)]
        direction: Direction,
    },
    /// Fill the custom frame with one color and show it (matrix devices only).
    CustomFrame {
        #[arg(value_parser = parse_rgb)]
        color: Rgb,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Direction {
    Left,
    Right,
}

impl From<Direction> for WaveDirection {
    fn from(d: Direction) -> Self {
        match d {
            Direction::Left => WaveDirection::RightToLeft,
            Direction::Right => WaveDirection::LeftToRight,
        }
    }
}

fn parse_rgb(s: &str) -> std::result::Result<Rgb, String> {
    Rgb::from_hex(s).ok_or_else(|| format!("'{s}' is not a color; expected RRGGBB"))
}

fn parse_led(s: &str) -> std::result::Result<LedId, String> {
    LedId::from_name(s).ok_or_else(|| {
        let names: Vec<_> = LedId::ALL.iter().map(LedId::name).collect();
        format!("unknown LED '{s}'; valid LEDs: {}", names.join(", "))
    })
}

fn parse_pid(s: &str) -> std::result::Result<u16, String> {
    let digits = s.trim_start_matches("0x");
    u16::from_str_radix(digits, 16).map_err(|e| format!("'{s}': {e}"))
}

/// Descriptors plus the devices initialized from them.
struct Session {
    descriptors: Vec<DeviceDescriptor>,
    devices: Vec<AnyDevice>,
}

impl Session {
    fn data_dir(cli: &Cli) -> PathBuf {
        if cli.devel {
            PathBuf::from(DEVEL_DATA_DIR)
        } else {
            cli.data_dir.clone()
        }
    }

    fn load_descriptors(cli: &Cli) -> Result<Vec<DeviceDescriptor>> {
        let dir = Self::data_dir(cli);
        let descriptors = load_database(&dir)
            .with_context(|| format!("loading descriptors from {}", dir.display()))?;
        info!(count = descriptors.len(), dir = %dir.display(), "descriptor database loaded");
        Ok(descriptors)
    }

    fn open(cli: &Cli) -> Result<Self> {
        let descriptors = Self::load_descriptors(cli)?;
        let mut devices = Vec::new();

        if cli.fake_devices {
            for d in &descriptors {
                match AnyDevice::fake(d.clone()) {
                    Ok(device) => devices.push(device),
                    Err(e) => warn!(name = %d.name, error = %e, "fake device failed to initialize"),
                }
            }
            return Ok(Self {
                descriptors,
                devices,
            });
        }

        let opener = HidapiOpener::new()?;
        for info in control_interfaces(&opener) {
            let Some(descriptor) = descriptors.iter().find(|d| d.matches(info.vid, info.pid))
            else {
                info!(pid = format_args!("{:04x}", info.pid), "no descriptor for device, skipping");
                continue;
            };
            match AnyDevice::open(descriptor.clone(), &opener, &info.path) {
                Ok(device) => devices.push(device),
                Err(Error::DeviceUnavailable(msg)) => {
                    warn!(path = %info.path, "{msg}; {PERMISSION_HINT}");
                }
                Err(e) => warn!(name = %descriptor.name, error = %e, "device failed to initialize"),
            }
        }
        Ok(Self {
            descriptors,
            devices,
        })
    }

    fn select(&mut self, target: &Target) -> Result<&mut AnyDevice> {
        let found = match target.pid {
            Some(pid) => self
                .devices
                .iter_mut()
                .find(|d| d.lighting().descriptor().pid == pid),
            None => self.devices.first_mut(),
        };
        found.ok_or_else(|| anyhow!("no matching Razer device is initialized"))
    }
}

/// Interface 0 of every Razer HID device, which carries the control reports.
fn control_interfaces(opener: &HidapiOpener) -> Vec<HidDeviceInfo> {
    opener
        .enumerate(RAZER_VID)
        .into_iter()
        .filter(|info| info.interface_number == 0)
        .collect()
}

fn apply_effect(device: &mut AnyDevice, led: LedId, effect: &EffectCommand) -> Result<()> {
    match *effect {
        EffectCommand::None => device.lighting_mut().set_none(led)?,
        EffectCommand::Static { color } => device.lighting_mut().set_static(led, color)?,
        EffectCommand::Spectrum => device.lighting_mut().set_spectrum(led)?,
        EffectCommand::Wave { direction } => {
            device.lighting_mut().set_wave(led, direction.into())?
        }
        EffectCommand::Breathing { color } => match device {
            AnyDevice::Classic(d) => d.set_breathing(led, color)?,
            other => matrix(other)?.set_breathing(led, color)?,
        },
        EffectCommand::BreathingDual { color, color2 } => match device {
            AnyDevice::Classic(d) => d.set_breathing_dual(led, color, color2)?,
            other => matrix(other)?.set_breathing_dual(led, color, color2)?,
        },
        EffectCommand::BreathingRandom => match device {
            AnyDevice::Classic(d) => d.set_breathing_random(led)?,
            other => matrix(other)?.set_breathing_random(led)?,
        },
        EffectCommand::Blinking { color } => device
            .classic_mut()
            .ok_or_else(|| anyhow!("blinking is only available on classic devices"))?
            .set_blinking(led, color)?,
        EffectCommand::CustomFrame { color } => {
            let dims = device.lighting().descriptor().matrix_dimensions;
            let fx = matrix(device)?;
            let columns = usize::from(dims.y).min(safety::MAX_FRAME_COLUMNS);
            if columns == 0 {
                bail!("device has no custom frame matrix");
            }
            let row = vec![color; columns];
            for r in 0..dims.x {
                fx.define_custom_frame(r, 0, (columns - 1) as u8, &row)?;
            }
            fx.set_custom_frame(led)?;
        }
    }
    Ok(())
}

/// Refuse commands the descriptor does not declare.
fn require_feature(descriptor: &DeviceDescriptor, feature: Feature) -> Result<()> {
    if !descriptor.has_feature(feature) {
        bail!("{} does not support {feature:?}", descriptor.name);
    }
    Ok(())
}

fn matrix(device: &mut AnyDevice) -> Result<&mut dyn MatrixEffects> {
    device
        .matrix_mut()
        .ok_or_else(|| anyhow!("effect is only available on matrix devices"))
}

fn print_device(device: &dyn LightingDevice) {
    let d = device.descriptor();
    println!(
        "{} (VID: 0x{:04X}, PID: 0x{:04X}, type: {}, quirks: {})",
        d.name,
        d.vid,
        d.pid,
        d.device_type.name(),
        d.quirks
    );
}

fn info_json(device: &dyn LightingDevice) -> serde_json::Value {
    let d = device.descriptor();
    let leds: Vec<_> = device
        .leds()
        .iter()
        .map(|led| {
            serde_json::json!({
                "id": led.id().name(),
                "effect": led.effect_name(),
                "color": led.color().map(|c| c.to_string()),
                "brightness": led.brightness(),
            })
        })
        .collect();
    serde_json::json!({
        "name": d.name,
        "vid": format!("{:04x}", d.vid),
        "pid": format!("{:04x}", d.pid),
        "type": d.device_type,
        "serial": device.get_serial().ok(),
        "firmware": device.get_firmware_version().ok().map(|v| v.to_string()),
        "leds": leds,
    })
}

fn run_bringup(cli: &Cli) -> Result<()> {
    let descriptors = Session::load_descriptors(cli).unwrap_or_else(|e| {
        warn!(error = %e, "continuing without a descriptor database");
        Vec::new()
    });
    let opener = HidapiOpener::new()?;
    let mut oracle = TerminalOracle::stdio();

    let unsupported: Vec<_> = control_interfaces(&opener)
        .into_iter()
        .filter(|info| !descriptors.iter().any(|d| d.matches(info.vid, info.pid)))
        .collect();
    if unsupported.is_empty() {
        println!("No unsupported Razer devices found.");
        return Ok(());
    }

    for info in &unsupported {
        let target = BringupTarget::from(info);
        match Prober::new(&opener, &mut oracle).run(&target) {
            Ok(Outcome::Discovered(discovery)) => {
                println!("Add this record to a file in the descriptor database:");
                println!("{}", discovery.descriptor.to_json_pretty()?);
            }
            Ok(Outcome::Declined) => {}
            Err(Error::DeviceUnavailable(msg)) => {
                bail!("{msg}\nHint: {PERMISSION_HINT}");
            }
            Err(e) => eprintln!("Bring-up of {} failed: {e}", target.name),
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    match &cli.command {
        Commands::Bringup => run_bringup(&cli)?,
        Commands::ListDevices => {
            let session = Session::open(&cli)?;
            if session.devices.is_empty() {
                println!(
                    "No supported Razer devices found ({} descriptors loaded).",
                    session.descriptors.len()
                );
                println!("Ensure the device is connected and /dev/hidraw* is accessible.");
            }
            for device in &session.devices {
                print_device(device.lighting());
            }
        }
        Commands::Info { target, json } => {
            let mut session = Session::open(&cli)?;
            let device = session.select(target)?.lighting();
            if *json {
                println!("{}", serde_json::to_string_pretty(&info_json(device))?);
            } else {
                print_device(device);
                if let Ok(serial) = device.get_serial() {
                    println!("  Serial: {serial}");
                }
                if let Ok(version) = device.get_firmware_version() {
                    println!("  Firmware: {version}");
                }
                for led in device.leds() {
                    let color = led.color().map(|c| c.to_string()).unwrap_or_default();
                    println!(
                        "  {:<16} {:<10} {:<8} brightness {}",
                        led.id(),
                        led.effect_name(),
                        color,
                        led.brightness()
                    );
                }
            }
        }
        Commands::Effect { target, effect } => {
            let mut session = Session::open(&cli)?;
            let device = session.select(&target.device)?;
            apply_effect(device, target.led, effect)?;
            if let Some(led) = device.lighting().led(target.led) {
                println!("{}: {}", target.led, led.effect_name());
            }
        }
        Commands::Brightness { target, value } => {
            let mut session = Session::open(&cli)?;
            let device = session.select(&target.device)?.lighting_mut();
            if let Some(b) = *value {
                device.set_brightness(target.led, b)?;
            }
            println!(
                "{} brightness: {}",
                target.led,
                device.get_brightness(target.led)?
            );
        }
        Commands::Dpi { target, value, y } => {
            let mut session = Session::open(&cli)?;
            let device = session.select(target)?.lighting();
            require_feature(device.descriptor(), Feature::Dpi)?;
            let mouse = device
                .mouse()
                .ok_or_else(|| anyhow!("{} is not a mouse", device.descriptor().name))?;
            if let Some(x) = *value {
                mouse.set_dpi(Dpi {
                    x,
                    y: y.unwrap_or(x),
                })?;
            }
            println!("DPI: {} (max {})", mouse.get_dpi()?, mouse.max_dpi());
        }
        Commands::PollRate { target, value } => {
            let rate = value.map(safety::validate_polling_rate).transpose()?;
            let mut session = Session::open(&cli)?;
            let device = session.select(target)?.lighting();
            require_feature(device.descriptor(), Feature::PollRate)?;
            let mouse = device
                .mouse()
                .ok_or_else(|| anyhow!("{} is not a mouse", device.descriptor().name))?;
            if let Some(rate) = rate {
                mouse.set_poll_rate(rate)?;
            }
            println!("Polling rate: {}", mouse.get_poll_rate()?);
        }
        Commands::Layout { target } => {
            let mut session = Session::open(&cli)?;
            let device = session.select(target)?.lighting();
            require_feature(device.descriptor(), Feature::KeyboardLayout)?;
            match device.get_keyboard_layout()? {
                LayoutQuery::Recognized(layout) => println!("Keyboard layout: {}", layout.name()),
                LayoutQuery::Unrecognized(id) => {
                    println!("Keyboard layout: unknown (id 0x{id:02X})")
                }
                LayoutQuery::Unsupported => println!("Device does not report a keyboard layout"),
            }
        }
        Commands::Demo => {
            let mut session = Session::open(&cli)?;
            for device in &mut session.devices {
                let lighting = device.lighting_mut();
                let name = lighting.descriptor().name.clone();
                for id in lighting.descriptor().leds.clone() {
                    let result = lighting
                        .set_static(id, Rgb::YELLOW)
                        .and_then(|()| lighting.set_brightness(id, 255));
                    if let Err(e) = result {
                        warn!(device = %name, led = %id, error = %e, "demo failed");
                    }
                }
                println!("{name}: all LEDs yellow");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use open_chroma_core::descriptor::parse_database;

    #[test]
    fn features_gate_commands() {
        let db = parse_database(include_str!("../../../data/devices/razer.json")).unwrap();
        let keyboard = db.iter().find(|d| d.pid == 0x0203).unwrap();
        let mouse = db.iter().find(|d| d.pid == 0x0064).unwrap();

        assert!(require_feature(keyboard, Feature::KeyboardLayout).is_ok());
        assert!(require_feature(keyboard, Feature::Dpi).is_err());
        assert!(require_feature(mouse, Feature::Dpi).is_ok());
        assert!(require_feature(mouse, Feature::PollRate).is_ok());
        assert!(require_feature(mouse, Feature::KeyboardLayout).is_err());
    }
}
