//! Interactive bring-up of devices without a descriptor.
//!
//! The prober searches an ordered list of quirk combinations for one that
//! initializes the device, then asks a human which LEDs actually respond
//! and emits a descriptor record for the database.
//!
//! Session outline:
//! 1. Confirm the operator wants to bring up this device.
//! 2. Construct a trial matrix device over every known LED for each quirk
//!    combination in order, until one initializes. An unopenable handle ends
//!    the session; an initialization failure moves on to the next
//!    combination.
//! 3. Turn every LED off, confirm that worked, then light each LED yellow in
//!    turn and ask whether it changed.
//! 4. Reject an empty or a complete LED set.
//! 5. Ask for the device type (and maximum DPI for mice) and build the record.

use crate::descriptor::{DeviceDescriptor, DeviceType, Feature, Fx, MatrixDimensions, ProtocolClass};
use crate::device::{LightingDevice, MatrixDevice};
use crate::error::{AbortReason, Error, Result};
use crate::led::{LedId, Rgb};
use crate::quirks::{default_quirk_combinations, QuirkSet};
use crate::transport::{HidDeviceInfo, TransportConfig, TransportOpener};
use std::io::{BufRead, Write};
use tracing::{info, warn};

/// Remediation shown when the device node cannot be opened.
pub const PERMISSION_HINT: &str =
    "check the permissions of the hidraw node, e.g. `sudo chmod g+rw /dev/hidrawN && sudo chgrp plugdev /dev/hidrawN`";

/// A human answering questions about what the hardware did.
///
/// Calls block until answered; there is no timeout.
pub trait ConfirmationOracle {
    /// Ask a yes/no question.
    fn confirm(&mut self, question: &str) -> Result<bool>;
    /// Ask for a line of free-form input.
    fn prompt(&mut self, question: &str) -> Result<String>;
}

/// Line-based oracle over a reader and a writer, normally the terminal.
pub struct TerminalOracle<R, W> {
    input: R,
    output: W,
}

impl TerminalOracle<std::io::StdinLock<'static>, std::io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(std::io::stdin().lock(), std::io::stdout())
    }
}

impl<R: BufRead, W: Write> TerminalOracle<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn read_answer(&mut self) -> Result<String> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "input closed",
            )));
        }
        Ok(line.trim().to_string())
    }
}

impl<R: BufRead, W: Write> ConfirmationOracle for TerminalOracle<R, W> {
    fn confirm(&mut self, question: &str) -> Result<bool> {
        write!(self.output, "{question} (y/N) ")?;
        self.output.flush()?;
        let answer = self.read_answer()?.to_lowercase();
        Ok(answer == "y" || answer == "yes")
    }

    fn prompt(&mut self, question: &str) -> Result<String> {
        write!(self.output, "{question}: ")?;
        self.output.flush()?;
        self.read_answer()
    }
}

/// The hardware a bring-up session targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BringupTarget {
    pub name: String,
    pub vid: u16,
    pub pid: u16,
    pub path: String,
}

impl From<&HidDeviceInfo> for BringupTarget {
    fn from(info: &HidDeviceInfo) -> Self {
        Self {
            name: info.product_string.clone(),
            vid: info.vid,
            pid: info.pid,
            path: info.path.clone(),
        }
    }
}

/// Result of a completed session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The operator chose not to bring up the device.
    Declined,
    Discovered(Discovery),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovery {
    pub descriptor: DeviceDescriptor,
    /// Quirk combinations tried, in order; the last one worked.
    pub attempted: Vec<QuirkSet>,
}

/// Drives one bring-up session.
pub struct Prober<'a, O, C> {
    opener: &'a O,
    oracle: &'a mut C,
    combinations: Vec<QuirkSet>,
    transport_config: TransportConfig,
}

impl<'a, O, C> Prober<'a, O, C>
where
    O: TransportOpener,
    C: ConfirmationOracle,
{
    /// A prober using the stock quirk search order.
    pub fn new(opener: &'a O, oracle: &'a mut C) -> Self {
        Self {
            opener,
            oracle,
            combinations: default_quirk_combinations(),
            transport_config: TransportConfig::default(),
        }
    }

    /// Replace the quirk combinations, tried in the given order.
    pub fn with_combinations(mut self, combinations: Vec<QuirkSet>) -> Self {
        self.combinations = combinations;
        self
    }

    pub fn with_transport_config(mut self, config: TransportConfig) -> Self {
        self.transport_config = config;
        self
    }

    pub fn run(&mut self, target: &BringupTarget) -> Result<Outcome> {
        let question = format!(
            "Bring up {} ({:04x}:{:04x}) at {}?",
            target.name, target.vid, target.pid, target.path
        );
        if !self.oracle.confirm(&question)? {
            info!(path = %target.path, "bring-up declined");
            return Ok(Outcome::Declined);
        }

        let (mut device, attempted) = self.find_working_quirks(target)?;
        let quirks = device.descriptor().quirks.clone();
        info!(%quirks, "quirk combination initialized the device");

        let probed = self.probe_leds(&mut device);
        device.close();
        let leds = probed?;

        let device_type = self.ask_device_type()?;
        let max_dpi = match device_type {
            DeviceType::Mouse => Some(self.ask_max_dpi()?),
            _ => None,
        };

        let descriptor = DeviceDescriptor {
            name: target.name.clone(),
            vid: target.vid,
            pid: target.pid,
            device_type,
            pclass: ProtocolClass::Matrix,
            leds,
            fx: Fx::MATRIX.to_vec(),
            features: Feature::ALL
                .iter()
                .copied()
                .filter(|f| device_type == DeviceType::Mouse || !f.is_mouse_only())
                .collect(),
            quirks,
            matrix_dimensions: MatrixDimensions::default(),
            max_dpi,
        };
        descriptor.validate()?;
        Ok(Outcome::Discovered(Discovery {
            descriptor,
            attempted,
        }))
    }

    fn trial_descriptor(target: &BringupTarget, quirks: QuirkSet) -> DeviceDescriptor {
        DeviceDescriptor {
            name: target.name.clone(),
            vid: target.vid,
            pid: target.pid,
            device_type: DeviceType::Accessory,
            pclass: ProtocolClass::Matrix,
            leds: LedId::ALL.to_vec(),
            fx: Fx::MATRIX.to_vec(),
            features: Vec::new(),
            quirks,
            matrix_dimensions: MatrixDimensions::default(),
            max_dpi: None,
        }
    }

    fn find_working_quirks(
        &self,
        target: &BringupTarget,
    ) -> Result<(MatrixDevice<O::Transport>, Vec<QuirkSet>)> {
        let mut attempted = Vec::new();
        for quirks in &self.combinations {
            info!(%quirks, "trying quirk combination");
            attempted.push(quirks.clone());

            let mut device = MatrixDevice::new(Self::trial_descriptor(target, quirks.clone()));
            device.set_transport_config(self.transport_config);
            if let Err(e) = device.open_handle(self.opener, &target.path) {
                warn!(path = %target.path, hint = PERMISSION_HINT, "cannot open device");
                return Err(e);
            }
            match device.initialize() {
                Ok(()) => return Ok((device, attempted)),
                Err(Error::InitializationFailed { led }) => {
                    info!(%quirks, %led, "combination failed, trying the next one");
                }
                Err(e) => return Err(e),
            }
        }
        Err(Error::NoWorkingQuirks)
    }

    fn probe_leds(&mut self, device: &mut MatrixDevice<O::Transport>) -> Result<Vec<LedId>> {
        for &led in LedId::ALL {
            device.set_none(led)?;
        }
        if !self.oracle.confirm("Are all LEDs off now?")? {
            return Err(Error::BringupAborted(AbortReason::LedsNotOff));
        }

        let mut confirmed = Vec::new();
        for &led in LedId::ALL {
            device.set_static(led, Rgb::YELLOW)?;
            let lit = self
                .oracle
                .confirm(&format!("Did an LED turn yellow for {led}?"))?;
            device.set_none(led)?;
            if lit {
                info!(%led, "LED confirmed");
                confirmed.push(led);
            }
        }

        if confirmed.is_empty() {
            return Err(Error::BringupAborted(AbortReason::NoLedConfirmed));
        }
        if confirmed.len() == LedId::ALL.len() {
            return Err(Error::BringupAborted(AbortReason::AllLedsConfirmed));
        }
        Ok(confirmed)
    }

    fn ask_device_type(&mut self) -> Result<DeviceType> {
        let choices: Vec<_> = DeviceType::ALL.iter().map(DeviceType::name).collect();
        let question = format!("Device type ({})", choices.join(", "));
        loop {
            let answer = self.oracle.prompt(&question)?;
            match DeviceType::from_name(&answer) {
                Some(t) => return Ok(t),
                None => warn!(answer = %answer, "unrecognized device type"),
            }
        }
    }

    fn ask_max_dpi(&mut self) -> Result<u16> {
        loop {
            let answer = self.oracle.prompt("Maximum DPI")?;
            match answer.parse::<u16>() {
                Ok(dpi) if dpi > 0 => return Ok(dpi),
                _ => warn!(answer = %answer, "maximum DPI must be a positive integer"),
            }
        }
    }
}
