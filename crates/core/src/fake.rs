//! Simulated Razer firmware.
//!
//! [`FakeTransport`] answers reports the way real firmware does: set commands
//! are stored per command and LED, get commands echo back the last stored
//! arguments. It backs the fake device variant and is the test double for
//! device and bring-up logic. Clones share the same firmware state.

use crate::commands::Command;
use crate::error::{Error, Result};
use crate::led::LedId;
use crate::report::{Report, Status, ARGS_LEN, GET_BIT};
use crate::transport::{HidTransport, TransportOpener};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::trace;

/// Most recent requests kept for inspection.
pub const REQUEST_LOG_LEN: usize = 1024;

/// Register key: class, set-command id, LED byte (0 when not LED-scoped).
type RegisterKey = (u8, u8, u8);

#[derive(Default)]
struct Firmware {
    registers: HashMap<RegisterKey, [u8; ARGS_LEN]>,
    pending: VecDeque<Vec<u8>>,
    rejected: HashSet<(u8, u8)>,
    failing_leds: HashSet<u8>,
    busy_reads: usize,
    disconnected: bool,
    requests: VecDeque<Report>,
}

impl Firmware {
    fn respond(&mut self, request: Report) -> Report {
        let mut response = request.clone();
        let led = led_scope(&request);
        response.status = if self.rejected.contains(&(request.command_class, request.command_id)) {
            Status::NotSupported
        } else if led.is_some_and(|b| self.failing_leds.contains(&b)) {
            Status::Failure
        } else {
            Status::Successful
        };

        if response.status == Status::Successful {
            let key = (
                request.command_class,
                request.command_id & !GET_BIT,
                led.unwrap_or(0),
            );
            if request.is_get() {
                if let Some(args) = self.registers.get(&key) {
                    response.args = *args;
                }
            } else {
                self.registers.insert(key, request.args);
            }
        }
        if self.requests.len() == REQUEST_LOG_LEN {
            self.requests.pop_front();
        }
        self.requests.push_back(request);
        response
    }
}

/// LED byte of LED-scoped commands.
fn led_scope(report: &Report) -> Option<u8> {
    let id = report.command_id & !GET_BIT;
    match (report.command_class, id) {
        (0x03, 0x00..=0x03) | (0x0F, 0x04) | (0x0D, 0x02) => Some(report.args[1]),
        _ => None,
    }
}

/// In-memory firmware behind the HID transport contract.
#[derive(Clone, Default)]
pub struct FakeTransport {
    firmware: Arc<Mutex<Firmware>>,
}

impl FakeTransport {
    /// Firmware with stock device-info registers.
    pub fn new() -> Self {
        let fake = Self::default();
        fake.preset(Command::new(0x00, 0x02), b"PM0000000000000000000");
        fake.preset(Command::new(0x00, 0x01), &[0x01, 0x02]);
        fake.preset(Command::new(0x00, 0x05), &[0x01]);
        fake.preset(Command::new(0x00, 0x06), &[0x01]);
        fake.preset(Command::new(0x04, 0x05), &[0x00, 0x03, 0x20, 0x03, 0x20]);
        fake
    }

    fn state(&self) -> MutexGuard<'_, Firmware> {
        // a panic while holding the lock leaves the state usable
        self.firmware.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Store register contents as if a set command with these arguments was received.
    pub fn preset(&self, set: Command, args: &[u8]) {
        let mut buf = [0u8; ARGS_LEN];
        buf[..args.len().min(ARGS_LEN)].copy_from_slice(&args[..args.len().min(ARGS_LEN)]);
        self.state().registers.insert((set.class, set.id, 0), buf);
    }

    /// Answer this command pair with the "not supported" status.
    pub fn reject(&self, command: Command) {
        self.state().rejected.insert((command.class, command.id));
    }

    /// Answer every command scoped to this LED with the "failure" status.
    pub fn fail_led(&self, led: LedId) {
        self.state().failing_leds.insert(led.as_byte());
    }

    /// Answer the next `n` reads with a busy status.
    pub fn busy_for(&self, n: usize) {
        self.state().busy_reads = n;
    }

    /// Make every subsequent write and read fail.
    pub fn disconnect(&self) {
        self.state().disconnected = true;
    }

    /// Requests received so far, oldest first, up to [`REQUEST_LOG_LEN`].
    pub fn requests(&self) -> Vec<Report> {
        self.state().requests.iter().cloned().collect()
    }

    pub fn clear_requests(&self) {
        self.state().requests.clear();
    }
}

impl HidTransport for FakeTransport {
    fn write_feature_report(&self, data: &[u8]) -> Result<()> {
        let mut fw = self.state();
        if fw.disconnected {
            return Err(Error::Transport("fake: device disconnected".into()));
        }
        let request = Report::parse(data)?;
        trace!(
            class = format_args!("0x{:02X}", request.command_class),
            id = format_args!("0x{:02X}", request.command_id),
            "fake firmware received report"
        );
        let response = fw.respond(request);
        fw.pending.push_back(response.encode().to_vec());
        Ok(())
    }

    fn read_feature_report(&self) -> Result<Vec<u8>> {
        let mut fw = self.state();
        if fw.disconnected {
            return Err(Error::Transport("fake: device disconnected".into()));
        }
        if fw.busy_reads > 0 {
            fw.busy_reads -= 1;
            if let Some(front) = fw.pending.front() {
                let mut busy = Report::parse(front)?;
                busy.status = Status::Busy;
                return Ok(busy.encode().to_vec());
            }
        }
        fw.pending
            .pop_front()
            .ok_or_else(|| Error::Transport("fake: no report pending".into()))
    }
}

/// Opens handles onto one shared [`FakeTransport`].
#[derive(Clone, Default)]
pub struct FakeOpener {
    firmware: FakeTransport,
    unavailable: bool,
}

impl FakeOpener {
    pub fn new(firmware: FakeTransport) -> Self {
        Self {
            firmware,
            unavailable: false,
        }
    }

    /// An opener whose handle can never be opened, as with missing hidraw permissions.
    pub fn unavailable() -> Self {
        Self {
            firmware: FakeTransport::new(),
            unavailable: true,
        }
    }

    pub fn firmware(&self) -> &FakeTransport {
        &self.firmware
    }
}

impl TransportOpener for FakeOpener {
    type Transport = FakeTransport;

    fn open(&self, path: &str) -> Result<FakeTransport> {
        if self.unavailable {
            return Err(Error::DeviceUnavailable(format!("{path}: permission denied")));
        }
        Ok(self.firmware.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{exchange, TransportConfig};

    fn roundtrip(fake: &FakeTransport, class: u8, id: u8, args: &[u8]) -> Result<Report> {
        let req = Report::build(class, id, args)?;
        exchange(fake, &req, &TransportConfig::immediate())
    }

    #[test]
    fn get_echoes_last_set_per_led() {
        let fake = FakeTransport::new();
        roundtrip(&fake, 0x03, 0x03, &[0x01, 0x04, 0x42]).unwrap();
        roundtrip(&fake, 0x03, 0x03, &[0x01, 0x05, 0x99]).unwrap();
        let logo = roundtrip(&fake, 0x03, 0x83, &[0x01, 0x04, 0x00]).unwrap();
        let backlight = roundtrip(&fake, 0x03, 0x83, &[0x01, 0x05, 0x00]).unwrap();
        assert_eq!(logo.args[2], 0x42);
        assert_eq!(backlight.args[2], 0x99);
    }

    #[test]
    fn request_log_keeps_most_recent() {
        let fake = FakeTransport::new();
        for i in 0..REQUEST_LOG_LEN + 10 {
            roundtrip(&fake, 0x03, 0x03, &[0x01, 0x04, i as u8]).unwrap();
        }
        let sent = fake.requests();
        assert_eq!(sent.len(), REQUEST_LOG_LEN);
        assert_eq!(sent[0].args[2], 10);
        assert_eq!(sent[REQUEST_LOG_LEN - 1].args[2], (REQUEST_LOG_LEN + 9) as u8);
    }

    #[test]
    fn unset_register_echoes_request() {
        let fake = FakeTransport::new();
        let resp = roundtrip(&fake, 0x03, 0x80, &[0x01, 0x04, 0x00]).unwrap();
        assert_eq!(&resp.args[..3], &[0x01, 0x04, 0x00]);
    }

    #[test]
    fn rejected_command_reports_not_supported() {
        let fake = FakeTransport::new();
        fake.reject(Command::new(0x03, 0x83));
        let err = roundtrip(&fake, 0x03, 0x83, &[0x01, 0x04, 0x00]).unwrap_err();
        assert!(matches!(
            err,
            Error::CommandNotSupported {
                class: 0x03,
                id: 0x83
            }
        ));
    }

    #[test]
    fn failing_led_only_affects_that_led() {
        let fake = FakeTransport::new();
        fake.fail_led(LedId::Logo);
        assert!(roundtrip(&fake, 0x03, 0x83, &[0x01, 0x04, 0x00]).is_err());
        assert!(roundtrip(&fake, 0x03, 0x83, &[0x01, 0x05, 0x00]).is_ok());
    }

    #[test]
    fn busy_reads_then_success() {
        let fake = FakeTransport::new();
        fake.busy_for(2);
        let req = Report::build(0x00, 0x81, &[0x00, 0x00]).unwrap();
        let config = TransportConfig {
            settle_delay: std::time::Duration::ZERO,
            read_timeout: std::time::Duration::from_secs(5),
        };
        let resp = exchange(&fake, &req, &config).unwrap();
        assert_eq!(&resp.args[..2], &[0x01, 0x02]);
        assert_eq!(fake.requests().len(), 1);
    }

    #[test]
    fn disconnected_fails_writes() {
        let fake = FakeTransport::new();
        fake.disconnect();
        assert!(matches!(
            roundtrip(&fake, 0x00, 0x81, &[0x00, 0x00]),
            Err(Error::Transport(_))
        ));
    }

    #[test]
    fn opener_shares_firmware() {
        let opener = FakeOpener::new(FakeTransport::new());
        let a = opener.open("/dev/hidraw0").unwrap();
        roundtrip(&a, 0x03, 0x03, &[0x01, 0x04, 0x10]).unwrap();
        assert_eq!(opener.firmware().requests().len(), 1);
        assert!(matches!(
            FakeOpener::unavailable().open("/dev/hidraw0"),
            Err(Error::DeviceUnavailable(_))
        ));
    }
}
