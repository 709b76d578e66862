//! HID transport abstraction for device communication.
//!
//! Real hidraw handles, the simulated firmware, and test mocks share the
//! same interface. [`exchange`] is the single request/response primitive
//! every device operation goes through.

use crate::error::{Error, Result};
use crate::report::{Report, Status, REPORT_LEN};
use std::ffi::CString;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Abstraction over raw feature-report I/O on an opened handle.
///
/// Reports are exchanged without the leading HID report-id byte.
pub trait HidTransport: Send {
    /// Write one feature report.
    fn write_feature_report(&self, data: &[u8]) -> Result<()>;
    /// Read the pending feature report.
    fn read_feature_report(&self) -> Result<Vec<u8>>;
}

/// Opens transport handles by device path.
pub trait TransportOpener {
    type Transport: HidTransport;

    /// Open a handle, failing with [`Error::DeviceUnavailable`].
    fn open(&self, path: &str) -> Result<Self::Transport>;
}

/// Timing applied to every exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportConfig {
    /// Pause between writing a request and reading its response.
    pub settle_delay: Duration,
    /// Upper bound on waiting for a non-busy response.
    pub read_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(1),
            read_timeout: Duration::from_millis(500),
        }
    }
}

impl TransportConfig {
    /// No settle delay; a busy response fails immediately.
    pub fn immediate() -> Self {
        Self {
            settle_delay: Duration::ZERO,
            read_timeout: Duration::ZERO,
        }
    }
}

/// Write a request and read its matched response.
///
/// Busy responses are re-read until `read_timeout` elapses. The command is
/// never re-sent.
pub fn exchange(
    transport: &dyn HidTransport,
    request: &Report,
    config: &TransportConfig,
) -> Result<Report> {
    let encoded = request.encode();
    trace!(
        class = format_args!("0x{:02X}", request.command_class),
        id = format_args!("0x{:02X}", request.command_id),
        payload_hex = format_args!("{:02X?}", request.payload()),
        "report TX"
    );
    transport.write_feature_report(&encoded)?;

    let started = Instant::now();
    let response = loop {
        if !config.settle_delay.is_zero() {
            std::thread::sleep(config.settle_delay);
        }
        let raw = transport.read_feature_report()?;
        let response = Report::parse(&raw)?;

        if response.transaction_id != request.transaction_id {
            return Err(Error::Protocol(format!(
                "transaction id mismatch: sent 0x{:02X}, got 0x{:02X}",
                request.transaction_id, response.transaction_id
            )));
        }
        if response.status != Status::Busy {
            break response;
        }
        if started.elapsed() >= config.read_timeout {
            warn!(
                class = format_args!("0x{:02X}", request.command_class),
                id = format_args!("0x{:02X}", request.command_id),
                "device stayed busy"
            );
            return Err(Error::Transport(format!(
                "timed out after {:?} waiting for response",
                config.read_timeout
            )));
        }
        debug!("device busy, reading again");
    };

    trace!(
        status = ?response.status,
        payload_hex = format_args!("{:02X?}", response.payload()),
        "report RX"
    );

    if response.command_class != request.command_class
        || response.command_id != request.command_id
    {
        return Err(Error::Protocol(format!(
            "response for 0x{:02X}/0x{:02X} does not match request 0x{:02X}/0x{:02X}",
            response.command_class,
            response.command_id,
            request.command_class,
            request.command_id
        )));
    }

    match response.status {
        Status::Successful => Ok(response),
        Status::NotSupported => Err(Error::CommandNotSupported {
            class: request.command_class,
            id: request.command_id,
        }),
        Status::Timeout => Err(Error::Transport("device reported timeout".into())),
        Status::Failure => Err(Error::Protocol("device reported failure".into())),
        other => Err(Error::Protocol(format!("unexpected status {other:?}"))),
    }
}

/// A hidraw handle opened through hidapi.
pub struct HidapiTransport {
    device: hidapi::HidDevice,
}

impl HidTransport for HidapiTransport {
    fn write_feature_report(&self, data: &[u8]) -> Result<()> {
        // report id 0 prefix
        let mut buf = [0u8; REPORT_LEN + 1];
        let len = data.len().min(REPORT_LEN);
        buf[1..=len].copy_from_slice(&data[..len]);
        self.device
            .send_feature_report(&buf)
            .map_err(|e| Error::Transport(format!("send_feature_report: {e}")))
    }

    fn read_feature_report(&self) -> Result<Vec<u8>> {
        let mut buf = [0u8; REPORT_LEN + 1];
        let n = self
            .device
            .get_feature_report(&mut buf)
            .map_err(|e| Error::Transport(format!("get_feature_report: {e}")))?;
        if n <= 1 {
            return Err(Error::Transport("empty feature report".into()));
        }
        Ok(buf[1..n].to_vec())
    }
}

/// Opens [`HidapiTransport`] handles.
pub struct HidapiOpener {
    api: hidapi::HidApi,
}

impl HidapiOpener {
    pub fn new() -> Result<Self> {
        let api = hidapi::HidApi::new().map_err(|e| Error::Transport(format!("hidapi init: {e}")))?;
        Ok(Self { api })
    }

    /// List HID interfaces of one vendor.
    pub fn enumerate(&self, vendor_id: u16) -> Vec<HidDeviceInfo> {
        let devices: Vec<_> = self
            .api
            .device_list()
            .filter(|info| info.vendor_id() == vendor_id)
            .map(|info| HidDeviceInfo {
                path: info.path().to_string_lossy().into_owned(),
                vid: info.vendor_id(),
                pid: info.product_id(),
                product_string: info.product_string().unwrap_or_default().to_string(),
                interface_number: info.interface_number(),
            })
            .collect();
        debug!(count = devices.len(), "HID enumeration complete");
        devices
    }
}

impl TransportOpener for HidapiOpener {
    type Transport = HidapiTransport;

    fn open(&self, path: &str) -> Result<HidapiTransport> {
        let c_path = CString::new(path)
            .map_err(|_| Error::DeviceUnavailable(format!("invalid device path {path:?}")))?;
        let device = self
            .api
            .open_path(&c_path)
            .map_err(|e| Error::DeviceUnavailable(format!("{path}: {e}")))?;
        Ok(HidapiTransport { device })
    }
}

/// One enumerated HID interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HidDeviceInfo {
    pub path: String,
    pub vid: u16,
    pub pid: u16,
    pub product_string: String,
    pub interface_number: i32,
}


#[cfg(test)]
mod tests {
    use super::mock::MockTransport;
    use super::*;

    fn request() -> Report {
        Report::build(0x03, 0x83, &[0x01, 0x04, 0x00]).unwrap()
    }

    #[test]
    fn exchange_returns_matched_response() {
        let mock = MockTransport::new();
        let req = request();
        mock.push_reply(&req, Status::Successful, &[0x01, 0x04, 0x7F]);
        let resp = exchange(&mock, &req, &TransportConfig::immediate()).unwrap();
        assert_eq!(resp.args[2], 0x7F);
        assert_eq!(mock.written(), vec![req.encode().to_vec()]);
    }

    #[test]
    fn exchange_rejects_transaction_id_mismatch() {
        let mock = MockTransport::new();
        let req = request();
        let other = req.clone().with_transaction_id(0x3F);
        mock.push_reply(&other, Status::Successful, &[]);
        let err = exchange(&mock, &req, &TransportConfig::immediate()).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn exchange_rejects_bad_checksum() {
        let mock = MockTransport::new();
        let req = request();
        let mut raw = req.encode();
        raw[0] = Status::Successful.as_byte();
        raw[10] ^= 0x10;
        mock.push_raw(raw.to_vec());
        let err = exchange(&mock, &req, &TransportConfig::immediate()).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn exchange_rejects_mismatched_command() {
        let mock = MockTransport::new();
        let req = request();
        let other = Report::build(0x03, 0x82, &[]).unwrap();
        mock.push_reply(&other, Status::Successful, &[]);
        assert!(matches!(
            exchange(&mock, &req, &TransportConfig::immediate()),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn exchange_reads_past_busy_within_timeout() {
        let mock = MockTransport::new();
        let req = request();
        mock.push_reply(&req, Status::Busy, &[]);
        mock.push_reply(&req, Status::Successful, &[0x01, 0x04, 0x10]);
        let config = TransportConfig {
            settle_delay: Duration::ZERO,
            read_timeout: Duration::from_secs(5),
        };
        let resp = exchange(&mock, &req, &config).unwrap();
        assert_eq!(resp.args[2], 0x10);
        assert_eq!(mock.written().len(), 1, "request must not be re-sent");
    }

    #[test]
    fn exchange_times_out_on_busy() {
        let mock = MockTransport::new();
        let req = request();
        mock.push_reply(&req, Status::Busy, &[]);
        let err = exchange(&mock, &req, &TransportConfig::immediate()).unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[test]
    fn exchange_maps_status_codes() {
        let req = request();
        let cases = [
            (Status::NotSupported, "not supported"),
            (Status::Failure, "protocol"),
            (Status::Timeout, "transport"),
        ];
        for (status, label) in cases {
            let mock = MockTransport::new();
            mock.push_reply(&req, status, &[]);
            let err = exchange(&mock, &req, &TransportConfig::immediate()).unwrap_err();
            let ok = match status {
                Status::NotSupported => matches!(err, Error::CommandNotSupported { .. }),
                Status::Failure => matches!(err, Error::Protocol(_)),
                _ => matches!(err, Error::Transport(_)),
            };
            assert!(ok, "{label}: got {err:?}");
        }
    }

    #[test]
    fn exchange_propagates_read_failure() {
        let mock = MockTransport::new();
        mock.push_error(Error::Transport("read: broken pipe".into()));
        assert!(matches!(
            exchange(&mock, &request(), &TransportConfig::immediate()),
            Err(Error::Transport(_))
        ));
    }
}
