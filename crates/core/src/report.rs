//! Razer report encoding and decoding.
//!
//! Every command is a fixed 90-byte feature report:
//!
//! | offset | field                          |
//! |--------|--------------------------------|
//! | 0      | status                         |
//! | 1      | transaction id                 |
//! | 2..4   | remaining packets (big-endian) |
//! | 4      | protocol type                  |
//! | 5      | data size                      |
//! | 6      | command class                  |
//! | 7      | command id (bit 7 = get)       |
//! | 8..88  | arguments                      |
//! | 88     | checksum                       |
//! | 89     | reserved                       |
//!
//! The checksum is the XOR of bytes 1..88, transaction id through the last
//! argument byte. Responses have the same layout and echo the transaction id.

use crate::error::{Error, Result};

/// Total report length.
pub const REPORT_LEN: usize = 90;
/// Capacity of the argument block.
pub const ARGS_LEN: usize = 80;
/// Transaction id used when a device needs no specific one.
pub const DEFAULT_TRANSACTION_ID: u8 = 0xFF;

const ARGS_OFFSET: usize = 8;
const CHECKSUM_OFFSET: usize = ARGS_OFFSET + ARGS_LEN;
const CHECKSUM_SPAN: std::ops::Range<usize> = 1..CHECKSUM_OFFSET;

/// Bit set in the command id of every "get" command.
pub const GET_BIT: u8 = 0x80;

/// Report status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    New,
    Busy,
    Successful,
    Failure,
    Timeout,
    NotSupported,
    Unknown(u8),
}

impl Status {
    pub fn from_byte(b: u8) -> Self {
        match b {
            0x00 => Self::New,
            0x01 => Self::Busy,
            0x02 => Self::Successful,
            0x03 => Self::Failure,
            0x04 => Self::Timeout,
            0x05 => Self::NotSupported,
            other => Self::Unknown(other),
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Self::New => 0x00,
            Self::Busy => 0x01,
            Self::Successful => 0x02,
            Self::Failure => 0x03,
            Self::Timeout => 0x04,
            Self::NotSupported => 0x05,
            Self::Unknown(b) => b,
        }
    }
}

/// Persistence selector carried as the first argument of most LED commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum VarStore {
    NoStore = 0x00,
    Store = 0x01,
}

/// A decoded report, request or response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub status: Status,
    pub transaction_id: u8,
    pub remaining_packets: u16,
    pub protocol_type: u8,
    pub data_size: u8,
    pub command_class: u8,
    pub command_id: u8,
    pub args: [u8; ARGS_LEN],
}

impl Report {
    /// Build a new request. The payload is zero-padded to the argument capacity.
    pub fn build(command_class: u8, command_id: u8, payload: &[u8]) -> Result<Self> {
        if payload.len() > ARGS_LEN {
            return Err(Error::OutOfRange {
                field: "payload_len",
                value: payload.len() as u32,
                min: 0,
                max: ARGS_LEN as u32,
            });
        }
        let mut args = [0u8; ARGS_LEN];
        args[..payload.len()].copy_from_slice(payload);
        Ok(Self {
            status: Status::New,
            transaction_id: DEFAULT_TRANSACTION_ID,
            remaining_packets: 0,
            protocol_type: 0x00,
            data_size: payload.len() as u8,
            command_class,
            command_id,
            args,
        })
    }

    /// Same request with a device-specific transaction id.
    pub fn with_transaction_id(mut self, transaction_id: u8) -> Self {
        self.transaction_id = transaction_id;
        self
    }

    /// Whether this is a "get" command.
    pub fn is_get(&self) -> bool {
        self.command_id & GET_BIT != 0
    }

    /// Argument bytes covered by `data_size`.
    pub fn payload(&self) -> &[u8] {
        &self.args[..(self.data_size as usize).min(ARGS_LEN)]
    }

    /// Encode to wire bytes, recomputing the checksum.
    pub fn encode(&self) -> [u8; REPORT_LEN] {
        let mut buf = [0u8; REPORT_LEN];
        buf[0] = self.status.as_byte();
        buf[1] = self.transaction_id;
        buf[2..4].copy_from_slice(&self.remaining_packets.to_be_bytes());
        buf[4] = self.protocol_type;
        buf[5] = self.data_size;
        buf[6] = self.command_class;
        buf[7] = self.command_id;
        buf[ARGS_OFFSET..CHECKSUM_OFFSET].copy_from_slice(&self.args);
        buf[CHECKSUM_OFFSET] = checksum(&buf);
        buf
    }

    /// Decode wire bytes, verifying length and checksum.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() != REPORT_LEN {
            return Err(Error::Protocol(format!(
                "report length {} bytes, expected {}",
                data.len(),
                REPORT_LEN
            )));
        }
        let expected = checksum(data);
        if data[CHECKSUM_OFFSET] != expected {
            return Err(Error::Protocol(format!(
                "checksum mismatch: stored 0x{:02X}, computed 0x{expected:02X}",
                data[CHECKSUM_OFFSET]
            )));
        }
        let mut args = [0u8; ARGS_LEN];
        args.copy_from_slice(&data[ARGS_OFFSET..CHECKSUM_OFFSET]);
        Ok(Self {
            status: Status::from_byte(data[0]),
            transaction_id: data[1],
            remaining_packets: u16::from_be_bytes([data[2], data[3]]),
            protocol_type: data[4],
            data_size: data[5],
            command_class: data[6],
            command_id: data[7],
            args,
        })
    }
}

/// XOR of the checksum-covered span of a full report buffer.
pub fn checksum(buf: &[u8]) -> u8 {
    buf[CHECKSUM_SPAN].iter().fold(0, |acc, b| acc ^ b)
}
