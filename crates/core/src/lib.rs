//! open-chroma-core: Razer HID protocol, device model, and bring-up.
//!
//! This crate provides the protocol and state-machine layer for driving
//! Razer Chroma lighting over USB HID feature reports: the report codec,
//! per-class effect encoding, cached LED state, and the interactive quirk
//! discovery used to support new hardware.

pub mod bringup;
pub mod commands;
pub mod descriptor;
pub mod device;
pub mod error;
pub mod fake;
pub mod led;
pub mod quirks;
pub mod report;
pub mod safety;
pub mod transport;

/// Razer USB Vendor ID.
pub const RAZER_VID: u16 = 0x1532;
