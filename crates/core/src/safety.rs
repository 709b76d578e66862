//! Safety layer: validates write parameters against device limits before
//! anything is sent.
//!
//! ## DPI
//! - **Range**: 100 – the descriptor's `max_dpi`, checked per axis
//! - **Encoding**: big-endian u16 per axis
//!
//! ## Polling Rate
//! - **Supported values**: 125 Hz, 500 Hz, 1000 Hz
//! - **Encoding**: report interval in ms (8, 2, 1)
//!
//! ## Custom Frames
//! - Rows and columns must lie inside the descriptor's matrix dimensions
//! - One color per column in `start..=end`, at most 25 per row (the
//!   argument block holds 80 bytes including a 5-byte header)
//!
//! All validation happens before any HID communication.

use crate::descriptor::MatrixDimensions;
use crate::device::mouse::PollingRate;
use crate::error::{Error, Result};
use crate::report::ARGS_LEN;

pub const DPI_MIN: u16 = 100;

/// Largest number of colors one frame-row report can carry.
pub const MAX_FRAME_COLUMNS: usize = (ARGS_LEN - 5) / 3;

/// Validate one DPI axis against the device maximum.
pub fn validate_dpi(dpi: u16, max_dpi: u16) -> Result<u16> {
    if !(DPI_MIN..=max_dpi).contains(&dpi) {
        return Err(Error::OutOfRange {
            field: "dpi",
            value: dpi as u32,
            min: DPI_MIN as u32,
            max: max_dpi as u32,
        });
    }
    Ok(dpi)
}

/// Validate a polling rate value.
pub fn validate_polling_rate(hz: u16) -> Result<PollingRate> {
    PollingRate::from_hz(hz).ok_or(Error::OutOfRange {
        field: "polling_rate",
        value: hz as u32,
        min: 125,
        max: 1000,
    })
}

/// Validate a custom frame row upload.
pub fn validate_frame_row(
    dims: MatrixDimensions,
    row: u8,
    start: u8,
    end: u8,
    colors: usize,
) -> Result<()> {
    if dims.x == 0 || dims.y == 0 {
        return Err(Error::UnsupportedOperation("device has no custom frame matrix"));
    }
    let out_of_range = |field, value: u8, max: u8| Error::OutOfRange {
        field,
        value: value as u32,
        min: 0,
        max: max as u32,
    };
    if row >= dims.x {
        return Err(out_of_range("row", row, dims.x - 1));
    }
    if end >= dims.y {
        return Err(out_of_range("end_column", end, dims.y - 1));
    }
    if start > end {
        return Err(out_of_range("start_column", start, end));
    }
    let expected = (end - start) as usize + 1;
    if colors != expected || colors > MAX_FRAME_COLUMNS {
        return Err(Error::OutOfRange {
            field: "colors",
            value: colors as u32,
            min: expected as u32,
            max: expected.min(MAX_FRAME_COLUMNS) as u32,
        });
    }
    Ok(())
}
