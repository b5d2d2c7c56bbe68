//! Byte-window primitives: little-endian reads, offset translation and the
//! string decoders shared by every record.

use crate::error::{RegistryError, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use chrono::{DateTime, Utc};
use encoding_rs::{UTF_16LE, WINDOWS_1252};
use std::io::Cursor;

/// Absolute offset of the first hive bin (directly after the base block).
pub const HBIN_START_OFFSET: u32 = 0x1000;

/// Marker used by the format for "no cell here".
pub const NO_CELL: u32 = 0xFFFF_FFFF;

/// Seconds between 1601-01-01 and 1970-01-01.
const FILETIME_UNIX_DIFF: i64 = 11_644_473_600;

/// Decodes a single-byte ("compressed") name, trimming trailing NULs.
///
/// Compressed names are Windows-1252, so every byte maps to a character and
/// decoding never fails.
pub fn read_ascii_string(data: &[u8]) -> String {
    let (decoded, _had_errors) = WINDOWS_1252.decode_without_bom_handling(data);
    decoded.trim_end_matches('\0').to_string()
}

/// Best-effort UTF-16LE decode used for names and string values.
///
/// The input is truncated at the first double-NUL that starts on an even
/// boundary. An odd-length remainder is padded with one NUL byte. The result is
/// decoded lossily and cut at the first embedded terminator. Never fails.
pub fn decode_utf16le(data: &[u8]) -> String {
    let end = data
        .chunks_exact(2)
        .position(|unit| unit == [0, 0])
        .map(|unit| unit * 2)
        .unwrap_or(data.len());
    let window = &data[..end];

    let decoded = if window.len() % 2 != 0 {
        let mut padded = Vec::with_capacity(window.len() + 1);
        padded.extend_from_slice(window);
        padded.push(0);
        UTF_16LE.decode_without_bom_handling(&padded).0.into_owned()
    } else {
        UTF_16LE.decode_without_bom_handling(window).0.into_owned()
    };

    match decoded.find('\0') {
        Some(terminator) => decoded[..terminator].to_string(),
        None => decoded,
    }
}

/// True when bytes flagged as single-byte are laid out as UTF-16LE
/// (every high byte zero, at least one low byte set).
pub fn looks_like_utf16(data: &[u8]) -> bool {
    data.len() >= 2
        && data.len() % 2 == 0
        && data.chunks_exact(2).all(|unit| unit[1] == 0)
        && data.chunks_exact(2).any(|unit| unit[0] != 0)
}

/// Decodes a key or value name.
///
/// Returns the name and whether the single-byte flag turned out to be wrong.
pub fn decode_name(data: &[u8], compressed: bool) -> (String, bool) {
    if compressed {
        if looks_like_utf16(data) {
            (decode_utf16le(data), true)
        } else {
            (read_ascii_string(data), false)
        }
    } else {
        (decode_utf16le(data), false)
    }
}

fn truncated(data: &[u8], offset: usize, expected: usize) -> RegistryError {
    RegistryError::TruncatedData {
        offset: offset as u32,
        expected,
        actual: data.len().saturating_sub(offset),
    }
}

/// Returns `len` bytes starting at `offset`, or a truncation error.
pub fn read_bytes(data: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    offset
        .checked_add(len)
        .and_then(|end| data.get(offset..end))
        .ok_or_else(|| truncated(data, offset, len))
}

/// Reads a u16 from a byte slice at the given offset.
pub fn read_u16_le(data: &[u8], offset: usize) -> Result<u16> {
    let mut cursor = Cursor::new(read_bytes(data, offset, 2)?);
    Ok(cursor.read_u16::<LittleEndian>()?)
}

/// Reads a u32 from a byte slice at the given offset.
pub fn read_u32_le(data: &[u8], offset: usize) -> Result<u32> {
    let mut cursor = Cursor::new(read_bytes(data, offset, 4)?);
    Ok(cursor.read_u32::<LittleEndian>()?)
}

/// Reads an i32 from a byte slice at the given offset.
pub fn read_i32_le(data: &[u8], offset: usize) -> Result<i32> {
    let mut cursor = Cursor::new(read_bytes(data, offset, 4)?);
    Ok(cursor.read_i32::<LittleEndian>()?)
}

/// Reads a u64 from a byte slice at the given offset.
pub fn read_u64_le(data: &[u8], offset: usize) -> Result<u64> {
    let mut cursor = Cursor::new(read_bytes(data, offset, 8)?);
    Ok(cursor.read_u64::<LittleEndian>()?)
}

/// Reads `count` consecutive u32 offsets starting at `start` with the given stride.
pub fn read_offset_array(data: &[u8], start: usize, count: usize, stride: usize) -> Result<Vec<u32>> {
    let mut offsets = Vec::with_capacity(count);
    for i in 0..count {
        offsets.push(read_u32_le(data, start + i * stride)?);
    }
    Ok(offsets)
}

/// Converts a Windows FILETIME (100ns ticks since 1601-01-01 UTC).
pub fn filetime_to_datetime(filetime: u64) -> Option<DateTime<Utc>> {
    let seconds = (filetime / 10_000_000) as i64 - FILETIME_UNIX_DIFF;
    let nanos = ((filetime % 10_000_000) * 100) as u32;
    DateTime::from_timestamp(seconds, nanos)
}

/// True when a stored cell offset points nowhere.
#[inline]
pub fn is_unset(cell_offset: u32) -> bool {
    cell_offset == NO_CELL
}

/// Converts a relative cell offset to an absolute hive offset.
///
/// Cell offsets are relative to the first hive bin at 0x1000.
///
/// # Errors
///
/// Returns `RegistryError::InvalidOffset` if the addition would overflow.
#[inline]
pub fn cell_offset_to_absolute(cell_offset: u32) -> Result<u32> {
    cell_offset
        .checked_add(HBIN_START_OFFSET)
        .ok_or(RegistryError::InvalidOffset {
            offset: cell_offset,
            hive_size: 0,
        })
}

/// Converts an absolute hive offset to a relative cell offset.
///
/// # Errors
///
/// Returns `RegistryError::InvalidFormat` if the offset is before hbin start.
#[inline]
pub fn absolute_to_cell_offset(absolute_offset: u32) -> Result<u32> {
    if absolute_offset < HBIN_START_OFFSET {
        return Err(RegistryError::InvalidFormat(format!(
            "Absolute offset {:#x} is before hbin start",
            absolute_offset
        )));
    }
    Ok(absolute_offset - HBIN_START_OFFSET)
}
