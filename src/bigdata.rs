//! Big data block (db) parsing and reassembly.
//!
//! Values longer than [`DB_CHUNK_SIZE`] may be split across several data
//! cells. The value record then points at a `db` header, which points at an
//! indirection cell holding a flat array of chunk offsets. Every chunk but
//! the last contributes exactly `DB_CHUNK_SIZE` bytes.

use crate::error::{RegistryError, Result};
use crate::utils::{read_offset_array, read_u16_le, read_u32_le};

/// Bytes carried by each full chunk.
pub const DB_CHUNK_SIZE: usize = 0x3FD8;

/// Big data block header structure.
///
/// Format:
/// ```text
/// Offset  Size  Description
/// 0x00    2     Signature ("db")
/// 0x02    2     Number of segments
/// 0x04    4     Offset to segment list
/// ```
#[derive(Debug, Clone)]
pub struct BigDataBlock {
    /// Offset of this cell, relative to the first hbin.
    pub offset: u32,

    /// Number of data segments
    pub segment_count: u16,

    /// Offset to the list of segment offsets
    pub segment_list_offset: u32,
}

impl BigDataBlock {
    /// Minimum size of a big data block header
    const MIN_SIZE: usize = 8;

    /// Parses a big data block header from cell data.
    ///
    /// # Arguments
    ///
    /// * `data` - Cell data (excluding size field, starting with "db" signature)
    /// * `offset` - Offset of this cell for error reporting
    ///
    /// # Errors
    ///
    /// Returns an error if the data is malformed or truncated.
    pub fn parse(data: &[u8], offset: u32) -> Result<Self> {
        if data.len() < Self::MIN_SIZE {
            return Err(RegistryError::TruncatedData {
                offset,
                expected: Self::MIN_SIZE,
                actual: data.len(),
            });
        }

        if &data[0..2] != b"db" {
            return Err(RegistryError::invalid_signature(b"db", &data[0..2]));
        }

        Ok(BigDataBlock {
            offset,
            segment_count: read_u16_le(data, 0x02)?,
            segment_list_offset: read_u32_le(data, 0x04)?,
        })
    }

    /// Number of chunks needed to carry `length` bytes.
    pub fn chunk_count(length: usize) -> usize {
        (length + DB_CHUNK_SIZE - 1) / DB_CHUNK_SIZE
    }

    /// Reads the first `count` chunk offsets from the indirection cell.
    pub fn segment_offsets(&self, list_data: &[u8], count: usize) -> Result<Vec<u32>> {
        if list_data.len() < count * 4 {
            return Err(RegistryError::TruncatedData {
                offset: self.segment_list_offset,
                expected: count * 4,
                actual: list_data.len(),
            });
        }
        read_offset_array(list_data, 0, count, 4)
    }
}

/// Concatenates chunks until exactly `length` bytes are collected.
///
/// `read_segment` resolves a chunk offset to that cell's payload. Each chunk
/// contributes `DB_CHUNK_SIZE` bytes, the last one only the remainder.
///
/// # Errors
///
/// Fails if there are fewer segments than the length requires or a chunk cell
/// is shorter than the bytes it must contribute.
pub fn reassemble<'a, F>(segments: &[u32], length: usize, mut read_segment: F) -> Result<Vec<u8>>
where
    F: FnMut(u32) -> Result<&'a [u8]>,
{
    let needed = BigDataBlock::chunk_count(length);
    if segments.len() < needed {
        return Err(RegistryError::format_error(format!(
            "big data needs {} segments for {} bytes, found {}",
            needed,
            length,
            segments.len()
        )));
    }

    let mut data = Vec::with_capacity(length);
    for &segment in &segments[..needed] {
        let take = (length - data.len()).min(DB_CHUNK_SIZE);
        let chunk = read_segment(segment)?;
        if chunk.len() < take {
            return Err(RegistryError::TruncatedData {
                offset: segment,
                expected: take,
                actual: chunk.len(),
            });
        }
        data.extend_from_slice(&chunk[..take]);
    }

    Ok(data)
}
