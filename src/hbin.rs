//! Hive bin (hbin) blocks and the block chain.
//!
//! Hive bins are 4KB-aligned arenas following the base block. Each starts
//! with a 32-byte header and is subdivided into cells. The chain is walked
//! by adding each block's size to its offset; the header's bin-area length
//! bounds the walk even when a size field is wrong.

use crate::cell::Cell;
use crate::error::{RegistryError, Result};
use crate::utils::{read_i32_le, read_u32_le, read_u64_le, HBIN_START_OFFSET};
use tracing::debug;

/// Expected signature for hive bins ("hbin").
pub const HBIN_SIGNATURE: &[u8; 4] = b"hbin";

/// Size of an hbin header.
pub const HBIN_HEADER_SIZE: usize = 0x20;

/// A view of one hive bin inside the hive buffer.
#[derive(Debug, Clone, Copy)]
pub struct HbinBlock<'a> {
    data: &'a [u8],
    offset: usize,
    relative_offset: u32,
    size: u32,
    timestamp: u64,
    hbins_end: usize,
}

impl<'a> HbinBlock<'a> {
    /// Parses the hbin header at absolute `offset` of the hive buffer.
    ///
    /// # Arguments
    ///
    /// * `data` - The whole hive buffer.
    /// * `offset` - Absolute offset of the bin.
    /// * `hbins_end` - Absolute end of the bin area, from the base block.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Data is too small
    /// - Signature is invalid
    /// - The stored offset does not match the bin's position (broken link)
    /// - The size is smaller than a header
    pub fn parse(data: &'a [u8], offset: usize, hbins_end: usize) -> Result<Self> {
        let header = data
            .get(offset..)
            .filter(|rest| rest.len() >= HBIN_HEADER_SIZE)
            .ok_or(RegistryError::TruncatedData {
                offset: offset as u32,
                expected: HBIN_HEADER_SIZE,
                actual: data.len().saturating_sub(offset),
            })?;

        if &header[0..4] != HBIN_SIGNATURE {
            return Err(RegistryError::invalid_signature(HBIN_SIGNATURE, &header[0..4]));
        }

        let relative_offset = read_u32_le(header, 0x04)?;
        let size = read_u32_le(header, 0x08)?;
        let timestamp = read_u64_le(header, 0x14)?;

        let expected_offset = offset.checked_sub(HBIN_START_OFFSET as usize);
        if expected_offset != Some(relative_offset as usize) {
            return Err(RegistryError::InvalidFormat(format!(
                "Hbin offset mismatch at {:#x}: stored {:#x}",
                offset, relative_offset
            )));
        }

        if (size as usize) < HBIN_HEADER_SIZE {
            return Err(RegistryError::InvalidFormat(format!(
                "Hbin at {:#x} has size {:#x}",
                offset, size
            )));
        }

        Ok(Self {
            data,
            offset,
            relative_offset,
            size,
            timestamp,
            hbins_end,
        })
    }

    /// Absolute offset of this bin.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Offset of this bin relative to the first bin, as stored.
    pub fn relative_offset(&self) -> u32 {
        self.relative_offset
    }

    /// Size of this bin including its header.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Bin timestamp (Windows FILETIME); only the first bin sets it.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Absolute offset of the first bin, which relative offsets are based on.
    pub fn first_hbin_offset(&self) -> usize {
        self.offset - self.relative_offset as usize
    }

    /// Re-opens the first bin of the chain.
    pub fn first_hbin(&self) -> Result<HbinBlock<'a>> {
        HbinBlock::parse(self.data, self.first_hbin_offset(), self.hbins_end)
    }

    /// Absolute offset where the following bin starts.
    pub fn next_offset(&self) -> usize {
        self.offset + self.size as usize
    }

    /// True while the following bin starts inside the bin area.
    pub fn has_next(&self) -> bool {
        self.next_offset() < self.hbins_end
    }

    /// Opens the following bin.
    ///
    /// Callers should check [`has_next`](Self::has_next) first; a chain that
    /// is shorter than the header claims fails here.
    pub fn next_block(&self) -> Result<HbinBlock<'a>> {
        HbinBlock::parse(self.data, self.next_offset(), self.hbins_end)
    }

    /// Absolute offset one past this bin's last byte, clamped to the buffer.
    pub fn end_offset(&self) -> usize {
        self.next_offset().min(self.data.len())
    }

    /// Iterates over the cells of this bin.
    pub fn cells(&self) -> HbinCellIterator<'a> {
        HbinCellIterator {
            data: self.data,
            position: self.offset + HBIN_HEADER_SIZE,
            end: self.end_offset(),
        }
    }
}

/// Iterator over cells within an hbin.
///
/// Stops at the end of the bin; a final cell running past the end is treated
/// as the end of the bin.
pub struct HbinCellIterator<'a> {
    data: &'a [u8],
    position: usize,
    end: usize,
}

impl<'a> Iterator for HbinCellIterator<'a> {
    type Item = Result<Cell<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position + 4 > self.end {
            return None;
        }

        let size = match read_i32_le(self.data, self.position) {
            Ok(size) => size,
            Err(e) => {
                self.position = self.end;
                return Some(Err(e));
            }
        };

        if size == 0 {
            return None;
        }

        let cell_offset = (self.position - HBIN_START_OFFSET as usize) as u32;
        let abs_size = size.unsigned_abs() as usize;

        if abs_size < 4 {
            self.position = self.end;
            return Some(Err(RegistryError::invalid_cell_size(size, cell_offset)));
        }

        let cell_end = self.position + abs_size;
        if cell_end > self.end {
            debug!(offset = %format!("{:#x}", cell_offset), "cell runs past end of bin");
            self.position = self.end;
            return None;
        }

        let cell = Cell::new(cell_offset, size, &self.data[self.position + 4..cell_end]);
        self.position = cell_end;
        Some(Ok(cell))
    }
}

/// Iterator over the hbin chain of a hive.
///
/// Yields an error and stops if a link is broken.
pub struct HbinIterator<'a> {
    next: Option<Result<HbinBlock<'a>>>,
}

impl<'a> HbinIterator<'a> {
    /// Starts the walk at the first bin.
    pub fn new(data: &'a [u8], hbins_end: usize) -> Self {
        let first = if hbins_end <= HBIN_START_OFFSET as usize {
            None
        } else {
            Some(HbinBlock::parse(data, HBIN_START_OFFSET as usize, hbins_end))
        };
        Self { next: first }
    }
}

impl<'a> Iterator for HbinIterator<'a> {
    type Item = Result<HbinBlock<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        if let Ok(block) = &current {
            if block.has_next() {
                self.next = Some(block.next_block());
            }
        }
        Some(current)
    }
}
