//! Subkey-index parsing (li, lf, lh, ri).
//!
//! `li`, `lf` and `lh` point straight at key cells; `lf`/`lh` add a 4-byte
//! hint per entry that this crate keeps but never consults. `ri` points at
//! other index cells and adds one level of indirection.

use crate::error::{RegistryError, Result};
use crate::utils::read_offset_array;

/// Subkey list types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubkeyListType {
    /// Index leaf (li) - simple list of offsets.
    IndexLeaf,

    /// Fast leaf (lf) - list with 4-byte name hints.
    FastLeaf,

    /// Hash leaf (lh) - list with name hash hints.
    HashLeaf,

    /// Index root (ri) - list of subkey list offsets.
    IndexRoot,
}

impl SubkeyListType {
    /// Parses a subkey list type from a 2-byte signature.
    pub fn from_signature(sig: &[u8; 2]) -> Result<Self> {
        match sig {
            b"li" => Ok(SubkeyListType::IndexLeaf),
            b"lf" => Ok(SubkeyListType::FastLeaf),
            b"lh" => Ok(SubkeyListType::HashLeaf),
            b"ri" => Ok(SubkeyListType::IndexRoot),
            _ => Err(RegistryError::InvalidSubkeyList { list_type: *sig }),
        }
    }

    /// Bytes per entry.
    fn stride(&self) -> usize {
        match self {
            SubkeyListType::IndexLeaf | SubkeyListType::IndexRoot => 4,
            SubkeyListType::FastLeaf | SubkeyListType::HashLeaf => 8,
        }
    }
}

/// Subkey list entry (for lf/lh lists).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubkeyListEntry {
    /// Offset to the key node.
    pub key_offset: u32,

    /// Name hint (first 4 chars for lf, hash for lh).
    pub name_hint: u32,
}

/// Parsed subkey list.
#[derive(Debug, Clone)]
pub enum SubkeyList {
    /// li - simple list of key offsets.
    IndexLeaf(Vec<u32>),

    /// lf - key offsets with name prefixes.
    FastLeaf(Vec<SubkeyListEntry>),

    /// lh - key offsets with name hashes.
    HashLeaf(Vec<SubkeyListEntry>),

    /// ri - offsets of other subkey lists.
    IndexRoot(Vec<u32>),
}

impl SubkeyList {
    /// Parses a subkey list from cell data.
    ///
    /// # Arguments
    ///
    /// * `data` - Cell data (excluding size field).
    /// * `offset` - Offset of this cell for error reporting.
    pub fn parse(data: &[u8], offset: u32) -> Result<Self> {
        if data.len() < 4 {
            return Err(RegistryError::TruncatedData {
                offset,
                expected: 4,
                actual: data.len(),
            });
        }

        let list_type = SubkeyListType::from_signature(&[data[0], data[1]])?;
        let count = u16::from_le_bytes([data[2], data[3]]) as usize;

        let expected_size = 4 + count * list_type.stride();
        if data.len() < expected_size {
            return Err(RegistryError::TruncatedData {
                offset,
                expected: expected_size,
                actual: data.len(),
            });
        }

        let offsets = read_offset_array(data, 4, count, list_type.stride())?;

        Ok(match list_type {
            SubkeyListType::IndexLeaf => SubkeyList::IndexLeaf(offsets),
            SubkeyListType::IndexRoot => SubkeyList::IndexRoot(offsets),
            SubkeyListType::FastLeaf | SubkeyListType::HashLeaf => {
                let hints = read_offset_array(data, 8, count, 8)?;
                let entries = offsets
                    .into_iter()
                    .zip(hints)
                    .map(|(key_offset, name_hint)| SubkeyListEntry {
                        key_offset,
                        name_hint,
                    })
                    .collect();
                if list_type == SubkeyListType::FastLeaf {
                    SubkeyList::FastLeaf(entries)
                } else {
                    SubkeyList::HashLeaf(entries)
                }
            }
        })
    }

    /// Which of the four shapes this is.
    pub fn list_type(&self) -> SubkeyListType {
        match self {
            SubkeyList::IndexLeaf(_) => SubkeyListType::IndexLeaf,
            SubkeyList::FastLeaf(_) => SubkeyListType::FastLeaf,
            SubkeyList::HashLeaf(_) => SubkeyListType::HashLeaf,
            SubkeyList::IndexRoot(_) => SubkeyListType::IndexRoot,
        }
    }

    /// Returns an iterator over the stored offsets.
    ///
    /// For leaves these are key cells; for an index root they are the
    /// offsets of the sublists.
    pub fn offsets(&self) -> impl Iterator<Item = u32> + '_ {
        match self {
            SubkeyList::IndexLeaf(offsets) | SubkeyList::IndexRoot(offsets) => {
                Box::new(offsets.iter().copied()) as Box<dyn Iterator<Item = u32> + '_>
            }
            SubkeyList::FastLeaf(entries) | SubkeyList::HashLeaf(entries) => {
                Box::new(entries.iter().map(|e| e.key_offset))
            }
        }
    }

    /// Returns the number of entries in this list.
    pub fn len(&self) -> usize {
        match self {
            SubkeyList::IndexLeaf(offsets) | SubkeyList::IndexRoot(offsets) => offsets.len(),
            SubkeyList::FastLeaf(entries) | SubkeyList::HashLeaf(entries) => entries.len(),
        }
    }

    /// Returns true if this list is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if this is an index root (contains sublists).
    pub fn is_index_root(&self) -> bool {
        matches!(self, SubkeyList::IndexRoot(_))
    }
}
