//! Error types for hive decoding and tree navigation.
//!
//! Three classes of failure are kept apart:
//!
//! - parse failures (bad magic, out-of-bounds offsets, malformed structural
//!   headers) which are fatal for the one structure being built;
//! - [`RegistryError::StructureDoesNotExist`], the expected "this optional
//!   structure is absent" condition (no values, no subkeys, no class name,
//!   no parent for the root);
//! - lookup misses ([`RegistryError::KeyNotFound`], [`RegistryError::ValueNotFound`]).

use std::io;
use thiserror::Error;

/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Errors that can occur while decoding a hive.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// I/O error occurred while reading the hive file.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid magic signature in header or structure.
    #[error("Invalid signature: expected {expected:?}, found {found:?}")]
    InvalidSignature {
        /// Signature the decoder was looking for.
        expected: Vec<u8>,
        /// Bytes actually present.
        found: Vec<u8>,
    },

    /// Malformed structural data.
    #[error("Invalid hive format: {0}")]
    InvalidFormat(String),

    /// Cell offset is out of bounds.
    #[error("Invalid cell offset: {offset:#x} (hive size: {hive_size:#x})")]
    InvalidOffset {
        /// Offending offset, relative to the first hive bin.
        offset: u32,
        /// Size of the backing buffer.
        hive_size: usize,
    },

    /// Cell size is invalid or corrupted.
    #[error("Invalid cell size: {size} at offset {offset:#x}")]
    InvalidCellSize {
        /// Raw signed size field.
        size: i32,
        /// Offset of the cell, relative to the first hive bin.
        offset: u32,
    },

    /// Hive is too small to be valid.
    #[error("Hive too small: {size} bytes (minimum: {minimum} bytes)")]
    HiveTooSmall {
        /// Actual size.
        size: usize,
        /// Minimum acceptable size.
        minimum: usize,
    },

    /// Data truncated or incomplete.
    #[error("Truncated data at offset {offset:#x}: expected {expected} bytes, got {actual} bytes")]
    TruncatedData {
        /// Offset of the structure being read.
        offset: u32,
        /// Bytes required.
        expected: usize,
        /// Bytes available.
        actual: usize,
    },

    /// Subkey-index cell carries a tag that is not li/lf/lh/ri.
    #[error("Invalid subkey list type: {list_type:?}")]
    InvalidSubkeyList {
        /// The tag that was found.
        list_type: [u8; 2],
    },

    /// An optional structure is absent (checked via the owning record's counts).
    #[error("Structure does not exist: {0}")]
    StructureDoesNotExist(String),

    /// A key path segment could not be resolved.
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// A value name could not be resolved on a key.
    #[error("Value not found: {0}")]
    ValueNotFound(String),

    /// The value type is not one this crate knows how to interpret.
    #[error("Unknown value type: {0:#x}")]
    UnknownValueType(u32),
}

impl RegistryError {
    /// Creates an invalid signature error with context.
    pub fn invalid_signature(expected: &[u8], found: &[u8]) -> Self {
        Self::InvalidSignature {
            expected: expected.to_vec(),
            found: found.to_vec(),
        }
    }

    /// Creates an invalid offset error with context.
    pub fn invalid_offset(offset: u32, hive_size: usize) -> Self {
        Self::InvalidOffset { offset, hive_size }
    }

    /// Creates an invalid cell size error with context.
    pub fn invalid_cell_size(size: i32, offset: u32) -> Self {
        Self::InvalidCellSize { size, offset }
    }

    /// Creates a format error with detailed context.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use hive_reader::error::RegistryError;
    /// let offset = 0x1020;
    /// let err = RegistryError::format_error(
    ///     format!("nested index root at offset {:#x}", offset)
    /// );
    /// ```
    pub fn format_error(message: String) -> Self {
        Self::InvalidFormat(message)
    }

    /// Creates the "optional structure is absent" condition.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use hive_reader::error::RegistryError;
    /// let err = RegistryError::does_not_exist("value list", 0x20);
    /// assert!(err.is_missing_structure());
    /// ```
    pub fn does_not_exist(what: &str, key_offset: u32) -> Self {
        Self::StructureDoesNotExist(format!("{} of key at {:#x}", what, key_offset))
    }

    /// Creates a lookup miss for a key or a value.
    pub fn not_found(item_type: &str, name: &str) -> Self {
        if item_type.eq_ignore_ascii_case("value") {
            Self::ValueNotFound(name.to_string())
        } else {
            Self::KeyNotFound(name.to_string())
        }
    }

    /// True for the expected "optional structure absent" condition.
    pub fn is_missing_structure(&self) -> bool {
        matches!(self, Self::StructureDoesNotExist(_))
    }

    /// True for key or value lookup misses.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::KeyNotFound(_) | Self::ValueNotFound(_))
    }
}
