//! Registry key node (nk) parsing and representation.
//!
//! The pointer fields of a key node are only meaningful when the matching
//! count or flag says so. The `*_cell` accessors encode that rule and return
//! [`RegistryError::StructureDoesNotExist`] instead of a dangling offset.

use crate::cell::KeyNodeFlags;
use crate::error::{RegistryError, Result};
use crate::utils::{decode_name, is_unset, read_bytes, read_u16_le, read_u32_le, read_u64_le};

/// Minimum size of a key node structure in bytes.
const KEY_NODE_MIN_SIZE: usize = 0x4C;

/// Offset of the key name in the key node structure.
const KEY_NAME_OFFSET: usize = 0x4C;

/// Key node (nk) structure.
#[derive(Debug, Clone)]
pub struct KeyNode {
    /// Offset of this cell, relative to the first hbin.
    pub offset: u32,

    /// Flags for this key.
    pub flags: KeyNodeFlags,

    /// Last written timestamp (Windows FILETIME).
    pub last_written: u64,

    /// Offset to parent key node.
    pub parent_offset: u32,

    /// Number of subkeys.
    pub subkey_count: u32,

    /// Number of volatile subkeys.
    pub volatile_subkey_count: u32,

    /// Offset to subkey list.
    pub subkey_list_offset: u32,

    /// Number of values.
    pub value_count: u32,

    /// Offset to value list.
    pub value_list_offset: u32,

    /// Offset to security descriptor.
    pub security_offset: u32,

    /// Offset to class name.
    pub class_name_offset: u32,

    /// Maximum length of subkey name.
    pub max_subkey_name_len: u32,

    /// Maximum length of value data.
    pub max_value_data_len: u32,

    /// Length of key name.
    pub name_length: u16,

    /// Length of class name.
    pub class_name_length: u16,

    /// Key name.
    pub name: String,

    /// The name was flagged single-byte but stored as UTF-16LE.
    pub name_misflagged: bool,
}

impl KeyNode {
    /// Parses a key node from cell data.
    ///
    /// # Arguments
    ///
    /// * `data` - Cell data (excluding size field, starting with "nk" signature).
    /// * `offset` - Offset of this cell, kept for error reporting.
    ///
    /// # Errors
    ///
    /// Returns an error if the data is malformed or truncated.
    pub fn parse(data: &[u8], offset: u32) -> Result<Self> {
        if data.len() < KEY_NODE_MIN_SIZE {
            return Err(RegistryError::TruncatedData {
                offset,
                expected: KEY_NODE_MIN_SIZE,
                actual: data.len(),
            });
        }

        if &data[0..2] != b"nk" {
            return Err(RegistryError::invalid_signature(b"nk", &data[0..2]));
        }

        let flags = KeyNodeFlags::new(read_u16_le(data, 0x02)?);
        let name_length = read_u16_le(data, 0x48)?;
        let class_name_length = read_u16_le(data, 0x4A)?;

        let name_data = read_bytes(data, KEY_NAME_OFFSET, name_length as usize).map_err(|_| {
            RegistryError::TruncatedData {
                offset,
                expected: KEY_NAME_OFFSET + name_length as usize,
                actual: data.len(),
            }
        })?;
        let (name, name_misflagged) = decode_name(name_data, flags.is_compressed());

        Ok(KeyNode {
            offset,
            flags,
            last_written: read_u64_le(data, 0x04)?,
            parent_offset: read_u32_le(data, 0x10)?,
            subkey_count: read_u32_le(data, 0x14)?,
            volatile_subkey_count: read_u32_le(data, 0x18)?,
            subkey_list_offset: read_u32_le(data, 0x1C)?,
            value_count: read_u32_le(data, 0x24)?,
            value_list_offset: read_u32_le(data, 0x28)?,
            security_offset: read_u32_le(data, 0x2C)?,
            class_name_offset: read_u32_le(data, 0x30)?,
            max_subkey_name_len: read_u32_le(data, 0x34)?,
            max_value_data_len: read_u32_le(data, 0x40)?,
            name_length,
            class_name_length,
            name,
            name_misflagged,
        })
    }

    /// Returns true if this key has subkeys.
    pub fn has_subkeys(&self) -> bool {
        self.subkey_count > 0
    }

    /// Returns true if this key has values.
    pub fn has_values(&self) -> bool {
        self.value_count > 0
    }

    /// Returns true if this is the root key.
    pub fn is_root(&self) -> bool {
        self.flags.is_root()
    }

    /// Offset of the subkey-index cell; absent when the key has no subkeys.
    pub fn subkey_list_cell(&self) -> Result<u32> {
        if !self.has_subkeys() || is_unset(self.subkey_list_offset) {
            return Err(RegistryError::does_not_exist("subkey list", self.offset));
        }
        Ok(self.subkey_list_offset)
    }

    /// Offset of the value-pointer list; absent when the key has no values.
    pub fn value_list_cell(&self) -> Result<u32> {
        if !self.has_values() || is_unset(self.value_list_offset) {
            return Err(RegistryError::does_not_exist("value list", self.offset));
        }
        Ok(self.value_list_offset)
    }

    /// Offset of the parent key; absent for the root.
    pub fn parent_cell(&self) -> Result<u32> {
        if self.is_root() || is_unset(self.parent_offset) {
            return Err(RegistryError::does_not_exist("parent", self.offset));
        }
        Ok(self.parent_offset)
    }

    /// Offset of the class-name cell; absent when unset or zero-length.
    pub fn class_name_cell(&self) -> Result<u32> {
        if self.class_name_length == 0 || is_unset(self.class_name_offset) {
            return Err(RegistryError::does_not_exist("class name", self.offset));
        }
        Ok(self.class_name_offset)
    }

    /// Offset of the security-descriptor cell.
    pub fn security_cell(&self) -> Result<u32> {
        if is_unset(self.security_offset) {
            return Err(RegistryError::does_not_exist("security descriptor", self.offset));
        }
        Ok(self.security_offset)
    }

    /// Last written time as a UTC timestamp.
    pub fn timestamp(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        crate::utils::filetime_to_datetime(self.last_written)
    }
}
