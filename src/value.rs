//! Registry value (vk) parsing and typed data decoding.

use crate::cell::ValueType;
use crate::error::{RegistryError, Result};
use crate::utils::{
    decode_name, decode_utf16le, filetime_to_datetime, is_unset, read_i32_le, read_offset_array,
    read_u16_le, read_u32_le, read_u64_le,
};
use byteorder::{BigEndian, ReadBytesExt};
use encoding_rs::UTF_16LE;
use std::fmt;
use std::io::Cursor;

/// Set in the raw length field when the data lives in the data-offset field.
pub const INLINE_DATA_FLAG: u32 = 0x8000_0000;

/// Largest payload stored in a single data cell; bigger values may use a
/// big-data (db) indirection.
pub const BIG_DATA_THRESHOLD: u32 = 0x3FD8;

const VALUE_KEY_MIN_SIZE: usize = 0x14;

const VALUE_NAME_OFFSET: usize = 0x14;

/// Value flag: name is stored single-byte.
const VALUE_COMP_NAME: u16 = 0x0001;

/// Where a value's bytes are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataStorage {
    /// Zero length or no data cell.
    Empty,
    /// Up to four bytes kept in the data-offset field itself.
    Inline,
    /// A separate cell, possibly a big-data header.
    Cell,
}

/// Value key (vk) structure.
#[derive(Debug, Clone)]
pub struct ValueKey {
    /// Offset of this cell, relative to the first hbin.
    pub offset: u32,

    /// Length of value name; zero for the unnamed default value.
    pub name_length: u16,

    /// Raw length field, including the inline flag.
    pub raw_data_length: u32,

    /// Length of value data.
    pub data_length: u32,

    /// Offset to value data (or inline data).
    pub data_offset: u32,

    /// Value data type.
    pub data_type: ValueType,

    /// Flags (0x0001 = name is single-byte).
    pub flags: u16,

    /// Value name; "(default)" when unnamed.
    pub name: String,

    /// The name was flagged single-byte but stored as UTF-16LE.
    pub name_misflagged: bool,
}

impl ValueKey {
    /// Parses a value key from cell data.
    ///
    /// # Arguments
    ///
    /// * `data` - Cell data (excluding size field, starting with "vk" signature).
    /// * `offset` - Offset of this cell for error reporting.
    ///
    /// # Errors
    ///
    /// Returns an error if the data is malformed or truncated.
    pub fn parse(data: &[u8], offset: u32) -> Result<Self> {
        if data.len() < VALUE_KEY_MIN_SIZE {
            return Err(RegistryError::TruncatedData {
                offset,
                expected: VALUE_KEY_MIN_SIZE,
                actual: data.len(),
            });
        }

        if &data[0..2] != b"vk" {
            return Err(RegistryError::invalid_signature(b"vk", &data[0..2]));
        }

        let name_length = read_u16_le(data, 0x02)?;
        let raw_data_length = read_i32_le(data, 0x04)? as u32;
        let data_offset = read_u32_le(data, 0x08)?;
        let data_type = ValueType::from_u32(read_u32_le(data, 0x0C)?);
        let flags = read_u16_le(data, 0x10)?;

        let (name, name_misflagged) = if name_length > 0 {
            let name_end = VALUE_NAME_OFFSET + name_length as usize;
            let name_data = data.get(VALUE_NAME_OFFSET..name_end).ok_or(
                RegistryError::TruncatedData {
                    offset,
                    expected: name_end,
                    actual: data.len(),
                },
            )?;
            decode_name(name_data, flags & VALUE_COMP_NAME != 0)
        } else {
            (String::from("(default)"), false)
        };

        Ok(ValueKey {
            offset,
            name_length,
            raw_data_length,
            data_length: raw_data_length & !INLINE_DATA_FLAG,
            data_offset,
            data_type,
            flags,
            name,
            name_misflagged,
        })
    }

    /// True for the unnamed default value.
    pub fn is_default(&self) -> bool {
        self.name_length == 0
    }

    /// Where the data bytes live.
    pub fn storage(&self) -> DataStorage {
        if self.raw_data_length & INLINE_DATA_FLAG != 0 {
            DataStorage::Inline
        } else if self.data_length == 0 || is_unset(self.data_offset) {
            DataStorage::Empty
        } else {
            DataStorage::Cell
        }
    }

    /// Returns true if the data is stored inline (in the data_offset field).
    pub fn is_inline_data(&self) -> bool {
        self.storage() == DataStorage::Inline
    }

    /// Extracts inline data; at most four bytes exist.
    pub fn inline_data(&self) -> Vec<u8> {
        let bytes = self.data_offset.to_le_bytes();
        let len = (self.data_length as usize).min(bytes.len());
        bytes[..len].to_vec()
    }

    /// True when the length is large enough for a big-data indirection.
    pub fn may_use_big_data(&self) -> bool {
        self.data_length > BIG_DATA_THRESHOLD
    }
}

/// A key's value-pointer list: a flat array of value cell offsets.
#[derive(Debug, Clone)]
pub struct ValueList {
    /// Offsets of the vk cells, in stored order.
    pub offsets: Vec<u32>,
}

impl ValueList {
    /// Parses `count` offsets from a value-list cell.
    pub fn parse(data: &[u8], count: u32, offset: u32) -> Result<Self> {
        let expected = count as usize * 4;
        if data.len() < expected {
            return Err(RegistryError::TruncatedData {
                offset,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            offsets: read_offset_array(data, 0, count as usize, 4)?,
        })
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// True when the list holds no entries.
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}

/// Parsed registry value data.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ValueData {
    /// REG_NONE; bytes kept as stored.
    None(Vec<u8>),

    /// String value.
    String(String),

    /// Expandable string value.
    ExpandString(String),

    /// Binary data.
    Binary(Vec<u8>),

    /// 32-bit integer.
    Dword(u32),

    /// 32-bit big-endian integer.
    DwordBigEndian(u32),

    /// Multiple strings.
    MultiString(Vec<String>),

    /// 64-bit integer.
    Qword(u64),

    /// Raw FILETIME.
    FileTime(u64),

    /// Link and resource-descriptor types: known but not interpreted.
    Uninterpreted {
        /// Declared type.
        value_type: ValueType,
        /// Raw bytes.
        data: Vec<u8>,
    },

    /// Type code outside the Windows table.
    Unknown {
        /// Declared type code.
        type_code: u32,
        /// Raw bytes.
        data: Vec<u8>,
    },
}

impl ValueData {
    /// Decodes raw value bytes according to the value type.
    ///
    /// # Arguments
    ///
    /// * `data` - Raw value data bytes, already cut to the declared length.
    /// * `value_type` - Type of the value.
    /// * `offset` - Offset of the owning value record, for error reporting.
    ///
    /// # Errors
    ///
    /// Only the fixed-width integer types fail, when fewer bytes are present
    /// than the type needs. String anomalies decode lossily.
    pub fn parse(data: &[u8], value_type: ValueType, offset: u32) -> Result<Self> {
        let too_short = |expected: usize| RegistryError::TruncatedData {
            offset,
            expected,
            actual: data.len(),
        };

        Ok(match value_type {
            ValueType::None => ValueData::None(data.to_vec()),
            ValueType::String => ValueData::String(decode_utf16le(data)),
            ValueType::ExpandString => ValueData::ExpandString(decode_utf16le(data)),
            ValueType::Binary => ValueData::Binary(data.to_vec()),
            ValueType::Dword => {
                ValueData::Dword(read_u32_le(data, 0).map_err(|_| too_short(4))?)
            }
            ValueType::DwordBigEndian => {
                if data.len() < 4 {
                    return Err(too_short(4));
                }
                let mut cursor = Cursor::new(data);
                ValueData::DwordBigEndian(cursor.read_u32::<BigEndian>()?)
            }
            ValueType::Qword => {
                ValueData::Qword(read_u64_le(data, 0).map_err(|_| too_short(8))?)
            }
            ValueType::FileTime => {
                ValueData::FileTime(read_u64_le(data, 0).map_err(|_| too_short(8))?)
            }
            ValueType::MultiString => ValueData::MultiString(decode_multi_string(data)),
            ValueType::Link
            | ValueType::ResourceList
            | ValueType::FullResourceDescriptor
            | ValueType::ResourceRequirementsList => ValueData::Uninterpreted {
                value_type,
                data: data.to_vec(),
            },
            ValueType::Unknown(type_code) => ValueData::Unknown {
                type_code,
                data: data.to_vec(),
            },
        })
    }

    /// The integer payload of DWORD/QWORD values.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            ValueData::Dword(d) | ValueData::DwordBigEndian(d) => Some(u64::from(*d)),
            ValueData::Qword(q) => Some(*q),
            _ => None,
        }
    }

    /// The text of string values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ValueData::String(s) | ValueData::ExpandString(s) => Some(s),
            _ => None,
        }
    }

    /// REG_FILETIME as a UTC timestamp.
    pub fn as_datetime(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        match self {
            ValueData::FileTime(ft) => filetime_to_datetime(*ft),
            _ => None,
        }
    }
}

/// Splits a REG_MULTI_SZ payload; empty entries (including the final
/// terminator pair) are dropped.
fn decode_multi_string(data: &[u8]) -> Vec<String> {
    let mut bytes = data.to_vec();
    if bytes.len() % 2 != 0 {
        bytes.push(0);
    }
    let (decoded, _had_errors) = UTF_16LE.decode_without_bom_handling(&bytes);
    decoded
        .split('\0')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl fmt::Display for ValueData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueData::None(b) if b.is_empty() => write!(f, "(none)"),
            ValueData::String(s) | ValueData::ExpandString(s) => write!(f, "{}", s),
            ValueData::Dword(d) | ValueData::DwordBigEndian(d) => write!(f, "{} (0x{:08X})", d, d),
            ValueData::Qword(q) => write!(f, "{} (0x{:016X})", q, q),
            ValueData::FileTime(ft) => match filetime_to_datetime(*ft) {
                Some(dt) => write!(f, "{}", dt.to_rfc3339()),
                None => write!(f, "0x{:016X}", ft),
            },
            ValueData::MultiString(strings) => write!(f, "{}", strings.join(", ")),
            ValueData::None(b)
            | ValueData::Binary(b)
            | ValueData::Uninterpreted { data: b, .. }
            | ValueData::Unknown { data: b, .. } => write!(f, "{}", hex::encode(b)),
        }
    }
}
