//! Cells, their type tags, and tag-based record dispatch.
//!
//! A cell is a signed-length-prefixed slot inside a hive bin. A negative
//! length marks the cell allocated, a positive one free; the magnitude is the
//! full cell size including the 4-byte length field. Structured cells begin
//! with a 2-byte tag that selects the record decoder. Raw value payloads carry
//! no tag and come back as [`Record::Data`].

use crate::bigdata::BigDataBlock;
use crate::error::{RegistryError, Result};
use crate::key::KeyNode;
use crate::security::SecurityDescriptor;
use crate::subkey_list::SubkeyList;
use crate::value::ValueKey;

/// Cell type signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellType {
    /// Key node (nk) - represents a registry key.
    KeyNode,

    /// Value key (vk) - represents a registry value.
    ValueKey,

    /// Security descriptor (sk).
    Security,

    /// Index leaf (li) - list of subkey offsets.
    IndexLeaf,

    /// Fast leaf (lf) - list of subkeys with name hints.
    FastLeaf,

    /// Hash leaf (lh) - list of subkeys with name hashes.
    HashLeaf,

    /// Index root (ri) - list of subkey list offsets.
    IndexRoot,

    /// Data block (db) - big data indirection header.
    DataBlock,
}

impl CellType {
    /// Parses a cell type from a 2-byte signature; `None` for untagged data.
    pub fn from_signature(sig: &[u8; 2]) -> Option<Self> {
        match sig {
            b"nk" => Some(CellType::KeyNode),
            b"vk" => Some(CellType::ValueKey),
            b"sk" => Some(CellType::Security),
            b"li" => Some(CellType::IndexLeaf),
            b"lf" => Some(CellType::FastLeaf),
            b"lh" => Some(CellType::HashLeaf),
            b"ri" => Some(CellType::IndexRoot),
            b"db" => Some(CellType::DataBlock),
            _ => None,
        }
    }

    /// Returns the 2-byte signature for this cell type.
    pub fn signature(&self) -> &'static [u8; 2] {
        match self {
            CellType::KeyNode => b"nk",
            CellType::ValueKey => b"vk",
            CellType::Security => b"sk",
            CellType::IndexLeaf => b"li",
            CellType::FastLeaf => b"lf",
            CellType::HashLeaf => b"lh",
            CellType::IndexRoot => b"ri",
            CellType::DataBlock => b"db",
        }
    }

    /// Returns true if this cell type represents a subkey list.
    pub fn is_subkey_list(&self) -> bool {
        matches!(
            self,
            CellType::IndexLeaf | CellType::FastLeaf | CellType::HashLeaf | CellType::IndexRoot
        )
    }
}

/// Flags for key nodes.
#[derive(Debug, Clone, Copy)]
pub struct KeyNodeFlags(pub u16);

impl KeyNodeFlags {
    /// Key is volatile (not stored on disk).
    pub const VOLATILE: u16 = 0x0001;

    /// Key is a mount point for another hive.
    pub const HIVE_EXIT: u16 = 0x0002;

    /// Key is the root key.
    pub const ROOT_KEY: u16 = 0x0004;

    /// Key cannot be deleted.
    pub const NO_DELETE: u16 = 0x0008;

    /// Key is a symbolic link.
    pub const SYM_LINK: u16 = 0x0010;

    /// Key name is in compressed format (single byte per character).
    pub const COMP_NAME: u16 = 0x0020;

    /// Key is a predefined handle.
    pub const PREDEF_HANDLE: u16 = 0x0040;

    /// Creates a new KeyNodeFlags from a u16 value.
    pub fn new(flags: u16) -> Self {
        Self(flags)
    }

    /// Returns true if the specified flag is set.
    pub fn has_flag(&self, flag: u16) -> bool {
        (self.0 & flag) != 0
    }

    /// Returns true if the key name is compressed.
    pub fn is_compressed(&self) -> bool {
        self.has_flag(Self::COMP_NAME)
    }

    /// Returns true if this is a volatile key.
    pub fn is_volatile(&self) -> bool {
        self.has_flag(Self::VOLATILE)
    }

    /// Returns true if this is the root key.
    pub fn is_root(&self) -> bool {
        self.has_flag(Self::ROOT_KEY)
    }
}

/// Registry value data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ValueType {
    /// No value type.
    None,

    /// String (null-terminated).
    String,

    /// String with environment variables.
    ExpandString,

    /// Binary data.
    Binary,

    /// 32-bit little-endian integer.
    Dword,

    /// 32-bit big-endian integer.
    DwordBigEndian,

    /// Symbolic link (Unicode).
    Link,

    /// Multiple strings.
    MultiString,

    /// Resource list.
    ResourceList,

    /// Full resource descriptor.
    FullResourceDescriptor,

    /// Resource requirements list.
    ResourceRequirementsList,

    /// 64-bit little-endian integer.
    Qword,

    /// FILETIME timestamp.
    FileTime,

    /// Non-standard value type, carrying the raw type value.
    Unknown(u32),
}

impl ValueType {
    /// Maps a type code; codes outside the Windows table become `Unknown`.
    pub fn from_u32(value: u32) -> Self {
        match value {
            0 => ValueType::None,
            1 => ValueType::String,
            2 => ValueType::ExpandString,
            3 => ValueType::Binary,
            4 => ValueType::Dword,
            5 => ValueType::DwordBigEndian,
            6 => ValueType::Link,
            7 => ValueType::MultiString,
            8 => ValueType::ResourceList,
            9 => ValueType::FullResourceDescriptor,
            10 => ValueType::ResourceRequirementsList,
            11 => ValueType::Qword,
            16 => ValueType::FileTime,
            _ => ValueType::Unknown(value),
        }
    }

    /// Like [`from_u32`](Self::from_u32) but refuses codes it cannot interpret.
    pub fn known(value: u32) -> Result<Self> {
        match Self::from_u32(value) {
            ValueType::Unknown(code) => Err(RegistryError::UnknownValueType(code)),
            known => Ok(known),
        }
    }

    /// Raw type code as stored in the value record.
    pub fn code(&self) -> u32 {
        match self {
            ValueType::None => 0,
            ValueType::String => 1,
            ValueType::ExpandString => 2,
            ValueType::Binary => 3,
            ValueType::Dword => 4,
            ValueType::DwordBigEndian => 5,
            ValueType::Link => 6,
            ValueType::MultiString => 7,
            ValueType::ResourceList => 8,
            ValueType::FullResourceDescriptor => 9,
            ValueType::ResourceRequirementsList => 10,
            ValueType::Qword => 11,
            ValueType::FileTime => 16,
            ValueType::Unknown(value) => *value,
        }
    }

    /// Returns the name of this value type.
    pub fn name(&self) -> String {
        match self {
            ValueType::None => "REG_NONE".to_string(),
            ValueType::String => "REG_SZ".to_string(),
            ValueType::ExpandString => "REG_EXPAND_SZ".to_string(),
            ValueType::Binary => "REG_BINARY".to_string(),
            ValueType::Dword => "REG_DWORD".to_string(),
            ValueType::DwordBigEndian => "REG_DWORD_BIG_ENDIAN".to_string(),
            ValueType::Link => "REG_LINK".to_string(),
            ValueType::MultiString => "REG_MULTI_SZ".to_string(),
            ValueType::ResourceList => "REG_RESOURCE_LIST".to_string(),
            ValueType::FullResourceDescriptor => "REG_FULL_RESOURCE_DESCRIPTOR".to_string(),
            ValueType::ResourceRequirementsList => "REG_RESOURCE_REQUIREMENTS_LIST".to_string(),
            ValueType::Qword => "REG_QWORD".to_string(),
            ValueType::FileTime => "REG_FILETIME".to_string(),
            ValueType::Unknown(value) => format!("REG_UNKNOWN_{:#010x}", value),
        }
    }
}

/// Decoded content of a cell, selected by its type tag.
#[derive(Debug, Clone)]
pub enum Record<'a> {
    /// nk
    KeyNode(KeyNode),
    /// vk
    ValueKey(ValueKey),
    /// sk
    Security(SecurityDescriptor),
    /// li, lf, lh or ri
    SubkeyList(SubkeyList),
    /// db
    BigData(BigDataBlock),
    /// Untagged or unrecognized payload, consumed by whichever record points here.
    Data(&'a [u8]),
}

/// A view of one cell in the hive buffer.
#[derive(Debug, Clone, Copy)]
pub struct Cell<'a> {
    offset: u32,
    raw_size: i32,
    data: &'a [u8],
}

impl<'a> Cell<'a> {
    /// Wraps a cell's payload (the bytes after the size field).
    pub fn new(offset: u32, raw_size: i32, data: &'a [u8]) -> Self {
        Self {
            offset,
            raw_size,
            data,
        }
    }

    /// Offset of the cell, relative to the first hive bin. Identifies the cell.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Signed size field as stored.
    pub fn raw_size(&self) -> i32 {
        self.raw_size
    }

    /// Cell size including the 4-byte size field.
    pub fn size(&self) -> u32 {
        self.raw_size.unsigned_abs()
    }

    /// Free cells carry a positive size.
    pub fn is_free(&self) -> bool {
        self.raw_size > 0
    }

    /// Allocated cells carry a negative size.
    pub fn is_allocated(&self) -> bool {
        self.raw_size < 0
    }

    /// Payload bytes.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// First two payload bytes, if present.
    pub fn tag(&self) -> Option<[u8; 2]> {
        match self.data {
            [a, b, ..] => Some([*a, *b]),
            _ => None,
        }
    }

    /// The recognized cell type, if the tag is one.
    pub fn cell_type(&self) -> Option<CellType> {
        self.tag().and_then(|tag| CellType::from_signature(&tag))
    }

    /// Decodes the payload with the record decoder its tag selects.
    ///
    /// # Errors
    ///
    /// Fails when the tag is recognized but the record is malformed.
    pub fn child(&self) -> Result<Record<'a>> {
        let Some(cell_type) = self.cell_type() else {
            return Ok(Record::Data(self.data));
        };

        Ok(match cell_type {
            CellType::KeyNode => Record::KeyNode(KeyNode::parse(self.data, self.offset)?),
            CellType::ValueKey => Record::ValueKey(ValueKey::parse(self.data, self.offset)?),
            CellType::Security => {
                Record::Security(SecurityDescriptor::parse(self.data, self.offset)?)
            }
            CellType::IndexLeaf | CellType::FastLeaf | CellType::HashLeaf | CellType::IndexRoot => {
                Record::SubkeyList(SubkeyList::parse(self.data, self.offset)?)
            }
            CellType::DataBlock => Record::BigData(BigDataBlock::parse(self.data, self.offset)?),
        })
    }
}
