//! Registry hive base block (header) parsing.
//!
//! The base block is the first 4096 bytes (0x1000) of a hive file. It holds
//! the format version, the hive name and the two entry points into the hive
//! bins: the root key cell and the total length of the bin area.

use crate::error::{RegistryError, Result};
use crate::utils::{decode_utf16le, filetime_to_datetime, read_bytes, read_u32_le, read_u64_le};
use std::fmt;

/// Size of the base block in bytes.
pub const BASE_BLOCK_SIZE: usize = 4096;

/// Expected signature for a valid registry hive ("regf").
pub const REGF_SIGNATURE: &[u8; 4] = b"regf";

const FILE_NAME_OFFSET: usize = 0x30;

/// 64 bytes of UTF-16LE.
const FILE_NAME_LENGTH: usize = 64;

const CHECKSUM_OFFSET: usize = 0x1FC;

/// Well-known hive kinds, inferred from the embedded hive name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum HiveType {
    /// Per-user profile hive.
    NtUser,
    /// Security Accounts Manager.
    Sam,
    /// LSA security policy.
    Security,
    /// Machine-wide software configuration.
    Software,
    /// Machine-wide system configuration.
    System,
    /// Per-user classes hive.
    UsrClass,
    /// Boot configuration data.
    Bcd,
    /// Component store.
    Components,
    /// Default user profile.
    Default,
    /// System cache hive.
    Syscache,
    /// Application compatibility cache.
    Amcache,
    /// Name did not match any known hive.
    Unknown,
}

impl HiveType {
    /// Classifies a hive by the trailing component of its embedded name.
    pub fn from_hive_name(name: &str) -> Self {
        let name = name.to_ascii_lowercase();
        let last = name
            .rsplit(['\\', '/'])
            .next()
            .unwrap_or(name.as_str());
        match last {
            "ntuser.dat" => HiveType::NtUser,
            "sam" => HiveType::Sam,
            "security" => HiveType::Security,
            "software" => HiveType::Software,
            "system" => HiveType::System,
            "usrclass.dat" => HiveType::UsrClass,
            "bcd" => HiveType::Bcd,
            "components" => HiveType::Components,
            "default" => HiveType::Default,
            "syscache.hve" => HiveType::Syscache,
            "amcache.hve" => HiveType::Amcache,
            _ => HiveType::Unknown,
        }
    }
}

/// Registry hive base block header.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BaseBlock {
    /// Signature, always "regf".
    pub signature: [u8; 4],

    /// Primary sequence number.
    pub primary_sequence: u32,

    /// Secondary sequence number.
    pub secondary_sequence: u32,

    /// Last written timestamp (Windows FILETIME).
    pub last_written: u64,

    /// Major version of the hive format.
    pub major_version: u32,

    /// Minor version of the hive format.
    pub minor_version: u32,

    /// File type (0 = primary, 1 = transaction log).
    pub file_type: u32,

    /// File format (1 = direct memory load).
    pub file_format: u32,

    /// Offset to root key cell (relative to first hbin).
    pub root_cell_offset: u32,

    /// Length of the hive bin area; the block chain ends at
    /// `BASE_BLOCK_SIZE + hive_length`.
    pub hive_length: u32,

    /// Clustering factor (always 1).
    pub clustering_factor: u32,

    /// Embedded hive name.
    pub file_name: String,

    /// Stored header checksum. Read for display, never verified.
    pub checksum: u32,
}

impl BaseBlock {
    /// Parses a base block from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the data is shorter than a base block or the
    /// signature is not "regf". Sequence or version anomalies are left to the
    /// caller to report.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < BASE_BLOCK_SIZE {
            return Err(RegistryError::HiveTooSmall {
                size: data.len(),
                minimum: BASE_BLOCK_SIZE,
            });
        }

        let mut signature = [0u8; 4];
        signature.copy_from_slice(&data[0..4]);

        if &signature != REGF_SIGNATURE {
            return Err(RegistryError::invalid_signature(REGF_SIGNATURE, &signature));
        }

        let file_name = decode_utf16le(read_bytes(data, FILE_NAME_OFFSET, FILE_NAME_LENGTH)?);

        Ok(BaseBlock {
            signature,
            primary_sequence: read_u32_le(data, 0x04)?,
            secondary_sequence: read_u32_le(data, 0x08)?,
            last_written: read_u64_le(data, 0x0C)?,
            major_version: read_u32_le(data, 0x14)?,
            minor_version: read_u32_le(data, 0x18)?,
            file_type: read_u32_le(data, 0x1C)?,
            file_format: read_u32_le(data, 0x20)?,
            root_cell_offset: read_u32_le(data, 0x24)?,
            hive_length: read_u32_le(data, 0x28)?,
            clustering_factor: read_u32_le(data, 0x2C)?,
            file_name,
            checksum: read_u32_le(data, CHECKSUM_OFFSET)?,
        })
    }

    /// Returns true if the hive is in a consistent state.
    ///
    /// The hive is consistent when primary and secondary sequence numbers match.
    pub fn is_consistent(&self) -> bool {
        self.primary_sequence == self.secondary_sequence
    }

    /// Returns true for the format versions seen in the wild (1.3 to 1.6).
    pub fn is_known_version(&self) -> bool {
        self.major_version == 1 && (3..=6).contains(&self.minor_version)
    }

    /// Kind of hive, inferred from the embedded name.
    pub fn hive_type(&self) -> HiveType {
        HiveType::from_hive_name(&self.file_name)
    }

    /// Absolute offset one past the last hive bin.
    pub fn hbins_end(&self) -> usize {
        BASE_BLOCK_SIZE + self.hive_length as usize
    }

    /// Converts the last written timestamp to a human-readable format.
    pub fn last_written_datetime(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        filetime_to_datetime(self.last_written)
    }
}

impl fmt::Display for BaseBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Registry Hive Header:\n\
             - Version: {}.{}\n\
             - Root Cell Offset: {:#x}\n\
             - Hive Length: {} bytes\n\
             - Consistent: {}\n\
             - File Name: {}",
            self.major_version,
            self.minor_version,
            self.root_cell_offset,
            self.hive_length,
            self.is_consistent(),
            self.file_name
        )
    }
}
