//! Security key (sk) records.
//!
//! Security cells form a doubly linked ring shared by every key that uses the
//! same descriptor. Only the ring links and the reference count are decoded;
//! the descriptor itself is handed out as raw bytes.

use crate::error::{RegistryError, Result};
use crate::utils::{read_bytes, read_u32_le};

const SECURITY_HEADER_SIZE: usize = 0x14;

/// Security key (sk) structure.
#[derive(Debug, Clone)]
pub struct SecurityDescriptor {
    /// Offset of this cell, relative to the first hbin.
    pub offset: u32,

    /// Previous security cell in the ring.
    pub previous_offset: u32,

    /// Next security cell in the ring.
    pub next_offset: u32,

    /// Number of keys referencing this descriptor.
    pub reference_count: u32,

    /// Raw self-relative security descriptor.
    pub descriptor: Vec<u8>,
}

impl SecurityDescriptor {
    /// Parses a security key from cell data.
    pub fn parse(data: &[u8], offset: u32) -> Result<Self> {
        if data.len() < SECURITY_HEADER_SIZE {
            return Err(RegistryError::TruncatedData {
                offset,
                expected: SECURITY_HEADER_SIZE,
                actual: data.len(),
            });
        }

        if &data[0..2] != b"sk" {
            return Err(RegistryError::invalid_signature(b"sk", &data[0..2]));
        }

        let descriptor_size = read_u32_le(data, 0x10)? as usize;
        let descriptor = read_bytes(data, SECURITY_HEADER_SIZE, descriptor_size)
            .map_err(|_| RegistryError::TruncatedData {
                offset,
                expected: SECURITY_HEADER_SIZE + descriptor_size,
                actual: data.len(),
            })?
            .to_vec();

        Ok(Self {
            offset,
            previous_offset: read_u32_le(data, 0x04)?,
            next_offset: read_u32_le(data, 0x08)?,
            reference_count: read_u32_le(data, 0x0C)?,
            descriptor,
        })
    }

    /// True when this cell links only to itself.
    pub fn is_singleton(&self) -> bool {
        self.previous_offset == self.offset && self.next_offset == self.offset
    }
}
