//! On-disk super-header: the fixed-size structure immediately following the
//! magic/version bytes at the start of an SCDB file (spec.md §4.1).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DbError;
use crate::Result;

pub const MAGIC: [u8; 4] = *b"SCDB";
pub const FORMAT_VERSION: u32 = 0x0000_0010;

/// Size in bytes of the serialized header region (magic + version + fields),
/// padded so the data region always starts on a page boundary regardless of
/// `bincode`'s exact encoding size.
pub const HEADER_REGION_BYTES: u64 = 256;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SuperHeader {
    pub page_size: u32,
    pub created_at_unix: i64,
    pub instance_id: Uuid,
    pub registry_root_offset: u64,
    pub wal_root_offset: u64,
    pub free_extent_root_offset: u64,
    pub data_region_offset: u64,
}

impl SuperHeader {
    pub fn new(page_size: u32, created_at_unix: i64) -> Self {
        Self {
            page_size,
            created_at_unix,
            instance_id: Uuid::new_v4(),
            registry_root_offset: HEADER_REGION_BYTES,
            wal_root_offset: 0,
            free_extent_root_offset: 0,
            data_region_offset: 0,
        }
    }

    /// Serializes magic + version + header fields into a fixed
    /// `HEADER_REGION_BYTES`-sized buffer, zero-padded.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(HEADER_REGION_BYTES as usize);
        buf.extend_from_slice(&MAGIC);
        buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        let encoded = bincode::serialize(self)
            .map_err(|e| DbError::Internal(format!("header encode failed: {e}")))?;
        if encoded.len() + 8 > HEADER_REGION_BYTES as usize {
            return Err(DbError::Internal(
                "super-header encoding exceeds reserved region".to_string(),
            ));
        }
        buf.extend_from_slice(&encoded);
        buf.resize(HEADER_REGION_BYTES as usize, 0);
        Ok(buf)
    }

    /// Parses and validates the magic/version before decoding the rest;
    /// a reader MUST reject any file not starting with "SCDB" (spec.md §4.1).
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < 8 || buf[0..4] != MAGIC {
            return Err(DbError::FormatMismatch(
                "missing SCDB magic bytes".to_string(),
            ));
        }
        let version = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        if version != FORMAT_VERSION {
            return Err(DbError::FormatMismatch(format!(
                "unsupported format version 0x{version:08x}"
            )));
        }
        bincode::deserialize(&buf[8..])
            .map_err(|e| DbError::FormatMismatch(format!("malformed super-header: {e}")))
    }
}
