//! Stream Header
//!
//! Fixed 128-byte header at offset 0 of every clustered stream.

use crate::config::{ContainerConfig, Endianness, StreamPolicy};
use crate::error::{Result, StreamKvError};

use super::{END_OF_CHAIN, EXTENSION_OFFSET, EXTENSION_SIZE, FORMAT_VERSION, HEADER_SIZE, MAGIC};

/// Bytes covered by the header CRC before the extension region
const CRC_COVERED: usize = 48;

/// Offset of the header CRC
const CRC_OFFSET: usize = 48;

/// Decoded stream header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHeader {
    /// Byte order of every integer in the stream
    pub endianness: Endianness,
    /// Policy flags fixed at creation
    pub policy: StreamPolicy,
    /// Format version
    pub version: u16,
    /// Data bytes per cluster
    pub cluster_size: u32,
    /// Records owned by metadata providers
    pub reserved_records: u32,
    /// Total records, reserved ones included
    pub record_count: u64,
    /// Clusters ever allocated (live + free)
    pub cluster_count: u64,
    /// Head of the free-cluster list
    pub free_head: u64,
    /// First cluster of the descriptor table
    pub table_head: u64,
    /// Opaque bytes owned by callers (e.g. a Merkle root)
    pub extension: [u8; EXTENSION_SIZE],
}

impl StreamHeader {
    /// Fresh header for an empty stream
    pub fn new(config: &ContainerConfig) -> Self {
        Self {
            endianness: config.endianness,
            policy: config.policy,
            version: FORMAT_VERSION,
            cluster_size: config.cluster_size,
            reserved_records: config.reserved_slots,
            record_count: 0,
            cluster_count: 0,
            free_head: END_OF_CHAIN,
            table_head: END_OF_CHAIN,
            extension: [0u8; EXTENSION_SIZE],
        }
    }

    /// Records available to the application
    pub fn data_records(&self) -> u64 {
        self.record_count.saturating_sub(self.reserved_records as u64)
    }

    /// Encode to the on-disk layout
    ///
    /// ```text
    /// 0..4    magic "SKVS"
    /// 4       endianness
    /// 5       policy flags
    /// 6..8    version
    /// 8..12   cluster size
    /// 12..16  reserved records
    /// 16..24  record count
    /// 24..32  cluster count
    /// 32..40  free-cluster head
    /// 40..48  descriptor-table head
    /// 48..52  CRC32 of [0..48] ++ extension
    /// 64..128 extension region
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE as usize] {
        let e = self.endianness;
        let mut buf = [0u8; HEADER_SIZE as usize];

        buf[0..4].copy_from_slice(MAGIC);
        buf[4] = e.to_byte();
        buf[5] = self.policy.to_byte();
        buf[6..8].copy_from_slice(&e.u16_bytes(self.version));
        buf[8..12].copy_from_slice(&e.u32_bytes(self.cluster_size));
        buf[12..16].copy_from_slice(&e.u32_bytes(self.reserved_records));
        buf[16..24].copy_from_slice(&e.u64_bytes(self.record_count));
        buf[24..32].copy_from_slice(&e.u64_bytes(self.cluster_count));
        buf[32..40].copy_from_slice(&e.u64_bytes(self.free_head));
        buf[40..48].copy_from_slice(&e.u64_bytes(self.table_head));
        buf[EXTENSION_OFFSET..].copy_from_slice(&self.extension);

        let crc = Self::compute_crc(&buf);
        buf[CRC_OFFSET..CRC_OFFSET + 4].copy_from_slice(&e.u32_bytes(crc));

        buf
    }

    /// Decode and validate a header
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE as usize {
            return Err(StreamKvError::Corruption(format!(
                "Header too short: expected {} bytes, got {}",
                HEADER_SIZE,
                buf.len()
            )));
        }

        if &buf[0..4] != MAGIC {
            return Err(StreamKvError::Corruption(format!(
                "Invalid stream magic: expected SKVS, got {:?}",
                &buf[0..4]
            )));
        }

        let endianness = Endianness::from_byte(buf[4]).ok_or_else(|| {
            StreamKvError::Corruption(format!("Unknown endianness byte: {}", buf[4]))
        })?;
        let e = endianness;

        let version = e.read_u16(&buf[6..8]);
        if version != FORMAT_VERSION {
            return Err(StreamKvError::Corruption(format!(
                "Unsupported stream version: {}",
                version
            )));
        }

        let stored_crc = e.read_u32(&buf[CRC_OFFSET..CRC_OFFSET + 4]);
        let computed_crc = Self::compute_crc(buf);
        if stored_crc != computed_crc {
            return Err(StreamKvError::Corruption(format!(
                "Header CRC mismatch: stored {:#010x}, computed {:#010x}",
                stored_crc, computed_crc
            )));
        }

        let mut extension = [0u8; EXTENSION_SIZE];
        extension.copy_from_slice(&buf[EXTENSION_OFFSET..EXTENSION_OFFSET + EXTENSION_SIZE]);

        Ok(Self {
            endianness,
            policy: StreamPolicy::from_byte(buf[5]),
            version,
            cluster_size: e.read_u32(&buf[8..12]),
            reserved_records: e.read_u32(&buf[12..16]),
            record_count: e.read_u64(&buf[16..24]),
            cluster_count: e.read_u64(&buf[24..32]),
            free_head: e.read_u64(&buf[32..40]),
            table_head: e.read_u64(&buf[40..48]),
            extension,
        })
    }

    fn compute_crc(buf: &[u8]) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&buf[..CRC_COVERED]);
        hasher.update(&buf[EXTENSION_OFFSET..EXTENSION_OFFSET + EXTENSION_SIZE]);
        hasher.finalize()
    }
}
