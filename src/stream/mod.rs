//! Slot Stream Module
//!
//! Block-structured byte stream providing record-level storage.
//!
//! ## Responsibilities
//! - Dense, index-addressed records with a fixed-size descriptor each
//! - Variable-length record bytes stored in cluster chains
//! - Growth, in-place rewrite, shifting insert/remove
//! - A small header extension region owned by callers
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Header (128 bytes)                                      │
//! │   Magic "SKVS" | Endian | Policy | Version | Sizes ...  │
//! │   CRC32 (4) | Extension region (64)                     │
//! ├─────────────────────────────────────────────────────────┤
//! │ Cluster 0                                               │
//! │   [Next: u64][Data: cluster_size]                       │
//! ├─────────────────────────────────────────────────────────┤
//! │ Cluster 1 ...                                           │
//! │   (Next = u64::MAX ends a chain)                        │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Record descriptors (32 bytes each) live contiguously in their own
//! cluster chain, the descriptor table:
//! ```text
//! ┌──────────┬───────────┬──────────┬─────────┬──────────┬──────────────┐
//! │Traits (4)│Checksum(4)│KeyLen (4)│ Pad (4) │Length (8)│FirstCluster 8│
//! └──────────┴───────────┴──────────┴─────────┴──────────┴──────────────┘
//! ```
//! A record's chain holds `[inline key][value]`; `KeyLen` splits them.

mod clustered;
mod header;

pub use clustered::ClusteredStream;
pub use header::StreamHeader;

use std::fmt;
use std::ops::BitOr;

use crate::error::Result;

// =============================================================================
// Shared Constants
// =============================================================================

/// Magic bytes identifying a streamkv stream
pub(crate) const MAGIC: &[u8; 4] = b"SKVS";

/// Current stream format version
pub(crate) const FORMAT_VERSION: u16 = 1;

/// Header size in bytes
pub const HEADER_SIZE: u64 = 128;

/// Start of the caller-owned extension region inside the header
pub const EXTENSION_OFFSET: usize = 64;

/// Size of the caller-owned extension region
pub const EXTENSION_SIZE: usize = 64;

/// Per-cluster header: next pointer (8)
pub(crate) const CLUSTER_HEADER_SIZE: u64 = 8;

/// On-disk record descriptor size
pub(crate) const DESCRIPTOR_SIZE: u64 = 32;

/// Sentinel terminating a cluster chain
pub(crate) const END_OF_CHAIN: u64 = u64::MAX;

// =============================================================================
// Slot Traits
// =============================================================================

/// Per-slot lifecycle bitset
#[derive(Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct SlotTraits(u32);

impl SlotTraits {
    pub const NONE: Self = Self(0);
    /// Slot holds a live item
    pub const USED: Self = Self(1 << 0);
    /// Slot was deleted and awaits reuse or compaction
    pub const REAPED: Self = Self(1 << 1);
    /// Slot holds an absent (null) item
    pub const NULL: Self = Self(1 << 2);
    /// Checksum field is meaningful
    pub const CHECKSUMMED: Self = Self(1 << 3);
    /// Record bytes start with an inline key
    pub const KEYED: Self = Self(1 << 4);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl BitOr for SlotTraits {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for SlotTraits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::USED, "USED"),
            (Self::REAPED, "REAPED"),
            (Self::NULL, "NULL"),
            (Self::CHECKSUMMED, "CHECKSUMMED"),
            (Self::KEYED, "KEYED"),
        ];
        let set: Vec<&str> = names
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        if set.is_empty() {
            write!(f, "SlotTraits(NONE)")
        } else {
            write!(f, "SlotTraits({})", set.join(" | "))
        }
    }
}

// =============================================================================
// Slot Descriptor
// =============================================================================

/// Public view of a record descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SlotDescriptor {
    /// Lifecycle traits
    pub traits: SlotTraits,
    /// Projected key checksum (meaningful when CHECKSUMMED)
    pub checksum: i32,
    /// Length of the inline key prefix
    pub key_len: u32,
    /// Total record bytes (key + value)
    pub length: u64,
}

impl SlotDescriptor {
    /// Live item (null or not)
    pub fn is_live(&self) -> bool {
        self.traits.contains(SlotTraits::USED) && !self.traits.contains(SlotTraits::REAPED)
    }

    pub fn is_reaped(&self) -> bool {
        self.traits.contains(SlotTraits::REAPED)
    }

    pub fn is_null(&self) -> bool {
        self.traits.contains(SlotTraits::NULL)
    }

    /// Checksum if this slot carries one
    pub fn tracked_checksum(&self) -> Option<i32> {
        if self.is_live() && self.traits.contains(SlotTraits::CHECKSUMMED) {
            Some(self.checksum)
        } else {
            None
        }
    }

    /// Length of the value part
    pub fn value_len(&self) -> u64 {
        self.length.saturating_sub(self.key_len as u64)
    }
}

// =============================================================================
// Slot Stream Trait
// =============================================================================

/// Record-level storage primitive underneath an object container
///
/// Record numbers are absolute: the first `reserved_records` belong to
/// metadata providers, application data follows.
pub trait SlotStream: Send {
    /// Current header (layout, counts, extension region)
    fn header(&self) -> &StreamHeader;

    /// Total records, reserved ones included
    fn record_count(&self) -> u64 {
        self.header().record_count
    }

    /// Read a record descriptor
    fn descriptor(&mut self, record: u64) -> Result<SlotDescriptor>;

    /// Overwrite traits and checksum, leaving the record bytes alone
    fn set_traits(&mut self, record: u64, traits: SlotTraits, checksum: i32) -> Result<()>;

    /// Mark a record reaped: traits become REAPED, checksum and inline key are dropped
    fn reap_record(&mut self, record: u64) -> Result<()>;

    /// Replace a record's descriptor and bytes in one go
    fn write_record(
        &mut self,
        record: u64,
        traits: SlotTraits,
        checksum: i32,
        key: &[u8],
        value: &[u8],
    ) -> Result<()>;

    /// Read the inline key prefix
    fn read_key(&mut self, record: u64) -> Result<Vec<u8>>;

    /// Read the value part
    fn read_value(&mut self, record: u64) -> Result<Vec<u8>>;

    /// Read `len` raw bytes starting at `offset`
    fn read_range(&mut self, record: u64, offset: u64, len: usize) -> Result<Vec<u8>>;

    /// Write raw bytes at `offset`, growing the record when needed
    fn write_range(&mut self, record: u64, offset: u64, data: &[u8]) -> Result<()>;

    /// Shorten a record to `len` bytes
    fn truncate(&mut self, record: u64, len: u64) -> Result<()>;

    /// Append an empty record, returning its number
    fn append_record(&mut self) -> Result<u64>;

    /// Insert an empty record at `record`, shifting later records up
    fn insert_record(&mut self, record: u64) -> Result<()>;

    /// Remove a record, shifting later records down and releasing its clusters
    fn remove_record(&mut self, record: u64) -> Result<()>;

    /// Caller-owned header extension bytes
    fn extension(&self) -> &[u8] {
        &self.header().extension
    }

    /// Overwrite part of the extension region
    fn write_extension(&mut self, offset: usize, data: &[u8]) -> Result<()>;

    /// Flush buffered writes to the backing store
    fn flush(&mut self) -> Result<()>;
}
