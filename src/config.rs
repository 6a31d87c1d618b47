//! Configuration for streamkv containers
//!
//! Centralized configuration with sensible defaults. The persisted parts
//! (cluster size, endianness, policy, reserved slots) are written into the
//! stream header at creation and read back from it on open.

/// Byte order used for every fixed-width integer in a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endianness {
    #[default]
    Little,
    Big,
}

impl Endianness {
    /// Encode as the single header byte
    pub fn to_byte(self) -> u8 {
        match self {
            Endianness::Little => 0,
            Endianness::Big => 1,
        }
    }

    /// Decode from the header byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Endianness::Little),
            1 => Some(Endianness::Big),
            _ => None,
        }
    }

    pub fn u16_bytes(self, v: u16) -> [u8; 2] {
        match self {
            Endianness::Little => v.to_le_bytes(),
            Endianness::Big => v.to_be_bytes(),
        }
    }

    pub fn u32_bytes(self, v: u32) -> [u8; 4] {
        match self {
            Endianness::Little => v.to_le_bytes(),
            Endianness::Big => v.to_be_bytes(),
        }
    }

    pub fn u64_bytes(self, v: u64) -> [u8; 8] {
        match self {
            Endianness::Little => v.to_le_bytes(),
            Endianness::Big => v.to_be_bytes(),
        }
    }

    pub fn read_u16(self, bytes: &[u8]) -> u16 {
        let mut buf = [0u8; 2];
        buf.copy_from_slice(&bytes[..2]);
        match self {
            Endianness::Little => u16::from_le_bytes(buf),
            Endianness::Big => u16::from_be_bytes(buf),
        }
    }

    pub fn read_u32(self, bytes: &[u8]) -> u32 {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&bytes[..4]);
        match self {
            Endianness::Little => u32::from_le_bytes(buf),
            Endianness::Big => u32::from_be_bytes(buf),
        }
    }

    pub fn read_u64(self, bytes: &[u8]) -> u64 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&bytes[..8]);
        match self {
            Endianness::Little => u64::from_le_bytes(buf),
            Endianness::Big => u64::from_be_bytes(buf),
        }
    }
}

/// Policy flags persisted in the stream header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamPolicy {
    /// Persist per-slot checksums (required by checksum-indexed collections)
    pub checksum_tracking: bool,

    /// Allow keys stored inline in the slot header
    pub key_tracking: bool,

    /// Skip zero-filling clusters taken from the free list
    pub fast_allocate: bool,
}

impl StreamPolicy {
    const CHECKSUM_TRACKING: u8 = 0b001;
    const KEY_TRACKING: u8 = 0b010;
    const FAST_ALLOCATE: u8 = 0b100;

    /// Encode as the single header byte
    pub fn to_byte(self) -> u8 {
        let mut byte = 0;
        if self.checksum_tracking {
            byte |= Self::CHECKSUM_TRACKING;
        }
        if self.key_tracking {
            byte |= Self::KEY_TRACKING;
        }
        if self.fast_allocate {
            byte |= Self::FAST_ALLOCATE;
        }
        byte
    }

    /// Decode from the header byte
    pub fn from_byte(byte: u8) -> Self {
        Self {
            checksum_tracking: byte & Self::CHECKSUM_TRACKING != 0,
            key_tracking: byte & Self::KEY_TRACKING != 0,
            fast_allocate: byte & Self::FAST_ALLOCATE != 0,
        }
    }
}

impl Default for StreamPolicy {
    fn default() -> Self {
        Self {
            checksum_tracking: true,
            key_tracking: true,
            fast_allocate: false,
        }
    }
}

/// Main configuration for a container
#[derive(Debug, Clone)]
pub struct ContainerConfig {
    // -------------------------------------------------------------------------
    // Stream Layout (persisted)
    // -------------------------------------------------------------------------
    /// Data bytes per cluster (allocation granularity)
    pub cluster_size: u32,

    /// Byte order for all fixed-width integers
    pub endianness: Endianness,

    /// Policy flags
    pub policy: StreamPolicy,

    /// Number of lowest-numbered records owned by metadata providers
    pub reserved_slots: u32,

    // -------------------------------------------------------------------------
    // Collection Tuning (not persisted)
    // -------------------------------------------------------------------------
    /// Largest constant key size (bytes) that selects the constant-length-key strategy
    pub clk_threshold: usize,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            cluster_size: 256,
            endianness: Endianness::Little,
            policy: StreamPolicy::default(),
            reserved_slots: 0,
            clk_threshold: 256,
        }
    }
}

impl ContainerConfig {
    /// Create a new config builder
    pub fn builder() -> ContainerConfigBuilder {
        ContainerConfigBuilder::default()
    }
}

/// Builder for ContainerConfig
#[derive(Default)]
pub struct ContainerConfigBuilder {
    config: ContainerConfig,
}

impl ContainerConfigBuilder {
    /// Set the cluster size (in bytes)
    pub fn cluster_size(mut self, size: u32) -> Self {
        self.config.cluster_size = size;
        self
    }

    /// Set the byte order
    pub fn endianness(mut self, endianness: Endianness) -> Self {
        self.config.endianness = endianness;
        self
    }

    /// Replace all policy flags
    pub fn policy(mut self, policy: StreamPolicy) -> Self {
        self.config.policy = policy;
        self
    }

    /// Enable or disable checksum tracking
    pub fn checksum_tracking(mut self, enabled: bool) -> Self {
        self.config.policy.checksum_tracking = enabled;
        self
    }

    /// Enable or disable inline key tracking
    pub fn key_tracking(mut self, enabled: bool) -> Self {
        self.config.policy.key_tracking = enabled;
        self
    }

    /// Enable or disable fast allocation
    pub fn fast_allocate(mut self, enabled: bool) -> Self {
        self.config.policy.fast_allocate = enabled;
        self
    }

    /// Set the number of reserved provider slots
    pub fn reserved_slots(mut self, count: u32) -> Self {
        self.config.reserved_slots = count;
        self
    }

    /// Set the constant-length-key threshold (in bytes)
    pub fn clk_threshold(mut self, bytes: usize) -> Self {
        self.config.clk_threshold = bytes;
        self
    }

    pub fn build(self) -> ContainerConfig {
        self.config
    }
}
