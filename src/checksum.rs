//! Key Checksums
//!
//! Projects a key onto an `i32` stored in the slot descriptor. Equal keys
//! must project equally; collisions are expected and resolved by comparing
//! the stored key.

use std::hash::{Hash, Hasher};

/// Key → checksum projection
pub trait KeyChecksum<K: ?Sized>: Send + Sync {
    fn calculate(&self, key: &K) -> i32;
}

/// CRC32 over the key's `Hash` output
///
/// Integers are fed little-endian and `usize` as 64 bits, so persisted
/// checksums match on any host and across runs (unlike `DefaultHasher`).
#[derive(Debug, Default, Clone, Copy)]
pub struct HashChecksum;

impl<K: Hash + ?Sized> KeyChecksum<K> for HashChecksum {
    fn calculate(&self, key: &K) -> i32 {
        let mut hasher = Crc32Hasher(crc32fast::Hasher::new());
        key.hash(&mut hasher);
        hasher.0.finalize() as i32
    }
}

struct Crc32Hasher(crc32fast::Hasher);

impl Hasher for Crc32Hasher {
    fn finish(&self) -> u64 {
        self.0.clone().finalize() as u64
    }

    fn write(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    fn write_u16(&mut self, n: u16) {
        self.write(&n.to_le_bytes());
    }

    fn write_u32(&mut self, n: u32) {
        self.write(&n.to_le_bytes());
    }

    fn write_u64(&mut self, n: u64) {
        self.write(&n.to_le_bytes());
    }

    fn write_u128(&mut self, n: u128) {
        self.write(&n.to_le_bytes());
    }

    fn write_usize(&mut self, n: usize) {
        self.write_u64(n as u64);
    }
}

/// Checksum from a plain function or closure
pub struct FnChecksum<F>(pub F);

impl<K: ?Sized, F> KeyChecksum<K> for FnChecksum<F>
where
    F: Fn(&K) -> i32 + Send + Sync,
{
    fn calculate(&self, key: &K) -> i32 {
        (self.0)(key)
    }
}
