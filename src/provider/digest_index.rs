//! Digest Index
//!
//! SHA-256 of every live value, kept by slot index. Usable on any container;
//! the hash set uses the same digest as its dictionary key.

use sha2::{Digest as _, Sha256};
use tracing::debug;

use crate::error::Result;
use crate::stream::{SlotDescriptor, SlotStream};

use super::{data_record, MetaDataProvider, SlotEvent};

/// 32-byte SHA-256 digest
pub type Digest = [u8; 32];

/// Hash a byte payload
pub fn sha256(bytes: &[u8]) -> Digest {
    Sha256::digest(bytes).into()
}

#[derive(Debug, Default)]
pub struct DigestIndex {
    digests: Vec<Option<Digest>>,
}

impl DigestIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Digest of slot `index`, `None` when the slot is not live or holds a null item
    pub fn digest(&self, index: u64) -> Option<Digest> {
        self.digests.get(index as usize).copied().flatten()
    }

    /// First live slot whose value hashes to `digest`
    pub fn find(&self, digest: &Digest) -> Option<u64> {
        self.digests
            .iter()
            .position(|d| d.as_ref() == Some(digest))
            .map(|i| i as u64)
    }

    fn set(&mut self, index: u64, digest: Option<Digest>) {
        let i = index as usize;
        if self.digests.len() <= i {
            self.digests.resize(i + 1, None);
        }
        self.digests[i] = digest;
    }
}

impl MetaDataProvider for DigestIndex {
    fn name(&self) -> &'static str {
        "digest-index"
    }

    fn on_added(&mut self, _stream: &mut dyn SlotStream, event: &SlotEvent<'_>) -> Result<()> {
        self.set(event.index, event.value.map(sha256));
        Ok(())
    }

    fn on_updated(
        &mut self,
        _stream: &mut dyn SlotStream,
        _previous: &SlotDescriptor,
        event: &SlotEvent<'_>,
    ) -> Result<()> {
        self.set(event.index, event.value.map(sha256));
        Ok(())
    }

    fn on_reaped(
        &mut self,
        _stream: &mut dyn SlotStream,
        index: u64,
        _previous: &SlotDescriptor,
    ) -> Result<()> {
        self.set(index, None);
        Ok(())
    }

    fn on_cleared(&mut self, _stream: &mut dyn SlotStream) -> Result<()> {
        self.digests.clear();
        Ok(())
    }

    fn rebuild(&mut self, stream: &mut dyn SlotStream, descriptors: &[SlotDescriptor]) -> Result<()> {
        let mut digests = Vec::with_capacity(descriptors.len());
        for (i, descriptor) in descriptors.iter().enumerate() {
            if descriptor.is_live() && !descriptor.is_null() {
                let record = data_record(stream, i as u64);
                let value = stream.read_value(record)?;
                digests.push(Some(sha256(&value)));
            } else {
                digests.push(None);
            }
        }
        self.digests = digests;
        debug!(slots = self.digests.len(), "Rebuilt digest index");
        Ok(())
    }
}
