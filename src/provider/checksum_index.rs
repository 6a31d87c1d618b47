//! Checksum Index
//!
//! In-memory multimap from projected key checksum to candidate slots.
//! Never persisted: descriptors carry the checksums, Load re-derives it.

use std::collections::HashMap;

use tracing::debug;

use crate::error::Result;
use crate::stream::{SlotDescriptor, SlotStream};

use super::{MetaDataProvider, SlotEvent};

#[derive(Debug, Default)]
pub struct ChecksumIndex {
    buckets: HashMap<i32, Vec<u64>>,
    entries: usize,
}

impl ChecksumIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive an index from slot descriptors
    pub fn rebuild_from(descriptors: &[SlotDescriptor]) -> Self {
        let mut index = Self::new();
        for (i, descriptor) in descriptors.iter().enumerate() {
            if let Some(checksum) = descriptor.tracked_checksum() {
                index.insert(checksum, i as u64);
            }
        }
        index
    }

    /// Candidate slots sharing `checksum` (may include collisions)
    pub fn lookup(&self, checksum: i32) -> Vec<u64> {
        self.buckets.get(&checksum).cloned().unwrap_or_default()
    }

    /// Number of indexed slots
    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    fn insert(&mut self, checksum: i32, index: u64) {
        let bucket = self.buckets.entry(checksum).or_default();
        if !bucket.contains(&index) {
            bucket.push(index);
            self.entries += 1;
        }
    }

    fn remove(&mut self, checksum: i32, index: u64) {
        if let Some(bucket) = self.buckets.get_mut(&checksum) {
            if let Some(pos) = bucket.iter().position(|&i| i == index) {
                bucket.swap_remove(pos);
                self.entries -= 1;
            }
            if bucket.is_empty() {
                self.buckets.remove(&checksum);
            }
        }
    }
}

impl MetaDataProvider for ChecksumIndex {
    fn name(&self) -> &'static str {
        "checksum-index"
    }

    fn on_added(&mut self, _stream: &mut dyn SlotStream, event: &SlotEvent<'_>) -> Result<()> {
        if let Some(checksum) = event.descriptor.tracked_checksum() {
            self.insert(checksum, event.index);
        }
        Ok(())
    }

    fn on_updated(
        &mut self,
        _stream: &mut dyn SlotStream,
        previous: &SlotDescriptor,
        event: &SlotEvent<'_>,
    ) -> Result<()> {
        let before = previous.tracked_checksum();
        let after = event.descriptor.tracked_checksum();
        if before != after {
            if let Some(checksum) = before {
                self.remove(checksum, event.index);
            }
            if let Some(checksum) = after {
                self.insert(checksum, event.index);
            }
        }
        Ok(())
    }

    fn on_reaped(
        &mut self,
        _stream: &mut dyn SlotStream,
        index: u64,
        previous: &SlotDescriptor,
    ) -> Result<()> {
        if let Some(checksum) = previous.tracked_checksum() {
            self.remove(checksum, index);
        }
        Ok(())
    }

    fn on_cleared(&mut self, _stream: &mut dyn SlotStream) -> Result<()> {
        self.buckets.clear();
        self.entries = 0;
        Ok(())
    }

    fn rebuild(&mut self, _stream: &mut dyn SlotStream, descriptors: &[SlotDescriptor]) -> Result<()> {
        *self = Self::rebuild_from(descriptors);
        debug!(
            entries = self.entries,
            buckets = self.buckets.len(),
            "Rebuilt checksum index"
        );
        Ok(())
    }
}
