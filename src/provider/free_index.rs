//! Free-Index Store
//!
//! Recycles reaped slot indices. The stack is persisted as packed u64s in
//! one reserved record; the most recently freed index is handed out first.

use tracing::{debug, warn};

use crate::error::{Result, StreamKvError};
use crate::stream::{SlotDescriptor, SlotStream};

use super::{MetaDataProvider, SlotEvent};

const ENTRY_SIZE: u64 = 8;

/// LIFO stack of recyclable indices
#[derive(Debug)]
pub struct FreeIndexStore {
    /// Reserved record holding the persisted stack
    record: u64,
    stack: Vec<u64>,
}

impl FreeIndexStore {
    pub fn new(record: u64) -> Self {
        Self {
            record,
            stack: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Index the next Add will reuse
    pub fn peek(&self) -> Option<u64> {
        self.stack.last().copied()
    }

    /// Stack contents, bottom first
    pub fn indices(&self) -> &[u64] {
        &self.stack
    }

    /// Derive a fresh stack from slot traits (ascending, so the highest index pops first)
    pub fn rebuild_from(descriptors: &[SlotDescriptor]) -> Vec<u64> {
        descriptors
            .iter()
            .enumerate()
            .filter(|(_, d)| d.is_reaped())
            .map(|(i, _)| i as u64)
            .collect()
    }

    fn read_persisted(&self, stream: &mut dyn SlotStream) -> Result<Vec<u64>> {
        let len = stream.descriptor(self.record)?.length;
        if len % ENTRY_SIZE != 0 {
            return Err(StreamKvError::Corruption(format!(
                "Free-index record length {} is not a multiple of {}",
                len, ENTRY_SIZE
            )));
        }

        let e = stream.header().endianness;
        let bytes = stream.read_range(self.record, 0, len as usize)?;
        Ok(bytes
            .chunks_exact(ENTRY_SIZE as usize)
            .map(|chunk| e.read_u64(chunk))
            .collect())
    }

    fn persist_all(&self, stream: &mut dyn SlotStream) -> Result<()> {
        let e = stream.header().endianness;
        let bytes: Vec<u8> = self.stack.iter().flat_map(|&i| e.u64_bytes(i)).collect();
        stream.truncate(self.record, 0)?;
        if !bytes.is_empty() {
            stream.write_range(self.record, 0, &bytes)?;
        }
        Ok(())
    }
}

impl MetaDataProvider for FreeIndexStore {
    fn name(&self) -> &'static str {
        "free-index"
    }

    fn on_reaped(
        &mut self,
        stream: &mut dyn SlotStream,
        index: u64,
        _previous: &SlotDescriptor,
    ) -> Result<()> {
        let e = stream.header().endianness;
        let offset = self.stack.len() as u64 * ENTRY_SIZE;
        stream.write_range(self.record, offset, &e.u64_bytes(index))?;
        self.stack.push(index);
        Ok(())
    }

    fn on_added(&mut self, stream: &mut dyn SlotStream, event: &SlotEvent<'_>) -> Result<()> {
        // An index handed out by take_free_index is already gone; anything
        // else still on the stack means the stack went stale.
        if let Some(pos) = self.stack.iter().position(|&i| i == event.index) {
            warn!(index = event.index, "Live slot found on free-index stack; dropping it");
            self.stack.remove(pos);
            self.persist_all(stream)?;
        }
        Ok(())
    }

    fn on_removed(&mut self, stream: &mut dyn SlotStream, index: u64) -> Result<()> {
        let before = self.stack.len();
        self.stack.retain(|&i| i != index);
        let mut changed = self.stack.len() != before;
        for i in self.stack.iter_mut().filter(|i| **i > index) {
            *i -= 1;
            changed = true;
        }
        if changed {
            self.persist_all(stream)?;
        }
        Ok(())
    }

    fn on_inserted(&mut self, stream: &mut dyn SlotStream, index: u64) -> Result<()> {
        let mut changed = false;
        for i in self.stack.iter_mut().filter(|i| **i >= index) {
            *i += 1;
            changed = true;
        }
        if changed {
            self.persist_all(stream)?;
        }
        Ok(())
    }

    fn on_cleared(&mut self, stream: &mut dyn SlotStream) -> Result<()> {
        self.stack.clear();
        stream.truncate(self.record, 0)
    }

    fn rebuild(&mut self, stream: &mut dyn SlotStream, descriptors: &[SlotDescriptor]) -> Result<()> {
        let expected = Self::rebuild_from(descriptors);

        let persisted = match self.read_persisted(stream) {
            Ok(persisted) => Some(persisted),
            Err(StreamKvError::Corruption(reason)) => {
                warn!(%reason, "Unreadable free-index record");
                None
            }
            Err(e) => return Err(e),
        };

        if let Some(persisted) = persisted {
            let mut sorted = persisted.clone();
            sorted.sort_unstable();
            if sorted == expected {
                debug!(free = persisted.len(), "Loaded free-index stack");
                self.stack = persisted;
                return Ok(());
            }
            warn!(
                persisted = persisted.len(),
                reaped = expected.len(),
                "Free-index stack disagrees with slot traits; rebuilding"
            );
        }

        self.stack = expected;
        self.persist_all(stream)
    }

    fn take_free_index(&mut self, stream: &mut dyn SlotStream) -> Result<Option<u64>> {
        let Some(index) = self.stack.pop() else {
            return Ok(None);
        };
        stream.truncate(self.record, self.stack.len() as u64 * ENTRY_SIZE)?;
        Ok(Some(index))
    }
}
