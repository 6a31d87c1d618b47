//! Staged edit of a single slot

use tracing::warn;

use crate::error::Result;
use crate::stream::{SlotDescriptor, SlotTraits};

use super::{ContainerState, SlotWrite};

/// Buffered changes to one live slot
///
/// Nothing reaches the stream until `commit`. Dropping the scope without
/// committing discards the staged changes.
#[must_use = "a slot scope discards its changes unless committed"]
pub struct SlotScope<'a> {
    state: &'a mut ContainerState,
    index: u64,
    original: SlotDescriptor,
    key: Vec<u8>,
    value: Option<Vec<u8>>,
    checksum: Option<i32>,
    dirty: bool,
    finished: bool,
}

impl<'a> SlotScope<'a> {
    pub(crate) fn new(
        state: &'a mut ContainerState,
        index: u64,
        original: SlotDescriptor,
        key: Vec<u8>,
        value: Option<Vec<u8>>,
    ) -> Self {
        Self {
            state,
            index,
            original,
            key,
            value,
            checksum: original.tracked_checksum(),
            dirty: false,
            finished: false,
        }
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    /// Descriptor as it was when the scope opened
    pub fn original(&self) -> &SlotDescriptor {
        &self.original
    }

    /// Inline key (empty when the slot has none)
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// Staged value, `None` for a null item
    pub fn value(&self) -> Option<&[u8]> {
        self.value.as_deref()
    }

    pub fn checksum(&self) -> Option<i32> {
        self.checksum
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn set_value(&mut self, value: Vec<u8>) {
        self.value = Some(value);
        self.dirty = true;
    }

    pub fn set_null(&mut self) {
        self.value = None;
        self.dirty = true;
    }

    pub fn set_checksum(&mut self, checksum: Option<i32>) {
        self.checksum = checksum;
        self.dirty = true;
    }

    /// Write staged changes through `ContainerState::update`
    pub fn commit(mut self) -> Result<()> {
        self.finished = true;
        if !self.dirty {
            return Ok(());
        }

        let mut write = match self.value.take() {
            Some(value) => SlotWrite::value(value),
            None => SlotWrite::null(),
        };
        if self.original.traits.contains(SlotTraits::KEYED) {
            write = write.with_inline_key(std::mem::take(&mut self.key));
        }
        if let Some(checksum) = self.checksum {
            write = write.with_checksum(checksum);
        }

        self.state.update(self.index, write)
    }

    /// Discard staged changes
    pub fn abort(mut self) {
        self.finished = true;
    }
}

impl Drop for SlotScope<'_> {
    fn drop(&mut self) {
        if !self.finished && self.dirty {
            warn!(index = self.index, "Slot scope dropped without commit; changes discarded");
        }
    }
}
