//! Recyclable list

use std::io::Cursor;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::ContainerConfig;
use crate::container::{ContainerState, ObjectContainer, SlotWrite};
use crate::dictionary::BoxIter;
use crate::error::{Result, StreamKvError};
use crate::provider::{shared, FreeIndexStore};
use crate::serializer::ItemSerializer;
use crate::stream::{ClusteredStream, SlotStream};

/// Record 0 holds the free-index stack
const RESERVED_SLOTS: u32 = 1;
const FREE_INDEX_RECORD: u64 = 0;

/// List with stable indices and hole reuse
pub struct RecyclableList<T> {
    container: ObjectContainer,
    free_indices: Arc<Mutex<FreeIndexStore>>,
    serializer: Box<dyn ItemSerializer<T>>,
}

impl<T> RecyclableList<T> {
    pub fn in_memory(config: &ContainerConfig, serializer: Box<dyn ItemSerializer<T>>) -> Result<Self> {
        let config = ContainerConfig {
            reserved_slots: RESERVED_SLOTS,
            ..config.clone()
        };
        let stream: ClusteredStream<Cursor<Vec<u8>>> = ClusteredStream::in_memory(&config)?;
        Self::create(Box::new(stream), serializer)
    }

    pub fn create(stream: Box<dyn SlotStream>, serializer: Box<dyn ItemSerializer<T>>) -> Result<Self> {
        Self::check(stream.as_ref())?;
        Self::attach(ObjectContainer::create(stream)?, serializer)
    }

    /// List over an existing stream; call `load` before use
    pub fn open(stream: Box<dyn SlotStream>, serializer: Box<dyn ItemSerializer<T>>) -> Result<Self> {
        Self::check(stream.as_ref())?;
        Self::attach(ObjectContainer::open(stream)?, serializer)
    }

    fn check(stream: &dyn SlotStream) -> Result<()> {
        let reserved = stream.header().reserved_records;
        if reserved != RESERVED_SLOTS {
            return Err(StreamKvError::Config(format!(
                "Recyclable list needs {} reserved slots, stream has {}",
                RESERVED_SLOTS, reserved
            )));
        }
        Ok(())
    }

    fn attach(container: ObjectContainer, serializer: Box<dyn ItemSerializer<T>>) -> Result<Self> {
        let free_indices = shared(FreeIndexStore::new(FREE_INDEX_RECORD));
        container.register_provider(free_indices.clone())?;
        Ok(Self {
            container,
            free_indices,
            serializer,
        })
    }

    pub fn container(&self) -> &ObjectContainer {
        &self.container
    }

    pub fn load(&self) -> Result<()> {
        self.container.load()
    }

    pub fn requires_load(&self) -> Result<bool> {
        self.container.requires_load()
    }

    /// Store an item in the most recently freed hole, or at the end
    pub fn push(&self, item: &T) -> Result<u64> {
        let bytes = self.serializer.serialize(item)?;
        self.container.add(SlotWrite::value(bytes))
    }

    /// Item at `index`; a recycled index is an invariant violation
    pub fn get(&self, index: u64) -> Result<T> {
        let bytes = self.container.read_value(index)?;
        self.serializer.deserialize(&bytes)
    }

    pub fn set(&self, index: u64, item: &T) -> Result<()> {
        let bytes = self.serializer.serialize(item)?;
        self.container.update(index, SlotWrite::value(bytes))
    }

    /// Free the slot at `index`; other indices are unaffected
    pub fn remove_at(&self, index: u64) -> Result<()> {
        self.container.reap(index)
    }

    pub fn is_recycled(&self, index: u64) -> Result<bool> {
        self.container.enter_access_scope()?.descriptor(index).map(|d| d.is_reaped())
    }

    /// Index the next `push` will reuse
    pub fn next_free(&self) -> Option<u64> {
        self.free_indices.lock().peek()
    }

    /// Live items
    pub fn len(&self) -> Result<u64> {
        self.container.count()
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Slots including holes
    pub fn total_slots(&self) -> Result<u64> {
        self.container.total_slots()
    }

    /// Drop holes, renumbering later items; returns how many were dropped
    pub fn shrink(&self) -> Result<u64> {
        self.container.shrink()
    }

    pub fn clear(&self) -> Result<()> {
        self.container.clear()
    }

    pub fn flush(&self) -> Result<()> {
        self.container.flush()
    }

    /// Live items with their indices
    pub fn iter(&self) -> Result<BoxIter<'_, (u64, T)>> {
        let iter = self
            .container
            .iter_with(move |state, index, _| Ok((index, self.read_item(state, index)?)))?;
        Ok(Box::new(iter))
    }

    fn read_item(&self, state: &mut ContainerState, index: u64) -> Result<T> {
        let bytes = state.read_value(index)?;
        self.serializer.deserialize(&bytes)
    }
}

impl<T: PartialEq> RecyclableList<T> {
    /// Index of the first live item equal to `item`
    pub fn index_of(&self, item: &T) -> Result<Option<u64>> {
        let mut scope = self.container.enter_access_scope()?;
        scope.ensure_loaded()?;
        for index in 0..scope.total_slots() {
            if !scope.descriptor(index)?.is_live() {
                continue;
            }
            if self.read_item(&mut scope, index)? == *item {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    pub fn contains(&self, item: &T) -> Result<bool> {
        Ok(self.index_of(item)?.is_some())
    }
}
