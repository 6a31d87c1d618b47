//! Dense stream-mapped list

use std::io::Cursor;

use crate::config::ContainerConfig;
use crate::container::{ContainerState, ObjectContainer, SlotWrite};
use crate::dictionary::BoxIter;
use crate::error::{Result, StreamKvError};
use crate::serializer::ItemSerializer;
use crate::stream::{ClusteredStream, SlotStream};

/// List whose indices are always `0..len`
///
/// Item `i` lives in slot `i`. Removing shifts later items down, so no slot
/// is ever left reaped.
pub struct StreamMappedList<T> {
    container: ObjectContainer,
    serializer: Box<dyn ItemSerializer<T>>,
}

impl<T> StreamMappedList<T> {
    pub fn in_memory(config: &ContainerConfig, serializer: Box<dyn ItemSerializer<T>>) -> Result<Self> {
        let config = ContainerConfig {
            reserved_slots: 0,
            ..config.clone()
        };
        let stream: ClusteredStream<Cursor<Vec<u8>>> = ClusteredStream::in_memory(&config)?;
        Self::create(Box::new(stream), serializer)
    }

    pub fn create(stream: Box<dyn SlotStream>, serializer: Box<dyn ItemSerializer<T>>) -> Result<Self> {
        Self::check(stream.as_ref())?;
        Ok(Self {
            container: ObjectContainer::create(stream)?,
            serializer,
        })
    }

    /// List over an existing stream; call `load` before use
    pub fn open(stream: Box<dyn SlotStream>, serializer: Box<dyn ItemSerializer<T>>) -> Result<Self> {
        Self::check(stream.as_ref())?;
        Ok(Self {
            container: ObjectContainer::open(stream)?,
            serializer,
        })
    }

    fn check(stream: &dyn SlotStream) -> Result<()> {
        let reserved = stream.header().reserved_records;
        if reserved != 0 {
            return Err(StreamKvError::Config(format!(
                "Stream-mapped list takes no reserved slots, stream has {}",
                reserved
            )));
        }
        Ok(())
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

    /// Append an item, returning its index
    pub fn push(&self, item: &T) -> Result<u64> {
        let bytes = self.serializer.serialize(item)?;
        self.container.add(SlotWrite::value(bytes))
    }

    pub fn get(&self, index: u64) -> Result<T> {
        let bytes = self.container.read_value(index)?;
        self.serializer.deserialize(&bytes)
    }

    pub fn set(&self, index: u64, item: &T) -> Result<()> {
        let bytes = self.serializer.serialize(item)?;
        self.container.update(index, SlotWrite::value(bytes))
    }

    /// Insert at `index` (`index == len` appends)
    pub fn insert(&self, index: u64, item: &T) -> Result<()> {
        let bytes = self.serializer.serialize(item)?;
        self.container.insert(index, SlotWrite::value(bytes))
    }

    /// Remove the item at `index`, shifting later items down
    pub fn remove_at(&self, index: u64) -> Result<()> {
        self.container.remove_physical(index)
    }

    pub fn len(&self) -> Result<u64> {
        self.container.count()
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn clear(&self) -> Result<()> {
        self.container.clear()
    }

    pub fn flush(&self) -> Result<()> {
        self.container.flush()
    }

    pub fn iter(&self) -> Result<BoxIter<'_, T>> {
        let iter = self
            .container
            .iter_with(move |state, index, _| self.read_item(state, index))?;
        Ok(Box::new(iter))
    }

    fn read_item(&self, state: &mut ContainerState, index: u64) -> Result<T> {
        let bytes = state.read_value(index)?;
        self.serializer.deserialize(&bytes)
    }
}

impl<T: PartialEq> StreamMappedList<T> {
    /// Index of the first item equal to `item`
    pub fn index_of(&self, item: &T) -> Result<Option<u64>> {
        let mut scope = self.container.enter_access_scope()?;
        scope.ensure_loaded()?;
        for index in 0..scope.total_slots() {
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
