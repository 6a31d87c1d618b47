//! Slot-Key dictionary
//!
//! The serialized key is stored inline in the slot (traits carry KEYED) and
//! the checksum in the descriptor; the value fills the rest of the record.

use std::io::Cursor;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::checksum::KeyChecksum;
use crate::config::ContainerConfig;
use crate::container::{ContainerState, ObjectContainer, SlotWrite};
use crate::error::{Result, StreamKvError};
use crate::provider::{shared, ChecksumIndex, FreeIndexStore};
use crate::serializer::ItemSerializer;
use crate::stream::{ClusteredStream, SlotStream};

use super::{check_stream, BoxIter, DictionaryStrategy, StreamDictionary};

/// Record 0 holds the free-index stack
pub(crate) const RESERVED_SLOTS: u32 = 1;
const FREE_INDEX_RECORD: u64 = 0;

pub struct SlotKeyDictionary<K, V> {
    container: ObjectContainer,
    checksums: Arc<Mutex<ChecksumIndex>>,
    key_serializer: Box<dyn ItemSerializer<K>>,
    value_serializer: Box<dyn ItemSerializer<V>>,
    checksum: Box<dyn KeyChecksum<K>>,
}

impl<K: PartialEq, V> SlotKeyDictionary<K, V> {
    pub fn in_memory(
        config: &ContainerConfig,
        key_serializer: Box<dyn ItemSerializer<K>>,
        value_serializer: Box<dyn ItemSerializer<V>>,
        checksum: Box<dyn KeyChecksum<K>>,
    ) -> Result<Self> {
        let config = ContainerConfig {
            reserved_slots: RESERVED_SLOTS,
            ..config.clone()
        };
        let stream: ClusteredStream<Cursor<Vec<u8>>> = ClusteredStream::in_memory(&config)?;
        Self::create(Box::new(stream), key_serializer, value_serializer, checksum)
    }

    pub fn create(
        stream: Box<dyn SlotStream>,
        key_serializer: Box<dyn ItemSerializer<K>>,
        value_serializer: Box<dyn ItemSerializer<V>>,
        checksum: Box<dyn KeyChecksum<K>>,
    ) -> Result<Self> {
        Self::check(stream.as_ref())?;
        let container = ObjectContainer::create(stream)?;
        Self::attach(container, key_serializer, value_serializer, checksum)
    }

    /// Dictionary over an existing stream; call `load` before use
    pub fn open(
        stream: Box<dyn SlotStream>,
        key_serializer: Box<dyn ItemSerializer<K>>,
        value_serializer: Box<dyn ItemSerializer<V>>,
        checksum: Box<dyn KeyChecksum<K>>,
    ) -> Result<Self> {
        Self::check(stream.as_ref())?;
        let container = ObjectContainer::open(stream)?;
        Self::attach(container, key_serializer, value_serializer, checksum)
    }

    fn check(stream: &dyn SlotStream) -> Result<()> {
        check_stream(stream, DictionaryStrategy::SlotKey, |policy| {
            if !policy.key_tracking {
                Some("key tracking")
            } else if !policy.checksum_tracking {
                Some("checksum tracking")
            } else {
                None
            }
        })
    }

    fn attach(
        container: ObjectContainer,
        key_serializer: Box<dyn ItemSerializer<K>>,
        value_serializer: Box<dyn ItemSerializer<V>>,
        checksum: Box<dyn KeyChecksum<K>>,
    ) -> Result<Self> {
        let checksums = shared(ChecksumIndex::new());
        container.register_provider(shared(FreeIndexStore::new(FREE_INDEX_RECORD)))?;
        container.register_provider(checksums.clone())?;

        Ok(Self {
            container,
            checksums,
            key_serializer,
            value_serializer,
            checksum,
        })
    }

    fn read_key(&self, state: &mut ContainerState, index: u64) -> Result<K> {
        let bytes = state.read_key(index)?;
        self.key_serializer.deserialize(&bytes)
    }

    fn read_value(&self, state: &mut ContainerState, index: u64) -> Result<V> {
        let bytes = state.read_value(index)?;
        self.value_serializer.deserialize(&bytes)
    }

    fn find_in(&self, state: &mut ContainerState, key: &K, checksum: i32) -> Result<Option<u64>> {
        state.ensure_loaded()?;
        let candidates = self.checksums.lock().lookup(checksum);

        for index in candidates {
            if self.read_key(state, index)? == *key {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    fn keyed_write(&self, key: &K, value: &V, checksum: i32) -> Result<SlotWrite> {
        let key_bytes = self.key_serializer.serialize(key)?;
        let value_bytes = self.value_serializer.serialize(value)?;
        Ok(SlotWrite::value(value_bytes)
            .with_inline_key(key_bytes)
            .with_checksum(checksum))
    }
}

impl<K: PartialEq, V> StreamDictionary<K, V> for SlotKeyDictionary<K, V> {
    fn strategy(&self) -> DictionaryStrategy {
        DictionaryStrategy::SlotKey
    }

    fn container(&self) -> &ObjectContainer {
        &self.container
    }

    fn add(&self, key: &K, value: &V) -> Result<()> {
        let mut scope = self.container.enter_access_scope()?;
        let checksum = self.checksum.calculate(key);
        if self.find_in(&mut scope, key, checksum)?.is_some() {
            return Err(StreamKvError::DuplicateKey);
        }

        scope.add(self.keyed_write(key, value, checksum)?)?;
        Ok(())
    }

    fn update(&self, key: &K, value: &V) -> Result<()> {
        let mut scope = self.container.enter_access_scope()?;
        let checksum = self.checksum.calculate(key);
        let index = self
            .find_in(&mut scope, key, checksum)?
            .ok_or(StreamKvError::KeyNotFound)?;
        scope.update(index, self.keyed_write(key, value, checksum)?)
    }

    fn remove(&self, key: &K) -> Result<bool> {
        let mut scope = self.container.enter_access_scope()?;
        let checksum = self.checksum.calculate(key);
        match self.find_in(&mut scope, key, checksum)? {
            Some(index) => {
                scope.reap(index)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn try_find_key(&self, key: &K) -> Result<Option<u64>> {
        let mut scope = self.container.enter_access_scope()?;
        self.find_in(&mut scope, key, self.checksum.calculate(key))
    }

    fn try_get_value(&self, key: &K) -> Result<Option<V>> {
        let mut scope = self.container.enter_access_scope()?;
        match self.find_in(&mut scope, key, self.checksum.calculate(key))? {
            Some(index) => Ok(Some(self.read_value(&mut scope, index)?)),
            None => Ok(None),
        }
    }

    fn keys(&self) -> Result<BoxIter<'_, K>> {
        let iter = self
            .container
            .iter_with(move |state, index, _| self.read_key(state, index))?;
        Ok(Box::new(iter))
    }

    fn values(&self) -> Result<BoxIter<'_, V>> {
        let iter = self
            .container
            .iter_with(move |state, index, _| self.read_value(state, index))?;
        Ok(Box::new(iter))
    }

    fn iter(&self) -> Result<BoxIter<'_, (K, V)>> {
        let iter = self.container.iter_with(move |state, index, _| {
            Ok((self.read_key(state, index)?, self.read_value(state, index)?))
        })?;
        Ok(Box::new(iter))
    }
}
