//! Constant-Length-Key dictionary
//!
//! Keys of a fixed serialized width live in a key-store record (slot `i`'s
//! key at offset `i * width`); slots hold only values. Lookup goes through
//! the key store's exact map, no checksum involved.

use std::io::Cursor;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::ContainerConfig;
use crate::container::{ContainerState, ObjectContainer, SlotWrite};
use crate::error::{Result, StreamKvError};
use crate::provider::{shared, FreeIndexStore, KeyStore};
use crate::serializer::ItemSerializer;
use crate::stream::{ClusteredStream, SlotStream};

use super::{check_stream, BoxIter, DictionaryStrategy, StreamDictionary};

/// Record 0 holds the free-index stack, record 1 the key store
pub(crate) const RESERVED_SLOTS: u32 = 2;
const FREE_INDEX_RECORD: u64 = 0;
const KEY_STORE_RECORD: u64 = 1;

pub struct ClkDictionary<K, V> {
    container: ObjectContainer,
    key_store: Arc<Mutex<KeyStore>>,
    key_serializer: Box<dyn ItemSerializer<K>>,
    value_serializer: Box<dyn ItemSerializer<V>>,
}

impl<K: PartialEq, V> ClkDictionary<K, V> {
    pub fn in_memory(
        config: &ContainerConfig,
        key_serializer: Box<dyn ItemSerializer<K>>,
        value_serializer: Box<dyn ItemSerializer<V>>,
    ) -> Result<Self> {
        let config = ContainerConfig {
            reserved_slots: RESERVED_SLOTS,
            ..config.clone()
        };
        let stream: ClusteredStream<Cursor<Vec<u8>>> = ClusteredStream::in_memory(&config)?;
        Self::create(Box::new(stream), key_serializer, value_serializer)
    }

    pub fn create(
        stream: Box<dyn SlotStream>,
        key_serializer: Box<dyn ItemSerializer<K>>,
        value_serializer: Box<dyn ItemSerializer<V>>,
    ) -> Result<Self> {
        check_stream(stream.as_ref(), DictionaryStrategy::ConstantLengthKey, |_| None)?;
        let container = ObjectContainer::create(stream)?;
        Self::attach(container, key_serializer, value_serializer)
    }

    /// Dictionary over an existing stream; call `load` before use
    pub fn open(
        stream: Box<dyn SlotStream>,
        key_serializer: Box<dyn ItemSerializer<K>>,
        value_serializer: Box<dyn ItemSerializer<V>>,
    ) -> Result<Self> {
        check_stream(stream.as_ref(), DictionaryStrategy::ConstantLengthKey, |_| None)?;
        let container = ObjectContainer::open(stream)?;
        Self::attach(container, key_serializer, value_serializer)
    }

    fn attach(
        container: ObjectContainer,
        key_serializer: Box<dyn ItemSerializer<K>>,
        value_serializer: Box<dyn ItemSerializer<V>>,
    ) -> Result<Self> {
        let key_size = key_serializer.constant_size().ok_or_else(|| {
            StreamKvError::Config(
                "Constant-length-key dictionary needs a constant-size key serializer".to_string(),
            )
        })?;

        let key_store = shared(KeyStore::new(KEY_STORE_RECORD, key_size));
        container.register_provider(shared(FreeIndexStore::new(FREE_INDEX_RECORD)))?;
        container.register_provider(key_store.clone())?;

        Ok(Self {
            container,
            key_store,
            key_serializer,
            value_serializer,
        })
    }

    /// Serialized key width
    pub fn key_size(&self) -> usize {
        self.key_store.lock().key_size()
    }

    fn read_key(&self, state: &mut ContainerState, index: u64) -> Result<K> {
        let bytes = self.key_store.lock().read_key(state.stream_mut(), index)?;
        self.key_serializer.deserialize(&bytes)
    }

    fn read_value(&self, state: &mut ContainerState, index: u64) -> Result<V> {
        let bytes = state.read_value(index)?;
        self.value_serializer.deserialize(&bytes)
    }

    fn find_in(&self, state: &mut ContainerState, key: &K, key_bytes: &[u8]) -> Result<Option<u64>> {
        state.ensure_loaded()?;
        let Some(index) = self.key_store.lock().lookup(key_bytes) else {
            return Ok(None);
        };

        if state.is_live(index)? && self.read_key(state, index)? == *key {
            Ok(Some(index))
        } else {
            Ok(None)
        }
    }
}

impl<K: PartialEq, V> StreamDictionary<K, V> for ClkDictionary<K, V> {
    fn strategy(&self) -> DictionaryStrategy {
        DictionaryStrategy::ConstantLengthKey
    }

    fn container(&self) -> &ObjectContainer {
        &self.container
    }

    fn add(&self, key: &K, value: &V) -> Result<()> {
        let mut scope = self.container.enter_access_scope()?;
        let key_bytes = self.key_serializer.serialize(key)?;
        if self.find_in(&mut scope, key, &key_bytes)?.is_some() {
            return Err(StreamKvError::DuplicateKey);
        }

        let value_bytes = self.value_serializer.serialize(value)?;
        scope.add(SlotWrite::value(value_bytes).with_side_key(key_bytes))?;
        Ok(())
    }

    fn update(&self, key: &K, value: &V) -> Result<()> {
        let mut scope = self.container.enter_access_scope()?;
        let key_bytes = self.key_serializer.serialize(key)?;
        let index = self
            .find_in(&mut scope, key, &key_bytes)?
            .ok_or(StreamKvError::KeyNotFound)?;

        let value_bytes = self.value_serializer.serialize(value)?;
        scope.update(index, SlotWrite::value(value_bytes))
    }

    fn remove(&self, key: &K) -> Result<bool> {
        let mut scope = self.container.enter_access_scope()?;
        let key_bytes = self.key_serializer.serialize(key)?;
        match self.find_in(&mut scope, key, &key_bytes)? {
            Some(index) => {
                scope.reap(index)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn try_find_key(&self, key: &K) -> Result<Option<u64>> {
        let mut scope = self.container.enter_access_scope()?;
        let key_bytes = self.key_serializer.serialize(key)?;
        self.find_in(&mut scope, key, &key_bytes)
    }

    fn try_get_value(&self, key: &K) -> Result<Option<V>> {
        let mut scope = self.container.enter_access_scope()?;
        let key_bytes = self.key_serializer.serialize(key)?;
        match self.find_in(&mut scope, key, &key_bytes)? {
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
