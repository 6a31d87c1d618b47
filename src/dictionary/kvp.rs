//! Key-Value-Pair dictionary
//!
//! Each slot stores the whole pair, `[key_len: u32][key][value]`, plus the
//! key checksum in its descriptor. Adding an existing key overwrites it.

use std::io::Cursor;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::checksum::KeyChecksum;
use crate::config::{ContainerConfig, Endianness};
use crate::container::{ContainerState, ObjectContainer, SlotWrite};
use crate::error::{Result, StreamKvError};
use crate::provider::{shared, ChecksumIndex, FreeIndexStore};
use crate::serializer::ItemSerializer;
use crate::stream::{ClusteredStream, SlotStream};

use super::{check_stream, BoxIter, DictionaryStrategy, StreamDictionary};

/// Record 0 holds the free-index stack
pub(crate) const RESERVED_SLOTS: u32 = 1;
const FREE_INDEX_RECORD: u64 = 0;

const LENGTH_PREFIX: usize = 4;

pub struct KvpDictionary<K, V> {
    container: ObjectContainer,
    checksums: Arc<Mutex<ChecksumIndex>>,
    free_indices: Arc<Mutex<FreeIndexStore>>,
    key_serializer: Box<dyn ItemSerializer<K>>,
    value_serializer: Box<dyn ItemSerializer<V>>,
    checksum: Box<dyn KeyChecksum<K>>,
}

impl<K: PartialEq, V> KvpDictionary<K, V> {
    /// New dictionary over an in-memory stream
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

    /// New dictionary over a freshly created stream
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
        check_stream(stream, DictionaryStrategy::KeyValuePair, |policy| {
            (!policy.checksum_tracking).then_some("checksum tracking")
        })
    }

    fn attach(
        container: ObjectContainer,
        key_serializer: Box<dyn ItemSerializer<K>>,
        value_serializer: Box<dyn ItemSerializer<V>>,
        checksum: Box<dyn KeyChecksum<K>>,
    ) -> Result<Self> {
        let free_indices = shared(FreeIndexStore::new(FREE_INDEX_RECORD));
        let checksums = shared(ChecksumIndex::new());
        container.register_provider(free_indices.clone())?;
        container.register_provider(checksums.clone())?;

        Ok(Self {
            container,
            checksums,
            free_indices,
            key_serializer,
            value_serializer,
            checksum,
        })
    }

    /// Recyclable indices currently on the free stack
    pub fn free_slots(&self) -> usize {
        self.free_indices.lock().len()
    }

    fn encode(endianness: Endianness, key: &[u8], value: &[u8]) -> Result<Vec<u8>> {
        let key_len = u32::try_from(key.len()).map_err(|_| {
            StreamKvError::Serialization(format!("Key of {} bytes too large", key.len()))
        })?;

        let mut payload = Vec::with_capacity(LENGTH_PREFIX + key.len() + value.len());
        payload.extend_from_slice(&endianness.u32_bytes(key_len));
        payload.extend_from_slice(key);
        payload.extend_from_slice(value);
        Ok(payload)
    }

    fn decode(endianness: Endianness, payload: &[u8]) -> Result<(&[u8], &[u8])> {
        if payload.len() < LENGTH_PREFIX {
            return Err(StreamKvError::Corruption(format!(
                "Pair payload of {} bytes has no key length",
                payload.len()
            )));
        }
        let key_len = endianness.read_u32(payload) as usize;
        let rest = &payload[LENGTH_PREFIX..];
        if key_len > rest.len() {
            return Err(StreamKvError::Corruption(format!(
                "Key length {} exceeds pair payload of {} bytes",
                key_len,
                rest.len()
            )));
        }
        Ok(rest.split_at(key_len))
    }

    fn read_pair(&self, state: &mut ContainerState, index: u64) -> Result<(K, V)> {
        let endianness = state.header().endianness;
        let payload = state.read_value(index)?;
        let (key, value) = Self::decode(endianness, &payload)?;
        Ok((
            self.key_serializer.deserialize(key)?,
            self.value_serializer.deserialize(value)?,
        ))
    }

    fn find_in(&self, state: &mut ContainerState, key: &K, checksum: i32) -> Result<Option<u64>> {
        state.ensure_loaded()?;
        let endianness = state.header().endianness;
        let candidates = self.checksums.lock().lookup(checksum);

        for index in candidates {
            let payload = state.read_value(index)?;
            let (stored, _) = Self::decode(endianness, &payload)?;
            if self.key_serializer.deserialize(stored)? == *key {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    fn pair_write(&self, state: &ContainerState, key: &K, value: &V, checksum: i32) -> Result<SlotWrite> {
        let key_bytes = self.key_serializer.serialize(key)?;
        let value_bytes = self.value_serializer.serialize(value)?;
        let payload = Self::encode(state.header().endianness, &key_bytes, &value_bytes)?;
        Ok(SlotWrite::value(payload).with_checksum(checksum))
    }
}

impl<K: PartialEq, V> StreamDictionary<K, V> for KvpDictionary<K, V> {
    fn strategy(&self) -> DictionaryStrategy {
        DictionaryStrategy::KeyValuePair
    }

    fn container(&self) -> &ObjectContainer {
        &self.container
    }

    fn add(&self, key: &K, value: &V) -> Result<()> {
        let mut scope = self.container.enter_access_scope()?;
        let checksum = self.checksum.calculate(key);
        let write = self.pair_write(&scope, key, value, checksum)?;

        match self.find_in(&mut scope, key, checksum)? {
            Some(index) => {
                scope.update(index, write)?;
                debug!(index, "Upserted existing key");
            }
            None => {
                scope.add(write)?;
            }
        }
        Ok(())
    }

    fn update(&self, key: &K, value: &V) -> Result<()> {
        let mut scope = self.container.enter_access_scope()?;
        let checksum = self.checksum.calculate(key);
        let index = self
            .find_in(&mut scope, key, checksum)?
            .ok_or(StreamKvError::KeyNotFound)?;
        let write = self.pair_write(&scope, key, value, checksum)?;
        scope.update(index, write)
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
            Some(index) => Ok(Some(self.read_pair(&mut scope, index)?.1)),
            None => Ok(None),
        }
    }

    fn keys(&self) -> Result<BoxIter<'_, K>> {
        let iter = self
            .container
            .iter_with(move |state, index, _| Ok(self.read_pair(state, index)?.0))?;
        Ok(Box::new(iter))
    }

    fn values(&self) -> Result<BoxIter<'_, V>> {
        let iter = self
            .container
            .iter_with(move |state, index, _| Ok(self.read_pair(state, index)?.1))?;
        Ok(Box::new(iter))
    }

    fn iter(&self) -> Result<BoxIter<'_, (K, V)>> {
        let iter = self
            .container
            .iter_with(move |state, index, _| self.read_pair(state, index))?;
        Ok(Box::new(iter))
    }
}
