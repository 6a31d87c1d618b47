//! Hash Set
//!
//! Set of items keyed by the SHA-256 digest of their serialized form. The
//! digest is the dictionary key; the item itself is the stored value.

use std::io::{Cursor, Read, Seek, Write};
use std::sync::Arc;

use crate::checksum::HashChecksum;
use crate::config::ContainerConfig;
use crate::dictionary::{BoxIter, DictionaryFactory, DictionaryStrategy, StreamDictionary};
use crate::error::{Result, StreamKvError};
use crate::provider::{sha256, Digest};
use crate::serializer::{ByteArraySerializer, ItemSerializer};

pub struct StreamHashSet<T> {
    dictionary: Box<dyn StreamDictionary<Digest, T> + Send>,
    serializer: Arc<dyn ItemSerializer<T>>,
}

impl<T: 'static> StreamHashSet<T> {
    /// New in-memory set over the given backing strategy
    pub fn in_memory(
        config: &ContainerConfig,
        strategy: DictionaryStrategy,
        serializer: Arc<dyn ItemSerializer<T>>,
    ) -> Result<Self> {
        Self::create(config, strategy, Cursor::new(Vec::new()), serializer)
    }

    /// New set on an empty backing store
    pub fn create<S>(
        config: &ContainerConfig,
        strategy: DictionaryStrategy,
        backing: S,
        serializer: Arc<dyn ItemSerializer<T>>,
    ) -> Result<Self>
    where
        S: Read + Write + Seek + Send + 'static,
    {
        Self::check(strategy)?;
        let factory = DictionaryFactory::new(config.clone());
        let dictionary = factory.create_with::<Digest, T, S>(
            strategy,
            backing,
            Box::new(ByteArraySerializer::<32>),
            Box::new(serializer.clone()),
            Some(Box::new(HashChecksum)),
        )?;
        Ok(Self {
            dictionary,
            serializer,
        })
    }

    /// Set over an existing backing store; call `load` before use
    pub fn open<S>(
        config: &ContainerConfig,
        strategy: DictionaryStrategy,
        backing: S,
        serializer: Arc<dyn ItemSerializer<T>>,
    ) -> Result<Self>
    where
        S: Read + Write + Seek + Send + 'static,
    {
        Self::check(strategy)?;
        let factory = DictionaryFactory::new(config.clone());
        let dictionary = factory.open_with::<Digest, T, S>(
            strategy,
            backing,
            Box::new(ByteArraySerializer::<32>),
            Box::new(serializer.clone()),
            Some(Box::new(HashChecksum)),
        )?;
        Ok(Self {
            dictionary,
            serializer,
        })
    }

    fn check(strategy: DictionaryStrategy) -> Result<()> {
        match strategy {
            DictionaryStrategy::ConstantLengthKey | DictionaryStrategy::SlotKey => Ok(()),
            DictionaryStrategy::KeyValuePair => Err(StreamKvError::Config(
                "Hash set is backed by the clk or sk strategy".to_string(),
            )),
        }
    }
}

impl<T> StreamHashSet<T> {
    /// Digest identifying `item`
    pub fn digest(&self, item: &T) -> Result<Digest> {
        Ok(sha256(&self.serializer.serialize(item)?))
    }

    pub fn strategy(&self) -> DictionaryStrategy {
        self.dictionary.strategy()
    }

    /// Insert `item`; `false` if it was already present
    pub fn add(&self, item: &T) -> Result<bool> {
        let digest = self.digest(item)?;
        if self.dictionary.contains_key(&digest)? {
            return Ok(false);
        }
        self.dictionary.add(&digest, item)?;
        Ok(true)
    }

    /// Remove `item`; `false` if it was absent
    pub fn remove(&self, item: &T) -> Result<bool> {
        let digest = self.digest(item)?;
        self.dictionary.remove(&digest)
    }

    pub fn contains(&self, item: &T) -> Result<bool> {
        let digest = self.digest(item)?;
        self.dictionary.contains_key(&digest)
    }

    pub fn len(&self) -> Result<u64> {
        self.dictionary.len()
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.dictionary.is_empty()
    }

    pub fn clear(&self) -> Result<()> {
        self.dictionary.clear()
    }

    pub fn shrink(&self) -> Result<u64> {
        self.dictionary.shrink()
    }

    pub fn load(&self) -> Result<()> {
        self.dictionary.load()
    }

    pub fn requires_load(&self) -> Result<bool> {
        self.dictionary.requires_load()
    }

    pub fn flush(&self) -> Result<()> {
        self.dictionary.flush()
    }

    /// Items in slot order
    pub fn iter(&self) -> Result<BoxIter<'_, T>> {
        self.dictionary.values()
    }
}
