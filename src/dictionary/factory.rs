//! Dictionary strategy selection
//!
//! A key serializer with a known constant size at or below the CLK threshold
//! selects the constant-length-key strategy. Otherwise a key checksum
//! function selects key-value-pair. With neither, selection fails.

use std::io::{Cursor, Read, Seek, Write};

use tracing::debug;

use crate::checksum::KeyChecksum;
use crate::config::ContainerConfig;
use crate::error::{Result, StreamKvError};
use crate::serializer::ItemSerializer;
use crate::stream::{ClusteredStream, SlotStream};

use super::{ClkDictionary, DictionaryStrategy, KvpDictionary, SlotKeyDictionary, StreamDictionary};

/// Boxed dictionary of any strategy
pub type DynDictionary<K, V> = Box<dyn StreamDictionary<K, V> + Send>;

/// Builds dictionaries from serializer characteristics
#[derive(Debug, Clone, Default)]
pub struct DictionaryFactory {
    config: ContainerConfig,
}

impl DictionaryFactory {
    pub fn new(config: ContainerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    /// Pick a strategy for a key serializer
    pub fn select_strategy<K>(
        &self,
        key_serializer: &dyn ItemSerializer<K>,
        has_checksum: bool,
    ) -> Result<DictionaryStrategy> {
        match key_serializer.constant_size() {
            Some(size) if size <= self.config.clk_threshold => {
                Ok(DictionaryStrategy::ConstantLengthKey)
            }
            _ if has_checksum => Ok(DictionaryStrategy::KeyValuePair),
            size => Err(StreamKvError::Config(format!(
                "No dictionary strategy: key size {:?} exceeds CLK threshold {} and no checksum was supplied",
                size, self.config.clk_threshold
            ))),
        }
    }

    /// New in-memory dictionary with an automatically selected strategy
    pub fn create_in_memory<K, V>(
        &self,
        key_serializer: Box<dyn ItemSerializer<K>>,
        value_serializer: Box<dyn ItemSerializer<V>>,
        checksum: Option<Box<dyn KeyChecksum<K>>>,
    ) -> Result<DynDictionary<K, V>>
    where
        K: PartialEq + 'static,
        V: 'static,
    {
        self.create(Cursor::new(Vec::new()), key_serializer, value_serializer, checksum)
    }

    /// New dictionary on an empty backing store with an automatically selected strategy
    pub fn create<K, V, S>(
        &self,
        backing: S,
        key_serializer: Box<dyn ItemSerializer<K>>,
        value_serializer: Box<dyn ItemSerializer<V>>,
        checksum: Option<Box<dyn KeyChecksum<K>>>,
    ) -> Result<DynDictionary<K, V>>
    where
        K: PartialEq + 'static,
        V: 'static,
        S: Read + Write + Seek + Send + 'static,
    {
        let strategy = self.select_strategy(key_serializer.as_ref(), checksum.is_some())?;
        self.create_with(strategy, backing, key_serializer, value_serializer, checksum)
    }

    /// New dictionary of an explicit strategy
    pub fn create_with<K, V, S>(
        &self,
        strategy: DictionaryStrategy,
        backing: S,
        key_serializer: Box<dyn ItemSerializer<K>>,
        value_serializer: Box<dyn ItemSerializer<V>>,
        checksum: Option<Box<dyn KeyChecksum<K>>>,
    ) -> Result<DynDictionary<K, V>>
    where
        K: PartialEq + 'static,
        V: 'static,
        S: Read + Write + Seek + Send + 'static,
    {
        let config = ContainerConfig {
            reserved_slots: strategy.reserved_slots(),
            ..self.config.clone()
        };
        let stream: Box<dyn SlotStream> = Box::new(ClusteredStream::create(backing, &config)?);
        debug!(%strategy, "Creating dictionary");
        Self::build(strategy, stream, false, key_serializer, value_serializer, checksum)
    }

    /// Dictionary over an existing backing store, strategy chosen as at creation
    ///
    /// The result requires `load` before use.
    pub fn open<K, V, S>(
        &self,
        backing: S,
        key_serializer: Box<dyn ItemSerializer<K>>,
        value_serializer: Box<dyn ItemSerializer<V>>,
        checksum: Option<Box<dyn KeyChecksum<K>>>,
    ) -> Result<DynDictionary<K, V>>
    where
        K: PartialEq + 'static,
        V: 'static,
        S: Read + Write + Seek + Send + 'static,
    {
        let strategy = self.select_strategy(key_serializer.as_ref(), checksum.is_some())?;
        self.open_with(strategy, backing, key_serializer, value_serializer, checksum)
    }

    /// Dictionary of an explicit strategy over an existing backing store
    pub fn open_with<K, V, S>(
        &self,
        strategy: DictionaryStrategy,
        backing: S,
        key_serializer: Box<dyn ItemSerializer<K>>,
        value_serializer: Box<dyn ItemSerializer<V>>,
        checksum: Option<Box<dyn KeyChecksum<K>>>,
    ) -> Result<DynDictionary<K, V>>
    where
        K: PartialEq + 'static,
        V: 'static,
        S: Read + Write + Seek + Send + 'static,
    {
        let stream: Box<dyn SlotStream> = Box::new(ClusteredStream::open(backing)?);
        debug!(%strategy, "Opening dictionary");
        Self::build(strategy, stream, true, key_serializer, value_serializer, checksum)
    }

    fn build<K, V>(
        strategy: DictionaryStrategy,
        stream: Box<dyn SlotStream>,
        existing: bool,
        key_serializer: Box<dyn ItemSerializer<K>>,
        value_serializer: Box<dyn ItemSerializer<V>>,
        checksum: Option<Box<dyn KeyChecksum<K>>>,
    ) -> Result<DynDictionary<K, V>>
    where
        K: PartialEq + 'static,
        V: 'static,
    {
        let require_checksum = |checksum: Option<Box<dyn KeyChecksum<K>>>| {
            checksum.ok_or_else(|| {
                StreamKvError::Config(format!("{} dictionary requires a key checksum", strategy))
            })
        };

        let dictionary: DynDictionary<K, V> = match strategy {
            DictionaryStrategy::KeyValuePair => {
                let checksum = require_checksum(checksum)?;
                if existing {
                    Box::new(KvpDictionary::open(stream, key_serializer, value_serializer, checksum)?)
                } else {
                    Box::new(KvpDictionary::create(stream, key_serializer, value_serializer, checksum)?)
                }
            }
            DictionaryStrategy::ConstantLengthKey => {
                if existing {
                    Box::new(ClkDictionary::open(stream, key_serializer, value_serializer)?)
                } else {
                    Box::new(ClkDictionary::create(stream, key_serializer, value_serializer)?)
                }
            }
            DictionaryStrategy::SlotKey => {
                let checksum = require_checksum(checksum)?;
                if existing {
                    Box::new(SlotKeyDictionary::open(
                        stream,
                        key_serializer,
                        value_serializer,
                        checksum,
                    )?)
                } else {
                    Box::new(SlotKeyDictionary::create(
                        stream,
                        key_serializer,
                        value_serializer,
                        checksum,
                    )?)
                }
            }
        };
        Ok(dictionary)
    }
}
