//! Dictionary Module
//!
//! Persistent key→value maps over an object container. Three strategies
//! share one interface and differ in where the key lives:
//!
//! | Strategy | Key location                 | Lookup            | Duplicate Add |
//! |----------|------------------------------|-------------------|---------------|
//! | KVP      | serialized with the value    | checksum index    | upsert        |
//! | CLK      | fixed-width key-store record | exact key map     | `DuplicateKey`|
//! | SK       | inline slot key              | checksum index    | `DuplicateKey`|
//!
//! Every candidate found through an index is re-verified against the
//! stored key before it counts as a match.

mod clk;
mod factory;
mod kvp;
mod slot_key;

pub use clk::ClkDictionary;
pub use factory::{DictionaryFactory, DynDictionary};
pub use kvp::KvpDictionary;
pub use slot_key::SlotKeyDictionary;

use std::fmt;

use crate::config::StreamPolicy;
use crate::container::ObjectContainer;
use crate::error::{Result, StreamKvError};
use crate::stream::SlotStream;

/// Boxed fallible iterator borrowed from a collection
pub type BoxIter<'a, T> = Box<dyn Iterator<Item = Result<T>> + 'a>;

/// Dictionary storage strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DictionaryStrategy {
    /// Key and value serialized together, located by checksum
    KeyValuePair,
    /// Constant-size keys in a side-channel key store
    ConstantLengthKey,
    /// Key stored inline in the slot, located by checksum
    SlotKey,
}

impl DictionaryStrategy {
    /// Reserved records the strategy's providers need
    pub fn reserved_slots(self) -> u32 {
        match self {
            DictionaryStrategy::KeyValuePair => kvp::RESERVED_SLOTS,
            DictionaryStrategy::ConstantLengthKey => clk::RESERVED_SLOTS,
            DictionaryStrategy::SlotKey => slot_key::RESERVED_SLOTS,
        }
    }
}

impl fmt::Display for DictionaryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DictionaryStrategy::KeyValuePair => "kvp",
            DictionaryStrategy::ConstantLengthKey => "clk",
            DictionaryStrategy::SlotKey => "sk",
        };
        f.write_str(name)
    }
}

/// Common interface of every dictionary strategy
///
/// All methods take `&self`; the owning container serializes access.
pub trait StreamDictionary<K, V> {
    fn strategy(&self) -> DictionaryStrategy;

    /// Underlying container
    fn container(&self) -> &ObjectContainer;

    /// Insert a pair; behavior on an existing key depends on the strategy
    fn add(&self, key: &K, value: &V) -> Result<()>;

    /// Replace the value of an existing key (`KeyNotFound` otherwise)
    fn update(&self, key: &K, value: &V) -> Result<()>;

    /// Remove a key, returning whether it was present
    fn remove(&self, key: &K) -> Result<bool>;

    /// Slot index holding `key`
    fn try_find_key(&self, key: &K) -> Result<Option<u64>>;

    fn try_get_value(&self, key: &K) -> Result<Option<V>>;

    fn keys(&self) -> Result<BoxIter<'_, K>>;

    fn values(&self) -> Result<BoxIter<'_, V>>;

    fn iter(&self) -> Result<BoxIter<'_, (K, V)>>;

    fn get(&self, key: &K) -> Result<V> {
        self.try_get_value(key)?.ok_or(StreamKvError::KeyNotFound)
    }

    fn contains_key(&self, key: &K) -> Result<bool> {
        Ok(self.try_find_key(key)?.is_some())
    }

    /// Remove the pair stored in slot `index`
    fn remove_at(&self, index: u64) -> Result<()> {
        self.container().reap(index)
    }

    fn len(&self) -> Result<u64> {
        self.container().count()
    }

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn clear(&self) -> Result<()> {
        self.container().clear()
    }

    /// Compact reaped slots; returns how many were dropped
    fn shrink(&self) -> Result<u64> {
        self.container().shrink()
    }

    fn requires_load(&self) -> Result<bool> {
        self.container().requires_load()
    }

    fn load(&self) -> Result<()> {
        self.container().load()
    }

    fn flush(&self) -> Result<()> {
        self.container().flush()
    }
}

/// Validate a stream before a strategy attaches to it
fn check_stream(
    stream: &dyn SlotStream,
    strategy: DictionaryStrategy,
    needs: impl Fn(&StreamPolicy) -> Option<&'static str>,
) -> Result<()> {
    let header = stream.header();
    let expected = strategy.reserved_slots();
    if header.reserved_records != expected {
        return Err(StreamKvError::Config(format!(
            "{} dictionary needs {} reserved slots, stream has {}",
            strategy, expected, header.reserved_records
        )));
    }
    if let Some(missing) = needs(&header.policy) {
        return Err(StreamKvError::Config(format!(
            "{} dictionary requires {} in the stream policy",
            strategy, missing
        )));
    }
    Ok(())
}
