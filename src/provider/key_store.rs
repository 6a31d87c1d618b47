//! Key Store
//!
//! Side channel for fixed-width keys. Key of slot `i` lives at byte offset
//! `i * key_size` of a reserved record; reaped slots keep a zeroed entry.
//! An exact-key map is kept in memory and re-derived on Load.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{Result, StreamKvError};
use crate::stream::{SlotDescriptor, SlotStream};

use super::{MetaDataProvider, SlotEvent};

#[derive(Debug)]
pub struct KeyStore {
    record: u64,
    key_size: usize,
    keys: HashMap<Vec<u8>, u64>,
}

impl KeyStore {
    pub fn new(record: u64, key_size: usize) -> Self {
        Self {
            record,
            key_size,
            keys: HashMap::new(),
        }
    }

    pub fn key_size(&self) -> usize {
        self.key_size
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Slot holding exactly `key`
    pub fn lookup(&self, key: &[u8]) -> Option<u64> {
        self.keys.get(key).copied()
    }

    /// Persisted key bytes of slot `index`
    pub fn read_key(&self, stream: &mut dyn SlotStream, index: u64) -> Result<Vec<u8>> {
        stream.read_range(self.record, self.offset(index), self.key_size)
    }

    /// Derive the key map from the persisted array
    pub fn rebuild_from(
        &self,
        stream: &mut dyn SlotStream,
        descriptors: &[SlotDescriptor],
    ) -> Result<HashMap<Vec<u8>, u64>> {
        let stored = stream.descriptor(self.record)?.length;
        let mut keys = HashMap::with_capacity(descriptors.len());

        for (i, descriptor) in descriptors.iter().enumerate() {
            if !descriptor.is_live() {
                continue;
            }
            let index = i as u64;
            if self.offset(index) + self.key_size as u64 > stored {
                return Err(StreamKvError::Corruption(format!(
                    "Key store has no entry for live slot {}",
                    index
                )));
            }
            let key = self.read_key(stream, index)?;
            if let Some(previous) = keys.insert(key, index) {
                return Err(StreamKvError::Corruption(format!(
                    "Slots {} and {} share a key",
                    previous, index
                )));
            }
        }

        Ok(keys)
    }

    fn offset(&self, index: u64) -> u64 {
        index * self.key_size as u64
    }

    fn check_width(&self, key: &[u8]) -> Result<()> {
        if key.len() != self.key_size {
            return Err(StreamKvError::Config(format!(
                "Key of {} bytes does not match key store width {}",
                key.len(),
                self.key_size
            )));
        }
        Ok(())
    }

    fn stored_len(&self, stream: &mut dyn SlotStream) -> Result<u64> {
        Ok(stream.descriptor(self.record)?.length)
    }
}

impl MetaDataProvider for KeyStore {
    fn name(&self) -> &'static str {
        "key-store"
    }

    fn validate(&self, key: Option<&[u8]>, adding: bool) -> Result<()> {
        match key {
            Some(key) => self.check_width(key),
            None if adding => Err(StreamKvError::InvariantViolation(
                "Slot added without a key for the key store".to_string(),
            )),
            None => Ok(()),
        }
    }

    fn on_added(&mut self, stream: &mut dyn SlotStream, event: &SlotEvent<'_>) -> Result<()> {
        let key = event.key.ok_or_else(|| {
            StreamKvError::InvariantViolation(format!(
                "Slot {} added without a key for the key store",
                event.index
            ))
        })?;
        self.check_width(key)?;

        stream.write_range(self.record, self.offset(event.index), key)?;
        self.keys.insert(key.to_vec(), event.index);
        Ok(())
    }

    fn on_updated(
        &mut self,
        stream: &mut dyn SlotStream,
        _previous: &SlotDescriptor,
        event: &SlotEvent<'_>,
    ) -> Result<()> {
        let Some(key) = event.key else {
            return Ok(());
        };
        self.check_width(key)?;

        let old = self.read_key(stream, event.index)?;
        if old != key {
            if self.keys.get(&old) == Some(&event.index) {
                self.keys.remove(&old);
            }
            stream.write_range(self.record, self.offset(event.index), key)?;
            self.keys.insert(key.to_vec(), event.index);
        }
        Ok(())
    }

    fn on_reaped(
        &mut self,
        stream: &mut dyn SlotStream,
        index: u64,
        _previous: &SlotDescriptor,
    ) -> Result<()> {
        let old = self.read_key(stream, index)?;
        if self.keys.get(&old) == Some(&index) {
            self.keys.remove(&old);
        }
        stream.write_range(self.record, self.offset(index), &vec![0u8; self.key_size])
    }

    fn on_removed(&mut self, stream: &mut dyn SlotStream, index: u64) -> Result<()> {
        let stored = self.stored_len(stream)?;
        let start = self.offset(index + 1);
        if start > stored {
            return Ok(());
        }

        if start < stored {
            let tail = stream.read_range(self.record, start, (stored - start) as usize)?;
            stream.write_range(self.record, self.offset(index), &tail)?;
        }
        stream.truncate(self.record, stored - self.key_size as u64)
    }

    fn on_inserted(&mut self, stream: &mut dyn SlotStream, index: u64) -> Result<()> {
        let stored = self.stored_len(stream)?;
        let start = self.offset(index);
        if start >= stored {
            return Ok(());
        }

        let tail = stream.read_range(self.record, start, (stored - start) as usize)?;
        stream.write_range(self.record, start + self.key_size as u64, &tail)?;
        stream.write_range(self.record, start, &vec![0u8; self.key_size])
    }

    fn on_cleared(&mut self, stream: &mut dyn SlotStream) -> Result<()> {
        self.keys.clear();
        stream.truncate(self.record, 0)
    }

    fn rebuild(&mut self, stream: &mut dyn SlotStream, descriptors: &[SlotDescriptor]) -> Result<()> {
        self.keys = self.rebuild_from(stream, descriptors)?;
        debug!(keys = self.keys.len(), "Rebuilt key store");
        Ok(())
    }
}
