//! Metadata Provider Module
//!
//! Pluggable secondary structures attached to an object container and kept
//! consistent through synchronous mutation hooks.
//!
//! ## Responsibilities
//! - Receive every Add/Update/Reap/Clear on the owning container
//! - Follow physical renumbering (shifting remove/insert, Shrink)
//! - Rehydrate in-memory state from slot descriptors on Load
//!
//! ## Providers
//! - `FreeIndexStore`: LIFO stack of reaped indices (persisted in a reserved record)
//! - `ChecksumIndex`: checksum → candidate indices (derived from descriptors)
//! - `KeyStore`: fixed-width keys by index (persisted in a reserved record)
//! - `DigestIndex`: SHA-256 of every live value (derived from payloads)
//!
//! A hook returning an error aborts the container operation that fired it;
//! the container rolls the slot back and rebuilds every provider.

mod checksum_index;
mod digest_index;
mod free_index;
mod key_store;

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;
use crate::stream::{SlotDescriptor, SlotStream};

pub use checksum_index::ChecksumIndex;
pub use digest_index::{sha256, Digest, DigestIndex};
pub use free_index::FreeIndexStore;
pub use key_store::KeyStore;

/// Provider handle shared between a container and the collection that owns it
pub type SharedProvider = Arc<Mutex<dyn MetaDataProvider>>;

/// Wrap a provider for registration while keeping a typed handle
pub fn shared<P: MetaDataProvider + 'static>(provider: P) -> Arc<Mutex<P>> {
    Arc::new(Mutex::new(provider))
}

/// A slot that was just written
#[derive(Debug, Clone, Copy)]
pub struct SlotEvent<'a> {
    /// Application slot index
    pub index: u64,
    /// Descriptor as persisted
    pub descriptor: SlotDescriptor,
    /// Key bytes (inline or side-channel), when the write carried one
    pub key: Option<&'a [u8]>,
    /// Value bytes, `None` for a null item
    pub value: Option<&'a [u8]>,
}

/// Hooks invoked by the container inside each mutation
///
/// `stream` is the container's slot stream; providers persisting state use
/// their own reserved records in it.
pub trait MetaDataProvider: Send {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Reject a write before the container touches the stream
    ///
    /// `key` is the key the write carries; `adding` is false for an in-place update.
    fn validate(&self, _key: Option<&[u8]>, _adding: bool) -> Result<()> {
        Ok(())
    }

    /// A slot became live (fresh append or recycled index)
    fn on_added(&mut self, _stream: &mut dyn SlotStream, _event: &SlotEvent<'_>) -> Result<()> {
        Ok(())
    }

    /// A live slot was rewritten in place
    fn on_updated(
        &mut self,
        _stream: &mut dyn SlotStream,
        _previous: &SlotDescriptor,
        _event: &SlotEvent<'_>,
    ) -> Result<()> {
        Ok(())
    }

    /// A live slot was marked reaped
    fn on_reaped(
        &mut self,
        _stream: &mut dyn SlotStream,
        _index: u64,
        _previous: &SlotDescriptor,
    ) -> Result<()> {
        Ok(())
    }

    /// Slot `index` was physically removed; later slots moved down by one
    fn on_removed(&mut self, _stream: &mut dyn SlotStream, _index: u64) -> Result<()> {
        Ok(())
    }

    /// An empty slot was inserted at `index`; later slots moved up by one
    fn on_inserted(&mut self, _stream: &mut dyn SlotStream, _index: u64) -> Result<()> {
        Ok(())
    }

    /// Every data slot was discarded
    fn on_cleared(&mut self, _stream: &mut dyn SlotStream) -> Result<()> {
        Ok(())
    }

    /// Replace in-memory state with one derived from the data slot descriptors
    fn rebuild(&mut self, stream: &mut dyn SlotStream, descriptors: &[SlotDescriptor])
        -> Result<()>;

    /// Offer a recyclable index to Add, consuming it
    fn take_free_index(&mut self, _stream: &mut dyn SlotStream) -> Result<Option<u64>> {
        Ok(None)
    }
}

/// Absolute record number of an application slot
pub(crate) fn data_record(stream: &dyn SlotStream, index: u64) -> u64 {
    stream.header().reserved_records as u64 + index
}
