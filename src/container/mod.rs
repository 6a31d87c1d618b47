//! Object Container Module
//!
//! Slot arena over a slot stream: the substrate every collection builds on.
//!
//! ## Responsibilities
//! - Map application indices onto stream records past the reserved region
//! - Slot lifecycle: Add (recycling reaped indices), Update, Reap, Shrink
//! - Drive metadata-provider hooks inside every mutation
//! - Single-entry access scope, generation counter for fail-fast enumeration
//!
//! ## Concurrency Model
//!
//! All state sits behind one `parking_lot::Mutex`. Every public operation
//! takes the lock for its whole duration, so provider hooks always observe a
//! consistent container. `enter_access_scope` exposes the same lock for
//! multi-step operations; entering while a scope is held fails with
//! `ReentrantAccess` instead of deadlocking.
//!
//! Lock order is container state, then a provider. Code holding a provider
//! lock must not call back into the container.

mod iter;
mod scope;
mod write;

pub use iter::ContainerIter;
pub use scope::SlotScope;
pub use write::{KeyPlacement, SlotWrite};

use std::io::Cursor;
use std::ops::{Deref, DerefMut};

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::config::ContainerConfig;
use crate::error::{Result, StreamKvError};
use crate::provider::{MetaDataProvider, SharedProvider, SlotEvent};
use crate::stream::{ClusteredStream, SlotDescriptor, SlotStream, SlotTraits, StreamHeader};

// =============================================================================
// Container State
// =============================================================================

/// Everything guarded by the container lock
pub struct ContainerState {
    stream: Box<dyn SlotStream>,
    providers: Vec<SharedProvider>,
    /// Bumped by every mutation
    generation: u64,
    /// Set when opened over existing data until `load` runs
    requires_load: bool,
    /// Reaped data slots
    reaped: u64,
}

impl ContainerState {
    // =========================================================================
    // Inspection
    // =========================================================================

    pub fn header(&self) -> &StreamHeader {
        self.stream.header()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn requires_load(&self) -> bool {
        self.requires_load
    }

    /// Data slots, live and reaped
    pub fn total_slots(&self) -> u64 {
        self.stream.header().data_records()
    }

    /// Live slots
    pub fn count(&self) -> Result<u64> {
        self.ensure_loaded()?;
        Ok(self.total_slots() - self.reaped)
    }

    pub fn reaped_count(&self) -> Result<u64> {
        self.ensure_loaded()?;
        Ok(self.reaped)
    }

    pub fn ensure_loaded(&self) -> Result<()> {
        if self.requires_load {
            return Err(StreamKvError::RequiresLoad);
        }
        Ok(())
    }

    /// Raw descriptor of a data slot (no load required)
    pub fn descriptor(&mut self, index: u64) -> Result<SlotDescriptor> {
        self.check_index(index)?;
        let record = self.record(index);
        self.stream.descriptor(record)
    }

    pub fn is_live(&mut self, index: u64) -> Result<bool> {
        self.ensure_loaded()?;
        Ok(self.descriptor(index)?.is_live())
    }

    pub fn is_null(&mut self, index: u64) -> Result<bool> {
        Ok(self.live_descriptor(index)?.is_null())
    }

    /// Value bytes of a live, non-null slot
    pub fn read_value(&mut self, index: u64) -> Result<Vec<u8>> {
        self.read_optional(index)?.ok_or_else(|| {
            StreamKvError::InvariantViolation(format!("Slot {} holds a null item", index))
        })
    }

    /// Value bytes of a live slot, `None` for a null item
    pub fn read_optional(&mut self, index: u64) -> Result<Option<Vec<u8>>> {
        if self.live_descriptor(index)?.is_null() {
            return Ok(None);
        }
        let record = self.record(index);
        self.stream.read_value(record).map(Some)
    }

    /// Inline key of a live slot
    pub fn read_key(&mut self, index: u64) -> Result<Vec<u8>> {
        self.live_descriptor(index)?;
        let record = self.record(index);
        self.stream.read_key(record)
    }

    /// Descriptors of every data slot, in index order
    pub fn descriptors(&mut self) -> Result<Vec<SlotDescriptor>> {
        let reserved = self.reserved();
        (0..self.total_slots())
            .map(|index| self.stream.descriptor(reserved + index))
            .collect()
    }

    // =========================================================================
    // Slot Lifecycle
    // =========================================================================

    /// Store an item, reusing a reaped index when a provider offers one
    ///
    /// A failed write or provider hook rolls the slot back before the error
    /// is returned.
    pub fn add(&mut self, write: SlotWrite) -> Result<u64> {
        self.ensure_loaded()?;
        self.validate(&write, true)?;

        let (index, recycled) = match self.take_free_index()? {
            Some(index) => {
                let descriptor = self.descriptor(index)?;
                if !descriptor.is_reaped() {
                    return Err(StreamKvError::InvariantViolation(format!(
                        "Free index {} refers to a slot that is not reaped ({:?})",
                        index, descriptor.traits
                    )));
                }
                (index, true)
            }
            None => {
                let record = self.stream.append_record()?;
                (record - self.reserved(), false)
            }
        };

        let descriptor = match self.write_slot(index, &write) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                let undo = self.undo_add(index, recycled, 0, &SlotDescriptor::default());
                return Err(Self::rolled_back(index, e, undo));
            }
        };

        let event = Self::event(index, descriptor, &write);
        if let Err((notified, e)) =
            self.notify_counted(|provider, stream| provider.on_added(stream, &event))
        {
            let undo = self.undo_add(index, recycled, notified, &descriptor);
            return Err(Self::rolled_back(index, e, undo));
        }

        if recycled {
            self.reaped -= 1;
        }
        self.generation += 1;

        debug!(index, recycled, "Added slot");
        Ok(index)
    }

    /// Rewrite a live slot in place, restoring the old contents on failure
    pub fn update(&mut self, index: u64, write: SlotWrite) -> Result<()> {
        self.validate(&write, false)?;
        let previous = self.live_descriptor(index)?;
        let prior = self.snapshot(index, &previous)?;

        let descriptor = match self.write_slot(index, &write) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                let undo = self.undo_update(index, &prior, 0, &previous);
                return Err(Self::rolled_back(index, e, undo));
            }
        };

        let event = Self::event(index, descriptor, &write);
        if let Err((notified, e)) = self
            .notify_counted(|provider, stream| provider.on_updated(stream, &previous, &event))
        {
            let undo = self.undo_update(index, &prior, notified, &descriptor);
            return Err(Self::rolled_back(index, e, undo));
        }
        self.generation += 1;

        debug!(index, "Updated slot");
        Ok(())
    }

    /// Mark a live slot reaped; its index becomes recyclable
    pub fn reap(&mut self, index: u64) -> Result<()> {
        let previous = self.live_descriptor(index)?;

        let record = self.record(index);
        self.stream.reap_record(record)?;
        self.reaped += 1;
        self.generation += 1;

        self.notify(|provider, stream| provider.on_reaped(stream, index, &previous))?;

        debug!(index, "Reaped slot");
        Ok(())
    }

    /// Insert an item at `index`, shifting later slots up by one
    pub fn insert(&mut self, index: u64, write: SlotWrite) -> Result<()> {
        self.ensure_loaded()?;
        self.validate(&write, true)?;
        let total = self.total_slots();
        if index > total {
            return Err(StreamKvError::IndexOutOfRange { index, len: total });
        }

        let record = self.record(index);
        self.stream.insert_record(record)?;

        let all = self.providers.len();
        if let Err((shifted, e)) =
            self.notify_counted(|provider, stream| provider.on_inserted(stream, index))
        {
            let undo = self.undo_insert(index, shifted, None);
            return Err(Self::rolled_back(index, e, undo));
        }

        let descriptor = match self.write_slot(index, &write) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                let undo = self.undo_insert(index, all, None);
                return Err(Self::rolled_back(index, e, undo));
            }
        };

        let event = Self::event(index, descriptor, &write);
        if let Err((notified, e)) =
            self.notify_counted(|provider, stream| provider.on_added(stream, &event))
        {
            let undo = self.undo_insert(index, all, Some((notified, descriptor)));
            return Err(Self::rolled_back(index, e, undo));
        }
        self.generation += 1;
        self.rebuild_providers()?;

        debug!(index, "Inserted slot");
        Ok(())
    }

    /// Physically delete slot `index`, shifting later slots down by one
    pub fn remove_physical(&mut self, index: u64) -> Result<()> {
        self.ensure_loaded()?;
        let descriptor = self.descriptor(index)?;

        let record = self.record(index);
        self.stream.remove_record(record)?;
        if descriptor.is_reaped() {
            self.reaped -= 1;
        }
        self.generation += 1;

        self.notify(|provider, stream| provider.on_removed(stream, index))?;
        self.rebuild_providers()?;

        debug!(index, "Removed slot");
        Ok(())
    }

    /// Drop every reaped slot, renumbering the survivors
    ///
    /// Returns the number of slots removed.
    pub fn shrink(&mut self) -> Result<u64> {
        self.ensure_loaded()?;
        if self.reaped == 0 {
            return Ok(0);
        }

        let mut removed = 0;
        for index in (0..self.total_slots()).rev() {
            if !self.descriptor(index)?.is_reaped() {
                continue;
            }
            let record = self.record(index);
            self.stream.remove_record(record)?;
            self.notify(|provider, stream| provider.on_removed(stream, index))?;
            removed += 1;
        }

        self.reaped = 0;
        self.generation += 1;
        self.rebuild_providers()?;

        info!(removed, remaining = self.total_slots(), "Shrunk container");
        Ok(removed)
    }

    /// Discard every data slot
    pub fn clear(&mut self) -> Result<()> {
        let reserved = self.reserved();
        while self.stream.record_count() > reserved {
            let last = self.stream.record_count() - 1;
            self.stream.remove_record(last)?;
        }

        self.reaped = 0;
        self.generation += 1;
        self.requires_load = false;
        self.notify(|provider, stream| provider.on_cleared(stream))?;

        info!("Cleared container");
        Ok(())
    }

    /// Rehydrate counters and every provider from the stream
    pub fn load(&mut self) -> Result<()> {
        let descriptors = self.descriptors()?;
        self.reaped = descriptors.iter().filter(|d| d.is_reaped()).count() as u64;

        let stream = self.stream.as_mut();
        for provider in &self.providers {
            provider.lock().rebuild(&mut *stream, &descriptors)?;
        }

        self.requires_load = false;
        self.generation += 1;

        info!(
            slots = descriptors.len(),
            reaped = self.reaped,
            providers = self.providers.len(),
            "Loaded container"
        );
        Ok(())
    }

    // =========================================================================
    // Providers & Extension
    // =========================================================================

    /// Attach a provider; it is rebuilt immediately unless a load is pending
    pub fn register_provider(&mut self, provider: SharedProvider) -> Result<()> {
        if !self.requires_load {
            let descriptors = self.descriptors()?;
            provider.lock().rebuild(self.stream.as_mut(), &descriptors)?;
        }
        debug!(provider = provider.lock().name(), "Registered provider");
        self.providers.push(provider);
        Ok(())
    }

    pub fn read_extension(&self, offset: usize, len: usize) -> Result<Vec<u8>> {
        let extension = self.stream.extension();
        match offset.checked_add(len) {
            Some(end) if end <= extension.len() => Ok(extension[offset..end].to_vec()),
            _ => Err(StreamKvError::IndexOutOfRange {
                index: offset as u64,
                len: extension.len() as u64,
            }),
        }
    }

    pub fn write_extension(&mut self, offset: usize, data: &[u8]) -> Result<()> {
        self.stream.write_extension(offset, data)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.stream.flush()
    }

    /// Stream access for collections reading their own side channels
    pub(crate) fn stream_mut(&mut self) -> &mut dyn SlotStream {
        self.stream.as_mut()
    }

    // =========================================================================
    // Internal Helpers
    // =========================================================================

    fn reserved(&self) -> u64 {
        self.stream.header().reserved_records as u64
    }

    fn record(&self, index: u64) -> u64 {
        self.reserved() + index
    }

    fn check_index(&self, index: u64) -> Result<()> {
        let len = self.total_slots();
        if index >= len {
            return Err(StreamKvError::IndexOutOfRange { index, len });
        }
        Ok(())
    }

    fn live_descriptor(&mut self, index: u64) -> Result<SlotDescriptor> {
        self.ensure_loaded()?;
        let descriptor = self.descriptor(index)?;
        if !descriptor.is_live() {
            return Err(StreamKvError::InvariantViolation(format!(
                "Slot {} is not live ({:?})",
                index, descriptor.traits
            )));
        }
        Ok(descriptor)
    }

    fn validate(&self, write: &SlotWrite, adding: bool) -> Result<()> {
        let policy = self.stream.header().policy;
        if write.checksum.is_some() && !policy.checksum_tracking {
            return Err(StreamKvError::Config(
                "Checksum supplied but checksum tracking is disabled".to_string(),
            ));
        }
        if write.has_inline_key() && !policy.key_tracking {
            return Err(StreamKvError::Config(
                "Inline key supplied but key tracking is disabled".to_string(),
            ));
        }
        for provider in &self.providers {
            provider.lock().validate(write.event_key(), adding)?;
        }
        Ok(())
    }

    fn write_slot(&mut self, index: u64, write: &SlotWrite) -> Result<SlotDescriptor> {
        let record = self.record(index);
        self.stream.write_record(
            record,
            write.traits(),
            write.checksum.unwrap_or(0),
            write.inline_key(),
            write.value_bytes(),
        )?;
        self.stream.descriptor(record)
    }

    fn event(index: u64, descriptor: SlotDescriptor, write: &SlotWrite) -> SlotEvent<'_> {
        SlotEvent {
            index,
            descriptor,
            key: write.event_key(),
            value: write.value.as_deref(),
        }
    }

    fn take_free_index(&mut self) -> Result<Option<u64>> {
        let stream = self.stream.as_mut();
        for provider in &self.providers {
            if let Some(index) = provider.lock().take_free_index(&mut *stream)? {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    fn notify<F>(&mut self, hook: F) -> Result<()>
    where
        F: FnMut(&mut dyn MetaDataProvider, &mut dyn SlotStream) -> Result<()>,
    {
        self.notify_counted(hook).map_err(|(_, e)| e)
    }

    /// Run `hook` on providers in order; on failure, also report how many succeeded
    fn notify_counted<F>(&mut self, hook: F) -> std::result::Result<(), (usize, StreamKvError)>
    where
        F: FnMut(&mut dyn MetaDataProvider, &mut dyn SlotStream) -> Result<()>,
    {
        let all = self.providers.len();
        self.notify_first(all, hook)
    }

    fn notify_first<F>(
        &mut self,
        count: usize,
        mut hook: F,
    ) -> std::result::Result<(), (usize, StreamKvError)>
    where
        F: FnMut(&mut dyn MetaDataProvider, &mut dyn SlotStream) -> Result<()>,
    {
        let stream = self.stream.as_mut();
        for (done, provider) in self.providers.iter().take(count).enumerate() {
            let mut guard = provider.lock();
            hook(&mut *guard, &mut *stream).map_err(|e| (done, e))?;
        }
        Ok(())
    }

    // =========================================================================
    // Rollback
    // =========================================================================

    /// Log a rollback failure and hand back the error that triggered it
    fn rolled_back(index: u64, cause: StreamKvError, undo: Result<()>) -> StreamKvError {
        match undo {
            Ok(()) => warn!(index, error = %cause, "Rolled back failed slot write"),
            Err(e) => warn!(index, error = %cause, rollback = %e, "Rollback incomplete"),
        }
        cause
    }

    /// Current contents of a live slot as a write that reproduces them
    fn snapshot(&mut self, index: u64, descriptor: &SlotDescriptor) -> Result<SlotWrite> {
        let record = self.record(index);
        let mut write = if descriptor.is_null() {
            SlotWrite::null()
        } else {
            SlotWrite::value(self.stream.read_value(record)?)
        };
        if descriptor.traits.contains(SlotTraits::KEYED) {
            write = write.with_inline_key(self.stream.read_key(record)?);
        }
        if let Some(checksum) = descriptor.tracked_checksum() {
            write = write.with_checksum(checksum);
        }
        Ok(write)
    }

    /// Return an added slot to its prior state; `notified` providers saw `on_added`
    fn undo_add(
        &mut self,
        index: u64,
        recycled: bool,
        notified: usize,
        descriptor: &SlotDescriptor,
    ) -> Result<()> {
        let record = self.record(index);
        if recycled {
            self.stream.reap_record(record)?;
            self.notify_first(notified, |provider, stream| {
                provider.on_reaped(stream, index, descriptor)
            })
            .map_err(|(_, e)| e)?;
        } else {
            self.notify_first(notified, |provider, stream| {
                provider.on_reaped(stream, index, descriptor)
            })
            .map_err(|(_, e)| e)?;
            self.stream.remove_record(record)?;
            self.notify(|provider, stream| provider.on_removed(stream, index))?;
        }
        self.rebuild_providers()
    }

    /// Put back the slot contents captured before an Update
    fn undo_update(
        &mut self,
        index: u64,
        prior: &SlotWrite,
        notified: usize,
        written: &SlotDescriptor,
    ) -> Result<()> {
        let restored = self.write_slot(index, prior)?;
        let event = Self::event(index, restored, prior);
        self.notify_first(notified, |provider, stream| {
            provider.on_updated(stream, written, &event)
        })
        .map_err(|(_, e)| e)?;
        self.rebuild_providers()
    }

    /// Remove an inserted slot; `shifted` providers saw `on_inserted`
    fn undo_insert(
        &mut self,
        index: u64,
        shifted: usize,
        added: Option<(usize, SlotDescriptor)>,
    ) -> Result<()> {
        if let Some((notified, descriptor)) = added {
            self.notify_first(notified, |provider, stream| {
                provider.on_reaped(stream, index, &descriptor)
            })
            .map_err(|(_, e)| e)?;
        }
        let record = self.record(index);
        self.stream.remove_record(record)?;
        self.notify_first(shifted, |provider, stream| provider.on_removed(stream, index))
            .map_err(|(_, e)| e)?;
        self.rebuild_providers()
    }

    fn rebuild_providers(&mut self) -> Result<()> {
        if self.providers.is_empty() {
            return Ok(());
        }
        let descriptors = self.descriptors()?;
        let stream = self.stream.as_mut();
        for provider in &self.providers {
            provider.lock().rebuild(&mut *stream, &descriptors)?;
        }
        Ok(())
    }
}

// =============================================================================
// Access Scope
// =============================================================================

/// Exclusive hold on a container for a multi-step operation
pub struct AccessScope<'a> {
    state: MutexGuard<'a, ContainerState>,
}

impl Deref for AccessScope<'_> {
    type Target = ContainerState;

    fn deref(&self) -> &ContainerState {
        &self.state
    }
}

impl DerefMut for AccessScope<'_> {
    fn deref_mut(&mut self) -> &mut ContainerState {
        &mut self.state
    }
}

// =============================================================================
// Object Container
// =============================================================================

/// Slot arena with attached metadata providers
///
/// Indices are stable while a slot is live. Reaped indices are reused by
/// later Adds when a free-index provider is attached, and renumbered only by
/// `shrink` or the shifting `insert`/`remove_physical`.
pub struct ObjectContainer {
    state: Mutex<ContainerState>,
}

impl ObjectContainer {
    /// Wrap a freshly created stream
    pub fn create(stream: Box<dyn SlotStream>) -> Result<Self> {
        let data = stream.header().data_records();
        if data != 0 {
            return Err(StreamKvError::Config(format!(
                "Stream already holds {} data slots; open it instead",
                data
            )));
        }
        Ok(Self::with_state(stream, false))
    }

    /// Wrap a stream holding existing data; `load` must run before use
    pub fn open(stream: Box<dyn SlotStream>) -> Result<Self> {
        Ok(Self::with_state(stream, true))
    }

    /// New container over an in-memory clustered stream
    pub fn in_memory(config: &ContainerConfig) -> Result<Self> {
        let stream: ClusteredStream<Cursor<Vec<u8>>> = ClusteredStream::in_memory(config)?;
        Self::create(Box::new(stream))
    }

    fn with_state(stream: Box<dyn SlotStream>, requires_load: bool) -> Self {
        Self {
            state: Mutex::new(ContainerState {
                stream,
                providers: Vec::new(),
                generation: 0,
                requires_load,
                reaped: 0,
            }),
        }
    }

    /// Take the container lock, failing instead of blocking if it is held
    pub fn enter_access_scope(&self) -> Result<AccessScope<'_>> {
        self.state
            .try_lock()
            .map(|state| AccessScope { state })
            .ok_or(StreamKvError::ReentrantAccess)
    }

    pub fn register_provider(&self, provider: SharedProvider) -> Result<()> {
        self.enter_access_scope()?.register_provider(provider)
    }

    pub fn load(&self) -> Result<()> {
        self.enter_access_scope()?.load()
    }

    pub fn requires_load(&self) -> Result<bool> {
        Ok(self.enter_access_scope()?.requires_load())
    }

    pub fn generation(&self) -> Result<u64> {
        Ok(self.enter_access_scope()?.generation())
    }

    pub fn header(&self) -> Result<StreamHeader> {
        Ok(self.enter_access_scope()?.header().clone())
    }

    pub fn count(&self) -> Result<u64> {
        self.enter_access_scope()?.count()
    }

    pub fn total_slots(&self) -> Result<u64> {
        let scope = self.enter_access_scope()?;
        scope.ensure_loaded()?;
        Ok(scope.total_slots())
    }

    pub fn reaped_count(&self) -> Result<u64> {
        self.enter_access_scope()?.reaped_count()
    }

    pub fn descriptor(&self, index: u64) -> Result<SlotDescriptor> {
        self.enter_access_scope()?.descriptor(index)
    }

    pub fn is_live(&self, index: u64) -> Result<bool> {
        self.enter_access_scope()?.is_live(index)
    }

    pub fn read_value(&self, index: u64) -> Result<Vec<u8>> {
        self.enter_access_scope()?.read_value(index)
    }

    pub fn read_optional(&self, index: u64) -> Result<Option<Vec<u8>>> {
        self.enter_access_scope()?.read_optional(index)
    }

    pub fn read_key(&self, index: u64) -> Result<Vec<u8>> {
        self.enter_access_scope()?.read_key(index)
    }

    pub fn add(&self, write: SlotWrite) -> Result<u64> {
        self.enter_access_scope()?.add(write)
    }

    pub fn update(&self, index: u64, write: SlotWrite) -> Result<()> {
        self.enter_access_scope()?.update(index, write)
    }

    pub fn reap(&self, index: u64) -> Result<()> {
        self.enter_access_scope()?.reap(index)
    }

    pub fn insert(&self, index: u64, write: SlotWrite) -> Result<()> {
        self.enter_access_scope()?.insert(index, write)
    }

    pub fn remove_physical(&self, index: u64) -> Result<()> {
        self.enter_access_scope()?.remove_physical(index)
    }

    pub fn shrink(&self) -> Result<u64> {
        self.enter_access_scope()?.shrink()
    }

    pub fn clear(&self) -> Result<()> {
        self.enter_access_scope()?.clear()
    }

    pub fn read_extension(&self, offset: usize, len: usize) -> Result<Vec<u8>> {
        self.enter_access_scope()?.read_extension(offset, len)
    }

    pub fn write_extension(&self, offset: usize, data: &[u8]) -> Result<()> {
        self.enter_access_scope()?.write_extension(offset, data)
    }

    pub fn flush(&self) -> Result<()> {
        self.enter_access_scope()?.flush()
    }

    /// Stage changes to one live slot; see [`SlotScope`]
    pub fn modify<F>(&self, index: u64, edit: F) -> Result<()>
    where
        F: FnOnce(&mut SlotScope<'_>) -> Result<()>,
    {
        let mut scope = self.enter_access_scope()?;
        let mut slot = scope.open_slot(index)?;
        match edit(&mut slot) {
            Ok(()) => slot.commit(),
            Err(e) => {
                slot.abort();
                Err(e)
            }
        }
    }

    /// Live slots as `(index, descriptor)`, failing fast on concurrent mutation
    pub fn iter(&self) -> Result<ContainerIter<'_, impl FnMut(&mut ContainerState, u64, &SlotDescriptor) -> Result<(u64, SlotDescriptor)>>> {
        self.iter_with(|_, index, descriptor| Ok((index, *descriptor)))
    }

    /// Live slots mapped through `read` inside the container lock
    pub fn iter_with<T, F>(&self, read: F) -> Result<ContainerIter<'_, F>>
    where
        F: FnMut(&mut ContainerState, u64, &SlotDescriptor) -> Result<T>,
    {
        let scope = self.enter_access_scope()?;
        scope.ensure_loaded()?;
        Ok(ContainerIter::new(self, scope.generation(), read))
    }
}

impl ContainerState {
    /// Open a staged edit of a live slot
    pub fn open_slot(&mut self, index: u64) -> Result<SlotScope<'_>> {
        let descriptor = self.live_descriptor(index)?;
        let record = self.record(index);
        let key = self.stream.read_key(record)?;
        let value = if descriptor.is_null() {
            None
        } else {
            Some(self.stream.read_value(record)?)
        };
        Ok(SlotScope::new(self, index, descriptor, key, value))
    }
}

impl Drop for ObjectContainer {
    fn drop(&mut self) {
        if let Err(e) = self.state.get_mut().flush() {
            warn!(error = %e, "Failed to flush container on drop");
        }
    }
}
