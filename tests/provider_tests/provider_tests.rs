//! Tests for metadata providers
//!
//! These tests verify:
//! - Hooks fire for every container mutation
//! - Checksum and digest indexes follow updates and reaps
//! - Key store and free-index stack survive a reopen
//! - Providers rebuild from slot traits when their state is missing
//! - A failing hook surfaces as the operation's error

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use streamkv::config::ContainerConfig;
use streamkv::container::{ObjectContainer, SlotWrite};
use streamkv::provider::{
    sha256, shared, ChecksumIndex, DigestIndex, FreeIndexStore, KeyStore, MetaDataProvider,
    SlotEvent,
};
use streamkv::stream::{ClusteredStream, SlotDescriptor, SlotStream};
use streamkv::{Result, StreamKvError};
use tempfile::TempDir;

// =============================================================================
// Helper Providers
// =============================================================================

/// Counts hook invocations
#[derive(Debug, Default)]
struct HookCounter {
    added: usize,
    updated: usize,
    reaped: usize,
    removed: usize,
    inserted: usize,
    cleared: usize,
    rebuilt: usize,
}

impl MetaDataProvider for HookCounter {
    fn name(&self) -> &'static str {
        "hook-counter"
    }

    fn on_added(&mut self, _stream: &mut dyn SlotStream, _event: &SlotEvent<'_>) -> Result<()> {
        self.added += 1;
        Ok(())
    }

    fn on_updated(
        &mut self,
        _stream: &mut dyn SlotStream,
        _previous: &SlotDescriptor,
        _event: &SlotEvent<'_>,
    ) -> Result<()> {
        self.updated += 1;
        Ok(())
    }

    fn on_reaped(
        &mut self,
        _stream: &mut dyn SlotStream,
        _index: u64,
        _previous: &SlotDescriptor,
    ) -> Result<()> {
        self.reaped += 1;
        Ok(())
    }

    fn on_removed(&mut self, _stream: &mut dyn SlotStream, _index: u64) -> Result<()> {
        self.removed += 1;
        Ok(())
    }

    fn on_inserted(&mut self, _stream: &mut dyn SlotStream, _index: u64) -> Result<()> {
        self.inserted += 1;
        Ok(())
    }

    fn on_cleared(&mut self, _stream: &mut dyn SlotStream) -> Result<()> {
        self.cleared += 1;
        Ok(())
    }

    fn rebuild(&mut self, _stream: &mut dyn SlotStream, _descriptors: &[SlotDescriptor]) -> Result<()> {
        self.rebuilt += 1;
        Ok(())
    }
}

/// Rejects every Add
struct RejectWrites;

impl MetaDataProvider for RejectWrites {
    fn name(&self) -> &'static str {
        "reject-writes"
    }

    fn on_added(&mut self, _stream: &mut dyn SlotStream, event: &SlotEvent<'_>) -> Result<()> {
        Err(StreamKvError::InvariantViolation(format!(
            "refusing slot {}",
            event.index
        )))
    }

    fn on_updated(
        &mut self,
        _stream: &mut dyn SlotStream,
        _previous: &SlotDescriptor,
        event: &SlotEvent<'_>,
    ) -> Result<()> {
        Err(StreamKvError::InvariantViolation(format!(
            "refusing update of slot {}",
            event.index
        )))
    }

    fn rebuild(&mut self, _stream: &mut dyn SlotStream, _descriptors: &[SlotDescriptor]) -> Result<()> {
        Ok(())
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn open_container(path: &Path, config: &ContainerConfig) -> ObjectContainer {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .unwrap();

    if file.metadata().unwrap().len() == 0 {
        let stream = ClusteredStream::create(file, config).unwrap();
        ObjectContainer::create(Box::new(stream)).unwrap()
    } else {
        let stream = ClusteredStream::open(file).unwrap();
        ObjectContainer::open(Box::new(stream)).unwrap()
    }
}

// =============================================================================
// Hook Dispatch Tests
// =============================================================================

#[test]
fn test_every_mutation_fires_its_hook() {
    let container = ObjectContainer::in_memory(&ContainerConfig::default()).unwrap();
    let counter = shared(HookCounter::default());
    container.register_provider(counter.clone()).unwrap();

    container.add(SlotWrite::value(b"a".to_vec())).unwrap();
    container.add(SlotWrite::value(b"b".to_vec())).unwrap();
    container.update(0, SlotWrite::value(b"a2".to_vec())).unwrap();
    container.reap(1).unwrap();
    container.insert(0, SlotWrite::value(b"z".to_vec())).unwrap();
    container.remove_physical(0).unwrap();
    container.clear().unwrap();

    let counts = counter.lock();
    // One rebuild at registration, one each after insert and remove
    assert_eq!(counts.rebuilt, 3);
    assert_eq!(counts.added, 3);
    assert_eq!(counts.updated, 1);
    assert_eq!(counts.reaped, 1);
    assert_eq!(counts.inserted, 1);
    assert_eq!(counts.removed, 1);
    assert_eq!(counts.cleared, 1);
}

#[test]
fn test_failing_hook_aborts_operation() {
    let container = ObjectContainer::in_memory(&ContainerConfig::default()).unwrap();
    container.register_provider(shared(RejectWrites)).unwrap();

    let result = container.add(SlotWrite::value(b"x".to_vec()));
    assert!(matches!(result, Err(StreamKvError::InvariantViolation(_))));
    assert_eq!(container.count().unwrap(), 0);
    assert_eq!(container.total_slots().unwrap(), 0);
}

#[test]
fn test_failed_add_returns_recycled_index() {
    let config = ContainerConfig::builder().reserved_slots(1).build();
    let container = ObjectContainer::in_memory(&config).unwrap();
    let free = shared(FreeIndexStore::new(0));
    let checksums = shared(ChecksumIndex::new());
    container.register_provider(free.clone()).unwrap();
    container.register_provider(checksums.clone()).unwrap();

    container.add(SlotWrite::value(b"a".to_vec())).unwrap();
    container.add(SlotWrite::value(b"b".to_vec())).unwrap();
    container.reap(0).unwrap();
    let generation = container.generation().unwrap();

    container.register_provider(shared(RejectWrites)).unwrap();
    let result = container.add(SlotWrite::value(b"c".to_vec()).with_checksum(4));
    assert!(result.is_err());

    assert!(!container.is_live(0).unwrap());
    assert_eq!(container.count().unwrap(), 1);
    assert_eq!(container.reaped_count().unwrap(), 1);
    assert_eq!(container.generation().unwrap(), generation);
    assert_eq!(free.lock().indices(), &[0]);
    assert!(checksums.lock().lookup(4).is_empty());
}

#[test]
fn test_failed_update_restores_slot() {
    let container = ObjectContainer::in_memory(&ContainerConfig::default()).unwrap();
    let checksums = shared(ChecksumIndex::new());
    container.register_provider(checksums.clone()).unwrap();
    container
        .add(SlotWrite::value(b"old".to_vec()).with_checksum(1))
        .unwrap();

    container.register_provider(shared(RejectWrites)).unwrap();
    let result = container.update(0, SlotWrite::value(b"new".to_vec()).with_checksum(2));
    assert!(result.is_err());

    assert_eq!(container.read_value(0).unwrap(), b"old");
    assert_eq!(container.descriptor(0).unwrap().checksum, 1);
    assert_eq!(checksums.lock().lookup(1), vec![0]);
    assert!(checksums.lock().lookup(2).is_empty());
}

#[test]
fn test_failed_insert_leaves_slots_in_place() {
    let config = ContainerConfig::builder().reserved_slots(1).build();
    let container = ObjectContainer::in_memory(&config).unwrap();
    let keys = shared(KeyStore::new(0, 2));
    container.register_provider(keys.clone()).unwrap();
    for key in [b"k0", b"k1"] {
        container
            .add(SlotWrite::value(key.to_vec()).with_side_key(key.to_vec()))
            .unwrap();
    }

    container.register_provider(shared(RejectWrites)).unwrap();
    let result = container.insert(0, SlotWrite::value(b"z".to_vec()).with_side_key(b"kz".to_vec()));
    assert!(result.is_err());

    assert_eq!(container.total_slots().unwrap(), 2);
    assert_eq!(container.read_value(0).unwrap(), b"k0");
    assert_eq!(keys.lock().lookup(b"k1"), Some(1));
    assert_eq!(keys.lock().lookup(b"kz"), None);
}

#[test]
fn test_registration_rebuilds_from_existing_slots() {
    let container = ObjectContainer::in_memory(&ContainerConfig::default()).unwrap();
    container
        .add(SlotWrite::value(b"v".to_vec()).with_checksum(3))
        .unwrap();
    container
        .add(SlotWrite::value(b"w".to_vec()).with_checksum(3))
        .unwrap();

    let index = shared(ChecksumIndex::new());
    container.register_provider(index.clone()).unwrap();

    assert_eq!(index.lock().lookup(3), vec![0, 1]);
}

// =============================================================================
// Checksum & Digest Index Tests
// =============================================================================

#[test]
fn test_checksum_index_follows_updates_and_reaps() {
    let container = ObjectContainer::in_memory(&ContainerConfig::default()).unwrap();
    let index = shared(ChecksumIndex::new());
    container.register_provider(index.clone()).unwrap();

    container
        .add(SlotWrite::value(b"a".to_vec()).with_checksum(10))
        .unwrap();
    container
        .add(SlotWrite::value(b"b".to_vec()).with_checksum(20))
        .unwrap();
    container
        .update(0, SlotWrite::value(b"a".to_vec()).with_checksum(20))
        .unwrap();

    assert!(index.lock().lookup(10).is_empty());
    let mut candidates = index.lock().lookup(20);
    candidates.sort_unstable();
    assert_eq!(candidates, vec![0, 1]);

    container.reap(1).unwrap();
    assert_eq!(index.lock().lookup(20), vec![0]);
    assert_eq!(index.lock().len(), 1);
}

#[test]
fn test_digest_index_tracks_values() {
    let container = ObjectContainer::in_memory(&ContainerConfig::default()).unwrap();
    let digests = shared(DigestIndex::new());
    container.register_provider(digests.clone()).unwrap();

    container.add(SlotWrite::value(b"alpha".to_vec())).unwrap();
    container.add(SlotWrite::value(b"beta".to_vec())).unwrap();

    assert_eq!(digests.lock().find(&sha256(b"beta")), Some(1));
    assert_eq!(digests.lock().digest(0), Some(sha256(b"alpha")));

    container.reap(0).unwrap();
    assert_eq!(digests.lock().digest(0), None);
    assert_eq!(digests.lock().find(&sha256(b"alpha")), None);
}

#[test]
fn test_digest_index_skips_null_items() {
    let container = ObjectContainer::in_memory(&ContainerConfig::default()).unwrap();
    let digests = shared(DigestIndex::new());
    container.register_provider(digests.clone()).unwrap();

    container.add(SlotWrite::null()).unwrap();
    container.add(SlotWrite::value(Vec::new())).unwrap();
    assert_eq!(digests.lock().digest(0), None);
    assert_eq!(digests.lock().digest(1), Some(sha256(b"")));

    // Same answer when derived from the stream
    let rebuilt = shared(DigestIndex::new());
    container.register_provider(rebuilt.clone()).unwrap();
    assert_eq!(rebuilt.lock().digest(0), None);
    assert_eq!(rebuilt.lock().digest(1), Some(sha256(b"")));
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_key_store_and_free_stack_survive_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("providers.skv");
    let config = ContainerConfig::builder().reserved_slots(2).build();

    {
        let container = open_container(&path, &config);
        container
            .register_provider(shared(FreeIndexStore::new(0)))
            .unwrap();
        container
            .register_provider(shared(KeyStore::new(1, 4)))
            .unwrap();

        for key in [b"key0", b"key1", b"key2"] {
            container
                .add(SlotWrite::value(b"v".to_vec()).with_side_key(key.to_vec()))
                .unwrap();
        }
        container.reap(1).unwrap();
        container.flush().unwrap();
    }

    let container = open_container(&path, &config);
    let free = shared(FreeIndexStore::new(0));
    let keys = shared(KeyStore::new(1, 4));
    container.register_provider(free.clone()).unwrap();
    container.register_provider(keys.clone()).unwrap();
    assert!(container.requires_load().unwrap());

    container.load().unwrap();

    assert_eq!(free.lock().indices(), &[1]);
    assert_eq!(keys.lock().lookup(b"key2"), Some(2));
    assert_eq!(keys.lock().lookup(b"key1"), None);
    assert_eq!(keys.lock().len(), 2);

    let reused = container
        .add(SlotWrite::value(b"w".to_vec()).with_side_key(b"key9".to_vec()))
        .unwrap();
    assert_eq!(reused, 1);
    assert_eq!(keys.lock().lookup(b"key9"), Some(1));
}

#[test]
fn test_free_stack_rebuilt_when_provider_was_absent() {
    let config = ContainerConfig::builder().reserved_slots(1).build();
    let container = ObjectContainer::in_memory(&config).unwrap();
    for i in 0..4u8 {
        container.add(SlotWrite::value(vec![i])).unwrap();
    }
    container.reap(1).unwrap();
    container.reap(3).unwrap();

    // Reaps happened with nobody maintaining the stack
    let free = shared(FreeIndexStore::new(0));
    container.register_provider(free.clone()).unwrap();
    assert_eq!(free.lock().indices(), &[1, 3]);

    assert_eq!(container.add(SlotWrite::value(b"x".to_vec())).unwrap(), 3);
    assert_eq!(container.add(SlotWrite::value(b"y".to_vec())).unwrap(), 1);
}

#[test]
fn test_key_store_follows_shrink() {
    let config = ContainerConfig::builder().reserved_slots(1).build();
    let container = ObjectContainer::in_memory(&config).unwrap();
    let keys = shared(KeyStore::new(0, 2));
    container.register_provider(keys.clone()).unwrap();

    for key in [b"k0", b"k1", b"k2"] {
        container
            .add(SlotWrite::value(key.to_vec()).with_side_key(key.to_vec()))
            .unwrap();
    }
    container.reap(0).unwrap();
    container.shrink().unwrap();

    assert_eq!(keys.lock().lookup(b"k1"), Some(0));
    assert_eq!(keys.lock().lookup(b"k2"), Some(1));
    assert_eq!(container.read_value(1).unwrap(), b"k2");
}

#[test]
fn test_key_store_rejects_wrong_width() {
    let config = ContainerConfig::builder().reserved_slots(1).build();
    let container = ObjectContainer::in_memory(&config).unwrap();
    let keys: Arc<Mutex<KeyStore>> = shared(KeyStore::new(0, 8));
    container.register_provider(keys).unwrap();

    let result = container.add(SlotWrite::value(b"v".to_vec()).with_side_key(b"short".to_vec()));
    assert!(matches!(result, Err(StreamKvError::Config(_))));
    assert_eq!(container.count().unwrap(), 0);

    // Nothing was written, so a fresh key store still rebuilds cleanly
    container
        .register_provider(shared(KeyStore::new(0, 8)))
        .unwrap();
    let index = container
        .add(SlotWrite::value(b"v".to_vec()).with_side_key(b"eightkey".to_vec()))
        .unwrap();
    assert_eq!(index, 0);
}
