//! Tests for ObjectContainer
//!
//! These tests verify:
//! - Slot lifecycle (add, update, reap) and the count invariant
//! - Index recycling through the free-index store
//! - Shrink and shifting insert/remove
//! - Fail-fast enumeration and the access scope guard
//! - Scoped slot edits, null items, extension region
//! - Load requirements after reopening

use std::io::Cursor;

use streamkv::config::ContainerConfig;
use streamkv::container::{ObjectContainer, SlotWrite};
use streamkv::provider::{shared, FreeIndexStore};
use streamkv::stream::{ClusteredStream, SlotStream, SlotTraits};
use streamkv::StreamKvError;

// =============================================================================
// Helper Functions
// =============================================================================

fn plain_container() -> ObjectContainer {
    ObjectContainer::in_memory(&ContainerConfig::default()).unwrap()
}

/// Container with one reserved record and a free-index store attached
fn recycling_container() -> ObjectContainer {
    let config = ContainerConfig::builder().reserved_slots(1).build();
    let container = ObjectContainer::in_memory(&config).unwrap();
    container
        .register_provider(shared(FreeIndexStore::new(0)))
        .unwrap();
    container
}

fn value(bytes: &[u8]) -> SlotWrite {
    SlotWrite::value(bytes.to_vec())
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_add_read_update() {
    let container = plain_container();

    let index = container.add(value(b"first")).unwrap();
    assert_eq!(index, 0);
    assert_eq!(container.read_value(index).unwrap(), b"first");

    container.update(index, value(b"second, longer")).unwrap();
    assert_eq!(container.read_value(index).unwrap(), b"second, longer");
    assert_eq!(container.count().unwrap(), 1);
}

#[test]
fn test_count_is_total_minus_reaped() {
    let container = plain_container();
    for i in 0..5u8 {
        container.add(value(&[i])).unwrap();
    }
    container.reap(1).unwrap();
    container.reap(3).unwrap();

    assert_eq!(container.total_slots().unwrap(), 5);
    assert_eq!(container.reaped_count().unwrap(), 2);
    assert_eq!(container.count().unwrap(), 3);
}

#[test]
fn test_reap_clears_key_and_checksum() {
    let container = plain_container();
    let index = container
        .add(value(b"v").with_inline_key(b"k".to_vec()).with_checksum(11))
        .unwrap();

    container.reap(index).unwrap();

    let descriptor = container.descriptor(index).unwrap();
    assert_eq!(descriptor.traits, SlotTraits::REAPED);
    assert_eq!(descriptor.key_len, 0);
    assert_eq!(descriptor.tracked_checksum(), None);
}

#[test]
fn test_operations_on_reaped_slot_are_invariant_violations() {
    let container = plain_container();
    let index = container.add(value(b"x")).unwrap();
    container.reap(index).unwrap();

    assert!(matches!(
        container.read_value(index),
        Err(StreamKvError::InvariantViolation(_))
    ));
    assert!(matches!(
        container.reap(index),
        Err(StreamKvError::InvariantViolation(_))
    ));
    assert!(matches!(
        container.update(index, value(b"y")),
        Err(StreamKvError::InvariantViolation(_))
    ));
}

#[test]
fn test_out_of_range_index() {
    let container = plain_container();
    container.add(value(b"x")).unwrap();

    assert!(matches!(
        container.read_value(1),
        Err(StreamKvError::IndexOutOfRange { index: 1, len: 1 })
    ));
}

#[test]
fn test_null_item() {
    let container = plain_container();
    let index = container.add(SlotWrite::null()).unwrap();

    assert!(container.descriptor(index).unwrap().is_null());
    assert_eq!(container.read_optional(index).unwrap(), None);
    assert!(matches!(
        container.read_value(index),
        Err(StreamKvError::InvariantViolation(_))
    ));
    assert_eq!(container.count().unwrap(), 1);
}

// =============================================================================
// Recycling Tests
// =============================================================================

#[test]
fn test_add_reuses_most_recently_reaped_index() {
    let container = recycling_container();
    for i in 0..4u8 {
        container.add(value(&[i])).unwrap();
    }
    container.reap(0).unwrap();
    container.reap(2).unwrap();

    assert_eq!(container.add(value(b"x")).unwrap(), 2);
    assert_eq!(container.add(value(b"y")).unwrap(), 0);
    assert_eq!(container.add(value(b"z")).unwrap(), 4);
    assert_eq!(container.count().unwrap(), 5);
}

#[test]
fn test_without_free_index_store_add_appends() {
    let container = plain_container();
    container.add(value(b"a")).unwrap();
    container.reap(0).unwrap();

    assert_eq!(container.add(value(b"b")).unwrap(), 1);
}

// =============================================================================
// Shrink & Shifting Tests
// =============================================================================

#[test]
fn test_shrink_removes_reaped_slots_and_renumbers() {
    let container = recycling_container();
    for name in [b"a", b"b", b"c", b"d"] {
        container.add(value(name)).unwrap();
    }
    container.reap(0).unwrap();
    container.reap(2).unwrap();

    assert_eq!(container.shrink().unwrap(), 2);

    assert_eq!(container.total_slots().unwrap(), 2);
    assert_eq!(container.reaped_count().unwrap(), 0);
    assert_eq!(container.read_value(0).unwrap(), b"b");
    assert_eq!(container.read_value(1).unwrap(), b"d");

    // Free stack was emptied along with the reaped slots
    assert_eq!(container.add(value(b"e")).unwrap(), 2);
}

#[test]
fn test_shrink_without_reaped_slots_is_noop() {
    let container = plain_container();
    container.add(value(b"a")).unwrap();
    let generation = container.generation().unwrap();

    assert_eq!(container.shrink().unwrap(), 0);
    assert_eq!(container.generation().unwrap(), generation);
}

#[test]
fn test_insert_and_remove_physical() {
    let container = plain_container();
    container.add(value(b"a")).unwrap();
    container.add(value(b"c")).unwrap();

    container.insert(1, value(b"b")).unwrap();
    assert_eq!(container.read_value(1).unwrap(), b"b");
    assert_eq!(container.read_value(2).unwrap(), b"c");

    container.remove_physical(0).unwrap();
    assert_eq!(container.read_value(0).unwrap(), b"b");
    assert_eq!(container.total_slots().unwrap(), 2);

    assert!(matches!(
        container.insert(5, value(b"z")),
        Err(StreamKvError::IndexOutOfRange { index: 5, len: 2 })
    ));
}

#[test]
fn test_clear_resets_everything() {
    let container = recycling_container();
    container.add(value(b"a")).unwrap();
    container.add(value(b"b")).unwrap();
    container.reap(0).unwrap();

    container.clear().unwrap();

    assert_eq!(container.count().unwrap(), 0);
    assert_eq!(container.total_slots().unwrap(), 0);
    // Cleared free stack: the next add appends at 0
    assert_eq!(container.add(value(b"c")).unwrap(), 0);
}

// =============================================================================
// Enumeration & Access Scope Tests
// =============================================================================

#[test]
fn test_iter_skips_reaped_slots() {
    let container = plain_container();
    for i in 0..4u8 {
        container.add(value(&[i])).unwrap();
    }
    container.reap(1).unwrap();

    let indices: Vec<u64> = container
        .iter()
        .unwrap()
        .map(|item| item.unwrap().0)
        .collect();
    assert_eq!(indices, vec![0, 2, 3]);
}

#[test]
fn test_iter_fails_fast_on_mutation() {
    let container = plain_container();
    for i in 0..3u8 {
        container.add(value(&[i])).unwrap();
    }

    let mut iter = container.iter().unwrap();
    assert!(iter.next().unwrap().is_ok());

    container.add(value(b"late")).unwrap();

    assert!(matches!(
        iter.next(),
        Some(Err(StreamKvError::ConcurrentModification { .. }))
    ));
    assert!(iter.next().is_none());
}

#[test]
fn test_iter_fails_fast_on_update_and_reap() {
    let container = plain_container();
    container.add(value(b"a")).unwrap();
    container.add(value(b"b")).unwrap();

    let mut iter = container.iter().unwrap();
    iter.next().unwrap().unwrap();
    container.update(0, value(b"a2")).unwrap();
    assert!(iter.next().unwrap().is_err());

    let mut iter = container.iter().unwrap();
    iter.next().unwrap().unwrap();
    container.reap(1).unwrap();
    assert!(iter.next().unwrap().is_err());
}

#[test]
fn test_access_scope_rejects_nested_entry() {
    let container = plain_container();
    let scope = container.enter_access_scope().unwrap();

    assert!(matches!(
        container.enter_access_scope(),
        Err(StreamKvError::ReentrantAccess)
    ));
    assert!(matches!(container.count(), Err(StreamKvError::ReentrantAccess)));
    assert!(matches!(
        container.requires_load(),
        Err(StreamKvError::ReentrantAccess)
    ));
    assert!(matches!(
        container.generation(),
        Err(StreamKvError::ReentrantAccess)
    ));
    assert!(matches!(container.header(), Err(StreamKvError::ReentrantAccess)));

    drop(scope);
    assert!(container.enter_access_scope().is_ok());
}

#[test]
fn test_multi_step_operation_in_one_scope() {
    let container = plain_container();
    let mut scope = container.enter_access_scope().unwrap();

    let a = scope.add(value(b"a")).unwrap();
    let b = scope.add(value(b"b")).unwrap();
    scope.reap(a).unwrap();

    assert_eq!(scope.count().unwrap(), 1);
    assert_eq!(scope.read_value(b).unwrap(), b"b");
}

// =============================================================================
// Slot Scope Tests
// =============================================================================

#[test]
fn test_slot_scope_commit() {
    let container = plain_container();
    let index = container
        .add(value(b"old").with_inline_key(b"key".to_vec()).with_checksum(9))
        .unwrap();

    {
        let mut scope = container.enter_access_scope().unwrap();
        let mut slot = scope.open_slot(index).unwrap();
        assert_eq!(slot.value(), Some(&b"old"[..]));
        assert_eq!(slot.key(), b"key");
        slot.set_value(b"new".to_vec());
        slot.commit().unwrap();
    }

    assert_eq!(container.read_value(index).unwrap(), b"new");
    // Inline key and checksum carried over
    assert_eq!(container.read_key(index).unwrap(), b"key");
    assert_eq!(container.descriptor(index).unwrap().checksum, 9);
}

#[test]
fn test_slot_scope_abort_and_drop_discard_changes() {
    let container = plain_container();
    let index = container.add(value(b"keep")).unwrap();
    let generation = container.generation().unwrap();

    {
        let mut scope = container.enter_access_scope().unwrap();
        let mut slot = scope.open_slot(index).unwrap();
        slot.set_value(b"discard".to_vec());
        slot.abort();
    }
    {
        let mut scope = container.enter_access_scope().unwrap();
        let mut slot = scope.open_slot(index).unwrap();
        slot.set_null();
        drop(slot);
    }

    assert_eq!(container.read_value(index).unwrap(), b"keep");
    assert_eq!(container.generation().unwrap(), generation);
}

#[test]
fn test_modify_commits_on_success_only() {
    let container = plain_container();
    let index = container.add(value(b"v1")).unwrap();

    container
        .modify(index, |slot| {
            slot.set_value(b"v2".to_vec());
            Ok(())
        })
        .unwrap();
    assert_eq!(container.read_value(index).unwrap(), b"v2");

    let result = container.modify(index, |slot| {
        slot.set_value(b"v3".to_vec());
        Err(StreamKvError::KeyNotFound)
    });
    assert!(result.is_err());
    assert_eq!(container.read_value(index).unwrap(), b"v2");
}

// =============================================================================
// Extension & Load Tests
// =============================================================================

#[test]
fn test_extension_region_round_trip() {
    let container = plain_container();
    let root = [0x5Au8; 32];

    container.write_extension(8, &root).unwrap();
    assert_eq!(container.read_extension(8, 32).unwrap(), root.to_vec());

    assert!(matches!(
        container.write_extension(60, &root),
        Err(StreamKvError::IndexOutOfRange { .. })
    ));
}

#[test]
fn test_extension_rejects_overflowing_offset() {
    let container = plain_container();

    assert!(matches!(
        container.read_extension(usize::MAX, 2),
        Err(StreamKvError::IndexOutOfRange { .. })
    ));
    assert!(matches!(
        container.write_extension(usize::MAX, &[1, 2]),
        Err(StreamKvError::IndexOutOfRange { .. })
    ));
    assert_eq!(container.read_extension(0, 2).unwrap(), vec![0, 0]);
}

#[test]
fn test_open_requires_load() {
    let config = ContainerConfig::builder().reserved_slots(1).build();
    let mut stream = ClusteredStream::in_memory(&config).unwrap();
    let record = stream.append_record().unwrap();
    stream
        .write_record(record, SlotTraits::USED, 0, &[], b"persisted")
        .unwrap();
    let bytes = stream.into_inner().into_inner();

    let reopened = ClusteredStream::open(Cursor::new(bytes)).unwrap();
    let container = ObjectContainer::open(Box::new(reopened)).unwrap();

    assert!(container.requires_load().unwrap());
    assert!(matches!(container.count(), Err(StreamKvError::RequiresLoad)));
    assert!(matches!(
        container.add(value(b"x")),
        Err(StreamKvError::RequiresLoad)
    ));

    container.load().unwrap();
    assert!(!container.requires_load().unwrap());
    assert_eq!(container.count().unwrap(), 1);
    assert_eq!(container.read_value(0).unwrap(), b"persisted");
}

#[test]
fn test_create_rejects_stream_with_data() {
    let mut stream = ClusteredStream::in_memory(&ContainerConfig::default()).unwrap();
    stream.append_record().unwrap();

    assert!(matches!(
        ObjectContainer::create(Box::new(stream)),
        Err(StreamKvError::Config(_))
    ));
}

#[test]
fn test_policy_rejects_inline_key_when_untracked() {
    let config = ContainerConfig::builder().key_tracking(false).build();
    let container = ObjectContainer::in_memory(&config).unwrap();

    let result = container.add(value(b"v").with_inline_key(b"k".to_vec()));
    assert!(matches!(result, Err(StreamKvError::Config(_))));
}
