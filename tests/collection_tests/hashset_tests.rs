//! Tests for StreamHashSet
//!
//! These tests verify:
//! - Set semantics (idempotent add, remove, contains) on both backings
//! - Digest identity of items
//! - Persistence with the load requirement

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use streamkv::config::ContainerConfig;
use streamkv::dictionary::DictionaryStrategy;
use streamkv::hashset::StreamHashSet;
use streamkv::provider::sha256;
use streamkv::serializer::{ItemSerializer, StringSerializer};
use streamkv::StreamKvError;
use tempfile::TempDir;

const BACKINGS: [DictionaryStrategy; 2] = [
    DictionaryStrategy::ConstantLengthKey,
    DictionaryStrategy::SlotKey,
];

// =============================================================================
// Helper Functions
// =============================================================================

fn strings() -> Arc<dyn ItemSerializer<String>> {
    Arc::new(StringSerializer)
}

fn new_set(strategy: DictionaryStrategy) -> StreamHashSet<String> {
    StreamHashSet::in_memory(&ContainerConfig::default(), strategy, strings()).unwrap()
}

fn open_file(path: &Path) -> File {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .unwrap()
}

// =============================================================================
// Set Semantics Tests
// =============================================================================

#[test]
fn test_add_is_idempotent() {
    for strategy in BACKINGS {
        let set = new_set(strategy);
        let item = "apple".to_string();

        assert!(set.add(&item).unwrap());
        assert!(!set.add(&item).unwrap());
        assert_eq!(set.len().unwrap(), 1);

        assert!(set.remove(&item).unwrap());
        assert!(!set.remove(&item).unwrap());
        assert!(!set.contains(&item).unwrap());

        assert!(set.add(&item).unwrap());
        assert!(set.contains(&item).unwrap());
    }
}

#[test]
fn test_iter_yields_members() {
    for strategy in BACKINGS {
        let set = new_set(strategy);
        for fruit in ["apple", "banana", "cherry", "banana"] {
            set.add(&fruit.to_string()).unwrap();
        }
        set.remove(&"apple".to_string()).unwrap();

        let mut members: Vec<String> = set
            .iter()
            .unwrap()
            .collect::<streamkv::Result<_>>()
            .unwrap();
        members.sort();
        assert_eq!(members, vec!["banana", "cherry"]);
        assert_eq!(set.strategy(), strategy);
    }
}

#[test]
fn test_shrink_and_clear() {
    let set = new_set(DictionaryStrategy::ConstantLengthKey);
    for i in 0..6 {
        set.add(&format!("item-{}", i)).unwrap();
    }
    set.remove(&"item-0".to_string()).unwrap();
    set.remove(&"item-4".to_string()).unwrap();

    assert_eq!(set.shrink().unwrap(), 2);
    assert!(set.contains(&"item-5".to_string()).unwrap());
    assert!(!set.contains(&"item-4".to_string()).unwrap());

    set.clear().unwrap();
    assert!(set.is_empty().unwrap());
}

#[test]
fn test_digest_is_sha256_of_serialized_item() {
    let set = new_set(DictionaryStrategy::SlotKey);
    assert_eq!(set.digest(&"abc".to_string()).unwrap(), sha256(b"abc"));
}

#[test]
fn test_kvp_backing_rejected() {
    let result = StreamHashSet::in_memory(
        &ContainerConfig::default(),
        DictionaryStrategy::KeyValuePair,
        strings(),
    );
    assert!(matches!(result, Err(StreamKvError::Config(_))));
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_members_survive_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let config = ContainerConfig::default();

    for strategy in BACKINGS {
        let path = temp_dir.path().join(format!("set-{}.skv", strategy));
        {
            let set = StreamHashSet::create(&config, strategy, open_file(&path), strings()).unwrap();
            set.add(&"red".to_string()).unwrap();
            set.add(&"green".to_string()).unwrap();
            set.remove(&"red".to_string()).unwrap();
            set.flush().unwrap();
        }

        let set = StreamHashSet::open(&config, strategy, open_file(&path), strings()).unwrap();
        assert!(set.requires_load().unwrap());
        assert!(matches!(
            set.contains(&"green".to_string()),
            Err(StreamKvError::RequiresLoad)
        ));

        set.load().unwrap();
        assert!(set.contains(&"green".to_string()).unwrap());
        assert!(!set.contains(&"red".to_string()).unwrap());
        assert!(set.add(&"blue".to_string()).unwrap());
        assert_eq!(set.len().unwrap(), 2);
    }
}
