//! Tests for ClusteredStream
//!
//! These tests verify:
//! - Records persist across close/reopen of a file
//! - Header validation on open
//! - Shifting insert/remove of records
//! - Byte order and fast-allocate policies

use std::fs::{File, OpenOptions};
use std::io::Cursor;
use std::path::Path;

use streamkv::config::{ContainerConfig, Endianness};
use streamkv::stream::{ClusteredStream, SlotStream, SlotTraits, EXTENSION_SIZE};
use streamkv::StreamKvError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn open_file(path: &Path) -> File {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .unwrap()
}

fn small_config() -> ContainerConfig {
    ContainerConfig::builder().cluster_size(16).build()
}

fn write_value(stream: &mut dyn SlotStream, value: &[u8]) -> u64 {
    let record = stream.append_record().unwrap();
    stream
        .write_record(record, SlotTraits::USED, 0, &[], value)
        .unwrap();
    record
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_records_survive_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("stream.skv");

    {
        let config = ContainerConfig::builder().cluster_size(32).reserved_slots(2).build();
        let mut stream = ClusteredStream::create(open_file(&path), &config).unwrap();
        let record = stream.append_record().unwrap();
        stream
            .write_record(record, SlotTraits::USED | SlotTraits::KEYED, 17, b"key", b"value")
            .unwrap();
        stream.write_extension(0, &[0xEE; 8]).unwrap();
        stream.flush().unwrap();
    }

    let mut stream = ClusteredStream::open(open_file(&path)).unwrap();
    assert_eq!(stream.header().reserved_records, 2);
    assert_eq!(stream.record_count(), 3);

    let descriptor = stream.descriptor(2).unwrap();
    assert_eq!(descriptor.checksum, 17);
    assert_eq!(descriptor.key_len, 3);
    assert_eq!(stream.read_key(2).unwrap(), b"key");
    assert_eq!(stream.read_value(2).unwrap(), b"value");
    assert_eq!(&stream.extension()[..8], &[0xEE; 8]);
    assert_eq!(stream.extension().len(), EXTENSION_SIZE);
}

#[test]
fn test_reserved_records_are_marked_used() {
    let config = ContainerConfig::builder().reserved_slots(2).build();
    let mut stream = ClusteredStream::in_memory(&config).unwrap();

    for record in 0..2 {
        assert_eq!(stream.descriptor(record).unwrap().traits, SlotTraits::USED);
    }
    assert_eq!(stream.header().data_records(), 0);
}

#[test]
fn test_open_rejects_corrupted_header() {
    let mut stream = ClusteredStream::in_memory(&small_config()).unwrap();
    write_value(&mut stream, b"payload");

    let mut bytes = stream.into_inner().into_inner();
    bytes[20] ^= 0x01;

    let result = ClusteredStream::open(Cursor::new(bytes));
    assert!(matches!(result, Err(StreamKvError::Corruption(_))));
}

#[test]
fn test_big_endian_stream_reopens() {
    let config = ContainerConfig::builder()
        .endianness(Endianness::Big)
        .cluster_size(16)
        .build();
    let mut stream = ClusteredStream::in_memory(&config).unwrap();
    let record = stream.append_record().unwrap();
    stream
        .write_record(record, SlotTraits::USED | SlotTraits::CHECKSUMMED, -5, &[], b"be")
        .unwrap();

    let bytes = stream.into_inner().into_inner();
    // Magic, then the endianness byte
    assert_eq!(bytes[4], 1);

    let mut reopened = ClusteredStream::open(Cursor::new(bytes)).unwrap();
    assert_eq!(reopened.header().endianness, Endianness::Big);
    assert_eq!(reopened.descriptor(0).unwrap().checksum, -5);
    assert_eq!(reopened.read_value(0).unwrap(), b"be");
}

// =============================================================================
// Record Shifting Tests
// =============================================================================

#[test]
fn test_remove_record_shifts_later_records() {
    let mut stream = ClusteredStream::in_memory(&small_config()).unwrap();
    for value in [b"a", b"b", b"c"] {
        write_value(&mut stream, value);
    }

    stream.remove_record(0).unwrap();

    assert_eq!(stream.record_count(), 2);
    assert_eq!(stream.read_value(0).unwrap(), b"b");
    assert_eq!(stream.read_value(1).unwrap(), b"c");
}

#[test]
fn test_insert_record_opens_empty_slot() {
    let mut stream = ClusteredStream::in_memory(&small_config()).unwrap();
    write_value(&mut stream, b"a");
    write_value(&mut stream, b"c");

    stream.insert_record(1).unwrap();
    stream
        .write_record(1, SlotTraits::USED, 0, &[], b"b")
        .unwrap();

    let values: Vec<Vec<u8>> = (0..3).map(|r| stream.read_value(r).unwrap()).collect();
    assert_eq!(values, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
}

#[test]
fn test_out_of_range_record() {
    let mut stream = ClusteredStream::in_memory(&small_config()).unwrap();
    assert!(matches!(
        stream.descriptor(0),
        Err(StreamKvError::IndexOutOfRange { index: 0, len: 0 })
    ));
}

// =============================================================================
// Allocation Policy Tests
// =============================================================================

/// Byte offset of cluster 4's data in a 16-byte-cluster stream
const CLUSTER_4_DATA: usize = 128 + 4 * (8 + 16) + 8;

fn reuse_released_cluster(fast_allocate: bool) -> Vec<u8> {
    let config = ContainerConfig::builder()
        .cluster_size(16)
        .fast_allocate(fast_allocate)
        .build();
    let mut stream = ClusteredStream::in_memory(&config).unwrap();

    // Two descriptors fill table clusters 0..4; record 0's data takes cluster 4
    let a = stream.append_record().unwrap();
    let b = stream.append_record().unwrap();
    stream.write_record(a, SlotTraits::USED, 0, &[], &[0xAA; 16]).unwrap();
    stream.truncate(a, 0).unwrap();

    // Record 1 picks cluster 4 back up from the free list
    stream.write_range(b, 0, &[0x01]).unwrap();
    assert_eq!(stream.header().cluster_count, 5);

    let bytes = stream.into_inner().into_inner();
    bytes[CLUSTER_4_DATA..CLUSTER_4_DATA + 16].to_vec()
}

#[test]
fn test_reused_cluster_is_zeroed() {
    let data = reuse_released_cluster(false);
    assert_eq!(data[0], 0x01);
    assert!(data[1..].iter().all(|&b| b == 0));
}

#[test]
fn test_fast_allocate_skips_zeroing() {
    let data = reuse_released_cluster(true);
    assert_eq!(data[0], 0x01);
    assert!(data[1..].iter().all(|&b| b == 0xAA));
}
