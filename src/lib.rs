//! # streamkv
//!
//! Persistent slot-based collections over a single block-structured stream:
//! - Slot arena with stable indices and reaped-slot recycling
//! - Pluggable metadata providers kept consistent on every mutation
//! - Dictionaries with three keying strategies (KVP, CLK, SK)
//! - Dense and recyclable lists, digest-keyed hash set
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │     Dictionaries (KVP / CLK / SK) · Lists · Hash Set         │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                   Object Container                           │
//! │        (Access Scope, Generation, Slot Lifecycle)            │
//! └──────────┬──────────────────────────────────┬───────────────┘
//!            │ I/O                              │ hooks
//!            ▼                                  ▼
//!   ┌─────────────────┐          ┌──────────────────────────────┐
//!   │   Slot Stream   │          │     Metadata Providers       │
//!   │   (Clustered)   │◄─────────│ FreeIndex · Checksum · Keys  │
//!   └─────────────────┘ reserved └──────────────────────────────┘
//!                       records
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod stream;
pub mod container;
pub mod provider;
pub mod serializer;
pub mod checksum;
pub mod dictionary;
pub mod list;
pub mod hashset;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, StreamKvError};
pub use config::{ContainerConfig, Endianness, StreamPolicy};
pub use stream::{ClusteredStream, SlotDescriptor, SlotStream, SlotTraits};
pub use container::{ObjectContainer, SlotWrite};
pub use checksum::{FnChecksum, HashChecksum, KeyChecksum};
pub use serializer::ItemSerializer;
pub use dictionary::{DictionaryFactory, DictionaryStrategy, StreamDictionary};
pub use list::{RecyclableList, StreamMappedList};
pub use hashset::StreamHashSet;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of streamkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
