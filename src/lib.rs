//! Tagmint: device-prefixed sequential ID allocator
//!
//! Produces collision-free, human-readable primary keys
//! (`"<DeviceTag>-<Counter>"`, e.g. `"AAA-01"`) for records created on many
//! independent, offline-capable installations that share one
//! eventually-synchronized relational store, with no central ID authority.
//!
//! ## Features
//!
//! - **Device-scoped streams**: every installation owns a 3-character tag;
//!   streams never collide as long as tags are unique
//! - **Crash/reinstall recovery**: allocation state is rebuilt by scanning
//!   the store itself for the maximum key carrying this device's tag
//! - **Two-layer caching**: in-memory warm path, durable SQLite-backed
//!   cold-start state, synchronous write-through
//! - **Overflow-safe counters**: zero-padded width grows (`99` -> `100`),
//!   never truncates
//! - **Same-run collision guard**: a value generated once in a process run
//!   is never handed out twice, even after cache rewinds
//! - **Degrade, don't fail**: storage faults fall back to cached or default
//!   values and log; the store's primary-key constraint is the backstop
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tagmint::{
//!     FixedDeviceIdentity, IdAllocator, Registry, SqliteCache, SqliteStore, TableSpec,
//! };
//!
//! let registry = Registry::new(vec![TableSpec {
//!     table_name: "accounts".to_string(),
//!     primary_key_column: "account_id".to_string(),
//!     entity_type: "Account".to_string(),
//! }])
//! .unwrap();
//!
//! let store = Arc::new(SqliteStore::open("app.db").unwrap());
//! let cache = Arc::new(SqliteCache::open("tagmint.db").unwrap());
//! let identity = Arc::new(FixedDeviceIdentity::new("AAA"));
//!
//! let allocator = IdAllocator::new(registry, store, cache, identity);
//! allocator.reconcile();
//!
//! let id = allocator.allocate_next("accounts").unwrap(); // "AAA-01"
//! # let _ = id;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! allocate_next(table)
//!   └─ peek_next ──► AllocationCache (memory)      warm path
//!                      └─ miss ──► DurableCache    cold path, restart state
//!                                   └─ miss ──► DatabaseScanner
//!                                               max key LIKE '%<tag>%'
//!                                               longest first, then lexical
//! reconcile()
//!   └─ per table: merge(cached, scanned) ──► baseline, under the same lock
//! ```
//!
//! One coarse mutex serializes the whole path; allocation trades parallel
//! throughput for a simple correctness argument. Cross-device coordination
//! is out of scope: correctness depends on no two devices sharing a tag.

pub mod allocator;
pub mod cache;
pub mod codec;
pub mod device;
pub mod error;
pub mod reconcile;
pub mod registry;
pub mod resolver;
pub mod scanner;

// Re-export commonly used types
pub use allocator::{AllocatorStats, IdAllocator};
pub use cache::{AllocationCache, AllocationRecord, DurableCache, MemoryCache, SqliteCache};
pub use device::{DeviceIdentity, DeviceTag, FixedDeviceIdentity, TAG_LEN};
pub use error::{MintError, Result};
pub use reconcile::ReconcileReport;
pub use registry::{Registry, TableSpec};
pub use scanner::{DatabaseScanner, RecordStore, SqliteStore};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
