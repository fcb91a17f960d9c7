//! epochpage - lazily loaded typed arrays under a memory budget.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                   Consumers (search, distances)                 │
//! │        ReadContext::begin(cache, source) → storage.get(i)       │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────┐    │
//! │  │              Storage Layer (storage/)                    │    │
//! │  │   VectorStorage = Resident | Paged                       │    │
//! │  │   PageLayout: index → (page, slot)    ByteSource         │    │
//! │  └─────────────────────────────────────────────────────────┘    │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐    │
//! │  │              Page Cache (cache/)                         │    │
//! │  │   Cache: budget + active/limbo lists + collector         │    │
//! │  │   PageTable → PageSlot { version, data, update_lock }    │    │
//! │  └─────────────────────────────────────────────────────────┘    │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐    │
//! │  │              Epochs (epoch/)                             │    │
//! │  │   EpochTracker: counter + live set    EpochGuard (RAII)  │    │
//! │  └─────────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Readers never lock on a hit. A page is only reclaimed once every
//! operation that could have touched it has ended.
//!
//! # Modules
//! - [`common`] - Shared primitives (Epoch, PageNo, Error, config)
//! - [`epoch`] - Epoch tracking
//! - [`cache`] - Page cache and collection
//! - [`storage`] - Byte sources and typed storages
//!
//! # Quick Start
//! ```
//! use std::sync::Arc;
//! use epochpage::{Cache, CacheConfig, MemoryByteSource, ReadContext, Storage, VectorStorage};
//!
//! let bytes: Vec<u8> = (0u32..100_000).flat_map(|v| v.to_ne_bytes()).collect();
//! let mut source = MemoryByteSource::new(bytes);
//!
//! let cache = Cache::new(CacheConfig::new(64 * 1024)).unwrap();
//! let mut ids = VectorStorage::<u32>::paged(Arc::clone(&cache));
//! ids.initialize(&mut source, 100_000, 1).unwrap();
//!
//! let ctx = ReadContext::begin(&cache, &source);
//! assert_eq!(*ids.get(&ctx, 12_345).unwrap(), 12_345);
//! ```

pub mod cache;
pub mod common;
pub mod epoch;
pub mod storage;

// Re-export commonly used items at crate root for convenience
pub use common::config::{CacheConfig, CollectionMode, BASE_PAGE_SIZE, PAGE_ALIGNMENT};
pub use common::{Epoch, Error, PageNo, Result};

pub use cache::{Cache, CacheStats, PassReport, StatsSnapshot};
pub use epoch::{EpochGuard, EpochTracker};
pub use storage::{
    ByteSource, FileByteSource, MemoryByteSource, PagedStorage, ReadContext, ResidentStorage,
    Storage, VectorStorage,
};
