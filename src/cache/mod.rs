//! Page cache management.
//!
//! This module provides:
//! - [`Cache`] - Budget, page faults and collection
//! - [`PageTable`] / [`PageSlot`] - Per-page version and residency
//! - [`CacheStats`] - Hit/fault/reclamation counters
//! - [`policy`] - Victim selection for a collection pass
//!
//! # Reclamation Protocol
//! ```text
//!   reader (epoch e)                        collector (floor f)
//!   ────────────────                        ───────────────────
//!   slot.version = max(version, e)          detach if version < f, snapshot it
//!   p = slot.data                           CAS slot.data: record → null
//!   p == null ? load : use p                version == snapshot ? free : limbo
//! ```
//! `f` never exceeds the epoch of a live operation, so a page touched by a
//! live reader is never detached, and a touch racing a detach is caught by
//! the version comparison.

mod collector;
mod list;
mod page_cache;
pub mod policy;
mod record;
mod slot;
mod stats;

pub use collector::{PassReport, COLLECTOR_THREAD_NAME};
pub use page_cache::Cache;
pub use slot::{PageSlot, PageTable};
pub use stats::{CacheStats, StatsSnapshot};
