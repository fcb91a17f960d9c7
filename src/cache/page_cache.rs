//! Cache - the global page cache controller.
//!
//! The [`Cache`] provides:
//! - Budgeted residency for pages of any number of storages
//! - A lock-free hit path (touch the slot version, read the pointer)
//! - Single-flight cold loads per page
//! - Background or manual collection when usage crosses the budget

use std::cell::Cell;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::cache::list::RecordList;
use crate::cache::record::{PageRecord, RecordPtr};
use crate::cache::slot::{PageSlot, PageTable};
use crate::cache::CacheStats;
use crate::common::config::{CacheConfig, CollectionMode};
use crate::common::{Epoch, Error, PageNo, Result};
use crate::epoch::{EpochGuard, EpochTracker};
use crate::storage::PageBuf;

thread_local! {
    /// Set while this thread runs a loader callback.
    static IN_LOADER: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as inside a loader until dropped.
struct LoaderScope {
    previous: bool,
}

impl LoaderScope {
    fn enter() -> Self {
        Self {
            previous: IN_LOADER.with(|flag| flag.replace(true)),
        }
    }

    fn active() -> bool {
        IN_LOADER.with(Cell::get)
    }
}

impl Drop for LoaderScope {
    fn drop(&mut self) {
        IN_LOADER.with(|flag| flag.set(self.previous));
    }
}

/// Owns every resident page and keeps their total size near a budget.
///
/// # Architecture
/// ```text
/// ┌───────────────────────────────────────────────────────────────┐
/// │                            Cache                              │
/// │  ┌──────────────┐   ┌──────────────────────────────────────┐  │
/// │  │   epochs     │   │ active: RecordList                   │  │
/// │  │ EpochTracker │   │  [Rec] → [Rec] → [Rec] → …           │  │
/// │  └──────────────┘   ├──────────────────────────────────────┤  │
/// │  ┌──────────────┐   │ limbo: RecordList                    │  │
/// │  │ used_bytes   │   │  [Rec] → …                           │  │
/// │  │ budget       │   └──────────────────────────────────────┘  │
/// │  └──────────────┘                                             │
/// └───────────────────────────────────────────────────────────────┘
///          ▲                                  │
///          │ get_or_load(table, page)         │ record.slot()
///   ┌──────┴───────┐                   ┌──────▼───────┐
///   │   Storage    │ ───── Arc ──────▶ │  PageTable   │
///   └──────────────┘                   └──────────────┘
/// ```
///
/// # Thread Safety
/// - `epochs`: internal `Mutex`, taken only at operation boundaries
/// - `used_bytes`: `AtomicU64`, changed on load and on final reclamation
/// - `active` / `limbo`: lock-free stacks, pushed by loads, drained only by
///   the collector
/// - `collector_running`: `AtomicU32`, admits one pass at a time
/// - `collector_gate`: `Mutex`, held by a pass and by the audit
/// - `stats`: No lock, all atomic counters
///
/// # Usage
/// ```
/// use std::sync::Arc;
/// use epochpage::cache::{Cache, PageTable};
/// use epochpage::common::config::CacheConfig;
/// use epochpage::common::PageNo;
///
/// let cache = Cache::new(CacheConfig::new(1 << 20)).unwrap();
/// let table = Arc::new(PageTable::new(4, 4096));
///
/// let guard = cache.begin_operation();
/// let bytes = cache
///     .get_or_load(&table, PageNo::new(2), &guard, |buf| {
///         buf.fill(7);
///         Ok(())
///     })
///     .unwrap();
/// assert_eq!(bytes[0], 7);
/// ```
pub struct Cache {
    pub(super) config: CacheConfig,

    /// Issues and tracks the epochs guarding every page reference.
    pub(super) epochs: EpochTracker,

    /// Sum of the sizes of all records on `active` and `limbo`.
    pub(super) used_bytes: AtomicU64,

    pub(super) active: RecordList,

    /// Unpublished records a reader touched during their eviction.
    pub(super) limbo: RecordList,

    /// Non-zero while a collection pass is claimed.
    pub(super) collector_running: AtomicU32,

    /// Passes currently inside `run_pass`.
    pub(super) active_passes: AtomicU32,

    pub(super) collector_gate: Mutex<()>,

    pub(super) stats: CacheStats,
}

impl Cache {
    /// Create a cache.
    ///
    /// # Errors
    /// `Error::Configuration` if `config` fails validation.
    pub fn new(config: CacheConfig) -> Result<Arc<Self>> {
        config.validate()?;

        Ok(Arc::new(Self {
            config,
            epochs: EpochTracker::new(),
            used_bytes: AtomicU64::new(0),
            active: RecordList::new(),
            limbo: RecordList::new(),
            collector_running: AtomicU32::new(0),
            active_passes: AtomicU32::new(0),
            collector_gate: Mutex::new(()),
            stats: CacheStats::new(),
        }))
    }

    // ========================================================================
    // Public API: Operations
    // ========================================================================

    /// Begin a logical operation on this cache.
    pub fn begin_operation(&self) -> EpochGuard<'_> {
        self.epochs.begin_operation()
    }

    /// Get the bytes of `page`, loading them with `loader` on a miss.
    ///
    /// The returned slice borrows `guard` and stays valid until the guard is
    /// dropped, even if the page is evicted meanwhile.
    ///
    /// `loader` fills a zeroed buffer of `table.page_size()` bytes. It runs
    /// at most once per cold page however many threads miss concurrently,
    /// and must not call back into the cache.
    ///
    /// # Errors
    /// - `Error::ProtocolViolation` if `guard` or `table` belongs to another
    ///   cache, if `page` is outside `table`, or if called from inside a
    ///   loader
    /// - `Error::OutOfMemory` if the page buffer cannot be allocated
    /// - Whatever `loader` returns; the slot is left untouched
    pub fn get_or_load<'g, F>(
        self: &Arc<Self>,
        table: &Arc<PageTable>,
        page: PageNo,
        guard: &'g EpochGuard<'_>,
        loader: F,
    ) -> Result<&'g [u8]>
    where
        F: FnOnce(&mut [u8]) -> Result<()>,
    {
        if LoaderScope::active() {
            return Err(Error::ProtocolViolation(
                "page cache called from inside a loader".into(),
            ));
        }
        if !guard.belongs_to(&self.epochs) {
            return Err(Error::ProtocolViolation(
                "epoch guard was issued by a different cache".into(),
            ));
        }
        if !table.bind(self.epochs.id()) {
            return Err(Error::ProtocolViolation(
                "page table belongs to a different cache".into(),
            ));
        }
        let slot = table.slot(page).ok_or_else(|| {
            Error::ProtocolViolation(format!("{} out of range ({} pages)", page, table.len()))
        })?;

        let epoch = guard.epoch();

        if let Some(record) = Self::pin_resident(slot, epoch) {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            // SAFETY: the slot version is at or above `epoch`, and `guard`
            // keeps the reclaim floor at or below `epoch` while 'g lasts.
            return Ok(unsafe { record.get() }.bytes());
        }

        let record = self.load_page(table, page, slot, epoch, loader)?;
        // SAFETY: as above; the load path touches the slot before publishing.
        Ok(unsafe { record.get() }.bytes())
    }

    // ========================================================================
    // Public API: Introspection
    // ========================================================================

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// The epoch tracker guarding this cache's pages.
    pub fn epochs(&self) -> &EpochTracker {
        &self.epochs
    }

    /// Bytes held by resident and limbo records.
    pub fn used_bytes(&self) -> u64 {
        self.used_bytes.load(Ordering::SeqCst)
    }

    pub fn budget_bytes(&self) -> u64 {
        self.config.budget_bytes
    }

    /// Check if usage is above budget. In manual mode this is the signal to
    /// call [`collect`](Self::collect).
    pub fn over_budget(&self) -> bool {
        self.used_bytes() > self.config.budget_bytes
    }

    /// Check if a collection pass is claimed or running.
    pub fn is_collecting(&self) -> bool {
        self.collector_running.load(Ordering::Acquire) > 0
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Sum of record sizes reachable from the active and limbo lists.
    ///
    /// Waits for any running pass to finish. Matches
    /// [`used_bytes`](Self::used_bytes) whenever no page fault is in flight.
    pub fn accounted_bytes(&self) -> u64 {
        self.audit().0
    }

    /// Number of records on the active and limbo lists.
    pub fn record_count(&self) -> usize {
        self.audit().1
    }

    fn audit(&self) -> (u64, usize) {
        let _gate = self.collector_gate.lock();
        // SAFETY: holding the gate excludes the collector, the only code
        // that takes records off the lists or frees them.
        let (active_bytes, active_count) = unsafe { self.active.total_bytes() };
        let (limbo_bytes, limbo_count) = unsafe { self.limbo.total_bytes() };
        (active_bytes + limbo_bytes, active_count + limbo_count)
    }

    // ========================================================================
    // Internal: Page faults
    // ========================================================================

    /// Touch `slot` and return its record, if one is published.
    ///
    /// An empty slot is left untouched. Otherwise the version is advanced
    /// before `data` is read again; see `PageSlot` for the ordering.
    fn pin_resident(slot: &PageSlot, epoch: Epoch) -> Option<RecordPtr> {
        if !slot.is_resident() {
            return None;
        }
        slot.touch(epoch);
        slot.resident()
    }

    /// Slow path: load `page` under its slot lock and publish it.
    fn load_page<F>(
        self: &Arc<Self>,
        table: &Arc<PageTable>,
        page: PageNo,
        slot: &PageSlot,
        epoch: Epoch,
        loader: F,
    ) -> Result<RecordPtr>
    where
        F: FnOnce(&mut [u8]) -> Result<()>,
    {
        let lock = slot.lock_for_load();

        // Another thread may have loaded it while we waited
        if let Some(record) = Self::pin_resident(slot, epoch) {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(record);
        }

        self.stats.page_faults.fetch_add(1, Ordering::Relaxed);

        let mut bytes = PageBuf::try_new(table.page_size())?;
        let loaded = {
            let _scope = LoaderScope::enter();
            loader(bytes.as_mut_slice())
        };
        if let Err(err) = loaded {
            self.stats.load_failures.fetch_add(1, Ordering::Relaxed);
            return Err(err);
        }

        // Touched before publishing, so no pass can take the new record
        // while this operation is live.
        slot.touch(epoch);

        let size = bytes.len() as u64;
        let record = RecordPtr::allocate(PageRecord::new(Arc::clone(table), page, bytes));

        // List first, then the counter, then the slot: the record is
        // accounted for before any reader can see it.
        self.active.push(record);
        let used = self.used_bytes.fetch_add(size, Ordering::SeqCst) + size;
        slot.publish(record);
        drop(lock);

        trace!(page = page.0, epoch = epoch.0, used_bytes = used, "page fault");

        if used > self.config.budget_bytes {
            match self.config.collection {
                CollectionMode::Background => self.signal_collect(),
                CollectionMode::Manual => {}
            }
        }

        Ok(record)
    }
}

impl Drop for Cache {
    fn drop(&mut self) {
        // No guard can be alive here, so no reader holds a page.
        for record in self.active.take_all().into_iter().chain(self.limbo.take_all()) {
            // SAFETY: every listed record is alive, and after unpublishing
            // nothing references it.
            unsafe {
                record.get().slot().unpublish(record);
                record.free();
            }
        }
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("budget_bytes", &self.config.budget_bytes)
            .field("used_bytes", &self.used_bytes())
            .field("collecting", &self.is_collecting())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manual_cache(budget: u64) -> Arc<Cache> {
        Cache::new(CacheConfig::new(budget).with_collection_mode(CollectionMode::Manual)).unwrap()
    }

    fn fill(value: u8) -> impl FnOnce(&mut [u8]) -> Result<()> {
        move |buf| {
            buf.fill(value);
            Ok(())
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = Cache::new(CacheConfig::new(0));
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_load_then_hit() {
        let cache = manual_cache(1 << 20);
        let table = Arc::new(PageTable::new(2, 1024));

        let guard = cache.begin_operation();
        let first = cache.get_or_load(&table, PageNo::new(0), &guard, fill(9)).unwrap();
        assert_eq!(first.len(), 1024);
        assert!(first.iter().all(|&b| b == 9));

        let second = cache
            .get_or_load(&table, PageNo::new(0), &guard, |_| {
                panic!("resident page must not reload")
            })
            .unwrap();
        assert_eq!(first.as_ptr(), second.as_ptr());

        let stats = cache.stats().snapshot();
        assert_eq!(stats.page_faults, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(cache.used_bytes(), 1024);
        assert_eq!(cache.accounted_bytes(), 1024);
        assert_eq!(table.resident_pages(), 1);
    }

    #[test]
    fn test_load_touches_version() {
        let cache = manual_cache(1 << 20);
        let table = Arc::new(PageTable::new(1, 64));

        let guard = cache.begin_operation();
        cache.get_or_load(&table, PageNo::new(0), &guard, fill(1)).unwrap();
        assert_eq!(table.slot(PageNo::new(0)).unwrap().version(), guard.epoch());
    }

    #[test]
    fn test_loader_failure_leaves_slot_empty() {
        let cache = manual_cache(1 << 20);
        let table = Arc::new(PageTable::new(1, 64));

        let guard = cache.begin_operation();
        let result = cache.get_or_load(&table, PageNo::new(0), &guard, |buf| {
            buf[0] = 0xFF;
            Err(Error::Io(std::io::Error::other("disk gone")))
        });

        assert!(matches!(result, Err(Error::Io(_))));
        let slot = table.slot(PageNo::new(0)).unwrap();
        assert!(!slot.is_resident());
        assert_eq!(slot.version(), Epoch::ZERO);
        assert_eq!(cache.used_bytes(), 0);
        assert_eq!(cache.record_count(), 0);
        assert_eq!(cache.stats().snapshot().load_failures, 1);

        // Retry succeeds with fresh bytes
        let bytes = cache.get_or_load(&table, PageNo::new(0), &guard, fill(2)).unwrap();
        assert_eq!(bytes[0], 2);
        assert_eq!(slot.version(), guard.epoch());
    }

    #[test]
    fn test_table_of_another_cache_rejected() {
        let owner = manual_cache(4096);
        let other = manual_cache(1 << 20);
        let table = Arc::new(PageTable::new(1, 4096));

        {
            let guard = owner.begin_operation();
            owner.get_or_load(&table, PageNo::new(0), &guard, fill(4)).unwrap();
        }
        assert_eq!(table.owner(), Some(owner.epochs().id()));

        // The other cache can neither hit on nor load into the table
        let guard = other.begin_operation();
        let result = other.get_or_load(&table, PageNo::new(0), &guard, fill(5));
        assert!(matches!(result, Err(Error::ProtocolViolation(_))));
        assert_eq!(other.stats().snapshot().hits, 0);
        assert_eq!(other.used_bytes(), 0);

        // So the owner reclaims its page as usual
        let report = owner.collect().unwrap();
        assert_eq!(report.freed, 1);
        assert_eq!(owner.used_bytes(), 0);
        assert!(!table.slot(PageNo::new(0)).unwrap().is_resident());
    }

    #[test]
    fn test_page_out_of_range() {
        let cache = manual_cache(1 << 20);
        let table = Arc::new(PageTable::new(2, 64));

        let guard = cache.begin_operation();
        let result = cache.get_or_load(&table, PageNo::new(2), &guard, fill(0));
        assert!(matches!(result, Err(Error::ProtocolViolation(_))));
    }

    #[test]
    fn test_foreign_guard_rejected() {
        let cache = manual_cache(1 << 20);
        let other = manual_cache(1 << 20);
        let table = Arc::new(PageTable::new(1, 64));

        let guard = other.begin_operation();
        let result = cache.get_or_load(&table, PageNo::new(0), &guard, fill(0));
        assert!(matches!(result, Err(Error::ProtocolViolation(_))));
    }

    #[test]
    fn test_reentrant_call_rejected() {
        let cache = manual_cache(1 << 20);
        let table = Arc::new(PageTable::new(2, 64));

        let guard = cache.begin_operation();
        let result = cache.get_or_load(&table, PageNo::new(0), &guard, |_| {
            cache
                .get_or_load(&table, PageNo::new(1), &guard, fill(0))
                .map(|_| ())
        });

        assert!(matches!(result, Err(Error::ProtocolViolation(_))));
        assert!(!table.slot(PageNo::new(0)).unwrap().is_resident());
        assert!(!table.slot(PageNo::new(1)).unwrap().is_resident());
    }

    #[test]
    fn test_loader_panic_leaves_cache_usable() {
        let cache = manual_cache(1 << 20);
        let table = Arc::new(PageTable::new(1, 64));
        let guard = cache.begin_operation();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = cache.get_or_load(&table, PageNo::new(0), &guard, |_| panic!("loader bug"));
        }));
        assert!(result.is_err());
        assert!(!LoaderScope::active());

        let bytes = cache.get_or_load(&table, PageNo::new(0), &guard, fill(3)).unwrap();
        assert_eq!(bytes[0], 3);
    }

    #[test]
    fn test_manual_mode_does_not_collect() {
        let cache = manual_cache(1000);
        let table = Arc::new(PageTable::new(4, 512));

        let guard = cache.begin_operation();
        for page in 0..4 {
            cache.get_or_load(&table, PageNo::new(page), &guard, fill(0)).unwrap();
        }

        assert!(cache.over_budget());
        assert!(!cache.is_collecting());
        assert_eq!(cache.used_bytes(), 2048);
        assert_eq!(cache.stats().snapshot().collection_passes, 0);
    }

    #[test]
    fn test_drop_unpublishes_pages() {
        let table = Arc::new(PageTable::new(2, 64));
        {
            let cache = manual_cache(1 << 20);
            let guard = cache.begin_operation();
            cache.get_or_load(&table, PageNo::new(0), &guard, fill(0)).unwrap();
            cache.get_or_load(&table, PageNo::new(1), &guard, fill(0)).unwrap();
            assert_eq!(table.resident_pages(), 2);
        }
        assert_eq!(table.resident_pages(), 0);
    }
}
