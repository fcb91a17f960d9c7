//! PageSlot - per-page metadata, and the PageTable that holds them.
//!
//! A [`PageSlot`] never owns page bytes. It records:
//! - The newest epoch that touched the page (its version)
//! - A pointer to the resident [`PageRecord`], or null
//! - A lock that serializes first loads of this one page

use std::fmt;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU64, Ordering};

use parking_lot::{Mutex, MutexGuard};

use crate::cache::record::{PageRecord, RecordPtr};
use crate::common::{Epoch, PageNo};

/// Metadata for one page position of a storage.
///
/// # Thread Safety
/// - `version`: `AtomicU64`, only ever advanced
/// - `data`: `AtomicPtr`, set by the loading thread, cleared by the collector
/// - `update_lock`: `Mutex`, contended only by concurrent first touches of
///   this page
///
/// # Memory Ordering
/// `version` and `data` use `SeqCst`. Readers advance `version` before they
/// read `data`, and the collector clears `data` before it re-reads
/// `version`. In the single total order one of the two must see the other:
/// either the reader finds `data` null, or the collector finds the version
/// moved and keeps the record.
pub struct PageSlot {
    /// Newest epoch that touched this page. 0 until first touched.
    version: AtomicU64,

    /// Resident record, or null.
    data: AtomicPtr<PageRecord>,

    /// Serializes cold loads of this page.
    update_lock: Mutex<()>,
}

impl PageSlot {
    /// Create an untouched, non-resident slot.
    pub fn new() -> Self {
        Self {
            version: AtomicU64::new(Epoch::ZERO.0),
            data: AtomicPtr::new(ptr::null_mut()),
            update_lock: Mutex::new(()),
        }
    }

    /// Newest epoch that touched this page.
    #[inline]
    pub fn version(&self) -> Epoch {
        Epoch::new(self.version.load(Ordering::SeqCst))
    }

    /// Check if a record is currently published for this page.
    #[inline]
    pub fn is_resident(&self) -> bool {
        !self.data.load(Ordering::SeqCst).is_null()
    }

    /// Advance the version to `epoch`. Never moves it backwards.
    ///
    /// Returns `true` if this call changed the version.
    pub(crate) fn touch(&self, epoch: Epoch) -> bool {
        let mut current = self.version.load(Ordering::SeqCst);
        while current < epoch.0 {
            match self.version.compare_exchange_weak(
                current,
                epoch.0,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
        false
    }

    /// The published record, if any.
    #[inline]
    pub(crate) fn resident(&self) -> Option<RecordPtr> {
        RecordPtr::from_raw(self.data.load(Ordering::SeqCst))
    }

    /// Publish a freshly loaded record. Caller holds the update lock.
    pub(crate) fn publish(&self, record: RecordPtr) {
        let previous = self.data.swap(record.as_ptr(), Ordering::SeqCst);
        debug_assert!(previous.is_null(), "published over a resident page");
    }

    /// Clear `data` if it still points at `record`.
    ///
    /// Returns `false` when the slot already moved on (null, or a newer
    /// record loaded after this one was unpublished).
    pub(crate) fn unpublish(&self, record: RecordPtr) -> bool {
        self.data
            .compare_exchange(
                record.as_ptr(),
                ptr::null_mut(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    /// Acquire the cold-load lock.
    #[inline]
    pub(crate) fn lock_for_load(&self) -> MutexGuard<'_, ()> {
        self.update_lock.lock()
    }
}

impl Default for PageSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PageSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageSlot")
            .field("version", &self.version())
            .field("resident", &self.is_resident())
            .finish()
    }
}

/// The slot array of one storage, plus the page size all its pages share.
///
/// Records hold an `Arc` to their table, so a slot stays addressable for as
/// long as any record of it is alive, even after the storage is dropped.
///
/// A table is owned by the first cache that loads a page into it. Its
/// records are protected only by that cache's epochs, so every other cache
/// is refused.
#[derive(Debug)]
pub struct PageTable {
    page_size: usize,
    slots: Box<[PageSlot]>,

    /// Tracker id of the owning cache, 0 while unbound.
    owner: AtomicU64,
}

impl PageTable {
    /// Create a table of `page_count` empty slots.
    pub fn new(page_count: usize, page_size: usize) -> Self {
        let slots: Box<[PageSlot]> = (0..page_count).map(|_| PageSlot::new()).collect();
        Self {
            page_size,
            slots,
            owner: AtomicU64::new(0),
        }
    }

    /// Bind the table to the cache whose tracker has id `owner`.
    ///
    /// Returns `false` if another cache already owns the table.
    pub(crate) fn bind(&self, owner: u64) -> bool {
        match self
            .owner
            .compare_exchange(0, owner, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => true,
            Err(current) => current == owner,
        }
    }

    /// Tracker id of the owning cache, if any has used the table yet.
    pub fn owner(&self) -> Option<u64> {
        match self.owner.load(Ordering::Acquire) {
            0 => None,
            id => Some(id),
        }
    }

    /// Size of every page buffer in bytes.
    #[inline]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of pages.
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Get the slot for `page`, or None if out of range.
    #[inline]
    pub fn slot(&self, page: PageNo) -> Option<&PageSlot> {
        self.slots.get(page.0)
    }

    /// Number of pages currently published.
    pub fn resident_pages(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_resident()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_new() {
        let slot = PageSlot::new();
        assert_eq!(slot.version(), Epoch::ZERO);
        assert!(!slot.is_resident());
        assert!(slot.resident().is_none());
    }

    #[test]
    fn test_touch_only_advances() {
        let slot = PageSlot::new();

        assert!(slot.touch(Epoch::new(5)));
        assert_eq!(slot.version(), Epoch::new(5));

        // Older epoch does not regress the version
        assert!(!slot.touch(Epoch::new(3)));
        assert_eq!(slot.version(), Epoch::new(5));

        // Same epoch is a no-op
        assert!(!slot.touch(Epoch::new(5)));

        assert!(slot.touch(Epoch::new(9)));
        assert_eq!(slot.version(), Epoch::new(9));
    }

    #[test]
    fn test_concurrent_touch_keeps_maximum() {
        use std::sync::Arc;
        use std::thread;

        let slot = Arc::new(PageSlot::new());
        let mut handles = vec![];

        for t in 0..8u64 {
            let slot = Arc::clone(&slot);
            handles.push(thread::spawn(move || {
                for i in 0..1000u64 {
                    slot.touch(Epoch::new(i * 8 + t));
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(slot.version(), Epoch::new(999 * 8 + 7));
    }

    #[test]
    fn test_table_slots() {
        let table = PageTable::new(4, 16384);
        assert_eq!(table.len(), 4);
        assert_eq!(table.page_size(), 16384);
        assert!(table.slot(PageNo::new(3)).is_some());
        assert!(table.slot(PageNo::new(4)).is_none());
        assert_eq!(table.resident_pages(), 0);
    }

    #[test]
    fn test_table_binds_once() {
        let table = PageTable::new(1, 64);
        assert_eq!(table.owner(), None);

        assert!(table.bind(7));
        assert!(table.bind(7));
        assert!(!table.bind(8));
        assert_eq!(table.owner(), Some(7));
    }

    #[test]
    fn test_empty_table() {
        let table = PageTable::new(0, 16384);
        assert!(table.is_empty());
        assert!(table.slot(PageNo::new(0)).is_none());
    }
}
