//! PageRecord - one resident page, and its reclamation state machine.
//!
//! ```text
//!               detach (version < floor)
//!   Resident ───────────────────────────▶ Candidate ──┬──▶ Freed
//!      ▲                                    │  ▲       │   (version unchanged)
//!      └────────── second chance ───────────┘  │       │
//!                                              │       └──▶ Limbo
//!                              detach (next pass)          (version moved)
//!   Limbo ─────────────────────────────────────┘
//! ```
//!
//! Only the collector moves records between states, and only one collection
//! pass runs at a time, so transitions never race each other. They do race
//! readers, which is what the version snapshot is for.

use std::fmt;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicPtr, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use crate::cache::slot::{PageSlot, PageTable};
use crate::common::{Epoch, PageNo};
use crate::storage::PageBuf;

/// Where a record sits in the reclamation life cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum RecordState {
    /// On the active list, possibly published in its slot.
    Resident = 0,
    /// Detached by the running pass, awaiting selection or reclamation.
    Candidate = 1,
    /// Unpublished, kept intact because a reader touched it mid-pass.
    Limbo = 2,
}

impl RecordState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => RecordState::Resident,
            1 => RecordState::Candidate,
            _ => RecordState::Limbo,
        }
    }
}

/// Result of trying to reclaim a candidate.
#[derive(Debug)]
pub(crate) enum Reclaim {
    /// Memory released; carries the page size.
    Freed(usize),
    /// A reader intervened; the record must go on the limbo list.
    Limbo(RecordPtr),
}

/// A resident page: its bytes plus a way back to the slot that owns it.
pub(crate) struct PageRecord {
    /// Intrusive link for the active and limbo lists.
    pub(super) next: AtomicPtr<PageRecord>,

    /// Table holding the owning slot.
    table: Arc<PageTable>,

    /// Position of the owning slot in `table`.
    page: PageNo,

    /// Page contents. Never written after the record is published.
    bytes: PageBuf,

    /// Slot version observed when the record was detached.
    version_snapshot: AtomicU64,

    /// A `RecordState`.
    state: AtomicU8,
}

impl PageRecord {
    /// Wrap loaded bytes for `page` of `table`.
    pub(crate) fn new(table: Arc<PageTable>, page: PageNo, bytes: PageBuf) -> Self {
        debug_assert!(table.slot(page).is_some(), "{} outside its table", page);
        debug_assert_eq!(bytes.len(), table.page_size());

        Self {
            next: AtomicPtr::new(std::ptr::null_mut()),
            table,
            page,
            bytes,
            version_snapshot: AtomicU64::new(Epoch::ZERO.0),
            state: AtomicU8::new(RecordState::Resident as u8),
        }
    }

    #[inline]
    pub(crate) fn bytes(&self) -> &[u8] {
        self.bytes.as_slice()
    }

    /// Bytes this record accounts for in the cache budget.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub(crate) fn page(&self) -> PageNo {
        self.page
    }

    #[inline]
    pub(crate) fn state(&self) -> RecordState {
        RecordState::from_u8(self.state.load(Ordering::Acquire))
    }

    #[inline]
    pub(crate) fn version_snapshot(&self) -> Epoch {
        Epoch::new(self.version_snapshot.load(Ordering::Acquire))
    }

    /// The slot this record was loaded for.
    pub(crate) fn slot(&self) -> &PageSlot {
        match self.table.slot(self.page) {
            Some(slot) => slot,
            None => unreachable!("{} outside its table", self.page),
        }
    }

    fn transition(&self, allowed_from: &[RecordState], to: RecordState) {
        let previous = RecordState::from_u8(self.state.swap(to as u8, Ordering::AcqRel));
        debug_assert!(
            allowed_from.contains(&previous),
            "illegal record transition {:?} -> {:?}",
            previous,
            to
        );
    }

    /// Resident or Limbo → Candidate, if the slot is older than `floor`.
    ///
    /// Returns the version snapshot on success. The snapshot is the value the
    /// floor test was made against, so any touch after this call is visible
    /// as a version change at reclaim time.
    pub(crate) fn try_detach(&self, floor: Epoch) -> Option<Epoch> {
        let version = self.slot().version();
        if version >= floor {
            return None;
        }

        self.version_snapshot.store(version.0, Ordering::Release);
        self.transition(
            &[RecordState::Resident, RecordState::Limbo],
            RecordState::Candidate,
        );
        Some(version)
    }

    /// Candidate → Resident. The record was not selected this pass.
    pub(crate) fn second_chance(&self) {
        self.transition(&[RecordState::Candidate], RecordState::Resident);
    }
}

impl fmt::Debug for PageRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageRecord")
            .field("page", &self.page)
            .field("len", &self.len())
            .field("state", &self.state())
            .field("version_snapshot", &self.version_snapshot())
            .finish()
    }
}

/// Raw handle to a heap-allocated [`PageRecord`].
///
/// Records are shared between the lists, their slot and any reader that
/// fetched the page, so they are addressed by pointer rather than owned by a
/// `Box`. The collector is the only code that frees one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RecordPtr(NonNull<PageRecord>);

// SAFETY: `PageRecord` is `Sync` (atomics, an `Arc` and immutable bytes), and
// moving the handle to the collector thread does not move the record.
unsafe impl Send for RecordPtr {}

impl RecordPtr {
    /// Move `record` to the heap and return a handle to it.
    pub(crate) fn allocate(record: PageRecord) -> Self {
        RecordPtr(NonNull::from(Box::leak(Box::new(record))))
    }

    #[inline]
    pub(crate) fn from_raw(ptr: *mut PageRecord) -> Option<Self> {
        NonNull::new(ptr).map(RecordPtr)
    }

    #[inline]
    pub(crate) fn as_ptr(self) -> *mut PageRecord {
        self.0.as_ptr()
    }

    /// Borrow the record.
    ///
    /// # Safety
    /// The record must not have been freed, and must stay alive for `'a`.
    #[inline]
    pub(crate) unsafe fn get<'a>(self) -> &'a PageRecord {
        // SAFETY: upheld by the caller.
        unsafe { self.0.as_ref() }
    }

    /// Candidate → Freed or Limbo.
    ///
    /// Unpublishes the record, then compares the slot version with the
    /// detach-time snapshot. Unchanged means no reader touched the page since
    /// the pass decided it was older than every live epoch, so nobody can
    /// hold a reference and the memory is released.
    ///
    /// # Safety
    /// The record must be a `Candidate` detached by the running pass and not
    /// linked into any list.
    pub(crate) unsafe fn reclaim(self) -> Reclaim {
        // SAFETY: candidates are alive until this call frees them.
        let record = unsafe { self.get() };
        debug_assert_eq!(record.state(), RecordState::Candidate);

        let slot = record.slot();
        slot.unpublish(self);

        if slot.version() == record.version_snapshot() {
            // SAFETY: unlinked, unpublished, and no live epoch touched it.
            Reclaim::Freed(unsafe { self.free() })
        } else {
            record.transition(&[RecordState::Candidate], RecordState::Limbo);
            Reclaim::Limbo(self)
        }
    }

    /// Drop the record and return its byte size.
    ///
    /// # Safety
    /// No list, slot or reader may still reference the record.
    pub(crate) unsafe fn free(self) -> usize {
        // SAFETY: the pointer came from `Box::leak` in `allocate` and the
        // caller guarantees it is unreferenced.
        let record = unsafe { Box::from_raw(self.0.as_ptr()) };
        record.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_record(table: &Arc<PageTable>, page: usize, fill: u8) -> RecordPtr {
        let mut bytes = PageBuf::try_new(table.page_size()).unwrap();
        bytes.as_mut_slice().fill(fill);
        RecordPtr::allocate(PageRecord::new(Arc::clone(table), PageNo::new(page), bytes))
    }

    #[test]
    fn test_new_record_is_resident() {
        let table = Arc::new(PageTable::new(2, 256));
        let record = make_record(&table, 1, 0xAB);

        let r = unsafe { record.get() };
        assert_eq!(r.state(), RecordState::Resident);
        assert_eq!(r.page(), PageNo::new(1));
        assert_eq!(r.len(), 256);
        assert!(r.bytes().iter().all(|&b| b == 0xAB));

        assert_eq!(unsafe { record.free() }, 256);
    }

    #[test]
    fn test_detach_respects_floor() {
        let table = Arc::new(PageTable::new(1, 64));
        let record = make_record(&table, 0, 0);
        let r = unsafe { record.get() };

        table.slot(PageNo::new(0)).unwrap().touch(Epoch::new(7));

        // Version 7 is not below floor 7
        assert_eq!(r.try_detach(Epoch::new(7)), None);
        assert_eq!(r.state(), RecordState::Resident);

        assert_eq!(r.try_detach(Epoch::new(8)), Some(Epoch::new(7)));
        assert_eq!(r.state(), RecordState::Candidate);
        assert_eq!(r.version_snapshot(), Epoch::new(7));

        unsafe { record.free() };
    }

    #[test]
    fn test_second_chance_returns_to_resident() {
        let table = Arc::new(PageTable::new(1, 64));
        let record = make_record(&table, 0, 0);
        let r = unsafe { record.get() };

        r.try_detach(Epoch::new(1)).unwrap();
        r.second_chance();
        assert_eq!(r.state(), RecordState::Resident);

        unsafe { record.free() };
    }

    #[test]
    fn test_reclaim_untouched_frees() {
        let table = Arc::new(PageTable::new(1, 64));
        let slot = table.slot(PageNo::new(0)).unwrap();
        let record = make_record(&table, 0, 0);
        slot.publish(record);
        slot.touch(Epoch::new(3));

        unsafe { record.get() }.try_detach(Epoch::new(10)).unwrap();

        match unsafe { record.reclaim() } {
            Reclaim::Freed(size) => assert_eq!(size, 64),
            Reclaim::Limbo(_) => panic!("untouched record should be freed"),
        }
        assert!(!slot.is_resident());
    }

    #[test]
    fn test_reclaim_touched_goes_to_limbo() {
        let table = Arc::new(PageTable::new(1, 64));
        let slot = table.slot(PageNo::new(0)).unwrap();
        let record = make_record(&table, 0, 0x5A);
        slot.publish(record);
        slot.touch(Epoch::new(3));

        unsafe { record.get() }.try_detach(Epoch::new(10)).unwrap();

        // A reader touches the page between detach and reclaim
        slot.touch(Epoch::new(11));

        match unsafe { record.reclaim() } {
            Reclaim::Limbo(kept) => {
                let r = unsafe { kept.get() };
                assert_eq!(r.state(), RecordState::Limbo);
                // Bytes stay intact for the reader that may hold them
                assert!(r.bytes().iter().all(|&b| b == 0x5A));
                unsafe { kept.free() };
            }
            Reclaim::Freed(_) => panic!("touched record must not be freed"),
        }
        assert!(!slot.is_resident());
    }

    #[test]
    fn test_limbo_record_can_be_detached_again() {
        let table = Arc::new(PageTable::new(1, 64));
        let slot = table.slot(PageNo::new(0)).unwrap();
        let record = make_record(&table, 0, 0);
        slot.publish(record);

        unsafe { record.get() }.try_detach(Epoch::new(5)).unwrap();
        slot.touch(Epoch::new(6));
        let kept = match unsafe { record.reclaim() } {
            Reclaim::Limbo(kept) => kept,
            Reclaim::Freed(_) => panic!("expected limbo"),
        };

        // Next pass: the reader has finished, floor moved past version 6
        assert_eq!(unsafe { kept.get() }.try_detach(Epoch::new(7)), Some(Epoch::new(6)));
        match unsafe { kept.reclaim() } {
            Reclaim::Freed(size) => assert_eq!(size, 64),
            Reclaim::Limbo(_) => panic!("expected free"),
        }
    }

    #[test]
    fn test_reclaim_does_not_unpublish_newer_record() {
        let table = Arc::new(PageTable::new(1, 64));
        let slot = table.slot(PageNo::new(0)).unwrap();

        let old = make_record(&table, 0, 1);
        unsafe { old.get() }.try_detach(Epoch::new(5)).unwrap();

        // Slot now serves a different record
        let newer = make_record(&table, 0, 2);
        slot.publish(newer);

        let _ = unsafe { old.reclaim() };
        assert_eq!(slot.resident(), Some(newer));

        assert!(slot.unpublish(newer));
        unsafe { newer.free() };
    }
}
