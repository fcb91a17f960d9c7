//! Intrusive record lists.
//!
//! The active and limbo lists are Treiber stacks threaded through
//! `PageRecord::next`. Page faults push concurrently; the collector is the
//! only consumer and always takes the whole list at once, which sidesteps
//! the ABA problem of single-node pops.

use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use crate::cache::record::{PageRecord, RecordPtr};

/// Lock-free stack of page records.
#[derive(Debug)]
pub(crate) struct RecordList {
    head: AtomicPtr<PageRecord>,
}

impl RecordList {
    pub(crate) const fn new() -> Self {
        Self {
            head: AtomicPtr::new(ptr::null_mut()),
        }
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire).is_null()
    }

    /// Push one record.
    pub(crate) fn push(&self, record: RecordPtr) {
        // SAFETY: a record being pushed is alive and linked nowhere else.
        let next = &unsafe { record.get() }.next;
        let mut head = self.head.load(Ordering::Relaxed);
        loop {
            next.store(head, Ordering::Relaxed);
            match self.head.compare_exchange_weak(
                head,
                record.as_ptr(),
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(actual) => head = actual,
            }
        }
    }

    /// Push a batch with a single CAS on the head.
    pub(crate) fn push_all(&self, records: &[RecordPtr]) {
        let (Some(&first), Some(&last)) = (records.first(), records.last()) else {
            return;
        };

        // SAFETY: records in the batch are alive and linked nowhere else.
        for pair in records.windows(2) {
            unsafe { pair[0].get() }
                .next
                .store(pair[1].as_ptr(), Ordering::Relaxed);
        }

        let tail = &unsafe { last.get() }.next;
        let mut head = self.head.load(Ordering::Relaxed);
        loop {
            tail.store(head, Ordering::Relaxed);
            match self.head.compare_exchange_weak(
                head,
                first.as_ptr(),
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(actual) => head = actual,
            }
        }
    }

    /// Detach every record currently on the list.
    ///
    /// Pushes that race with this call land on the emptied list and are left
    /// for the next pass.
    pub(crate) fn take_all(&self) -> Vec<RecordPtr> {
        let mut cursor = self.head.swap(ptr::null_mut(), Ordering::Acquire);
        let mut records = Vec::new();

        while let Some(record) = RecordPtr::from_raw(cursor) {
            // SAFETY: the chain is owned by this call after the swap.
            let next = &unsafe { record.get() }.next;
            cursor = next.swap(ptr::null_mut(), Ordering::Relaxed);
            records.push(record);
        }

        records
    }

    /// Byte sum and record count of everything on the list.
    ///
    /// # Safety
    /// No other thread may take records off the list or free them during
    /// the walk. Concurrent pushes are fine.
    pub(crate) unsafe fn total_bytes(&self) -> (u64, usize) {
        let mut cursor = self.head.load(Ordering::Acquire);
        let mut bytes = 0u64;
        let mut count = 0usize;

        while let Some(record) = RecordPtr::from_raw(cursor) {
            // SAFETY: upheld by the caller.
            let r = unsafe { record.get() };
            bytes += r.len() as u64;
            count += 1;
            cursor = r.next.load(Ordering::Acquire);
        }

        (bytes, count)
    }
}

impl Default for RecordList {
    fn default() -> Self {
        Self::new()
    }
}
