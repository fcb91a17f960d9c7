//! Epoch tracker - issues epochs and tracks which are still live.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::common::Epoch;
use crate::epoch::EpochGuard;

/// Issues one epoch per logical operation and remembers the live ones.
///
/// # Thread Safety
/// - `last_issued`: `AtomicU64`, readable without the lock
/// - `live`: `Mutex`, membership only changes when an operation begins or
///   ends, never per page access
///
/// Issuing an epoch and inserting it into the live set happen under the same
/// lock, so [`reclaim_floor`](Self::reclaim_floor) never misses an epoch that
/// was issued but not yet registered.
#[derive(Debug)]
pub struct EpochTracker {
    /// Process-unique identity, never 0.
    id: u64,

    /// Last epoch handed out. Epoch 0 is never issued.
    last_issued: AtomicU64,

    /// Epochs of operations that have begun and not ended.
    live: Mutex<BTreeSet<u64>>,
}

static NEXT_TRACKER_ID: AtomicU64 = AtomicU64::new(1);

impl EpochTracker {
    /// Create a tracker that has issued nothing.
    pub fn new() -> Self {
        Self {
            id: NEXT_TRACKER_ID.fetch_add(1, Ordering::Relaxed),
            last_issued: AtomicU64::new(0),
            live: Mutex::new(BTreeSet::new()),
        }
    }

    /// Identity of this tracker. Distinct for every tracker in the process.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Begin a logical operation.
    ///
    /// The returned guard ends the operation when dropped, so the epoch is
    /// released on every exit path.
    pub fn begin_operation(&self) -> EpochGuard<'_> {
        let epoch = {
            let mut live = self.live.lock();
            let epoch = self.last_issued.fetch_add(1, Ordering::AcqRel) + 1;
            live.insert(epoch);
            epoch
        };

        EpochGuard::new(self, Epoch::new(epoch))
    }

    /// Retire an epoch. Called by `EpochGuard` on drop.
    pub(crate) fn end_operation(&self, epoch: Epoch) {
        let removed = self.live.lock().remove(&epoch.0);
        debug_assert!(removed, "{} ended twice", epoch);
    }

    /// Smallest live epoch, or [`Epoch::INFINITY`] when nothing is live.
    pub fn minimum_live_epoch(&self) -> Epoch {
        self.live
            .lock()
            .first()
            .copied()
            .map(Epoch::new)
            .unwrap_or(Epoch::INFINITY)
    }

    /// Eviction safety floor for a collection pass.
    ///
    /// The smallest live epoch, or the next epoch to be issued when nothing
    /// is live. Every operation that can still touch a page holds an epoch
    /// at or above this value, including ones that begin after the call.
    pub fn reclaim_floor(&self) -> Epoch {
        let live = self.live.lock();
        match live.first() {
            Some(&epoch) => Epoch::new(epoch),
            None => Epoch::new(self.last_issued.load(Ordering::Acquire) + 1),
        }
    }

    /// Last epoch handed out, or [`Epoch::ZERO`] before the first one.
    pub fn last_issued(&self) -> Epoch {
        Epoch::new(self.last_issued.load(Ordering::Acquire))
    }

    /// Number of operations currently in flight.
    pub fn live_count(&self) -> usize {
        self.live.lock().len()
    }
}

impl Default for EpochTracker {
    fn default() -> Self {
        Self::new()
    }
}
