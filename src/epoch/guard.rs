//! RAII handle for one logical operation.

use std::fmt;

use crate::common::Epoch;
use crate::epoch::EpochTracker;

/// Keeps an epoch live for the duration of one logical operation.
///
/// Page references handed out by the cache borrow the guard, so they cannot
/// outlive the epoch that protects them. The epoch is retired when the guard
/// drops.
///
/// # Example
/// ```
/// use epochpage::epoch::EpochTracker;
///
/// let tracker = EpochTracker::new();
/// let guard = tracker.begin_operation();
/// assert_eq!(tracker.minimum_live_epoch(), guard.epoch());
/// guard.end();
/// assert!(!tracker.minimum_live_epoch().is_finite());
/// ```
#[must_use = "dropping the guard ends the operation immediately"]
pub struct EpochGuard<'a> {
    /// Tracker that issued the epoch, for retirement on drop.
    tracker: &'a EpochTracker,
    /// Epoch held by this operation.
    epoch: Epoch,
}

impl<'a> EpochGuard<'a> {
    /// Called by `EpochTracker::begin_operation()`.
    pub(crate) fn new(tracker: &'a EpochTracker, epoch: Epoch) -> Self {
        Self { tracker, epoch }
    }

    /// Get the epoch.
    #[inline]
    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    /// Check whether `tracker` issued this guard.
    #[inline]
    pub fn belongs_to(&self, tracker: &EpochTracker) -> bool {
        std::ptr::eq(self.tracker, tracker)
    }

    /// End the operation explicitly. Same as dropping the guard.
    pub fn end(self) {}
}

impl fmt::Debug for EpochGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EpochGuard")
            .field("epoch", &self.epoch)
            .finish()
    }
}

impl Drop for EpochGuard<'_> {
    fn drop(&mut self) {
        self.tracker.end_operation(self.epoch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_retires_on_drop() {
        let tracker = EpochTracker::new();
        {
            let _guard = tracker.begin_operation();
            assert_eq!(tracker.live_count(), 1);
        }
        assert_eq!(tracker.live_count(), 0);
    }

    #[test]
    fn test_guard_retires_on_panic() {
        let tracker = EpochTracker::new();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = tracker.begin_operation();
            panic!("operation failed");
        }));

        assert!(result.is_err());
        assert_eq!(tracker.live_count(), 0);
    }

    #[test]
    fn test_belongs_to() {
        let a = EpochTracker::new();
        let b = EpochTracker::new();

        let guard = a.begin_operation();
        assert!(guard.belongs_to(&a));
        assert!(!guard.belongs_to(&b));
    }
}
