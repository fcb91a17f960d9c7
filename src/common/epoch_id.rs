//! Epoch identifier type.

use std::fmt;

/// A token issued to one logical operation.
///
/// Epochs come from a monotonically increasing counter. Slot versions are
/// epochs too: a slot's version is the newest epoch that touched it.
///
/// # Example
/// ```
/// use epochpage::Epoch;
///
/// let epoch = Epoch::new(5);
/// assert!(epoch.is_finite());
/// assert!(Epoch::ZERO < epoch);
/// assert!(epoch < Epoch::INFINITY);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Epoch(pub u64);

impl Epoch {
    /// Version of a slot no operation has touched yet. Never issued.
    pub const ZERO: Epoch = Epoch(0);

    /// Sentinel returned when no operation is live.
    pub const INFINITY: Epoch = Epoch(u64::MAX);

    /// Create a new Epoch.
    #[inline]
    pub fn new(value: u64) -> Self {
        Epoch(value)
    }

    /// Check that this is a real epoch and not the sentinel.
    #[inline]
    pub fn is_finite(&self) -> bool {
        *self != Self::INFINITY
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INFINITY {
            write!(f, "Epoch(INF)")
        } else {
            write!(f, "Epoch({})", self.0)
        }
    }
}
