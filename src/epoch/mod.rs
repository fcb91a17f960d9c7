//! Epoch tracking.
//!
//! Every logical operation (one search query, say) holds an epoch for its
//! whole lifetime. The cache stamps each page it serves with the caller's
//! epoch and never reclaims a page stamped at or above the oldest live one.
//!
//! # Components
//! - [`EpochTracker`] - Monotonic counter plus the set of live epochs
//! - [`EpochGuard`] - RAII handle that keeps one epoch live

mod guard;
mod tracker;

pub use guard::EpochGuard;
pub use tracker::EpochTracker;
