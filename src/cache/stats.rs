//! Page cache statistics tracking.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters kept by the cache.
///
/// All fields are atomic for lock-free, thread-safe updates.
///
/// # Memory Ordering
/// `Relaxed` everywhere. Counters are independent of each other and of the
/// reclamation protocol; a snapshot may mix values from slightly different
/// instants.
///
/// # Example
/// ```
/// use epochpage::cache::CacheStats;
/// use std::sync::atomic::Ordering;
///
/// let stats = CacheStats::new();
/// stats.hits.fetch_add(1, Ordering::Relaxed);
/// assert_eq!(stats.snapshot().hits, 1);
/// ```
#[derive(Debug)]
pub struct CacheStats {
    /// Requests served from a resident page.
    pub hits: AtomicU64,

    /// Requests that ran the loader.
    pub page_faults: AtomicU64,

    /// Loader runs that returned an error.
    pub load_failures: AtomicU64,

    /// Records freed by collection.
    pub pages_freed: AtomicU64,

    /// Bytes returned to the allocator by collection.
    pub bytes_reclaimed: AtomicU64,

    /// Records moved to limbo because a reader touched them mid-pass.
    pub limbo_moves: AtomicU64,

    /// Candidates not selected and returned to the active list.
    pub second_chances: AtomicU64,

    /// Completed collection passes.
    pub collection_passes: AtomicU64,

    /// Highest number of passes ever observed running at once.
    pub peak_concurrent_passes: AtomicU64,
}

impl CacheStats {
    pub fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            page_faults: AtomicU64::new(0),
            load_failures: AtomicU64::new(0),
            pages_freed: AtomicU64::new(0),
            bytes_reclaimed: AtomicU64::new(0),
            limbo_moves: AtomicU64::new(0),
            second_chances: AtomicU64::new(0),
            collection_passes: AtomicU64::new(0),
            peak_concurrent_passes: AtomicU64::new(0),
        }
    }

    /// Fraction of requests served without a load (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        self.snapshot().hit_rate()
    }

    /// Non-atomic copy for display/logging.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            page_faults: self.page_faults.load(Ordering::Relaxed),
            load_failures: self.load_failures.load(Ordering::Relaxed),
            pages_freed: self.pages_freed.load(Ordering::Relaxed),
            bytes_reclaimed: self.bytes_reclaimed.load(Ordering::Relaxed),
            limbo_moves: self.limbo_moves.load(Ordering::Relaxed),
            second_chances: self.second_chances.load(Ordering::Relaxed),
            collection_passes: self.collection_passes.load(Ordering::Relaxed),
            peak_concurrent_passes: self.peak_concurrent_passes.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        for counter in [
            &self.hits,
            &self.page_faults,
            &self.load_failures,
            &self.pages_freed,
            &self.bytes_reclaimed,
            &self.limbo_moves,
            &self.second_chances,
            &self.collection_passes,
            &self.peak_concurrent_passes,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for CacheStats {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time copy of [`CacheStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub hits: u64,
    pub page_faults: u64,
    pub load_failures: u64,
    pub pages_freed: u64,
    pub bytes_reclaimed: u64,
    pub limbo_moves: u64,
    pub second_chances: u64,
    pub collection_passes: u64,
    pub peak_concurrent_passes: u64,
}

impl StatsSnapshot {
    /// Fraction of requests served without a load (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.page_faults;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Stats {{ hits: {}, faults: {}, freed: {}, limbo: {}, passes: {}, hit_rate: {:.2}% }}",
            self.hits,
            self.page_faults,
            self.pages_freed,
            self.limbo_moves,
            self.collection_passes,
            self.hit_rate() * 100.0
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_new() {
        let stats = CacheStats::new();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
        assert_eq!(stats.hit_rate(), 0.0);
    }

    #[test]
    fn test_stats_hit_rate() {
        let stats = CacheStats::new();
        stats.hits.fetch_add(7, Ordering::Relaxed);
        stats.page_faults.fetch_add(3, Ordering::Relaxed);

        assert_eq!(stats.hit_rate(), 0.7);
        assert_eq!(stats.snapshot().hit_rate(), 0.7);
    }

    #[test]
    fn test_stats_reset() {
        let stats = CacheStats::new();
        stats.hits.fetch_add(100, Ordering::Relaxed);
        stats.pages_freed.fetch_add(4, Ordering::Relaxed);
        stats.peak_concurrent_passes.fetch_max(1, Ordering::Relaxed);

        stats.reset();

        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn test_stats_display() {
        let stats = CacheStats::new();
        stats.hits.fetch_add(80, Ordering::Relaxed);
        stats.page_faults.fetch_add(20, Ordering::Relaxed);
        stats.pages_freed.fetch_add(5, Ordering::Relaxed);

        let display = format!("{}", stats.snapshot());

        assert!(display.contains("hits: 80"));
        assert!(display.contains("faults: 20"));
        assert!(display.contains("freed: 5"));
        assert!(display.contains("80.00%"));
    }
}
