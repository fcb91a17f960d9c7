//! Configuration constants and cache settings.

use crate::common::{Error, Result};

/// Smallest page size in bytes (16KB).
///
/// A storage starts from this size and doubles it until one minimum-read
/// unit fits, so small items share large pages and large items still get a
/// page that holds at least one whole unit.
pub const BASE_PAGE_SIZE: usize = 16 * 1024;

/// Alignment of every page buffer in bytes.
///
/// Typed views reinterpret page bytes in place, so the buffer must be aligned
/// at least as strictly as any item type. 64 covers every primitive and SIMD
/// lane width plus a cache line.
pub const PAGE_ALIGNMENT: usize = 64;

/// Fraction of the budget a collection pass tries to bring usage down to.
pub const DEFAULT_RECLAIM_TARGET_RATIO: f64 = 0.5;

/// How collection passes get scheduled once usage crosses the budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollectionMode {
    /// A page fault that pushes usage over budget spawns one detached pass.
    #[default]
    Background,
    /// Nothing runs on its own; the owner calls `Cache::collect()`.
    Manual,
}

/// Settings for a [`Cache`](crate::cache::Cache).
///
/// # Example
/// ```
/// use epochpage::common::config::{CacheConfig, CollectionMode};
///
/// let config = CacheConfig::new(64 * 1024 * 1024)
///     .with_reclaim_target_ratio(0.25)
///     .with_collection_mode(CollectionMode::Manual);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheConfig {
    /// Soft limit on resident page bytes.
    pub budget_bytes: u64,

    /// A pass reclaims down to `budget_bytes * reclaim_target_ratio`.
    pub reclaim_target_ratio: f64,

    /// Scheduling of collection passes.
    pub collection: CollectionMode,
}

impl CacheConfig {
    /// Config with the given budget and default policy.
    pub fn new(budget_bytes: u64) -> Self {
        Self {
            budget_bytes,
            reclaim_target_ratio: DEFAULT_RECLAIM_TARGET_RATIO,
            collection: CollectionMode::default(),
        }
    }

    pub fn with_reclaim_target_ratio(mut self, ratio: f64) -> Self {
        self.reclaim_target_ratio = ratio;
        self
    }

    pub fn with_collection_mode(mut self, mode: CollectionMode) -> Self {
        self.collection = mode;
        self
    }

    /// Check the settings.
    ///
    /// # Errors
    /// `Error::Configuration` if the budget is zero or the ratio is outside
    /// `[0, 1)`.
    pub fn validate(&self) -> Result<()> {
        if self.budget_bytes == 0 {
            return Err(Error::Configuration("cache budget must be > 0".into()));
        }
        if !(0.0..1.0).contains(&self.reclaim_target_ratio) {
            return Err(Error::Configuration(format!(
                "reclaim target ratio must be in [0, 1), got {}",
                self.reclaim_target_ratio
            )));
        }
        Ok(())
    }

    /// Usage level a collection pass aims for, in bytes.
    pub fn reclaim_target_bytes(&self) -> u64 {
        (self.budget_bytes as f64 * self.reclaim_target_ratio) as u64
    }
}
