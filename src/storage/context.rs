//! ReadContext - one logical operation against the storages of a cache.

use std::fmt;

use crate::cache::Cache;
use crate::common::Epoch;
use crate::epoch::EpochGuard;
use crate::storage::ByteSource;

/// Everything a `get` needs from the operation performing it.
///
/// Holds the operation's epoch and the byte source its page faults read
/// from. Sources belong to the operation, not to the pages: a page loaded
/// through one context is served to later contexts with their own sources.
///
/// Items borrowed through a context are valid until the context is dropped.
///
/// # Example
/// ```
/// use epochpage::cache::Cache;
/// use epochpage::common::config::CacheConfig;
/// use epochpage::storage::{MemoryByteSource, ReadContext};
///
/// let cache = Cache::new(CacheConfig::new(1 << 20)).unwrap();
/// let source = MemoryByteSource::new(vec![0u8; 64]);
///
/// let ctx = ReadContext::begin(&cache, &source);
/// assert!(ctx.epoch() >= cache.epochs().minimum_live_epoch());
/// ctx.finish();
/// ```
pub struct ReadContext<'a> {
    guard: EpochGuard<'a>,
    source: &'a dyn ByteSource,
}

impl<'a> ReadContext<'a> {
    /// Wrap an operation that has already begun.
    pub fn new(guard: EpochGuard<'a>, source: &'a dyn ByteSource) -> Self {
        Self { guard, source }
    }

    /// Begin a new operation on `cache` reading from `source`.
    pub fn begin(cache: &'a Cache, source: &'a dyn ByteSource) -> Self {
        Self::new(cache.begin_operation(), source)
    }

    #[inline]
    pub fn guard(&self) -> &EpochGuard<'a> {
        &self.guard
    }

    #[inline]
    pub fn source(&self) -> &'a dyn ByteSource {
        self.source
    }

    #[inline]
    pub fn epoch(&self) -> Epoch {
        self.guard.epoch()
    }

    /// End the operation. Same as dropping the context.
    pub fn finish(self) {}
}

impl fmt::Debug for ReadContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadContext")
            .field("epoch", &self.epoch())
            .field("source_length", &self.source.file_length())
            .finish()
    }
}
