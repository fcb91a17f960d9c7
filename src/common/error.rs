//! Error types for the page cache and storage façades.

use thiserror::Error;

/// Convenient Result type alias.
///
/// Instead of writing `Result<T, Error>` everywhere, we can write `Result<T>`.
pub type Result<T> = std::result::Result<T, Error>;

/// All errors surfaced by the cache and the storages built on it.
///
/// A failed page load leaves the slot untouched, so every variant aborts
/// only the operation that hit it.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or missing setup: uninitialized storage, zero minimum-read
    /// unit, bad budget, impossible page geometry.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The byte source failed while filling a page.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A page buffer could not be allocated.
    #[error("out of memory allocating {bytes} bytes")]
    OutOfMemory { bytes: usize },

    /// The caller broke the usage contract: out-of-range index, an epoch
    /// guard from another cache, or a call back into the cache from a loader.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
}
