//! Storage layer - typed arrays over byte sources.
//!
//! This module handles everything between a byte source and a `&T`:
//! - [`ByteSource`] - Read contract, with [`MemoryByteSource`] and
//!   [`FileByteSource`]
//! - [`PageLayout`] - Page sizing and index math
//! - [`PageBuf`] - Aligned page buffers
//! - [`ReadContext`] - One logical operation (epoch plus source)
//! - [`Storage`] - The typed-array contract, implemented by
//!   [`PagedStorage`], [`ResidentStorage`] and [`VectorStorage`]

mod byte_source;
mod context;
mod layout;
mod page_buf;
mod paged;
mod resident;
mod traits;
mod vector;

pub use byte_source::{ByteSource, FileByteSource, MemoryByteSource};
pub use context::ReadContext;
pub use layout::PageLayout;
pub use page_buf::PageBuf;
pub use paged::PagedStorage;
pub use resident::ResidentStorage;
pub use traits::{Item, Storage};
pub use vector::VectorStorage;
