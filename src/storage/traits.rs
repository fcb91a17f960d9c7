//! The storage contract consumed by search and distance code.

use std::mem::size_of;

use zerocopy::{FromBytes, Immutable, KnownLayout};

use crate::common::{Error, Result};
use crate::storage::{ByteSource, ReadContext};

/// Types a storage can hand out by reference straight from page bytes.
///
/// Any plain-old-data type qualifies: every bit pattern valid, no interior
/// mutability. Derive the zerocopy traits for your own records.
pub trait Item: FromBytes + KnownLayout + Immutable + Sized + Send + Sync {}

impl<T> Item for T where T: FromBytes + KnownLayout + Immutable + Sized + Send + Sync {}

/// A typed array over a region of a byte source.
///
/// # Lifecycle
/// ```text
///   new() ──▶ initialize(source, count, min) ──▶ get(ctx, i) …
///               │
///               └─ source cursor moves past the region
/// ```
pub trait Storage<T: Item> {
    /// Bind the storage to the region starting at `source.offset()` and
    /// advance the cursor past it. Must be called exactly once.
    ///
    /// # Errors
    /// - `Error::Configuration` if `min_items_per_read` is zero or the
    ///   geometry is invalid
    /// - `Error::ProtocolViolation` if already initialized
    fn initialize(
        &mut self,
        source: &mut dyn ByteSource,
        item_count: u64,
        min_items_per_read: u32,
    ) -> Result<()>;

    /// Item `index`, valid while `ctx` lives.
    ///
    /// # Errors
    /// - `Error::Configuration` if not initialized
    /// - `Error::ProtocolViolation` if `index >= len()`
    /// - `Error::Io` / `Error::OutOfMemory` if a page load fails
    fn get<'c>(&'c self, ctx: &'c ReadContext<'_>, index: u64) -> Result<&'c T>;

    /// Total bytes of the region, resident or not.
    fn size(&self) -> u64;

    /// Number of items.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub(crate) fn check_index(index: u64, len: u64) -> Result<()> {
    if index >= len {
        return Err(Error::ProtocolViolation(format!(
            "index {} out of range ({} items)",
            index, len
        )));
    }
    Ok(())
}

/// View item `slot` of `bytes` as a `T`.
pub(crate) fn view_item<T: Item>(bytes: &[u8], slot: usize) -> Result<&T> {
    let size = size_of::<T>();
    let start = slot
        .checked_mul(size)
        .ok_or_else(|| Error::ProtocolViolation(format!("item slot {} overflows", slot)))?;

    let item = bytes.get(start..start.saturating_add(size)).ok_or_else(|| {
        Error::ProtocolViolation(format!(
            "item slot {} outside {}-byte buffer",
            slot,
            bytes.len()
        ))
    })?;

    T::ref_from_bytes(item).map_err(|_| {
        Error::Configuration(format!(
            "cannot view {} bytes at slot {} as {}",
            size,
            slot,
            std::any::type_name::<T>()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::PageBuf;

    #[test]
    fn test_view_item() {
        let mut buf = PageBuf::try_new(64).unwrap();
        buf.as_mut_slice()[8..16].copy_from_slice(&42u64.to_ne_bytes());

        let value: &u64 = view_item(buf.as_slice(), 1).unwrap();
        assert_eq!(*value, 42);
    }

    #[test]
    fn test_view_item_out_of_buffer() {
        let buf = PageBuf::try_new(64).unwrap();
        let result = view_item::<u64>(buf.as_slice(), 8);
        assert!(matches!(result, Err(Error::ProtocolViolation(_))));
    }

    #[test]
    fn test_view_item_misaligned() {
        let buf = PageBuf::try_new(64).unwrap();
        let result = view_item::<u64>(&buf.as_slice()[1..], 0);
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_check_index() {
        assert!(check_index(0, 1).is_ok());
        assert!(matches!(check_index(1, 1), Err(Error::ProtocolViolation(_))));
    }
}
