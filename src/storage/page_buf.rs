//! PageBuf - an owned, aligned, fixed-size byte buffer.
//!
//! A [`PageBuf`] holds the bytes of one resident page (or, for a resident
//! storage, one whole region). The aligned region starts at a multiple of
//! [`PAGE_ALIGNMENT`] so typed views can borrow items in place.

use std::fmt;

use crate::common::config::PAGE_ALIGNMENT;
use crate::common::{Error, Result};

/// A zero-filled byte buffer whose start is `PAGE_ALIGNMENT`-aligned.
///
/// # Memory Layout
/// The backing `Vec<u8>` is over-allocated by `PAGE_ALIGNMENT - 1` bytes and
/// the buffer begins at the first aligned offset inside it. No `unsafe` is
/// needed and the allocation is freed normally on drop.
///
/// # Clone Implementation
/// `PageBuf` does NOT implement `Clone`: copying a page should be explicit.
///
/// # Example
/// ```
/// use epochpage::storage::PageBuf;
///
/// let mut buf = PageBuf::try_new(4096).unwrap();
/// buf.as_mut_slice()[0] = 0xFF;
/// assert_eq!(buf.as_slice()[0], 0xFF);
/// assert_eq!(buf.as_slice().as_ptr() as usize % 64, 0);
/// ```
pub struct PageBuf {
    backing: Vec<u8>,
    /// Offset into `backing` where the aligned region begins.
    offset: usize,
    /// Length of the aligned region.
    len: usize,
}

impl PageBuf {
    /// Allocate a zeroed buffer of `len` bytes.
    ///
    /// # Errors
    /// `Error::OutOfMemory` if the allocation fails.
    pub fn try_new(len: usize) -> Result<Self> {
        let total = len
            .checked_add(PAGE_ALIGNMENT - 1)
            .ok_or(Error::OutOfMemory { bytes: len })?;

        let mut backing = Vec::new();
        backing
            .try_reserve_exact(total)
            .map_err(|_| Error::OutOfMemory { bytes: len })?;
        backing.resize(total, 0);

        let misalignment = backing.as_ptr() as usize & (PAGE_ALIGNMENT - 1);
        let offset = if misalignment == 0 {
            0
        } else {
            PAGE_ALIGNMENT - misalignment
        };

        debug_assert_eq!((backing.as_ptr() as usize + offset) % PAGE_ALIGNMENT, 0);
        debug_assert!(offset + len <= backing.len());

        Ok(Self {
            backing,
            offset,
            len,
        })
    }

    /// Get immutable slice of the buffer.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.backing[self.offset..self.offset + self.len]
    }

    /// Get mutable slice of the buffer.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.backing[self.offset..self.offset + self.len]
    }

    /// Size of the aligned region in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl fmt::Debug for PageBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageBuf")
            .field("len", &self.len)
            .field("ptr", &self.as_slice().as_ptr())
            .finish()
    }
}
