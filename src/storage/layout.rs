//! PageLayout - how a storage's region is cut into pages.
//!
//! # Page Geometry
//! ```text
//!  atomic unit  = item_size × min_items_per_read
//!  page (raw)   = BASE_PAGE_SIZE, doubled until ≥ atomic unit
//!  page_size    = ⌊raw / atomic⌋ × atomic        (whole units only)
//!  items/page   = ⌊raw / atomic⌋ × min_items_per_read
//!
//!  base_offset
//!  ▼
//!  ┌────────────┬────────────┬────────────┬───────┐
//!  │   page 0   │   page 1   │     …      │ last  │  ← last page may be short
//!  └────────────┴────────────┴────────────┴───────┘
//!  ◀─page_size─▶
//! ```

use std::io;
use std::mem::{align_of, size_of};

use crate::common::config::{BASE_PAGE_SIZE, PAGE_ALIGNMENT};
use crate::common::{Error, PageNo, Result};
use crate::storage::ByteSource;

/// Geometry of one storage region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLayout {
    base_offset: u64,
    item_count: u64,
    item_size: usize,
    items_per_page: u64,
    page_size: usize,
    page_count: usize,
}

impl PageLayout {
    /// Compute the layout of `item_count` items of `item_size` bytes
    /// starting at `base_offset`.
    ///
    /// # Errors
    /// `Error::Configuration` if `item_size` or `min_items_per_read` is zero,
    /// or if the geometry overflows.
    pub fn new(
        base_offset: u64,
        item_count: u64,
        item_size: usize,
        min_items_per_read: u32,
    ) -> Result<Self> {
        if item_size == 0 {
            return Err(Error::Configuration("item size must be > 0".into()));
        }
        if min_items_per_read == 0 {
            return Err(Error::Configuration(
                "minimum items per read must be >= 1".into(),
            ));
        }

        let overflow = || Error::Configuration("page geometry overflows".into());

        let atomic = item_size
            .checked_mul(min_items_per_read as usize)
            .ok_or_else(overflow)?;

        let mut raw = BASE_PAGE_SIZE;
        while raw < atomic {
            raw = raw.checked_mul(2).ok_or_else(overflow)?;
        }

        let units = raw / atomic;
        let page_size = units * atomic;
        let items_per_page = units as u64 * u64::from(min_items_per_read);

        let region_bytes = item_count
            .checked_mul(item_size as u64)
            .ok_or_else(overflow)?;
        base_offset.checked_add(region_bytes).ok_or_else(overflow)?;

        let page_count =
            usize::try_from(item_count.div_ceil(items_per_page)).map_err(|_| overflow())?;

        Ok(Self {
            base_offset,
            item_count,
            item_size,
            items_per_page,
            page_size,
            page_count,
        })
    }

    /// Layout for items of type `T`.
    ///
    /// # Errors
    /// As [`new`](Self::new), plus `Error::Configuration` if `T` needs more
    /// alignment than a page buffer provides.
    pub fn for_item<T>(base_offset: u64, item_count: u64, min_items_per_read: u32) -> Result<Self> {
        if align_of::<T>() > PAGE_ALIGNMENT {
            return Err(Error::Configuration(format!(
                "item alignment {} exceeds page alignment {}",
                align_of::<T>(),
                PAGE_ALIGNMENT
            )));
        }
        Self::new(base_offset, item_count, size_of::<T>(), min_items_per_read)
    }

    #[inline]
    pub fn base_offset(&self) -> u64 {
        self.base_offset
    }

    #[inline]
    pub fn item_count(&self) -> u64 {
        self.item_count
    }

    #[inline]
    pub fn item_size(&self) -> usize {
        self.item_size
    }

    #[inline]
    pub fn items_per_page(&self) -> u64 {
        self.items_per_page
    }

    /// Bytes per page buffer.
    #[inline]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    #[inline]
    pub fn page_count(&self) -> usize {
        self.page_count
    }

    /// Total bytes of the region, `item_count × item_size`.
    #[inline]
    pub fn region_bytes(&self) -> u64 {
        self.item_count * self.item_size as u64
    }

    /// Page holding item `index`.
    #[inline]
    pub fn page_of(&self, index: u64) -> PageNo {
        PageNo::new((index / self.items_per_page) as usize)
    }

    /// Position of item `index` within its page, in items.
    #[inline]
    pub fn slot_in_page(&self, index: u64) -> usize {
        (index % self.items_per_page) as usize
    }

    /// Source offset of the first byte of `page`.
    #[inline]
    pub fn page_offset(&self, page: PageNo) -> u64 {
        self.base_offset + page.0 as u64 * self.page_size as u64
    }

    /// Bytes of the region that fall in `page`. Equal to the page size
    /// except on a short last page.
    pub fn page_region_bytes(&self, page: PageNo) -> usize {
        let start = page.0 as u64 * self.page_size as u64;
        let remaining = self.region_bytes().saturating_sub(start);
        remaining.min(self.page_size as u64) as usize
    }

    /// Fill `dest` with `page` from `source`.
    ///
    /// Copies up to one page, stopping at the end of the source. Bytes past
    /// the region that happen to exist in the source are copied too.
    ///
    /// # Errors
    /// `Error::Io` with `UnexpectedEof` if the source ends before the
    /// region bytes of this page.
    pub fn load_page(&self, source: &dyn ByteSource, page: PageNo, dest: &mut [u8]) -> Result<()> {
        debug_assert_eq!(dest.len(), self.page_size);

        let start = self.page_offset(page);
        let available = source.file_length().saturating_sub(start);
        let len = available.min(self.page_size as u64) as usize;
        let needed = self.page_region_bytes(page);

        if len < needed {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "{} needs {} bytes at offset {}, source has {}",
                    page, needed, start, len
                ),
            )));
        }

        source.copy_bytes_with_offset(start, &mut dest[..len])
    }
}
