//! ResidentStorage - a typed array read fully into memory up front.

use std::fmt;
use std::marker::PhantomData;

use crate::common::{Error, Result};
use crate::storage::traits::{check_index, view_item};
use crate::storage::{ByteSource, Item, PageBuf, PageLayout, ReadContext, Storage};

/// Typed array that reads its whole region during `initialize` and never
/// touches the cache or the byte source afterwards.
///
/// Suited to small, hot arrays (graph entry points, codebooks) where paging
/// would only add overhead.
pub struct ResidentStorage<T> {
    items: Option<(u64, PageBuf)>,
    _item: PhantomData<fn() -> T>,
}

impl<T: Item> ResidentStorage<T> {
    pub fn new() -> Self {
        Self {
            items: None,
            _item: PhantomData,
        }
    }
}

impl<T: Item> Default for ResidentStorage<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Item> Storage<T> for ResidentStorage<T> {
    fn initialize(
        &mut self,
        source: &mut dyn ByteSource,
        item_count: u64,
        min_items_per_read: u32,
    ) -> Result<()> {
        if self.items.is_some() {
            return Err(Error::ProtocolViolation(
                "resident storage initialized twice".into(),
            ));
        }

        // Same validation as the paged variant
        let layout = PageLayout::for_item::<T>(source.offset(), item_count, min_items_per_read)?;
        let region = layout.region_bytes();
        let len = usize::try_from(region).map_err(|_| Error::OutOfMemory { bytes: usize::MAX })?;

        let mut bytes = PageBuf::try_new(len)?;
        source.copy_bytes_with_offset(layout.base_offset(), bytes.as_mut_slice())?;
        source.skip(region)?;

        self.items = Some((item_count, bytes));
        Ok(())
    }

    fn get<'c>(&'c self, _ctx: &'c ReadContext<'_>, index: u64) -> Result<&'c T> {
        let (count, bytes) = self.items.as_ref().ok_or_else(|| {
            Error::Configuration("resident storage used before initialize".into())
        })?;
        check_index(index, *count)?;

        view_item(bytes.as_slice(), index as usize)
    }

    fn size(&self) -> u64 {
        self.items.as_ref().map_or(0, |(_, bytes)| bytes.len() as u64)
    }

    fn len(&self) -> u64 {
        self.items.as_ref().map_or(0, |(count, _)| *count)
    }
}

impl<T> fmt::Debug for ResidentStorage<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResidentStorage")
            .field("item", &std::any::type_name::<T>())
            .field("len", &self.items.as_ref().map(|(count, _)| *count))
            .finish()
    }
}
