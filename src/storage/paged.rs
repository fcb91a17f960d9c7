//! PagedStorage - a lazily loaded, cache-backed typed array.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::cache::{Cache, PageTable};
use crate::common::{Error, Result};
use crate::storage::traits::{check_index, view_item};
use crate::storage::{ByteSource, Item, PageLayout, ReadContext, Storage};

/// Layout and slots, fixed at `initialize`.
#[derive(Debug)]
struct Bound {
    layout: PageLayout,
    table: Arc<PageTable>,
}

/// Typed array whose pages are loaded on first access and evicted by the
/// shared [`Cache`].
///
/// # Read Path
/// ```text
///   get(ctx, i)
///     page = i / items_per_page
///     bytes = cache.get_or_load(table, page, ctx.guard(),
///                 |buf| layout.load_page(ctx.source(), page, buf))
///     &bytes[(i % items_per_page) * size_of::<T>()]
/// ```
///
/// # Thread Safety
/// `get` takes `&self`; any number of threads may read concurrently, each
/// with its own [`ReadContext`].
pub struct PagedStorage<T> {
    cache: Arc<Cache>,
    bound: Option<Bound>,
    _item: PhantomData<fn() -> T>,
}

impl<T: Item> PagedStorage<T> {
    /// Create an uninitialized storage backed by `cache`.
    pub fn new(cache: Arc<Cache>) -> Self {
        Self {
            cache,
            bound: None,
            _item: PhantomData,
        }
    }

    pub fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }

    /// Geometry, once initialized.
    pub fn layout(&self) -> Option<&PageLayout> {
        self.bound.as_ref().map(|bound| &bound.layout)
    }

    /// Number of this storage's pages currently resident.
    pub fn resident_pages(&self) -> usize {
        self.bound
            .as_ref()
            .map_or(0, |bound| bound.table.resident_pages())
    }

    fn bound(&self) -> Result<&Bound> {
        self.bound
            .as_ref()
            .ok_or_else(|| Error::Configuration("paged storage used before initialize".into()))
    }
}

impl<T: Item> Storage<T> for PagedStorage<T> {
    fn initialize(
        &mut self,
        source: &mut dyn ByteSource,
        item_count: u64,
        min_items_per_read: u32,
    ) -> Result<()> {
        if self.bound.is_some() {
            return Err(Error::ProtocolViolation(
                "paged storage initialized twice".into(),
            ));
        }

        let layout = PageLayout::for_item::<T>(source.offset(), item_count, min_items_per_read)?;
        source.skip(layout.region_bytes())?;

        let table = Arc::new(PageTable::new(layout.page_count(), layout.page_size()));
        self.bound = Some(Bound { layout, table });
        Ok(())
    }

    fn get<'c>(&'c self, ctx: &'c ReadContext<'_>, index: u64) -> Result<&'c T> {
        let Bound { layout, table } = self.bound()?;
        check_index(index, layout.item_count())?;

        let page = layout.page_of(index);
        let bytes = self
            .cache
            .get_or_load(table, page, ctx.guard(), |buf| {
                layout.load_page(ctx.source(), page, buf)
            })?;

        view_item(bytes, layout.slot_in_page(index))
    }

    fn size(&self) -> u64 {
        self.layout().map_or(0, PageLayout::region_bytes)
    }

    fn len(&self) -> u64 {
        self.layout().map_or(0, PageLayout::item_count)
    }
}

impl<T> fmt::Debug for PagedStorage<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PagedStorage")
            .field("item", &std::any::type_name::<T>())
            .field("layout", &self.bound.as_ref().map(|bound| bound.layout))
            .finish()
    }
}
