//! VectorStorage - one storage type over both residency strategies.

use std::sync::Arc;

use crate::cache::Cache;
use crate::common::Result;
use crate::storage::{ByteSource, Item, PagedStorage, ReadContext, ResidentStorage, Storage};

/// A storage that is either fully resident or paged through a cache.
///
/// Consumers hold a `VectorStorage<T>` and never need to know which one
/// they got.
///
/// # Example
/// ```
/// use epochpage::cache::Cache;
/// use epochpage::common::config::CacheConfig;
/// use epochpage::storage::{MemoryByteSource, ReadContext, Storage, VectorStorage};
///
/// let bytes: Vec<u8> = (0u32..64).flat_map(|v| v.to_ne_bytes()).collect();
/// let mut source = MemoryByteSource::new(bytes);
/// let cache = Cache::new(CacheConfig::new(1 << 20)).unwrap();
///
/// let mut ids = VectorStorage::<u32>::paged(cache.clone());
/// ids.initialize(&mut source, 64, 1).unwrap();
///
/// let ctx = ReadContext::begin(&cache, &source);
/// assert_eq!(*ids.get(&ctx, 10).unwrap(), 10);
/// ```
#[derive(Debug)]
pub enum VectorStorage<T> {
    Resident(ResidentStorage<T>),
    Paged(PagedStorage<T>),
}

impl<T: Item> VectorStorage<T> {
    pub fn resident() -> Self {
        VectorStorage::Resident(ResidentStorage::new())
    }

    pub fn paged(cache: Arc<Cache>) -> Self {
        VectorStorage::Paged(PagedStorage::new(cache))
    }

    pub fn is_paged(&self) -> bool {
        matches!(self, VectorStorage::Paged(_))
    }
}

impl<T: Item> Storage<T> for VectorStorage<T> {
    fn initialize(
        &mut self,
        source: &mut dyn ByteSource,
        item_count: u64,
        min_items_per_read: u32,
    ) -> Result<()> {
        match self {
            VectorStorage::Resident(s) => s.initialize(source, item_count, min_items_per_read),
            VectorStorage::Paged(s) => s.initialize(source, item_count, min_items_per_read),
        }
    }

    fn get<'c>(&'c self, ctx: &'c ReadContext<'_>, index: u64) -> Result<&'c T> {
        match self {
            VectorStorage::Resident(s) => s.get(ctx, index),
            VectorStorage::Paged(s) => s.get(ctx, index),
        }
    }

    fn size(&self) -> u64 {
        match self {
            VectorStorage::Resident(s) => s.size(),
            VectorStorage::Paged(s) => s.size(),
        }
    }

    fn len(&self) -> u64 {
        match self {
            VectorStorage::Resident(s) => s.len(),
            VectorStorage::Paged(s) => s.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::CacheConfig;
    use crate::storage::MemoryByteSource;

    #[test]
    fn test_variants_agree() {
        let bytes: Vec<u8> = (0u64..5000).flat_map(|v| (v * 3).to_ne_bytes()).collect();
        let mut source = MemoryByteSource::new(bytes);
        let cache = Cache::new(CacheConfig::new(1 << 20)).unwrap();

        // Two storages over consecutive copies of the same region
        let mut resident = VectorStorage::<u64>::resident();
        resident.initialize(&mut source, 5000, 1).unwrap();
        source.seek(0).unwrap();
        let mut paged = VectorStorage::<u64>::paged(Arc::clone(&cache));
        paged.initialize(&mut source, 5000, 1).unwrap();

        assert!(!resident.is_paged());
        assert!(paged.is_paged());
        assert_eq!(resident.size(), paged.size());
        assert_eq!(resident.len(), paged.len());

        let ctx = ReadContext::begin(&cache, &source);
        for index in (0..5000).step_by(37) {
            assert_eq!(resident.get(&ctx, index).unwrap(), paged.get(&ctx, index).unwrap());
        }
    }
}
