//! Byte-weighted cache of verified store blocks.
//!
//! Reads go through the memory map, but every block access re-verifies the
//! block checksum and copies the payload out of the map. The cache keeps
//! recently used, already-verified payloads so hot blocks skip both steps.
//! Capacity is the per-database cache size configured at open time.

use std::sync::Arc;

use quick_cache::{Weighter, sync::Cache as QuickCache};

/// Blocks below this total are always retained; a zero-sized cache would
/// otherwise thrash on every access.
const MIN_CACHE_BYTES: u64 = 64 * 1024;

#[derive(Clone)]
struct BlockWeighter;

impl Weighter<u64, Arc<[u8]>> for BlockWeighter {
    fn weight(&self, _: &u64, block: &Arc<[u8]>) -> u64 {
        block.len() as u64
    }
}

/// Cache of decoded block payloads, keyed by file offset.
pub(crate) struct BlockCache {
    data: QuickCache<u64, Arc<[u8]>, BlockWeighter>,
}

impl BlockCache {
    /// Create a cache bounded by `bytes` (clamped to a small minimum).
    pub(crate) fn with_capacity(bytes: u64) -> Self {
        let capacity = bytes.max(MIN_CACHE_BYTES);
        let estimated_items = usize::try_from(capacity / 4096).unwrap_or(usize::MAX).clamp(16, 1 << 20);
        Self {
            data: QuickCache::with_weighter(estimated_items, capacity, BlockWeighter),
        }
    }

    pub(crate) fn get(&self, offset: u64) -> Option<Arc<[u8]>> {
        self.data.get(&offset)
    }

    pub(crate) fn insert(&self, offset: u64, block: Arc<[u8]>) {
        self.data.insert(offset, block);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_get() {
        let cache = BlockCache::with_capacity(1024 * 1024);
        let block: Arc<[u8]> = Arc::from(vec![1u8, 2, 3].into_boxed_slice());
        cache.insert(42, Arc::clone(&block));
        let hit = cache.get(42).expect("cached block");
        assert_eq!(&*hit, &[1, 2, 3]);
        assert!(cache.get(7).is_none());
    }

    #[test]
    fn tiny_capacity_is_clamped() {
        // a zero-byte cache still holds at least one small block
        let cache = BlockCache::with_capacity(0);
        let block: Arc<[u8]> = Arc::from(vec![0u8; 128].into_boxed_slice());
        cache.insert(0, Arc::clone(&block));
        assert!(cache.get(0).is_some());
    }
}
