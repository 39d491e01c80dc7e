/// Whitener Cache
///
/// Provides the reuse cache for whitening blocks. Reusing whiteners across
/// tuples is what makes OFF storage converge: the same noise block can
/// conceal many sources at once. Draws are served from the cache with a
/// target hit ratio; misses fall back to fresh randomness, which is then
/// cached for future tuples.
///
/// The cache is a process-scoped value constructed by the host and injected
/// into the pipeline; the core keeps no module-level state.
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lru::LruCache;
use rand::Rng;
use tokio::sync::RwLock;
use tracing::trace;

use crate::block::{Block, BlockSize};
use crate::checksum::Checksum;
use crate::constants::OFFS_CACHE_PERCENTAGE;
use crate::telemetry::short_id;

/// Default number of whiteners retained per block size.
const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// Cache statistics for host telemetry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

struct CacheShard {
    blocks: LruCache<Checksum, Arc<Vec<u8>>>,
    /// Draw order is randomised over this key list, not LRU order: every
    /// cached whitener should keep getting reused.
    keys: Vec<Checksum>,
}

impl CacheShard {
    fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self { blocks: LruCache::new(capacity), keys: Vec::new() }
    }

    fn insert(&mut self, id: Checksum, data: Arc<Vec<u8>>) {
        if self.blocks.contains(&id) {
            return;
        }
        if let Some((evicted, _)) = self.blocks.push(id, data) {
            if evicted != id {
                self.keys.retain(|k| k != &evicted);
            }
        }
        self.keys.push(id);
    }

    fn draw(&mut self) -> Option<(Checksum, Arc<Vec<u8>>)> {
        if self.keys.is_empty() {
            return None;
        }
        let index = rand::thread_rng().gen_range(0..self.keys.len());
        let id = self.keys[index];
        match self.blocks.get(&id) {
            Some(data) => Some((id, Arc::clone(data))),
            None => {
                // key list lagged an eviction
                self.keys.swap_remove(index);
                None
            }
        }
    }
}

/// Process-wide whitener reuse cache, one shard per block size.
pub struct WhitenerCache {
    shards: RwLock<HashMap<BlockSize, CacheShard>>,
    capacity_per_size: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl WhitenerCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(capacity_per_size: usize) -> Self {
        Self {
            shards: RwLock::new(HashMap::new()),
            capacity_per_size,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Add a whitener's bytes to the cache. Re-inserting an id is a no-op.
    pub async fn put(&self, block: &Block) {
        let mut shards = self.shards.write().await;
        let shard = shards
            .entry(block.size())
            .or_insert_with(|| CacheShard::new(self.capacity_per_size));
        shard.insert(*block.id(), Arc::new(block.data().to_vec()));
    }

    /// Draw a cached whitener of the given size, if any.
    pub async fn draw(&self, size: BlockSize) -> Option<Block> {
        let mut shards = self.shards.write().await;
        let shard = shards.get_mut(&size)?;
        match shard.draw() {
            Some((id, data)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                trace!(block = %short_id(&id), "whitener cache hit");
                // the bytes came from the cache keyed by their checksum
                Block::whitened(size, data.as_ref().clone()).ok()
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub async fn len(&self, size: BlockSize) -> usize {
        let shards = self.shards.read().await;
        shards.get(&size).map(|s| s.blocks.len()).unwrap_or(0)
    }

    pub async fn stats(&self) -> CacheStats {
        let shards = self.shards.read().await;
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: shards.values().map(|s| s.blocks.len()).sum(),
        }
    }

    pub async fn clear(&self) {
        self.shards.write().await.clear();
    }
}

impl Default for WhitenerCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Injected source of cache-drawn whiteners.
#[async_trait::async_trait]
pub trait WhitenerSource: Send + Sync {
    async fn next_whitener(&self, size: BlockSize) -> Option<Block>;
}

/// Injected source of fresh random blocks.
#[async_trait::async_trait]
pub trait RandomSource: Send + Sync {
    async fn next_random(&self, size: BlockSize) -> Block;
}

/// Cache-backed provider wiring both sources to one [`WhitenerCache`] with
/// the configured reuse ratio.
pub struct WhitenerProvider {
    cache: Arc<WhitenerCache>,
    cache_probability: f64,
}

impl WhitenerProvider {
    pub fn new(cache: Arc<WhitenerCache>) -> Self {
        Self { cache, cache_probability: OFFS_CACHE_PERCENTAGE }
    }

    pub fn with_cache_probability(mut self, probability: f64) -> Self {
        self.cache_probability = probability.clamp(0.0, 1.0);
        self
    }

    pub fn cache(&self) -> &WhitenerCache {
        &self.cache
    }
}

#[async_trait::async_trait]
impl WhitenerSource for WhitenerProvider {
    async fn next_whitener(&self, size: BlockSize) -> Option<Block> {
        let use_cache = rand::thread_rng().gen_bool(self.cache_probability);
        if use_cache {
            if let Some(block) = self.cache.draw(size).await {
                return Some(block);
            }
        }
        None
    }
}

#[async_trait::async_trait]
impl RandomSource for WhitenerProvider {
    async fn next_random(&self, size: BlockSize) -> Block {
        let block = Block::random(size);
        self.cache.put(&block).await;
        block
    }
}
