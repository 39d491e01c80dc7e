/// Block Store
///
/// The core consumes exactly two capabilities from its storage collaborator:
/// an idempotent `put` keyed by checksum and a `get` whose returned bytes
/// must hash back to the requested id. Real deployments provide their own
/// backends; `MemoryBlockStore` is the reference implementation and the test
/// double.
use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::trace;

use crate::block::Block;
use crate::checksum::Checksum;
use crate::error::StoreError;
use crate::telemetry::short_id;
use crate::tuple::InMemoryBlockTuple;

#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Store a block under its id. Idempotent: re-putting an existing id
    /// succeeds without rewriting.
    async fn put(&self, id: &Checksum, block: &Block) -> Result<(), StoreError>;

    /// Fetch a block by id. Implementations must return bytes whose
    /// SHA3-512 equals `id`.
    async fn get(&self, id: &Checksum) -> Result<Block, StoreError>;
}

/// Sink for completed tuples. Persistence is atomic per tuple: the call
/// returns only once every member block is durable.
#[async_trait]
pub trait TupleSink: Send + Sync {
    async fn persist_tuple(&self, tuple: &InMemoryBlockTuple) -> Result<(), StoreError>;
}

#[async_trait]
impl<S: BlockStore + ?Sized> TupleSink for S {
    async fn persist_tuple(&self, tuple: &InMemoryBlockTuple) -> Result<(), StoreError> {
        for block in tuple.blocks() {
            self.put(block.id(), block).await?;
        }
        Ok(())
    }
}

/// In-memory store: HashMap behind an async RwLock.
pub struct MemoryBlockStore {
    blocks: RwLock<HashMap<Checksum, Block>>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self { blocks: RwLock::new(HashMap::new()) }
    }

    pub async fn len(&self) -> usize {
        self.blocks.read().await.len()
    }

    pub async fn contains(&self, id: &Checksum) -> bool {
        self.blocks.read().await.contains_key(id)
    }
}

impl Default for MemoryBlockStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlockStore for MemoryBlockStore {
    async fn put(&self, id: &Checksum, block: &Block) -> Result<(), StoreError> {
        if block.id() != id {
            return Err(StoreError::ChecksumMismatch);
        }
        let mut blocks = self.blocks.write().await;
        if !blocks.contains_key(id) {
            trace!(block = %short_id(id), kind = block.kind_name(), "stored block");
            blocks.insert(*id, block.clone());
        }
        Ok(())
    }

    async fn get(&self, id: &Checksum) -> Result<Block, StoreError> {
        let blocks = self.blocks.read().await;
        let block = blocks.get(id).cloned().ok_or(StoreError::NotFound)?;
        if Checksum::of(block.data()) != *id {
            return Err(StoreError::ChecksumMismatch);
        }
        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockSize;

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let store = MemoryBlockStore::new();
        let block = Block::random(BlockSize::Message);
        store.put(block.id(), &block).await.unwrap();
        let fetched = store.get(block.id()).await.unwrap();
        assert_eq!(fetched.data(), block.data());
        assert_eq!(fetched.id(), block.id());
    }

    #[tokio::test]
    async fn test_get_missing() {
        let store = MemoryBlockStore::new();
        let id = Checksum::of(b"nothing stored here");
        assert!(matches!(store.get(&id).await.unwrap_err(), StoreError::NotFound));
    }

    #[tokio::test]
    async fn test_put_is_idempotent() {
        let store = MemoryBlockStore::new();
        let block = Block::random(BlockSize::Message);
        store.put(block.id(), &block).await.unwrap();
        store.put(block.id(), &block).await.unwrap();
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_put_rejects_mismatched_id() {
        let store = MemoryBlockStore::new();
        let block = Block::random(BlockSize::Message);
        let wrong = Checksum::of(b"some other content");
        assert!(matches!(
            store.put(&wrong, &block).await.unwrap_err(),
            StoreError::ChecksumMismatch
        ));
    }

    #[tokio::test]
    async fn test_persist_tuple_stores_all_members() {
        let store = MemoryBlockStore::new();
        let blocks: Vec<Block> = (0..3).map(|_| Block::random(BlockSize::Message)).collect();
        let ids: Vec<Checksum> = blocks.iter().map(|b| *b.id()).collect();
        let tuple = InMemoryBlockTuple::new(blocks).unwrap();
        store.persist_tuple(&tuple).await.unwrap();
        for id in ids {
            assert!(store.contains(&id).await);
        }
    }
}
