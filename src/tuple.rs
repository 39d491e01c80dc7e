/// Tuple Engine
///
/// A tuple is a reconstruction recipe, not storage: N equal-size blocks
/// whose XOR equals the encrypted source block. Any N−1 members plus the
/// CBL recover the Nth. Tuples hold their members in a fixed order (the
/// brightened primary first, then the companions) and that order is what
/// lands in the CBL address list.
use crate::block::{Block, BlockSize};
use crate::checksum::Checksum;
use crate::constants::{CHECKSUM_LENGTH, TUPLE_MAX_SIZE, TUPLE_MIN_SIZE};
use crate::error::TupleError;
use crate::xor;

pub struct InMemoryBlockTuple {
    blocks: Vec<Block>,
}

impl InMemoryBlockTuple {
    pub fn new(blocks: Vec<Block>) -> Result<Self, TupleError> {
        if blocks.len() < TUPLE_MIN_SIZE || blocks.len() > TUPLE_MAX_SIZE {
            return Err(TupleError::InvalidTupleSize(blocks.len()));
        }
        let size = blocks[0].size();
        if blocks.iter().any(|b| b.size() != size) {
            return Err(TupleError::BlockSizeMismatch);
        }
        Ok(Self { blocks })
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn block_size(&self) -> BlockSize {
        self.blocks[0].size()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn into_blocks(self) -> Vec<Block> {
        self.blocks
    }

    /// Bytewise XOR of every member. The result has the members' common
    /// length; XORing a brightened tuple yields the encrypted source block.
    pub fn xor(&self) -> Result<Vec<u8>, TupleError> {
        let buffers: Vec<&[u8]> = self.blocks.iter().map(|b| b.data()).collect();
        match xor::xor_multiple(&buffers) {
            Ok(out) => Ok(out),
            Err(_) => Err(TupleError::NoBlocksToXor),
        }
    }

    /// Member checksums concatenated in tuple order, 64 bytes each.
    pub fn block_ids_buffer(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.blocks.len() * CHECKSUM_LENGTH);
        for block in &self.blocks {
            out.extend_from_slice(block.id().as_bytes());
        }
        out
    }

    pub fn block_ids(&self) -> Vec<Checksum> {
        self.blocks.iter().map(|b| *b.id()).collect()
    }
}
