/// Block Model
///
/// Blocks are uniform-size byte buffers identified by the SHA3-512 of their
/// contents. Two blocks with equal bytes have equal ids and are fully
/// interchangeable. The variants track provenance, not representation:
/// whiteners and randoms are indistinguishable noise on the wire, an
/// encrypted block begins with the 0x04 ECIES marker, and a structured
/// block begins with the 0xBC magic.
use std::fmt;

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::block_format::{detect_block_format, StructuredBlockType};
use crate::checksum::Checksum;
use crate::constants::{PUBLIC_KEY_PREFIX, STRUCTURED_BLOCK_MAGIC};
use crate::error::BlockError;

/// The fixed block-size ladder. Every stored block is exactly one of these
/// lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockSize {
    Message,
    Tiny,
    Small,
    Medium,
    Large,
    Huge,
}

impl BlockSize {
    pub const fn length(&self) -> usize {
        match self {
            BlockSize::Message => 512,
            BlockSize::Tiny => 1024,
            BlockSize::Small => 4096,
            BlockSize::Medium => 1 << 20,
            BlockSize::Large => 1 << 26,
            BlockSize::Huge => 1 << 28,
        }
    }

    pub fn from_length(length: usize) -> Option<Self> {
        Self::all().iter().copied().find(|s| s.length() == length)
    }

    /// Smallest block size whose payload fits `length` bytes.
    pub fn for_data_length(length: usize) -> Result<Self, BlockError> {
        Self::all()
            .iter()
            .copied()
            .find(|s| s.length() >= length)
            .ok_or(BlockError::DataTooLarge(length))
    }

    pub const fn all() -> [BlockSize; 6] {
        [
            BlockSize::Message,
            BlockSize::Tiny,
            BlockSize::Small,
            BlockSize::Medium,
            BlockSize::Large,
            BlockSize::Huge,
        ]
    }
}

impl fmt::Display for BlockSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.length())
    }
}

/// Shared body of every block variant.
#[derive(Clone, PartialEq, Eq)]
pub struct BlockBody {
    size: BlockSize,
    data: Vec<u8>,
    id: Checksum,
}

impl BlockBody {
    fn new(size: BlockSize, data: Vec<u8>) -> Result<Self, BlockError> {
        if data.len() != size.length() {
            return Err(BlockError::LengthMismatch {
                expected: size.length(),
                got: data.len(),
            });
        }
        let id = Checksum::of(&data);
        Ok(Self { size, data, id })
    }
}

#[derive(Clone, PartialEq, Eq)]
pub enum Block {
    /// Arbitrary opaque bytes.
    Raw(BlockBody),
    /// An ECIES envelope; first byte is the 0x04 key prefix.
    Encrypted(BlockBody),
    /// Noise drawn from the reuse cache.
    Whitened(BlockBody),
    /// Freshly generated noise.
    Random(BlockBody),
    /// Magic-prefixed header block (CBL family).
    Structured(BlockBody),
}

impl Block {
    pub fn raw(size: BlockSize, data: Vec<u8>) -> Result<Self, BlockError> {
        Ok(Block::Raw(BlockBody::new(size, data)?))
    }

    pub fn encrypted(size: BlockSize, data: Vec<u8>) -> Result<Self, BlockError> {
        if data.first() != Some(&PUBLIC_KEY_PREFIX) {
            return Err(BlockError::Format(
                crate::error::BlockFormatError::UnknownBlockFormat,
            ));
        }
        Ok(Block::Encrypted(BlockBody::new(size, data)?))
    }

    pub fn whitened(size: BlockSize, data: Vec<u8>) -> Result<Self, BlockError> {
        Ok(Block::Whitened(BlockBody::new(size, data)?))
    }

    /// A block of fresh OS randomness.
    pub fn random(size: BlockSize) -> Self {
        let mut data = vec![0u8; size.length()];
        OsRng.fill_bytes(&mut data);
        let id = Checksum::of(&data);
        Block::Random(BlockBody { size, data, id })
    }

    pub fn random_from_data(size: BlockSize, data: Vec<u8>) -> Result<Self, BlockError> {
        Ok(Block::Random(BlockBody::new(size, data)?))
    }

    pub fn structured(size: BlockSize, data: Vec<u8>) -> Result<Self, BlockError> {
        if data.first() != Some(&STRUCTURED_BLOCK_MAGIC) {
            return Err(BlockError::Format(
                crate::error::BlockFormatError::UnknownBlockFormat,
            ));
        }
        Ok(Block::Structured(BlockBody::new(size, data)?))
    }

    /// Classify stored bytes by their leading marker.
    pub fn parse(size: BlockSize, data: Vec<u8>) -> Result<Self, BlockError> {
        let info = detect_block_format(&data);
        if info.is_structured && info.is_valid {
            return Self::structured(size, data);
        }
        if info.is_encrypted {
            return Self::encrypted(size, data);
        }
        Self::raw(size, data)
    }

    fn body(&self) -> &BlockBody {
        match self {
            Block::Raw(b)
            | Block::Encrypted(b)
            | Block::Whitened(b)
            | Block::Random(b)
            | Block::Structured(b) => b,
        }
    }

    pub fn id(&self) -> &Checksum {
        &self.body().id
    }

    pub fn size(&self) -> BlockSize {
        self.body().size
    }

    pub fn data(&self) -> &[u8] {
        &self.body().data
    }

    pub fn into_data(self) -> Vec<u8> {
        match self {
            Block::Raw(b)
            | Block::Encrypted(b)
            | Block::Whitened(b)
            | Block::Random(b)
            | Block::Structured(b) => b.data,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Block::Raw(_) => "raw",
            Block::Encrypted(_) => "encrypted",
            Block::Whitened(_) => "whitened",
            Block::Random(_) => "random",
            Block::Structured(_) => "structured",
        }
    }

    /// Structured sub-type, when this is a structured block.
    pub fn structured_type(&self) -> Option<StructuredBlockType> {
        match self {
            Block::Structured(b) => StructuredBlockType::from_byte(*b.data.get(1)?),
            _ => None,
        }
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Block::{}[{} {:?}]", self.kind_name(), self.size(), self.id())
    }
}
