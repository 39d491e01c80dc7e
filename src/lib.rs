//! BrightChain - Owner-Free Filesystem substrate
//!
//! Content-addressed storage in which source files are split into
//! fixed-size blocks, brightened by XOR against random and cached whitener
//! blocks, and reassembled through signed Constituent Block Lists. Members
//! hold secp256k1 identity keys and deterministically derived Paillier
//! voting keys.

pub mod block;
pub mod block_format;
pub mod capacity;
pub mod cbl;
pub mod checksum;
pub mod constants;
pub mod crc;
pub mod ecies;
pub mod error;
pub mod guid;
pub mod member;
pub mod paillier;
pub mod pipeline;
pub mod settings;
pub mod signature;
pub mod store;
pub mod telemetry;
pub mod tuple;
pub mod voting;
pub mod voting_derivation;
pub mod wallet;
pub mod whitener;
pub mod xor;

pub use block::{Block, BlockSize};
pub use block_format::{detect_block_format, BlockFormatInfo, StructuredBlockType};
pub use capacity::{CapacityCalculator, CapacityParams, CapacityResult};
pub use cbl::{calculate_cbl_address_capacity, make_cbl_header, validate_signature, CblHeader};
pub use checksum::{Checksum, ChecksumHasher};
pub use error::BrightChainError;
pub use guid::MemberId;
pub use member::{BrightChainMember, KeyStatus, MemberType};
pub use pipeline::{
    open_cbl, retrieve_stream, retrieve_to_vec, store_stream, StoreRequest, StoreResult,
};
pub use store::{BlockStore, MemoryBlockStore, TupleSink};
pub use tuple::InMemoryBlockTuple;
pub use voting::{IsolatedPrivateKey, IsolatedPublicKey};
pub use voting_derivation::{derive_voting_keys_from_ecdh, VotingKeyPair};
pub use whitener::{RandomSource, WhitenerCache, WhitenerProvider, WhitenerSource};

#[cfg(test)]
mod pipeline_tests;
