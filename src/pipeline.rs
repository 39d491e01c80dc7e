/// Streaming Store Pipeline
///
/// Drives the OFF data flow end to end without ever materialising the file:
///
/// ```text
/// store:    source bytes → ECIES envelopes (one per block-size stride)
///           → brighten each envelope against fresh randoms + cached
///             whiteners → persist the tuple atomically → append ids to the
///             address list → sign, pad and encrypt the CBL
/// retrieve: decrypt CBL → verify signature → per tuple stride, load and
///           XOR the members back into the envelope → streaming ECIES
///           decrypt → truncate to the original length
/// ```
///
/// The pipeline is single-producer/single-consumer; at most one tuple's
/// blocks are in flight per stage. Suspension points are the source read,
/// tuple persistence and block-store gets; everything else is synchronous.
/// A deadline, when given, is honoured between those points so a tuple is
/// never left partially persisted.
use std::time::Duration;

use rand::rngs::OsRng;
use rand::RngCore;
use secp256k1::{PublicKey, SecretKey};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::block::{Block, BlockSize};
use crate::block_format::StructuredBlockType;
use crate::cbl::{self, CblExtension, CblHeader, CblHeaderParams};
use crate::checksum::{Checksum, ChecksumHasher};
use crate::constants::{
    CHECKSUM_LENGTH, ECIES_OVERHEAD_LENGTH, RANDOM_BLOCKS_PER_TUPLE, TUPLE_MAX_SIZE,
    TUPLE_MIN_SIZE,
};
use crate::ecies::{EciesStreamDecrypter, EciesStreamEncrypter};
use crate::error::{BrightChainError, CblError, EciesError, TupleError};
use crate::guid::MemberId;
use crate::store::{BlockStore, TupleSink};
use crate::telemetry::{short_id, SampledCounter};
use crate::tuple::InMemoryBlockTuple;
use crate::whitener::{RandomSource, WhitenerSource};
use crate::xor;

/// Read granularity of the source stream.
const READ_CHUNK: usize = 64 * 1024;

/// Per-tuple progress events are sampled at this interval.
const PROGRESS_LOG_INTERVAL: u64 = 1024;

/// Everything the store flow produces besides the persisted tuples.
#[derive(Debug)]
pub struct StoreResult {
    /// The finished CBL: a full-block ECIES envelope addressed to the
    /// creator.
    pub cbl_block: Block,
    pub address_count: u32,
    pub tuple_count: usize,
    pub addresses_checksum: Checksum,
    pub original_checksum: Checksum,
    pub original_length: u64,
}

/// Store-flow parameters.
pub struct StoreRequest<'a> {
    pub creator_id: MemberId,
    pub signing_key: &'a SecretKey,
    pub creator_public: &'a PublicKey,
    pub block_size: BlockSize,
    pub tuple_size: usize,
    /// File name / mime type metadata; its presence upgrades the manifest
    /// to an extended CBL.
    pub extension: Option<CblExtension>,
    pub deadline: Option<Duration>,
}

struct DeadlineGuard {
    expires_at: Option<Instant>,
}

impl DeadlineGuard {
    fn new(deadline: Option<Duration>) -> Self {
        Self { expires_at: deadline.map(|d| Instant::now() + d) }
    }

    fn check(&self) -> Result<(), BrightChainError> {
        match self.expires_at {
            Some(at) if Instant::now() >= at => Err(BrightChainError::OperationTimeout),
            _ => Ok(()),
        }
    }
}

/// Split a source stream into whitened tuples and a signed, encrypted CBL.
///
/// `declared_length` must match the number of bytes the source yields; the
/// mismatch is surfaced as an I/O error before any CBL is produced.
pub async fn store_stream<S>(
    request: StoreRequest<'_>,
    mut source: S,
    declared_length: u64,
    whiteners: &dyn WhitenerSource,
    randoms: &dyn RandomSource,
    sink: &dyn TupleSink,
) -> Result<StoreResult, BrightChainError>
where
    S: AsyncRead + Unpin,
{
    let tuple_size = request.tuple_size;
    if !(TUPLE_MIN_SIZE..=TUPLE_MAX_SIZE).contains(&tuple_size) {
        return Err(TupleError::InvalidTupleSize(tuple_size).into());
    }
    let deadline = DeadlineGuard::new(request.deadline);
    let block_size = request.block_size;
    let block_len = block_size.length();

    let mut encrypter = EciesStreamEncrypter::new(*request.creator_public, block_len)?;
    let mut source_hasher = ChecksumHasher::new();
    let mut consumed: u64 = 0;
    let mut address_buffer: Vec<u8> = Vec::new();
    let mut tuple_count = 0usize;
    let progress = SampledCounter::new(PROGRESS_LOG_INTERVAL);

    let mut read_buffer = vec![0u8; READ_CHUNK];
    loop {
        deadline.check()?;
        let read = source.read(&mut read_buffer).await?;
        if read == 0 {
            break;
        }
        let chunk = &read_buffer[..read];
        source_hasher.update(chunk);
        consumed += read as u64;

        for envelope in encrypter.update(chunk)? {
            deadline.check()?;
            process_tuple(
                envelope,
                block_size,
                tuple_size,
                whiteners,
                randoms,
                sink,
                &mut address_buffer,
            )
            .await?;
            tuple_count += 1;
            if let Some(done) = progress.tick() {
                info!(tuples = done, consumed, "store progress");
            }
        }
    }

    if consumed != declared_length {
        return Err(BrightChainError::SourceStream(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("source yielded {} bytes, declared {}", consumed, declared_length),
        )));
    }

    // pad the final stride (or an empty source) with random bytes so every
    // tuple member is exactly one block long; retrieval truncates to the
    // original length
    let pending = encrypter.pending_len();
    if pending > 0 || tuple_count == 0 {
        let mut padding = vec![0u8; encrypter.capacity() - pending];
        OsRng.fill_bytes(&mut padding);
        let mut envelopes = encrypter.update(&padding)?;
        let envelope = match (envelopes.pop(), encrypter.finalize()?) {
            (Some(envelope), None) => envelope,
            _ => return Err(EciesError::InvalidEncryptedDataLength(pending).into()),
        };
        deadline.check()?;
        process_tuple(
            envelope,
            block_size,
            tuple_size,
            whiteners,
            randoms,
            sink,
            &mut address_buffer,
        )
        .await?;
        tuple_count += 1;
        if let Some(done) = progress.tick() {
            info!(tuples = done, consumed, "store progress");
        }
    }

    let address_count = (address_buffer.len() / CHECKSUM_LENGTH) as u32;
    let addresses_checksum = Checksum::of(&address_buffer);
    let original_checksum = source_hasher.finalize();

    // the encrypted CBL must itself fit one block
    let capacity = cbl::calculate_cbl_address_capacity(
        block_size,
        true,
        request.extension.as_ref().map(|e| e.file_name.as_str()),
        request.extension.as_ref().map(|e| e.mime_type.as_str()),
        tuple_size,
    )?;
    if address_count as usize > capacity {
        return Err(CblError::AddressCountExceedsCapacity {
            count: address_count as usize,
            capacity,
        }
        .into());
    }

    let block_type = if request.extension.is_some() {
        StructuredBlockType::ExtendedCbl
    } else {
        StructuredBlockType::Cbl
    };
    let params = CblHeaderParams {
        block_type,
        block_size,
        creator_id: request.creator_id,
        date_created_ms: cbl::now_ms(),
        address_count,
        tuple_size: tuple_size as u8,
        original_data_length: consumed,
        original_checksum,
        extension: request.extension.clone(),
    };
    let assembled = cbl::make_cbl_header(request.signing_key, &params, &address_buffer)?;

    let mut body = assembled.header;
    body.extend_from_slice(&address_buffer);
    let body_capacity = block_len - ECIES_OVERHEAD_LENGTH;
    let mut padding = vec![0u8; body_capacity - body.len()];
    OsRng.fill_bytes(&mut padding);
    body.extend_from_slice(&padding);

    let envelope = crate::ecies::encrypt_single(request.creator_public, &body)?;
    let cbl_block = Block::encrypted(block_size, envelope)?;

    info!(
        tuples = tuple_count,
        addresses = address_count,
        original_length = consumed,
        cbl = %short_id(cbl_block.id()),
        "store pipeline complete"
    );
    Ok(StoreResult {
        cbl_block,
        address_count,
        tuple_count,
        addresses_checksum,
        original_checksum,
        original_length: consumed,
    })
}

/// Brighten one encrypted block, persist its tuple, append the ids.
async fn process_tuple(
    envelope: Vec<u8>,
    block_size: BlockSize,
    tuple_size: usize,
    whiteners: &dyn WhitenerSource,
    randoms: &dyn RandomSource,
    sink: &dyn TupleSink,
    address_buffer: &mut Vec<u8>,
) -> Result<(), BrightChainError> {
    let companion_count = tuple_size - 1;
    let random_count = RANDOM_BLOCKS_PER_TUPLE.min(companion_count);

    let mut companions: Vec<Block> = Vec::with_capacity(companion_count);
    for _ in 0..random_count {
        companions.push(randoms.next_random(block_size).await);
    }
    for _ in random_count..companion_count {
        // cache miss degrades to a fresh random so the tuple arity is fixed
        let mut block = match whiteners.next_whitener(block_size).await {
            Some(block) => block,
            None => randoms.next_random(block_size).await,
        };
        // a duplicate companion would cancel out of the XOR and leave the
        // source block stored in the clear
        if companions.iter().any(|c| c.id() == block.id()) {
            block = randoms.next_random(block_size).await;
        }
        companions.push(block);
    }

    let mut brightened = envelope;
    for companion in &companions {
        xor::xor_into(&mut brightened, companion.data())?;
    }
    let primary = Block::raw(block_size, brightened)?;

    let mut members = Vec::with_capacity(tuple_size);
    members.push(primary);
    members.extend(companions);
    let tuple = InMemoryBlockTuple::new(members)?;

    sink.persist_tuple(&tuple).await?;
    address_buffer.extend_from_slice(&tuple.block_ids_buffer());
    debug!(tuple_size, block = %short_id(tuple.blocks()[0].id()), "tuple persisted");
    Ok(())
}

/// Decrypt a CBL block and verify its signature, yielding the parsed
/// header and the plaintext body (header, address data, padding).
pub fn open_cbl(
    secret_key: &SecretKey,
    creator_public: &PublicKey,
    cbl_block: &Block,
) -> Result<(CblHeader, Vec<u8>), BrightChainError> {
    let body = crate::ecies::decrypt_single(secret_key, cbl_block.data())?;
    let header = CblHeader::parse(&body)?;
    if !cbl::validate_signature(&body, creator_public)? {
        return Err(CblError::InvalidSignature.into());
    }
    Ok((header, body))
}

/// Open a CBL block, verify its signature, and stream the reconstructed
/// file into `dest`. The output is checked against the manifest's original
/// checksum before the call succeeds.
pub async fn retrieve_stream<W>(
    secret_key: &SecretKey,
    creator_public: &PublicKey,
    cbl_block: &Block,
    store: &dyn BlockStore,
    dest: &mut W,
    deadline: Option<Duration>,
) -> Result<u64, BrightChainError>
where
    W: AsyncWrite + Unpin,
{
    let deadline = DeadlineGuard::new(deadline);
    let block_size = cbl_block.size();
    let block_len = block_size.length();

    let (header, body) = open_cbl(secret_key, creator_public, cbl_block)?;
    let addresses = header.addresses(&body)?;
    let tuple_size = header.tuple_size() as usize;
    if tuple_size == 0 || addresses.len() % tuple_size != 0 {
        return Err(CblError::InvalidAddressCount(header.address_count()).into());
    }

    let original_length = header.original_data_length();
    let mut decrypter = EciesStreamDecrypter::new(*secret_key, block_len)?;
    let mut output_hasher = ChecksumHasher::new();
    let mut written: u64 = 0;
    let progress = SampledCounter::new(PROGRESS_LOG_INTERVAL);

    for stride in addresses.chunks(tuple_size) {
        deadline.check()?;
        let mut recovered = vec![0u8; block_len];
        for id in stride {
            let block = store.get(id).await.map_err(BrightChainError::Store)?;
            xor::xor_into(&mut recovered, block.data())?;
        }
        for plain in decrypter.update(&recovered)? {
            written =
                write_truncated(dest, &mut output_hasher, &plain, written, original_length)
                    .await?;
        }
        if let Some(done) = progress.tick() {
            info!(tuples = done, written, "retrieve progress");
        }
    }
    if let Some(plain) = decrypter.finalize()? {
        written =
            write_truncated(dest, &mut output_hasher, &plain, written, original_length).await?;
    }
    dest.flush().await?;

    if written < original_length {
        return Err(BrightChainError::SourceStream(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("reconstructed {} of {} bytes", written, original_length),
        )));
    }
    if output_hasher.finalize() != *header.original_checksum() {
        return Err(BrightChainError::ReconstructionMismatch);
    }
    info!(original_length, tuples = addresses.len() / tuple_size, "retrieve pipeline complete");
    Ok(original_length)
}

async fn write_truncated<W: AsyncWrite + Unpin>(
    dest: &mut W,
    hasher: &mut ChecksumHasher,
    plain: &[u8],
    written: u64,
    original_length: u64,
) -> Result<u64, BrightChainError> {
    if written >= original_length {
        return Ok(written);
    }
    let remaining = (original_length - written) as usize;
    let take = remaining.min(plain.len());
    hasher.update(&plain[..take]);
    dest.write_all(&plain[..take]).await?;
    Ok(written + take as u64)
}

/// Convenience wrapper collecting the reconstructed file into memory.
pub async fn retrieve_to_vec(
    secret_key: &SecretKey,
    creator_public: &PublicKey,
    cbl_block: &Block,
    store: &dyn BlockStore,
    deadline: Option<Duration>,
) -> Result<Vec<u8>, BrightChainError> {
    let mut out = Vec::new();
    retrieve_stream(secret_key, creator_public, cbl_block, store, &mut out, deadline).await?;
    Ok(out)
}
