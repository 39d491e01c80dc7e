/// Protocol Constants
///
/// These constants pin the wire-level geometry of the block format, the
/// ECIES envelope and the tuple engine. All multi-byte integers in headers
/// are big-endian. Size-related logic should use these constants instead of
/// magic numbers.

/// Magic prefix for every structured (header-carrying) block.
pub const STRUCTURED_BLOCK_MAGIC: u8 = 0xBC;

/// Current structured-header version.
pub const STRUCTURED_HEADER_VERSION: u8 = 0x01;

/// SHA3-512 checksum length in bytes.
pub const CHECKSUM_LENGTH: usize = 64;

/// Hex-encoded checksum length (lowercase, no prefix).
pub const CHECKSUM_HEX_LENGTH: usize = 128;

/// Member id (GUID v4) length in bytes.
pub const MEMBER_ID_LENGTH: usize = 16;

// ========== ECIES envelope geometry ==========

/// Uncompressed secp256k1 public key: 0x04 || x(32) || y(32).
pub const PUBLIC_KEY_LENGTH: usize = 65;

/// Public key without the 0x04 prefix.
pub const RAW_PUBLIC_KEY_LENGTH: usize = 64;

/// Marker byte of an uncompressed public key, and therefore the first byte
/// of every ECIES envelope.
pub const PUBLIC_KEY_PREFIX: u8 = 0x04;

/// AES-256-GCM initialisation vector length.
pub const IV_LENGTH: usize = 16;

/// AES-256-GCM authentication tag length.
pub const AUTH_TAG_LENGTH: usize = 16;

/// Symmetric (AES-256) key length.
pub const SYMMETRIC_KEY_LENGTH: usize = 32;

/// Fixed per-envelope overhead of a single-recipient encryption:
/// ephemeral public key + IV + auth tag.
pub const ECIES_OVERHEAD_LENGTH: usize = PUBLIC_KEY_LENGTH + IV_LENGTH + AUTH_TAG_LENGTH;

/// Size of one wrapped data-encryption key in a multi-recipient envelope:
/// a complete single-recipient envelope around the 32-byte DEK.
pub const ENCRYPTED_DEK_LENGTH: usize = ECIES_OVERHEAD_LENGTH + SYMMETRIC_KEY_LENGTH;

/// Recipient-count field width in a multi-recipient envelope.
pub const RECIPIENT_COUNT_LENGTH: usize = 2;

/// Upper bound on multi-recipient fan-out (count field is u16).
pub const MAX_RECIPIENTS: usize = u16::MAX as usize;

/// Fixed head of a multi-recipient envelope before the recipient tables.
pub const MULTI_HEADER_LENGTH: usize =
    PUBLIC_KEY_LENGTH + IV_LENGTH + AUTH_TAG_LENGTH + RECIPIENT_COUNT_LENGTH;

/// Total multi-recipient overhead for `n` recipients.
#[inline]
pub const fn multi_recipient_overhead(recipients: usize) -> usize {
    MULTI_HEADER_LENGTH + recipients * (MEMBER_ID_LENGTH + ENCRYPTED_DEK_LENGTH)
}

// ========== Signatures ==========

/// Full signature: r(32) || s(32) || recovery(1).
pub const SIGNATURE_LENGTH: usize = 65;

/// Compact signature as stored in CBL headers: r(32) || s(32).
pub const COMPACT_SIGNATURE_LENGTH: usize = 64;

/// Preamble of an Ethereum-interoperable personal message hash.
pub const PERSONAL_MESSAGE_PREFIX: &str = "\x19Ethereum Signed Message:\n";

// ========== Tuples and whitening ==========

/// Smallest permitted tuple.
pub const TUPLE_MIN_SIZE: usize = 2;

/// Largest permitted tuple.
pub const TUPLE_MAX_SIZE: usize = 10;

/// Default tuple size: one brightened source block plus two companions.
pub const TUPLE_DEFAULT_SIZE: usize = 3;

/// Freshly generated random blocks per tuple; the remaining companions are
/// drawn from the whitener cache.
pub const RANDOM_BLOCKS_PER_TUPLE: usize = 1;

/// Target probability that a whitener draw is served from the reuse cache
/// rather than freshly generated.
pub const OFFS_CACHE_PERCENTAGE: f64 = 0.7;

// ========== Voting keys ==========

/// Paillier modulus size for member voting keys.
pub const VOTING_KEY_BITS: u64 = 3072;

/// Candidate limit for deterministic prime generation.
pub const PRIME_GENERATION_MAX_ATTEMPTS: usize = 20_000;

/// Miller-Rabin witnesses drawn from the derivation DRBG.
pub const MILLER_RABIN_WITNESSES: usize = 256;

/// HKDF info string binding the derived seed to prime generation.
pub const PRIME_GENERATION_INFO: &[u8] = b"PaillierPrimeGen";

/// The modulus is left-padded to this many bytes before hashing into the
/// key id, so key ids are stable across leading-zero differences.
pub const VOTING_KEY_ID_PAD_LENGTH: usize = 384;

/// Magic prefix of a serialized voting public key.
pub const VOTING_KEY_MAGIC: &[u8; 4] = b"BCVK";

/// Serialized voting public key version.
pub const VOTING_KEY_VERSION: u8 = 0x01;

/// HMAC-SHA256 isolation tag length appended to voting ciphertexts.
pub const VOTING_TAG_LENGTH: usize = 32;

// ========== CBL header offsets ==========
// Fixed base layout; the extended region (when flagged) sits between the
// base fields and the trailing 64-byte signature.

/// Offset of the magic byte.
pub const CBL_OFF_MAGIC: usize = 0;
/// Offset of the structured block type byte.
pub const CBL_OFF_TYPE: usize = 1;
/// Offset of the header version byte.
pub const CBL_OFF_VERSION: usize = 2;
/// Offset of the CRC8 byte.
pub const CBL_OFF_CRC8: usize = 3;
/// Offset of the 16-byte creator id.
pub const CBL_OFF_CREATOR: usize = 4;
/// Offset of the 8-byte creation timestamp (ms since epoch, BE).
pub const CBL_OFF_DATE: usize = 20;
/// Offset of the 4-byte address count.
pub const CBL_OFF_ADDRESS_COUNT: usize = 28;
/// Offset of the tuple size byte.
pub const CBL_OFF_TUPLE_SIZE: usize = 32;
/// Offset of the 8-byte original data length.
pub const CBL_OFF_ORIGINAL_LENGTH: usize = 33;
/// Offset of the 64-byte original data checksum.
pub const CBL_OFF_ORIGINAL_CHECKSUM: usize = 41;
/// Offset of the is-extended flag byte.
pub const CBL_OFF_EXTENDED_FLAG: usize = 105;
/// End of the fixed base fields / start of the extended region.
pub const CBL_BASE_FIELDS_END: usize = 106;

/// Header length of a non-extended CBL (base fields + signature).
pub const CBL_BASE_HEADER_LENGTH: usize = CBL_BASE_FIELDS_END + COMPACT_SIGNATURE_LENGTH;

/// File-name length prefix width in an extended header.
pub const CBL_FILE_NAME_LENGTH_PREFIX: usize = 2;

/// Mime-type length prefix width in an extended header.
pub const CBL_MIME_TYPE_LENGTH_PREFIX: usize = 1;

/// Longest permitted file name in an extended header, in bytes.
pub const CBL_MAX_FILE_NAME_LENGTH: usize = 255;

/// Longest permitted mime type in an extended header, in bytes.
pub const CBL_MAX_MIME_TYPE_LENGTH: usize = 127;

/// Header bytes an extended region adds for the given field lengths.
#[inline]
pub const fn cbl_extension_overhead(file_name_len: usize, mime_type_len: usize) -> usize {
    CBL_FILE_NAME_LENGTH_PREFIX + file_name_len + CBL_MIME_TYPE_LENGTH_PREFIX + mime_type_len
}
