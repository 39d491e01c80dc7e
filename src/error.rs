/// Error Types
///
/// Tagged error enums grouped by subsystem. Invariant breaks inside the core
/// are fatal to the current operation and surface unchanged; the streaming
/// pipeline reports them as a single terminal event rather than panicking
/// across the stream boundary. Optional host services (audit log, rate
/// limiter) are advisory and never feed into these types.
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChecksumError {
    #[error("invalid checksum length: expected {expected} bytes, got {got}")]
    InvalidLength { expected: usize, got: usize },
    #[error("invalid checksum hex: {0}")]
    InvalidHex(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum XorError {
    #[error("xor length mismatch: {left} vs {right}")]
    LengthMismatch { left: usize, right: usize },
    #[error("no buffers to xor")]
    NoBuffers,
    #[error("padded data shorter than its length prefix")]
    InvalidPadding,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EciesError {
    #[error("invalid mnemonic")]
    InvalidMnemonic,
    #[error("invalid ephemeral public key")]
    InvalidEphemeralPublicKey,
    #[error("invalid sender public key")]
    InvalidSenderPublicKey,
    #[error("invalid recipient public key")]
    InvalidRecipientPublicKey,
    #[error("invalid private key")]
    InvalidPrivateKey,
    #[error("encrypted data length is invalid: {0}")]
    InvalidEncryptedDataLength(usize),
    #[error("envelope header too short: {got} bytes, need {need}")]
    InvalidHeaderLength { got: usize, need: usize },
    #[error("decryption failed")]
    DecryptionFailed,
    #[error("recipient not found in envelope")]
    RecipientNotFound,
    #[error("too many recipients: {got} (max {max})")]
    TooManyRecipients { got: usize, max: usize },
    #[error("invalid signature")]
    InvalidSignature,
    #[error("message too large for a single stride: {got} > {max}")]
    MessageTooLarge { got: usize, max: usize },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("invalid signature length: expected {expected}, got {got}")]
    InvalidLength { expected: usize, got: usize },
    #[error("invalid recovery id: {0}")]
    InvalidRecoveryId(u8),
    #[error("signature verification failed")]
    VerificationFailed,
    #[error("malformed signature")]
    Malformed,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VotingError {
    #[error("private key must be a 32-byte buffer")]
    PrivateKeyMustBeBuffer,
    #[error("public key must be a 64- or 65-byte buffer")]
    PublicKeyMustBeBuffer,
    #[error("invalid public key format")]
    InvalidPublicKeyFormat,
    #[error("invalid ECDH key pair")]
    InvalidEcdhKeyPair,
    #[error("failed to generate prime after {0} attempts")]
    FailedToGeneratePrime(usize),
    #[error("generated primes are identical")]
    IdenticalPrimes,
    #[error("key pair too small: {actual} bits, required {required}")]
    KeyPairTooSmall { actual: u64, required: u64 },
    #[error("key pair validation failed")]
    KeyPairValidationFailed,
    #[error("modular inverse does not exist")]
    ModularInverseDoesNotExist,
    #[error("serialized public key id does not match its modulus")]
    InvalidPublicKeyIdMismatch,
    #[error("ciphertext does not carry this key instance's isolation tag")]
    KeyIsolationViolation,
    #[error("invalid key format")]
    InvalidKeyFormat,
    #[error("serialized voting key is truncated")]
    BufferTooShort,
    #[error("unsupported voting key version: {0}")]
    UnsupportedVersion(u8),
    #[error("message out of range for this key")]
    MessageOutOfRange,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BlockFormatError {
    #[error("data too short to classify")]
    DataTooShort,
    #[error("unknown block format")]
    UnknownBlockFormat,
    #[error("invalid structured block type: 0x{0:02x}")]
    InvalidStructuredBlockType(u8),
    #[error("header CRC8 mismatch: expected 0x{expected:02x}, got 0x{got:02x}")]
    Crc8Mismatch { expected: u8, got: u8 },
    #[error("unsupported header version: 0x{0:02x}")]
    UnsupportedVersion(u8),
    #[error("data appears to be ECIES-encrypted")]
    DataAppearsEncrypted,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CapacityError {
    #[error("invalid block size: {0}")]
    InvalidBlockSize(usize),
    #[error("invalid block type for capacity calculation")]
    InvalidBlockType,
    #[error("overhead {overhead} exceeds block size {block_size}")]
    CapacityExceeded { overhead: usize, block_size: usize },
    #[error("invalid recipient count: {0}")]
    InvalidRecipientCount(usize),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CblError {
    #[error("file name must not be empty")]
    FileNameEmpty,
    #[error("file name too long: {0} bytes")]
    FileNameTooLong(usize),
    #[error("file name contains control characters")]
    FileNameControlChars,
    #[error("file name contains a path traversal component")]
    FileNamePathTraversal,
    #[error("file name contains invalid characters")]
    FileNameInvalidChars,
    #[error("mime type format is invalid")]
    MimeTypeInvalidFormat,
    #[error("mime type too long: {0} bytes")]
    MimeTypeTooLong(usize),
    #[error("address count {count} exceeds capacity {capacity}")]
    AddressCountExceedsCapacity { count: usize, capacity: usize },
    #[error("invalid address count: {0}")]
    InvalidAddressCount(u32),
    #[error("address data length {got} does not match count ({expected} bytes expected)")]
    AddressDataLengthMismatch { expected: usize, got: usize },
    #[error("invalid tuple size: {0}")]
    InvalidTupleSize(usize),
    #[error("creation date lies in the future")]
    DateInFuture,
    #[error("a creator with a private key is required to sign")]
    CreatorRequiredForSignature,
    #[error("CBL signature is invalid")]
    InvalidSignature,
    #[error("not an extended CBL header")]
    NotExtendedCbl,
    #[error("header is truncated")]
    HeaderTruncated,
    #[error(transparent)]
    Format(#[from] BlockFormatError),
    #[error(transparent)]
    Capacity(#[from] CapacityError),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TupleError {
    #[error("invalid tuple size: {0}")]
    InvalidTupleSize(usize),
    #[error("tuple members differ in block size")]
    BlockSizeMismatch,
    #[error("no blocks to xor")]
    NoBlocksToXor,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BlockError {
    #[error("invalid block size: {0}")]
    InvalidBlockSize(usize),
    #[error("block data length {got} does not match block size {expected}")]
    LengthMismatch { expected: usize, got: usize },
    #[error("data too large for any block size: {0}")]
    DataTooLarge(usize),
    #[error(transparent)]
    Format(#[from] BlockFormatError),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MemberError {
    #[error("member name is required")]
    MissingMemberName,
    #[error("member name has leading or trailing whitespace")]
    InvalidMemberNameWhitespace,
    #[error("invalid email address")]
    InvalidEmail,
    #[error("private key is not loaded")]
    MissingPrivateKey,
    #[error("no wallet is loaded")]
    NoWallet,
    #[error("invalid mnemonic")]
    InvalidMnemonic,
    #[error("malformed member json: {0}")]
    InvalidJson(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("block not found")]
    NotFound,
    #[error("stored bytes do not hash to the requested id")]
    ChecksumMismatch,
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Umbrella error carried across the streaming boundary as the pipeline's
/// single terminal event.
#[derive(Debug, Error)]
pub enum BrightChainError {
    #[error(transparent)]
    Checksum(#[from] ChecksumError),
    #[error(transparent)]
    Xor(#[from] XorError),
    #[error(transparent)]
    Ecies(#[from] EciesError),
    #[error(transparent)]
    Signature(#[from] SignatureError),
    #[error(transparent)]
    Voting(#[from] VotingError),
    #[error(transparent)]
    Format(#[from] BlockFormatError),
    #[error(transparent)]
    Capacity(#[from] CapacityError),
    #[error(transparent)]
    Cbl(#[from] CblError),
    #[error(transparent)]
    Tuple(#[from] TupleError),
    #[error(transparent)]
    Block(#[from] BlockError),
    #[error(transparent)]
    Member(#[from] MemberError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("operation timed out")]
    OperationTimeout,
    #[error("reconstructed data does not match the manifest checksum")]
    ReconstructionMismatch,
    #[error("source stream error: {0}")]
    SourceStream(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BlockFormatError::Crc8Mismatch { expected: 0xab, got: 0x12 };
        assert_eq!(
            err.to_string(),
            "header CRC8 mismatch: expected 0xab, got 0x12"
        );

        let err = VotingError::KeyPairTooSmall { actual: 3070, required: 3072 };
        assert!(err.to_string().contains("3070"));
        assert!(err.to_string().contains("3072"));
    }

    #[test]
    fn test_umbrella_conversion() {
        fn fails() -> Result<(), BrightChainError> {
            Err(ChecksumError::InvalidLength { expected: 64, got: 63 })?;
            Ok(())
        }
        match fails() {
            Err(BrightChainError::Checksum(ChecksumError::InvalidLength { got: 63, .. })) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }
}
