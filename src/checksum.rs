/// Content Checksums
///
/// Every block is addressed by the SHA3-512 digest of its bytes. `Checksum`
/// is an immutable 64-byte value; equality is byte equality and the hex
/// rendering is lowercase, 128 characters. A streaming hasher is provided
/// for accumulating address buffers chunk by chunk.
use std::fmt;

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Sha3_512};

use crate::constants::{CHECKSUM_HEX_LENGTH, CHECKSUM_LENGTH};
use crate::error::ChecksumError;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Checksum([u8; CHECKSUM_LENGTH]);

impl Checksum {
    /// Checksum of the given data.
    pub fn of(data: &[u8]) -> Self {
        let mut hasher = Sha3_512::new();
        hasher.update(data);
        let digest = hasher.finalize();
        let mut bytes = [0u8; CHECKSUM_LENGTH];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    /// Wrap an existing 64-byte digest.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ChecksumError> {
        if bytes.len() != CHECKSUM_LENGTH {
            return Err(ChecksumError::InvalidLength {
                expected: CHECKSUM_LENGTH,
                got: bytes.len(),
            });
        }
        let mut out = [0u8; CHECKSUM_LENGTH];
        out.copy_from_slice(bytes);
        Ok(Self(out))
    }

    /// Parse a 128-character hex rendering, case-insensitive.
    pub fn from_hex(s: &str) -> Result<Self, ChecksumError> {
        if s.len() != CHECKSUM_HEX_LENGTH {
            return Err(ChecksumError::InvalidLength {
                expected: CHECKSUM_HEX_LENGTH,
                got: s.len(),
            });
        }
        let bytes = hex::decode(s).map_err(|e| ChecksumError::InvalidHex(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8; CHECKSUM_LENGTH] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    /// Lowercase hex, 128 characters.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Full digests overwhelm log lines; the first 16 chars identify a block
        write!(f, "Checksum({}…)", &self.to_hex()[..16])
    }
}

impl Serialize for Checksum {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Checksum {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Checksum::from_hex(&s).map_err(D::Error::custom)
    }
}

/// Streaming SHA3-512 hasher for data that arrives in chunks.
pub struct ChecksumHasher {
    inner: Sha3_512,
}

impl ChecksumHasher {
    pub fn new() -> Self {
        Self { inner: Sha3_512::new() }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    pub fn finalize(self) -> Checksum {
        let digest = self.inner.finalize();
        let mut bytes = [0u8; CHECKSUM_LENGTH];
        bytes.copy_from_slice(&digest);
        Checksum(bytes)
    }
}

impl Default for ChecksumHasher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_round_trip() {
        let c = Checksum::of(b"hello world");
        let parsed = Checksum::from_hex(&c.to_hex()).unwrap();
        assert_eq!(c, parsed);
        assert_eq!(c.to_hex().len(), 128);
        assert!(c.to_hex().chars().all(|ch| ch.is_ascii_hexdigit() && !ch.is_ascii_uppercase()));
    }

    #[test]
    fn test_bytes_round_trip() {
        let c = Checksum::of(b"some data");
        let parsed = Checksum::from_bytes(c.as_bytes()).unwrap();
        assert_eq!(c, parsed);
    }

    #[test]
    fn test_case_insensitive_parse() {
        let c = Checksum::of(b"abc");
        let upper = c.to_hex().to_uppercase();
        assert_eq!(Checksum::from_hex(&upper).unwrap(), c);
    }

    #[test]
    fn test_all_zero_digest() {
        let hex = "00".repeat(64);
        let c = Checksum::from_hex(&hex).unwrap();
        assert_eq!(c.to_hex(), hex);
    }

    #[test]
    fn test_invalid_length() {
        let err = Checksum::from_hex(&"0".repeat(63)).unwrap_err();
        assert!(matches!(err, ChecksumError::InvalidLength { got: 63, .. }));

        let err = Checksum::from_bytes(&[0u8; 63]).unwrap_err();
        assert!(matches!(err, ChecksumError::InvalidLength { got: 63, .. }));
    }

    #[test]
    fn test_invalid_hex() {
        let bad = "zz".repeat(64);
        assert!(matches!(
            Checksum::from_hex(&bad),
            Err(ChecksumError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_single_byte_change_differs() {
        let a = Checksum::of(b"payload");
        let b = Checksum::of(b"paylo4d");
        assert_ne!(a, b);
    }

    #[test]
    fn test_streaming_matches_one_shot() {
        let data = b"block bytes that arrive in several chunks";
        let mut hasher = ChecksumHasher::new();
        for chunk in data.chunks(7) {
            hasher.update(chunk);
        }
        assert_eq!(hasher.finalize(), Checksum::of(data));
    }

    #[test]
    fn test_serde_hex() {
        let c = Checksum::of(b"serde");
        let json = serde_json::to_string(&c).unwrap();
        assert_eq!(json, format!("\"{}\"", c.to_hex()));
        let back: Checksum = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
    }
}
