/// Isolated Paillier Voting Keys
///
/// Voting keys wrap the Paillier keypair with a key-isolation envelope.
/// Every ciphertext is suffixed with an HMAC-SHA256 tag computed under
/// `key_id || instance_id`, binding it to one key *instance*: a ciphertext
/// produced by instance A can be neither tallied through nor decrypted by
/// instance B, even when both share the same modulus. Recovering a public
/// key from its serialized form deliberately issues a fresh instance id,
/// which revokes the tally/decrypt rights of previously issued ciphertexts.
///
/// Serialized public key layout:
///
/// ```text
/// [ magic "BCVK" (4) ]
/// [ version (1) ]
/// [ key id (32) ]
/// [ instance id (32) ]
/// [ modulus length (4, BE) ]
/// [ modulus n ]
/// ```
use byteorder::{BigEndian, ByteOrder};
use hmac::{Hmac, Mac};
use num_bigint::BigUint;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use sha3::{Digest, Sha3_256};

use crate::constants::{
    VOTING_KEY_ID_PAD_LENGTH, VOTING_KEY_MAGIC, VOTING_KEY_VERSION, VOTING_TAG_LENGTH,
};
use crate::error::VotingError;
use crate::paillier::{PaillierPrivateKey, PaillierPublicKey};

type HmacSha256 = Hmac<Sha256>;

/// Hex digits occupied by the isolation tag at the tail of a tagged
/// ciphertext.
const TAG_HEX_LENGTH: usize = VOTING_TAG_LENGTH * 2;

fn sha3_256(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha3_256::new();
    for part in parts {
        hasher.update(part);
    }
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Key id: SHA3-256 over the modulus left-padded to 384 bytes, so ids are
/// stable regardless of leading-zero rendering.
pub fn voting_key_id(n: &BigUint) -> [u8; 32] {
    let raw = n.to_bytes_be();
    let mut padded = vec![0u8; VOTING_KEY_ID_PAD_LENGTH.saturating_sub(raw.len())];
    padded.extend_from_slice(&raw);
    sha3_256(&[&padded])
}

fn fresh_instance_id(key_id: &[u8; 32], n: &BigUint) -> [u8; 32] {
    let mut salt = [0u8; 32];
    OsRng.fill_bytes(&mut salt);
    sha3_256(&[key_id, &n.to_bytes_be(), &salt])
}

fn isolation_tag(
    key_id: &[u8; 32],
    instance_id: &[u8; 32],
    ciphertext_hex: &str,
) -> Result<[u8; VOTING_TAG_LENGTH], VotingError> {
    let mut mac_key = Vec::with_capacity(64);
    mac_key.extend_from_slice(key_id);
    mac_key.extend_from_slice(instance_id);
    let mut mac =
        HmacSha256::new_from_slice(&mac_key).map_err(|_| VotingError::InvalidKeyFormat)?;
    mac.update(ciphertext_hex.as_bytes());
    let mut out = [0u8; VOTING_TAG_LENGTH];
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

fn verify_isolation_tag(
    key_id: &[u8; 32],
    instance_id: &[u8; 32],
    ciphertext_hex: &str,
    tag: &[u8],
) -> Result<bool, VotingError> {
    let mut mac_key = Vec::with_capacity(64);
    mac_key.extend_from_slice(key_id);
    mac_key.extend_from_slice(instance_id);
    let mut mac =
        HmacSha256::new_from_slice(&mac_key).map_err(|_| VotingError::InvalidKeyFormat)?;
    mac.update(ciphertext_hex.as_bytes());
    Ok(mac.verify_slice(tag).is_ok())
}

/// Split a tagged ciphertext into the inner ciphertext and its tag.
fn split_tagged(tagged: &BigUint) -> Result<(BigUint, Vec<u8>, String), VotingError> {
    let hex = tagged.to_str_radix(16);
    if hex.len() <= TAG_HEX_LENGTH {
        return Err(VotingError::InvalidKeyFormat);
    }
    let (inner_hex, tag_hex) = hex.split_at(hex.len() - TAG_HEX_LENGTH);
    let inner = BigUint::parse_bytes(inner_hex.as_bytes(), 16)
        .ok_or(VotingError::InvalidKeyFormat)?;
    let tag = hex::decode(tag_hex).map_err(|_| VotingError::InvalidKeyFormat)?;
    Ok((inner, tag, inner_hex.to_string()))
}

fn join_tagged(inner: &BigUint, tag: &[u8; VOTING_TAG_LENGTH]) -> Result<BigUint, VotingError> {
    let joined = format!("{}{}", inner.to_str_radix(16), hex::encode(tag));
    BigUint::parse_bytes(joined.as_bytes(), 16).ok_or(VotingError::InvalidKeyFormat)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IsolatedPublicKey {
    key: PaillierPublicKey,
    key_id: [u8; 32],
    instance_id: [u8; 32],
}

impl IsolatedPublicKey {
    /// Wrap a Paillier public key, minting a fresh instance id.
    pub fn new(key: PaillierPublicKey) -> Self {
        let key_id = voting_key_id(key.modulus());
        let instance_id = fresh_instance_id(&key_id, key.modulus());
        Self { key, key_id, instance_id }
    }

    pub fn key_id(&self) -> &[u8; 32] {
        &self.key_id
    }

    pub fn instance_id(&self) -> &[u8; 32] {
        &self.instance_id
    }

    pub fn modulus(&self) -> &BigUint {
        self.key.modulus()
    }

    pub fn paillier(&self) -> &PaillierPublicKey {
        &self.key
    }

    /// Encrypt and tag under this instance.
    pub fn encrypt(&self, m: &BigUint) -> Result<BigUint, VotingError> {
        let inner = self.key.encrypt(m)?;
        let tag = isolation_tag(&self.key_id, &self.instance_id, &inner.to_str_radix(16))?;
        join_tagged(&inner, &tag)
    }

    /// Homomorphic tally step: both operands must carry this instance's tag.
    pub fn add(&self, a: &BigUint, b: &BigUint) -> Result<BigUint, VotingError> {
        let (inner_a, tag_a, hex_a) = split_tagged(a)?;
        let (inner_b, tag_b, hex_b) = split_tagged(b)?;
        if !verify_isolation_tag(&self.key_id, &self.instance_id, &hex_a, &tag_a)?
            || !verify_isolation_tag(&self.key_id, &self.instance_id, &hex_b, &tag_b)?
        {
            return Err(VotingError::KeyIsolationViolation);
        }
        let sum = self.key.add(&inner_a, &inner_b);
        let tag = isolation_tag(&self.key_id, &self.instance_id, &sum.to_str_radix(16))?;
        join_tagged(&sum, &tag)
    }

    /// Homomorphic scalar multiplication under this instance.
    pub fn multiply(&self, c: &BigUint, k: &BigUint) -> Result<BigUint, VotingError> {
        let (inner, tag, hex) = split_tagged(c)?;
        if !verify_isolation_tag(&self.key_id, &self.instance_id, &hex, &tag)? {
            return Err(VotingError::KeyIsolationViolation);
        }
        let scaled = self.key.multiply(&inner, k);
        let new_tag = isolation_tag(&self.key_id, &self.instance_id, &scaled.to_str_radix(16))?;
        join_tagged(&scaled, &new_tag)
    }

    /// Re-randomise the instance id. Ciphertexts tagged under the previous
    /// instance can no longer be added or decrypted through this key.
    pub fn update_instance_id(&mut self) {
        self.instance_id = fresh_instance_id(&self.key_id, self.key.modulus());
    }

    /// Serialize to the BCVK buffer.
    pub fn to_buffer(&self) -> Vec<u8> {
        let n_bytes = self.key.modulus().to_bytes_be();
        let mut out = Vec::with_capacity(4 + 1 + 32 + 32 + 4 + n_bytes.len());
        out.extend_from_slice(VOTING_KEY_MAGIC);
        out.push(VOTING_KEY_VERSION);
        out.extend_from_slice(&self.key_id);
        out.extend_from_slice(&self.instance_id);
        let mut len = [0u8; 4];
        BigEndian::write_u32(&mut len, n_bytes.len() as u32);
        out.extend_from_slice(&len);
        out.extend_from_slice(&n_bytes);
        out
    }

    /// Parse a BCVK buffer. The recovered key is issued a fresh instance id:
    /// recovery never restores tally/decrypt rights over old ciphertexts.
    pub fn from_buffer(buffer: &[u8]) -> Result<Self, VotingError> {
        const FIXED: usize = 4 + 1 + 32 + 32 + 4;
        if buffer.len() < FIXED {
            return Err(VotingError::BufferTooShort);
        }
        if buffer[..4] != VOTING_KEY_MAGIC[..] {
            return Err(VotingError::InvalidPublicKeyFormat);
        }
        if buffer[4] != VOTING_KEY_VERSION {
            return Err(VotingError::UnsupportedVersion(buffer[4]));
        }
        let mut key_id = [0u8; 32];
        key_id.copy_from_slice(&buffer[5..37]);
        let n_len = BigEndian::read_u32(&buffer[69..73]) as usize;
        if buffer.len() < FIXED + n_len {
            return Err(VotingError::BufferTooShort);
        }
        let n = BigUint::from_bytes_be(&buffer[FIXED..FIXED + n_len]);
        if voting_key_id(&n) != key_id {
            return Err(VotingError::InvalidPublicKeyIdMismatch);
        }
        Ok(Self::new(PaillierPublicKey::from_modulus(n)))
    }
}

#[derive(Clone, Debug)]
pub struct IsolatedPrivateKey {
    key: PaillierPrivateKey,
    public: IsolatedPublicKey,
}

impl IsolatedPrivateKey {
    /// Bind a Paillier private key to a specific public key instance. The
    /// public key is held by value; no state is shared between instances.
    pub fn new(key: PaillierPrivateKey, public: IsolatedPublicKey) -> Self {
        Self { key, public }
    }

    pub fn public_key(&self) -> &IsolatedPublicKey {
        &self.public
    }

    pub fn paillier(&self) -> &PaillierPrivateKey {
        &self.key
    }

    /// Decrypt a tagged ciphertext. A ciphertext tagged under a different
    /// instance id fails with `InvalidKeyFormat`.
    pub fn decrypt(&self, tagged: &BigUint) -> Result<BigUint, VotingError> {
        let (inner, tag, hex) = split_tagged(tagged)?;
        if !verify_isolation_tag(&self.public.key_id, &self.public.instance_id, &hex, &tag)? {
            return Err(VotingError::InvalidKeyFormat);
        }
        Ok(self.key.decrypt(&inner))
    }
}
