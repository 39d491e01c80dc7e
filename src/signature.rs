/// Message Signing
///
/// Ethereum-interoperable ECDSA: messages are prefixed with
/// `"\x19Ethereum Signed Message:\n" + length` and Keccak-256 hashed before
/// signing, so member signatures verify in existing wallet tooling.
/// Signatures are 65 bytes, `r(32) || s(32) || (v − 27)(1)`; verification
/// recovers the signer and compares 20-byte addresses.
use std::fmt;

use secp256k1::ecdsa::{RecoverableSignature, RecoveryId, Signature as EcdsaSignature};
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use sha3::{Digest, Keccak256};

use crate::constants::{
    COMPACT_SIGNATURE_LENGTH, PERSONAL_MESSAGE_PREFIX, SIGNATURE_LENGTH,
};
use crate::error::SignatureError;

/// Keccak-256 digest.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Keccak-256 over the personal-message preamble and the data.
pub fn hash_personal_message(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(PERSONAL_MESSAGE_PREFIX.as_bytes());
    hasher.update(data.len().to_string().as_bytes());
    hasher.update(data);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// 20-byte address of an uncompressed public key: Keccak-256 of the key
/// minus its 0x04 prefix, last 20 bytes.
pub fn public_key_address(public: &PublicKey) -> [u8; 20] {
    let uncompressed = public.serialize_uncompressed();
    let digest = keccak256(&uncompressed[1..]);
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest[12..]);
    out
}

/// Fixed-layout recoverable signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature([u8; SIGNATURE_LENGTH]);

impl Signature {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SignatureError> {
        if bytes.len() != SIGNATURE_LENGTH {
            return Err(SignatureError::InvalidLength {
                expected: SIGNATURE_LENGTH,
                got: bytes.len(),
            });
        }
        if bytes[SIGNATURE_LENGTH - 1] > 3 {
            return Err(SignatureError::InvalidRecoveryId(bytes[SIGNATURE_LENGTH - 1]));
        }
        let mut out = [0u8; SIGNATURE_LENGTH];
        out.copy_from_slice(bytes);
        Ok(Self(out))
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LENGTH] {
        &self.0
    }

    /// r || s without the recovery byte, as stored in CBL headers.
    pub fn compact(&self) -> [u8; COMPACT_SIGNATURE_LENGTH] {
        let mut out = [0u8; COMPACT_SIGNATURE_LENGTH];
        out.copy_from_slice(&self.0[..COMPACT_SIGNATURE_LENGTH]);
        out
    }

    pub fn recovery_id(&self) -> u8 {
        self.0[SIGNATURE_LENGTH - 1]
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    fn recoverable(&self) -> Result<RecoverableSignature, SignatureError> {
        let id = RecoveryId::from_i32(self.recovery_id() as i32)
            .map_err(|_| SignatureError::InvalidRecoveryId(self.recovery_id()))?;
        RecoverableSignature::from_compact(&self.0[..COMPACT_SIGNATURE_LENGTH], id)
            .map_err(|_| SignatureError::Malformed)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}…)", &self.to_hex()[..16])
    }
}

/// Sign `data` as a personal message.
pub fn sign(secret: &SecretKey, data: &[u8]) -> Result<Signature, SignatureError> {
    let secp = Secp256k1::new();
    let digest = hash_personal_message(data);
    let message = Message::from_slice(&digest).map_err(|_| SignatureError::Malformed)?;
    let recoverable = secp.sign_ecdsa_recoverable(&message, secret);
    let (id, compact) = recoverable.serialize_compact();

    let mut bytes = [0u8; SIGNATURE_LENGTH];
    bytes[..COMPACT_SIGNATURE_LENGTH].copy_from_slice(&compact);
    bytes[SIGNATURE_LENGTH - 1] = id.to_i32() as u8;
    Ok(Signature(bytes))
}

/// Recover the signer's public key from a signature over `data`.
pub fn recover(signature: &Signature, data: &[u8]) -> Result<PublicKey, SignatureError> {
    let secp = Secp256k1::new();
    let digest = hash_personal_message(data);
    let message = Message::from_slice(&digest).map_err(|_| SignatureError::Malformed)?;
    secp.recover_ecdsa(&message, &signature.recoverable()?)
        .map_err(|_| SignatureError::VerificationFailed)
}

/// Verify a signature by recovery and address comparison.
pub fn verify(public: &PublicKey, signature: &Signature, data: &[u8]) -> bool {
    match recover(signature, data) {
        Ok(recovered) => public_key_address(&recovered) == public_key_address(public),
        Err(_) => false,
    }
}

/// Verify a headerless `r || s` signature against a known public key.
pub fn verify_compact(public: &PublicKey, compact: &[u8], data: &[u8]) -> bool {
    if compact.len() != COMPACT_SIGNATURE_LENGTH {
        return false;
    }
    let secp = Secp256k1::new();
    let digest = hash_personal_message(data);
    let message = match Message::from_slice(&digest) {
        Ok(m) => m,
        Err(_) => return false,
    };
    let signature = match EcdsaSignature::from_compact(compact) {
        Ok(s) => s,
        Err(_) => return false,
    };
    secp.verify_ecdsa(&message, &signature, public).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keypair() -> (SecretKey, PublicKey) {
        let secp = Secp256k1::new();
        let sk = SecretKey::new(&mut rand::thread_rng());
        let pk = PublicKey::from_secret_key(&secp, &sk);
        (sk, pk)
    }

    #[test]
    fn test_personal_message_hash_is_prefixed() {
        // a plain keccak of the data must not match the personal-message hash
        let data = b"hello";
        assert_ne!(hash_personal_message(data), keccak256(data));
        // deterministic
        assert_eq!(hash_personal_message(data), hash_personal_message(data));
    }

    #[test]
    fn test_sign_verify_round_trip() {
        let (sk, pk) = keypair();
        let sig = sign(&sk, b"message bytes").unwrap();
        assert!(verify(&pk, &sig, b"message bytes"));
    }

    #[test]
    fn test_verify_rejects_other_message() {
        let (sk, pk) = keypair();
        let sig = sign(&sk, b"message bytes").unwrap();
        assert!(!verify(&pk, &sig, b"message byteZ"));
    }

    #[test]
    fn test_verify_rejects_other_signer() {
        let (sk, _) = keypair();
        let (_, other_pk) = keypair();
        let sig = sign(&sk, b"message").unwrap();
        assert!(!verify(&other_pk, &sig, b"message"));
    }

    #[test]
    fn test_recover_matches_signer() {
        let (sk, pk) = keypair();
        let sig = sign(&sk, b"recover me").unwrap();
        let recovered = recover(&sig, b"recover me").unwrap();
        assert_eq!(public_key_address(&recovered), public_key_address(&pk));
    }

    #[test]
    fn test_signature_layout() {
        let (sk, _) = keypair();
        let sig = sign(&sk, b"layout").unwrap();
        assert_eq!(sig.as_bytes().len(), 65);
        assert!(sig.recovery_id() <= 3);
        assert_eq!(&sig.compact()[..], &sig.as_bytes()[..64]);
        let round = Signature::from_bytes(sig.as_bytes()).unwrap();
        assert_eq!(round, sig);
    }

    #[test]
    fn test_from_bytes_rejects_bad_input() {
        assert!(matches!(
            Signature::from_bytes(&[0u8; 64]).unwrap_err(),
            SignatureError::InvalidLength { got: 64, .. }
        ));
        let mut bytes = [0u8; 65];
        bytes[64] = 9;
        assert!(matches!(
            Signature::from_bytes(&bytes).unwrap_err(),
            SignatureError::InvalidRecoveryId(9)
        ));
    }

    #[test]
    fn test_verify_compact() {
        let (sk, pk) = keypair();
        let sig = sign(&sk, b"compact").unwrap();
        assert!(verify_compact(&pk, &sig.compact(), b"compact"));
        assert!(!verify_compact(&pk, &sig.compact(), b"compacT"));
        let (_, other_pk) = keypair();
        assert!(!verify_compact(&other_pk, &sig.compact(), b"compact"));
    }
}
