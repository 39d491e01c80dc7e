/// ECIES Envelope
///
/// Authenticated public-key encryption over secp256k1 + AES-256-GCM.
///
/// Single-recipient layout (97-byte fixed overhead):
///
/// ```text
/// [ ephemeral public key (65, uncompressed) ]
/// [ iv (16) ]
/// [ auth tag (16) ]
/// [ ciphertext (|plaintext|) ]
/// ```
///
/// Multi-recipient layout: one random 32-byte data-encryption key encrypts
/// the payload once; the DEK is then wrapped per recipient as a complete
/// single-recipient envelope (129 bytes each):
///
/// ```text
/// [ message ephemeral public key (65) ]
/// [ payload iv (16) ]
/// [ payload auth tag (16) ]
/// [ recipient count (2, BE) ]
/// [ recipient id (16) ] × n
/// [ wrapped DEK (129) ] × n
/// [ ciphertext ]
/// ```
///
/// The streaming forms slice plaintext into `block_size − 97` strides, one
/// envelope per stride, order-preserving; the final short stride is
/// encrypted whole.
use aes_gcm::aead::consts::U16;
use aes_gcm::aes::Aes256;
use aes_gcm::{AeadInPlace, AesGcm, KeyInit, Nonce, Tag};
use byteorder::{BigEndian, ByteOrder};
use rand::rngs::OsRng;
use rand::RngCore;
use secp256k1::ecdh::shared_secret_point;
use secp256k1::{PublicKey, Secp256k1, SecretKey};

use crate::constants::{
    AUTH_TAG_LENGTH, ECIES_OVERHEAD_LENGTH, ENCRYPTED_DEK_LENGTH, IV_LENGTH, MAX_RECIPIENTS,
    MEMBER_ID_LENGTH, MULTI_HEADER_LENGTH, PUBLIC_KEY_LENGTH, PUBLIC_KEY_PREFIX,
    RECIPIENT_COUNT_LENGTH, SYMMETRIC_KEY_LENGTH,
};
use crate::error::EciesError;
use crate::guid::MemberId;

/// AES-256-GCM with the envelope's 16-byte IV.
type EnvelopeCipher = AesGcm<Aes256, U16>;

/// One addressee of a multi-recipient envelope.
#[derive(Clone)]
pub struct Recipient {
    pub id: MemberId,
    pub public_key: PublicKey,
}

/// Plaintext capacity of one envelope that must fit in `block_size` bytes.
#[inline]
pub fn capacity_per_block(block_size: usize) -> usize {
    block_size.saturating_sub(ECIES_OVERHEAD_LENGTH)
}

/// Envelope length for a plaintext of `len` bytes.
#[inline]
pub fn encrypted_length(len: usize) -> usize {
    len + ECIES_OVERHEAD_LENGTH
}

/// Multi-recipient envelope length for `recipients` addressees and `len`
/// plaintext bytes.
#[inline]
pub fn multi_encrypted_length(recipients: usize, len: usize) -> usize {
    crate::constants::multi_recipient_overhead(recipients) + len
}

fn shared_key(public: &PublicKey, secret: &SecretKey) -> [u8; SYMMETRIC_KEY_LENGTH] {
    // x-coordinate of the shared point keys the cipher
    let point = shared_secret_point(public, secret);
    let mut key = [0u8; SYMMETRIC_KEY_LENGTH];
    key.copy_from_slice(&point[..SYMMETRIC_KEY_LENGTH]);
    key
}

fn gcm_encrypt(
    key: &[u8; SYMMETRIC_KEY_LENGTH],
    iv: &[u8; IV_LENGTH],
    plaintext: &[u8],
) -> Result<(Vec<u8>, [u8; AUTH_TAG_LENGTH]), EciesError> {
    let cipher = EnvelopeCipher::new_from_slice(key).map_err(|_| EciesError::DecryptionFailed)?;
    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(iv), &[], &mut buffer)
        .map_err(|_| EciesError::DecryptionFailed)?;
    let mut tag_bytes = [0u8; AUTH_TAG_LENGTH];
    tag_bytes.copy_from_slice(&tag);
    Ok((buffer, tag_bytes))
}

fn gcm_decrypt(
    key: &[u8; SYMMETRIC_KEY_LENGTH],
    iv: &[u8],
    tag: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, EciesError> {
    let cipher = EnvelopeCipher::new_from_slice(key).map_err(|_| EciesError::DecryptionFailed)?;
    let mut buffer = ciphertext.to_vec();
    cipher
        .decrypt_in_place_detached(
            Nonce::from_slice(iv),
            &[],
            &mut buffer,
            Tag::from_slice(tag),
        )
        .map_err(|_| EciesError::DecryptionFailed)?;
    Ok(buffer)
}

/// Encrypt `plaintext` to a single recipient public key.
pub fn encrypt_single(recipient: &PublicKey, plaintext: &[u8]) -> Result<Vec<u8>, EciesError> {
    let secp = Secp256k1::new();
    let ephemeral_secret = SecretKey::new(&mut rand::thread_rng());
    let ephemeral_public = PublicKey::from_secret_key(&secp, &ephemeral_secret);

    let key = shared_key(recipient, &ephemeral_secret);
    let mut iv = [0u8; IV_LENGTH];
    OsRng.fill_bytes(&mut iv);

    let (ciphertext, tag) = gcm_encrypt(&key, &iv, plaintext)?;

    let mut envelope = Vec::with_capacity(encrypted_length(plaintext.len()));
    envelope.extend_from_slice(&ephemeral_public.serialize_uncompressed());
    envelope.extend_from_slice(&iv);
    envelope.extend_from_slice(&tag);
    envelope.extend_from_slice(&ciphertext);
    Ok(envelope)
}

/// Decrypt a single-recipient envelope.
pub fn decrypt_single(recipient: &SecretKey, envelope: &[u8]) -> Result<Vec<u8>, EciesError> {
    if envelope.len() < ECIES_OVERHEAD_LENGTH {
        return Err(EciesError::InvalidHeaderLength {
            got: envelope.len(),
            need: ECIES_OVERHEAD_LENGTH,
        });
    }
    if envelope[0] != PUBLIC_KEY_PREFIX {
        return Err(EciesError::InvalidEphemeralPublicKey);
    }
    let ephemeral_public = PublicKey::from_slice(&envelope[..PUBLIC_KEY_LENGTH])
        .map_err(|_| EciesError::InvalidEphemeralPublicKey)?;

    let iv = &envelope[PUBLIC_KEY_LENGTH..PUBLIC_KEY_LENGTH + IV_LENGTH];
    let tag = &envelope[PUBLIC_KEY_LENGTH + IV_LENGTH..ECIES_OVERHEAD_LENGTH];
    let ciphertext = &envelope[ECIES_OVERHEAD_LENGTH..];

    let key = shared_key(&ephemeral_public, recipient);
    gcm_decrypt(&key, iv, tag, ciphertext)
}

/// Encrypt `plaintext` once and wrap the data-encryption key for every
/// recipient.
pub fn encrypt_multi(recipients: &[Recipient], plaintext: &[u8]) -> Result<Vec<u8>, EciesError> {
    if recipients.is_empty() {
        return Err(EciesError::RecipientNotFound);
    }
    if recipients.len() > MAX_RECIPIENTS {
        return Err(EciesError::TooManyRecipients {
            got: recipients.len(),
            max: MAX_RECIPIENTS,
        });
    }

    let secp = Secp256k1::new();
    let message_secret = SecretKey::new(&mut rand::thread_rng());
    let message_public = PublicKey::from_secret_key(&secp, &message_secret);

    let mut dek = [0u8; SYMMETRIC_KEY_LENGTH];
    OsRng.fill_bytes(&mut dek);
    let mut iv = [0u8; IV_LENGTH];
    OsRng.fill_bytes(&mut iv);

    let (ciphertext, tag) = gcm_encrypt(&dek, &iv, plaintext)?;

    let mut envelope = Vec::with_capacity(multi_encrypted_length(recipients.len(), plaintext.len()));
    envelope.extend_from_slice(&message_public.serialize_uncompressed());
    envelope.extend_from_slice(&iv);
    envelope.extend_from_slice(&tag);
    let mut count = [0u8; RECIPIENT_COUNT_LENGTH];
    BigEndian::write_u16(&mut count, recipients.len() as u16);
    envelope.extend_from_slice(&count);
    for recipient in recipients {
        envelope.extend_from_slice(recipient.id.as_bytes());
    }
    for recipient in recipients {
        let wrapped = encrypt_single(&recipient.public_key, &dek)?;
        debug_assert_eq!(wrapped.len(), ENCRYPTED_DEK_LENGTH);
        envelope.extend_from_slice(&wrapped);
    }
    envelope.extend_from_slice(&ciphertext);
    Ok(envelope)
}

/// Decrypt a multi-recipient envelope as the recipient identified by `id`.
pub fn decrypt_multi(
    recipient: &SecretKey,
    id: &MemberId,
    envelope: &[u8],
) -> Result<Vec<u8>, EciesError> {
    if envelope.len() < MULTI_HEADER_LENGTH {
        return Err(EciesError::InvalidHeaderLength {
            got: envelope.len(),
            need: MULTI_HEADER_LENGTH,
        });
    }
    // The message ephemeral key is parsed for well-formedness; each wrapped
    // DEK carries its own ephemeral key for the actual agreement.
    PublicKey::from_slice(&envelope[..PUBLIC_KEY_LENGTH])
        .map_err(|_| EciesError::InvalidSenderPublicKey)?;
    let iv = &envelope[PUBLIC_KEY_LENGTH..PUBLIC_KEY_LENGTH + IV_LENGTH];
    let tag = &envelope[PUBLIC_KEY_LENGTH + IV_LENGTH..PUBLIC_KEY_LENGTH + IV_LENGTH + AUTH_TAG_LENGTH];
    let count = BigEndian::read_u16(
        &envelope[MULTI_HEADER_LENGTH - RECIPIENT_COUNT_LENGTH..MULTI_HEADER_LENGTH],
    ) as usize;

    let ids_start = MULTI_HEADER_LENGTH;
    let deks_start = ids_start + count * MEMBER_ID_LENGTH;
    let payload_start = deks_start + count * ENCRYPTED_DEK_LENGTH;
    if envelope.len() < payload_start {
        return Err(EciesError::InvalidEncryptedDataLength(envelope.len()));
    }

    let index = (0..count)
        .find(|i| {
            let off = ids_start + i * MEMBER_ID_LENGTH;
            &envelope[off..off + MEMBER_ID_LENGTH] == id.as_bytes()
        })
        .ok_or(EciesError::RecipientNotFound)?;

    let dek_off = deks_start + index * ENCRYPTED_DEK_LENGTH;
    let dek = decrypt_single(recipient, &envelope[dek_off..dek_off + ENCRYPTED_DEK_LENGTH])?;
    let dek: [u8; SYMMETRIC_KEY_LENGTH] = dek
        .as_slice()
        .try_into()
        .map_err(|_| EciesError::DecryptionFailed)?;

    gcm_decrypt(&dek, iv, tag, &envelope[payload_start..])
}

/// Streaming encrypter: feeds of plaintext come out as a sequence of
/// envelopes, one per `capacity_per_block` stride, in input order.
pub struct EciesStreamEncrypter {
    recipient: PublicKey,
    capacity: usize,
    pending: Vec<u8>,
}

impl EciesStreamEncrypter {
    pub fn new(recipient: PublicKey, block_size: usize) -> Result<Self, EciesError> {
        let capacity = capacity_per_block(block_size);
        if capacity == 0 {
            return Err(EciesError::InvalidEncryptedDataLength(block_size));
        }
        Ok(Self { recipient, capacity, pending: Vec::new() })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes buffered towards the next stride.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Consume input, emitting one envelope per completed stride.
    pub fn update(&mut self, input: &[u8]) -> Result<Vec<Vec<u8>>, EciesError> {
        self.pending.extend_from_slice(input);
        let mut envelopes = Vec::new();
        while self.pending.len() >= self.capacity {
            let rest = self.pending.split_off(self.capacity);
            let stride = std::mem::replace(&mut self.pending, rest);
            envelopes.push(encrypt_single(&self.recipient, &stride)?);
        }
        Ok(envelopes)
    }

    /// Encrypt the final (short) stride, if any.
    pub fn finalize(mut self) -> Result<Option<Vec<u8>>, EciesError> {
        if self.pending.is_empty() {
            return Ok(None);
        }
        let stride = std::mem::take(&mut self.pending);
        Ok(Some(encrypt_single(&self.recipient, &stride)?))
    }
}

/// Streaming decrypter: consumes exactly `block_size` bytes per envelope;
/// the final envelope may be short but never smaller than the fixed
/// overhead.
pub struct EciesStreamDecrypter {
    secret: SecretKey,
    block_size: usize,
    pending: Vec<u8>,
}

impl EciesStreamDecrypter {
    pub fn new(secret: SecretKey, block_size: usize) -> Result<Self, EciesError> {
        if capacity_per_block(block_size) == 0 {
            return Err(EciesError::InvalidEncryptedDataLength(block_size));
        }
        Ok(Self { secret, block_size, pending: Vec::new() })
    }

    /// Consume envelope bytes, emitting one plaintext stride per completed
    /// envelope.
    pub fn update(&mut self, input: &[u8]) -> Result<Vec<Vec<u8>>, EciesError> {
        self.pending.extend_from_slice(input);
        let mut strides = Vec::new();
        while self.pending.len() >= self.block_size {
            let rest = self.pending.split_off(self.block_size);
            let envelope = std::mem::replace(&mut self.pending, rest);
            strides.push(decrypt_single(&self.secret, &envelope)?);
        }
        Ok(strides)
    }

    /// Decrypt the trailing short envelope, if any.
    pub fn finalize(mut self) -> Result<Option<Vec<u8>>, EciesError> {
        if self.pending.is_empty() {
            return Ok(None);
        }
        if self.pending.len() < ECIES_OVERHEAD_LENGTH {
            return Err(EciesError::InvalidEncryptedDataLength(self.pending.len()));
        }
        let envelope = std::mem::take(&mut self.pending);
        Ok(Some(decrypt_single(&self.secret, &envelope)?))
    }
}
