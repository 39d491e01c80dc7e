/// Deterministic Voting Key Derivation
///
/// A member's Paillier voting keypair is derived from their ECDH identity:
/// the shared-secret x-coordinate seeds HKDF-SHA512, whose output seeds a
/// ChaCha20 DRBG, and both prime candidates and Miller-Rabin witnesses are
/// drawn from that single stream. The same ECDH inputs therefore always
/// reproduce the same keypair, with no key material ever stored.
use hkdf::Hkdf;
use num_bigint::{BigUint, RandBigInt};
use num_traits::{One, Zero};
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha20Rng;
use secp256k1::ecdh::shared_secret_point;
use secp256k1::{PublicKey, SecretKey};
use sha2::Sha512;
use tracing::debug;

use crate::constants::{
    MILLER_RABIN_WITNESSES, PRIME_GENERATION_INFO, PRIME_GENERATION_MAX_ATTEMPTS,
    PUBLIC_KEY_LENGTH, PUBLIC_KEY_PREFIX, RAW_PUBLIC_KEY_LENGTH, SYMMETRIC_KEY_LENGTH,
    VOTING_KEY_BITS,
};
use crate::error::VotingError;
use crate::paillier::PaillierPrivateKey;
use crate::voting::{IsolatedPrivateKey, IsolatedPublicKey};

/// A freshly derived isolated keypair.
#[derive(Debug)]
pub struct VotingKeyPair {
    pub public_key: IsolatedPublicKey,
    pub private_key: IsolatedPrivateKey,
}

/// Derive the member voting keypair (3072-bit modulus) from an ECDH
/// private/public key pair.
pub fn derive_voting_keys_from_ecdh(
    private_key: &[u8],
    public_key: &[u8],
) -> Result<VotingKeyPair, VotingError> {
    derive_voting_keys_with_bits(private_key, public_key, VOTING_KEY_BITS)
}

/// Derivation with an explicit modulus size. Production callers use
/// [`derive_voting_keys_from_ecdh`]; the override exists so tests can run
/// against small moduli.
pub fn derive_voting_keys_with_bits(
    private_key: &[u8],
    public_key: &[u8],
    bits: u64,
) -> Result<VotingKeyPair, VotingError> {
    let shared = ecdh_shared_secret(private_key, public_key)?;
    let seed = expand_seed(&shared);

    let mut drbg_seed = [0u8; 32];
    drbg_seed.copy_from_slice(&seed[..32]);
    let mut drbg = ChaCha20Rng::from_seed(drbg_seed);

    let prime_bits = bits / 2 + 1;
    let p = generate_prime(&mut drbg, prime_bits)?;
    let q = generate_prime(&mut drbg, prime_bits)?;
    if p == q {
        return Err(VotingError::IdenticalPrimes);
    }
    debug!(prime_bits, "voting primes generated");

    let private = PaillierPrivateKey::from_primes(&p, &q)?;
    let n_bits = private.public_key().modulus().bits();
    if n_bits < bits {
        return Err(VotingError::KeyPairTooSmall { actual: n_bits, required: bits });
    }

    // the keypair must survive one encrypt/decrypt before it is handed out
    let probe = BigUint::from(42u32);
    let c = private.public_key().encrypt(&probe)?;
    if private.decrypt(&c) != probe {
        return Err(VotingError::KeyPairValidationFailed);
    }

    let public = IsolatedPublicKey::new(private.public_key().clone());
    let isolated_private = IsolatedPrivateKey::new(private, public.clone());
    Ok(VotingKeyPair { public_key: public, private_key: isolated_private })
}

/// Validate the ECDH inputs and return the 32-byte shared-secret
/// x-coordinate.
fn ecdh_shared_secret(
    private_key: &[u8],
    public_key: &[u8],
) -> Result<[u8; SYMMETRIC_KEY_LENGTH], VotingError> {
    if private_key.len() != 32 {
        return Err(VotingError::PrivateKeyMustBeBuffer);
    }
    let normalized: Vec<u8> = match public_key.len() {
        RAW_PUBLIC_KEY_LENGTH => {
            let mut v = Vec::with_capacity(PUBLIC_KEY_LENGTH);
            v.push(PUBLIC_KEY_PREFIX);
            v.extend_from_slice(public_key);
            v
        }
        PUBLIC_KEY_LENGTH => {
            if public_key[0] != PUBLIC_KEY_PREFIX {
                return Err(VotingError::InvalidPublicKeyFormat);
            }
            public_key.to_vec()
        }
        _ => return Err(VotingError::PublicKeyMustBeBuffer),
    };

    let secret =
        SecretKey::from_slice(private_key).map_err(|_| VotingError::InvalidEcdhKeyPair)?;
    let public =
        PublicKey::from_slice(&normalized).map_err(|_| VotingError::InvalidEcdhKeyPair)?;

    let point = shared_secret_point(&public, &secret);
    let mut shared = [0u8; SYMMETRIC_KEY_LENGTH];
    shared.copy_from_slice(&point[..SYMMETRIC_KEY_LENGTH]);
    Ok(shared)
}

/// HKDF-SHA512 with an all-zero salt and the prime-generation info string.
fn expand_seed(shared: &[u8; SYMMETRIC_KEY_LENGTH]) -> [u8; 64] {
    let salt = [0u8; 64];
    let hkdf = Hkdf::<Sha512>::new(Some(&salt), shared);
    let mut okm = [0u8; 64];
    // 64 bytes is always a valid output length for SHA-512
    hkdf.expand(PRIME_GENERATION_INFO, &mut okm)
        .unwrap_or_else(|_| unreachable!("output length within HKDF bounds"));
    okm
}

const SMALL_PRIMES: [u32; 6] = [3, 5, 7, 11, 13, 17];

fn generate_prime(drbg: &mut ChaCha20Rng, prime_bits: u64) -> Result<BigUint, VotingError> {
    for _ in 0..PRIME_GENERATION_MAX_ATTEMPTS {
        let mut candidate = drbg.gen_biguint(prime_bits);
        // force the exact bit length and oddness
        candidate |= BigUint::one() << (prime_bits - 1) as usize;
        candidate |= BigUint::one();

        if SMALL_PRIMES.iter().any(|&d| (&candidate % d).is_zero()) {
            continue;
        }
        if miller_rabin(&candidate, MILLER_RABIN_WITNESSES, drbg) {
            return Ok(candidate);
        }
    }
    Err(VotingError::FailedToGeneratePrime(PRIME_GENERATION_MAX_ATTEMPTS))
}

/// Miller-Rabin with witnesses drawn from the derivation DRBG.
fn miller_rabin(n: &BigUint, witnesses: usize, drbg: &mut ChaCha20Rng) -> bool {
    let one = BigUint::one();
    let two = &one + &one;
    if n < &two {
        return false;
    }
    let n_minus_one = n - &one;

    // n − 1 = 2^s · d with d odd
    let mut d = n_minus_one.clone();
    let mut s = 0u64;
    while (&d % 2u32).is_zero() {
        d >>= 1;
        s += 1;
    }

    'witness: for _ in 0..witnesses {
        let a = drbg.gen_biguint_range(&two, &n_minus_one);
        let mut x = a.modpow(&d, n);
        if x == one || x == n_minus_one {
            continue;
        }
        for _ in 0..s.saturating_sub(1) {
            x = x.modpow(&two, n);
            if x == n_minus_one {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use secp256k1::Secp256k1;

    const TEST_BITS: u64 = 128;

    fn ecdh_inputs() -> (Vec<u8>, Vec<u8>) {
        let secp = Secp256k1::new();
        let sk = SecretKey::new(&mut rand::thread_rng());
        let pk = PublicKey::from_secret_key(&secp, &sk);
        (sk.secret_bytes().to_vec(), pk.serialize_uncompressed().to_vec())
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let (sk, pk) = ecdh_inputs();
        let a = derive_voting_keys_with_bits(&sk, &pk, TEST_BITS).unwrap();
        let b = derive_voting_keys_with_bits(&sk, &pk, TEST_BITS).unwrap();
        assert_eq!(a.public_key.modulus(), b.public_key.modulus());
        assert_eq!(
            a.private_key.paillier().lambda(),
            b.private_key.paillier().lambda()
        );
        // instance ids are per-instance even when the key material matches
        assert_ne!(a.public_key.instance_id(), b.public_key.instance_id());
    }

    #[test]
    fn test_different_inputs_differ() {
        let (sk_a, pk_a) = ecdh_inputs();
        let (sk_b, pk_b) = ecdh_inputs();
        let a = derive_voting_keys_with_bits(&sk_a, &pk_a, TEST_BITS).unwrap();
        let b = derive_voting_keys_with_bits(&sk_b, &pk_b, TEST_BITS).unwrap();
        assert_ne!(a.public_key.modulus(), b.public_key.modulus());
    }

    #[test]
    fn test_modulus_meets_bit_floor() {
        let (sk, pk) = ecdh_inputs();
        let pair = derive_voting_keys_with_bits(&sk, &pk, TEST_BITS).unwrap();
        assert!(pair.public_key.modulus().bits() >= TEST_BITS);
    }

    #[test]
    fn test_raw_public_key_accepted() {
        let (sk, pk) = ecdh_inputs();
        let with_prefix = derive_voting_keys_with_bits(&sk, &pk, TEST_BITS).unwrap();
        let raw = derive_voting_keys_with_bits(&sk, &pk[1..], TEST_BITS).unwrap();
        assert_eq!(with_prefix.public_key.modulus(), raw.public_key.modulus());
    }

    #[test]
    fn test_input_validation() {
        let (sk, pk) = ecdh_inputs();
        assert_eq!(
            derive_voting_keys_with_bits(&sk[..31], &pk, TEST_BITS).unwrap_err(),
            VotingError::PrivateKeyMustBeBuffer
        );
        assert_eq!(
            derive_voting_keys_with_bits(&sk, &pk[..40], TEST_BITS).unwrap_err(),
            VotingError::PublicKeyMustBeBuffer
        );
        let mut bad_prefix = pk.clone();
        bad_prefix[0] = 0x02;
        assert_eq!(
            derive_voting_keys_with_bits(&sk, &bad_prefix, TEST_BITS).unwrap_err(),
            VotingError::InvalidPublicKeyFormat
        );
        let zero_key = vec![0u8; 32];
        assert_eq!(
            derive_voting_keys_with_bits(&zero_key, &pk, TEST_BITS).unwrap_err(),
            VotingError::InvalidEcdhKeyPair
        );
    }

    #[test]
    fn test_derived_keys_tally() {
        let (sk, pk) = ecdh_inputs();
        let pair = derive_voting_keys_with_bits(&sk, &pk, TEST_BITS).unwrap();
        let c1 = pair.public_key.encrypt(&BigUint::from(10u32)).unwrap();
        let c2 = pair.public_key.encrypt(&BigUint::from(20u32)).unwrap();
        let sum = pair.public_key.add(&c1, &c2).unwrap();
        assert_eq!(pair.private_key.decrypt(&sum).unwrap(), BigUint::from(30u32));

        // a different member's key refuses the ciphertext outright
        let (sk_b, pk_b) = ecdh_inputs();
        let other = derive_voting_keys_with_bits(&sk_b, &pk_b, TEST_BITS).unwrap();
        assert_eq!(
            other.private_key.decrypt(&sum).unwrap_err(),
            VotingError::InvalidKeyFormat
        );
    }

    #[test]
    fn test_miller_rabin_known_values() {
        let mut drbg = ChaCha20Rng::from_seed([7u8; 32]);
        for prime in [104_729u32, 1_299_709, 15_485_863] {
            assert!(miller_rabin(&BigUint::from(prime), 32, &mut drbg));
        }
        for composite in [104_730u32, 1_299_711, 15_485_865] {
            assert!(!miller_rabin(&BigUint::from(composite), 32, &mut drbg));
        }
        // strong pseudoprime to base 2: 3215031751 = 151 × 751 × 28351
        assert!(!miller_rabin(&BigUint::from(3_215_031_751u64), 32, &mut drbg));
    }
}
