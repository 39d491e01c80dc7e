/// Paillier Cryptosystem
///
/// Additively homomorphic encryption over num-bigint. With g = n + 1 the
/// scheme simplifies to c = g^m · r^n mod n² and m = L(c^λ mod n²) · μ mod n
/// where L(x) = (x − 1) / n and μ = λ⁻¹ mod n. Multiplying ciphertexts adds
/// plaintexts; raising a ciphertext to k multiplies its plaintext by k.
use num_bigint::{BigInt, BigUint, RandBigInt, Sign};
use num_integer::Integer;
use num_traits::{One, Zero};
use rand::rngs::OsRng;

use crate::error::VotingError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaillierPublicKey {
    n: BigUint,
    g: BigUint,
    n_squared: BigUint,
}

#[derive(Clone, Debug)]
pub struct PaillierPrivateKey {
    lambda: BigUint,
    mu: BigUint,
    public: PaillierPublicKey,
}

/// Modular inverse by extended Euclid; `None` when gcd(a, m) ≠ 1.
pub fn mod_inverse(a: &BigUint, modulus: &BigUint) -> Option<BigUint> {
    let m = BigInt::from_biguint(Sign::Plus, modulus.clone());
    let (mut old_r, mut r) = (BigInt::from_biguint(Sign::Plus, a.clone()), m.clone());
    let (mut old_s, mut s) = (BigInt::one(), BigInt::zero());
    while !r.is_zero() {
        let q = &old_r / &r;
        let next_r = &old_r - &q * &r;
        old_r = std::mem::replace(&mut r, next_r);
        let next_s = &old_s - &q * &s;
        old_s = std::mem::replace(&mut s, next_s);
    }
    if !old_r.is_one() {
        return None;
    }
    let mut inverse = old_s % &m;
    if inverse.sign() == Sign::Minus {
        inverse += &m;
    }
    inverse.to_biguint()
}

impl PaillierPublicKey {
    pub fn from_modulus(n: BigUint) -> Self {
        let g = &n + 1u32;
        let n_squared = &n * &n;
        Self { n, g, n_squared }
    }

    pub fn modulus(&self) -> &BigUint {
        &self.n
    }

    pub fn generator(&self) -> &BigUint {
        &self.g
    }

    pub fn modulus_squared(&self) -> &BigUint {
        &self.n_squared
    }

    /// Encrypt `m < n` with a fresh blinding factor.
    pub fn encrypt(&self, m: &BigUint) -> Result<BigUint, VotingError> {
        if m >= &self.n {
            return Err(VotingError::MessageOutOfRange);
        }
        let r = self.random_blinding();
        let g_m = self.g.modpow(m, &self.n_squared);
        let r_n = r.modpow(&self.n, &self.n_squared);
        Ok((g_m * r_n) % &self.n_squared)
    }

    /// Homomorphic addition: multiply ciphertexts mod n².
    pub fn add(&self, a: &BigUint, b: &BigUint) -> BigUint {
        (a * b) % &self.n_squared
    }

    /// Homomorphic scalar multiplication: raise a ciphertext to `k` mod n².
    pub fn multiply(&self, c: &BigUint, k: &BigUint) -> BigUint {
        c.modpow(k, &self.n_squared)
    }

    fn random_blinding(&self) -> BigUint {
        let mut rng = OsRng;
        loop {
            let r = rng.gen_biguint_below(&self.n);
            if !r.is_zero() && r.gcd(&self.n).is_one() {
                return r;
            }
        }
    }
}

impl PaillierPrivateKey {
    /// Build a keypair from two distinct primes.
    pub fn from_primes(p: &BigUint, q: &BigUint) -> Result<Self, VotingError> {
        if p == q {
            return Err(VotingError::IdenticalPrimes);
        }
        let n = p * q;
        let lambda = (p - 1u32).lcm(&(q - 1u32));
        let mu = mod_inverse(&lambda, &n).ok_or(VotingError::ModularInverseDoesNotExist)?;
        let public = PaillierPublicKey::from_modulus(n);
        Ok(Self { lambda, mu, public })
    }

    pub fn from_parts(lambda: BigUint, mu: BigUint, public: PaillierPublicKey) -> Self {
        Self { lambda, mu, public }
    }

    pub fn public_key(&self) -> &PaillierPublicKey {
        &self.public
    }

    pub fn lambda(&self) -> &BigUint {
        &self.lambda
    }

    pub fn mu(&self) -> &BigUint {
        &self.mu
    }

    /// Decrypt a ciphertext: L(c^λ mod n²) · μ mod n.
    pub fn decrypt(&self, c: &BigUint) -> BigUint {
        let n = &self.public.n;
        let l = (c.modpow(&self.lambda, &self.public.n_squared) - 1u32) / n;
        (l * &self.mu) % n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // small but non-trivial primes keep the tests fast
    fn test_key() -> PaillierPrivateKey {
        let p = BigUint::from(10_007u32);
        let q = BigUint::from(10_009u32);
        PaillierPrivateKey::from_primes(&p, &q).unwrap()
    }

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let key = test_key();
        for m in [0u32, 1, 42, 9_999, 100_000] {
            let m = BigUint::from(m);
            let c = key.public_key().encrypt(&m).unwrap();
            assert_eq!(key.decrypt(&c), m);
        }
    }

    #[test]
    fn test_ciphertexts_are_randomised() {
        let key = test_key();
        let m = BigUint::from(42u32);
        let c1 = key.public_key().encrypt(&m).unwrap();
        let c2 = key.public_key().encrypt(&m).unwrap();
        assert_ne!(c1, c2);
        assert_eq!(key.decrypt(&c1), key.decrypt(&c2));
    }

    #[test]
    fn test_homomorphic_addition() {
        let key = test_key();
        let c1 = key.public_key().encrypt(&BigUint::from(10u32)).unwrap();
        let c2 = key.public_key().encrypt(&BigUint::from(20u32)).unwrap();
        let sum = key.public_key().add(&c1, &c2);
        assert_eq!(key.decrypt(&sum), BigUint::from(30u32));
    }

    #[test]
    fn test_homomorphic_scalar_multiply() {
        let key = test_key();
        let c = key.public_key().encrypt(&BigUint::from(7u32)).unwrap();
        let scaled = key.public_key().multiply(&c, &BigUint::from(6u32));
        assert_eq!(key.decrypt(&scaled), BigUint::from(42u32));
    }

    #[test]
    fn test_message_out_of_range() {
        let key = test_key();
        let too_big = key.public_key().modulus().clone();
        assert_eq!(
            key.public_key().encrypt(&too_big).unwrap_err(),
            VotingError::MessageOutOfRange
        );
    }

    #[test]
    fn test_identical_primes_rejected() {
        let p = BigUint::from(10_007u32);
        assert_eq!(
            PaillierPrivateKey::from_primes(&p, &p).unwrap_err(),
            VotingError::IdenticalPrimes
        );
    }

    #[test]
    fn test_mod_inverse() {
        let a = BigUint::from(3u32);
        let m = BigUint::from(11u32);
        let inv = mod_inverse(&a, &m).unwrap();
        assert_eq!((a * inv) % m, BigUint::one());

        // gcd(4, 8) != 1
        assert!(mod_inverse(&BigUint::from(4u32), &BigUint::from(8u32)).is_none());
    }
}
