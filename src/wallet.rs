/// Deterministic Wallets
///
/// A BIP-39 mnemonic deterministically derives a BIP-32 wallet; the derived
/// child key is the member's secp256k1 ECDH/signing key. The same mnemonic
/// always rebuilds the same keypair, which is how an unloaded member is
/// rehydrated.
use std::str::FromStr;

use bip39::Mnemonic;
use bitcoin::network::constants::Network;
use bitcoin::util::bip32::{DerivationPath, ExtendedPrivKey};
use secp256k1::{PublicKey, Secp256k1, SecretKey};
use zeroize::Zeroize;

use crate::constants::PUBLIC_KEY_LENGTH;
use crate::error::EciesError;

/// Derivation path for member identity keys.
const MEMBER_KEY_PATH: &str = "m/44'/60'/0'/0/0";

/// A derived member wallet: the secp256k1 keypair at the member key path.
#[derive(Debug)]
pub struct Wallet {
    secret: SecretKey,
    public: PublicKey,
}

impl Wallet {
    /// Derive the wallet from a mnemonic (empty passphrase).
    pub fn from_mnemonic(mnemonic: &Mnemonic) -> Result<Self, EciesError> {
        let mut seed = mnemonic.to_seed("");
        let wallet = Self::from_seed(&seed);
        seed.zeroize();
        wallet
    }

    /// Derive the wallet from a 64-byte BIP-39 seed.
    pub fn from_seed(seed: &[u8]) -> Result<Self, EciesError> {
        let secp = bitcoin::secp256k1::Secp256k1::new();
        let master = ExtendedPrivKey::new_master(Network::Bitcoin, seed)
            .map_err(|_| EciesError::InvalidMnemonic)?;
        let path =
            DerivationPath::from_str(MEMBER_KEY_PATH).map_err(|_| EciesError::InvalidMnemonic)?;
        let child = master
            .derive_priv(&secp, &path)
            .map_err(|_| EciesError::InvalidMnemonic)?;

        let secret = SecretKey::from_slice(&child.private_key.key[..])
            .map_err(|_| EciesError::InvalidPrivateKey)?;
        let public = PublicKey::from_secret_key(&Secp256k1::new(), &secret);
        Ok(Self { secret, public })
    }

    /// Generate a fresh 12-word mnemonic and its wallet.
    pub fn generate() -> Result<(Mnemonic, Self), EciesError> {
        let mnemonic = Mnemonic::generate(12).map_err(|_| EciesError::InvalidMnemonic)?;
        let wallet = Self::from_mnemonic(&mnemonic)?;
        Ok((mnemonic, wallet))
    }

    /// Parse a mnemonic phrase.
    pub fn parse_mnemonic(phrase: &str) -> Result<Mnemonic, EciesError> {
        Mnemonic::parse(phrase).map_err(|_| EciesError::InvalidMnemonic)
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.secret
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Uncompressed 65-byte public key, 0x04-prefixed.
    pub fn public_key_uncompressed(&self) -> [u8; PUBLIC_KEY_LENGTH] {
        self.public.serialize_uncompressed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_and_rehydrate() {
        let (mnemonic, wallet) = Wallet::generate().unwrap();
        let again = Wallet::from_mnemonic(&mnemonic).unwrap();
        assert_eq!(wallet.public_key(), again.public_key());
        assert_eq!(wallet.secret_key(), again.secret_key());
    }

    #[test]
    fn test_known_mnemonic_is_deterministic() {
        let phrase = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
        let mnemonic = Wallet::parse_mnemonic(phrase).unwrap();
        let a = Wallet::from_mnemonic(&mnemonic).unwrap();
        let b = Wallet::from_mnemonic(&mnemonic).unwrap();
        assert_eq!(a.public_key_uncompressed(), b.public_key_uncompressed());
        assert_eq!(a.public_key_uncompressed()[0], 0x04);
    }

    #[test]
    fn test_different_mnemonics_differ() {
        let (_, a) = Wallet::generate().unwrap();
        let (_, b) = Wallet::generate().unwrap();
        assert_ne!(a.public_key(), b.public_key());
    }

    #[test]
    fn test_invalid_mnemonic_rejected() {
        assert!(matches!(
            Wallet::parse_mnemonic("not a valid phrase at all"),
            Err(EciesError::InvalidMnemonic)
        ));
    }

    #[test]
    fn test_wallet_usable_for_ecies() {
        let (_, wallet) = Wallet::generate().unwrap();
        let envelope = crate::ecies::encrypt_single(wallet.public_key(), b"to self").unwrap();
        let plain = crate::ecies::decrypt_single(wallet.secret_key(), &envelope).unwrap();
        assert_eq!(plain, b"to self");
    }
}
