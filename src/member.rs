/// Members
///
/// A member is an identity: a GUID, a secp256k1 keypair derived from a
/// BIP-39 mnemonic, and a deterministically derived Paillier voting keypair.
/// Members sign CBLs, receive ECIES envelopes and participate in
/// homomorphic tallies. Private material can be unloaded one-way; a member
/// rehydrates only from its own mnemonic.
use secp256k1::{PublicKey, SecretKey};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::constants::{PUBLIC_KEY_LENGTH, VOTING_KEY_BITS};
use crate::ecies::{self, Recipient};
use crate::error::{BrightChainError, MemberError};
use crate::guid::MemberId;
use crate::signature::{self, Signature};
use crate::voting::IsolatedPublicKey;
use crate::voting_derivation::{derive_voting_keys_with_bits, VotingKeyPair};
use crate::wallet::Wallet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberType {
    Admin,
    System,
    User,
}

/// Whether private material is currently loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStatus {
    HasPrivateKey,
    PublicOnly,
}

#[derive(Debug)]
pub struct BrightChainMember {
    id: MemberId,
    member_type: MemberType,
    name: String,
    email: String,
    public_key: PublicKey,
    wallet: Option<Wallet>,
    voting_public_key: IsolatedPublicKey,
    voting_private_key: Option<crate::voting::IsolatedPrivateKey>,
    voting_key_bits: u64,
}

/// Wire shape of a persisted member.
#[derive(Serialize, Deserialize)]
struct MemberJson {
    id: String,
    #[serde(rename = "type")]
    member_type: MemberType,
    name: String,
    email: String,
    #[serde(rename = "publicKey")]
    public_key: String,
    #[serde(rename = "votingPublicKey")]
    voting_public_key: String,
}

fn validate_name(name: &str) -> Result<(), MemberError> {
    if name.is_empty() {
        return Err(MemberError::MissingMemberName);
    }
    if name.trim() != name {
        return Err(MemberError::InvalidMemberNameWhitespace);
    }
    Ok(())
}

/// RFC-5322-lite: one `@`, non-empty local part, dotted domain, no
/// whitespace anywhere.
fn validate_email(email: &str) -> Result<(), MemberError> {
    if email.is_empty() || email.trim() != email || email.chars().any(char::is_whitespace) {
        return Err(MemberError::InvalidEmail);
    }
    let mut parts = email.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(MemberError::InvalidEmail);
    };
    if local.is_empty() || domain.is_empty() {
        return Err(MemberError::InvalidEmail);
    }
    if !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
        return Err(MemberError::InvalidEmail);
    }
    Ok(())
}

impl BrightChainMember {
    /// Create a member with a fresh mnemonic, wallet and voting keypair.
    /// Returns the mnemonic phrase; it is the only way to rehydrate the
    /// member's private material later.
    pub fn create(
        member_type: MemberType,
        name: &str,
        email: &str,
    ) -> Result<(Self, bip39::Mnemonic), BrightChainError> {
        Self::create_with_voting_bits(member_type, name, email, VOTING_KEY_BITS)
    }

    /// [`Self::create`] with an explicit voting modulus size. Production
    /// members use 3072 bits; the override keeps test suites fast.
    pub fn create_with_voting_bits(
        member_type: MemberType,
        name: &str,
        email: &str,
        voting_key_bits: u64,
    ) -> Result<(Self, bip39::Mnemonic), BrightChainError> {
        validate_name(name)?;
        validate_email(email)?;

        let (mnemonic, wallet) = Wallet::generate()?;
        let voting = Self::derive_voting(&wallet, voting_key_bits)?;
        let id = MemberId::new();
        info!(member = %id, name, "created member");

        Ok((
            Self {
                id,
                member_type,
                name: name.to_string(),
                email: email.to_string(),
                public_key: *wallet.public_key(),
                voting_public_key: voting.public_key.clone(),
                voting_private_key: Some(voting.private_key),
                wallet: Some(wallet),
                voting_key_bits,
            },
            mnemonic,
        ))
    }

    fn derive_voting(wallet: &Wallet, bits: u64) -> Result<VotingKeyPair, BrightChainError> {
        Ok(derive_voting_keys_with_bits(
            &wallet.secret_key().secret_bytes(),
            &wallet.public_key_uncompressed(),
            bits,
        )?)
    }

    pub fn id(&self) -> MemberId {
        self.id
    }

    pub fn member_type(&self) -> MemberType {
        self.member_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn public_key_uncompressed(&self) -> [u8; PUBLIC_KEY_LENGTH] {
        self.public_key.serialize_uncompressed()
    }

    pub fn voting_public_key(&self) -> &IsolatedPublicKey {
        &self.voting_public_key
    }

    pub fn voting_private_key(&self) -> Option<&crate::voting::IsolatedPrivateKey> {
        self.voting_private_key.as_ref()
    }

    pub fn key_status(&self) -> KeyStatus {
        if self.wallet.is_some() {
            KeyStatus::HasPrivateKey
        } else {
            KeyStatus::PublicOnly
        }
    }

    /// The loaded signing key, when private material is present.
    pub fn signing_key(&self) -> Result<&SecretKey, MemberError> {
        self.wallet
            .as_ref()
            .map(|w| w.secret_key())
            .ok_or(MemberError::MissingPrivateKey)
    }

    pub fn sign(&self, message: &[u8]) -> Result<Signature, BrightChainError> {
        let key = self.signing_key()?;
        Ok(signature::sign(key, message)?)
    }

    pub fn verify(&self, sig: &Signature, message: &[u8]) -> bool {
        signature::verify(&self.public_key, sig, message)
    }

    /// ECIES-encrypt to this member's own public key.
    pub fn encrypt_to_self(&self, data: &[u8]) -> Result<Vec<u8>, BrightChainError> {
        Ok(ecies::encrypt_single(&self.public_key, data)?)
    }

    /// ECIES-encrypt once for a recipient list.
    pub fn encrypt_for(
        &self,
        recipients: &[Recipient],
        data: &[u8],
    ) -> Result<Vec<u8>, BrightChainError> {
        Ok(ecies::encrypt_multi(recipients, data)?)
    }

    /// Decrypt a single-recipient envelope addressed to this member.
    pub fn decrypt(&self, envelope: &[u8]) -> Result<Vec<u8>, BrightChainError> {
        let key = self.signing_key()?;
        Ok(ecies::decrypt_single(key, envelope)?)
    }

    /// Decrypt a multi-recipient envelope addressed to this member.
    pub fn decrypt_multi(&self, envelope: &[u8]) -> Result<Vec<u8>, BrightChainError> {
        let key = self.signing_key()?;
        Ok(ecies::decrypt_multi(key, &self.id, envelope)?)
    }

    /// Drop the wallet and all private key material. One-way: only
    /// [`Self::load_wallet`] with the original mnemonic restores it.
    pub fn unload_wallet_and_private_key(&mut self) {
        self.wallet = None;
        self.voting_private_key = None;
        info!(member = %self.id, "private material unloaded");
    }

    /// Rehydrate the wallet from a mnemonic. Fails with `InvalidMnemonic`
    /// when the derived public key is not this member's.
    pub fn load_wallet(&mut self, mnemonic: &bip39::Mnemonic) -> Result<(), BrightChainError> {
        let wallet = Wallet::from_mnemonic(mnemonic)?;
        if wallet.public_key() != &self.public_key {
            return Err(MemberError::InvalidMnemonic.into());
        }
        let voting = Self::derive_voting(&wallet, self.voting_key_bits)?;
        self.voting_public_key = voting.public_key;
        self.voting_private_key = Some(voting.private_key);
        self.wallet = Some(wallet);
        Ok(())
    }

    /// Persist the public view of this member.
    pub fn to_json(&self) -> Result<String, MemberError> {
        let json = MemberJson {
            id: self.id.to_string(),
            member_type: self.member_type,
            name: self.name.clone(),
            email: self.email.clone(),
            public_key: hex::encode(self.public_key.serialize_uncompressed()),
            voting_public_key: base64::encode(self.voting_public_key.to_buffer()),
        };
        serde_json::to_string(&json).map_err(|e| MemberError::InvalidJson(e.to_string()))
    }

    /// Reconstruct a `PublicOnly` member from its JSON form.
    pub fn from_json(json: &str) -> Result<Self, MemberError> {
        let parsed: MemberJson =
            serde_json::from_str(json).map_err(|e| MemberError::InvalidJson(e.to_string()))?;
        validate_name(&parsed.name)?;
        validate_email(&parsed.email)?;

        let id: MemberId = parsed.id.parse()?;
        let key_bytes =
            hex::decode(&parsed.public_key).map_err(|e| MemberError::InvalidJson(e.to_string()))?;
        let public_key = PublicKey::from_slice(&key_bytes)
            .map_err(|e| MemberError::InvalidJson(e.to_string()))?;
        let voting_buffer = base64::decode(&parsed.voting_public_key)
            .map_err(|e| MemberError::InvalidJson(e.to_string()))?;
        let voting_public_key = IsolatedPublicKey::from_buffer(&voting_buffer)
            .map_err(|e| MemberError::InvalidJson(e.to_string()))?;

        Ok(Self {
            id,
            member_type: parsed.member_type,
            name: parsed.name,
            email: parsed.email,
            public_key,
            wallet: None,
            voting_public_key,
            voting_private_key: None,
            voting_key_bits: VOTING_KEY_BITS,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_BITS: u64 = 128;

    fn test_member() -> (BrightChainMember, bip39::Mnemonic) {
        BrightChainMember::create_with_voting_bits(
            MemberType::User,
            "Alice Example",
            "alice@example.com",
            TEST_BITS,
        )
        .unwrap()
    }

    #[test]
    fn test_create_validates_name() {
        for (name, expected) in [
            ("", MemberError::MissingMemberName),
            (" Alice", MemberError::InvalidMemberNameWhitespace),
            ("Alice ", MemberError::InvalidMemberNameWhitespace),
        ] {
            let err = BrightChainMember::create_with_voting_bits(
                MemberType::User,
                name,
                "a@example.com",
                TEST_BITS,
            )
            .unwrap_err();
            match err {
                BrightChainError::Member(inner) => assert_eq!(inner, expected, "name {:?}", name),
                other => panic!("unexpected error for {:?}: {:?}", name, other),
            }
        }
    }

    #[test]
    fn test_create_validates_email() {
        for email in ["", " a@b.com", "a@b.com ", "no-at-sign", "a@@b.com", "a@b", "a b@c.com", "a@.com"] {
            let err = BrightChainMember::create_with_voting_bits(
                MemberType::User,
                "Alice",
                email,
                TEST_BITS,
            )
            .unwrap_err();
            assert!(
                matches!(err, BrightChainError::Member(MemberError::InvalidEmail)),
                "email {:?}: {:?}",
                email,
                err
            );
        }
    }

    #[test]
    fn test_sign_verify() {
        let (member, _) = test_member();
        let sig = member.sign(b"hello").unwrap();
        assert!(member.verify(&sig, b"hello"));
        assert!(!member.verify(&sig, b"other"));
    }

    #[test]
    fn test_encrypt_decrypt_self() {
        let (member, _) = test_member();
        let envelope = member.encrypt_to_self(b"note to self").unwrap();
        assert_eq!(member.decrypt(&envelope).unwrap(), b"note to self");
    }

    #[test]
    fn test_multi_recipient_between_members() {
        let (alice, _) = test_member();
        let (bob, _) = BrightChainMember::create_with_voting_bits(
            MemberType::User,
            "Bob",
            "bob@example.com",
            TEST_BITS,
        )
        .unwrap();
        let recipients = vec![
            Recipient { id: alice.id(), public_key: *alice.public_key() },
            Recipient { id: bob.id(), public_key: *bob.public_key() },
        ];
        let envelope = alice.encrypt_for(&recipients, b"for both").unwrap();
        assert_eq!(alice.decrypt_multi(&envelope).unwrap(), b"for both");
        assert_eq!(bob.decrypt_multi(&envelope).unwrap(), b"for both");
    }

    #[test]
    fn test_unload_is_one_way() {
        let (mut member, _) = test_member();
        assert_eq!(member.key_status(), KeyStatus::HasPrivateKey);
        member.unload_wallet_and_private_key();
        assert_eq!(member.key_status(), KeyStatus::PublicOnly);
        assert!(matches!(
            member.sign(b"x"),
            Err(BrightChainError::Member(MemberError::MissingPrivateKey))
        ));
        assert!(member.voting_private_key().is_none());
    }

    #[test]
    fn test_load_wallet_round_trip() {
        let (mut member, mnemonic) = test_member();
        let sig_before = member.sign(b"stable").unwrap();
        member.unload_wallet_and_private_key();
        member.load_wallet(&mnemonic).unwrap();
        assert_eq!(member.key_status(), KeyStatus::HasPrivateKey);
        assert!(member.verify(&sig_before, b"stable"));
        assert!(member.voting_private_key().is_some());
    }

    #[test]
    fn test_load_wallet_rejects_foreign_mnemonic() {
        let (mut member, _) = test_member();
        let (_, other_mnemonic) = test_member();
        member.unload_wallet_and_private_key();
        assert!(matches!(
            member.load_wallet(&other_mnemonic).unwrap_err(),
            BrightChainError::Member(MemberError::InvalidMnemonic)
        ));
        assert_eq!(member.key_status(), KeyStatus::PublicOnly);
    }

    #[test]
    fn test_json_round_trip_is_public_only() {
        let (member, _) = test_member();
        let json = member.to_json().unwrap();
        let restored = BrightChainMember::from_json(&json).unwrap();

        assert_eq!(restored.id(), member.id());
        assert_eq!(restored.member_type(), MemberType::User);
        assert_eq!(restored.name(), member.name());
        assert_eq!(restored.email(), member.email());
        assert_eq!(restored.public_key(), member.public_key());
        assert_eq!(restored.key_status(), KeyStatus::PublicOnly);
        // same voting key material, fresh isolation instance
        assert_eq!(
            restored.voting_public_key().key_id(),
            member.voting_public_key().key_id()
        );
        assert_ne!(
            restored.voting_public_key().instance_id(),
            member.voting_public_key().instance_id()
        );
    }

    #[test]
    fn test_json_shape() {
        let (member, _) = test_member();
        let json = member.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(value.get("id").is_some());
        assert_eq!(value.get("type").unwrap(), "user");
        assert!(value.get("publicKey").unwrap().as_str().unwrap().starts_with("04"));
        assert!(value.get("votingPublicKey").is_some());
    }

    #[test]
    fn test_voting_tally_between_members() {
        let (member, _) = test_member();
        let public = member.voting_public_key();
        let c1 = public.encrypt(&10u32.into()).unwrap();
        let c2 = public.encrypt(&20u32.into()).unwrap();
        let sum = public.add(&c1, &c2).unwrap();
        let private = member.voting_private_key().unwrap();
        assert_eq!(private.decrypt(&sum).unwrap(), 30u32.into());
    }
}
