//! Keypairs and the `ValidatorId` derivation, adapted from the donor
//! `simperby-core::crypto` module's `PublicKey`/`PrivateKey` but narrowed to
//! the uncompressed-key, Ethereum-style-address shape this consensus layer
//! uses instead of the donor's `HexSerializedBytes`-wrapped hex codec.

use crate::hash::keccak256;
use secp256k1::{PublicKey as SecpPublicKey, Secp256k1, SecretKey};
use tendermint_core::ValidatorId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid private key bytes")]
    InvalidPrivateKey,
    #[error("invalid public key bytes")]
    InvalidPublicKey,
}

/// An uncompressed secp256k1 public key (65 bytes, `0x04 || x || y`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicKey([u8; 65]);

impl PublicKey {
    pub fn from_uncompressed_bytes(bytes: [u8; 65]) -> Result<Self, KeyError> {
        SecpPublicKey::from_slice(&bytes).map_err(|_| KeyError::InvalidPublicKey)?;
        Ok(PublicKey(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 65] {
        &self.0
    }

    /// The low 20 bytes of `Keccak256(pubkey[1..])` — the standard
    /// Ethereum-style address derivation (spec §1's PoA/Autonity lineage).
    pub fn validator_id(&self) -> ValidatorId {
        let digest = keccak256(&self.0[1..]);
        let mut id = [0u8; 20];
        id.copy_from_slice(&digest[12..]);
        id
    }

    pub(crate) fn to_secp(self) -> SecpPublicKey {
        SecpPublicKey::from_slice(&self.0).expect("validated at construction")
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PrivateKey([u8; 32]);

impl PrivateKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, KeyError> {
        SecretKey::from_slice(&bytes).map_err(|_| KeyError::InvalidPrivateKey)?;
        Ok(PrivateKey(bytes))
    }

    pub fn public_key(&self) -> PublicKey {
        let secret = SecretKey::from_slice(&self.0).expect("validated at construction");
        let secp = Secp256k1::new();
        let public = secret.public_key(&secp);
        PublicKey(public.serialize_uncompressed())
    }

    pub(crate) fn to_secp(self) -> SecretKey {
        SecretKey::from_slice(&self.0).expect("validated at construction")
    }
}

/// Generates a fresh random keypair, for tests and standalone node setup.
pub fn generate_keypair() -> (PublicKey, PrivateKey) {
    use secp256k1::rand::SeedableRng;
    let mut rng = secp256k1::rand::rngs::StdRng::from_entropy();
    let secp = Secp256k1::new();
    let (secret, public) = secp.generate_keypair(&mut rng);
    (
        PublicKey(public.serialize_uncompressed()),
        PrivateKey(secret.secret_bytes()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validator_id_is_20_bytes_derived_from_the_public_key() {
        let (public, private) = generate_keypair();
        assert_eq!(public.0, private.public_key().0);
        let id = public.validator_id();
        assert_eq!(id.len(), 20);
    }

    #[test]
    fn distinct_keys_yield_distinct_validator_ids() {
        let (a, _) = generate_keypair();
        let (b, _) = generate_keypair();
        assert_ne!(a.validator_id(), b.validator_id());
    }
}
