//! Recoverable ECDSA over secp256k1, in the donor `crypto::Signature`'s
//! compact-plus-recovery-byte shape: `r || s || v` with the EVM convention
//! of offsetting the recovery id by 27 rather than storing it bare.

use crate::keys::{PrivateKey, PublicKey};
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, Secp256k1};

/// Offset applied to the raw 0/1 recovery id, matching the convention used
/// by EVM-style signers (and the donor crate's own `crypto.rs`).
const EVM_EC_RECOVERY_OFFSET: u8 = 27;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature([u8; 65]);

impl Signature {
    pub fn from_bytes(bytes: [u8; 65]) -> Self {
        Signature(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 65] {
        &self.0
    }

    pub fn sign(hash: [u8; 32], key: &PrivateKey) -> Self {
        let secp = Secp256k1::signing_only();
        let message = Message::from_slice(&hash).expect("hash is exactly 32 bytes");
        let recoverable = secp.sign_ecdsa_recoverable(&message, &key.to_secp());
        let (recovery_id, compact) = recoverable.serialize_compact();
        let mut bytes = [0u8; 65];
        bytes[..64].copy_from_slice(&compact);
        bytes[64] = recovery_id.to_i32() as u8 + EVM_EC_RECOVERY_OFFSET;
        Signature(bytes)
    }

    /// Recovers the signer's public key from the hash it signed. This is
    /// the crate's only authentication primitive: a recovered key that maps
    /// to the expected `ValidatorId` *is* the proof of origin, so there is
    /// no separate `verify(pubkey, sig)` path to keep in sync with it.
    pub fn recover(&self, hash: [u8; 32]) -> Result<PublicKey, String> {
        if self.0[64] < EVM_EC_RECOVERY_OFFSET {
            return Err("recovery byte below EVM offset".to_string());
        }
        let raw_id = (self.0[64] - EVM_EC_RECOVERY_OFFSET) as i32;
        let recovery_id = RecoveryId::from_i32(raw_id).map_err(|e| e.to_string())?;
        let recoverable = RecoverableSignature::from_compact(&self.0[..64], recovery_id)
            .map_err(|e| e.to_string())?;
        let message = Message::from_slice(&hash).expect("hash is exactly 32 bytes");
        let secp = Secp256k1::verification_only();
        let recovered = secp
            .recover_ecdsa(&message, &recoverable)
            .map_err(|e| e.to_string())?;
        PublicKey::from_uncompressed_bytes(recovered.serialize_uncompressed())
            .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::keccak256;
    use crate::keys::generate_keypair;

    #[test]
    fn sign_then_recover_round_trips_to_the_same_public_key() {
        let (public, private) = generate_keypair();
        let hash = keccak256(b"a proposal worth signing");
        let signature = Signature::sign(hash, &private);
        let recovered = signature.recover(hash).expect("recovery should succeed");
        assert_eq!(recovered, public);
    }

    #[test]
    fn recovery_against_a_different_hash_yields_a_different_key() {
        let (_, private) = generate_keypair();
        let hash = keccak256(b"one message");
        let other_hash = keccak256(b"a different message");
        let signature = Signature::sign(hash, &private);
        let recovered = signature.recover(other_hash).expect("recovery still succeeds");
        assert_ne!(recovered, private.public_key());
    }
}
