//! The wire-level `ConsensusMessage` tagged union and its canonical signing
//! preimage, plus the `SignedConsensusMessage` envelope the driver consumes.
//!
//! Unlike the core's `Input::Proposal`, this type carries only a block
//! *hash* and an opaque payload for the proposer to gossip; it never carries
//! a materialized `B: Block`, since block bodies are a driver/host concern
//! the wire format doesn't need to be generic over.

use crate::keys::PublicKey;
use crate::signature::Signature;
use serde::{Deserialize, Serialize};
use tendermint_core::{BlockHash, ClassifiedError, Height, Round, ValidatorId};

/// `serde` only has built-in (de)serialization impls for fixed-size arrays
/// up to length 32, so the 65-byte signature fields below need a manual
/// impl to round-trip through `Serialize`/`Deserialize`.
mod serde_signature_bytes {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &[u8; 65], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        bytes.as_slice().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 65], D::Error>
    where
        D: Deserializer<'de>,
    {
        let vec = Vec::<u8>::deserialize(deserializer)?;
        <[u8; 65]>::try_from(vec)
            .map_err(|v| serde::de::Error::invalid_length(v.len(), &"65 bytes"))
    }
}

/// Tag byte distinguishing the three message kinds in the signing preimage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum MessageKind {
    Proposal = 0,
    Prevote = 1,
    Precommit = 2,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsensusMessage {
    Proposal {
        height: Height,
        round: Round,
        block_hash: BlockHash,
        valid_round: Option<Round>,
        /// Opaque block body, gossiped alongside the hash it seals.
        block_payload: Vec<u8>,
    },
    Prevote {
        height: Height,
        round: Round,
        block_hash: Option<BlockHash>,
    },
    Precommit {
        height: Height,
        round: Round,
        block_hash: Option<BlockHash>,
        /// The sender's seal over `block_hash`, checked independently of
        /// this envelope's own signature (§4.1 acceptance rule (d)). For a
        /// nil precommit there is no block to seal; the sender signs
        /// `NIL_COMMITTED_SEAL_HASH` instead and the seal goes unchecked.
        committed_seal: CommittedSeal,
    },
}

/// Sentinel block hash a nil precommit's committed seal is signed over,
/// since there is no real block to bind it to.
pub const NIL_COMMITTED_SEAL_HASH: BlockHash = [0u8; 32];

impl ConsensusMessage {
    fn kind(&self) -> MessageKind {
        match self {
            ConsensusMessage::Proposal { .. } => MessageKind::Proposal,
            ConsensusMessage::Prevote { .. } => MessageKind::Prevote,
            ConsensusMessage::Precommit { .. } => MessageKind::Precommit,
        }
    }

    fn view(&self) -> (Height, Round) {
        match self {
            ConsensusMessage::Proposal { height, round, .. }
            | ConsensusMessage::Prevote { height, round, .. }
            | ConsensusMessage::Precommit { height, round, .. } => (*height, *round),
        }
    }

    /// The payload portion of the preimage: for votes, the optional block
    /// hash (absent means nil); for proposals, the sealed hash and the
    /// valid-round evidence, but never the gossiped body bytes — a proposer
    /// re-sending the same proposal produces the same signature.
    fn payload(&self) -> Vec<u8> {
        match self {
            ConsensusMessage::Proposal {
                block_hash,
                valid_round,
                ..
            } => {
                let mut buf = Vec::with_capacity(37);
                buf.extend_from_slice(block_hash);
                match valid_round {
                    Some(vr) => {
                        buf.push(1);
                        buf.extend_from_slice(&vr.to_be_bytes());
                    }
                    None => buf.push(0),
                }
                buf
            }
            ConsensusMessage::Prevote { block_hash, .. }
            | ConsensusMessage::Precommit { block_hash, .. } => match block_hash {
                Some(hash) => {
                    let mut buf = Vec::with_capacity(33);
                    buf.push(1);
                    buf.extend_from_slice(hash);
                    buf
                }
                None => vec![0],
            },
        }
    }

    /// `tag || height_be(u64) || round_be(u64) || payload`, per the
    /// canonical signing preimage contract: round is widened to 64 bits on
    /// the wire even though `core::Round` is a 32-bit counter in memory.
    fn signing_preimage(&self) -> Vec<u8> {
        let (height, round) = self.view();
        let payload = self.payload();
        let mut buf = Vec::with_capacity(1 + 8 + 8 + payload.len());
        buf.push(self.kind() as u8);
        buf.extend_from_slice(&height.to_be_bytes());
        buf.extend_from_slice(&(round as u64).to_be_bytes());
        buf.extend_from_slice(&payload);
        buf
    }
}

/// Tag byte for the committed-seal preimage, distinct from the three
/// `MessageKind` tags used during voting.
const COMMITTED_SEAL_TAG: u8 = 0xFF;

/// The committed-seal preimage: `block_hash || tag_precommit`, signed
/// separately from ordinary precommit votes once a block actually commits
/// (§6's "Precommit committed-seal is signed separately over `block_hash ||
/// tag_precommit`").
pub fn committed_seal_preimage(block_hash: &BlockHash) -> Vec<u8> {
    let mut buf = Vec::with_capacity(33);
    buf.extend_from_slice(block_hash);
    buf.push(COMMITTED_SEAL_TAG);
    buf
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedConsensusMessage {
    pub message: ConsensusMessage,
    #[serde(with = "serde_signature_bytes")]
    signature_bytes: [u8; 65],
}

impl SignedConsensusMessage {
    pub fn sign(message: ConsensusMessage, key: &crate::keys::PrivateKey) -> Self {
        let hash = crate::hash::keccak256(message.signing_preimage());
        let signature = Signature::sign(hash, key);
        SignedConsensusMessage {
            message,
            signature_bytes: *signature.as_bytes(),
        }
    }

    /// Recovers and authenticates the sender, returning the core's own
    /// `Malformed` variant on any failure so the driver needs no second
    /// error-mapping layer between this crate and `tendermint-core`.
    pub fn verify_and_recover(&self) -> Result<ValidatorId, ClassifiedError> {
        let hash = crate::hash::keccak256(self.message.signing_preimage());
        let signature = Signature::from_bytes(self.signature_bytes);
        let public_key: PublicKey = signature
            .recover(hash)
            .map_err(|e| ClassifiedError::Malformed(format!("signature recovery failed: {e}")))?;
        Ok(public_key.validator_id())
    }
}

/// A seal signature: a committer's attestation that a specific block
/// committed, kept separate from its precommit vote signature so a
/// `FinalizationProof`-style bundle (spec §6) can be assembled after the
/// fact from only the committers' seals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommittedSeal {
    #[serde(with = "serde_signature_bytes")]
    signature_bytes: [u8; 65],
}

impl CommittedSeal {
    pub fn sign(block_hash: &BlockHash, key: &crate::keys::PrivateKey) -> Self {
        let hash = crate::hash::keccak256(committed_seal_preimage(block_hash));
        let signature = Signature::sign(hash, key);
        CommittedSeal {
            signature_bytes: *signature.as_bytes(),
        }
    }

    pub fn verify_and_recover(&self, block_hash: &BlockHash) -> Result<ValidatorId, ClassifiedError> {
        let hash = crate::hash::keccak256(committed_seal_preimage(block_hash));
        let signature = Signature::from_bytes(self.signature_bytes);
        let public_key: PublicKey = signature
            .recover(hash)
            .map_err(|e| ClassifiedError::Malformed(format!("seal recovery failed: {e}")))?;
        Ok(public_key.validator_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::generate_keypair;

    #[test]
    fn signed_prevote_round_trips_sign_and_recover() {
        let (public, private) = generate_keypair();
        let message = ConsensusMessage::Prevote {
            height: 10,
            round: 2,
            block_hash: Some([9u8; 32]),
        };
        let signed = SignedConsensusMessage::sign(message, &private);
        let sender = signed.verify_and_recover().expect("should authenticate");
        assert_eq!(sender, public.validator_id());
    }

    #[test]
    fn tampering_with_the_message_breaks_recovery_of_the_same_sender() {
        let (public, private) = generate_keypair();
        let message = ConsensusMessage::Precommit {
            height: 10,
            round: 2,
            block_hash: None,
            committed_seal: CommittedSeal::sign(&NIL_COMMITTED_SEAL_HASH, &private),
        };
        let mut signed = SignedConsensusMessage::sign(message, &private);
        signed.message = ConsensusMessage::Precommit {
            height: 10,
            round: 2,
            block_hash: Some([1u8; 32]),
            committed_seal: CommittedSeal::sign(&[1u8; 32], &private),
        };
        let sender = signed.verify_and_recover().expect("recovery still succeeds");
        assert_ne!(sender, public.validator_id());
    }

    #[test]
    fn proposal_preimage_ignores_the_gossiped_body_bytes() {
        let (_, private) = generate_keypair();
        let base = ConsensusMessage::Proposal {
            height: 1,
            round: 0,
            block_hash: [4u8; 32],
            valid_round: None,
            block_payload: vec![1, 2, 3],
        };
        let ConsensusMessage::Proposal {
            height,
            round,
            block_hash,
            valid_round,
            ..
        } = base.clone()
        else {
            unreachable!("base is a Proposal");
        };
        let reproposed = ConsensusMessage::Proposal {
            height,
            round,
            block_hash,
            valid_round,
            block_payload: vec![9, 9, 9, 9],
        };
        assert_eq!(base.signing_preimage(), reproposed.signing_preimage());
        let _ = SignedConsensusMessage::sign(base, &private);
    }

    #[test]
    fn precommit_envelope_preimage_is_independent_of_the_committed_seal_bytes() {
        let (_, private) = generate_keypair();
        let block_hash = [7u8; 32];
        let base = ConsensusMessage::Precommit {
            height: 3,
            round: 1,
            block_hash: Some(block_hash),
            committed_seal: CommittedSeal::sign(&block_hash, &private),
        };
        let ConsensusMessage::Precommit {
            height,
            round,
            block_hash: resealed_block_hash,
            ..
        } = base.clone()
        else {
            unreachable!("base is a Precommit");
        };
        let resealed = ConsensusMessage::Precommit {
            height,
            round,
            block_hash: resealed_block_hash,
            committed_seal: CommittedSeal::sign(&block_hash, &private),
        };
        assert_eq!(base.signing_preimage(), resealed.signing_preimage());
    }

    #[test]
    fn committed_seal_round_trips_and_binds_to_its_block_hash() {
        let (public, private) = generate_keypair();
        let block_hash = [5u8; 32];
        let seal = CommittedSeal::sign(&block_hash, &private);
        let sender = seal.verify_and_recover(&block_hash).expect("should authenticate");
        assert_eq!(sender, public.validator_id());

        let other_hash = [6u8; 32];
        let wrong_sender = seal.verify_and_recover(&other_hash).expect("recovery still succeeds");
        assert_ne!(wrong_sender, public.validator_id());
    }
}
