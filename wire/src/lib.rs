//! Message envelope, hashing, and signature codec for the consensus core.
//!
//! This crate sits between `tendermint-core` (pure state machine, no
//! cryptography) and `tendermint-driver` (I/O): it turns signed bytes off
//! the wire into authenticated `ValidatorId`s the core can trust, and turns
//! the core's broadcast actions into bytes worth signing and sending.

pub mod hash;
pub mod keys;
pub mod message;
pub mod signature;

pub use hash::keccak256;
pub use keys::{generate_keypair, KeyError, PrivateKey, PublicKey};
pub use message::{
    committed_seal_preimage, CommittedSeal, ConsensusMessage, SignedConsensusMessage, NIL_COMMITTED_SEAL_HASH,
};
pub use signature::Signature;
