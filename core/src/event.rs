//! Inputs consumed by, and actions emitted from, the state machine.
//!
//! These are the language-neutral "events"/"responses" of the donor
//! `vetomint` crate (`ConsensusEvent`/`ConsensusResponse`), adapted to
//! carry real `Block` values and `ValidatorId`s instead of opaque indices,
//! since this core is the thing that owns signature-authenticated identity
//! (the indices in the donor exist only because its lower layer maps real
//! keys to per-height indices one level further down).

use crate::types::{Block, BlockHash, Height, Round, Timestamp, TimeoutKind, ValidatorId, View};

/// An input that may trigger a state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input<B: Block> {
    /// Begin consensus for `height`, with `validators` fixed for its
    /// duration and `last_proposer` used to seed round-robin selection.
    StartHeight {
        height: Height,
        validators: crate::validator_set::ValidatorSet,
        last_proposer: ValidatorId,
        time: Timestamp,
    },
    /// An authenticated proposal.
    Proposal {
        view: View,
        block: B,
        valid_round: Option<Round>,
        proposer: ValidatorId,
        time: Timestamp,
    },
    /// An authenticated prevote. `block_hash = None` means NIL.
    Prevote {
        view: View,
        sender: ValidatorId,
        block_hash: Option<BlockHash>,
    },
    /// An authenticated precommit. `block_hash = None` means NIL.
    Precommit {
        view: View,
        sender: ValidatorId,
        block_hash: Option<BlockHash>,
    },
    /// A previously armed timer fired.
    TimeoutFired { kind: TimeoutKind, view: View },
    /// The host supplied (or updated) the block candidate for `height`,
    /// satisfying the suspension described in spec §4.7.
    BlockReady { height: Height, block: B },
}

impl<B: Block> Input<B> {
    /// The view this input pertains to, if it has one. `StartHeight` and
    /// `BlockReady` do not carry a definite (H, R) to classify against.
    pub fn view(&self) -> Option<View> {
        match self {
            Input::StartHeight { .. } => None,
            Input::Proposal { view, .. } => Some(*view),
            Input::Prevote { view, .. } => Some(*view),
            Input::Precommit { view, .. } => Some(*view),
            Input::TimeoutFired { view, .. } => Some(*view),
            Input::BlockReady { .. } => None,
        }
    }
}

/// An action the driver must carry out. The core never performs I/O
/// itself; every side effect crosses this boundary (spec §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action<B: Block> {
    BroadcastProposal {
        view: View,
        block: B,
        valid_round: Option<Round>,
    },
    BroadcastPrevote {
        view: View,
        block_hash: Option<BlockHash>,
    },
    BroadcastPrecommit {
        view: View,
        block_hash: Option<BlockHash>,
    },
    /// Arm one of the three round-scoped timers for `view`.
    ArmTimeout { kind: TimeoutKind, view: View },
    /// Ask the host for the next candidate block for `height` (the
    /// suspension point of spec §4.7); the host replies asynchronously
    /// with `Input::BlockReady`.
    RequestBlockCandidate { height: Height },
    /// Hand a finalized block to the external executor.
    Commit { block: B, committers: Vec<ValidatorId> },
    /// Surface Byzantine behavior without taking any enforcement action
    /// (evidence/slashing itself is an explicit Non-goal, spec §1).
    ViolationReport { violator: ValidatorId, description: String },
}
