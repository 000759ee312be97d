//! Primitive types shared by every module of the core.
//!
//! None of these carry cryptographic material: signature verification and
//! sender recovery happen in `tendermint-wire`, one layer below the driver
//! that owns this crate. By the time anything here sees a `ValidatorId` it
//! has already been authenticated.

use std::cmp::Ordering;
use std::fmt;

/// Monotonically increasing index of the block being agreed upon.
pub type Height = u64;

/// Attempt number within a height, reset to zero on every height change.
pub type Round = u32;

/// Milliseconds since the UNIX epoch, supplied by the host so that the core
/// never calls a wall-clock API itself (keeps `progress` pure).
pub type Timestamp = i64;

/// 20-byte validator address (low 20 bytes of `Keccak256(pubkey)`, the same
/// derivation `tendermint-wire` uses).
pub type ValidatorId = [u8; 20];

/// 32-byte block hash.
pub type BlockHash = [u8; 32];

/// Phase within a round. `PrecommitDone` is a terminal phase entered on
/// commit; the only way out of it is `startRound` for the next height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum Step {
    Propose,
    Prevote,
    Precommit,
    PrecommitDone,
}

impl Step {
    /// Ordinal used for backlog ordering and the "past/future step" table
    /// in the classification rules (spec §4.6).
    pub fn ordinal(self) -> u8 {
        match self {
            Step::Propose => 0,
            Step::Prevote => 1,
            Step::Precommit => 2,
            Step::PrecommitDone => 3,
        }
    }
}

/// A `(height, round)` pair, totally ordered lexicographically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct View {
    pub height: Height,
    pub round: Round,
}

impl View {
    pub fn new(height: Height, round: Round) -> Self {
        View { height, round }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(H={}, R={})", self.height, self.round)
    }
}

impl PartialOrd for View {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for View {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.height, self.round).cmp(&(other.height, other.round))
    }
}

/// A value the core reaches agreement on. The core never inspects the
/// contents beyond its hash and stake-relevant fields (proposer, seals);
/// block execution, serialization, and storage are host concerns (spec §1).
pub trait Block: Clone + fmt::Debug + PartialEq + Eq {
    fn block_hash(&self) -> BlockHash;
}

/// Which of the three round-scoped timers (spec §4.5) an event pertains to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum TimeoutKind {
    Propose,
    Prevote,
    Precommit,
}

/// A proposal accepted into a round: the carried block plus the valid-round
/// evidence the proposer claims backs a re-proposal (§4.6 rule 2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal<B: Block> {
    pub block: B,
    pub valid_round: Option<Round>,
    pub proposer: ValidatorId,
}
