//! The host capability set the driver is built against (spec §6), shaped
//! as a single `async_trait` object the engine holds by `Arc`, the same way
//! the donor's `Consensus<N: GossipNetwork, S: Storage>` is generic over
//! its two host collaborators rather than hand-rolling callbacks.

use async_trait::async_trait;
use tendermint_core::{Block, Height, ValidatorId, ValidatorSet};
use tendermint_wire::{CommittedSeal, SignedConsensusMessage};

/// Everything the core needs from the outside world, collapsed into one
/// trait rather than the spec's eight separate capabilities: they are
/// always obtained together (one host implementation per node), so
/// splitting them into eight generic parameters would only cost call-site
/// clarity without buying independent substitutability.
#[async_trait]
pub trait ConsensusHost<B: Block>: Send + Sync {
    /// Pure lookup at a height boundary; never called mid-height.
    async fn validators(&self, height: Height) -> eyre::Result<ValidatorSet>;

    /// The chain head as of the last commit, and who proposed it — seeds
    /// `last_proposer` for the next height's round-robin schedule.
    async fn last_committed_block(&self) -> eyre::Result<(B, ValidatorId)>;

    /// Supplies the proposer's candidate block for `height`. May be slow
    /// (e.g. waiting on a mempool drain); the core suspends rather than
    /// blocking on it (spec §4.7).
    async fn next_candidate_block(&self, height: Height) -> eyre::Result<B>;

    /// Hands off a finalized block together with each committer's verified
    /// committed-seal, ready to be appended to the block header (spec §4.6:
    /// "append extracted committed-seals"). An error here is non-fatal to
    /// the core (spec §7 Host-transient): the driver logs it and leaves the
    /// state in `precommitDone`, per §9's design note.
    async fn commit(&self, block: B, committed_seals: Vec<(ValidatorId, CommittedSeal)>) -> eyre::Result<()>;

    /// Fire-and-forget delivery of a signed message to the whole validator
    /// set. Signing happens in the engine, using the locally held key, so
    /// this is pure transport (spec's Broadcast/Gossip capabilities, with
    /// Sign folded into the engine rather than kept as a ninth trait method
    /// — see DESIGN.md).
    async fn broadcast(&self, message: SignedConsensusMessage);

    /// Fire-and-forget delivery to the wider (non-validator) peer set.
    async fn gossip(&self, message: SignedConsensusMessage);

    /// Pushes all current-height messages to a peer that asked to sync.
    async fn sync_peer(&self, peer: ValidatorId, messages: Vec<SignedConsensusMessage>);
}
