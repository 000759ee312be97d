//! C4 — the snapshot of a single round (spec §3 `RoundState`).

use crate::types::{Block, Proposal, Step, View};
use crate::vote_set::VoteSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundState<B: Block> {
    pub view: View,
    pub step: Step,
    pub proposal: Option<Proposal<B>>,
    pub prevotes: VoteSet,
    pub precommits: VoteSet,
    /// Whether the prevote timeout has already been armed for this round
    /// (spec §4.6: "while prevote timeout not yet armed for (H, R)").
    pub prevote_timeout_armed: bool,
    /// Same for the precommit timeout.
    pub precommit_timeout_armed: bool,

    // Per-round flags from spec §3, "each reset on round change" — true
    // by construction here since a fresh `RoundState` is created per round.
    pub sent_proposal: bool,
    pub sent_prevote: bool,
    pub sent_precommit: bool,
    pub set_valid_round_and_value: bool,
}

impl<B: Block> RoundState<B> {
    pub fn new(view: View) -> Self {
        RoundState {
            view,
            step: Step::Propose,
            proposal: None,
            prevotes: VoteSet::new(),
            precommits: VoteSet::new(),
            prevote_timeout_armed: false,
            precommit_timeout_armed: false,
            sent_proposal: false,
            sent_prevote: false,
            sent_precommit: false,
            set_valid_round_and_value: false,
        }
    }
}
