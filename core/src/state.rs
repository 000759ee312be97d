//! `CoreState` — the singleton per-node-per-live-height state (spec §3).

use crate::round_state::RoundState;
use crate::types::{Block, Height, Round, Step, Timestamp, ValidatorId, View};
use crate::validator_set::ValidatorSet;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreState<B: Block> {
    pub(crate) validators: ValidatorSet,
    pub(crate) last_proposer: ValidatorId,

    pub(crate) height: Height,
    pub(crate) locked_round: Option<Round>,
    pub(crate) locked_value: Option<B>,
    pub(crate) valid_round: Option<Round>,
    pub(crate) valid_value: Option<B>,

    pub(crate) current: RoundState<B>,
    /// Rounds strictly less than `current.view.round`, same height. Kept
    /// read-only once superseded (spec §3 invariant) except for the
    /// vr-lookup rule, which only ever reads them.
    pub(crate) old_round_states: BTreeMap<Round, RoundState<B>>,

    /// Distinct senders seen at each future round, for the round-skip rule
    /// (spec §4.6, §3 `futureRoundsMsgCount`).
    pub(crate) future_round_senders: BTreeMap<Round, BTreeSet<ValidatorId>>,

    /// Proposer-side supply of candidate blocks, keyed by height (spec §4.7).
    pub(crate) pending_blocks: BTreeMap<Height, B>,

    /// Set once the propose-step proposer is waiting on a candidate block
    /// (spec §4.7 cooperative suspension). Cleared on the next `startRound`.
    pub(crate) awaiting_block_candidate: bool,

    pub(crate) this_node: Option<ValidatorId>,
}

impl<B: Block> CoreState<B> {
    pub fn new(
        height: Height,
        validators: ValidatorSet,
        last_proposer: ValidatorId,
        this_node: Option<ValidatorId>,
    ) -> Self {
        CoreState {
            validators,
            last_proposer,
            height,
            locked_round: None,
            locked_value: None,
            valid_round: None,
            valid_value: None,
            current: RoundState::new(View::new(height, 0)),
            old_round_states: BTreeMap::new(),
            future_round_senders: BTreeMap::new(),
            pending_blocks: BTreeMap::new(),
            awaiting_block_candidate: false,
            this_node,
        }
    }

    pub fn view(&self) -> View {
        self.current.view
    }

    pub fn height(&self) -> Height {
        self.height
    }

    pub fn round(&self) -> Round {
        self.current.view.round
    }

    pub fn step(&self) -> Step {
        self.current.step
    }

    pub fn validators(&self) -> &ValidatorSet {
        &self.validators
    }

    pub fn is_validator(&self, id: &ValidatorId) -> bool {
        self.validators.contains(id)
    }

    /// Snapshot of the accepted proposal/vote messages at the current
    /// height, for answering sync queries (spec §6 `CurrentHeightMessages`).
    /// Read-only; does not mutate state.
    pub fn current_round_state(&self) -> &RoundState<B> {
        &self.current
    }

    pub fn old_round_state(&self, round: Round) -> Option<&RoundState<B>> {
        self.old_round_states.get(&round)
    }

    pub fn locked_value(&self) -> Option<&B> {
        self.locked_value.as_ref()
    }

    pub fn valid_value(&self) -> Option<&B> {
        self.valid_value.as_ref()
    }

    pub fn supply_pending_block(&mut self, height: Height, block: B) {
        self.pending_blocks.insert(height, block);
    }

    /// Resets the height-scoped fields on entering a new height (spec §3
    /// Lifecycle). Round-scoped fields are reset separately by
    /// `start_round` in `machine.rs`.
    pub(crate) fn enter_height(
        &mut self,
        height: Height,
        validators: ValidatorSet,
        last_proposer: ValidatorId,
        time: Timestamp,
    ) {
        self.height = height;
        self.validators = validators;
        self.last_proposer = last_proposer;
        self.locked_round = None;
        self.locked_value = None;
        self.valid_round = None;
        self.valid_value = None;
        self.old_round_states.clear();
        self.future_round_senders.clear();
        self.current = RoundState::new(View::new(height, 0));
        self.awaiting_block_candidate = false;
        let _ = time;
    }
}
