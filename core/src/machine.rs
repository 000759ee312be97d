//! C7 — the Tendermint algorithm itself (spec §4.6).
//!
//! This is the pure transition function: `progress(state, input) ->
//! Outcome<B>`. It owns two responsibilities the spec keeps together under
//! C7: classifying an incoming event against the current view (the table in
//! §4.6), and, for events accepted for processing, running the numbered
//! rules. Matches the shape of the donor `vetomint` crate's
//! `progress(state, event) -> Option<Vec<Response>>`, generalized from
//! "`None` means not ready" into an explicit `Outcome` so the driver can
//! tell "drop" from "backlog" from "applied, here are the actions" without
//! re-deriving the classification itself.

use crate::error::ClassifiedError;
use crate::event::{Action, Input};
use crate::round_state::RoundState;
use crate::state::CoreState;
use crate::types::{Block, BlockHash, Round, Step, Timestamp, ValidatorId, View};

/// What happened to an `Input` fed into `progress`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<B: Block> {
    /// The event was accepted and these actions must be carried out.
    /// Empty is a valid and common outcome (spec §4.6: many rules only
    /// update bookkeeping).
    Applied(Vec<Action<B>>),
    /// The event is for a future height/round/step; the driver should
    /// park it in the backlog and re-present it after the next relevant
    /// step transition (spec §4.4). Carries the specific `Future*` reason
    /// so the driver never has to re-derive why it was parked.
    Backlog(ClassifiedError),
    /// The event was stale, malformed, or otherwise not actionable.
    Dropped(ClassifiedError),
}

/// A vote-shaped or proposal-shaped payload, stripped of its view, used
/// internally once the (height, round) relation has been resolved.
enum Payload<B: Block> {
    Proposal {
        block: B,
        valid_round: Option<Round>,
        proposer: ValidatorId,
    },
    Prevote {
        sender: ValidatorId,
        block_hash: Option<BlockHash>,
    },
    Precommit {
        sender: ValidatorId,
        block_hash: Option<BlockHash>,
    },
}

impl<B: Block> Payload<B> {
    fn inherent_step(&self) -> Step {
        match self {
            Payload::Proposal { .. } => Step::Propose,
            Payload::Prevote { .. } => Step::Prevote,
            Payload::Precommit { .. } => Step::Precommit,
        }
    }

    fn sender(&self) -> ValidatorId {
        match self {
            Payload::Proposal { proposer, .. } => *proposer,
            Payload::Prevote { sender, .. } => *sender,
            Payload::Precommit { sender, .. } => *sender,
        }
    }
}

/// Entry point: classify `input` against `state`'s current view and, if
/// accepted, run the corresponding transition rules.
pub fn progress<B: Block>(state: &mut CoreState<B>, input: Input<B>, time: Timestamp) -> Outcome<B> {
    match input {
        Input::StartHeight {
            height,
            validators,
            last_proposer,
            time,
        } => {
            state.enter_height(height, validators, last_proposer, time);
            Outcome::Applied(start_round(state, 0, time))
        }
        Input::BlockReady { height, block } => Outcome::Applied(handle_block_ready(state, height, block, time)),
        Input::TimeoutFired { kind, view } => handle_timeout(state, kind, view, time),
        Input::Proposal {
            view,
            block,
            valid_round,
            proposer,
            time,
        } => dispatch(
            state,
            view,
            Payload::Proposal {
                block,
                valid_round,
                proposer,
            },
            time,
        ),
        Input::Prevote {
            view,
            sender,
            block_hash,
        } => dispatch(state, view, Payload::Prevote { sender, block_hash }, time),
        Input::Precommit {
            view,
            sender,
            block_hash,
        } => dispatch(state, view, Payload::Precommit { sender, block_hash }, time),
    }
}

/// The classification table of spec §4.6.
fn dispatch<B: Block>(state: &mut CoreState<B>, view: View, payload: Payload<B>, time: Timestamp) -> Outcome<B> {
    let current = state.view();

    if view.height < current.height {
        return Outcome::Dropped(ClassifiedError::OldHeightMessage {
            current,
            message_height: view.height,
        });
    }
    if view.height > current.height {
        return Outcome::Backlog(ClassifiedError::FutureHeightMessage {
            current,
            message_height: view.height,
        });
    }
    // same height from here on.
    if view.round < current.round {
        return Outcome::Applied(apply_to_old_round(state, view.round, payload));
    }
    if view.round > current.round {
        return handle_future_round(state, view.round, payload, time);
    }
    // same (height, round); compare inherent step against current step.
    if payload.inherent_step().ordinal() > state.step().ordinal() {
        return Outcome::Backlog(ClassifiedError::FutureStepMessage {
            current,
            message_step: payload.inherent_step(),
        });
    }
    Outcome::Applied(apply_current_round_event(state, payload, time))
}

/// Rounds strictly behind the current one are archived read-only, except
/// that incoming votes still populate them so the vr-lookup rule (§4.6
/// rule 2) can later find evidence that a round once reached a prevote
/// quorum.
fn apply_to_old_round<B: Block>(state: &mut CoreState<B>, round: Round, payload: Payload<B>) -> Vec<Action<B>> {
    let Some(round_state) = state.old_round_states.get_mut(&round) else {
        return Vec::new();
    };
    let mut actions = match payload {
        Payload::Proposal {
            block,
            valid_round,
            proposer,
        } => {
            if round_state.proposal.is_none() {
                round_state.proposal = Some(crate::types::Proposal {
                    block,
                    valid_round,
                    proposer,
                });
            }
            Vec::new()
        }
        Payload::Prevote { sender, block_hash } => {
            match round_state.prevotes.add(sender, block_hash) {
                crate::vote_set::VoteOutcome::Equivocation { .. } => vec![Action::ViolationReport {
                    violator: sender,
                    description: "double prevote in a past round".to_string(),
                }],
                _ => Vec::new(),
            }
        }
        Payload::Precommit { sender, block_hash } => {
            match round_state.precommits.add(sender, block_hash) {
                crate::vote_set::VoteOutcome::Equivocation { .. } => vec![Action::ViolationReport {
                    violator: sender,
                    description: "double precommit in a past round".to_string(),
                }],
                _ => Vec::new(),
            }
        }
    };

    // A prevote just landed in `round`; if the current round's proposal is
    // a re-proposal citing `round` as its valid_round and is still waiting
    // on this exact evidence (rule 3), retry the prevote decision now.
    let waiting_on_this_round = state
        .current
        .proposal
        .as_ref()
        .map(|p| !state.current.sent_prevote && p.valid_round == Some(round))
        .unwrap_or(false);
    if waiting_on_this_round {
        actions.extend(try_cast_prevote_on_proposal(state, 0));
        actions.extend(try_prevote_quorum(state));
        actions.extend(try_precommit_quorum(state));
    }
    actions
}

/// Round-skip rule (spec §4.6): more than `f` messages from distinct
/// senders at a higher round triggers an immediate `startRound`.
fn handle_future_round<B: Block>(
    state: &mut CoreState<B>,
    round: Round,
    payload: Payload<B>,
    time: Timestamp,
) -> Outcome<B> {
    let sender = payload.sender();
    let senders = state.future_round_senders.entry(round).or_default();
    senders.insert(sender);
    let distinct = senders.len() as u64;
    let f = state.validators.byzantine_budget();

    if distinct > f {
        log::debug!(
            "round-skip: {distinct} distinct senders observed at round {round}, f={f}; jumping"
        );
        let mut actions = start_round(state, round, time);
        // The triggering message is now for the current round; apply it.
        actions.extend(apply_current_round_event(state, payload, time));
        Outcome::Applied(actions)
    } else {
        Outcome::Backlog(ClassifiedError::FutureRoundMessage {
            current: state.view(),
            message_round: round,
        })
    }
}

/// Applies a proposal/prevote/precommit that belongs to the *current*
/// round, regardless of whether its inherent step is behind the current
/// step (a "late" message, spec §4.6: "may enable rules above").
fn apply_current_round_event<B: Block>(state: &mut CoreState<B>, payload: Payload<B>, time: Timestamp) -> Vec<Action<B>> {
    match payload {
        Payload::Proposal {
            block,
            valid_round,
            proposer,
        } => apply_proposal(state, block, valid_round, proposer, time),
        Payload::Prevote { sender, block_hash } => apply_prevote(state, sender, block_hash, time),
        Payload::Precommit { sender, block_hash } => apply_precommit(state, sender, block_hash),
    }
}

/// Rules 2 and 3: store the proposal (at most one per round, spec §3) and,
/// while still in the propose step, vote on it.
fn apply_proposal<B: Block>(
    state: &mut CoreState<B>,
    block: B,
    valid_round: Option<Round>,
    proposer: ValidatorId,
    time: Timestamp,
) -> Vec<Action<B>> {
    if state.current.proposal.is_some() {
        return Vec::new();
    }
    let expected_proposer = state.validators.proposer(&state.last_proposer, state.current.view.round);
    if proposer != expected_proposer {
        log::debug!("dropping proposal from {proposer:?}, expected proposer {expected_proposer:?}");
        return Vec::new();
    }
    // Boundary behaviour (spec §8): a proposal whose valid_round equals
    // its own round is malformed.
    if let Some(vr) = valid_round {
        if vr >= state.current.view.round {
            log::debug!("dropping malformed proposal: valid_round {vr} >= own round");
            return Vec::new();
        }
    }
    state.current.proposal = Some(crate::types::Proposal {
        block,
        valid_round,
        proposer,
    });

    let mut actions = Vec::new();
    if state.current.step == Step::Propose {
        actions.extend(try_cast_prevote_on_proposal(state, time));
    }
    actions.extend(try_prevote_quorum(state));
    actions.extend(try_precommit_quorum(state));
    actions
}

/// Registers this node's own vote in its local vote set the moment it is
/// broadcast. Without this a lone validator (or any validator waiting on
/// its own ballot to help reach quorum) would never see its own ballot
/// counted, since nothing else delivers a node's own message back to it.
fn self_register_prevote<B: Block>(state: &mut CoreState<B>, hash: Option<BlockHash>) {
    if let Some(me) = state.this_node {
        if state.validators.contains(&me) {
            state.current.prevotes.add(me, hash);
        }
    }
}

fn self_register_precommit<B: Block>(state: &mut CoreState<B>, hash: Option<BlockHash>) {
    if let Some(me) = state.this_node {
        if state.validators.contains(&me) {
            state.current.precommits.add(me, hash);
        }
    }
}

/// Rule 2 (`valid_round = None`) and rule 3 (`valid_round = Some(vr)`):
/// decide which way to prevote on the round's proposal.
fn try_cast_prevote_on_proposal<B: Block>(state: &mut CoreState<B>, time: Timestamp) -> Vec<Action<B>> {
    let _ = time;
    if state.current.sent_prevote {
        return Vec::new();
    }
    let proposal = match &state.current.proposal {
        Some(p) => p.clone(),
        None => return Vec::new(),
    };
    let decision = match proposal.valid_round {
        None => {
            if state.locked_round.is_none() || state.locked_value.as_ref() == Some(&proposal.block) {
                Some(proposal.block.block_hash())
            } else {
                None
            }
        }
        Some(vr) => {
            let quorum = state.validators.quorum();
            let evidence = state
                .old_round_states
                .get(&vr)
                .map(|rs| rs.prevotes.count(proposal.block.block_hash()) >= quorum)
                .unwrap_or(false);
            if !evidence {
                // Wait for the evidence to arrive; re-evaluated from
                // `apply_to_old_round` once it does (see below).
                return Vec::new();
            }
            if state.locked_round.map_or(true, |lr| lr <= vr) || state.locked_value.as_ref() == Some(&proposal.block) {
                Some(proposal.block.block_hash())
            } else {
                None
            }
        }
    };
    state.current.sent_prevote = true;
    state.current.step = Step::Prevote;
    self_register_prevote(state, decision);
    vec![Action::BroadcastPrevote {
        view: state.current.view,
        block_hash: decision,
    }]
}

/// Rule: a prevote/precommit for the current round updates the vote set
/// and re-checks the quorum predicates.
fn apply_prevote<B: Block>(
    state: &mut CoreState<B>,
    sender: ValidatorId,
    block_hash: Option<BlockHash>,
    time: Timestamp,
) -> Vec<Action<B>> {
    use crate::vote_set::VoteOutcome;
    match state.current.prevotes.add(sender, block_hash) {
        VoteOutcome::Duplicate => Vec::new(),
        VoteOutcome::Equivocation { .. } => vec![Action::ViolationReport {
            violator: sender,
            description: "double prevote".to_string(),
        }],
        VoteOutcome::Added => {
            let _ = time;
            let mut actions = try_prevote_quorum(state);
            actions.extend(try_precommit_quorum(state));
            actions
        }
    }
}

fn apply_precommit<B: Block>(state: &mut CoreState<B>, sender: ValidatorId, block_hash: Option<BlockHash>) -> Vec<Action<B>> {
    use crate::vote_set::VoteOutcome;
    match state.current.precommits.add(sender, block_hash) {
        VoteOutcome::Duplicate => Vec::new(),
        VoteOutcome::Equivocation { .. } => vec![Action::ViolationReport {
            violator: sender,
            description: "double precommit".to_string(),
        }],
        VoteOutcome::Added => try_precommit_quorum(state),
    }
}

/// Rules 4 (valid-value update + conditional lock/precommit), 5 (nil
/// polka), and 6 (arm prevote timeout).
fn try_prevote_quorum<B: Block>(state: &mut CoreState<B>) -> Vec<Action<B>> {
    let quorum = state.validators.quorum();
    let mut actions = Vec::new();

    // Rule 6: arm once total prevotes reach quorum, any mix, while
    // step == prevote.
    if state.current.step == Step::Prevote && !state.current.prevote_timeout_armed {
        if state.current.prevotes.count_any() >= quorum {
            state.current.prevote_timeout_armed = true;
            actions.push(Action::ArmTimeout {
                kind: crate::types::TimeoutKind::Prevote,
                view: state.current.view,
            });
        }
    }

    // Rule 4: first receipt of >= Q prevotes for a concrete, known hash.
    if !state.current.set_valid_round_and_value {
        if let Some(Some(hash)) = state.current.prevotes.majority(quorum) {
            let known = state
                .current
                .proposal
                .as_ref()
                .map(|p| p.block.block_hash() == hash)
                .unwrap_or(false);
            if known {
                let block = state.current.proposal.as_ref().unwrap().block.clone();
                state.valid_round = Some(state.current.view.round);
                state.valid_value = Some(block.clone());
                state.current.set_valid_round_and_value = true;
                if state.current.step == Step::Prevote {
                    state.locked_round = Some(state.current.view.round);
                    state.locked_value = Some(block);
                    state.current.sent_precommit = true;
                    state.current.step = Step::Precommit;
                    self_register_precommit(state, Some(hash));
                    actions.push(Action::BroadcastPrecommit {
                        view: state.current.view,
                        block_hash: Some(hash),
                    });
                }
            }
        }
    }

    // Rule 5: nil polka.
    if state.current.step == Step::Prevote
        && !state.current.sent_precommit
        && state.current.prevotes.count_nil() >= quorum
    {
        state.current.sent_precommit = true;
        state.current.step = Step::Precommit;
        self_register_precommit(state, None);
        actions.push(Action::BroadcastPrecommit {
            view: state.current.view,
            block_hash: None,
        });
    }

    actions
}

/// Rules 8 (commit) and 9 (arm precommit timeout).
fn try_precommit_quorum<B: Block>(state: &mut CoreState<B>) -> Vec<Action<B>> {
    let quorum = state.validators.quorum();
    let mut actions = Vec::new();

    if state.current.step != Step::PrecommitDone {
        if let Some(Some(hash)) = state.current.precommits.majority(quorum) {
            let known_proposal = state
                .current
                .proposal
                .as_ref()
                .filter(|p| p.block.block_hash() == hash)
                .cloned();
            if let Some(proposal) = known_proposal {
                let committers = state.current.precommits.senders_for(hash);
                state.current.step = Step::PrecommitDone;
                actions.push(Action::Commit {
                    block: proposal.block,
                    committers,
                });
                return actions;
            }
        }
    }

    if state.current.step == Step::Precommit && !state.current.precommit_timeout_armed {
        if state.current.precommits.count_any() >= quorum {
            state.current.precommit_timeout_armed = true;
            actions.push(Action::ArmTimeout {
                kind: crate::types::TimeoutKind::Precommit,
                view: state.current.view,
            });
        }
    }

    actions
}

/// `startRound(R)` (spec §4.6).
fn start_round<B: Block>(state: &mut CoreState<B>, round: Round, time: Timestamp) -> Vec<Action<B>> {
    if state.current.view.height == state.height && state.current.view.round < round {
        let old = std::mem::replace(&mut state.current, RoundState::new(View::new(state.height, round)));
        state.old_round_states.insert(old.view.round, old);
    } else {
        state.current = RoundState::new(View::new(state.height, round));
    }
    state.awaiting_block_candidate = false;

    let proposer = state.validators.proposer(&state.last_proposer, round);
    let mut actions = Vec::new();

    if state.this_node == Some(proposer) {
        if let Some(valid_value) = state.valid_value.clone() {
            let valid_round = state.valid_round;
            state.current.sent_proposal = true;
            actions.push(Action::BroadcastProposal {
                view: state.current.view,
                block: valid_value.clone(),
                valid_round,
            });
            state.current.proposal = Some(crate::types::Proposal {
                block: valid_value,
                valid_round,
                proposer,
            });
            actions.extend(try_cast_prevote_on_proposal(state, time));
            actions.extend(try_prevote_quorum(state));
            actions.extend(try_precommit_quorum(state));
        } else if let Some(block) = state.pending_blocks.get(&state.height).cloned() {
            state.current.sent_proposal = true;
            actions.push(Action::BroadcastProposal {
                view: state.current.view,
                block: block.clone(),
                valid_round: None,
            });
            state.current.proposal = Some(crate::types::Proposal {
                block,
                valid_round: None,
                proposer,
            });
            actions.extend(try_cast_prevote_on_proposal(state, time));
            actions.extend(try_prevote_quorum(state));
            actions.extend(try_precommit_quorum(state));
        } else {
            state.awaiting_block_candidate = true;
            actions.push(Action::RequestBlockCandidate { height: state.height });
        }
    } else {
        actions.push(Action::ArmTimeout {
            kind: crate::types::TimeoutKind::Propose,
            view: state.current.view,
        });
    }
    actions
}

/// Resumes a proposer that suspended in `startRound` waiting for a block
/// candidate (spec §4.7).
fn handle_block_ready<B: Block>(state: &mut CoreState<B>, height: crate::types::Height, block: B, time: Timestamp) -> Vec<Action<B>> {
    state.supply_pending_block(height, block.clone());
    if state.height != height || !state.awaiting_block_candidate || state.current.step != Step::Propose {
        return Vec::new();
    }
    let proposer = state.validators.proposer(&state.last_proposer, state.current.view.round);
    if state.this_node != Some(proposer) {
        return Vec::new();
    }
    state.awaiting_block_candidate = false;
    state.current.sent_proposal = true;
    let mut actions = vec![Action::BroadcastProposal {
        view: state.current.view,
        block: block.clone(),
        valid_round: None,
    }];
    state.current.proposal = Some(crate::types::Proposal {
        block,
        valid_round: None,
        proposer,
    });
    actions.extend(try_cast_prevote_on_proposal(state, time));
    actions.extend(try_prevote_quorum(state));
    actions.extend(try_precommit_quorum(state));
    actions
}

/// Timeout firings (spec §4.5, §4.6). Stale (H, R) is a no-op.
fn handle_timeout<B: Block>(
    state: &mut CoreState<B>,
    kind: crate::types::TimeoutKind,
    view: View,
    time: Timestamp,
) -> Outcome<B> {
    if view != state.view() {
        return Outcome::Dropped(ClassifiedError::StaleTimeout {
            fired: view,
            current: state.view(),
        });
    }
    use crate::types::TimeoutKind::*;
    let actions = match kind {
        Propose => {
            if state.current.step == Step::Propose {
                state.current.sent_prevote = true;
                state.current.step = Step::Prevote;
                self_register_prevote(state, None);
                let mut actions = vec![Action::BroadcastPrevote {
                    view,
                    block_hash: None,
                }];
                actions.extend(try_prevote_quorum(state));
                actions.extend(try_precommit_quorum(state));
                actions
            } else {
                Vec::new()
            }
        }
        Prevote => {
            if state.current.step == Step::Prevote {
                state.current.sent_precommit = true;
                state.current.step = Step::Precommit;
                self_register_precommit(state, None);
                let mut actions = vec![Action::BroadcastPrecommit {
                    view,
                    block_hash: None,
                }];
                actions.extend(try_precommit_quorum(state));
                actions
            } else {
                Vec::new()
            }
        }
        Precommit => {
            if state.current.step == Step::Precommit {
                start_round(state, view.round + 1, time)
            } else {
                Vec::new()
            }
        }
    };
    Outcome::Applied(actions)
}
