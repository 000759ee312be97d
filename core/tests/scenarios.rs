//! End-to-end scenarios driven directly against `CoreState`/`progress`,
//! one node's view at a time (mirrors the donor `vetomint` crate's
//! `test_suite1.rs`, adapted to feed in the other validators' authenticated
//! messages explicitly rather than running several `Vetomint` instances in
//! lockstep — the core here has no notion of "this node" sending itself
//! messages over a wire, so a single-node perspective is sufficient to
//! exercise every rule).

use tendermint_core::{
    progress, Action, Block, BlockHash, ClassifiedError, CoreState, Input, Outcome, TimeoutKind, ValidatorId,
    ValidatorSet, View,
};

#[derive(Debug, Clone, PartialEq, Eq)]
struct TestBlock(u64);

impl Block for TestBlock {
    fn block_hash(&self) -> BlockHash {
        let mut h = [0u8; 32];
        h[..8].copy_from_slice(&self.0.to_be_bytes());
        h
    }
}

fn addr(b: u8) -> ValidatorId {
    [b; 20]
}

fn four_validators() -> ValidatorSet {
    ValidatorSet::new(vec![addr(1), addr(2), addr(3), addr(4)])
}

fn start_as_proposer(node: ValidatorId, validators: ValidatorSet) -> CoreState<TestBlock> {
    let mut state = CoreState::new(0, validators.clone(), addr(4), Some(node));
    let outcome = progress(
        &mut state,
        Input::StartHeight {
            height: 0,
            validators,
            last_proposer: addr(4),
            time: 0,
        },
        0,
    );
    match outcome {
        Outcome::Applied(actions) => {
            assert!(!actions.is_empty());
        }
        other => panic!("expected Applied, got {other:?}"),
    }
    state
}

fn apply(state: &mut CoreState<TestBlock>, input: Input<TestBlock>) -> Vec<Action<TestBlock>> {
    match progress(state, input, 0) {
        Outcome::Applied(actions) => actions,
        other => panic!("expected Applied, got {other:?}"),
    }
}

#[test]
fn happy_path_commit() {
    let validators = four_validators();
    // addr(1) is proposer for round 0 given last_proposer = addr(4).
    let mut state = start_as_proposer(addr(1), validators);
    assert_eq!(state.round(), 0);

    let view = View::new(0, 0);
    let block = TestBlock(7);

    // addr(1) had no candidate block at `startRound`; supplying one now
    // triggers its proposal and self-prevote (count = 1).
    let resumed = apply(&mut state, Input::BlockReady { height: 0, block: block.clone() });
    assert!(resumed
        .iter()
        .any(|a| matches!(a, Action::BroadcastProposal { .. })));

    // One more prevote (count = 2) is still short of the quorum of 3.
    let actions = apply(
        &mut state,
        Input::Prevote {
            view,
            sender: addr(2),
            block_hash: Some(block.block_hash()),
        },
    );
    assert!(actions.is_empty(), "not yet at quorum: {actions:?}");

    // The third prevote (count = 3) reaches quorum and should precommit.
    let actions = apply(
        &mut state,
        Input::Prevote {
            view,
            sender: addr(3),
            block_hash: Some(block.block_hash()),
        },
    );
    assert!(actions.contains(&Action::BroadcastPrecommit {
        view,
        block_hash: Some(block.block_hash()),
    }));
    assert_eq!(state.locked_value(), Some(&block));

    // A fourth, late prevote is just bookkeeping now.
    let actions = apply(
        &mut state,
        Input::Prevote {
            view,
            sender: addr(4),
            block_hash: Some(block.block_hash()),
        },
    );
    assert!(actions.is_empty());

    // This node (addr(1)) self-registered its own precommit when rule 4
    // fired above, so only two more are needed to reach quorum.
    let actions = apply(
        &mut state,
        Input::Precommit {
            view,
            sender: addr(2),
            block_hash: Some(block.block_hash()),
        },
    );
    assert!(actions.is_empty());
    let actions = apply(
        &mut state,
        Input::Precommit {
            view,
            sender: addr(3),
            block_hash: Some(block.block_hash()),
        },
    );
    match &actions[..] {
        [Action::Commit { block: committed, committers }] => {
            assert_eq!(committed, &block);
            assert_eq!(committers.len(), 3);
        }
        other => panic!("expected a single Commit action, got {other:?}"),
    }

    // A fourth, late precommit is a no-op; the round is already done.
    let actions = apply(
        &mut state,
        Input::Precommit {
            view,
            sender: addr(4),
            block_hash: Some(block.block_hash()),
        },
    );
    assert!(actions.is_empty());
}

#[test]
fn nil_prevote_quorum_moves_to_nil_precommit() {
    let validators = four_validators();
    // addr(1) is round-0 proposer (last_proposer = addr(4)); addr(2) is a
    // plain validator watching the round from the outside. Its propose
    // timeout fires first, moving it into the prevote step (self-registers
    // its own nil prevote, count = 1) — the nil-polka rule only reacts to
    // prevotes while the node is itself in the prevote step.
    let mut state = start_as_proposer(addr(2), validators);
    let view = View::new(0, 0);
    assert_eq!(state.step(), tendermint_core::Step::Propose);
    apply(
        &mut state,
        Input::TimeoutFired {
            kind: TimeoutKind::Propose,
            view,
        },
    );
    assert_eq!(state.step(), tendermint_core::Step::Prevote);

    let actions = apply(
        &mut state,
        Input::Prevote {
            view,
            sender: addr(3),
            block_hash: None,
        },
    );
    assert!(actions.is_empty(), "only 2 of 3 needed so far: {actions:?}");

    let actions = apply(
        &mut state,
        Input::Prevote {
            view,
            sender: addr(4),
            block_hash: None,
        },
    );
    assert!(actions.iter().any(|a| matches!(
        a,
        Action::BroadcastPrecommit {
            block_hash: None,
            ..
        }
    )));
}

#[test]
fn propose_timeout_with_no_proposal_casts_nil_prevote() {
    let validators = four_validators();
    let mut state = start_as_proposer(addr(2), validators);
    let view = View::new(0, 0);
    assert_eq!(state.step(), tendermint_core::Step::Propose);

    let actions = apply(
        &mut state,
        Input::TimeoutFired {
            kind: TimeoutKind::Propose,
            view,
        },
    );
    assert_eq!(
        actions,
        vec![Action::BroadcastPrevote {
            view,
            block_hash: None,
        }]
    );
    assert_eq!(state.step(), tendermint_core::Step::Prevote);
}

#[test]
fn lock_carries_across_a_round_skip() {
    let validators = four_validators();
    let mut state = start_as_proposer(addr(1), validators);
    let r0 = View::new(0, 0);
    let block = TestBlock(1);

    // addr(1) is the proposer but had no candidate block at `startRound`;
    // supplying one now resumes the suspended proposal (spec §4.7) and
    // self-registers addr(1)'s own prevote.
    let resumed = apply(&mut state, Input::BlockReady { height: 0, block: block.clone() });
    assert!(resumed
        .iter()
        .any(|a| matches!(a, Action::BroadcastProposal { .. })));

    // One more prevote (count = 2, self already counts as 1) is still
    // short of quorum.
    let actions = apply(
        &mut state,
        Input::Prevote {
            view: r0,
            sender: addr(2),
            block_hash: Some(block.block_hash()),
        },
    );
    assert!(actions.is_empty());

    // The second external prevote (count = 3) reaches quorum.
    apply(
        &mut state,
        Input::Prevote {
            view: r0,
            sender: addr(3),
            block_hash: Some(block.block_hash()),
        },
    );
    assert_eq!(state.locked_value(), Some(&block));
    assert_eq!(state.valid_value(), Some(&block));

    // Round 1 never reaches a precommit quorum: nobody commits, and the
    // precommit timeout at round 0 expires, advancing to round 1.
    apply(
        &mut state,
        Input::TimeoutFired {
            kind: TimeoutKind::Precommit,
            view: r0,
        },
    );
    assert_eq!(state.round(), 1);
    // The lock must survive the round change.
    assert_eq!(state.locked_value(), Some(&block));
}

#[test]
fn round_skip_triggers_once_over_byzantine_budget() {
    let validators = four_validators();
    let mut state = start_as_proposer(addr(2), validators); // f=1
    let future = View::new(0, 3);

    let outcome = progress(
        &mut state,
        Input::Prevote {
            view: future,
            sender: addr(3),
            block_hash: None,
        },
        0,
    );
    match outcome {
        Outcome::Backlog(ClassifiedError::FutureRoundMessage { message_round, .. }) => {
            assert_eq!(message_round, future.round);
        }
        other => panic!("expected a future-round Backlog outcome, got {other:?}"),
    }
    assert_eq!(state.round(), 0);

    // A second distinct sender at the future round exceeds f=1 and
    // triggers an immediate jump to round 3.
    let outcome = progress(
        &mut state,
        Input::Prevote {
            view: future,
            sender: addr(4),
            block_hash: None,
        },
        0,
    );
    match outcome {
        Outcome::Applied(_) => {}
        other => panic!("expected Applied after round-skip, got {other:?}"),
    }
    assert_eq!(state.round(), 3);
}

#[test]
fn duplicate_vote_is_a_no_op() {
    let validators = four_validators();
    let mut state = start_as_proposer(addr(1), validators);
    let view = View::new(0, 0);

    let first = apply(
        &mut state,
        Input::Prevote {
            view,
            sender: addr(2),
            block_hash: Some(TestBlock(9).block_hash()),
        },
    );
    assert!(first.is_empty());
    let second = apply(
        &mut state,
        Input::Prevote {
            view,
            sender: addr(2),
            block_hash: Some(TestBlock(9).block_hash()),
        },
    );
    assert!(second.is_empty());
}

#[test]
fn equivocating_prevote_is_reported_and_not_double_counted() {
    let validators = four_validators();
    let mut state = start_as_proposer(addr(1), validators);
    let view = View::new(0, 0);

    apply(
        &mut state,
        Input::Prevote {
            view,
            sender: addr(2),
            block_hash: Some(TestBlock(1).block_hash()),
        },
    );
    let actions = apply(
        &mut state,
        Input::Prevote {
            view,
            sender: addr(2),
            block_hash: Some(TestBlock(2).block_hash()),
        },
    );
    assert_eq!(
        actions,
        vec![Action::ViolationReport {
            violator: addr(2),
            description: "double prevote".to_string(),
        }]
    );
}

#[test]
fn single_validator_is_always_its_own_proposer() {
    let validators = ValidatorSet::new(vec![addr(1)]);
    let mut state = CoreState::new(0, validators.clone(), addr(1), Some(addr(1)));
    let actions = apply(
        &mut state,
        Input::StartHeight {
            height: 0,
            validators,
            last_proposer: addr(1),
            time: 0,
        },
    );
    assert!(actions
        .iter()
        .any(|a| matches!(a, Action::RequestBlockCandidate { height: 0 })));
}

#[test]
fn malformed_proposal_citing_its_own_round_is_dropped() {
    let validators = four_validators();
    let mut state = start_as_proposer(addr(2), validators);
    let view = View::new(0, 0);

    let actions = apply(
        &mut state,
        Input::Proposal {
            view,
            block: TestBlock(1),
            valid_round: Some(0),
            proposer: addr(1), // the legitimate round-0 proposer
            time: 0,
        },
    );
    assert!(actions.is_empty());
    assert!(state.current_round_state().proposal.is_none());
}

#[test]
fn proposal_from_the_wrong_sender_is_dropped() {
    let validators = four_validators();
    let mut state = start_as_proposer(addr(2), validators);
    let view = View::new(0, 0);

    let actions = apply(
        &mut state,
        Input::Proposal {
            view,
            block: TestBlock(1),
            valid_round: None,
            proposer: addr(2), // addr(1) is the legitimate round-0 proposer
            time: 0,
        },
    );
    assert!(actions.is_empty());
    assert!(state.current_round_state().proposal.is_none());
}
