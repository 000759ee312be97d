//! The async driver task (`core::machine` + `driver::engine` = C7): owns
//! `CoreState`, the backlog, the timers, and the host capability object,
//! and implements the classification table of spec §4.6 ahead of
//! dispatching into `core::progress` — mirroring the shape of the donor's
//! `Consensus::progress`/`process_multiple_responses` loop, but as a
//! standing `tokio` task selecting over channels instead of a poll-once
//! method the caller re-invokes.

use crate::backlog::Backlog;
use crate::config::ConsensusParams;
use crate::host::ConsensusHost;
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::timeout::TimeoutScheduler;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tendermint_core::{
    progress, Action, Block, CoreState, Height, Input, Outcome, Step, ValidatorId, ValidatorSet, View,
};
use std::collections::BTreeMap;
use tendermint_wire::{CommittedSeal, ConsensusMessage, PrivateKey, SignedConsensusMessage, NIL_COMMITTED_SEAL_HASH};
use tokio::sync::{mpsc, watch};

/// Inbound events the driver accepts from the outside world, collapsing
/// spec §6's `{MessagePayload, NewCandidateBlock, Committed, SyncRequest,
/// Timeout}` event kinds into one channel type plus the dedicated timer
/// channel `engine::run` already owns internally.
pub enum DriverEvent<B: Block> {
    Message(SignedConsensusMessage),
    CandidateBlock { height: Height, block: B },
    SyncRequest { peer: ValidatorId },
}

pub struct Driver<B, H>
where
    B: Block + Serialize + DeserializeOwned,
    H: ConsensusHost<B>,
{
    host: Arc<H>,
    params: ConsensusParams,
    this_node_key: Option<PrivateKey>,
    this_node_id: Option<ValidatorId>,
    lifecycle: Lifecycle,
    current_validators: RwLock<Option<ValidatorSet>>,
    current_height_messages: RwLock<Vec<SignedConsensusMessage>>,
    /// Committed seals seen for the current height, keyed by sender:
    /// populated from authenticated precommits and from this node's own
    /// signing (see `handle_action`'s `BroadcastPrecommit` arm), consumed
    /// when a commit is reached (spec §4.6 "append extracted
    /// committed-seals to the block header"). Cleared on every height
    /// change.
    precommit_seals: RwLock<BTreeMap<ValidatorId, CommittedSeal>>,
    cancel: watch::Sender<bool>,
    _cancel_rx: watch::Receiver<bool>,
    _block_type: std::marker::PhantomData<B>,
}

impl<B, H> Driver<B, H>
where
    B: Block + Serialize + DeserializeOwned + Send + 'static,
    H: ConsensusHost<B> + 'static,
{
    pub fn new(host: Arc<H>, params: ConsensusParams, this_node_key: Option<PrivateKey>) -> Self {
        let this_node_id = this_node_key.as_ref().map(|k| k.public_key().validator_id());
        let (cancel, cancel_rx) = watch::channel(false);
        Driver {
            host,
            params,
            this_node_key,
            this_node_id,
            lifecycle: Lifecycle::new(),
            current_validators: RwLock::new(None),
            current_height_messages: RwLock::new(Vec::new()),
            precommit_seals: RwLock::new(BTreeMap::new()),
            cancel,
            _cancel_rx: cancel_rx,
            _block_type: std::marker::PhantomData,
        }
    }

    pub fn is_validator(&self, id: &ValidatorId) -> bool {
        self.current_validators
            .read()
            .as_ref()
            .map(|v| v.contains(id))
            .unwrap_or(false)
    }

    /// Snapshot used to answer sync queries (§6, §9's reader-preferring
    /// lock design note).
    pub fn current_height_messages(&self) -> Vec<SignedConsensusMessage> {
        self.current_height_messages.read().clone()
    }

    /// Idempotent start: begins consensus at `height` with `last_proposer`
    /// as the height's seed, and runs the event loop until `stop()` is
    /// called or `events` closes.
    pub async fn start(
        self: Arc<Self>,
        height: Height,
        last_proposer: ValidatorId,
        mut events: mpsc::UnboundedReceiver<DriverEvent<B>>,
    ) -> eyre::Result<()> {
        if !self.lifecycle.begin_start() {
            return Ok(());
        }
        let validators = self.host.validators(height).await?;
        *self.current_validators.write() = Some(validators.clone());

        let mut state: CoreState<B> = CoreState::new(height, validators.clone(), last_proposer, self.this_node_id);
        let backlog: Backlog<B> = Backlog::new();
        let (mut timers, mut timer_events) = TimeoutScheduler::new();
        let (candidate_tx, mut candidate_rx) = mpsc::unbounded_channel();

        let start_input = Input::StartHeight {
            height,
            validators,
            last_proposer,
            time: now_ms(),
        };
        self.step(&mut state, start_input, &backlog, &mut timers, &candidate_tx).await;

        self.lifecycle.finish_start();
        let mut cancel_rx = self.cancel.subscribe();

        loop {
            tokio::select! {
                _ = cancel_rx.changed() => {
                    if *cancel_rx.borrow() {
                        break;
                    }
                }
                Some(event) = events.recv() => {
                    let input = match self.classify_event(event).await {
                        Some(input) => input,
                        None => continue,
                    };
                    self.step(&mut state, input, &backlog, &mut timers, &candidate_tx).await;
                }
                Some((height, block)) = candidate_rx.recv() => {
                    self.step(&mut state, Input::BlockReady { height, block }, &backlog, &mut timers, &candidate_tx).await;
                }
                Some(event) = timer_events.recv() => {
                    if crate::timeout::is_stale(&event, state.view()) {
                        log::debug!("dropping stale timeout {:?}, current is {}", event.kind, state.view());
                        continue;
                    }
                    let input = Input::TimeoutFired { kind: event.kind, view: event.view };
                    self.step(&mut state, input, &backlog, &mut timers, &candidate_tx).await;
                }
                else => break,
            }
        }

        timers.cancel_all();
        self.lifecycle.finish_stop();
        Ok(())
    }

    pub fn stop(&self) -> eyre::Result<()> {
        if self.lifecycle.current() != LifecycleState::Started {
            return Ok(());
        }
        if !self.lifecycle.begin_stop() {
            return Ok(());
        }
        let _ = self.cancel.send(true);
        Ok(())
    }

    async fn classify_event(&self, event: DriverEvent<B>) -> Option<Input<B>> {
        match event {
            DriverEvent::Message(signed) => self.authenticate(signed),
            DriverEvent::CandidateBlock { height, block } => Some(Input::BlockReady { height, block }),
            DriverEvent::SyncRequest { peer } => {
                let snapshot = self.current_height_messages();
                self.host.sync_peer(peer, snapshot).await;
                None
            }
        }
    }

    /// Spec §4.1's acceptance rule (a)+(b): decode and recover the sender,
    /// then reject senders outside the validator set (§7 Policy class).
    /// Rule (c)/(d) — sender-indicating payload fields and the committed
    /// seal — do not apply to votes/proposals, only to the seal bundle
    /// assembled once a block actually commits.
    fn authenticate(&self, signed: SignedConsensusMessage) -> Option<Input<B>> {
        let sender = match signed.verify_and_recover() {
            Ok(sender) => sender,
            Err(err) => {
                log::debug!("dropping malformed message: {err}");
                return None;
            }
        };
        if !self.is_validator(&sender) {
            log::warn!("dropping message from non-validator {sender:?}");
            return None;
        }
        self.current_height_messages.write().push(signed.clone());
        match signed.message {
            ConsensusMessage::Proposal {
                height,
                round,
                block_hash,
                valid_round,
                block_payload,
            } => {
                let block = match serde_json::from_slice::<B>(&block_payload) {
                    Ok(block) if block.block_hash() == block_hash => block,
                    _ => {
                        log::debug!("dropping proposal with payload not matching its hash");
                        return None;
                    }
                };
                Some(Input::Proposal {
                    view: View::new(height, round),
                    block,
                    valid_round,
                    proposer: sender,
                    time: now_ms(),
                })
            }
            ConsensusMessage::Prevote { height, round, block_hash } => Some(Input::Prevote {
                view: View::new(height, round),
                sender,
                block_hash,
            }),
            ConsensusMessage::Precommit {
                height,
                round,
                block_hash,
                committed_seal,
            } => {
                if let Some(hash) = block_hash {
                    match committed_seal.verify_and_recover(&hash) {
                        Ok(seal_signer) if seal_signer == sender => {
                            self.precommit_seals.write().insert(sender, committed_seal);
                        }
                        Ok(_) => {
                            log::debug!("dropping precommit: committed seal signed by a different key than the envelope");
                            return None;
                        }
                        Err(err) => {
                            log::debug!("dropping precommit: committed seal failed to verify: {err}");
                            return None;
                        }
                    }
                }
                Some(Input::Precommit {
                    view: View::new(height, round),
                    sender,
                    block_hash,
                })
            }
        }
    }

    /// Applies `input`, backlogging or dropping per the outcome, then
    /// re-scans the backlog for anything the resulting step unblocked
    /// (spec §4.4: re-scan on every step transition). Iterative rather
    /// than recursive: a re-scan can itself unblock further entries (e.g.
    /// a round-skip draining several backlogged rounds at once), and a
    /// commit feeds the next height's `StartHeight` right back onto the
    /// same worklist, so this drains until nothing — backlog or
    /// follow-up — has anything left to offer.
    async fn step(
        &self,
        state: &mut CoreState<B>,
        input: Input<B>,
        backlog: &Backlog<B>,
        timers: &mut TimeoutScheduler,
        candidate_tx: &mpsc::UnboundedSender<(Height, B)>,
    ) {
        let mut pending = vec![input];
        while let Some(input) = pending.pop() {
            let view_before = state.view();
            let step_before = state.step();
            let view = input.view();
            let parked = input.clone();
            let current_height = state.height();
            let outcome = progress(state, input, now_ms());
            match &outcome {
                Outcome::Backlog(reason) => {
                    log::trace!("backlogging input: {reason}");
                    if let Some(view) = view {
                        // Parked at `Propose` (ordinal 0): the entries
                        // this path parks are always future-round
                        // messages without a step of their own, so
                        // re-scanning from the earliest ordinal never
                        // skips them once their round arrives.
                        backlog.push(parked, view, Step::Propose);
                    }
                }
                Outcome::Dropped(err) => {
                    log::debug!("dropped input: {err}");
                }
                Outcome::Applied(_) => {}
            }
            let follow_up = self.handle_outcome(current_height, outcome, timers, candidate_tx).await;
            pending.extend(follow_up);

            if state.view() != view_before || state.step() != step_before {
                *self.current_validators.write() = Some(state.validators().clone());
                pending.extend(backlog.drain_ready(state.view(), state.step()));
            }
        }
    }

    /// Runs every action from one `progress()` call, returning any input
    /// the action itself produced (currently: `StartHeight` for the next
    /// height once a commit's executor hand-off succeeds) to be fed back
    /// through `step`'s worklist.
    async fn handle_outcome(
        &self,
        height: Height,
        outcome: Outcome<B>,
        timers: &mut TimeoutScheduler,
        candidate_tx: &mpsc::UnboundedSender<(Height, B)>,
    ) -> Vec<Input<B>> {
        let mut follow_up = Vec::new();
        if let Outcome::Applied(actions) = outcome {
            for action in actions {
                if let Some(input) = self.handle_action(height, action, timers, candidate_tx).await {
                    follow_up.push(input);
                }
            }
        }
        follow_up
    }

    async fn handle_action(
        &self,
        height: Height,
        action: Action<B>,
        timers: &mut TimeoutScheduler,
        candidate_tx: &mpsc::UnboundedSender<(Height, B)>,
    ) -> Option<Input<B>> {
        match action {
            Action::BroadcastProposal { view, block, valid_round } => {
                let block_payload = serde_json::to_vec(&block).expect("block serialization is infallible");
                let message = ConsensusMessage::Proposal {
                    height: view.height,
                    round: view.round,
                    block_hash: block.block_hash(),
                    valid_round,
                    block_payload,
                };
                self.sign_and_broadcast(message).await;
                None
            }
            Action::BroadcastPrevote { view, block_hash } => {
                let message = ConsensusMessage::Prevote {
                    height: view.height,
                    round: view.round,
                    block_hash,
                };
                self.sign_and_broadcast(message).await;
                None
            }
            Action::BroadcastPrecommit { view, block_hash } => {
                if let Some(key) = self.this_node_key {
                    let seal_hash = block_hash.unwrap_or(NIL_COMMITTED_SEAL_HASH);
                    let committed_seal = CommittedSeal::sign(&seal_hash, &key);
                    if let Some(id) = self.this_node_id {
                        self.precommit_seals.write().insert(id, committed_seal.clone());
                    }
                    let message = ConsensusMessage::Precommit {
                        height: view.height,
                        round: view.round,
                        block_hash,
                        committed_seal,
                    };
                    self.sign_and_broadcast(message).await;
                }
                None
            }
            Action::ArmTimeout { kind, view } => {
                let duration = match kind {
                    tendermint_core::TimeoutKind::Propose => self.params.propose_timeout(view.round),
                    tendermint_core::TimeoutKind::Prevote => self.params.prevote_timeout(view.round),
                    tendermint_core::TimeoutKind::Precommit => self.params.precommit_timeout(view.round),
                };
                timers.arm(kind, view, duration);
                None
            }
            Action::RequestBlockCandidate { height } => {
                let host = Arc::clone(&self.host);
                let tx = candidate_tx.clone();
                tokio::spawn(async move {
                    match host.next_candidate_block(height).await {
                        Ok(block) => {
                            let _ = tx.send((height, block));
                        }
                        Err(err) => log::error!("failed to obtain a block candidate for {height}: {err}"),
                    }
                });
                None
            }
            Action::Commit { block, committers } => {
                let committed_seals: Vec<(ValidatorId, CommittedSeal)> = {
                    let seals = self.precommit_seals.read();
                    committers
                        .iter()
                        .filter_map(|id| match seals.get(id) {
                            Some(seal) => Some((*id, seal.clone())),
                            None => {
                                log::warn!("no committed seal on file for committer {id:?}; omitting from the finalization bundle");
                                None
                            }
                        })
                        .collect()
                };
                if let Err(err) = self.host.commit(block, committed_seals).await {
                    log::error!("host commit failed, staying in precommitDone: {err}");
                    return None;
                }
                self.advance_to_next_height(height + 1).await
            }
            Action::ViolationReport { violator, description } => {
                log::warn!("validator {violator:?} misbehaved: {description}");
                None
            }
        }
    }

    /// Spec §4.6: "on the executor's acknowledgement, call `startRound(0)`
    /// at height H+1." Pulls the next height's validator set and seeds
    /// `last_proposer` from the chain head the host just accepted, matching
    /// the one-time setup in `start()` exactly.
    async fn advance_to_next_height(&self, height: Height) -> Option<Input<B>> {
        self.precommit_seals.write().clear();
        let (_, last_proposer) = match self.host.last_committed_block().await {
            Ok(pair) => pair,
            Err(err) => {
                log::error!("failed to read the committed chain head advancing to height {height}: {err}");
                return None;
            }
        };
        let validators = match self.host.validators(height).await {
            Ok(validators) => validators,
            Err(err) => {
                log::error!("failed to fetch validators for height {height}: {err}");
                return None;
            }
        };
        *self.current_validators.write() = Some(validators.clone());
        self.current_height_messages.write().clear();
        Some(Input::StartHeight {
            height,
            validators,
            last_proposer,
            time: now_ms(),
        })
    }

    async fn sign_and_broadcast(&self, message: ConsensusMessage) {
        let Some(key) = self.this_node_key.as_ref() else {
            return;
        };
        let signed = SignedConsensusMessage::sign(message, key);
        self.host.broadcast(signed).await;
    }
}

fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after the epoch")
        .as_millis() as i64
}
