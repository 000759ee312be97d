//! C3 — per-(height, round, step) vote tally (spec §4.3).
//!
//! Buckets are keyed by `Option<BlockHash>`; `None` is the distinguished
//! NIL bucket. This plays the same role as the donor `vetomint` crate's
//! `Votes { prevotes_total, prevotes_favor, .. }`, generalized so the core
//! itself enforces the one-vote-per-sender invariant instead of trusting
//! the caller, and so that equivocation is detectable rather than merely
//! preventable.

use crate::types::{BlockHash, ValidatorId};
use std::collections::{BTreeMap, BTreeSet};

/// Outcome of adding a single vote, letting the caller (the state machine)
/// decide what, if anything, to do about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteOutcome {
    /// First vote from this sender at this (height, round, step).
    Added,
    /// Re-delivery of the exact same vote; not an error (spec §4.3).
    Duplicate,
    /// The sender already voted for a *different* bucket. The vote is not
    /// double-counted; `first` is preserved, `second` is the rejected one.
    Equivocation {
        first: Option<BlockHash>,
        second: Option<BlockHash>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VoteSet {
    buckets: BTreeMap<Option<BlockHash>, BTreeSet<ValidatorId>>,
    /// sender -> bucket already cast, for O(1) double-vote detection.
    cast_by: BTreeMap<ValidatorId, Option<BlockHash>>,
}

impl VoteSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent per sender; see `VoteOutcome` for the three dispositions.
    pub fn add(&mut self, sender: ValidatorId, hash_or_nil: Option<BlockHash>) -> VoteOutcome {
        match self.cast_by.get(&sender) {
            None => {
                self.cast_by.insert(sender, hash_or_nil);
                self.buckets.entry(hash_or_nil).or_default().insert(sender);
                VoteOutcome::Added
            }
            Some(existing) if *existing == hash_or_nil => VoteOutcome::Duplicate,
            Some(existing) => VoteOutcome::Equivocation {
                first: *existing,
                second: hash_or_nil,
            },
        }
    }

    /// Number of distinct senders who voted for `hash`.
    pub fn count(&self, hash: BlockHash) -> u64 {
        self.buckets
            .get(&Some(hash))
            .map(|s| s.len() as u64)
            .unwrap_or(0)
    }

    /// Number of distinct senders who voted NIL.
    pub fn count_nil(&self) -> u64 {
        self.buckets.get(&None).map(|s| s.len() as u64).unwrap_or(0)
    }

    /// Sum of distinct senders across every bucket, including NIL.
    pub fn count_any(&self) -> u64 {
        self.cast_by.len() as u64
    }

    /// The bucket (a concrete hash, or NIL) whose count has reached `quorum`,
    /// if any. At most one concrete-hash bucket can ever reach quorum for a
    /// well-formed (non-equivocating majority of) validator set, but this
    /// does not assume that; it returns the first one found.
    pub fn majority(&self, quorum: u64) -> Option<Option<BlockHash>> {
        self.buckets
            .iter()
            .find(|(_, senders)| senders.len() as u64 >= quorum)
            .map(|(bucket, _)| *bucket)
    }

    pub fn has_voted(&self, sender: &ValidatorId) -> bool {
        self.cast_by.contains_key(sender)
    }

    pub fn senders(&self) -> impl Iterator<Item = &ValidatorId> {
        self.cast_by.keys()
    }

    /// The senders who voted for `hash`, used to build the committed-seal
    /// set handed to the host on commit (spec §4.6 "append extracted
    /// committed-seals").
    pub fn senders_for(&self, hash: BlockHash) -> Vec<ValidatorId> {
        self.buckets
            .get(&Some(hash))
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> ValidatorId {
        [b; 20]
    }

    fn hash(b: u8) -> BlockHash {
        [b; 32]
    }

    #[test]
    fn first_vote_is_added() {
        let mut vs = VoteSet::new();
        assert_eq!(vs.add(addr(1), Some(hash(1))), VoteOutcome::Added);
        assert_eq!(vs.count(hash(1)), 1);
        assert_eq!(vs.count_any(), 1);
    }

    #[test]
    fn duplicate_vote_is_not_double_counted() {
        let mut vs = VoteSet::new();
        vs.add(addr(1), Some(hash(1)));
        assert_eq!(vs.add(addr(1), Some(hash(1))), VoteOutcome::Duplicate);
        assert_eq!(vs.count(hash(1)), 1);
        assert_eq!(vs.count_any(), 1);
    }

    #[test]
    fn equivocation_is_detected_and_not_double_counted() {
        let mut vs = VoteSet::new();
        vs.add(addr(1), Some(hash(1)));
        let outcome = vs.add(addr(1), Some(hash(2)));
        assert_eq!(
            outcome,
            VoteOutcome::Equivocation {
                first: Some(hash(1)),
                second: Some(hash(2)),
            }
        );
        // still attributed to the first vote only.
        assert_eq!(vs.count(hash(1)), 1);
        assert_eq!(vs.count(hash(2)), 0);
        assert_eq!(vs.count_any(), 1);
    }

    #[test]
    fn nil_bucket_is_tracked_separately() {
        let mut vs = VoteSet::new();
        vs.add(addr(1), None);
        vs.add(addr(2), Some(hash(1)));
        assert_eq!(vs.count_nil(), 1);
        assert_eq!(vs.count(hash(1)), 1);
        assert_eq!(vs.count_any(), 2);
    }

    #[test]
    fn majority_requires_quorum() {
        let mut vs = VoteSet::new();
        vs.add(addr(1), Some(hash(1)));
        vs.add(addr(2), Some(hash(1)));
        assert_eq!(vs.majority(3), None);
        vs.add(addr(3), Some(hash(1)));
        assert_eq!(vs.majority(3), Some(Some(hash(1))));
    }

    #[test]
    fn senders_for_returns_the_bucket() {
        let mut vs = VoteSet::new();
        vs.add(addr(1), Some(hash(1)));
        vs.add(addr(2), Some(hash(1)));
        vs.add(addr(3), None);
        let mut committers = vs.senders_for(hash(1));
        committers.sort();
        assert_eq!(committers, vec![addr(1), addr(2)]);
    }
}
