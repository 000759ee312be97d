//! C2 — validator set and proposer selection (spec §4.2).
//!
//! The set is fixed for the duration of a height and is a pure function of
//! its three constructor arguments, matching the donor `vetomint` crate's
//! `decide_proposer(round, height_info)`. This implementation generalizes
//! it to an explicit `last_proposer` pointer rather than baking "round 0 ==
//! validator 0", since the core restarts at round 0 on every height and
//! needs to remember who proposed last height's block.

use crate::types::{Round, ValidatorId};

/// An ordered, fixed validator list for a single height. All validators
/// carry equal weight (spec §3: "stake/weight 1 each"); a weighted variant
/// is an explicit Open Question resolved in DESIGN.md.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorSet {
    validators: Vec<ValidatorId>,
}

impl ValidatorSet {
    /// Builds a validator set. Panics on duplicate members since the data
    /// model requires "distinct ValidatorIDs" (spec §3); a malformed set
    /// from the host is a programming error, not a runtime condition the
    /// core needs to recover from.
    pub fn new(validators: Vec<ValidatorId>) -> Self {
        let mut sorted = validators.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(
            sorted.len(),
            validators.len(),
            "validator set must not contain duplicates"
        );
        assert!(!validators.is_empty(), "validator set must not be empty");
        ValidatorSet { validators }
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    pub fn contains(&self, id: &ValidatorId) -> bool {
        self.validators.contains(id)
    }

    pub fn index_of(&self, id: &ValidatorId) -> Option<usize> {
        self.validators.iter().position(|v| v == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidatorId> {
        self.validators.iter()
    }

    /// n, the validator count.
    pub fn n(&self) -> u64 {
        self.validators.len() as u64
    }

    /// Byzantine budget f = floor((n-1)/3).
    pub fn byzantine_budget(&self) -> u64 {
        (self.n() - 1) / 3
    }

    /// Quorum threshold Q = smallest integer >= ceil(2n/3).
    ///
    /// Deliberately `ceil(2n/3)`, not the more common `floor(2n/3) + 1`:
    /// for n divisible by 3 the two differ by one, and spec §9 pins this
    /// exact form to stay vote-compatible with the source implementation.
    pub fn quorum(&self) -> u64 {
        let n = self.n();
        (2 * n + 2) / 3
    }

    /// proposer(R) = validators[(index_of(last_proposer) + 1 + R) mod n],
    /// the reference round-robin policy (spec §4.2).
    pub fn proposer(&self, last_proposer: &ValidatorId, round: Round) -> ValidatorId {
        let n = self.validators.len();
        let last_index = self.index_of(last_proposer).unwrap_or(n - 1);
        let offset = (1 + round as usize) % n;
        self.validators[(last_index + offset) % n]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> ValidatorId {
        [b; 20]
    }

    fn set4() -> ValidatorSet {
        ValidatorSet::new(vec![addr(1), addr(2), addr(3), addr(4)])
    }

    #[test]
    fn quorum_and_budget_n4() {
        let v = set4();
        assert_eq!(v.n(), 4);
        assert_eq!(v.quorum(), 3);
        assert_eq!(v.byzantine_budget(), 1);
    }

    #[test]
    fn quorum_divisible_by_three_uses_ceil() {
        // n=3: floor(2n/3)+1 = 3, ceil(2n/3) = 2. The spec pins ceil.
        let v = ValidatorSet::new(vec![addr(1), addr(2), addr(3)]);
        assert_eq!(v.quorum(), 2);
    }

    #[test]
    fn single_node_quorum_is_one() {
        let v = ValidatorSet::new(vec![addr(1)]);
        assert_eq!(v.quorum(), 1);
        assert_eq!(v.byzantine_budget(), 0);
    }

    #[test]
    fn round_robin_proposer_rotates() {
        let v = set4();
        // last proposer = validators[3] (addr(4)) => proposer(R=0) = validators[0]
        assert_eq!(v.proposer(&addr(4), 0), addr(1));
        assert_eq!(v.proposer(&addr(4), 1), addr(2));
        assert_eq!(v.proposer(&addr(4), 2), addr(3));
        assert_eq!(v.proposer(&addr(4), 3), addr(4));
        assert_eq!(v.proposer(&addr(4), 4), addr(1));
    }

    #[test]
    fn proposer_is_pure_function_of_inputs() {
        let v = set4();
        assert_eq!(v.proposer(&addr(2), 5), v.proposer(&addr(2), 5));
    }
}
