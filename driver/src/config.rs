//! `ConsensusParams` — the linear-in-round timeout schedule (spec §4.5),
//! renamed but otherwise shaped like the donor `vetomint::ConsensusParams`.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tendermint_core::Round;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusParams {
    pub propose_base_ms: u64,
    pub prevote_base_ms: u64,
    pub precommit_base_ms: u64,
    pub increment_ms: u64,
}

impl Default for ConsensusParams {
    fn default() -> Self {
        ConsensusParams {
            propose_base_ms: 3000,
            prevote_base_ms: 1000,
            precommit_base_ms: 1000,
            increment_ms: 500,
        }
    }
}

impl ConsensusParams {
    pub fn propose_timeout(&self, round: Round) -> Duration {
        Self::linear(self.propose_base_ms, self.increment_ms, round)
    }

    pub fn prevote_timeout(&self, round: Round) -> Duration {
        Self::linear(self.prevote_base_ms, self.increment_ms, round)
    }

    pub fn precommit_timeout(&self, round: Round) -> Duration {
        Self::linear(self.precommit_base_ms, self.increment_ms, round)
    }

    fn linear(base_ms: u64, increment_ms: u64, round: Round) -> Duration {
        Duration::from_millis(base_ms + increment_ms * round as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_literal_schedule() {
        let params = ConsensusParams::default();
        assert_eq!(params.propose_timeout(0), Duration::from_millis(3000));
        assert_eq!(params.prevote_timeout(0), Duration::from_millis(1000));
        assert_eq!(params.precommit_timeout(0), Duration::from_millis(1000));
    }

    #[test]
    fn timeouts_grow_linearly_with_round() {
        let params = ConsensusParams::default();
        assert_eq!(params.propose_timeout(2), Duration::from_millis(4000));
        assert_eq!(params.prevote_timeout(3), Duration::from_millis(2500));
    }
}
