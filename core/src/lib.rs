//! Deterministic Tendermint-style BFT consensus state machine.
//!
//! This crate is the pure half of the split the workspace follows
//! throughout: no sockets, no clock, no signature verification. Everything
//! here is a function of `(CoreState, Input) -> (CoreState, Vec<Action>)`,
//! callable from a test harness exactly as it is from a production driver.
//! All I/O, timer scheduling, and message authentication live one layer up,
//! in `tendermint-driver` and `tendermint-wire` respectively.

pub mod error;
pub mod event;
pub mod machine;
pub mod round_state;
pub mod state;
pub mod types;
pub mod validator_set;
pub mod vote_set;

pub use error::ClassifiedError;
pub use event::{Action, Input};
pub use machine::{progress, Outcome};
pub use round_state::RoundState;
pub use state::CoreState;
pub use types::{Block, BlockHash, Height, Proposal, Round, Step, Timestamp, TimeoutKind, ValidatorId, View};
pub use validator_set::ValidatorSet;
pub use vote_set::{VoteOutcome, VoteSet};
