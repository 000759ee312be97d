//! The abstract error taxonomy from spec §7, reified so the driver can
//! dispatch on it instead of re-deriving "is this stale/future/policy"
//! from raw state every time it handles a rejection. The `Future*`
//! variants double as the payload of `machine::Outcome::Backlog`, so a
//! parked input still says exactly why it was parked.

use crate::types::{Round, Step, View};
use thiserror::Error;

/// Why an event was not applied to the state machine.
///
/// This is not a "panic on error" type: every variant is an expected,
/// frequent outcome of normal operation (a validator's messages routinely
/// arrive out of order). Spec §7: "Errors never panic the driver."
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifiedError {
    #[error("message for past height, current={current}, message_height={message_height}")]
    OldHeightMessage { current: View, message_height: u64 },

    #[error("message for future height, current={current}, message_height={message_height}")]
    FutureHeightMessage { current: View, message_height: u64 },

    #[error("message for future round {message_round} at height {current}")]
    FutureRoundMessage { current: View, message_round: Round },

    #[error("message for future step {message_step:?} at {current}")]
    FutureStepMessage { current: View, message_step: Step },

    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("stale timeout for {fired}, current is {current}")]
    StaleTimeout { fired: View, current: View },
}
