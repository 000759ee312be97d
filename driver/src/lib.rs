//! Async I/O driver, backlog, and timers for the consensus core.
//!
//! `tendermint-core` is a pure state machine; this crate is everything
//! around it that touches a clock, a socket, or a lock: the backlog
//! priority queue (C5), the three cancellable timers (C6), and the event
//! loop (`engine::Driver`) that classifies inbound wire messages, drives
//! `tendermint-core::progress`, and dispatches the resulting actions to a
//! host-supplied `ConsensusHost` implementation.

pub mod backlog;
pub mod config;
pub mod engine;
pub mod host;
pub mod lifecycle;
pub mod timeout;

pub use backlog::Backlog;
pub use config::ConsensusParams;
pub use engine::{Driver, DriverEvent};
pub use host::ConsensusHost;
pub use lifecycle::{Lifecycle, LifecycleState};
pub use timeout::{TimeoutEvent, TimeoutScheduler};
