//! Three independent cancellable one-shot timers (spec §4.5, C6), each
//! tagged with the `(Height, Round)` they were armed for. Firings are
//! delivered over an `mpsc` channel as `TimeoutEvent` rather than awaited
//! in place, mirroring the donor's event-loop-over-channels pattern
//! (`simperby_network::dms` polling plus `tokio::sync::mpsc` elsewhere in
//! the workspace) adapted to a fixed, closed set of timer kinds instead of
//! a generic pub/sub mux.

use std::time::Duration;
use tendermint_core::{TimeoutKind, View};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutEvent {
    pub kind: TimeoutKind,
    pub view: View,
}

/// Owns the in-flight timer tasks for a single node and the sending half of
/// the channel they report back on. `arm` cancels any previously scheduled
/// timer of the same kind before starting the new one, since a round can
/// only ever have one live timer per kind.
pub struct TimeoutScheduler {
    sender: mpsc::UnboundedSender<TimeoutEvent>,
    propose: Option<JoinHandle<()>>,
    prevote: Option<JoinHandle<()>>,
    precommit: Option<JoinHandle<()>>,
}

impl TimeoutScheduler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimeoutEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            TimeoutScheduler {
                sender,
                propose: None,
                prevote: None,
                precommit: None,
            },
            receiver,
        )
    }

    pub fn arm(&mut self, kind: TimeoutKind, view: View, duration: Duration) {
        let slot = match kind {
            TimeoutKind::Propose => &mut self.propose,
            TimeoutKind::Prevote => &mut self.prevote,
            TimeoutKind::Precommit => &mut self.precommit,
        };
        if let Some(handle) = slot.take() {
            handle.abort();
        }
        let sender = self.sender.clone();
        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = sender.send(TimeoutEvent { kind, view });
        }));
    }

    /// Cancels all three timers, e.g. on height change or driver shutdown.
    pub fn cancel_all(&mut self) {
        for slot in [&mut self.propose, &mut self.prevote, &mut self.precommit] {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
    }
}

impl Drop for TimeoutScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

/// A stale firing — for a `(H, R)` that is no longer current — is a no-op
/// per §4.5; the engine checks this before forwarding into `core::progress`,
/// but `core::machine::handle_timeout` double-checks it independently, so a
/// bug in either layer alone cannot cause a stale timer to move state.
pub fn is_stale(event: &TimeoutEvent, current: View) -> bool {
    event.view != current
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn armed_timer_reports_back_on_the_channel() {
        let (mut scheduler, mut rx) = TimeoutScheduler::new();
        let view = View::new(1, 0);
        scheduler.arm(TimeoutKind::Propose, view, Duration::from_millis(5));
        let event = rx.recv().await.expect("channel should not be closed");
        assert_eq!(event.kind, TimeoutKind::Propose);
        assert_eq!(event.view, view);
    }

    #[tokio::test]
    async fn re_arming_the_same_kind_cancels_the_previous_timer() {
        let (mut scheduler, mut rx) = TimeoutScheduler::new();
        scheduler.arm(TimeoutKind::Prevote, View::new(1, 0), Duration::from_millis(500));
        scheduler.arm(TimeoutKind::Prevote, View::new(1, 1), Duration::from_millis(5));
        let event = rx.recv().await.expect("channel should not be closed");
        assert_eq!(event.view, View::new(1, 1));
    }

    #[test]
    fn stale_check_compares_against_the_current_view() {
        let event = TimeoutEvent {
            kind: TimeoutKind::Precommit,
            view: View::new(1, 0),
        };
        assert!(is_stale(&event, View::new(1, 1)));
        assert!(!is_stale(&event, View::new(1, 0)));
    }
}
