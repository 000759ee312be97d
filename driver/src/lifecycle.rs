//! The `Stopped | Starting | Started | Stopping` flag word (spec §9), guarding
//! `Driver::start`/`Driver::stop` idempotency the way the donor project
//! gates double-init with a plain enum under a `parking_lot::Mutex` rather
//! than atomics, since starts and stops are rare events, not a hot path.

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Stopped,
    Starting,
    Started,
    Stopping,
}

pub struct Lifecycle {
    state: Mutex<LifecycleState>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Lifecycle {
            state: Mutex::new(LifecycleState::Stopped),
        }
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> LifecycleState {
        *self.state.lock()
    }

    /// Transitions `Stopped -> Starting`, returning `false` (no-op) if a
    /// start or stop is already in flight or already started.
    pub fn begin_start(&self) -> bool {
        let mut state = self.state.lock();
        if *state == LifecycleState::Stopped {
            *state = LifecycleState::Starting;
            true
        } else {
            false
        }
    }

    pub fn finish_start(&self) {
        *self.state.lock() = LifecycleState::Started;
    }

    /// Transitions `Started -> Stopping`, returning `false` (no-op) if the
    /// driver isn't currently running.
    pub fn begin_stop(&self) -> bool {
        let mut state = self.state.lock();
        if *state == LifecycleState::Started {
            *state = LifecycleState::Stopping;
            true
        } else {
            false
        }
    }

    pub fn finish_stop(&self) {
        *self.state.lock() = LifecycleState::Stopped;
    }
}
