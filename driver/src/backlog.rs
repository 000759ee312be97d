//! Inbound priority queue for future-view messages (spec §4.4, C5).
//!
//! Ordered by `(height, round, step_ordinal)` ascending so the earliest
//! still-relevant message pops first; re-scanned by the engine on every
//! step transition rather than on a timer, per §4.4.

use parking_lot::Mutex;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use tendermint_core::{Block, Height, Input, Round, Step, View};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct BacklogKey {
    height: Height,
    round: Round,
    step_ordinal: u8,
}

struct Entry<B: Block> {
    key: BacklogKey,
    input: Input<B>,
}

impl<B: Block> PartialEq for Entry<B> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}
impl<B: Block> Eq for Entry<B> {}
impl<B: Block> PartialOrd for Entry<B> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl<B: Block> Ord for Entry<B> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key.cmp(&other.key)
    }
}

/// Shared between the engine loop and the signature-verification path that
/// feeds it, hence the internal lock rather than `&mut self` access (§5).
pub struct Backlog<B: Block> {
    heap: Mutex<BinaryHeap<Reverse<Entry<B>>>>,
}

impl<B: Block> Default for Backlog<B> {
    fn default() -> Self {
        Backlog {
            heap: Mutex::new(BinaryHeap::new()),
        }
    }
}

impl<B: Block> Backlog<B> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parks an input that `core::progress` classified as future (spec §7).
    /// `step_ordinal` defaults to `Propose` (0) for inputs without a
    /// meaningful step of their own (e.g. a future-round vote).
    pub fn push(&self, input: Input<B>, view: View, step: Step) {
        let key = BacklogKey {
            height: view.height,
            round: view.round,
            step_ordinal: step.ordinal(),
        };
        self.heap.lock().push(Reverse(Entry { key, input }));
    }

    pub fn len(&self) -> usize {
        self.heap.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.lock().is_empty()
    }

    /// Pops every entry whose `(height, round, step_ordinal)` is now `<=`
    /// the given view/step, in ascending key order, discarding entries that
    /// have fallen behind a height that has already moved on (§4.4: "past"
    /// entries are dropped, not re-fed).
    pub fn drain_ready(&self, current_view: View, current_step: Step) -> Vec<Input<B>> {
        let current_key = BacklogKey {
            height: current_view.height,
            round: current_view.round,
            step_ordinal: current_step.ordinal(),
        };
        let mut heap = self.heap.lock();
        let mut ready = Vec::new();
        while let Some(Reverse(entry)) = heap.peek() {
            if entry.key > current_key {
                break;
            }
            let Reverse(entry) = heap.pop().expect("just peeked");
            if entry.key.height < current_view.height {
                continue; // stale height, discard per §4.4
            }
            ready.push(entry.input);
        }
        ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tendermint_core::{BlockHash, TimeoutKind};

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct TestBlock;
    impl Block for TestBlock {
        fn block_hash(&self) -> BlockHash {
            [0u8; 32]
        }
    }

    fn timeout_input(view: View) -> Input<TestBlock> {
        Input::TimeoutFired {
            kind: TimeoutKind::Propose,
            view,
        }
    }

    #[test]
    fn drains_entries_at_or_before_the_current_key_in_order() {
        let backlog: Backlog<TestBlock> = Backlog::new();
        backlog.push(timeout_input(View::new(5, 2)), View::new(5, 2), Step::Propose);
        backlog.push(timeout_input(View::new(5, 0)), View::new(5, 0), Step::Propose);
        backlog.push(timeout_input(View::new(5, 1)), View::new(5, 1), Step::Propose);

        let ready = backlog.drain_ready(View::new(5, 1), Step::Propose);
        assert_eq!(ready.len(), 2);
        assert!(backlog.len() == 1);
    }

    #[test]
    fn entries_from_a_height_already_past_are_dropped_not_returned() {
        let backlog: Backlog<TestBlock> = Backlog::new();
        backlog.push(timeout_input(View::new(3, 0)), View::new(3, 0), Step::Propose);

        let ready = backlog.drain_ready(View::new(5, 0), Step::Propose);
        assert!(ready.is_empty());
        assert!(backlog.is_empty());
    }
}
