use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::operation::{OperationBase, Stage};

pub type SharedOperation = Arc<Mutex<OperationBase>>;

/// The per-context ordered list of every operation still live in the
/// pipeline (spec.md §3: "a reorder buffer"; invariants (iii)/(iv)).
/// Operations enter at the back in program order and are only ever
/// reclaimed from the front — committing operation #5 while #3 is
/// still outstanding does not free #5's slot until #3 (and #4) commit
/// too, preserving "committed operations are freed in reorder-buffer
/// order".
pub struct ReorderBuffer {
    entries: Mutex<VecDeque<SharedOperation>>,
}

impl ReorderBuffer {
    pub fn new() -> Self {
        ReorderBuffer {
            entries: Mutex::new(VecDeque::new()),
        }
    }

    pub fn push(&self, operation: SharedOperation) {
        self.entries.lock().push_back(operation);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drain and return every contiguous run of committed operations
    /// starting at the front. Stops at the first non-committed entry,
    /// leaving it (and everything behind it) in the buffer.
    pub fn reclaim_committed(&self) -> Vec<SharedOperation> {
        let mut entries = self.entries.lock();
        let mut reclaimed = Vec::new();
        while let Some(front) = entries.front() {
            if front.lock().stage() != Stage::Committed {
                break;
            }
            reclaimed.push(entries.pop_front().unwrap());
        }
        reclaimed
    }

    /// Count of operations still in the buffer at or past `stage`.
    pub fn count_at_least(&self, stage: Stage) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|op| op.lock().stage() >= stage)
            .count()
    }

    /// A cheap clone of every live entry, in program order, for dependence
    /// analysis to scan. Operations are `Arc`s so this is a pointer copy,
    /// not a deep copy of operation state.
    pub fn snapshot(&self) -> Vec<SharedOperation> {
        self.entries.lock().iter().cloned().collect()
    }
}

impl Default for ReorderBuffer {
    fn default() -> Self {
        Self::new()
    }
}
