use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use legion_event::Event;
use parking_lot::Mutex;

/// Tracks the state a context needs to implement fences and
/// implicit-creation ordering (spec.md §4, "Fences act as one-sided
/// barriers").
///
/// A mapping fence is a generation counter plus, for each generation
/// issued, the merged completion of every operation tracked before it —
/// the same completions an execution fence would merge, just snapshotted
/// rather than drained. Any operation registered after generation N must
/// wait on generation N's snapshot before it may begin mapping, which is
/// the one-sided half of the barrier (spec.md §4.3): operations already
/// in flight when the fence was issued are never blocked by it.
pub struct FenceAnalysis {
    mapping_fence_generation: AtomicU64,
    pending_completions: Mutex<Vec<Event>>,
    mapping_fence_barriers: Mutex<HashMap<u64, Event>>,
    last_implicit_creation: Mutex<Option<Event>>,
}

impl FenceAnalysis {
    pub fn new() -> Self {
        FenceAnalysis {
            mapping_fence_generation: AtomicU64::new(0),
            pending_completions: Mutex::new(Vec::new()),
            mapping_fence_barriers: Mutex::new(HashMap::new()),
            last_implicit_creation: Mutex::new(None),
        }
    }

    /// Record a newly-launched operation's completion event so a later
    /// execution fence can merge it in.
    pub fn track_completion(&self, completion: Event) {
        self.pending_completions.lock().push(completion);
    }

    /// Advance the mapping-fence generation and snapshot every
    /// completion tracked so far into that generation's barrier event.
    /// Later operations must wait on this barrier before they may begin
    /// mapping (`mapping_barrier_for`).
    pub fn issue_mapping_fence(&self) -> u64 {
        let generation = self.mapping_fence_generation.fetch_add(1, Ordering::AcqRel) + 1;
        let snapshot = self.pending_completions.lock().clone();
        let barrier = Event::merge(snapshot);
        self.mapping_fence_barriers.lock().insert(generation, barrier);
        generation
    }

    pub fn current_mapping_generation(&self) -> u64 {
        self.mapping_fence_generation.load(Ordering::Acquire)
    }

    /// The barrier event a fresh operation registered under `generation`
    /// must wait on before it may begin mapping, or `None` at generation
    /// 0 (no mapping fence has ever been issued).
    pub fn mapping_barrier_for(&self, generation: u64) -> Option<Event> {
        self.mapping_fence_barriers.lock().get(&generation).cloned()
    }

    /// Merge every completion recorded since the last execution fence
    /// into one event and clear the accumulator. The returned event is
    /// the fence operation's own precondition.
    pub fn issue_execution_fence(&self) -> Event {
        let mut pending = self.pending_completions.lock();
        let merged = Event::merge(pending.drain(..));
        merged
    }

    /// Serialize a creation-like operation (field allocation,
    /// dependent-partition, pending-partition) behind whatever creation
    /// preceded it, then record this one as the new `last_implicit_creation`.
    /// Returns the precondition the new creation must wait on.
    pub fn serialize_creation(&self, this_completion: Event) -> Event {
        let mut slot = self.last_implicit_creation.lock();
        let precondition = slot.clone().unwrap_or_else(Event::already_triggered);
        *slot = Some(this_completion);
        precondition
    }
}

impl Default for FenceAnalysis {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use legion_event::EventOutcome;

    #[tokio::test]
    async fn execution_fence_merges_only_completions_since_last_fence() {
        let fences = FenceAnalysis::new();
        let (u1, e1) = Event::pending();
        fences.track_completion(e1);
        let first_fence = fences.issue_execution_fence();
        assert!(!first_fence.has_triggered());
        u1.trigger();
        assert_eq!(first_fence.wait().await, EventOutcome::Triggered);

        // A second fence issued with nothing tracked since is immediately ready.
        let second_fence = fences.issue_execution_fence();
        assert_eq!(second_fence.wait().await, EventOutcome::Triggered);
    }

    #[test]
    fn mapping_fence_generation_is_monotonic() {
        let fences = FenceAnalysis::new();
        assert_eq!(fences.issue_mapping_fence(), 1);
        assert_eq!(fences.issue_mapping_fence(), 2);
        assert_eq!(fences.current_mapping_generation(), 2);
    }

    #[tokio::test]
    async fn mapping_fence_barrier_waits_on_completions_tracked_before_it() {
        let fences = FenceAnalysis::new();
        let (u1, e1) = Event::pending();
        fences.track_completion(e1);
        let generation = fences.issue_mapping_fence();
        let barrier = fences.mapping_barrier_for(generation).unwrap();
        assert!(!barrier.has_triggered());
        u1.trigger();
        assert_eq!(barrier.wait().await, EventOutcome::Triggered);
    }

    #[test]
    fn generation_zero_has_no_barrier() {
        let fences = FenceAnalysis::new();
        assert!(fences.mapping_barrier_for(0).is_none());
    }

    #[test]
    fn implicit_creation_is_serialized() {
        let fences = FenceAnalysis::new();
        let (_u1, e1) = Event::pending();
        let first_precondition = fences.serialize_creation(e1.clone());
        assert!(first_precondition.has_triggered());

        let (_u2, e2) = Event::pending();
        let second_precondition = fences.serialize_creation(e2);
        // The second creation must wait on the first's completion event.
        assert!(!second_precondition.has_triggered());
    }
}
