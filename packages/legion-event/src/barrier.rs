use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::event::{Event, EventOutcome, UserEvent};

/// Realm barriers live for a bounded number of generations before the
/// phase counter would overflow; once a barrier would advance past this
/// many generations it is retired and replaced by a fresh one (Testable
/// Property 10).
pub const MAX_GENERATIONS: u64 = 1 << 20;

/// Stable identity of a barrier across generation advances, distinct
/// from `LogicalBarrier`'s current generation. Two barriers compare
/// equal only if they share both id and generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct BarrierId(pub u64);

struct GenerationSlot {
    arrivals_expected: usize,
    arrivals_seen: usize,
    user_event: UserEvent,
    event: Event,
    poisoned: bool,
}

impl GenerationSlot {
    fn new(arrivals_expected: usize) -> Self {
        let (user_event, event) = Event::pending();
        GenerationSlot {
            arrivals_expected,
            arrivals_seen: 0,
            user_event,
            event,
            poisoned: false,
        }
    }
}

struct BarrierState {
    id: BarrierId,
    arrivals_per_generation: usize,
    generations: HashMap<u64, GenerationSlot>,
    next_unused_generation: u64,
}

impl BarrierState {
    fn slot(&mut self, generation: u64) -> &mut GenerationSlot {
        let arrivals = self.arrivals_per_generation;
        self.generations
            .entry(generation)
            .or_insert_with(|| GenerationSlot::new(arrivals))
    }
}

/// A named, pre-arrival-counted synchronization primitive with
/// generations (spec.md §3/§4.9). All arrivals for generation *g* occur
/// before any waiter on *g* unblocks.
#[derive(Clone)]
pub struct PhaseBarrier {
    state: Arc<Mutex<BarrierState>>,
    generation: u64,
}

impl PhaseBarrier {
    pub fn new(id: BarrierId, arrivals_per_generation: usize) -> Self {
        PhaseBarrier {
            state: Arc::new(Mutex::new(BarrierState {
                id,
                arrivals_per_generation,
                generations: HashMap::new(),
                next_unused_generation: 1,
            })),
            generation: 0,
        }
    }

    pub fn id(&self) -> BarrierId {
        self.state.lock().id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Record one arrival at this barrier's current generation. When
    /// the last expected arrival lands, the generation's event triggers.
    pub fn arrive(&self) {
        self.arrive_poisoned(false)
    }

    pub fn arrive_poisoned(&self, poisoned: bool) {
        let mut state = self.state.lock();
        let generation = self.generation;
        let slot = state.slot(generation);
        slot.arrivals_seen += 1;
        slot.poisoned |= poisoned;
        if slot.arrivals_seen >= slot.arrivals_expected {
            if slot.poisoned {
                slot.user_event.trigger_poisoned();
            } else {
                slot.user_event.trigger();
            }
        }
    }

    /// The event that becomes ready once every expected arrival for
    /// this generation has landed.
    pub fn wait_event(&self) -> Event {
        let mut state = self.state.lock();
        state.slot(self.generation).event.clone()
    }

    pub async fn wait(&self) -> EventOutcome {
        self.wait_event().wait().await
    }

    /// Advance to the next generation, reusing the same barrier id
    /// unless doing so would exceed the realm phase-generation limit,
    /// in which case the barrier is retired and a fresh id/generation-0
    /// barrier is returned (Testable Property 10: the returned barrier's
    /// current generation is not equal to any previous live generation).
    pub fn advance(&self) -> PhaseBarrier {
        let mut state = self.state.lock();
        let next_generation = self.generation + 1;
        if next_generation >= MAX_GENERATIONS {
            let fresh_id = BarrierId(state.id.0.wrapping_add(1).max(1));
            let arrivals = state.arrivals_per_generation;
            drop(state);
            return PhaseBarrier::new(fresh_id, arrivals);
        }
        state.next_unused_generation = state.next_unused_generation.max(next_generation + 1);
        drop(state);
        PhaseBarrier {
            state: self.state.clone(),
            generation: next_generation,
        }
    }

    /// Garbage-collect generation slots strictly older than `floor`; safe
    /// once no context can still hold a reference to them.
    pub fn reclaim_before(&self, floor: u64) {
        let mut state = self.state.lock();
        state.generations.retain(|&g, _| g >= floor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn arrivals_gate_the_generation() {
        let barrier = PhaseBarrier::new(BarrierId(1), 3);
        let event = barrier.wait_event();
        barrier.arrive();
        barrier.arrive();
        assert!(!event.has_triggered());
        barrier.arrive();
        assert_eq!(event.wait().await, EventOutcome::Triggered);
    }

    #[tokio::test]
    async fn poisoned_arrival_poisons_generation() {
        let barrier = PhaseBarrier::new(BarrierId(2), 2);
        barrier.arrive();
        barrier.arrive_poisoned(true);
        assert_eq!(barrier.wait().await, EventOutcome::Poisoned);
    }

    #[test]
    fn advance_moves_to_next_generation_by_default() {
        let barrier = PhaseBarrier::new(BarrierId(3), 1);
        let next = barrier.advance();
        assert_eq!(next.generation(), barrier.generation() + 1);
        assert_eq!(next.id(), barrier.id());
    }

    #[test]
    fn advance_past_limit_returns_fresh_barrier() {
        let barrier = PhaseBarrier {
            state: Arc::new(Mutex::new(BarrierState {
                id: BarrierId(9),
                arrivals_per_generation: 1,
                generations: HashMap::new(),
                next_unused_generation: MAX_GENERATIONS,
            })),
            generation: MAX_GENERATIONS - 1,
        };
        let next = barrier.advance();
        assert_ne!(next.id(), barrier.id());
        assert_eq!(next.generation(), 0);
    }

    #[tokio::test]
    async fn independent_generations_do_not_interfere() {
        let barrier = PhaseBarrier::new(BarrierId(4), 1);
        let gen0_event = barrier.wait_event();
        let gen1 = barrier.advance();
        let gen1_event = gen1.wait_event();
        barrier.arrive();
        assert_eq!(gen0_event.wait().await, EventOutcome::Triggered);
        assert!(!gen1_event.has_triggered());
    }
}
