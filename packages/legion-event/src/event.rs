use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

use tokio::sync::Notify;

/// Outcome of a triggered event. There is no language-level exception
/// mechanism here: a failed upstream operation poisons its completion
/// event, and poison propagates through every merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum EventOutcome {
    Triggered,
    Poisoned,
}

impl EventOutcome {
    pub fn is_poisoned(&self) -> bool {
        matches!(self, EventOutcome::Poisoned)
    }
}

const STATE_PENDING: u8 = 0;
const STATE_TRIGGERED: u8 = 1;
const STATE_POISONED: u8 = 2;

struct Inner {
    state: AtomicU8,
    notify: Notify,
}

/// A handle to a point in the dependence graph. Cloning an `Event` is
/// cheap (it's an `Arc`); many operations may hold the same completion
/// event as their precondition.
#[derive(Clone)]
pub struct Event(Arc<Inner>);

impl Event {
    /// An event that is already triggered; used as the identity element
    /// for merges and as the precondition of operations with no
    /// predecessors.
    pub fn already_triggered() -> Self {
        let inner = Inner {
            state: AtomicU8::new(STATE_TRIGGERED),
            notify: Notify::new(),
        };
        Event(Arc::new(inner))
    }

    pub fn already_poisoned() -> Self {
        let inner = Inner {
            state: AtomicU8::new(STATE_POISONED),
            notify: Notify::new(),
        };
        Event(Arc::new(inner))
    }

    /// Create a fresh, untriggered event plus the handle used to trigger it.
    pub fn pending() -> (UserEvent, Event) {
        let inner = Arc::new(Inner {
            state: AtomicU8::new(STATE_PENDING),
            notify: Notify::new(),
        });
        let event = Event(inner);
        (UserEvent(event.clone()), event)
    }

    pub fn has_triggered(&self) -> bool {
        self.0.state.load(Ordering::Acquire) != STATE_PENDING
    }

    /// Non-blocking peek at the outcome, `None` while still pending.
    pub fn poll_outcome(&self) -> Option<EventOutcome> {
        match self.0.state.load(Ordering::Acquire) {
            STATE_TRIGGERED => Some(EventOutcome::Triggered),
            STATE_POISONED => Some(EventOutcome::Poisoned),
            _ => None,
        }
    }

    /// Block the calling task until this event fires, returning whether
    /// it fired cleanly or poisoned.
    pub async fn wait(&self) -> EventOutcome {
        loop {
            if let Some(outcome) = self.poll_outcome() {
                return outcome;
            }
            let notified = self.0.notify.notified();
            // Re-check after registering the waiter to avoid missing a
            // trigger that happened between the first poll and here.
            if let Some(outcome) = self.poll_outcome() {
                return outcome;
            }
            notified.await;
        }
    }

    fn trigger_with(&self, outcome: EventOutcome) {
        let target = match outcome {
            EventOutcome::Triggered => STATE_TRIGGERED,
            EventOutcome::Poisoned => STATE_POISONED,
        };
        if self
            .0
            .state
            .compare_exchange(
                STATE_PENDING,
                target,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
        {
            self.0.notify.notify_waiters();
        }
    }

    /// Merge a set of events into one: the merged event triggers only
    /// once every input has triggered, and is poisoned if any input is
    /// poisoned, regardless of the others (Testable Property 7).
    pub fn merge(events: impl IntoIterator<Item = Event>) -> Event {
        let events: Vec<Event> = events.into_iter().collect();
        match events.len() {
            0 => Event::already_triggered(),
            1 => events.into_iter().next().unwrap(),
            _ => {
                let (user, merged) = Event::pending();
                tokio::spawn(async move {
                    let mut poisoned = false;
                    for e in events {
                        if e.wait().await.is_poisoned() {
                            poisoned = true;
                        }
                    }
                    if poisoned {
                        user.trigger_poisoned();
                    } else {
                        user.trigger();
                    }
                });
                merged
            }
        }
    }
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.poll_outcome() {
            Some(o) => write!(f, "Event({:?})", o),
            None => write!(f, "Event(pending)"),
        }
    }
}

/// The producer side of a pending `Event`. Only the creator holds this;
/// everyone downstream holds the `Event` returned alongside it.
pub struct UserEvent(Event);

impl UserEvent {
    pub fn trigger(&self) {
        self.0.trigger_with(EventOutcome::Triggered);
    }

    pub fn trigger_poisoned(&self) {
        self.0.trigger_with(EventOutcome::Poisoned);
    }

    pub fn event(&self) -> Event {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn already_triggered_resolves_immediately() {
        let e = Event::already_triggered();
        assert_eq!(e.wait().await, EventOutcome::Triggered);
    }

    #[tokio::test]
    async fn user_event_wakes_waiters() {
        let (user, event) = Event::pending();
        let waiter = tokio::spawn(async move { event.wait().await });
        tokio::task::yield_now().await;
        user.trigger();
        assert_eq!(waiter.await.unwrap(), EventOutcome::Triggered);
    }

    #[tokio::test]
    async fn merge_waits_for_all_inputs() {
        let (u1, e1) = Event::pending();
        let (u2, e2) = Event::pending();
        let merged = Event::merge([e1, e2]);
        assert!(!merged.has_triggered());
        u1.trigger();
        tokio::task::yield_now().await;
        assert!(!merged.has_triggered());
        u2.trigger();
        assert_eq!(merged.wait().await, EventOutcome::Triggered);
    }

    #[tokio::test]
    async fn merge_poisons_regardless_of_others(){
        let (u1, e1) = Event::pending();
        let (u2, e2) = Event::pending();
        let merged = Event::merge([e1, e2]);
        u1.trigger_poisoned();
        u2.trigger();
        assert_eq!(merged.wait().await, EventOutcome::Poisoned);
    }

    #[tokio::test]
    async fn merge_of_empty_set_is_triggered() {
        let merged = Event::merge(Vec::new());
        assert_eq!(merged.wait().await, EventOutcome::Triggered);
    }

    #[tokio::test]
    async fn merge_of_single_event_is_identity() {
        let e = Event::already_poisoned();
        let merged = Event::merge([e.clone()]);
        assert_eq!(merged.wait().await, EventOutcome::Poisoned);
    }
}
