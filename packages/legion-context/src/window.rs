use std::sync::atomic::{AtomicUsize, Ordering};

use legion_event::Event;
use tokio::sync::Notify;

/// A counting gate that admits up to `capacity` concurrent holders and
/// only wakes waiters once the count has dropped to a release threshold
/// below capacity, rather than the instant a single slot frees up. Both
/// the runahead window and the outstanding-frame cap are instances of
/// this same shape (spec.md §4.4), so they share this primitive instead
/// of each hand-rolling their own counter-plus-notify.
pub struct Backpressure {
    capacity: usize,
    release_threshold: usize,
    outstanding: AtomicUsize,
    notify: Notify,
}

impl Backpressure {
    /// `hysteresis` is the fraction of `capacity` the count must drop
    /// below `capacity` before waiters are released (default 0.25,
    /// i.e. 25% below the window per spec.md §4.4).
    pub fn new(capacity: usize, hysteresis: f64) -> Self {
        let margin = (capacity as f64 * hysteresis).floor() as usize;
        Backpressure {
            capacity,
            release_threshold: capacity.saturating_sub(margin).max(1) - 1,
            outstanding: AtomicUsize::new(0),
            notify: Notify::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// Block until a slot is available, then take it. Returns
    /// immediately if the gate isn't currently at capacity.
    pub async fn acquire(&self) {
        loop {
            let current = self.outstanding.load(Ordering::Acquire);
            if current < self.capacity
                && self
                    .outstanding
                    .compare_exchange(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
            {
                return;
            }
            let notified = self.notify.notified();
            if self.outstanding.load(Ordering::Acquire) < self.capacity {
                continue;
            }
            notified.await;
        }
    }

    /// Release a held slot. Waiters are only woken once the count has
    /// fallen to the hysteresis release threshold, avoiding the
    /// thundering-herd wakeup-per-commit pattern a naive "wake on any
    /// decrement" gate would produce under steady-state churn.
    pub fn release(&self) {
        let previous = self.outstanding.fetch_sub(1, Ordering::AcqRel);
        if previous - 1 <= self.release_threshold {
            self.notify.notify_waiters();
        }
    }
}

/// Caps the number of outstanding unretired children of a context and
/// blocks `register_new_child_operation` once that cap is reached
/// (spec.md §4.4, Testable Property 3: "Window cap").
pub struct RunaheadWindow {
    gate: Backpressure,
}

impl RunaheadWindow {
    pub const DEFAULT_WINDOW_SIZE: usize = 1024;
    pub const DEFAULT_HYSTERESIS: f64 = 0.25;

    pub fn new(window_size: usize) -> Self {
        RunaheadWindow {
            gate: Backpressure::new(window_size, Self::DEFAULT_HYSTERESIS),
        }
    }

    pub fn window_size(&self) -> usize {
        self.gate.capacity()
    }

    pub fn outstanding(&self) -> usize {
        self.gate.outstanding()
    }

    pub async fn register_child(&self) {
        self.gate.acquire().await;
    }

    pub fn retire_child(&self) {
        self.gate.release();
    }
}

impl Default for RunaheadWindow {
    fn default() -> Self {
        Self::new(Self::DEFAULT_WINDOW_SIZE)
    }
}

/// Groups operations into coarse dependence units; the next frame's
/// operations do not begin execution until the previous frame's
/// completion event triggers (spec.md §4.6). `max_outstanding_frames`
/// additionally caps how many frames may be in flight at once, reusing
/// the same hysteresis gate the runahead window uses.
pub struct FrameTracker {
    gate: Option<Backpressure>,
    previous_frame_completion: parking_lot::Mutex<Event>,
}

impl FrameTracker {
    pub fn new(max_outstanding_frames: usize) -> Self {
        FrameTracker {
            gate: if max_outstanding_frames == 0 {
                None
            } else {
                Some(Backpressure::new(
                    max_outstanding_frames,
                    RunaheadWindow::DEFAULT_HYSTERESIS,
                ))
            },
            previous_frame_completion: parking_lot::Mutex::new(Event::already_triggered()),
        }
    }

    /// The precondition the next frame's first operation must wait on.
    pub fn next_frame_precondition(&self) -> Event {
        self.previous_frame_completion.lock().clone()
    }

    /// `complete_frame`: record this frame's completion event as the
    /// gate for the next frame, and (if frame capping is enabled) block
    /// until a frame slot is free.
    pub async fn complete_frame(&self, completion: Event) {
        if let Some(gate) = &self.gate {
            gate.acquire().await;
        }
        *self.previous_frame_completion.lock() = completion;
    }

    pub fn retire_frame(&self) {
        if let Some(gate) = &self.gate {
            gate.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use legion_event::EventOutcome;

    #[tokio::test]
    async fn register_child_blocks_at_capacity_until_hysteresis_releases() {
        let window = RunaheadWindow::new(4);
        for _ in 0..4 {
            window.register_child().await;
        }
        assert_eq!(window.outstanding(), 4);

        let registered = std::sync::Arc::new(tokio::sync::Notify::new());
        let registered_clone = registered.clone();
        let window = std::sync::Arc::new(window);
        let window_clone = window.clone();
        let waiter = tokio::spawn(async move {
            window_clone.register_child().await;
            registered_clone.notify_one();
        });

        tokio::task::yield_now().await;
        // Releasing one slot (down to 3 outstanding) must not be enough:
        // the hysteresis threshold for window=4 is floor(4*0.25)=1 margin,
        // so the release threshold is capacity - margin - 1 = 2.
        window.retire_child();
        tokio::time::timeout(tokio::time::Duration::from_millis(50), registered.notified())
            .await
            .expect_err("waiter should not wake after a single retirement");

        window.retire_child();
        registered.notified().await;
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn frame_tracker_gates_next_frame_on_previous_completion() {
        let tracker = FrameTracker::new(0);
        let (user, completion) = Event::pending();
        tracker.complete_frame(completion.clone()).await;
        let precondition = tracker.next_frame_precondition();
        assert!(!precondition.has_triggered());
        user.trigger();
        assert_eq!(precondition.wait().await, EventOutcome::Triggered);
    }
}
