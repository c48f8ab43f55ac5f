use std::collections::BTreeMap;
use std::sync::Arc;

use legion_event::{Event, EventOutcome, UserEvent};
use parking_lot::Mutex;

use crate::error::{LegionError, Result};

/// A deferred result the caller can block on (spec.md §9 redesign
/// notes: "explicit futures" replacing the source's coroutine-driven
/// continuations). Wraps an `Event` so waiting on a future and waiting
/// on any other dependence-graph event compose the same way.
#[derive(Clone)]
pub struct LegionFuture {
    completion: Event,
    value: Arc<Mutex<Option<Vec<u8>>>>,
}

pub struct FutureHandle {
    trigger: UserEvent,
    value: Arc<Mutex<Option<Vec<u8>>>>,
}

impl LegionFuture {
    pub fn pending() -> (FutureHandle, LegionFuture) {
        let (trigger, completion) = Event::pending();
        let value = Arc::new(Mutex::new(None));
        (
            FutureHandle {
                trigger,
                value: value.clone(),
            },
            LegionFuture { completion, value },
        )
    }

    pub fn ready(bytes: Vec<u8>) -> Self {
        LegionFuture {
            completion: Event::already_triggered(),
            value: Arc::new(Mutex::new(Some(bytes))),
        }
    }

    /// Block until the value is available, then return its serialized
    /// bytes. Returns `Poisoned` if the producing operation failed.
    pub async fn get(&self) -> Result<Vec<u8>> {
        match self.completion.wait().await {
            EventOutcome::Triggered => Ok(self
                .value
                .lock()
                .clone()
                .expect("triggered future must carry a value")),
            EventOutcome::Poisoned => Err(LegionError::Poisoned),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.completion.has_triggered()
    }
}

impl FutureHandle {
    pub fn fulfill(self, bytes: Vec<u8>) {
        *self.value.lock() = Some(bytes);
        self.trigger.trigger();
    }

    pub fn poison(self) {
        self.trigger.trigger_poisoned();
    }
}

/// A sparse collection of futures indexed by index-launch point,
/// produced by `execute_index_space` and consumed by
/// `construct_future_map` / `reduce_future_map` / `transform_future_map`
/// (spec.md §8's operation-registration interface).
#[derive(Clone, Default)]
pub struct FutureMap {
    points: BTreeMap<u64, LegionFuture>,
}

impl FutureMap {
    pub fn new() -> Self {
        FutureMap {
            points: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, point: u64, future: LegionFuture) {
        self.points.insert(point, future);
    }

    pub fn get(&self, point: u64) -> Option<&LegionFuture> {
        self.points.get(&point)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// `reduce_future_map`: fold every point's value through `apply`,
    /// starting from `initial`. Waits for every point to complete, in
    /// point order, and poisons if any does.
    pub async fn reduce(&self, initial: Vec<u8>, apply: impl Fn(&mut Vec<u8>, &[u8])) -> Result<Vec<u8>> {
        let mut acc = initial;
        for (_point, future) in &self.points {
            let value = future.get().await?;
            apply(&mut acc, &value);
        }
        Ok(acc)
    }

    /// `transform_future_map`: produce a new future map with the same
    /// point set whose values are computed lazily from this one. The
    /// transform runs eagerly here for simplicity; a production
    /// implementation would spawn one task per point instead of
    /// blocking the caller on each in turn.
    pub async fn transform(&self, f: impl Fn(&[u8]) -> Vec<u8>) -> Result<FutureMap> {
        let mut out = FutureMap::new();
        for (&point, future) in &self.points {
            let value = future.get().await?;
            out.insert(point, LegionFuture::ready(f(&value)));
        }
        Ok(out)
    }
}
