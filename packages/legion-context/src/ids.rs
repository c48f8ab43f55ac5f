use std::sync::atomic::{AtomicU64, Ordering};

/// Every context and operation draws from one process-wide monotonic
/// counter so that "every child's unique id is strictly greater than
/// the parent's" (spec.md §3, invariant ii) holds without a context
/// needing to consult its parent.
static NEXT_UNIQUE_ID: AtomicU64 = AtomicU64::new(1);

pub fn next_unique_id() -> u64 {
    NEXT_UNIQUE_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct OperationId(pub u64);

impl OperationId {
    pub fn fresh() -> Self {
        OperationId(next_unique_id())
    }
}

impl std::fmt::Display for OperationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "op#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct ContextId(pub u64);

impl ContextId {
    pub fn fresh() -> Self {
        ContextId(next_unique_id())
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_ids_are_strictly_increasing() {
        let parent = ContextId::fresh();
        let child = OperationId::fresh();
        assert!(child.0 > parent.0);
    }
}
