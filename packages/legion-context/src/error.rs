use thiserror::Error;

use legion_mapper::MapperViolation;

pub type Result<T> = std::result::Result<T, LegionError>;

/// The error taxonomy for the execution context (spec.md §8). Each
/// variant's propagation policy differs: `LeafViolation`,
/// `PrivilegeViolation`, and `RegionDependence` are synchronous fatal
/// program errors; `MapperViolation` is logged and, depending on mode,
/// either fatal or a retry request back to the mapper; `ReplicationDivergence`
/// is fatal; `ResourceLeak` is a teardown-time warning, not a hard
/// failure, so callers that want to continue past it should match on it
/// explicitly rather than relying on `?`.
#[derive(Error, Debug)]
pub enum LegionError {
    #[error("operation {op} not permitted in a leaf context")]
    LeafViolation { op: &'static str },

    #[error("operation {op} requested privilege {requested:?} which its region requirement does not grant")]
    PrivilegeViolation {
        op: &'static str,
        requested: String,
    },

    #[error("operation {a} and {b} conflict under the current coherence mode")]
    RegionDependence { a: u64, b: u64 },

    #[error("mapper call violated its contract: {0}")]
    MapperViolation(#[from] MapperViolation),

    #[error("shard {shard} diverged from the replicate group on {call}: {detail}")]
    ReplicationDivergence {
        shard: u32,
        call: &'static str,
        detail: String,
    },

    #[error("context {context} ended with {count} undestroyed handle(s)")]
    ResourceLeak { context: u64, count: usize },

    #[error("awaited event was poisoned by an upstream failure")]
    Poisoned,

    #[error("serialization error: {0}")]
    Serialization(#[from] Box<bincode::ErrorKind>),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LegionError {
    pub fn privilege_violation<E: std::fmt::Debug>(op: &'static str, requested: E) -> Self {
        LegionError::PrivilegeViolation {
            op,
            requested: format!("{:?}", requested),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_violation_names_the_offending_call() {
        let err = LegionError::LeafViolation {
            op: "create_index_space",
        };
        assert!(err.to_string().contains("create_index_space"));
    }
}
