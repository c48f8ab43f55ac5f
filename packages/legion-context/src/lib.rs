//! Execution context and operation pipeline (spec.md §§3–9): the part of
//! a task-based runtime that turns a sequence of region-touching calls
//! into a dependence graph, drives each operation through its
//! Executing→Executed→Complete→Committed stages, and bounds how far a
//! context is allowed to run ahead of its own commit frontier.
//!
//! `legion_context.h`/`.cc` express this as one `TaskContext` hierarchy
//! mixing scheduling, mapping, and bookkeeping together; this crate
//! splits those concerns into their own modules (`reorder_buffer`,
//! `pipeline_queues`, `fence`, `trace`, `window`) and the `context`
//! module's four `ContextOps` implementations compose them.

pub mod cli;
pub mod context;
pub mod error;
pub mod fence;
pub mod future;
pub mod ids;
pub mod operation;
pub mod pipeline_queues;
pub mod profiling;
pub mod reorder_buffer;
pub mod trace;
pub mod window;

pub use cli::RuntimeConfig;
pub use context::{
    ContextFactory, ContextOps, InlineMappingId, InnerContext, LeafContext, PartitionKind,
    RemoteContext, ReplicateContext, TopLevelContext,
};
pub use error::{LegionError, Result};
pub use future::{FutureMap, LegionFuture};
pub use ids::{ContextId, OperationId};
pub use operation::{OperationBase, OperationKind, Stage};
pub use profiling::{NullSink, ProfilerSink, ProfilingEvent, TracingSink};
