//! Untyped low-level dependence graph: events, poison propagation,
//! phase barriers, and dynamic collectives.
//!
//! Every other crate in the workspace builds its typed dependence
//! tracking on top of the primitives here; this crate knows nothing
//! about regions, tasks, or contexts.

pub mod barrier;
pub mod collective;
pub mod event;

pub use barrier::{BarrierId, PhaseBarrier, MAX_GENERATIONS};
pub use collective::{DynamicCollective, ReductionApply};
pub use event::{Event, EventOutcome, UserEvent};
