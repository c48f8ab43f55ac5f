//! Typed index/field/region handles and a reference region-tree forest.
//!
//! The real region-tree forest (index/field/region metadata, partition
//! color spaces, equivalence sets) lives outside this crate's scope; what
//! this crate provides is the typed-handle surface the context and
//! mapper crates depend on, plus `RegionForest` — a trait narrow enough
//! that a production forest implementation can sit behind it without
//! this crate ever needing to know about physical instances.

pub mod forest;
pub mod ids;
pub mod requirement;

pub use forest::{PartitionInfo, RegionForest, SimpleForest};
pub use ids::{FieldId, FieldSpaceId, Generational, IdAllocator, IndexSpaceId, LogicalPartition, LogicalRegion, RegionTreeId};
pub use requirement::{CoherenceMode, Privilege, RegionRequirement, RequirementTarget};
