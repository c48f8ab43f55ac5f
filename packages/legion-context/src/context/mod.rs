//! The Context variants (spec.md §3/§4.9–§4.11): `LeafContext`,
//! `InnerContext`, `ReplicateContext`, `RemoteContext`, plus the
//! `ContextFactory` that decides which one a new task gets.
//!
//! `legion_context.h` expresses these as a single `TaskContext` base
//! class with `LeafContext`/`InnerContext`/`ReplicateContext`/
//! `RemoteContext` subclasses overriding most of its virtual surface.
//! The §9 redesign flag calls for composition plus a tagged
//! variant/trait instead: here `ContextOps` is the trait every variant
//! implements, and callers that don't care which variant they're
//! holding go through `Arc<dyn ContextOps>`.

pub mod factory;
pub mod inner;
pub mod leaf;
pub mod remote;
pub mod replicate;

pub use factory::{ContextFactory, TopLevelContext};
pub use inner::InnerContext;
pub use leaf::LeafContext;
pub use remote::RemoteContext;
pub use replicate::ReplicateContext;

use std::sync::Arc;

use legion_event::{DynamicCollective, PhaseBarrier, ReductionApply};
use legion_region::{FieldId, FieldSpaceId, IndexSpaceId, LogicalPartition, LogicalRegion, RegionRequirement};

use crate::error::Result;
use crate::future::{FutureMap, LegionFuture};
use crate::ids::ContextId;

/// Every `create_partition_by_*` call from spec.md §6, collapsed into one
/// tagged variant per the §9 redesign note rather than twelve near-
/// identical trait methods. `other` is the second partition a
/// set-algebra variant (`Union`/`Intersection`/`Difference`) combines
/// with; field/image/preimage variants carry the field driving the
/// projection.
#[derive(Debug, Clone)]
pub enum PartitionKind {
    Equal { colors: u64 },
    Weights { weights: Vec<u64> },
    Union { other: LogicalPartition },
    Intersection { other: LogicalPartition },
    Difference { other: LogicalPartition },
    Field { field: FieldId },
    Image { field: FieldId, source: LogicalPartition },
    ImageRange { field: FieldId, source: LogicalPartition },
    Preimage { field: FieldId, source: LogicalPartition },
    PreimageRange { field: FieldId, source: LogicalPartition },
    Domain { colors: u64 },
    Restricted { colors: u64 },
}

/// An opaque handle to an inline mapping created by `map_region`, passed
/// back to `unmap_region`. Carries no physical-instance information
/// (out of scope per the Non-goals); it only identifies the pipeline
/// operation backing the mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InlineMappingId(pub u64);

/// The operation-registration interface every context variant
/// implements (spec.md §6). `LeafContext` rejects every method here
/// with `LeafViolation`; `InnerContext` does the real work;
/// `ReplicateContext` wraps an `InnerContext` with shard consensus;
/// `RemoteContext` proxies to whichever node owns the context.
#[async_trait::async_trait]
pub trait ContextOps: Send + Sync {
    fn id(&self) -> ContextId;

    async fn execute_task(
        &self,
        requirements: Vec<RegionRequirement>,
        mapper_id: u32,
        mapper_tag: u64,
    ) -> Result<LegionFuture>;

    async fn execute_index_space(
        &self,
        requirements: Vec<RegionRequirement>,
        domain_size: u64,
        mapper_id: u32,
        mapper_tag: u64,
    ) -> Result<FutureMap>;

    async fn issue_copy(&self, src: RegionRequirement, dst: RegionRequirement) -> Result<()>;
    async fn issue_fill(&self, requirement: RegionRequirement, value: Vec<u8>) -> Result<()>;
    async fn fill_fields(&self, requirement: RegionRequirement, value: Vec<u8>) -> Result<()>;
    async fn discard_fields(&self, requirement: RegionRequirement) -> Result<()>;

    async fn attach_resource(&self, requirement: RegionRequirement) -> Result<()>;
    async fn detach_resource(&self, requirement: RegionRequirement) -> Result<()>;
    async fn acquire(&self, requirement: RegionRequirement) -> Result<()>;
    async fn release(&self, requirement: RegionRequirement) -> Result<()>;

    async fn map_region(&self, requirement: RegionRequirement) -> Result<InlineMappingId>;
    async fn unmap_region(&self, mapping: InlineMappingId) -> Result<()>;

    fn create_index_space(&self) -> Result<IndexSpaceId>;
    async fn destroy_index_space(&self, space: IndexSpaceId) -> Result<()>;

    async fn create_partition(
        &self,
        parent: LogicalRegion,
        kind: PartitionKind,
        disjoint: bool,
    ) -> Result<u64>;
    async fn create_pending_partition(&self, parent: LogicalRegion, disjoint: bool) -> Result<u64>;

    fn create_field_space(&self) -> Result<FieldSpaceId>;
    async fn allocate_field(&self, space: FieldSpaceId, size_bytes: u32) -> Result<FieldId>;
    async fn free_field(&self, space: FieldSpaceId, field: FieldId) -> Result<()>;

    fn create_logical_region(
        &self,
        index_space: IndexSpaceId,
        field_space: FieldSpaceId,
    ) -> Result<LogicalRegion>;
    async fn destroy_logical_region(&self, region: LogicalRegion) -> Result<()>;

    async fn issue_mapping_fence(&self) -> Result<u64>;
    async fn issue_execution_fence(&self) -> Result<()>;
    async fn complete_frame(&self) -> Result<()>;

    async fn begin_trace(&self, trace_id: u64) -> Result<()>;
    async fn end_trace(&self, trace_id: u64) -> Result<()>;

    async fn create_phase_barrier(&self, arrivals: usize) -> Result<PhaseBarrier>;
    async fn advance_phase_barrier(&self, barrier: &PhaseBarrier) -> Result<PhaseBarrier>;
    async fn create_dynamic_collective(
        &self,
        arrivals: usize,
        reduction_op_id: u32,
        initial_value: Vec<u8>,
        apply: ReductionApply,
    ) -> Result<DynamicCollective>;
    async fn arrive_dynamic_collective(
        &self,
        collective: &DynamicCollective,
        value: Vec<u8>,
    ) -> Result<()>;

    async fn select_tunable_value(&self, tunable_id: u32) -> Result<Vec<u8>>;
    async fn issue_timing_measurement(&self) -> Result<LegionFuture>;

    async fn construct_future_map(&self, domain_size: u64) -> Result<FutureMap>;
    async fn reduce_future_map(
        &self,
        map: &FutureMap,
        initial: Vec<u8>,
        apply: ReductionApply,
    ) -> Result<Vec<u8>>;
    async fn transform_future_map(
        &self,
        map: &FutureMap,
        transform: Arc<dyn Fn(&[u8]) -> Vec<u8> + Send + Sync>,
    ) -> Result<FutureMap>;
}
