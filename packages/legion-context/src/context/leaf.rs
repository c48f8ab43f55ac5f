use std::sync::Arc;

use legion_event::{DynamicCollective, PhaseBarrier, ReductionApply};
use legion_region::{FieldId, FieldSpaceId, IndexSpaceId, LogicalRegion, RegionRequirement};

use crate::error::{LegionError, Result};
use crate::future::{FutureMap, LegionFuture};
use crate::ids::ContextId;

use super::{ContextOps, InlineMappingId, PartitionKind};

/// A leaf task's context: it cannot register child operations, create
/// region-tree resources, or touch any shared pipeline state (spec.md
/// §4.11, Testable Property 9). Every `ContextOps` method here returns
/// `LeafViolation` before locking anything, matching "rejects ...
/// *before touching shared state*".
pub struct LeafContext {
    id: ContextId,
    parent: Option<ContextId>,
}

impl LeafContext {
    pub fn new(parent: Option<ContextId>) -> Self {
        LeafContext {
            id: ContextId::fresh(),
            parent,
        }
    }

    pub fn parent(&self) -> Option<ContextId> {
        self.parent
    }

    fn reject(op: &'static str) -> LegionError {
        LegionError::LeafViolation { op }
    }
}

#[async_trait::async_trait]
impl ContextOps for LeafContext {
    fn id(&self) -> ContextId {
        self.id
    }

    async fn execute_task(
        &self,
        _requirements: Vec<RegionRequirement>,
        _mapper_id: u32,
        _mapper_tag: u64,
    ) -> Result<LegionFuture> {
        Err(Self::reject("execute_task"))
    }

    async fn execute_index_space(
        &self,
        _requirements: Vec<RegionRequirement>,
        _domain_size: u64,
        _mapper_id: u32,
        _mapper_tag: u64,
    ) -> Result<FutureMap> {
        Err(Self::reject("execute_index_space"))
    }

    async fn issue_copy(&self, _src: RegionRequirement, _dst: RegionRequirement) -> Result<()> {
        Err(Self::reject("issue_copy"))
    }

    async fn issue_fill(&self, _requirement: RegionRequirement, _value: Vec<u8>) -> Result<()> {
        Err(Self::reject("issue_fill"))
    }

    async fn fill_fields(&self, _requirement: RegionRequirement, _value: Vec<u8>) -> Result<()> {
        Err(Self::reject("fill_fields"))
    }

    async fn discard_fields(&self, _requirement: RegionRequirement) -> Result<()> {
        Err(Self::reject("discard_fields"))
    }

    async fn attach_resource(&self, _requirement: RegionRequirement) -> Result<()> {
        Err(Self::reject("attach_resource"))
    }

    async fn detach_resource(&self, _requirement: RegionRequirement) -> Result<()> {
        Err(Self::reject("detach_resource"))
    }

    async fn acquire(&self, _requirement: RegionRequirement) -> Result<()> {
        Err(Self::reject("acquire"))
    }

    async fn release(&self, _requirement: RegionRequirement) -> Result<()> {
        Err(Self::reject("release"))
    }

    async fn map_region(&self, _requirement: RegionRequirement) -> Result<InlineMappingId> {
        Err(Self::reject("map_region"))
    }

    async fn unmap_region(&self, _mapping: InlineMappingId) -> Result<()> {
        Err(Self::reject("unmap_region"))
    }

    fn create_index_space(&self) -> Result<IndexSpaceId> {
        Err(Self::reject("create_index_space"))
    }

    async fn destroy_index_space(&self, _space: IndexSpaceId) -> Result<()> {
        Err(Self::reject("destroy_index_space"))
    }

    async fn create_partition(
        &self,
        _parent: LogicalRegion,
        _kind: PartitionKind,
        _disjoint: bool,
    ) -> Result<u64> {
        Err(Self::reject("create_partition"))
    }

    async fn create_pending_partition(&self, _parent: LogicalRegion, _disjoint: bool) -> Result<u64> {
        Err(Self::reject("create_pending_partition"))
    }

    fn create_field_space(&self) -> Result<FieldSpaceId> {
        Err(Self::reject("create_field_space"))
    }

    async fn allocate_field(&self, _space: FieldSpaceId, _size_bytes: u32) -> Result<FieldId> {
        Err(Self::reject("allocate_field"))
    }

    async fn free_field(&self, _space: FieldSpaceId, _field: FieldId) -> Result<()> {
        Err(Self::reject("free_field"))
    }

    fn create_logical_region(
        &self,
        _index_space: IndexSpaceId,
        _field_space: FieldSpaceId,
    ) -> Result<LogicalRegion> {
        Err(Self::reject("create_logical_region"))
    }

    async fn destroy_logical_region(&self, _region: LogicalRegion) -> Result<()> {
        Err(Self::reject("destroy_logical_region"))
    }

    async fn issue_mapping_fence(&self) -> Result<u64> {
        Err(Self::reject("issue_mapping_fence"))
    }

    async fn issue_execution_fence(&self) -> Result<()> {
        Err(Self::reject("issue_execution_fence"))
    }

    async fn complete_frame(&self) -> Result<()> {
        Err(Self::reject("complete_frame"))
    }

    async fn begin_trace(&self, _trace_id: u64) -> Result<()> {
        Err(Self::reject("begin_trace"))
    }

    async fn end_trace(&self, _trace_id: u64) -> Result<()> {
        Err(Self::reject("end_trace"))
    }

    async fn create_phase_barrier(&self, _arrivals: usize) -> Result<PhaseBarrier> {
        Err(Self::reject("create_phase_barrier"))
    }

    async fn advance_phase_barrier(&self, _barrier: &PhaseBarrier) -> Result<PhaseBarrier> {
        Err(Self::reject("advance_phase_barrier"))
    }

    async fn create_dynamic_collective(
        &self,
        _arrivals: usize,
        _reduction_op_id: u32,
        _initial_value: Vec<u8>,
        _apply: ReductionApply,
    ) -> Result<DynamicCollective> {
        Err(Self::reject("create_dynamic_collective"))
    }

    async fn arrive_dynamic_collective(
        &self,
        _collective: &DynamicCollective,
        _value: Vec<u8>,
    ) -> Result<()> {
        Err(Self::reject("arrive_dynamic_collective"))
    }

    async fn select_tunable_value(&self, _tunable_id: u32) -> Result<Vec<u8>> {
        Err(Self::reject("select_tunable_value"))
    }

    async fn issue_timing_measurement(&self) -> Result<LegionFuture> {
        Err(Self::reject("issue_timing_measurement"))
    }

    async fn construct_future_map(&self, _domain_size: u64) -> Result<FutureMap> {
        Err(Self::reject("construct_future_map"))
    }

    async fn reduce_future_map(
        &self,
        _map: &FutureMap,
        _initial: Vec<u8>,
        _apply: ReductionApply,
    ) -> Result<Vec<u8>> {
        Err(Self::reject("reduce_future_map"))
    }

    async fn transform_future_map(
        &self,
        _map: &FutureMap,
        _transform: Arc<dyn Fn(&[u8]) -> Vec<u8> + Send + Sync>,
    ) -> Result<FutureMap> {
        Err(Self::reject("transform_future_map"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn leaf_context_rejects_execute_task() {
        let leaf = LeafContext::new(None);
        let result = leaf.execute_task(Vec::new(), 0, 0).await;
        assert!(matches!(
            result,
            Err(LegionError::LeafViolation { op: "execute_task" })
        ));
    }

    #[test]
    fn leaf_context_rejects_create_index_space_synchronously() {
        let leaf = LeafContext::new(None);
        assert!(leaf.create_index_space().is_err());
    }

    #[tokio::test]
    async fn leaf_context_rejects_timing_measurement_even_though_it_needs_no_inner_context() {
        // issue_timing_measurement is the one operation kind that doesn't
        // `requires_inner_context()` (spec.md §4.11 note), but a leaf still
        // has no pipeline to register it against, so it is rejected too.
        let leaf = LeafContext::new(None);
        assert!(leaf.issue_timing_measurement().await.is_err());
    }
}
