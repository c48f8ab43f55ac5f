use std::sync::Arc;

use dashmap::DashMap;
use legion_event::{DynamicCollective, PhaseBarrier, ReductionApply};
use legion_region::{FieldId, FieldSpaceId, IndexSpaceId, LogicalRegion, RegionRequirement};
use tokio::sync::mpsc;

use crate::error::{LegionError, Result};
use crate::future::{FutureMap, LegionFuture};
use crate::ids::ContextId;

use super::{ContextOps, InlineMappingId, PartitionKind};

/// One request a `RemoteContext` forwards to the node that actually owns
/// the context. The response channel is embedded so the sender doesn't
/// need a separate correlation table; `RemoteContext` holds one sender
/// per owning node, not one per outstanding call.
pub enum RemoteRequest {
    DestroyIndexSpace(IndexSpaceId),
    DestroyLogicalRegion(LogicalRegion),
    IssueMappingFence,
    IssueExecutionFence,
}

/// A thin proxy for a context that lives on another node (spec.md
/// §4.10): it holds a channel/handle back to the owning node plus a
/// `DashMap`-backed read-mostly cache of whatever that node has already
/// told it, with explicit invalidation rather than a TTL. The actual
/// wire transport is out of scope (Non-goal: "a specific inter-node
/// transport"); this is the seam a transport would plug into.
pub struct RemoteContext {
    id: ContextId,
    owning_node: u32,
    requests: mpsc::UnboundedSender<RemoteRequest>,
    field_space_cache: DashMap<u64, FieldSpaceId>,
}

impl RemoteContext {
    pub fn new(id: ContextId, owning_node: u32, requests: mpsc::UnboundedSender<RemoteRequest>) -> Self {
        RemoteContext {
            id,
            owning_node,
            requests,
            field_space_cache: DashMap::new(),
        }
    }

    pub fn owning_node(&self) -> u32 {
        self.owning_node
    }

    /// Drop every cached fact about the owning node's state, e.g. after
    /// a fence or deletion that could have changed it.
    pub fn invalidate_cache(&self) {
        self.field_space_cache.clear();
    }

    fn send(&self, request: RemoteRequest) -> Result<()> {
        self.requests
            .send(request)
            .map_err(|_| LegionError::Other(anyhow::anyhow!("owning node {} is unreachable", self.owning_node)))
    }

    fn unsupported(op: &'static str) -> LegionError {
        LegionError::Other(anyhow::anyhow!(
            "{op} requires routing through the owning node's real InnerContext, which this proxy does not embed"
        ))
    }
}

#[async_trait::async_trait]
impl ContextOps for RemoteContext {
    fn id(&self) -> ContextId {
        self.id
    }

    async fn execute_task(
        &self,
        _requirements: Vec<RegionRequirement>,
        _mapper_id: u32,
        _mapper_tag: u64,
    ) -> Result<LegionFuture> {
        Err(Self::unsupported("execute_task"))
    }

    async fn execute_index_space(
        &self,
        _requirements: Vec<RegionRequirement>,
        _domain_size: u64,
        _mapper_id: u32,
        _mapper_tag: u64,
    ) -> Result<FutureMap> {
        Err(Self::unsupported("execute_index_space"))
    }

    async fn issue_copy(&self, _src: RegionRequirement, _dst: RegionRequirement) -> Result<()> {
        Err(Self::unsupported("issue_copy"))
    }

    async fn issue_fill(&self, _requirement: RegionRequirement, _value: Vec<u8>) -> Result<()> {
        Err(Self::unsupported("issue_fill"))
    }

    async fn fill_fields(&self, _requirement: RegionRequirement, _value: Vec<u8>) -> Result<()> {
        Err(Self::unsupported("fill_fields"))
    }

    async fn discard_fields(&self, _requirement: RegionRequirement) -> Result<()> {
        Err(Self::unsupported("discard_fields"))
    }

    async fn attach_resource(&self, _requirement: RegionRequirement) -> Result<()> {
        Err(Self::unsupported("attach_resource"))
    }

    async fn detach_resource(&self, _requirement: RegionRequirement) -> Result<()> {
        Err(Self::unsupported("detach_resource"))
    }

    async fn acquire(&self, _requirement: RegionRequirement) -> Result<()> {
        Err(Self::unsupported("acquire"))
    }

    async fn release(&self, _requirement: RegionRequirement) -> Result<()> {
        Err(Self::unsupported("release"))
    }

    async fn map_region(&self, _requirement: RegionRequirement) -> Result<InlineMappingId> {
        Err(Self::unsupported("map_region"))
    }

    async fn unmap_region(&self, _mapping: InlineMappingId) -> Result<()> {
        Err(Self::unsupported("unmap_region"))
    }

    fn create_index_space(&self) -> Result<IndexSpaceId> {
        Err(Self::unsupported("create_index_space"))
    }

    async fn destroy_index_space(&self, space: IndexSpaceId) -> Result<()> {
        self.send(RemoteRequest::DestroyIndexSpace(space))?;
        self.invalidate_cache();
        Ok(())
    }

    async fn create_partition(
        &self,
        _parent: LogicalRegion,
        _kind: PartitionKind,
        _disjoint: bool,
    ) -> Result<u64> {
        Err(Self::unsupported("create_partition"))
    }

    async fn create_pending_partition(&self, _parent: LogicalRegion, _disjoint: bool) -> Result<u64> {
        Err(Self::unsupported("create_pending_partition"))
    }

    fn create_field_space(&self) -> Result<FieldSpaceId> {
        Err(Self::unsupported("create_field_space"))
    }

    async fn allocate_field(&self, _space: FieldSpaceId, _size_bytes: u32) -> Result<FieldId> {
        Err(Self::unsupported("allocate_field"))
    }

    async fn free_field(&self, _space: FieldSpaceId, _field: FieldId) -> Result<()> {
        Err(Self::unsupported("free_field"))
    }

    fn create_logical_region(
        &self,
        _index_space: IndexSpaceId,
        _field_space: FieldSpaceId,
    ) -> Result<LogicalRegion> {
        Err(Self::unsupported("create_logical_region"))
    }

    async fn destroy_logical_region(&self, region: LogicalRegion) -> Result<()> {
        self.send(RemoteRequest::DestroyLogicalRegion(region))?;
        self.invalidate_cache();
        Ok(())
    }

    async fn issue_mapping_fence(&self) -> Result<u64> {
        self.send(RemoteRequest::IssueMappingFence)?;
        Err(Self::unsupported("issue_mapping_fence generation reply"))
    }

    async fn issue_execution_fence(&self) -> Result<()> {
        self.send(RemoteRequest::IssueExecutionFence)?;
        self.invalidate_cache();
        Ok(())
    }

    async fn complete_frame(&self) -> Result<()> {
        Err(Self::unsupported("complete_frame"))
    }

    async fn begin_trace(&self, _trace_id: u64) -> Result<()> {
        Err(Self::unsupported("begin_trace"))
    }

    async fn end_trace(&self, _trace_id: u64) -> Result<()> {
        Err(Self::unsupported("end_trace"))
    }

    async fn create_phase_barrier(&self, _arrivals: usize) -> Result<PhaseBarrier> {
        Err(Self::unsupported("create_phase_barrier"))
    }

    async fn advance_phase_barrier(&self, _barrier: &PhaseBarrier) -> Result<PhaseBarrier> {
        Err(Self::unsupported("advance_phase_barrier"))
    }

    async fn create_dynamic_collective(
        &self,
        _arrivals: usize,
        _reduction_op_id: u32,
        _initial_value: Vec<u8>,
        _apply: ReductionApply,
    ) -> Result<DynamicCollective> {
        Err(Self::unsupported("create_dynamic_collective"))
    }

    async fn arrive_dynamic_collective(&self, _collective: &DynamicCollective, _value: Vec<u8>) -> Result<()> {
        Err(Self::unsupported("arrive_dynamic_collective"))
    }

    async fn select_tunable_value(&self, _tunable_id: u32) -> Result<Vec<u8>> {
        Err(Self::unsupported("select_tunable_value"))
    }

    async fn issue_timing_measurement(&self) -> Result<LegionFuture> {
        Err(Self::unsupported("issue_timing_measurement"))
    }

    async fn construct_future_map(&self, _domain_size: u64) -> Result<FutureMap> {
        Err(Self::unsupported("construct_future_map"))
    }

    async fn reduce_future_map(
        &self,
        _map: &FutureMap,
        _initial: Vec<u8>,
        _apply: ReductionApply,
    ) -> Result<Vec<u8>> {
        Err(Self::unsupported("reduce_future_map"))
    }

    async fn transform_future_map(
        &self,
        _map: &FutureMap,
        _transform: Arc<dyn Fn(&[u8]) -> Vec<u8> + Send + Sync>,
    ) -> Result<FutureMap> {
        Err(Self::unsupported("transform_future_map"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn destroy_index_space_forwards_a_request_and_invalidates_cache() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let remote = RemoteContext::new(ContextId::fresh(), 7, tx);
        remote.field_space_cache.insert(1, FieldSpaceId::new(1, 0));
        remote.destroy_index_space(IndexSpaceId::new(3, 0)).await.unwrap();
        assert!(remote.field_space_cache.is_empty());
        assert!(matches!(rx.recv().await, Some(RemoteRequest::DestroyIndexSpace(_))));
    }

    #[tokio::test]
    async fn unreachable_node_surfaces_as_an_error_instead_of_panicking() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let remote = RemoteContext::new(ContextId::fresh(), 1, tx);
        assert!(remote.destroy_index_space(IndexSpaceId::new(1, 0)).await.is_err());
    }
}
