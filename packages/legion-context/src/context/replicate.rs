use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use legion_event::{BarrierId, DynamicCollective, PhaseBarrier, ReductionApply};
use legion_region::{FieldId, FieldSpaceId, IdAllocator, IndexSpaceId, LogicalRegion, RegionRequirement};
use parking_lot::Mutex;

use crate::error::Result;
use crate::future::{FutureMap, LegionFuture};
use crate::ids::ContextId;

use super::inner::InnerContext;
use super::{ContextOps, InlineMappingId, PartitionKind};

/// How many ids a ring refill pulls from the underlying allocator at
/// once (spec.md §4.9: "a bounded ring of precomputed ID batches").
/// Each shard hands out ids from its own local buffer between refills,
/// so the common case of allocating a handle never round-trips through
/// shard consensus.
const ID_RING_BATCH_SIZE: u64 = 64;

/// A per-shard buffer of precomputed ids, refilled in batches from a
/// process-wide allocator. The replicated control-replication model
/// this stands in for would draw matching batches on every shard from
/// the same logical sequence; this single-process implementation has
/// exactly one shard, so "the same batch on every shard" collapses to
/// "the next batch from the shared allocator".
struct IdRing {
    allocator: IdAllocator,
    buffer: Mutex<VecDeque<u64>>,
}

impl IdRing {
    fn new() -> Self {
        IdRing {
            allocator: IdAllocator::default(),
            buffer: Mutex::new(VecDeque::new()),
        }
    }

    fn next(&self) -> u64 {
        let mut buffer = self.buffer.lock();
        if let Some(id) = buffer.pop_front() {
            return id;
        }
        let batch = self.allocator.alloc_batch(ID_RING_BATCH_SIZE);
        buffer.extend(batch);
        buffer.pop_front().expect("freshly refilled ring is never empty")
    }
}

/// The three named barriers one deletable handle's shards arrive at in
/// sequence (spec.md §4.9: "a named sequence of three PhaseBarriers per
/// deletable handle, not a single barrier with three waits, because the
/// phases may be satisfied by different shards at different times").
struct ThreePhaseDeletion {
    ready: PhaseBarrier,
    mapped: PhaseBarrier,
    execution: PhaseBarrier,
    applied: AtomicBool,
}

impl ThreePhaseDeletion {
    fn new(barrier_ids: &IdAllocator, shard_count: usize) -> Self {
        ThreePhaseDeletion {
            ready: PhaseBarrier::new(BarrierId(barrier_ids.alloc()), shard_count),
            mapped: PhaseBarrier::new(BarrierId(barrier_ids.alloc()), shard_count),
            execution: PhaseBarrier::new(BarrierId(barrier_ids.alloc()), shard_count),
            applied: AtomicBool::new(false),
        }
    }

    /// Runs every shard through all three phases, then elects exactly one
    /// caller (the first past the final barrier) to perform the actual
    /// deletion. Returns `true` to the elected caller only.
    async fn run_to_completion(&self) -> bool {
        self.ready.arrive();
        self.ready.wait().await;
        self.mapped.arrive();
        self.mapped.wait().await;
        self.execution.arrive();
        self.execution.wait().await;
        !self.applied.swap(true, Ordering::SeqCst)
    }
}

/// Wraps an `InnerContext` with the bookkeeping control replication adds
/// on top (spec.md §4.9): ring-buffered id allocation for index/field
/// spaces instead of one unbroadcast counter, and a three-phase
/// deletion consensus for destroying a resource that may be referenced
/// by more than one shard. Everything else — task/copy/fill
/// registration, fences, tracing, barriers, futures — has no
/// shard-specific behavior and is delegated straight to the wrapped
/// context.
pub struct ReplicateContext {
    inner: Arc<InnerContext>,
    shard_id: u32,
    shard_count: usize,
    barrier_ids: IdAllocator,
    index_space_ring: IdRing,
    field_space_ring: IdRing,
    live_spaces: DashMap<u64, ()>,
    live_field_spaces: DashMap<u64, ()>,
    deletions: DashMap<u64, Arc<ThreePhaseDeletion>>,
}

impl ReplicateContext {
    pub fn new(inner: Arc<InnerContext>, shard_id: u32, shard_count: usize) -> Self {
        ReplicateContext {
            inner,
            shard_id,
            shard_count: shard_count.max(1),
            barrier_ids: IdAllocator::default(),
            index_space_ring: IdRing::new(),
            field_space_ring: IdRing::new(),
            live_spaces: DashMap::new(),
            live_field_spaces: DashMap::new(),
            deletions: DashMap::new(),
        }
    }

    pub fn shard_id(&self) -> u32 {
        self.shard_id
    }

    pub fn inner(&self) -> &Arc<InnerContext> {
        &self.inner
    }

    /// Field spaces this shard has created and not yet torn down. There
    /// is no `destroy_field_space` in `ContextOps` (field spaces are
    /// only ever destroyed as part of destroying the logical regions
    /// built on them), so this count only ever grows; it exists for the
    /// same leak-visibility purpose as `InnerContext::leaked_resource_count`.
    pub fn leaked_field_space_count(&self) -> usize {
        self.live_field_spaces.len()
    }

    /// Runs the three-phase deletion consensus for `handle` and reports
    /// whether this call is the one that should actually apply the
    /// deletion (spec.md S6: "applied exactly once across the shards").
    async fn consensus_delete(&self, handle: u64) -> bool {
        let deletion = self
            .deletions
            .entry(handle)
            .or_insert_with(|| Arc::new(ThreePhaseDeletion::new(&self.barrier_ids, self.shard_count)))
            .clone();
        let elected = deletion.run_to_completion().await;
        self.deletions.remove(&handle);
        elected
    }
}

#[async_trait::async_trait]
impl ContextOps for ReplicateContext {
    fn id(&self) -> ContextId {
        self.inner.id()
    }

    async fn execute_task(
        &self,
        requirements: Vec<RegionRequirement>,
        mapper_id: u32,
        mapper_tag: u64,
    ) -> Result<LegionFuture> {
        self.inner.execute_task(requirements, mapper_id, mapper_tag).await
    }

    async fn execute_index_space(
        &self,
        requirements: Vec<RegionRequirement>,
        domain_size: u64,
        mapper_id: u32,
        mapper_tag: u64,
    ) -> Result<FutureMap> {
        self.inner
            .execute_index_space(requirements, domain_size, mapper_id, mapper_tag)
            .await
    }

    async fn issue_copy(&self, src: RegionRequirement, dst: RegionRequirement) -> Result<()> {
        self.inner.issue_copy(src, dst).await
    }

    async fn issue_fill(&self, requirement: RegionRequirement, value: Vec<u8>) -> Result<()> {
        self.inner.issue_fill(requirement, value).await
    }

    async fn fill_fields(&self, requirement: RegionRequirement, value: Vec<u8>) -> Result<()> {
        self.inner.fill_fields(requirement, value).await
    }

    async fn discard_fields(&self, requirement: RegionRequirement) -> Result<()> {
        self.inner.discard_fields(requirement).await
    }

    async fn attach_resource(&self, requirement: RegionRequirement) -> Result<()> {
        self.inner.attach_resource(requirement).await
    }

    async fn detach_resource(&self, requirement: RegionRequirement) -> Result<()> {
        self.inner.detach_resource(requirement).await
    }

    async fn acquire(&self, requirement: RegionRequirement) -> Result<()> {
        self.inner.acquire(requirement).await
    }

    async fn release(&self, requirement: RegionRequirement) -> Result<()> {
        self.inner.release(requirement).await
    }

    async fn map_region(&self, requirement: RegionRequirement) -> Result<InlineMappingId> {
        self.inner.map_region(requirement).await
    }

    async fn unmap_region(&self, mapping: InlineMappingId) -> Result<()> {
        self.inner.unmap_region(mapping).await
    }

    fn create_index_space(&self) -> Result<IndexSpaceId> {
        let id = self.index_space_ring.next();
        self.live_spaces.insert(id, ());
        Ok(IndexSpaceId::new(id, 0))
    }

    async fn destroy_index_space(&self, space: IndexSpaceId) -> Result<()> {
        self.consensus_delete(space.id).await;
        self.live_spaces.remove(&space.id);
        Ok(())
    }

    async fn create_partition(
        &self,
        parent: LogicalRegion,
        kind: PartitionKind,
        disjoint: bool,
    ) -> Result<u64> {
        self.inner.create_partition(parent, kind, disjoint).await
    }

    async fn create_pending_partition(&self, parent: LogicalRegion, disjoint: bool) -> Result<u64> {
        self.inner.create_pending_partition(parent, disjoint).await
    }

    fn create_field_space(&self) -> Result<FieldSpaceId> {
        let id = self.field_space_ring.next();
        self.live_field_spaces.insert(id, ());
        Ok(FieldSpaceId::new(id, 0))
    }

    async fn allocate_field(&self, space: FieldSpaceId, size_bytes: u32) -> Result<FieldId> {
        self.inner.allocate_field(space, size_bytes).await
    }

    async fn free_field(&self, space: FieldSpaceId, field: FieldId) -> Result<()> {
        self.inner.free_field(space, field).await
    }

    fn create_logical_region(
        &self,
        index_space: IndexSpaceId,
        field_space: FieldSpaceId,
    ) -> Result<LogicalRegion> {
        self.inner.create_logical_region(index_space, field_space)
    }

    async fn destroy_logical_region(&self, region: LogicalRegion) -> Result<()> {
        let elected = self.consensus_delete(region.tree_id.id).await;
        if elected {
            self.inner.destroy_logical_region(region).await
        } else {
            Ok(())
        }
    }

    async fn issue_mapping_fence(&self) -> Result<u64> {
        self.inner.issue_mapping_fence().await
    }

    async fn issue_execution_fence(&self) -> Result<()> {
        self.inner.issue_execution_fence().await
    }

    async fn complete_frame(&self) -> Result<()> {
        self.inner.complete_frame().await
    }

    async fn begin_trace(&self, trace_id: u64) -> Result<()> {
        self.inner.begin_trace(trace_id).await
    }

    async fn end_trace(&self, trace_id: u64) -> Result<()> {
        self.inner.end_trace(trace_id).await
    }

    async fn create_phase_barrier(&self, arrivals: usize) -> Result<PhaseBarrier> {
        self.inner.create_phase_barrier(arrivals).await
    }

    async fn advance_phase_barrier(&self, barrier: &PhaseBarrier) -> Result<PhaseBarrier> {
        self.inner.advance_phase_barrier(barrier).await
    }

    async fn create_dynamic_collective(
        &self,
        arrivals: usize,
        reduction_op_id: u32,
        initial_value: Vec<u8>,
        apply: ReductionApply,
    ) -> Result<DynamicCollective> {
        self.inner
            .create_dynamic_collective(arrivals, reduction_op_id, initial_value, apply)
            .await
    }

    async fn arrive_dynamic_collective(&self, collective: &DynamicCollective, value: Vec<u8>) -> Result<()> {
        self.inner.arrive_dynamic_collective(collective, value).await
    }

    async fn select_tunable_value(&self, tunable_id: u32) -> Result<Vec<u8>> {
        self.inner.select_tunable_value(tunable_id).await
    }

    async fn issue_timing_measurement(&self) -> Result<LegionFuture> {
        self.inner.issue_timing_measurement().await
    }

    async fn construct_future_map(&self, domain_size: u64) -> Result<FutureMap> {
        self.inner.construct_future_map(domain_size).await
    }

    async fn reduce_future_map(
        &self,
        map: &FutureMap,
        initial: Vec<u8>,
        apply: ReductionApply,
    ) -> Result<Vec<u8>> {
        self.inner.reduce_future_map(map, initial, apply).await
    }

    async fn transform_future_map(
        &self,
        map: &FutureMap,
        transform: Arc<dyn Fn(&[u8]) -> Vec<u8> + Send + Sync>,
    ) -> Result<FutureMap> {
        self.inner.transform_future_map(map, transform).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use legion_mapper::{ProcessorId, TrivialMapper};
    use legion_region::SimpleForest;

    fn context() -> ReplicateContext {
        let inner = Arc::new(InnerContext::new(
            None,
            Arc::new(SimpleForest::new()),
            Arc::new(TrivialMapper::new(ProcessorId(0))),
            Arc::new(crate::profiling::NullSink),
            1024,
            0,
        ));
        ReplicateContext::new(inner, 0, 1)
    }

    #[test]
    fn index_space_ring_hands_out_distinct_ids_across_refills() {
        let ctx = context();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..(ID_RING_BATCH_SIZE * 2) {
            let space = ctx.create_index_space().unwrap();
            assert!(seen.insert(space.id));
        }
    }

    #[test]
    fn field_space_creation_is_tracked_independently_of_index_spaces() {
        let ctx = context();
        let _index_space = ctx.create_index_space().unwrap();
        let _field_space = ctx.create_field_space().unwrap();
        assert_eq!(ctx.leaked_field_space_count(), 1);
    }

    #[tokio::test]
    async fn single_shard_deletion_consensus_resolves_immediately() {
        let ctx = context();
        let space = ctx.create_index_space().unwrap();
        ctx.destroy_index_space(space).await.unwrap();
    }

    #[tokio::test]
    async fn three_shards_deleting_the_same_region_apply_it_exactly_once() {
        // Scenario S6: three shards each call destroy_logical_region(R);
        // the destruction is applied exactly once, and every shard's call
        // only returns once all three have arrived.
        let inner = Arc::new(InnerContext::new(
            None,
            Arc::new(SimpleForest::new()),
            Arc::new(TrivialMapper::new(ProcessorId(0))),
            Arc::new(crate::profiling::NullSink),
            1024,
            0,
        ));
        let index_space = inner.create_index_space().unwrap();
        let field_space = inner.create_field_space().unwrap();
        let region = inner.create_logical_region(index_space, field_space).unwrap();

        let ctx = Arc::new(ReplicateContext::new(inner, 0, 3));
        let elected_count = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..3 {
            let ctx = ctx.clone();
            let elected_count = elected_count.clone();
            handles.push(tokio::spawn(async move {
                let elected = ctx.consensus_delete(region.tree_id.id).await;
                if elected {
                    elected_count.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(elected_count.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
