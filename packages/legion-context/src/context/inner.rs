use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use legion_event::{DynamicCollective, Event, EventOutcome, PhaseBarrier, ReductionApply, UserEvent};
use legion_mapper::{
    Mapper, MapCopyInput, MapInlineInput, MapReleaseInput, MapTaskInput, MapperValidator,
    ProcessorId, SelectTunableValueInput, TaskId,
};
use legion_region::{
    CoherenceMode, FieldId, FieldSpaceId, IdAllocator, IndexSpaceId, LogicalRegion, Privilege,
    RegionForest, RegionRequirement, RequirementTarget,
};
use parking_lot::Mutex;

use crate::error::{LegionError, Result};
use crate::fence::FenceAnalysis;
use crate::future::{FutureMap, LegionFuture};
use crate::ids::ContextId;
use crate::operation::{OperationBase, OperationKind, Stage};
use crate::pipeline_queues::PipelineQueues;
use crate::profiling::{ProfilerSink, ProfilingEvent};
use crate::reorder_buffer::{ReorderBuffer, SharedOperation};
use crate::trace::{OperationFingerprint, TraceCache, TraceTemplate};
use crate::window::{FrameTracker, RunaheadWindow};

use super::{ContextOps, InlineMappingId, PartitionKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ResourceKind {
    IndexSpace,
    FieldSpace,
    Field,
    Region,
    Partition,
}

struct TraceRecording {
    trace_id: u64,
    fingerprints: Vec<OperationFingerprint>,
    touched_trees: HashSet<legion_region::RegionTreeId>,
}

fn field_mask(fields: &std::collections::BTreeSet<FieldId>) -> u64 {
    fields.iter().fold(0u64, |acc, f| acc | (1u64 << (f.0 % 64)))
}

fn operation_kind_name(kind: OperationKind) -> &'static str {
    match kind {
        OperationKind::Task => "execute_task",
        OperationKind::IndexTask => "execute_index_space",
        OperationKind::Copy => "issue_copy",
        OperationKind::IndexCopy => "issue_index_copy",
        OperationKind::Fill => "issue_fill",
        OperationKind::IndexFill => "issue_index_fill",
        OperationKind::Inline => "map_region",
        OperationKind::Acquire => "acquire",
        OperationKind::Release => "release",
        OperationKind::Attach => "attach_resource",
        OperationKind::Detach => "detach_resource",
        OperationKind::Discard => "discard_fields",
        OperationKind::Partition => "create_partition",
        OperationKind::Close => "close",
        OperationKind::Refinement => "refinement",
        OperationKind::Fence => "issue_execution_fence",
        OperationKind::Frame => "complete_frame",
        OperationKind::TraceBegin => "begin_trace",
        OperationKind::TraceEnd => "end_trace",
        OperationKind::TraceSummary => "trace_summary",
        OperationKind::MustEpoch => "must_epoch",
        OperationKind::TimingMeasurement => "issue_timing_measurement",
        OperationKind::TunableSelection => "select_tunable_value",
        OperationKind::Deletion => "destroy_logical_region",
    }
}

/// Advance one operation through executed → complete → committed once its
/// precondition resolves, then (if given) fire `companion` once the
/// operation's own completion event has resolved — regardless of which
/// concurrent call actually performed the transition, since every push is
/// always followed by a `drain_batch` attempt on the same queue, so an
/// item already drained by a sibling call is guaranteed to have been
/// processed by the time this function would otherwise race it.
async fn run_operation_to_completion(
    op: SharedOperation,
    queues: Arc<PipelineQueues>,
    reorder: Arc<ReorderBuffer>,
    window: Arc<RunaheadWindow>,
    profiler: Arc<dyn ProfilerSink>,
    companion: Option<UserEvent>,
) {
    let precondition = op.lock().precondition();
    let outcome = precondition.wait().await;
    {
        let mut guard = op.lock();
        if guard.stage() == Stage::Executing {
            let _ = guard.mark_executed(outcome);
        }
    }

    queues.executed.push(op.clone());
    let batch = queues.executed.drain_batch();
    for item in &batch {
        let mut guard = item.lock();
        if guard.stage() == Stage::Executed {
            let _ = guard.complete();
            profiler.record(ProfilingEvent::OperationCompleted {
                id: guard.id,
                kind: guard.kind,
                execution_micros: 0,
            });
        }
    }
    for item in &batch {
        queues.complete.push(item.clone());
    }

    let batch = queues.complete.drain_batch();
    for item in &batch {
        let mut guard = item.lock();
        if guard.stage() == Stage::Complete {
            let _ = guard.commit();
            profiler.record(ProfilingEvent::OperationCommitted { id: guard.id });
        }
    }
    for item in &batch {
        window.retire_child();
        queues.committed.push(item.clone());
    }

    reorder.reclaim_committed();

    if let Some(trigger) = companion {
        let completion = op.lock().completion_event();
        match completion.wait().await {
            EventOutcome::Triggered => trigger.trigger(),
            EventOutcome::Poisoned => trigger.trigger_poisoned(),
        }
    }
}

/// A parent task's view onto its children (spec.md §3/§4): accepts new
/// operations, runs logical dependence analysis against the live reorder
/// buffer, drives each operation through the pipeline, manages the
/// runahead window and frames, and owns the region-tree resources it has
/// created until they are destroyed.
pub struct InnerContext {
    id: ContextId,
    parent: Option<ContextId>,
    forest: Arc<dyn RegionForest>,
    mapper: Arc<dyn Mapper>,
    mapper_debug: bool,
    granted: Vec<RegionRequirement>,
    profiler: Arc<dyn ProfilerSink>,
    reorder_buffer: Arc<ReorderBuffer>,
    queues: Arc<PipelineQueues>,
    window: Arc<RunaheadWindow>,
    frames: Arc<FrameTracker>,
    fences: Arc<FenceAnalysis>,
    traces: Arc<TraceCache>,
    next_context_index: AtomicUsize,
    index_space_ids: IdAllocator,
    field_space_ids: IdAllocator,
    field_ids: IdAllocator,
    partition_ids: IdAllocator,
    tree_ids: IdAllocator,
    barrier_ids: IdAllocator,
    live_resources: DashMap<(ResourceKind, u64), ()>,
    inline_mappings: DashMap<u64, SharedOperation>,
    recording: Mutex<Option<TraceRecording>>,
    replaying: Mutex<Option<(TraceTemplate, usize)>>,
}

impl InnerContext {
    pub fn new(
        parent: Option<ContextId>,
        forest: Arc<dyn RegionForest>,
        mapper: Arc<dyn Mapper>,
        profiler: Arc<dyn ProfilerSink>,
        window_size: usize,
        max_outstanding_frames: usize,
    ) -> Self {
        Self::with_mapper_debug_and_grants(
            parent,
            forest,
            mapper,
            profiler,
            window_size,
            max_outstanding_frames,
            true,
            Vec::new(),
        )
    }

    /// Full constructor: `mapper_debug` gates `MapperValidator` checks on
    /// every per-operation mapper call (spec.md §8's safe-mode flag),
    /// and `granted` is the set of region requirements this context's
    /// parent granted it — empty means unrestricted, which is what the
    /// top-level context and most tests want (spec.md §3's privilege
    /// rule only binds a context whose parent actually scoped it).
    pub fn with_mapper_debug_and_grants(
        parent: Option<ContextId>,
        forest: Arc<dyn RegionForest>,
        mapper: Arc<dyn Mapper>,
        profiler: Arc<dyn ProfilerSink>,
        window_size: usize,
        max_outstanding_frames: usize,
        mapper_debug: bool,
        granted: Vec<RegionRequirement>,
    ) -> Self {
        InnerContext {
            id: ContextId::fresh(),
            parent,
            forest,
            mapper,
            mapper_debug,
            granted,
            profiler,
            reorder_buffer: Arc::new(ReorderBuffer::new()),
            queues: Arc::new(PipelineQueues::new()),
            window: Arc::new(RunaheadWindow::new(window_size)),
            frames: Arc::new(FrameTracker::new(max_outstanding_frames)),
            fences: Arc::new(FenceAnalysis::new()),
            traces: Arc::new(TraceCache::new()),
            next_context_index: AtomicUsize::new(0),
            index_space_ids: IdAllocator::default(),
            field_space_ids: IdAllocator::default(),
            field_ids: IdAllocator::default(),
            partition_ids: IdAllocator::default(),
            tree_ids: IdAllocator::default(),
            barrier_ids: IdAllocator::default(),
            live_resources: DashMap::new(),
            inline_mappings: DashMap::new(),
            recording: Mutex::new(None),
            replaying: Mutex::new(None),
        }
    }

    pub fn parent(&self) -> Option<ContextId> {
        self.parent
    }

    pub fn outstanding_children(&self) -> usize {
        self.window.outstanding()
    }

    pub fn reorder_buffer_len(&self) -> usize {
        self.reorder_buffer.len()
    }

    /// How many created region-tree resources remain undestroyed. A
    /// nonzero count at teardown is a `ResourceLeak`, not a panic: the
    /// caller decides whether that's fatal (spec.md §7).
    pub fn leaked_resource_count(&self) -> usize {
        self.live_resources.len()
    }

    pub fn verify_no_leaks(&self) -> Result<()> {
        let count = self.leaked_resource_count();
        if count == 0 {
            Ok(())
        } else {
            Err(LegionError::ResourceLeak {
                context: self.id.0,
                count,
            })
        }
    }

    fn next_context_index(&self) -> usize {
        self.next_context_index.fetch_add(1, Ordering::Relaxed)
    }

    /// Check a would-be operation's own requirement list against what
    /// this context was granted, and against itself for internal
    /// conflicts (spec.md §3/§8). A context with an empty `granted` list
    /// is unrestricted — only contexts actually scoped to a parent's
    /// task requirements are checked.
    fn check_privileges(&self, kind: OperationKind, requirements: &[RegionRequirement]) -> Result<()> {
        for i in 0..requirements.len() {
            for other in &requirements[i + 1..] {
                if requirements[i].conflicts_with(other) {
                    return Err(LegionError::RegionDependence {
                        a: requirements[i].region().map(|r| r.tree_id.id).unwrap_or(0),
                        b: other.region().map(|r| r.tree_id.id).unwrap_or(0),
                    });
                }
            }
        }

        if self.granted.is_empty() {
            return Ok(());
        }
        for requirement in requirements {
            let Some(region) = requirement.region() else {
                continue;
            };
            let covered = self.granted.iter().any(|granted| {
                granted.region() == Some(region)
                    && granted.fields.is_superset(&requirement.fields)
                    && granted.privilege.permits(&requirement.privilege)
            });
            if !covered {
                return Err(LegionError::privilege_violation(
                    operation_kind_name(kind),
                    requirement.privilege,
                ));
            }
        }
        Ok(())
    }

    /// Call the one real mapper method each kind of operation maps
    /// through (spec.md §6), validating the result against
    /// `MapperValidator` when `mapper_debug` is set, and return the
    /// decision serialized for the trace fingerprint (spec.md §4.7).
    /// Kinds with no single corresponding mapper call (fences, frames,
    /// deletions, tunable selection which already calls its own mapper
    /// method in `select_tunable_value`, ...) record no decision.
    async fn consult_mapper(&self, kind: OperationKind, requirements: &[RegionRequirement]) -> Result<Vec<u8>> {
        match kind {
            OperationKind::Task | OperationKind::IndexTask => {
                let input = MapTaskInput {
                    task_id: TaskId(0),
                    requirement_count: requirements.len(),
                    target_proc: ProcessorId(0),
                };
                let output = self.mapper.map_task(input.clone()).await;
                if self.mapper_debug {
                    MapperValidator::validate_map_task(&input, &output)?;
                }
                Ok(bincode::serialize(&output)?)
            }
            OperationKind::Copy | OperationKind::IndexCopy => {
                let src_requirements = requirements.len() / 2;
                let output = self
                    .mapper
                    .map_copy(MapCopyInput {
                        src_requirements,
                        dst_requirements: requirements.len() - src_requirements,
                    })
                    .await;
                Ok(bincode::serialize(&output)?)
            }
            OperationKind::Inline => {
                let Some(region) = requirements.first().and_then(|r| r.region()) else {
                    return Ok(Vec::new());
                };
                let output = self.mapper.map_inline(MapInlineInput { requirement: region }).await;
                Ok(bincode::serialize(&output)?)
            }
            OperationKind::Release => {
                let Some(region) = requirements.first().and_then(|r| r.region()) else {
                    return Ok(Vec::new());
                };
                let output = self.mapper.map_release(MapReleaseInput { requirement: region }).await;
                Ok(bincode::serialize(&output)?)
            }
            _ => Ok(Vec::new()),
        }
    }

    fn future_for_operation(&self, op: SharedOperation) -> LegionFuture {
        let (handle, future) = LegionFuture::pending();
        tokio::spawn(async move {
            let completion = op.lock().completion_event();
            match completion.wait().await {
                EventOutcome::Triggered => handle.fulfill(Vec::new()),
                EventOutcome::Poisoned => handle.poison(),
            }
        });
        future
    }

    /// Register one operation: block on the runahead window, compute its
    /// precondition from logical dependence analysis (or skip that in
    /// favor of the active trace replay), push it onto the reorder buffer
    /// and the executing queue, and hand its lifecycle off to a pipeline
    /// task (spec.md §4.1–§4.3, §4.7).
    async fn register_operation_internal(
        &self,
        kind: OperationKind,
        requirements: Vec<RegionRequirement>,
        mapper_id: u32,
        mapper_tag: u64,
        extra_precondition: Option<Event>,
        companion: Option<UserEvent>,
    ) -> Result<SharedOperation> {
        self.window.register_child().await;
        self.check_privileges(kind, &requirements)?;
        let mapper_decision = self.consult_mapper(kind, &requirements).await?;

        if let Some(recording) = self.recording.lock().as_mut() {
            recording.fingerprints.push(OperationFingerprint {
                kind,
                field_mask: field_mask(&requirements.iter().flat_map(|r| r.fields.clone()).collect()),
                access_mask: 0,
                mapper_decision: mapper_decision.clone(),
            });
            for requirement in &requirements {
                if let Some(region) = requirement.region() {
                    recording.touched_trees.insert(region.tree_id);
                }
            }
        }

        let mut skip_dependence_analysis = false;
        if let Some((template, cursor)) = self.replaying.lock().as_mut() {
            if *cursor < template.fingerprints.len() && template.fingerprints[*cursor].kind == kind {
                skip_dependence_analysis = true;
                *cursor += 1;
            } else {
                tracing::warn!(?kind, "trace replay diverged from recorded template, falling back to logical analysis");
            }
        }

        let mut preconditions = Vec::new();
        if let Some(extra) = extra_precondition {
            preconditions.push(extra);
        }
        let mapping_generation = self.fences.current_mapping_generation();
        if mapping_generation > 0 {
            if let Some(barrier) = self.fences.mapping_barrier_for(mapping_generation) {
                preconditions.push(barrier);
            }
        }
        if !skip_dependence_analysis {
            for existing in self.reorder_buffer.snapshot() {
                let existing_guard = existing.lock();
                let conflicts = requirements.iter().any(|nr| {
                    existing_guard
                        .requirements
                        .iter()
                        .any(|er| self.forest.conflicts(er, nr))
                });
                if conflicts {
                    preconditions.push(existing_guard.completion_event());
                }
            }
        }
        let merged_precondition = Event::merge(preconditions);

        let op = Arc::new(Mutex::new(OperationBase::new(
            self.next_context_index(),
            kind,
            requirements,
            merged_precondition,
            mapper_id,
            mapper_tag,
        )));
        self.fences.track_completion(op.lock().completion_event());
        self.reorder_buffer.push(op.clone());
        self.queues.executing.push(op.clone());

        tracing::debug!(context = %self.id, ?kind, "operation registered");

        let queues = self.queues.clone();
        let reorder = self.reorder_buffer.clone();
        let window = self.window.clone();
        let profiler = self.profiler.clone();
        let task_op = op.clone();
        tokio::spawn(async move {
            run_operation_to_completion(task_op, queues, reorder, window, profiler, companion).await;
        });

        Ok(op)
    }

    /// A creation-like operation additionally serialized behind whatever
    /// creation preceded it (spec.md §4's implicit-creation ordering, via
    /// `FenceAnalysis::serialize_creation`).
    async fn register_creation_operation(
        &self,
        kind: OperationKind,
        requirements: Vec<RegionRequirement>,
    ) -> Result<SharedOperation> {
        let (creation_trigger, creation_completion) = Event::pending();
        let creation_precondition = self.fences.serialize_creation(creation_completion);
        self.register_operation_internal(kind, requirements, 0, 0, Some(creation_precondition), Some(creation_trigger))
            .await
    }

    async fn create_partition_impl(&self, parent: LogicalRegion, disjoint: bool) -> Result<u64> {
        let requirement = RegionRequirement::new(
            RequirementTarget::Region(parent),
            [],
            Privilege::WriteOnly,
            CoherenceMode::Exclusive,
        );
        let op = self
            .register_creation_operation(OperationKind::Partition, vec![requirement])
            .await?;
        let completion = op.lock().completion_event();
        completion.wait().await;

        let partition_id = self.partition_ids.alloc();
        self.forest.register_partition(partition_id, disjoint);
        self.live_resources
            .insert((ResourceKind::Partition, partition_id), ());
        Ok(partition_id)
    }
}

#[async_trait::async_trait]
impl ContextOps for InnerContext {
    fn id(&self) -> ContextId {
        self.id
    }

    async fn execute_task(
        &self,
        requirements: Vec<RegionRequirement>,
        mapper_id: u32,
        mapper_tag: u64,
    ) -> Result<LegionFuture> {
        let op = self
            .register_operation_internal(OperationKind::Task, requirements, mapper_id, mapper_tag, None, None)
            .await?;
        Ok(self.future_for_operation(op))
    }

    async fn execute_index_space(
        &self,
        requirements: Vec<RegionRequirement>,
        domain_size: u64,
        mapper_id: u32,
        mapper_tag: u64,
    ) -> Result<FutureMap> {
        let op = self
            .register_operation_internal(OperationKind::IndexTask, requirements, mapper_id, mapper_tag, None, None)
            .await?;
        let mut map = FutureMap::new();
        for point in 0..domain_size {
            map.insert(point, self.future_for_operation(op.clone()));
        }
        Ok(map)
    }

    async fn issue_copy(&self, src: RegionRequirement, dst: RegionRequirement) -> Result<()> {
        self.register_operation_internal(OperationKind::Copy, vec![src, dst], 0, 0, None, None)
            .await?;
        Ok(())
    }

    async fn issue_fill(&self, requirement: RegionRequirement, _value: Vec<u8>) -> Result<()> {
        self.register_operation_internal(OperationKind::Fill, vec![requirement], 0, 0, None, None)
            .await?;
        Ok(())
    }

    async fn fill_fields(&self, requirement: RegionRequirement, _value: Vec<u8>) -> Result<()> {
        self.register_operation_internal(OperationKind::Fill, vec![requirement], 0, 0, None, None)
            .await?;
        Ok(())
    }

    async fn discard_fields(&self, requirement: RegionRequirement) -> Result<()> {
        self.register_operation_internal(OperationKind::Discard, vec![requirement], 0, 0, None, None)
            .await?;
        Ok(())
    }

    async fn attach_resource(&self, requirement: RegionRequirement) -> Result<()> {
        self.register_operation_internal(OperationKind::Attach, vec![requirement], 0, 0, None, None)
            .await?;
        Ok(())
    }

    async fn detach_resource(&self, requirement: RegionRequirement) -> Result<()> {
        self.register_operation_internal(OperationKind::Detach, vec![requirement], 0, 0, None, None)
            .await?;
        Ok(())
    }

    async fn acquire(&self, requirement: RegionRequirement) -> Result<()> {
        self.register_operation_internal(OperationKind::Acquire, vec![requirement], 0, 0, None, None)
            .await?;
        Ok(())
    }

    async fn release(&self, requirement: RegionRequirement) -> Result<()> {
        self.register_operation_internal(OperationKind::Release, vec![requirement], 0, 0, None, None)
            .await?;
        Ok(())
    }

    async fn map_region(&self, requirement: RegionRequirement) -> Result<InlineMappingId> {
        let op = self
            .register_operation_internal(OperationKind::Inline, vec![requirement], 0, 0, None, None)
            .await?;
        let completion = op.lock().completion_event();
        completion.wait().await;
        let mapping_id = op.lock().id.0;
        self.inline_mappings.insert(mapping_id, op);
        Ok(InlineMappingId(mapping_id))
    }

    async fn unmap_region(&self, mapping: InlineMappingId) -> Result<()> {
        self.inline_mappings
            .remove(&mapping.0)
            .map(|_| ())
            .ok_or_else(|| LegionError::Other(anyhow::anyhow!("unknown inline mapping {}", mapping.0)))
    }

    fn create_index_space(&self) -> Result<IndexSpaceId> {
        let id = self.index_space_ids.alloc();
        self.live_resources.insert((ResourceKind::IndexSpace, id), ());
        Ok(IndexSpaceId::new(id, 0))
    }

    async fn destroy_index_space(&self, space: IndexSpaceId) -> Result<()> {
        self.register_operation_internal(OperationKind::Deletion, Vec::new(), 0, 0, None, None)
            .await?;
        self.live_resources.remove(&(ResourceKind::IndexSpace, space.id));
        Ok(())
    }

    async fn create_partition(
        &self,
        parent: LogicalRegion,
        _kind: PartitionKind,
        disjoint: bool,
    ) -> Result<u64> {
        self.create_partition_impl(parent, disjoint).await
    }

    async fn create_pending_partition(&self, parent: LogicalRegion, disjoint: bool) -> Result<u64> {
        self.create_partition_impl(parent, disjoint).await
    }

    fn create_field_space(&self) -> Result<FieldSpaceId> {
        let id = self.field_space_ids.alloc();
        self.live_resources.insert((ResourceKind::FieldSpace, id), ());
        Ok(FieldSpaceId::new(id, 0))
    }

    async fn allocate_field(&self, space: FieldSpaceId, _size_bytes: u32) -> Result<FieldId> {
        let (creation_trigger, creation_completion) = Event::pending();
        let precondition = self.fences.serialize_creation(creation_completion);
        precondition.wait().await;
        let id = self.field_ids.alloc() as u32;
        self.live_resources
            .insert((ResourceKind::Field, id as u64), ());
        creation_trigger.trigger();
        let _ = space;
        Ok(FieldId(id))
    }

    async fn free_field(&self, space: FieldSpaceId, field: FieldId) -> Result<()> {
        let _ = space;
        self.live_resources.remove(&(ResourceKind::Field, field.0 as u64));
        Ok(())
    }

    fn create_logical_region(
        &self,
        index_space: IndexSpaceId,
        field_space: FieldSpaceId,
    ) -> Result<LogicalRegion> {
        let tree_id = self.tree_ids.alloc();
        let region = LogicalRegion {
            index_space,
            field_space,
            tree_id: legion_region::RegionTreeId::new(tree_id, 0),
        };
        self.live_resources.insert((ResourceKind::Region, tree_id), ());
        Ok(region)
    }

    async fn destroy_logical_region(&self, region: LogicalRegion) -> Result<()> {
        let requirement = RegionRequirement::new(
            RequirementTarget::Region(region),
            [],
            Privilege::WriteOnly,
            CoherenceMode::Exclusive,
        );
        let op = self
            .register_operation_internal(OperationKind::Deletion, vec![requirement], 0, 0, None, None)
            .await?;
        let completion = op.lock().completion_event();
        completion.wait().await;
        self.traces.invalidate_tree(region.tree_id);
        self.live_resources
            .remove(&(ResourceKind::Region, region.tree_id.id));
        Ok(())
    }

    async fn issue_mapping_fence(&self) -> Result<u64> {
        Ok(self.fences.issue_mapping_fence())
    }

    async fn issue_execution_fence(&self) -> Result<()> {
        let merged = self.fences.issue_execution_fence();
        let op = self
            .register_operation_internal(OperationKind::Fence, Vec::new(), 0, 0, Some(merged), None)
            .await?;
        let completion = op.lock().completion_event();
        completion.wait().await;
        Ok(())
    }

    async fn complete_frame(&self) -> Result<()> {
        let next_precondition = self.frames.next_frame_precondition();
        let op = self
            .register_operation_internal(OperationKind::Frame, Vec::new(), 0, 0, Some(next_precondition), None)
            .await?;
        let completion = op.lock().completion_event();
        self.frames.complete_frame(completion).await;

        let frames = self.frames.clone();
        let op_for_retire = op.clone();
        tokio::spawn(async move {
            let commit = op_for_retire.lock().commit_event();
            commit.wait().await;
            frames.retire_frame();
        });
        Ok(())
    }

    async fn begin_trace(&self, trace_id: u64) -> Result<()> {
        if let Some(template) = self.traces.try_replay(trace_id, &[]) {
            tracing::debug!(trace_id, "trace replay hit");
            *self.replaying.lock() = Some((template, 0));
        } else {
            tracing::debug!(trace_id, "trace replay miss, recording");
            *self.recording.lock() = Some(TraceRecording {
                trace_id,
                fingerprints: Vec::new(),
                touched_trees: HashSet::new(),
            });
        }
        Ok(())
    }

    async fn end_trace(&self, trace_id: u64) -> Result<()> {
        if self.replaying.lock().take().is_some() {
            return Ok(());
        }
        if let Some(recording) = self.recording.lock().take() {
            if recording.trace_id == trace_id {
                self.traces.store(TraceTemplate::new(
                    recording.trace_id,
                    recording.fingerprints,
                    recording.touched_trees,
                ));
            }
        }
        Ok(())
    }

    async fn create_phase_barrier(&self, arrivals: usize) -> Result<PhaseBarrier> {
        Ok(PhaseBarrier::new(
            legion_event::BarrierId(self.barrier_ids.alloc()),
            arrivals,
        ))
    }

    async fn advance_phase_barrier(&self, barrier: &PhaseBarrier) -> Result<PhaseBarrier> {
        Ok(barrier.advance())
    }

    async fn create_dynamic_collective(
        &self,
        arrivals: usize,
        reduction_op_id: u32,
        initial_value: Vec<u8>,
        apply: ReductionApply,
    ) -> Result<DynamicCollective> {
        Ok(DynamicCollective::new(
            legion_event::BarrierId(self.barrier_ids.alloc()),
            arrivals,
            reduction_op_id,
            initial_value,
            apply,
        ))
    }

    async fn arrive_dynamic_collective(&self, collective: &DynamicCollective, value: Vec<u8>) -> Result<()> {
        collective.arrive_with_value(&value);
        Ok(())
    }

    async fn select_tunable_value(&self, tunable_id: u32) -> Result<Vec<u8>> {
        let op = self
            .register_operation_internal(OperationKind::TunableSelection, Vec::new(), 0, 0, None, None)
            .await?;
        let completion = op.lock().completion_event();
        completion.wait().await;
        let output = self.mapper.select_tunable_value(SelectTunableValueInput { tunable_id }).await;
        Ok(output.value)
    }

    async fn issue_timing_measurement(&self) -> Result<LegionFuture> {
        let op = self
            .register_operation_internal(OperationKind::TimingMeasurement, Vec::new(), 0, 0, None, None)
            .await?;
        let (handle, future) = LegionFuture::pending();
        tokio::spawn(async move {
            let completion = op.lock().completion_event();
            match completion.wait().await {
                EventOutcome::Triggered => {
                    let nanos = std::time::SystemTime::now()
                        .duration_since(std::time::UNIX_EPOCH)
                        .unwrap_or_default()
                        .as_nanos();
                    handle.fulfill(nanos.to_le_bytes().to_vec());
                }
                EventOutcome::Poisoned => handle.poison(),
            }
        });
        Ok(future)
    }

    async fn construct_future_map(&self, domain_size: u64) -> Result<FutureMap> {
        let mut map = FutureMap::new();
        for point in 0..domain_size {
            map.insert(point, LegionFuture::ready(Vec::new()));
        }
        Ok(map)
    }

    async fn reduce_future_map(
        &self,
        map: &FutureMap,
        initial: Vec<u8>,
        apply: ReductionApply,
    ) -> Result<Vec<u8>> {
        map.reduce(initial, move |acc, v| (apply)(acc, v)).await
    }

    async fn transform_future_map(
        &self,
        map: &FutureMap,
        transform: Arc<dyn Fn(&[u8]) -> Vec<u8> + Send + Sync>,
    ) -> Result<FutureMap> {
        map.transform(move |v| (transform)(v)).await
    }
}

impl Drop for InnerContext {
    fn drop(&mut self) {
        let leaked = self.leaked_resource_count();
        if leaked > 0 {
            tracing::warn!(context = %self.id, leaked, "context dropped with undestroyed resources");
        }
    }
}
