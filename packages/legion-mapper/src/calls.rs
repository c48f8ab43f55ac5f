use legion_region::{LogicalPartition, LogicalRegion};

/// A processor in the target machine model. Opaque beyond its id and
/// kind; the mapper is the only component that interprets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ProcessorId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct MemoryId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct VariantId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ShardId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct InstanceId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct TaskId(pub u64);

/// One named mapper call (spec.md §8: "Mapper interface (from context)").
/// The context validates every `Output` it receives against its matching
/// `Input`; validation failures surface as `MapperViolation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapperCallKind {
    SelectTaskOptions,
    SliceTask,
    MapTask,
    ReplicateTask,
    SelectTaskVariant,
    PostmapTask,
    SelectTaskSources,
    ReportProfiling,
    SelectShardingFunctor,
    MapInline,
    SelectInlineSources,
    MapCopy,
    SelectCopySources,
    MapRelease,
    SelectReleaseSources,
    MapPartition,
    SelectPartitionSources,
    SelectPartitionProjection,
    ConfigureContext,
    SelectTunableValue,
    MemoizeOperation,
    MapMustEpoch,
    SelectTasksToMap,
    SelectStealTargets,
    PermitStealRequest,
    HandleMessage,
}

impl MapperCallKind {
    pub fn name(&self) -> &'static str {
        match self {
            MapperCallKind::SelectTaskOptions => "select_task_options",
            MapperCallKind::SliceTask => "slice_task",
            MapperCallKind::MapTask => "map_task",
            MapperCallKind::ReplicateTask => "replicate_task",
            MapperCallKind::SelectTaskVariant => "select_task_variant",
            MapperCallKind::PostmapTask => "postmap_task",
            MapperCallKind::SelectTaskSources => "select_task_sources",
            MapperCallKind::ReportProfiling => "report_profiling",
            MapperCallKind::SelectShardingFunctor => "select_sharding_functor",
            MapperCallKind::MapInline => "map_inline",
            MapperCallKind::SelectInlineSources => "select_inline_sources",
            MapperCallKind::MapCopy => "map_copy",
            MapperCallKind::SelectCopySources => "select_copy_sources",
            MapperCallKind::MapRelease => "map_release",
            MapperCallKind::SelectReleaseSources => "select_release_sources",
            MapperCallKind::MapPartition => "map_partition",
            MapperCallKind::SelectPartitionSources => "select_partition_sources",
            MapperCallKind::SelectPartitionProjection => "select_partition_projection",
            MapperCallKind::ConfigureContext => "configure_context",
            MapperCallKind::SelectTunableValue => "select_tunable_value",
            MapperCallKind::MemoizeOperation => "memoize_operation",
            MapperCallKind::MapMustEpoch => "map_must_epoch",
            MapperCallKind::SelectTasksToMap => "select_tasks_to_map",
            MapperCallKind::SelectStealTargets => "select_steal_targets",
            MapperCallKind::PermitStealRequest => "permit_steal_request",
            MapperCallKind::HandleMessage => "handle_message",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SelectTaskOptionsInput {
    pub task_id: TaskId,
}

#[derive(Debug, Clone)]
pub struct SelectTaskOptionsOutput {
    pub initial_proc: ProcessorId,
    pub inline_task: bool,
    pub map_locally: bool,
    pub replicate: bool,
}

#[derive(Debug, Clone)]
pub struct SliceTaskInput {
    pub task_id: TaskId,
    pub domain_size: u64,
    pub target_procs: Vec<ProcessorId>,
}

#[derive(Debug, Clone)]
pub struct TaskSlice {
    pub points: std::ops::Range<u64>,
    pub proc: ProcessorId,
    pub recurse: bool,
}

#[derive(Debug, Clone)]
pub struct SliceTaskOutput {
    pub slices: Vec<TaskSlice>,
}

#[derive(Debug, Clone)]
pub struct MapTaskInput {
    pub task_id: TaskId,
    pub requirement_count: usize,
    pub target_proc: ProcessorId,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MapTaskOutput {
    pub chosen_instances: Vec<Vec<InstanceId>>,
    pub target_procs: Vec<ProcessorId>,
    pub chosen_variant: VariantId,
}

#[derive(Debug, Clone)]
pub struct ReplicateTaskInput {
    pub task_id: TaskId,
}

#[derive(Debug, Clone)]
pub struct ReplicateTaskOutput {
    pub shard_procs: Vec<ProcessorId>,
}

#[derive(Debug, Clone)]
pub struct SelectTaskVariantInput {
    pub task_id: TaskId,
    pub target_proc: ProcessorId,
    pub available_variants: Vec<VariantId>,
}

#[derive(Debug, Clone)]
pub struct SelectTaskVariantOutput {
    pub chosen_variant: VariantId,
}

#[derive(Debug, Clone)]
pub struct PostmapTaskInput {
    pub task_id: TaskId,
}

#[derive(Debug, Clone)]
pub struct PostmapTaskOutput {
    pub chosen_instances: Vec<Vec<InstanceId>>,
}

#[derive(Debug, Clone)]
pub struct SelectTaskSourcesInput {
    pub requirement_index: usize,
    pub target_instance: InstanceId,
    pub source_instances: Vec<InstanceId>,
}

#[derive(Debug, Clone)]
pub struct SelectTaskSourcesOutput {
    pub ranked_sources: Vec<InstanceId>,
}

#[derive(Debug, Clone)]
pub struct ReportProfilingInput {
    pub task_id: TaskId,
    pub response_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct ReportProfilingOutput;

#[derive(Debug, Clone)]
pub struct SelectShardingFunctorInput {
    pub task_id: TaskId,
    pub shard_count: u32,
}

#[derive(Debug, Clone)]
pub struct SelectShardingFunctorOutput {
    pub sharding_functor_id: u32,
}

#[derive(Debug, Clone)]
pub struct MapInlineInput {
    pub requirement: LogicalRegion,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MapInlineOutput {
    pub chosen_instances: Vec<InstanceId>,
}

#[derive(Debug, Clone)]
pub struct SelectInlineSourcesInput {
    pub target_instance: InstanceId,
    pub source_instances: Vec<InstanceId>,
}

#[derive(Debug, Clone)]
pub struct SelectInlineSourcesOutput {
    pub ranked_sources: Vec<InstanceId>,
}

#[derive(Debug, Clone)]
pub struct MapCopyInput {
    pub src_requirements: usize,
    pub dst_requirements: usize,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MapCopyOutput {
    pub src_instances: Vec<Vec<InstanceId>>,
    pub dst_instances: Vec<Vec<InstanceId>>,
}

#[derive(Debug, Clone)]
pub struct SelectCopySourcesInput {
    pub target_instance: InstanceId,
    pub source_instances: Vec<InstanceId>,
}

#[derive(Debug, Clone)]
pub struct SelectCopySourcesOutput {
    pub ranked_sources: Vec<InstanceId>,
}

#[derive(Debug, Clone)]
pub struct MapReleaseInput {
    pub requirement: LogicalRegion,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MapReleaseOutput {
    pub chosen_instances: Vec<InstanceId>,
}

#[derive(Debug, Clone)]
pub struct SelectReleaseSourcesInput {
    pub target_instance: InstanceId,
    pub source_instances: Vec<InstanceId>,
}

#[derive(Debug, Clone)]
pub struct SelectReleaseSourcesOutput {
    pub ranked_sources: Vec<InstanceId>,
}

#[derive(Debug, Clone)]
pub struct MapPartitionInput {
    pub partition: LogicalPartition,
}

#[derive(Debug, Clone)]
pub struct MapPartitionOutput {
    pub chosen_instances: Vec<InstanceId>,
}

#[derive(Debug, Clone)]
pub struct SelectPartitionSourcesInput {
    pub target_instance: InstanceId,
    pub source_instances: Vec<InstanceId>,
}

#[derive(Debug, Clone)]
pub struct SelectPartitionSourcesOutput {
    pub ranked_sources: Vec<InstanceId>,
}

#[derive(Debug, Clone)]
pub struct SelectPartitionProjectionInput {
    pub partition: LogicalPartition,
}

#[derive(Debug, Clone)]
pub struct SelectPartitionProjectionOutput {
    pub chosen_partition: Option<LogicalPartition>,
}

#[derive(Debug, Clone)]
pub struct ConfigureContextInput {
    pub task_id: TaskId,
}

#[derive(Debug, Clone)]
pub struct ConfigureContextOutput {
    pub max_window_size: usize,
    pub min_frames_to_schedule: usize,
    pub max_outstanding_frames: usize,
}

impl Default for ConfigureContextOutput {
    fn default() -> Self {
        ConfigureContextOutput {
            max_window_size: 1024,
            min_frames_to_schedule: 2,
            max_outstanding_frames: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SelectTunableValueInput {
    pub tunable_id: u32,
}

#[derive(Debug, Clone)]
pub struct SelectTunableValueOutput {
    pub value: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct MemoizeOperationInput {
    pub task_id: TaskId,
}

#[derive(Debug, Clone)]
pub struct MemoizeOperationOutput {
    pub memoize: bool,
}

#[derive(Debug, Clone)]
pub struct MapMustEpochInput {
    pub task_ids: Vec<TaskId>,
}

#[derive(Debug, Clone)]
pub struct MapMustEpochOutput {
    pub task_procs: Vec<ProcessorId>,
}

#[derive(Debug, Clone)]
pub struct SelectTasksToMapInput {
    pub ready_tasks: Vec<TaskId>,
}

#[derive(Debug, Clone)]
pub struct SelectTasksToMapOutput {
    pub map_tasks: Vec<TaskId>,
    pub relocate_tasks: Vec<(TaskId, ProcessorId)>,
}

#[derive(Debug, Clone)]
pub struct SelectStealTargetsInput {
    pub current_proc: ProcessorId,
}

#[derive(Debug, Clone)]
pub struct SelectStealTargetsOutput {
    pub targets: Vec<ProcessorId>,
}

#[derive(Debug, Clone)]
pub struct PermitStealRequestInput {
    pub thief: ProcessorId,
    pub stealable: Vec<TaskId>,
}

#[derive(Debug, Clone)]
pub struct PermitStealRequestOutput {
    pub stolen: Vec<TaskId>,
}

#[derive(Debug, Clone)]
pub struct HandleMessageInput {
    pub sender: ShardId,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct HandleMessageOutput;
