use async_trait::async_trait;

use crate::calls::*;

/// The policy seam the context calls out to for every placement decision
/// (spec.md §8: "Mapper interface (from context)"). One call per method;
/// the context constructs the matching `*Input`, awaits `Output`, then
/// validates it before acting on it.
#[async_trait]
pub trait Mapper: Send + Sync {
    async fn select_task_options(&self, input: SelectTaskOptionsInput) -> SelectTaskOptionsOutput;
    async fn slice_task(&self, input: SliceTaskInput) -> SliceTaskOutput;
    async fn map_task(&self, input: MapTaskInput) -> MapTaskOutput;
    async fn replicate_task(&self, input: ReplicateTaskInput) -> ReplicateTaskOutput;
    async fn select_task_variant(&self, input: SelectTaskVariantInput) -> SelectTaskVariantOutput;
    async fn postmap_task(&self, input: PostmapTaskInput) -> PostmapTaskOutput;
    async fn select_task_sources(&self, input: SelectTaskSourcesInput) -> SelectTaskSourcesOutput;
    async fn report_profiling(&self, input: ReportProfilingInput) -> ReportProfilingOutput;
    async fn select_sharding_functor(
        &self,
        input: SelectShardingFunctorInput,
    ) -> SelectShardingFunctorOutput;
    async fn map_inline(&self, input: MapInlineInput) -> MapInlineOutput;
    async fn select_inline_sources(
        &self,
        input: SelectInlineSourcesInput,
    ) -> SelectInlineSourcesOutput;
    async fn map_copy(&self, input: MapCopyInput) -> MapCopyOutput;
    async fn select_copy_sources(&self, input: SelectCopySourcesInput) -> SelectCopySourcesOutput;
    async fn map_release(&self, input: MapReleaseInput) -> MapReleaseOutput;
    async fn select_release_sources(
        &self,
        input: SelectReleaseSourcesInput,
    ) -> SelectReleaseSourcesOutput;
    async fn map_partition(&self, input: MapPartitionInput) -> MapPartitionOutput;
    async fn select_partition_sources(
        &self,
        input: SelectPartitionSourcesInput,
    ) -> SelectPartitionSourcesOutput;
    async fn select_partition_projection(
        &self,
        input: SelectPartitionProjectionInput,
    ) -> SelectPartitionProjectionOutput;
    async fn configure_context(&self, input: ConfigureContextInput) -> ConfigureContextOutput;
    async fn select_tunable_value(
        &self,
        input: SelectTunableValueInput,
    ) -> SelectTunableValueOutput;
    async fn memoize_operation(&self, input: MemoizeOperationInput) -> MemoizeOperationOutput;
    async fn map_must_epoch(&self, input: MapMustEpochInput) -> MapMustEpochOutput;
    async fn select_tasks_to_map(&self, input: SelectTasksToMapInput) -> SelectTasksToMapOutput;
    async fn select_steal_targets(
        &self,
        input: SelectStealTargetsInput,
    ) -> SelectStealTargetsOutput;
    async fn permit_steal_request(
        &self,
        input: PermitStealRequestInput,
    ) -> PermitStealRequestOutput;
    async fn handle_message(&self, input: HandleMessageInput) -> HandleMessageOutput;
}
