use async_trait::async_trait;

use crate::calls::*;
use crate::mapper_trait::Mapper;

/// A mapper that makes the simplest legal choice at every call: map
/// everything locally, never slice an index launch, never replicate.
/// Exists for tests and as documentation of what a minimal `Mapper`
/// implementation looks like; not a placement policy.
pub struct TrivialMapper {
    pub local_proc: ProcessorId,
}

impl TrivialMapper {
    pub fn new(local_proc: ProcessorId) -> Self {
        TrivialMapper { local_proc }
    }
}

#[async_trait]
impl Mapper for TrivialMapper {
    async fn select_task_options(&self, _input: SelectTaskOptionsInput) -> SelectTaskOptionsOutput {
        SelectTaskOptionsOutput {
            initial_proc: self.local_proc,
            inline_task: false,
            map_locally: true,
            replicate: false,
        }
    }

    async fn slice_task(&self, input: SliceTaskInput) -> SliceTaskOutput {
        SliceTaskOutput {
            slices: vec![TaskSlice {
                points: 0..input.domain_size,
                proc: self.local_proc,
                recurse: false,
            }],
        }
    }

    async fn map_task(&self, input: MapTaskInput) -> MapTaskOutput {
        MapTaskOutput {
            chosen_instances: vec![Vec::new(); input.requirement_count],
            target_procs: vec![self.local_proc],
            chosen_variant: VariantId(0),
        }
    }

    async fn replicate_task(&self, _input: ReplicateTaskInput) -> ReplicateTaskOutput {
        ReplicateTaskOutput {
            shard_procs: vec![self.local_proc],
        }
    }

    async fn select_task_variant(
        &self,
        input: SelectTaskVariantInput,
    ) -> SelectTaskVariantOutput {
        SelectTaskVariantOutput {
            chosen_variant: input
                .available_variants
                .first()
                .copied()
                .unwrap_or(VariantId(0)),
        }
    }

    async fn postmap_task(&self, _input: PostmapTaskInput) -> PostmapTaskOutput {
        PostmapTaskOutput {
            chosen_instances: Vec::new(),
        }
    }

    async fn select_task_sources(
        &self,
        input: SelectTaskSourcesInput,
    ) -> SelectTaskSourcesOutput {
        SelectTaskSourcesOutput {
            ranked_sources: input.source_instances,
        }
    }

    async fn report_profiling(&self, _input: ReportProfilingInput) -> ReportProfilingOutput {
        ReportProfilingOutput
    }

    async fn select_sharding_functor(
        &self,
        _input: SelectShardingFunctorInput,
    ) -> SelectShardingFunctorOutput {
        SelectShardingFunctorOutput {
            sharding_functor_id: 0,
        }
    }

    async fn map_inline(&self, _input: MapInlineInput) -> MapInlineOutput {
        MapInlineOutput {
            chosen_instances: Vec::new(),
        }
    }

    async fn select_inline_sources(
        &self,
        input: SelectInlineSourcesInput,
    ) -> SelectInlineSourcesOutput {
        SelectInlineSourcesOutput {
            ranked_sources: input.source_instances,
        }
    }

    async fn map_copy(&self, input: MapCopyInput) -> MapCopyOutput {
        MapCopyOutput {
            src_instances: vec![Vec::new(); input.src_requirements],
            dst_instances: vec![Vec::new(); input.dst_requirements],
        }
    }

    async fn select_copy_sources(
        &self,
        input: SelectCopySourcesInput,
    ) -> SelectCopySourcesOutput {
        SelectCopySourcesOutput {
            ranked_sources: input.source_instances,
        }
    }

    async fn map_release(&self, _input: MapReleaseInput) -> MapReleaseOutput {
        MapReleaseOutput {
            chosen_instances: Vec::new(),
        }
    }

    async fn select_release_sources(
        &self,
        input: SelectReleaseSourcesInput,
    ) -> SelectReleaseSourcesOutput {
        SelectReleaseSourcesOutput {
            ranked_sources: input.source_instances,
        }
    }

    async fn map_partition(&self, _input: MapPartitionInput) -> MapPartitionOutput {
        MapPartitionOutput {
            chosen_instances: Vec::new(),
        }
    }

    async fn select_partition_sources(
        &self,
        input: SelectPartitionSourcesInput,
    ) -> SelectPartitionSourcesOutput {
        SelectPartitionSourcesOutput {
            ranked_sources: input.source_instances,
        }
    }

    async fn select_partition_projection(
        &self,
        _input: SelectPartitionProjectionInput,
    ) -> SelectPartitionProjectionOutput {
        SelectPartitionProjectionOutput {
            chosen_partition: None,
        }
    }

    async fn configure_context(&self, _input: ConfigureContextInput) -> ConfigureContextOutput {
        ConfigureContextOutput::default()
    }

    async fn select_tunable_value(
        &self,
        _input: SelectTunableValueInput,
    ) -> SelectTunableValueOutput {
        SelectTunableValueOutput { value: Vec::new() }
    }

    async fn memoize_operation(
        &self,
        _input: MemoizeOperationInput,
    ) -> MemoizeOperationOutput {
        MemoizeOperationOutput { memoize: false }
    }

    async fn map_must_epoch(&self, input: MapMustEpochInput) -> MapMustEpochOutput {
        MapMustEpochOutput {
            task_procs: vec![self.local_proc; input.task_ids.len()],
        }
    }

    async fn select_tasks_to_map(
        &self,
        input: SelectTasksToMapInput,
    ) -> SelectTasksToMapOutput {
        SelectTasksToMapOutput {
            map_tasks: input.ready_tasks,
            relocate_tasks: Vec::new(),
        }
    }

    async fn select_steal_targets(
        &self,
        _input: SelectStealTargetsInput,
    ) -> SelectStealTargetsOutput {
        SelectStealTargetsOutput { targets: Vec::new() }
    }

    async fn permit_steal_request(
        &self,
        _input: PermitStealRequestInput,
    ) -> PermitStealRequestOutput {
        PermitStealRequestOutput { stolen: Vec::new() }
    }

    async fn handle_message(&self, _input: HandleMessageInput) -> HandleMessageOutput {
        HandleMessageOutput
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trivial_mapper_slices_the_whole_domain_as_one_piece() {
        let mapper = TrivialMapper::new(ProcessorId(0));
        let out = mapper
            .slice_task(SliceTaskInput {
                task_id: TaskId(1),
                domain_size: 16,
                target_procs: vec![ProcessorId(0)],
            })
            .await;
        assert_eq!(out.slices.len(), 1);
        assert_eq!(out.slices[0].points, 0..16);
    }

    #[tokio::test]
    async fn trivial_mapper_maps_every_requirement() {
        let mapper = TrivialMapper::new(ProcessorId(0));
        let out = mapper
            .map_task(MapTaskInput {
                task_id: TaskId(1),
                requirement_count: 3,
                target_proc: ProcessorId(0),
            })
            .await;
        assert_eq!(out.chosen_instances.len(), 3);
        assert_eq!(out.target_procs, vec![ProcessorId(0)]);
    }

    #[tokio::test]
    async fn trivial_mapper_never_splits_disposition() {
        let mapper = TrivialMapper::new(ProcessorId(0));
        let out = mapper
            .select_tasks_to_map(SelectTasksToMapInput {
                ready_tasks: vec![TaskId(1), TaskId(2)],
            })
            .await;
        assert_eq!(out.map_tasks.len(), 2);
        assert!(out.relocate_tasks.is_empty());
    }
}
