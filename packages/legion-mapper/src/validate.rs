use thiserror::Error;

use crate::calls::*;

/// A mapper chose something the context cannot act on. The context
/// surfaces these per spec.md §8's propagation policy: logged and fatal
/// in safe mode, or a retry request to the mapper in production mode.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MapperViolation {
    #[error("map_task for {task_id:?} returned {got} instance sets for {expected} requirements")]
    WrongInstanceSetCount {
        task_id: TaskId,
        expected: usize,
        got: usize,
    },
    #[error("map_task for {task_id:?} chose an empty target_procs list")]
    EmptyTargetProcs { task_id: TaskId },
    #[error("select_task_variant for {task_id:?} chose a variant not in the offered set")]
    VariantNotOffered { task_id: TaskId },
    #[error("slice_task for {task_id:?} did not produce a partition covering [0, {domain_size})")]
    IncompleteSlicing { task_id: TaskId, domain_size: u64 },
    #[error("slice_task for {task_id:?} produced overlapping slices")]
    OverlappingSlices { task_id: TaskId },
    #[error("select_tasks_to_map returned a task in both map_tasks and relocate_tasks")]
    ConflictingTaskDisposition,
}

/// Stateless validator: every method takes the `Input` the context built
/// and the `Output` the mapper returned, and either accepts it or
/// returns the specific `MapperViolation` it found.
pub struct MapperValidator;

impl MapperValidator {
    pub fn validate_map_task(
        input: &MapTaskInput,
        output: &MapTaskOutput,
    ) -> Result<(), MapperViolation> {
        if output.chosen_instances.len() != input.requirement_count {
            return Err(MapperViolation::WrongInstanceSetCount {
                task_id: input.task_id,
                expected: input.requirement_count,
                got: output.chosen_instances.len(),
            });
        }
        if output.target_procs.is_empty() {
            return Err(MapperViolation::EmptyTargetProcs {
                task_id: input.task_id,
            });
        }
        Ok(())
    }

    pub fn validate_select_task_variant(
        input: &SelectTaskVariantInput,
        output: &SelectTaskVariantOutput,
    ) -> Result<(), MapperViolation> {
        if !input.available_variants.contains(&output.chosen_variant) {
            return Err(MapperViolation::VariantNotOffered {
                task_id: input.task_id,
            });
        }
        Ok(())
    }

    /// Slices must exactly partition `[0, domain_size)` with no gaps or
    /// overlaps, mirroring the index-launch point-space invariant the
    /// mapper is trusted to uphold.
    pub fn validate_slice_task(
        input: &SliceTaskInput,
        output: &SliceTaskOutput,
    ) -> Result<(), MapperViolation> {
        let mut ranges: Vec<(u64, u64)> = output
            .slices
            .iter()
            .map(|s| (s.points.start, s.points.end))
            .collect();
        ranges.sort_unstable();
        let mut cursor = 0u64;
        for (start, end) in ranges {
            if start < cursor {
                return Err(MapperViolation::OverlappingSlices {
                    task_id: input.task_id,
                });
            }
            if start > cursor {
                return Err(MapperViolation::IncompleteSlicing {
                    task_id: input.task_id,
                    domain_size: input.domain_size,
                });
            }
            cursor = end;
        }
        if cursor != input.domain_size {
            return Err(MapperViolation::IncompleteSlicing {
                task_id: input.task_id,
                domain_size: input.domain_size,
            });
        }
        Ok(())
    }

    pub fn validate_select_tasks_to_map(
        output: &SelectTasksToMapOutput,
    ) -> Result<(), MapperViolation> {
        for (task_id, _) in &output.relocate_tasks {
            if output.map_tasks.contains(task_id) {
                return Err(MapperViolation::ConflictingTaskDisposition);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_task_rejects_mismatched_instance_set_count() {
        let input = MapTaskInput {
            task_id: TaskId(1),
            requirement_count: 2,
            target_proc: ProcessorId(0),
        };
        let output = MapTaskOutput {
            chosen_instances: vec![vec![InstanceId(1)]],
            target_procs: vec![ProcessorId(0)],
            chosen_variant: VariantId(0),
        };
        assert!(MapperValidator::validate_map_task(&input, &output).is_err());
    }

    #[test]
    fn map_task_rejects_empty_target_procs() {
        let input = MapTaskInput {
            task_id: TaskId(1),
            requirement_count: 1,
            target_proc: ProcessorId(0),
        };
        let output = MapTaskOutput {
            chosen_instances: vec![vec![InstanceId(1)]],
            target_procs: vec![],
            chosen_variant: VariantId(0),
        };
        assert!(MapperValidator::validate_map_task(&input, &output).is_err());
    }

    #[test]
    fn select_task_variant_rejects_unoffered_choice() {
        let input = SelectTaskVariantInput {
            task_id: TaskId(1),
            target_proc: ProcessorId(0),
            available_variants: vec![VariantId(1), VariantId(2)],
        };
        let output = SelectTaskVariantOutput {
            chosen_variant: VariantId(9),
        };
        assert!(MapperValidator::validate_select_task_variant(&input, &output).is_err());
    }

    #[test]
    fn slice_task_accepts_exact_partition() {
        let input = SliceTaskInput {
            task_id: TaskId(1),
            domain_size: 10,
            target_procs: vec![ProcessorId(0), ProcessorId(1)],
        };
        let output = SliceTaskOutput {
            slices: vec![
                TaskSlice {
                    points: 0..5,
                    proc: ProcessorId(0),
                    recurse: false,
                },
                TaskSlice {
                    points: 5..10,
                    proc: ProcessorId(1),
                    recurse: false,
                },
            ],
        };
        assert!(MapperValidator::validate_slice_task(&input, &output).is_ok());
    }

    #[test]
    fn slice_task_rejects_gap() {
        let input = SliceTaskInput {
            task_id: TaskId(1),
            domain_size: 10,
            target_procs: vec![ProcessorId(0)],
        };
        let output = SliceTaskOutput {
            slices: vec![TaskSlice {
                points: 0..5,
                proc: ProcessorId(0),
                recurse: false,
            }],
        };
        assert!(matches!(
            MapperValidator::validate_slice_task(&input, &output),
            Err(MapperViolation::IncompleteSlicing { .. })
        ));
    }

    #[test]
    fn slice_task_rejects_overlap() {
        let input = SliceTaskInput {
            task_id: TaskId(1),
            domain_size: 10,
            target_procs: vec![ProcessorId(0)],
        };
        let output = SliceTaskOutput {
            slices: vec![
                TaskSlice {
                    points: 0..6,
                    proc: ProcessorId(0),
                    recurse: false,
                },
                TaskSlice {
                    points: 4..10,
                    proc: ProcessorId(0),
                    recurse: false,
                },
            ],
        };
        assert!(matches!(
            MapperValidator::validate_slice_task(&input, &output),
            Err(MapperViolation::OverlappingSlices { .. })
        ));
    }

    #[test]
    fn select_tasks_to_map_rejects_double_disposition() {
        let output = SelectTasksToMapOutput {
            map_tasks: vec![TaskId(1)],
            relocate_tasks: vec![(TaskId(1), ProcessorId(2))],
        };
        assert!(MapperValidator::validate_select_tasks_to_map(&output).is_err());
    }
}
