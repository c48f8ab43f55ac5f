use legion_event::{Event, EventOutcome, UserEvent};
use legion_region::RegionRequirement;

use crate::error::{LegionError, Result};
use crate::ids::OperationId;

/// The kind of work one operation represents (spec.md §3, Entity:
/// Operation). Kept as one flat tagged enum rather than the source's
/// class-per-kind hierarchy: every caller that needs to branch on kind
/// does so with a `match`, not a virtual dispatch or `dynamic_cast`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum OperationKind {
    Task,
    IndexTask,
    Copy,
    IndexCopy,
    Fill,
    IndexFill,
    Inline,
    Acquire,
    Release,
    Attach,
    Detach,
    Discard,
    Partition,
    Close,
    Refinement,
    Fence,
    Frame,
    TraceBegin,
    TraceEnd,
    TraceSummary,
    MustEpoch,
    TimingMeasurement,
    TunableSelection,
    Deletion,
}

impl OperationKind {
    /// Operations a `LeafContext` must reject outright (spec.md §4.11 /
    /// the operation-registration interface list): anything that would
    /// register a child operation or touch the region tree. A leaf task
    /// may still be the target of a `Fence`/`Frame` issued by its
    /// parent, so those aren't included here — this is only what a leaf
    /// may not *originate*.
    pub fn requires_inner_context(&self) -> bool {
        !matches!(self, OperationKind::TimingMeasurement)
    }
}

/// The four pipeline stages every operation passes through in order
/// (spec.md §4, "Pipeline"). `Stage` is intentionally `Ord`: invariant
/// (i) ("executing ≥ executed ≥ complete ≥ committed, all
/// non-decreasing") is a statement about counts of operations in each
/// stage, but at the single-operation level it means a stage can only
/// ever move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum Stage {
    Executing,
    Executed,
    Complete,
    Committed,
}

impl Stage {
    fn name(&self) -> &'static str {
        match self {
            Stage::Executing => "executing",
            Stage::Executed => "executed",
            Stage::Complete => "complete",
            Stage::Committed => "committed",
        }
    }
}

/// One unit of scheduled work, owned by its parent context's reorder
/// buffer until committed (spec.md §3, Entity: Operation).
pub struct OperationBase {
    pub id: OperationId,
    pub context_index: usize,
    pub kind: OperationKind,
    pub requirements: Vec<RegionRequirement>,
    pub mapper_id: u32,
    pub mapper_tag: u64,
    stage: Stage,
    precondition: Event,
    completion_trigger: UserEvent,
    completion: Event,
    commit_trigger: UserEvent,
    commit: Event,
    poisoned: bool,
}

impl OperationBase {
    pub fn new(
        context_index: usize,
        kind: OperationKind,
        requirements: Vec<RegionRequirement>,
        precondition: Event,
        mapper_id: u32,
        mapper_tag: u64,
    ) -> Self {
        let (completion_trigger, completion) = Event::pending();
        let (commit_trigger, commit) = Event::pending();
        OperationBase {
            id: OperationId::fresh(),
            context_index,
            kind,
            requirements,
            mapper_id,
            mapper_tag,
            stage: Stage::Executing,
            precondition,
            completion_trigger,
            completion,
            commit_trigger,
            commit,
            poisoned: false,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn precondition(&self) -> Event {
        self.precondition.clone()
    }

    pub fn completion_event(&self) -> Event {
        self.completion.clone()
    }

    pub fn commit_event(&self) -> Event {
        self.commit.clone()
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    fn advance_to(&mut self, next: Stage) -> Result<()> {
        if next <= self.stage {
            return Err(LegionError::Other(anyhow::anyhow!(
                "operation {} cannot move from {} back to {}",
                self.id,
                self.stage.name(),
                next.name()
            )));
        }
        self.stage = next;
        Ok(())
    }

    /// Precondition has resolved; mark this operation executed and
    /// record whether it inherited poison from its precondition. Does
    /// not yet trigger `completion` — that happens once the operation's
    /// effects (if any) are actually applied, via `complete`.
    pub fn mark_executed(&mut self, precondition_outcome: EventOutcome) -> Result<()> {
        self.advance_to(Stage::Executed)?;
        if precondition_outcome.is_poisoned() {
            self.poisoned = true;
        }
        Ok(())
    }

    /// Execution finished (or was skipped because of inherited poison).
    /// Triggers the completion event, poisoned or not, so downstream
    /// operations waiting on it unblock either way.
    pub fn complete(&mut self) -> Result<()> {
        self.advance_to(Stage::Complete)?;
        if self.poisoned {
            self.completion_trigger.trigger_poisoned();
        } else {
            self.completion_trigger.trigger();
        }
        Ok(())
    }

    /// Commit: the operation's effects are durable and it may be
    /// recycled once every node holding a reference has also committed
    /// it (spec.md §3, Invariant on Operation recycling).
    pub fn commit(&mut self) -> Result<()> {
        self.advance_to(Stage::Committed)?;
        if self.poisoned {
            self.commit_trigger.trigger_poisoned();
        } else {
            self.commit_trigger.trigger();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(kind: OperationKind) -> OperationBase {
        OperationBase::new(0, kind, Vec::new(), Event::already_triggered(), 0, 0)
    }

    #[tokio::test]
    async fn stages_advance_in_order_and_trigger_events() {
        let mut operation = op(OperationKind::Fill);
        assert_eq!(operation.stage(), Stage::Executing);
        operation.mark_executed(EventOutcome::Triggered).unwrap();
        assert_eq!(operation.stage(), Stage::Executed);
        let completion = operation.completion_event();
        assert!(!completion.has_triggered());
        operation.complete().unwrap();
        assert_eq!(completion.wait().await, EventOutcome::Triggered);
        operation.commit().unwrap();
        assert_eq!(operation.commit_event().wait().await, EventOutcome::Triggered);
    }

    #[test]
    fn stages_cannot_move_backward() {
        let mut operation = op(OperationKind::Fill);
        operation.mark_executed(EventOutcome::Triggered).unwrap();
        operation.complete().unwrap();
        // Re-advancing to Executed (behind Complete) must fail.
        assert!(operation.mark_executed(EventOutcome::Triggered).is_err());
    }

    #[tokio::test]
    async fn poisoned_precondition_poisons_completion_and_commit() {
        let mut operation = op(OperationKind::Copy);
        operation.mark_executed(EventOutcome::Poisoned).unwrap();
        operation.complete().unwrap();
        assert_eq!(
            operation.completion_event().wait().await,
            EventOutcome::Poisoned
        );
        operation.commit().unwrap();
        assert_eq!(operation.commit_event().wait().await, EventOutcome::Poisoned);
    }
}
