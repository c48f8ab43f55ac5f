use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use legion_mapper::{Mapper, ProcessorId, SelectTaskOptionsInput, TaskId};
use legion_region::RegionForest;

use crate::cli::RuntimeConfig;
use crate::ids::ContextId;
use crate::profiling::ProfilerSink;

use super::inner::InnerContext;
use super::leaf::LeafContext;
use super::replicate::ReplicateContext;
use super::ContextOps;

/// Builds the right `Context` variant for a new task (spec.md §4.9–§4.11:
/// "the mapper decides whether a task runs inline, maps locally, or
/// replicates; the context never guesses"). One factory is shared by
/// every context created for a node; it carries the collaborators every
/// `InnerContext` needs so callers don't have to thread them through.
pub struct ContextFactory {
    forest: Arc<dyn RegionForest>,
    mapper: Arc<dyn Mapper>,
    mapper_debug: bool,
    profiler: Arc<dyn ProfilerSink>,
    window_size: usize,
    max_outstanding_frames: usize,
    shard_count: AtomicU32,
}

impl ContextFactory {
    pub fn new(
        forest: Arc<dyn RegionForest>,
        mapper: Arc<dyn Mapper>,
        profiler: Arc<dyn ProfilerSink>,
        config: &RuntimeConfig,
    ) -> Self {
        ContextFactory {
            forest,
            mapper,
            mapper_debug: config.mapper_debug,
            profiler,
            window_size: config.window_size,
            max_outstanding_frames: config.max_outstanding_frames,
            shard_count: AtomicU32::new(1),
        }
    }

    /// Build a leaf context directly, bypassing the mapper. Used for
    /// the top-level context's own leaf-like callers and for tests that
    /// don't care about placement policy.
    pub fn create_leaf(&self, parent: Option<ContextId>) -> LeafContext {
        LeafContext::new(parent)
    }

    fn new_inner(&self, parent: Option<ContextId>) -> InnerContext {
        InnerContext::with_mapper_debug_and_grants(
            parent,
            self.forest.clone(),
            self.mapper.clone(),
            self.profiler.clone(),
            self.window_size,
            self.max_outstanding_frames,
            self.mapper_debug,
            Vec::new(),
        )
    }

    /// Ask the mapper whether `task_id` should get an inline leaf
    /// context, a plain inner context, or a replicated one, and build
    /// the chosen variant. `parent` is the context the new task's own
    /// context nests under, not the variant decision itself.
    pub async fn create_for_task(
        &self,
        task_id: TaskId,
        parent: Option<ContextId>,
    ) -> Arc<dyn ContextOps> {
        let options = self
            .mapper
            .select_task_options(SelectTaskOptionsInput { task_id })
            .await;

        if options.inline_task {
            return Arc::new(LeafContext::new(parent));
        }

        if options.replicate {
            let shard_count = self.shard_count.load(Ordering::Relaxed).max(1) as usize;
            let inner = Arc::new(self.new_inner(parent));
            return Arc::new(ReplicateContext::new(inner, 0, shard_count));
        }

        Arc::new(self.new_inner(parent))
    }

    /// Record how many shards a replicated task's group was split into,
    /// so the next `create_for_task` that replicates builds its
    /// `ReplicateContext` with the right deletion-consensus arity.
    /// `replicate_task` itself is a per-shard-placement call the runtime
    /// that owns the actual shard processes would make; this factory
    /// only needs the resulting count.
    pub fn set_shard_count(&self, shard_count: u32) {
        self.shard_count.store(shard_count.max(1), Ordering::Relaxed);
    }

    pub fn local_processor(&self) -> Option<ProcessorId> {
        None
    }
}

/// The root of a node's context tree (spec.md §4.13): an `InnerContext`
/// with no parent, used as the entry point for manual smoke tests and
/// for `legion_driver`'s top-level task. It owns the factory that
/// builds every context nested under it.
pub struct TopLevelContext {
    root: Arc<InnerContext>,
    factory: Arc<ContextFactory>,
}

impl TopLevelContext {
    pub fn new(
        forest: Arc<dyn RegionForest>,
        mapper: Arc<dyn Mapper>,
        profiler: Arc<dyn ProfilerSink>,
        config: &RuntimeConfig,
    ) -> Self {
        let factory = Arc::new(ContextFactory::new(forest, mapper, profiler, config));
        let root = Arc::new(factory.new_inner(None));
        TopLevelContext { root, factory }
    }

    pub fn root(&self) -> &Arc<InnerContext> {
        &self.root
    }

    pub fn factory(&self) -> &Arc<ContextFactory> {
        &self.factory
    }

    pub async fn create_for_task(&self, task_id: TaskId) -> Arc<dyn ContextOps> {
        self.factory.create_for_task(task_id, Some(self.root.id())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use legion_mapper::TrivialMapper;
    use legion_region::SimpleForest;

    fn factory() -> ContextFactory {
        ContextFactory::new(
            Arc::new(SimpleForest::new()),
            Arc::new(TrivialMapper::new(ProcessorId(0))),
            Arc::new(crate::profiling::NullSink),
            &RuntimeConfig::default(),
        )
    }

    #[tokio::test]
    async fn trivial_mapper_never_inlines_or_replicates_so_every_task_gets_an_inner_context() {
        let factory = factory();
        let ctx = factory.create_for_task(TaskId(1), None).await;
        assert!(ctx.create_index_space().is_ok());
    }

    #[tokio::test]
    async fn top_level_context_exposes_a_parentless_root() {
        let top = TopLevelContext::new(
            Arc::new(SimpleForest::new()),
            Arc::new(TrivialMapper::new(ProcessorId(0))),
            Arc::new(crate::profiling::NullSink),
            &RuntimeConfig::default(),
        );
        assert!(top.root().create_index_space().is_ok());
        let child = top.create_for_task(TaskId(2)).await;
        assert!(child.create_field_space().is_ok());
    }
}
