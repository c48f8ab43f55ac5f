//! End-to-end scenarios that span context + forest + mapper (spec.md §8:
//! scenarios S1–S6 and properties 1/4/5/6). S1, S2, and S4 also have
//! colocated unit tests against `InnerContext` directly; these exercise
//! the same behavior through the public `ContextOps` surface instead.

use std::sync::Arc;

use legion_context::{ContextOps, InnerContext, NullSink, ReplicateContext};
use legion_mapper::{ProcessorId, TrivialMapper};
use legion_region::{
    CoherenceMode, FieldId, LogicalRegion, Privilege, RegionRequirement, RequirementTarget,
    SimpleForest,
};

fn new_context(window_size: usize) -> InnerContext {
    InnerContext::new(
        None,
        Arc::new(SimpleForest::new()),
        Arc::new(TrivialMapper::new(ProcessorId(0))),
        Arc::new(NullSink),
        window_size,
        0,
    )
}

fn requirement(region: LogicalRegion, privilege: Privilege) -> RegionRequirement {
    RegionRequirement::new(
        RequirementTarget::Region(region),
        [FieldId(0)],
        privilege,
        CoherenceMode::Exclusive,
    )
}

#[tokio::test]
async fn order_preservation_write_after_read_completes_in_registration_order() {
    // Property 1: X.index < Y.index with conflicting privileges means Y's
    // precondition triggers only after X's completion.
    let ctx = new_context(1024);
    let index_space = ctx.create_index_space().unwrap();
    let field_space = ctx.create_field_space().unwrap();
    let region = ctx.create_logical_region(index_space, field_space).unwrap();

    let writer = ctx
        .execute_task(vec![requirement(region, Privilege::WriteOnly)], 0, 0)
        .await
        .unwrap();
    let reader = ctx
        .execute_task(vec![requirement(region, Privilege::ReadOnly)], 0, 0)
        .await
        .unwrap();

    // The reader conflicts with the writer and was registered after it,
    // so the reader cannot finish before the writer does.
    assert!(reader.get().await.is_ok());
    assert!(writer.is_ready());
    assert!(writer.get().await.is_ok());
}

#[tokio::test]
async fn fence_split_serializes_operations_across_an_execution_fence() {
    // Scenario S3 / property 4: T2, issued after an execution fence F that
    // itself followed T1, only begins once F (and so T1) has resolved.
    let ctx = new_context(1024);

    let t1 = ctx.execute_task(Vec::new(), 0, 0).await.unwrap();
    ctx.issue_execution_fence().await.unwrap();
    // issue_execution_fence only returns once F's own completion has
    // triggered, and F's precondition was T1's completion — so T1 must
    // already be ready the instant the fence call returns.
    assert!(t1.is_ready());
    let t2 = ctx.execute_task(Vec::new(), 0, 0).await.unwrap();

    assert!(t1.get().await.is_ok());
    assert!(t2.get().await.is_ok());
}

#[tokio::test]
async fn mapping_fence_forces_later_operations_to_wait_on_earlier_completions() {
    // Property 4's mapping-fence half: unlike an execution fence,
    // issuing a mapping fence does not itself block — but any operation
    // registered afterward still must not begin mapping until every
    // completion tracked before the fence has resolved.
    let ctx = new_context(1024);

    let t1 = ctx.execute_task(Vec::new(), 0, 0).await.unwrap();
    ctx.issue_mapping_fence().await.unwrap();
    let t2 = ctx.execute_task(Vec::new(), 0, 0).await.unwrap();

    // t2's precondition carries the fence's barrier, which merges t1's
    // completion event, so t2 cannot finish before t1 does.
    assert!(t2.get().await.is_ok());
    assert!(t1.is_ready());
}

#[tokio::test]
async fn window_block_releases_the_fifth_registration_only_after_the_first_commits() {
    // Scenario S4: with window=4, registering an 8th task in a row without
    // waiting blocks the 5th call until the 1st commits.
    let ctx = Arc::new(new_context(4));
    let mut futures = Vec::new();
    for _ in 0..4 {
        futures.push(ctx.execute_task(Vec::new(), 0, 0).await.unwrap());
    }
    assert_eq!(ctx.outstanding_children(), 4);

    let ctx_clone = ctx.clone();
    let released = Arc::new(tokio::sync::Notify::new());
    let released_clone = released.clone();
    let fifth = tokio::spawn(async move {
        ctx_clone.execute_task(Vec::new(), 0, 0).await.unwrap();
        released_clone.notify_one();
    });

    for future in futures {
        future.get().await.unwrap();
    }
    released.notified().await;
    fifth.await.unwrap();
}

#[tokio::test]
async fn trace_replay_reuses_the_first_executions_mapping() {
    // Scenario S5 / property 5: a loop body recorded under begin_trace(42)
    // then replayed reaches the same outcome on its second pass.
    let ctx = new_context(1024);
    let index_space = ctx.create_index_space().unwrap();
    let field_space = ctx.create_field_space().unwrap();
    let region = ctx.create_logical_region(index_space, field_space).unwrap();

    ctx.begin_trace(42).await.unwrap();
    let first = ctx
        .execute_task(vec![requirement(region, Privilege::WriteOnly)], 0, 0)
        .await
        .unwrap();
    first.get().await.unwrap();
    ctx.end_trace(42).await.unwrap();

    ctx.begin_trace(42).await.unwrap();
    let second = ctx
        .execute_task(vec![requirement(region, Privilege::WriteOnly)], 0, 0)
        .await
        .unwrap();
    second.get().await.unwrap();
    ctx.end_trace(42).await.unwrap();
}

#[tokio::test]
async fn replicate_deletion_is_applied_exactly_once_across_three_shards() {
    // Scenario S6: three shards each call destroy_logical_region(R); the
    // destruction is applied exactly once across the shards, and every
    // shard's call only returns once all three have arrived. This
    // single-process runtime collapses "three shards" to three
    // concurrent callers against one `ReplicateContext` of shard_count 3
    // (the same collapse the ring allocator documents for id batches).
    let inner = Arc::new(new_context(1024));
    let index_space = inner.create_index_space().unwrap();
    let field_space = inner.create_field_space().unwrap();
    let region = inner.create_logical_region(index_space, field_space).unwrap();

    assert_eq!(inner.leaked_resource_count(), 3);

    let ctx = Arc::new(ReplicateContext::new(inner.clone(), 0, 3));
    let (a, b, c) = tokio::join!(
        ctx.destroy_logical_region(region),
        ctx.destroy_logical_region(region),
        ctx.destroy_logical_region(region),
    );
    assert!(a.is_ok());
    assert!(b.is_ok());
    assert!(c.is_ok());

    // If destruction had run more than once (or not at all despite every
    // shard returning Ok), this count would be wrong; exactly-once
    // application is what drops it from 3 down to 2, not just the three
    // calls returning success.
    assert_eq!(inner.leaked_resource_count(), 2);
}
