use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use legion_context::{NullSink, ProfilerSink, RuntimeConfig, TopLevelContext, TracingSink};
use legion_mapper::{ProcessorId, TaskId, TrivialMapper};
use legion_region::SimpleForest;

/// Process entry point: parses `RuntimeConfig` from argv, wires up the
/// region forest / mapper / profiler a node needs, and drives one
/// top-level task through its context (spec.md §8, "CLI surface"). A
/// real node would take its mapper and region forest from the
/// application it hosts; this binary exists to exercise the pipeline
/// end to end, so it wires in `SimpleForest` and `TrivialMapper`.
#[tokio::main]
async fn main() -> ExitCode {
    let config = RuntimeConfig::parse();

    let filter = if config.mapper_debug {
        "legion_context=debug,legion_region=debug,legion_mapper=debug"
    } else {
        "legion_context=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .init();

    let profiler: Arc<dyn ProfilerSink> = match &config.profile_logfile {
        Some(_) => Arc::new(TracingSink::new(
            config.profile_footprint_threshold,
            config.profile_call_latency_threshold_micros,
        )),
        None => Arc::new(NullSink),
    };

    let top = TopLevelContext::new(
        Arc::new(SimpleForest::new()),
        Arc::new(TrivialMapper::new(ProcessorId(0))),
        profiler,
        &config,
    );

    match run(&top).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "top-level task failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(top: &TopLevelContext) -> legion_context::Result<()> {
    let ctx = top.create_for_task(TaskId(0)).await;
    let fence = ctx.issue_mapping_fence().await?;
    tracing::info!(generation = fence, "top-level task issued its mapping fence");
    Ok(())
}
