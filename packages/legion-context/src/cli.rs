use clap::Parser;

use crate::window::RunaheadWindow;

/// Process-wide runtime configuration (spec.md §8, "CLI surface").
/// Every flag here tunes something the context or its collaborators
/// read once at startup; there is no live-reload story.
#[derive(Parser, Debug, Clone)]
#[command(name = "legion")]
#[command(about = "Execution context and operation pipeline runtime", long_about = None)]
pub struct RuntimeConfig {
    /// Number of CPU processors to create per node.
    #[arg(long, default_value_t = 1)]
    pub cpus: u32,

    /// Number of GPU processors to create per node.
    #[arg(long, default_value_t = 0)]
    pub gpus: u32,

    /// Number of I/O processors to create per node.
    #[arg(long, default_value_t = 0)]
    pub ios: u32,

    /// Number of Python processors to create per node.
    #[arg(long, default_value_t = 0)]
    pub pys: u32,

    /// Stack size in KB for each created processor.
    #[arg(long, default_value_t = 2048)]
    pub stack_size_kb: u32,

    /// Runahead window size (outstanding unretired children per context).
    #[arg(long, default_value_t = RunaheadWindow::DEFAULT_WINDOW_SIZE)]
    pub window_size: usize,

    /// Hysteresis fraction below the window before blocked registrants
    /// are released, e.g. 0.25 for 25%.
    #[arg(long, default_value_t = RunaheadWindow::DEFAULT_HYSTERESIS)]
    pub hysteresis: f64,

    /// Maximum outstanding frames per context; 0 disables frame capping.
    #[arg(long, default_value_t = 0)]
    pub max_outstanding_frames: usize,

    /// Maximum trace templates cached per trace id.
    #[arg(long, default_value_t = crate::trace::MAX_TEMPLATES_PER_TRACE)]
    pub max_trace_templates: usize,

    /// Enable extra mapper-output validation (safe mode).
    #[arg(long, default_value_t = true)]
    pub mapper_debug: bool,

    /// Path to write profiling output; unset disables profiling.
    #[arg(long)]
    pub profile_logfile: Option<String>,

    /// Minimum instance footprint (bytes) worth a profiling record.
    #[arg(long, default_value_t = 0)]
    pub profile_footprint_threshold: u64,

    /// Minimum mapper call latency (microseconds) worth a profiling record.
    #[arg(long, default_value_t = 0)]
    pub profile_call_latency_threshold_micros: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            cpus: 1,
            gpus: 0,
            ios: 0,
            pys: 0,
            stack_size_kb: 2048,
            window_size: RunaheadWindow::DEFAULT_WINDOW_SIZE,
            hysteresis: RunaheadWindow::DEFAULT_HYSTERESIS,
            max_outstanding_frames: 0,
            max_trace_templates: crate::trace::MAX_TEMPLATES_PER_TRACE,
            mapper_debug: true,
            profile_logfile: None,
            profile_footprint_threshold: 0,
            profile_call_latency_threshold_micros: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_well_formed() {
        RuntimeConfig::command().debug_assert();
    }

    #[test]
    fn defaults_match_spec_constants() {
        let config = RuntimeConfig::default();
        assert_eq!(config.window_size, 1024);
        assert_eq!(config.max_trace_templates, 16);
    }
}
