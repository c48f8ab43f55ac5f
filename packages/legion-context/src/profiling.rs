use crate::ids::OperationId;
use crate::operation::OperationKind;

/// One profiling observation the context can emit. The wire/output
/// format of a real profiler is explicitly out of scope (spec.md §1);
/// this is the seam the pipeline calls into, not a serialization.
#[derive(Debug, Clone)]
pub enum ProfilingEvent {
    OperationMapped {
        id: OperationId,
        kind: OperationKind,
        mapper_micros: u64,
    },
    OperationCompleted {
        id: OperationId,
        kind: OperationKind,
        execution_micros: u64,
    },
    OperationCommitted {
        id: OperationId,
    },
    MapperCallLatency {
        call: &'static str,
        micros: u64,
    },
    InstanceFootprint {
        bytes: u64,
    },
}

/// Where profiling observations go. A context holds one sink and calls
/// it inline on the hot path, so a sink that wants to batch or persist
/// asynchronously should do so internally rather than blocking the
/// caller.
pub trait ProfilerSink: Send + Sync {
    fn record(&self, event: ProfilingEvent);
}

/// The default sink: discards everything. Used when no profiling flags
/// are set (spec.md §8, CLI surface).
pub struct NullSink;

impl ProfilerSink for NullSink {
    fn record(&self, _event: ProfilingEvent) {}
}

/// Emits every observation as a `tracing` event at `TRACE` level,
/// filterable the same way as the rest of the runtime's structured
/// logging.
pub struct TracingSink {
    pub footprint_threshold_bytes: u64,
    pub call_latency_threshold_micros: u64,
}

impl TracingSink {
    pub fn new(footprint_threshold_bytes: u64, call_latency_threshold_micros: u64) -> Self {
        TracingSink {
            footprint_threshold_bytes,
            call_latency_threshold_micros,
        }
    }
}

impl Default for TracingSink {
    fn default() -> Self {
        TracingSink::new(0, 0)
    }
}

impl ProfilerSink for TracingSink {
    fn record(&self, event: ProfilingEvent) {
        match event {
            ProfilingEvent::OperationMapped {
                id,
                kind,
                mapper_micros,
            } => {
                tracing::trace!(operation = %id, ?kind, mapper_micros, "operation mapped");
            }
            ProfilingEvent::OperationCompleted {
                id,
                kind,
                execution_micros,
            } => {
                tracing::trace!(operation = %id, ?kind, execution_micros, "operation completed");
            }
            ProfilingEvent::OperationCommitted { id } => {
                tracing::trace!(operation = %id, "operation committed");
            }
            ProfilingEvent::MapperCallLatency { call, micros } => {
                if micros >= self.call_latency_threshold_micros {
                    tracing::trace!(call, micros, "mapper call latency");
                }
            }
            ProfilingEvent::InstanceFootprint { bytes } => {
                if bytes >= self.footprint_threshold_bytes {
                    tracing::trace!(bytes, "instance footprint");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_sink_accepts_every_event_kind_without_panicking() {
        let sink = NullSink;
        sink.record(ProfilingEvent::OperationCommitted {
            id: OperationId::fresh(),
        });
        sink.record(ProfilingEvent::InstanceFootprint { bytes: 1024 });
    }
}
