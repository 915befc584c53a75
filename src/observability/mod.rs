//! Observability features: metrics and tracing.
//!
//! ## Metrics
//!
//! Cadence records the following through the `metrics` facade:
//!
//! | Metric | Type | Description |
//! |--------|------|-------------|
//! | `cadence_packer_buffers_pushed` | Counter | Buffers queued into data packers |
//! | `cadence_packer_bytes_pushed` | Counter | Bytes queued into data packers |
//! | `cadence_packer_bytes_read` | Counter | Bytes read out of data packers |
//! | `cadence_packer_flushes` | Counter | Data packer flushes |
//! | `cadence_packer_queue_depth` | Gauge | Buffers queued in a data packer |
//! | `cadence_sync_anchor_updates` | Counter | Anchor reports by outcome |
//! | `cadence_sync_preroll_releases` | Counter | Synchronizers released from preroll |
//! | `cadence_filter_buffers` | Counter | Buffers handled per filter and direction |
//! | `cadence_filter_bytes` | Counter | Bytes handled per filter and direction |
//! | `cadence_filter_processing_time_ns` | Histogram | Per-buffer processing time |
//! | `cadence_pipeline_operations` | Counter | Lifecycle operations per pipeline |
//! | `cadence_pipeline_errors` | Counter | Failed lifecycle operations |
//!
//! Nothing is exported unless the application installs a recorder.
//!
//! ## Tracing
//!
//! Pipeline lifecycle batches run inside a `pipeline` span; per-filter
//! failures are logged with the filter name and error code.

mod metrics;
mod tracing_support;

pub use metrics::{
    FilterMetrics, PipelineMetrics, TimerGuard, init_metrics, record_anchor_update,
    record_packer_depth, record_packer_flush, record_packer_push, record_packer_read,
    record_preroll_release,
};
pub use tracing_support::{
    TracingConfig, instrument_filter, instrument_pipeline, span_filter, span_pipeline,
    trace_filter_error, trace_state_change,
};
