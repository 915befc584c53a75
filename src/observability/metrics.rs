//! Metrics collection using metrics-rs.

use metrics::{Counter, Histogram, Unit, counter, gauge, histogram};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

const PACKER_BUFFERS_PUSHED: &str = "cadence_packer_buffers_pushed";
const PACKER_BYTES_PUSHED: &str = "cadence_packer_bytes_pushed";
const PACKER_BYTES_READ: &str = "cadence_packer_bytes_read";
const PACKER_FLUSHES: &str = "cadence_packer_flushes";
const PACKER_QUEUE_DEPTH: &str = "cadence_packer_queue_depth";
const SYNC_ANCHORS: &str = "cadence_sync_anchor_updates";
const SYNC_PREROLL_RELEASES: &str = "cadence_sync_preroll_releases";
const FILTER_BUFFERS: &str = "cadence_filter_buffers";
const FILTER_BYTES: &str = "cadence_filter_bytes";
const FILTER_PROCESSING_TIME_NS: &str = "cadence_filter_processing_time_ns";
const PIPELINE_OPERATIONS: &str = "cadence_pipeline_operations";
const PIPELINE_ERRORS: &str = "cadence_pipeline_errors";

/// Initialize metrics descriptions.
///
/// Call this once at application startup before using any metrics.
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    metrics::describe_counter!(
        PACKER_BUFFERS_PUSHED,
        Unit::Count,
        "Buffers queued into data packers"
    );
    metrics::describe_counter!(PACKER_BYTES_PUSHED, Unit::Bytes, "Bytes queued into data packers");
    metrics::describe_counter!(PACKER_BYTES_READ, Unit::Bytes, "Bytes read out of data packers");
    metrics::describe_counter!(
        PACKER_FLUSHES,
        Unit::Count,
        "Data packer flushes (explicit, cache miss or discontinuity)"
    );
    metrics::describe_gauge!(
        PACKER_QUEUE_DEPTH,
        Unit::Count,
        "Buffers currently queued in a data packer"
    );
    metrics::describe_counter!(
        SYNC_ANCHORS,
        Unit::Count,
        "Clock anchor reports, labelled accepted or rejected"
    );
    metrics::describe_counter!(
        SYNC_PREROLL_RELEASES,
        Unit::Count,
        "Synchronizers released by the preroll barrier"
    );
    metrics::describe_counter!(FILTER_BUFFERS, Unit::Count, "Buffers handled by filters");
    metrics::describe_counter!(FILTER_BYTES, Unit::Bytes, "Bytes handled by filters");
    metrics::describe_histogram!(
        FILTER_PROCESSING_TIME_NS,
        Unit::Nanoseconds,
        "Time a filter spends on one buffer"
    );
    metrics::describe_counter!(
        PIPELINE_OPERATIONS,
        Unit::Count,
        "Pipeline lifecycle operations"
    );
    metrics::describe_counter!(
        PIPELINE_ERRORS,
        Unit::Count,
        "Pipeline lifecycle operations that failed"
    );
}

/// Record a buffer queued into a data packer.
#[inline]
pub fn record_packer_push(bytes: usize) {
    counter!(PACKER_BUFFERS_PUSHED).increment(1);
    counter!(PACKER_BYTES_PUSHED).increment(bytes as u64);
}

/// Record bytes read out of a data packer.
#[inline]
pub fn record_packer_read(bytes: usize) {
    counter!(PACKER_BYTES_READ).increment(bytes as u64);
}

/// Record a data packer flush.
#[inline]
pub fn record_packer_flush() {
    counter!(PACKER_FLUSHES).increment(1);
}

/// Record the number of queued buffers.
#[inline]
pub fn record_packer_depth(depth: usize) {
    gauge!(PACKER_QUEUE_DEPTH).set(depth as f64);
}

/// Record a clock anchor report.
#[inline]
pub fn record_anchor_update(accepted: bool) {
    let outcome = if accepted { "accepted" } else { "rejected" };
    counter!(SYNC_ANCHORS, "outcome" => outcome).increment(1);
}

/// Record a preroll barrier release.
#[inline]
pub fn record_preroll_release(synchronizers: usize) {
    counter!(SYNC_PREROLL_RELEASES).increment(synchronizers as u64);
}

/// Metrics collector for a specific filter.
///
/// Provides a convenient way to record metrics with pre-configured labels.
#[derive(Clone)]
pub struct FilterMetrics {
    filter: String,
    buffers_in: Counter,
    buffers_out: Counter,
    bytes_in: Counter,
    bytes_out: Counter,
    processing_time: Histogram,
}

impl FilterMetrics {
    /// Create a collector for the filter named `filter`.
    pub fn new(filter: &str) -> Self {
        Self {
            filter: filter.to_string(),
            buffers_in: counter!(FILTER_BUFFERS, "filter" => filter.to_string(), "direction" => "in"),
            buffers_out: counter!(FILTER_BUFFERS, "filter" => filter.to_string(), "direction" => "out"),
            bytes_in: counter!(FILTER_BYTES, "filter" => filter.to_string(), "direction" => "in"),
            bytes_out: counter!(FILTER_BYTES, "filter" => filter.to_string(), "direction" => "out"),
            processing_time: histogram!(FILTER_PROCESSING_TIME_NS, "filter" => filter.to_string()),
        }
    }

    /// Record an incoming buffer.
    #[inline]
    pub fn record_in(&self, bytes: usize) {
        self.buffers_in.increment(1);
        self.bytes_in.increment(bytes as u64);
    }

    /// Record an outgoing buffer.
    #[inline]
    pub fn record_out(&self, bytes: usize) {
        self.buffers_out.increment(1);
        self.bytes_out.increment(bytes as u64);
    }

    /// Record processing time.
    #[inline]
    pub fn record_time(&self, duration: Duration) {
        self.processing_time.record(duration.as_nanos() as f64);
    }

    /// Start a timer and return a guard that records on drop.
    pub fn start_timer(&self) -> TimerGuard<'_> {
        TimerGuard {
            start: Instant::now(),
            metrics: self,
        }
    }

    /// Get the filter name.
    pub fn filter(&self) -> &str {
        &self.filter
    }
}

/// Guard that records processing time when dropped.
pub struct TimerGuard<'a> {
    start: Instant,
    metrics: &'a FilterMetrics,
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        self.metrics.record_time(self.start.elapsed());
    }
}

/// Metrics collector for a pipeline.
#[derive(Clone)]
pub struct PipelineMetrics {
    name: String,
    errors: Counter,
}

impl PipelineMetrics {
    /// Create a collector for the pipeline named `name`.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            errors: counter!(PIPELINE_ERRORS, "pipeline" => name.to_string()),
        }
    }

    /// Record a lifecycle operation.
    #[inline]
    pub fn record_operation(&self, operation: &'static str) {
        counter!(PIPELINE_OPERATIONS, "pipeline" => self.name.clone(), "operation" => operation)
            .increment(1);
    }

    /// Record a failed lifecycle operation.
    #[inline]
    pub fn record_error(&self) {
        self.errors.increment(1);
    }

    /// Get the pipeline name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_metrics() {
        init_metrics();
        init_metrics();
    }

    #[test]
    fn test_filter_metrics() {
        let metrics = FilterMetrics::new("decoder");
        metrics.record_in(100);
        metrics.record_out(80);
        {
            let _timer = metrics.start_timer();
        }
        assert_eq!(metrics.filter(), "decoder");
    }

    #[test]
    fn test_recording_without_recorder() {
        record_packer_push(10);
        record_packer_read(4);
        record_packer_flush();
        record_packer_depth(3);
        record_anchor_update(true);
        record_anchor_update(false);
        record_preroll_release(2);

        let pipeline = PipelineMetrics::new("player");
        pipeline.record_operation("prepare");
        pipeline.record_error();
        assert_eq!(pipeline.name(), "player");
    }
}
