//! Tracing integration for structured logging and spans.

use crate::error::Error;
use tracing::{Level, Span, span};

/// Configuration for tracing behavior.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Whether lifecycle batches run inside a pipeline span.
    pub pipeline_spans: bool,
    /// Whether each filter call runs inside a filter span.
    pub filter_spans: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            pipeline_spans: true,
            filter_spans: false,
        }
    }
}

impl TracingConfig {
    /// Enable every span.
    pub fn all() -> Self {
        Self {
            pipeline_spans: true,
            filter_spans: true,
        }
    }

    /// Disable all spans.
    pub fn none() -> Self {
        Self {
            pipeline_spans: false,
            filter_spans: false,
        }
    }
}

/// Create a span for a pipeline lifecycle operation.
#[inline]
pub fn span_pipeline(name: &str, operation: &str) -> Span {
    span!(Level::INFO, "pipeline", name = %name, operation = %operation)
}

/// Create a span for one filter call.
#[inline]
pub fn span_filter(pipeline: &str, filter: &str, operation: &str) -> Span {
    span!(
        Level::DEBUG,
        "filter",
        pipeline = %pipeline,
        filter = %filter,
        operation = %operation
    )
}

/// Enter a pipeline span, or a disabled span if `config` turns them off.
pub fn instrument_pipeline(
    config: &TracingConfig,
    name: &str,
    operation: &str,
) -> tracing::span::EnteredSpan {
    if config.pipeline_spans {
        span_pipeline(name, operation).entered()
    } else {
        Span::none().entered()
    }
}

/// Enter a filter span, or a disabled span if `config` turns them off.
pub fn instrument_filter(
    config: &TracingConfig,
    pipeline: &str,
    filter: &str,
    operation: &str,
) -> tracing::span::EnteredSpan {
    if config.filter_spans {
        span_filter(pipeline, filter, operation).entered()
    } else {
        Span::none().entered()
    }
}

/// Log a filter failing a lifecycle operation.
#[inline]
pub fn trace_filter_error(pipeline: &str, filter: &str, operation: &str, error: Error) {
    tracing::error!(
        pipeline = %pipeline,
        filter = %filter,
        operation = %operation,
        error = %error,
        "filter operation failed"
    );
}

/// Log a pipeline state change.
#[inline]
pub fn trace_state_change(pipeline: &str, from: &str, to: &str) {
    tracing::info!(
        pipeline = %pipeline,
        from = %from,
        to = %to,
        "pipeline state changed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracing_config_presets() {
        let config = TracingConfig::default();
        assert!(config.pipeline_spans);
        assert!(!config.filter_spans);

        let config = TracingConfig::all();
        assert!(config.filter_spans);

        let config = TracingConfig::none();
        assert!(!config.pipeline_spans);
    }

    #[test]
    fn test_instrumentation() {
        let config = TracingConfig::all();
        let _guard = instrument_pipeline(&config, "player", "prepare");
        let _guard = instrument_filter(&config, "player", "demuxer", "prepare");
        let _guard = instrument_pipeline(&TracingConfig::none(), "player", "stop");
    }

    #[test]
    fn test_trace_functions() {
        trace_filter_error("player", "decoder", "start", Error::InvalidOperation);
        trace_state_change("player", "Ready", "Running");
    }
}
