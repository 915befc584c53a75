//! NullSink filter - accepts and discards buffers.

use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::filter::{Filter, FilterBase, FilterState, FilterType, Negotiated, WorkMode};
use crate::format::{Capability, CapabilitySet, Meta, MetaValue, Params};
use crate::observability::FilterMetrics;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// A sink that discards every buffer it receives.
///
/// Accepts any capability unless restricted with
/// [`with_caps`](Self::with_caps). Counts what it drops, which makes it
/// handy for benchmarks and for checking that data reaches the end of a
/// chain.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use cadence::buffer::Buffer;
/// use cadence::elements::NullSink;
/// use cadence::filter::{Filter, InitContext};
///
/// let sink = Arc::new(NullSink::new("sink"));
/// let filter: Arc<dyn Filter> = sink.clone();
/// filter.init(InitContext::new(&filter)).unwrap();
/// filter.base().notify_ready();
///
/// filter.push_data("default", Buffer::from_bytes(&b"abc"[..]), None).unwrap();
/// assert_eq!(sink.buffer_count(), 1);
/// assert_eq!(sink.byte_count(), 3);
/// ```
pub struct NullSink {
    base: FilterBase,
    caps: CapabilitySet,
    input_mode: WorkMode,
    negotiated: Mutex<Option<Capability>>,
    configured: Mutex<Meta>,
    buffers: AtomicU64,
    bytes: AtomicU64,
    metrics: FilterMetrics,
}

impl NullSink {
    /// Create a sink accepting any stream.
    pub fn new(name: impl Into<String>) -> Self {
        let base = FilterBase::new(name, FilterType::OutputSink);
        let metrics = FilterMetrics::new(base.name());
        Self {
            base,
            caps: [Capability::any()].into_iter().collect(),
            input_mode: WorkMode::Push,
            negotiated: Mutex::new(None),
            configured: Mutex::new(Meta::new()),
            buffers: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            metrics,
        }
    }

    /// Only accept streams matching one of `caps`.
    pub fn with_caps(mut self, caps: CapabilitySet) -> Self {
        self.caps = caps;
        self
    }

    /// Ask upstream for pull mode instead of push mode.
    pub fn with_pull_mode(mut self) -> Self {
        self.input_mode = WorkMode::Pull;
        self
    }

    /// Number of buffers received.
    pub fn buffer_count(&self) -> u64 {
        self.buffers.load(Ordering::Relaxed)
    }

    /// Number of bytes received.
    pub fn byte_count(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    /// The capability agreed on during negotiation.
    pub fn negotiated(&self) -> Option<Capability> {
        self.negotiated.lock().clone()
    }

    /// The metadata received through `configure`.
    pub fn configured(&self) -> Meta {
        self.configured.lock().clone()
    }
}

impl Filter for NullSink {
    fn base(&self) -> &FilterBase {
        &self.base
    }

    fn prepare(&self) -> Result<()> {
        self.base.prepare_with(&[self.input_mode])?;
        self.base.notify_ready();
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        self.base.stop()?;
        *self.negotiated.lock() = None;
        Ok(())
    }

    fn negotiate(
        &self,
        _in_port: &str,
        upstream_cap: &Capability,
        _upstream_params: &Params,
    ) -> Result<Negotiated> {
        let capability = self.caps.first_match(upstream_cap).ok_or_else(|| {
            tracing::warn!(
                "filter '{}' cannot accept '{}'",
                self.base.name(),
                upstream_cap.mime()
            );
            Error::UnsupportedFormat
        })?;
        *self.negotiated.lock() = Some(capability.clone());
        Ok(Negotiated::new(capability))
    }

    fn configure(&self, _in_port: &str, upstream_meta: &Meta) -> Result<()> {
        self.configured.lock().merge(upstream_meta);
        Ok(())
    }

    fn push_data(&self, _in_port: &str, buffer: Buffer, _offset: Option<u64>) -> Result<()> {
        if self.base.is_flushing() {
            return Ok(());
        }
        match self.base.state() {
            FilterState::Ready | FilterState::Running | FilterState::Paused => {}
            _ => return Err(Error::InvalidOperation),
        }
        self.metrics.record_in(buffer.len());
        self.buffers.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(buffer.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    fn get_parameter(&self, key: &str) -> Result<MetaValue> {
        match key {
            "buffers" => Ok(MetaValue::Int(self.buffer_count() as i64)),
            "bytes" => Ok(MetaValue::Int(self.byte_count() as i64)),
            _ => Err(Error::InvalidParameterValue),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::InitContext;
    use crate::format::mime;
    use std::sync::Arc;

    fn ready_sink(sink: NullSink) -> (Arc<NullSink>, Arc<dyn Filter>) {
        let sink = Arc::new(sink);
        let filter: Arc<dyn Filter> = sink.clone();
        filter.init(InitContext::new(&filter)).unwrap();
        filter.base().notify_ready();
        (sink, filter)
    }

    #[test]
    fn test_counts_and_flush() {
        let (sink, filter) = ready_sink(NullSink::new("sink"));
        filter.push_data("default", Buffer::from_bytes(&b"abcd"[..]), None).unwrap();
        filter.flush_start();
        filter.push_data("default", Buffer::from_bytes(&b"efgh"[..]), None).unwrap();
        filter.flush_end();

        assert_eq!(sink.buffer_count(), 1);
        assert_eq!(filter.get_parameter("bytes"), Ok(MetaValue::Int(4)));
        assert_eq!(filter.get_parameter("rate"), Err(Error::InvalidParameterValue));
    }

    #[test]
    fn test_rejects_unlisted_format() {
        let caps: CapabilitySet = [Capability::new(mime::AUDIO_RAW)].into_iter().collect();
        let (sink, filter) = ready_sink(NullSink::new("sink").with_caps(caps));

        let err = filter
            .negotiate("default", &Capability::new(mime::VIDEO_H264), &Params::new())
            .unwrap_err();
        assert_eq!(err, Error::UnsupportedFormat);

        let ok = filter
            .negotiate("default", &Capability::new(mime::AUDIO_RAW), &Params::new())
            .unwrap();
        assert_eq!(ok.capability.mime(), mime::AUDIO_RAW);
        assert_eq!(sink.negotiated().map(|c| c.mime().to_string()), Some(mime::AUDIO_RAW.to_string()));
    }

    #[test]
    fn test_push_after_stop_is_rejected() {
        let (_sink, filter) = ready_sink(NullSink::new("sink"));
        filter.stop().unwrap();
        assert_eq!(
            filter.push_data("default", Buffer::from_bytes(&b"x"[..]), None),
            Err(Error::InvalidOperation)
        );
    }
}
