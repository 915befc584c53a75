//! PassThrough filter - forwards buffers unchanged.

use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::filter::{
    DEFAULT_PORT_NAME, Filter, FilterBase, FilterState, FilterType, WorkMode, WorkModes,
};
use crate::observability::FilterMetrics;
use smallvec::smallvec;

/// A filter that forwards buffers along its internal route unchanged.
///
/// Pushed buffers go out on the output paired with the input they arrived
/// on; pull requests on an output are forwarded to the paired input's
/// upstream. The input is activated in whatever mode downstream chose for
/// the output. Negotiation and configuration use the default forwarding.
///
/// Useful as a placeholder stage and for testing pipeline plumbing.
pub struct PassThrough {
    base: FilterBase,
    metrics: FilterMetrics,
}

impl PassThrough {
    /// Create a new PassThrough filter.
    pub fn new(name: impl Into<String>) -> Self {
        let base = FilterBase::new(name, FilterType::Generic);
        let metrics = FilterMetrics::new(base.name());
        Self { base, metrics }
    }
}

impl Filter for PassThrough {
    fn base(&self) -> &FilterBase {
        &self.base
    }

    fn prepare(&self) -> Result<()> {
        // Downstream prepares first, so the output already knows its mode.
        let mode = self
            .base
            .out_port(DEFAULT_PORT_NAME)
            .map(|port| port.work_mode())
            .unwrap_or_default();
        self.base.prepare_with(&[mode])?;
        self.base.notify_ready();
        Ok(())
    }

    fn work_modes(&self) -> WorkModes {
        smallvec![WorkMode::Push, WorkMode::Pull]
    }

    fn push_data(&self, in_port: &str, buffer: Buffer, offset: Option<u64>) -> Result<()> {
        if self.base.is_flushing() {
            return Ok(());
        }
        match self.base.state() {
            FilterState::Running | FilterState::Ready | FilterState::Paused => {}
            _ => return Err(Error::InvalidOperation),
        }
        let _timer = self.metrics.start_timer();
        self.metrics.record_in(buffer.len());
        let len = buffer.len();
        self.base.route_out_port(in_port)?.push_data(buffer, offset)?;
        self.metrics.record_out(len);
        Ok(())
    }

    fn pull_data(&self, out_port: &str, offset: u64, size: usize) -> Result<Buffer> {
        let in_port = self
            .base
            .routes()
            .into_iter()
            .find(|(_, out)| out == out_port)
            .map(|(input, _)| input)
            .ok_or(Error::NotExisted)?;
        let port = self.base.in_port(&in_port).ok_or(Error::NotExisted)?;
        let buffer = port.pull_data(offset, size)?;
        self.metrics.record_out(buffer.len());
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::InitContext;
    use std::sync::Arc;

    #[test]
    fn test_push_before_prepare_is_rejected() {
        let filter: Arc<dyn Filter> = Arc::new(PassThrough::new("identity"));
        filter.init(InitContext::new(&filter)).unwrap();
        assert_eq!(
            filter.push_data("default", Buffer::from_bytes(&b"x"[..]), None),
            Err(Error::InvalidOperation)
        );
    }

    #[test]
    fn test_unknown_route() {
        let filter: Arc<dyn Filter> = Arc::new(PassThrough::new("identity"));
        filter.init(InitContext::new(&filter)).unwrap();
        assert_eq!(
            filter.pull_data("video_0", 0, 4).map(|b| b.len()),
            Err(Error::NotExisted)
        );
    }

    #[test]
    fn test_flushing_drops_data() {
        let filter: Arc<dyn Filter> = Arc::new(PassThrough::new("identity"));
        filter.init(InitContext::new(&filter)).unwrap();
        filter.flush_start();
        assert!(filter.push_data("default", Buffer::from_bytes(&b"x"[..]), None).is_ok());
        filter.flush_end();
    }
}
