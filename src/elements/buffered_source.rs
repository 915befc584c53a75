//! BufferedSource filter - serves application-fed bytes to downstream.

use crate::buffer::Buffer;
use crate::demux::{DataPacker, DataPackerConfig};
use crate::error::{Error, Result};
use crate::filter::{
    DEFAULT_PORT_NAME, Filter, FilterBase, FilterType, Negotiated, OutPort, WorkMode, WorkModes,
};
use crate::format::{Capability, Meta, MetaValue, Params};
use crate::observability::FilterMetrics;
use smallvec::smallvec;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// A media source fed by the application and read by offset.
///
/// Bytes handed to [`feed`](Self::feed) are staged in a [`DataPacker`].
/// In pull mode downstream reads them with `pull_data`; in push mode
/// [`push_pending`](Self::push_pending) drains the packer and pushes what
/// it holds.
///
/// After [`end_of_stream`](Self::end_of_stream), reads at or past the end
/// of everything fed report `EndOfStream`. Reads before it that miss the
/// packer report `Again` so the application can feed that range again.
pub struct BufferedSource {
    base: FilterBase,
    packer: DataPacker,
    fed_end: AtomicU64,
    metrics: FilterMetrics,
}

impl BufferedSource {
    /// Create a source with the default packer configuration.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, DataPackerConfig::default())
    }

    /// Create a source with an explicit packer configuration.
    pub fn with_config(name: impl Into<String>, config: DataPackerConfig) -> Self {
        let base = FilterBase::new(name, FilterType::MediaSource);
        let metrics = FilterMetrics::new(base.name());
        Self {
            base,
            packer: DataPacker::with_config(config),
            fed_end: AtomicU64::new(0),
            metrics,
        }
    }

    /// Get the staging packer.
    pub fn packer(&self) -> &DataPacker {
        &self.packer
    }

    /// Stage `buffer` at stream offset `offset`.
    ///
    /// Blocks while the packer is full. Returns `false` if the source is
    /// stopped.
    pub fn feed(&self, buffer: Buffer, offset: u64) -> bool {
        let end = offset + buffer.len() as u64;
        self.metrics.record_in(buffer.len());
        if !self.packer.push_data(buffer, offset) {
            return false;
        }
        self.fed_end.fetch_max(end, Ordering::AcqRel);
        true
    }

    /// End offset of the furthest data fed since the last stop or flush.
    pub fn fed_end(&self) -> u64 {
        self.fed_end.load(Ordering::Acquire)
    }

    /// Mark the end of the fed data.
    pub fn end_of_stream(&self) {
        self.packer.set_eos();
    }

    /// Offer `cap` to downstream and return what it agreed to.
    pub fn negotiate_downstream(&self, cap: &Capability, params: &Params) -> Result<Negotiated> {
        self.default_out()?.negotiate(cap, params)
    }

    /// Send finalized stream metadata downstream.
    pub fn configure_downstream(&self, meta: &Meta) -> Result<()> {
        self.default_out()?.configure(meta)
    }

    /// Push everything staged so far downstream in chunks of `chunk` bytes.
    ///
    /// Returns the number of bytes pushed.
    pub fn push_pending(&self, chunk: usize) -> Result<usize> {
        let port = self.default_out()?;
        if port.work_mode() != WorkMode::Push {
            return Err(Error::InvalidOperation);
        }
        let mut pushed = 0;
        while !self.packer.is_empty() {
            let buffer = self.packer.get_range_live(chunk.max(1))?;
            let offset = buffer.metadata().offset;
            pushed += buffer.len();
            self.metrics.record_out(buffer.len());
            port.push_data(buffer, offset)?;
        }
        Ok(pushed)
    }

    fn default_out(&self) -> Result<Arc<OutPort>> {
        self.base.out_port(DEFAULT_PORT_NAME).ok_or(Error::NotExisted)
    }
}

impl Filter for BufferedSource {
    fn base(&self) -> &FilterBase {
        &self.base
    }

    fn prepare(&self) -> Result<()> {
        self.base.prepare()?;
        self.base.notify_ready();
        Ok(())
    }

    fn start(&self) -> Result<()> {
        self.base.start()?;
        self.packer.start();
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        self.packer.stop();
        self.packer.flush();
        self.fed_end.store(0, Ordering::Release);
        self.base.stop()
    }

    fn flush_start(&self) {
        self.base.flush_start();
        self.packer.flush();
        self.fed_end.store(0, Ordering::Release);
    }

    fn work_modes(&self) -> WorkModes {
        smallvec![WorkMode::Pull, WorkMode::Push]
    }

    fn pull_data(&self, _out_port: &str, offset: u64, size: usize) -> Result<Buffer> {
        if self.base.is_flushing() {
            return Err(Error::Again);
        }
        let status = self.packer.is_data_available(offset, size);
        if !status.available {
            if self.packer.is_eos() && offset >= self.fed_end() {
                return Err(Error::EndOfStream);
            }
            tracing::trace!(
                "filter '{}' has no data at {}, refill from {}",
                self.base.name(),
                offset,
                status.cur_offset
            );
            return Err(Error::Again);
        }
        let buffer = self.packer.get_range(offset, size)?;
        self.metrics.record_out(buffer.len());
        Ok(buffer)
    }

    fn get_parameter(&self, key: &str) -> Result<MetaValue> {
        match key {
            "size" => Ok(MetaValue::Int(self.packer.size() as i64)),
            "eos" => Ok(MetaValue::Bool(self.packer.is_eos())),
            _ => Err(Error::InvalidParameterValue),
        }
    }
}
