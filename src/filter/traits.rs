//! Core filter trait and the types it is described with.

use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::filter::base::FilterBase;
use crate::filter::context::InitContext;
use crate::filter::port::{InPort, Negotiated, OutPort, WorkMode, WorkModes};
use crate::format::{Capability, Meta, MetaValue, Params};
use crate::sync::MediaSyncCenter;
use smallvec::smallvec;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};

// ============================================================================
// Filter type and state
// ============================================================================

/// Closed set of filter roles.
///
/// The role decides which default ports a filter gets at init: sources have
/// no input, sinks have no output, everything else has one of each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterType {
    /// Reads a byte stream from a URI or device.
    MediaSource,
    /// Splits a container into elementary streams.
    Demuxer,
    /// Decodes compressed audio.
    AudioDecoder,
    /// Decodes compressed video.
    VideoDecoder,
    /// Encodes raw audio.
    AudioEncoder,
    /// Encodes raw video.
    VideoEncoder,
    /// Interleaves elementary streams into a container.
    Muxer,
    /// Renders audio.
    AudioSink,
    /// Renders video.
    VideoSink,
    /// Writes a container to a file or socket.
    OutputSink,
    /// Captures from a device.
    CaptureSource,
    /// Any other processing step.
    Generic,
}

impl FilterType {
    /// Check if filters of this type produce data without an input.
    pub fn is_source(self) -> bool {
        matches!(self, Self::MediaSource | Self::CaptureSource)
    }

    /// Check if filters of this type consume data without an output.
    pub fn is_sink(self) -> bool {
        matches!(self, Self::AudioSink | Self::VideoSink | Self::OutputSink)
    }
}

/// Lifecycle state of a filter.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilterState {
    /// Constructed, not yet initialized.
    #[default]
    Created = 0,
    /// Ports built, ready to prepare.
    Initialized = 1,
    /// Negotiating with neighbours.
    Preparing = 2,
    /// Negotiation finished.
    Ready = 3,
    /// Processing data.
    Running = 4,
    /// Processing suspended.
    Paused = 5,
}

impl FilterState {
    /// Get the state name for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "Created",
            Self::Initialized => "Initialized",
            Self::Preparing => "Preparing",
            Self::Ready => "Ready",
            Self::Running => "Running",
            Self::Paused => "Paused",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Initialized,
            2 => Self::Preparing,
            3 => Self::Ready,
            4 => Self::Running,
            5 => Self::Paused,
            _ => Self::Created,
        }
    }
}

/// Lock-free cell holding a [`FilterState`].
#[derive(Debug, Default)]
pub struct AtomicFilterState(AtomicU8);

impl AtomicFilterState {
    /// Create a cell holding `state`.
    pub fn new(state: FilterState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    /// Read the current state.
    #[inline]
    pub fn load(&self) -> FilterState {
        FilterState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Replace the current state.
    #[inline]
    pub fn store(&self, state: FilterState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

// ============================================================================
// Callbacks
// ============================================================================

/// Kind of elementary stream a dynamic port carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamType {
    /// Audio track.
    Audio,
    /// Video track.
    Video,
    /// Subtitle track.
    Subtitle,
    /// Anything else.
    Unknown,
}

impl StreamType {
    /// Prefix used when naming dynamic ports for this stream type.
    pub fn port_prefix(self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Subtitle => "subtitle",
            Self::Unknown => "unknown",
        }
    }
}

/// Structural changes a filter reports to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterCallbackCommand {
    /// A dynamic output port was created.
    PortAdded {
        /// Name of the new port.
        port: String,
        /// Stream carried by the port.
        stream_type: StreamType,
    },
    /// A dynamic output port was removed.
    PortRemoved {
        /// Name of the removed port.
        port: String,
    },
}

/// Receives structural callbacks from filters.
///
/// A demuxer announces one output port per elementary stream this way; the
/// session then creates and links the matching decoder chain.
pub trait FilterCallback: Send + Sync {
    /// Handle a callback from `filter`.
    fn on_callback(&self, filter: &Arc<dyn Filter>, command: FilterCallbackCommand);
}

// ============================================================================
// Filter trait
// ============================================================================

/// A processing node in a pipeline.
///
/// Implementors embed a [`FilterBase`] and return it from [`Filter::base`];
/// every other method has a default built on it. Concrete filters override
/// the lifecycle methods they need, typically calling the base first and
/// then doing their own work.
///
/// Filters are shared as `Arc<dyn Filter>`, so every method takes `&self`
/// and mutable state lives behind the base's locks or the filter's own.
///
/// # Example
///
/// ```rust
/// use cadence::filter::{Filter, FilterBase, FilterType};
///
/// struct Identity {
///     base: FilterBase,
/// }
///
/// impl Filter for Identity {
///     fn base(&self) -> &FilterBase {
///         &self.base
///     }
/// }
///
/// let filter = Identity { base: FilterBase::new("identity", FilterType::Generic) };
/// assert_eq!(filter.name(), "identity");
/// ```
pub trait Filter: Send + Sync {
    /// Get the shared filter state.
    fn base(&self) -> &FilterBase;

    /// Get the filter's name.
    fn name(&self) -> &str {
        self.base().name()
    }

    /// Get the filter's role.
    fn filter_type(&self) -> FilterType {
        self.base().filter_type()
    }

    /// Get the current lifecycle state.
    fn state(&self) -> FilterState {
        self.base().state()
    }

    /// Attach to a pipeline and build the default ports.
    fn init(&self, ctx: InitContext) -> Result<()> {
        self.base().init(ctx)
    }

    /// Start negotiating with neighbours.
    ///
    /// The default activates the default input port in push mode. Filters
    /// signal completion with [`FilterBase::notify_ready`] rather than by
    /// writing the state directly.
    fn prepare(&self) -> Result<()> {
        self.base().prepare()
    }

    /// Begin processing.
    fn start(&self) -> Result<()> {
        self.base().start()
    }

    /// Suspend processing.
    fn pause(&self) -> Result<()> {
        self.base().pause()
    }

    /// Continue after a pause.
    fn resume(&self) -> Result<()> {
        self.start()
    }

    /// Stop processing and return to `Initialized`.
    fn stop(&self) -> Result<()> {
        self.base().stop()
    }

    /// Begin discarding buffered data.
    fn flush_start(&self) {
        self.base().flush_start()
    }

    /// Finish discarding buffered data.
    fn flush_end(&self) {
        self.base().flush_end()
    }

    /// Work modes this filter can serve on its outputs, in preference order.
    fn work_modes(&self) -> WorkModes {
        smallvec![WorkMode::Push]
    }

    /// Negotiate an upstream capability arriving on `in_port`.
    ///
    /// The default forwards along the internal route to the paired output
    /// port.
    fn negotiate(
        &self,
        in_port: &str,
        upstream_cap: &Capability,
        upstream_params: &Params,
    ) -> Result<Negotiated> {
        self.base().route_out_port(in_port)?.negotiate(upstream_cap, upstream_params)
    }

    /// Accept finalized stream metadata arriving on `in_port`.
    fn configure(&self, in_port: &str, upstream_meta: &Meta) -> Result<()> {
        self.base().route_out_port(in_port)?.configure(upstream_meta)
    }

    /// Receive a buffer pushed into `in_port`.
    fn push_data(&self, in_port: &str, buffer: Buffer, offset: Option<u64>) -> Result<()> {
        let _ = (in_port, buffer, offset);
        Err(Error::Unimplemented)
    }

    /// Serve `size` bytes at `offset` to the downstream peer of `out_port`.
    fn pull_data(&self, out_port: &str, offset: u64, size: usize) -> Result<Buffer> {
        let _ = (out_port, offset, size);
        Err(Error::Unimplemented)
    }

    /// Set a filter parameter.
    fn set_parameter(&self, key: &str, value: MetaValue) -> Result<()> {
        let _ = (key, value);
        Err(Error::Unimplemented)
    }

    /// Read a filter parameter.
    fn get_parameter(&self, key: &str) -> Result<MetaValue> {
        let _ = key;
        Err(Error::Unimplemented)
    }

    /// Attach the session's sync center.
    fn set_sync_center(&self, center: Weak<dyn MediaSyncCenter>) {
        self.base().set_sync_center(center)
    }

    /// Get all input ports.
    fn in_ports(&self) -> Vec<Arc<InPort>> {
        self.base().in_ports()
    }

    /// Get all output ports.
    fn out_ports(&self) -> Vec<Arc<OutPort>> {
        self.base().out_ports()
    }

    /// Find an input port by name.
    fn in_port(&self, name: &str) -> Option<Arc<InPort>> {
        self.base().in_port(name)
    }

    /// Find an output port by name.
    fn out_port(&self, name: &str) -> Option<Arc<OutPort>> {
        self.base().out_port(name)
    }

    /// Filters connected to this filter's inputs.
    fn pre_filters(&self) -> Vec<Arc<dyn Filter>> {
        self.base().pre_filters()
    }

    /// Filters connected to this filter's outputs.
    fn next_filters(&self) -> Vec<Arc<dyn Filter>> {
        self.base().next_filters()
    }

    /// Disconnect every input from its upstream peer.
    fn unlink_prev_filters(&self) {
        self.base().unlink_prev_filters()
    }
}

/// Identity of a filter for graph bookkeeping.
///
/// Filters are compared by allocation, not by name.
#[inline]
pub fn filter_key(filter: &Arc<dyn Filter>) -> usize {
    Arc::as_ptr(filter) as *const () as usize
}
