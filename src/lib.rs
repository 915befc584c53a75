//! # Cadence
//!
//! The core of a media playback engine: a graph of filters linked port to
//! port, a pipeline that drives them through their lifecycle, a staging
//! buffer for pull-mode demuxing and a clock authority that keeps audio and
//! video sinks in step.
//!
//! ## Components
//!
//! - [`filter`]: the [`Filter`](filter::Filter) trait, ports and the
//!   lifecycle state machine
//! - [`pipeline`]: the [`Pipeline`](pipeline::Pipeline) scheduler, the
//!   filter factory and event fan-out
//! - [`demux`]: the [`DataPacker`](demux::DataPacker) byte-range buffer
//! - [`sync`]: the [`MediaSyncManager`](sync::MediaSyncManager) and the
//!   preroll barrier
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use cadence::prelude::*;
//!
//! let source = Arc::new(BufferedSource::new("source"));
//! let sink = Arc::new(NullSink::new("sink"));
//! let filters: Vec<Arc<dyn Filter>> = vec![source.clone(), sink.clone()];
//!
//! let pipeline = Pipeline::new("player");
//! pipeline.add_filters(&filters)?;
//! pipeline.link_filters(&filters)?;
//! pipeline.prepare()?;
//! assert_eq!(pipeline.state(), FilterState::Ready);
//!
//! source.feed(Buffer::from_bytes(&b"payload"[..]), 0);
//! pipeline.start()?;
//! # Ok::<(), cadence::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod buffer;
pub mod clock;
pub mod demux;
pub mod elements;
pub mod error;
pub mod event;
pub mod filter;
pub mod format;
pub mod metadata;
pub mod observability;
pub mod pipeline;
pub mod sync;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::buffer::Buffer;
    pub use crate::clock::{Clock, ClockTime, ManualClock, SystemClock};
    pub use crate::demux::{DataPacker, DataPackerConfig, RangeStatus};
    pub use crate::elements::{BufferedSource, NullSink, PassThrough};
    pub use crate::error::{Error, Result};
    pub use crate::event::{Event, EventParam, EventReceiver, EventType};
    pub use crate::filter::{
        Filter, FilterBase, FilterCallback, FilterCallbackCommand, FilterState, FilterType,
        InPort, InitContext, OutPort, WorkMode,
    };
    pub use crate::format::{Capability, CapabilitySet, CapsValue, Meta, MetaValue};
    pub use crate::metadata::Metadata;
    pub use crate::pipeline::{EventChannel, FilterFactory, Pipeline};
    pub use crate::sync::{
        MediaSyncCenter, MediaSyncManager, MediaSynchronizer, SyncConfig, SyncerPriority,
    };
}

pub use error::{Error, Result};
