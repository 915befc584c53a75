//! Filter and port graph.
//!
//! A [`Filter`] is a named processing node with a lifecycle state machine
//! and a set of [`InPort`]s and [`OutPort`]s. Filters are linked port to
//! port; data then moves either by push (upstream calls
//! [`OutPort::push_data`]) or by pull (downstream calls
//! [`InPort::pull_data`]).
//!
//! ```text
//! Created --init--> Initialized --prepare--> Preparing --(Ready event)--> Ready
//!                        ^                                                  |
//!                        |                                                start
//!                        |                                                  v
//!                        +-------------------stop----------------- Running <--> Paused
//! ```
//!
//! Concrete filters embed a [`FilterBase`] and override only the methods
//! they need.

pub mod base;
pub mod context;
pub mod port;
pub mod traits;

pub use base::FilterBase;
pub use context::InitContext;
pub use port::{
    DEFAULT_PORT_NAME, InPort, Negotiated, OutPort, PortDirection, WorkMode, WorkModes,
};
pub use traits::{
    AtomicFilterState, Filter, FilterCallback, FilterCallbackCommand, FilterState, FilterType,
    StreamType, filter_key,
};
