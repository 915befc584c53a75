//! Pipeline construction and lifecycle driving.
//!
//! - [`Pipeline`]: owns a set of filters, keeps them in processing order
//!   and runs lifecycle operations across them sink-first
//! - [`FilterFactory`]: creates filters by registered name
//! - [`EventChannel`]: broadcasts pipeline events to async subscribers
//!
//! # Example
//!
//! ```rust
//! use std::sync::{Arc, Weak};
//! use cadence::event::EventReceiver;
//! use cadence::pipeline::{EventChannel, FilterFactory, Pipeline};
//!
//! let factory = FilterFactory::with_builtins();
//! let channel = Arc::new(EventChannel::default());
//! let receiver: Weak<dyn EventReceiver> = Arc::downgrade(&channel) as Weak<dyn EventReceiver>;
//!
//! let pipeline = Pipeline::new("player");
//! pipeline.init(receiver, None);
//!
//! let identity = factory.create("builtin.passthrough", "identity").unwrap();
//! let sink = factory.create("builtin.null_sink", "sink").unwrap();
//! pipeline.add_filters(&[identity.clone(), sink.clone()]).unwrap();
//! pipeline.link_filters(&[identity, sink]).unwrap();
//! ```

mod events;
mod factory;
mod graph;

pub use events::{EventChannel, EventSubscription};
pub use factory::{FilterConstructor, FilterFactory};
pub use graph::Pipeline;
