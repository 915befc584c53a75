//! Events emitted by filters and forwarded by the pipeline.
//!
//! Filters report state changes and failures upward as [`Event`] values
//! delivered to an [`EventReceiver`]. The pipeline is itself a receiver: it
//! aggregates `Ready` events from its members and passes everything else on
//! to the session-level receiver.
//!
//! # Example
//!
//! ```rust
//! use cadence::error::Error;
//! use cadence::event::{Event, EventParam, EventType};
//!
//! let event = Event::new("decoder", EventType::Error)
//!     .with_param(EventParam::Error(Error::UnsupportedFormat));
//! assert_eq!(event.error_code(), Some(Error::UnsupportedFormat));
//! ```

use crate::clock::ClockTime;
use crate::error::Error;
use std::fmt;

/// Kinds of events a filter can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// The filter finished preparing and negotiating.
    Ready,
    /// Audio playback position report.
    AudioProgress,
    /// Video playback position report.
    VideoProgress,
    /// The filter reached end of stream.
    Complete,
    /// Unrecoverable failure, carries the error code.
    Error,
    /// A plugin failed.
    PluginError,
    /// Plugin-specific notification.
    PluginEvent,
    /// Buffering started or stopped.
    Buffering,
    /// Buffer fill level changed.
    BufferProgress,
    /// Decoder-level failure.
    DecoderError,
}

/// Payload carried by an [`Event`].
#[derive(Debug, Clone, Default, PartialEq)]
pub enum EventParam {
    /// No payload.
    #[default]
    None,
    /// An error code.
    Error(Error),
    /// A media time.
    Time(ClockTime),
    /// An integer (percentages, counts).
    Int(i64),
    /// A flag (buffering on/off).
    Bool(bool),
    /// Free-form text.
    Text(String),
}

/// An event emitted by a filter.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Name of the filter that emitted the event.
    pub src_filter: String,
    /// Event kind.
    pub event_type: EventType,
    /// Payload.
    pub param: EventParam,
}

impl Event {
    /// Create an event with no payload.
    pub fn new(src_filter: impl Into<String>, event_type: EventType) -> Self {
        Self {
            src_filter: src_filter.into(),
            event_type,
            param: EventParam::None,
        }
    }

    /// Create an `Error` event carrying `error`.
    pub fn error(src_filter: impl Into<String>, error: Error) -> Self {
        Self::new(src_filter, EventType::Error).with_param(EventParam::Error(error))
    }

    /// Attach a payload.
    pub fn with_param(mut self, param: EventParam) -> Self {
        self.param = param;
        self
    }

    /// Check if this is a `Ready` event.
    pub fn is_ready(&self) -> bool {
        self.event_type == EventType::Ready
    }

    /// Get the carried error code, if any.
    pub fn error_code(&self) -> Option<Error> {
        match self.param {
            EventParam::Error(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.param {
            EventParam::None => write!(f, "{:?} from {}", self.event_type, self.src_filter),
            EventParam::Error(e) => {
                write!(f, "{:?} from {}: {}", self.event_type, self.src_filter, e)
            }
            EventParam::Time(t) => write!(f, "{:?} from {} at {}", self.event_type, self.src_filter, t),
            EventParam::Int(v) => write!(f, "{:?} from {} ({})", self.event_type, self.src_filter, v),
            EventParam::Bool(v) => write!(f, "{:?} from {} ({})", self.event_type, self.src_filter, v),
            EventParam::Text(s) => write!(f, "{:?} from {}: {}", self.event_type, self.src_filter, s),
        }
    }
}

/// Receives events from filters.
///
/// Implemented by the pipeline and by session-level consumers. Closures
/// taking an [`Event`] implement it too.
pub trait EventReceiver: Send + Sync {
    /// Handle an event.
    fn on_event(&self, event: Event);
}

impl<F> EventReceiver for F
where
    F: Fn(Event) + Send + Sync,
{
    fn on_event(&self, event: Event) {
        self(event)
    }
}
