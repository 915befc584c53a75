//! Error types for cadence.
//!
//! Errors are a flat set of result codes rather than a tree of wrapped
//! causes. This keeps them `Copy`, so a failure can be carried inside an
//! [`Event`](crate::event::Event) and compared directly in tests.

use thiserror::Error;

/// Result type alias using cadence's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Result codes returned by filters, ports, the pipeline and the sync manager.
///
/// `EndOfStream` is not a failure: it is the terminal signal of a data path
/// and callers are expected to check [`Error::is_eos`] before treating a
/// result as fatal.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Error {
    /// No more data exists at or after the requested position.
    #[error("end of stream")]
    EndOfStream,

    /// Unclassified failure.
    #[error("unknown error")]
    Unknown,

    /// The operation is not implemented by this filter.
    #[error("operation not implemented")]
    Unimplemented,

    /// Transient unavailability; poll again shortly.
    #[error("resource temporarily unavailable, try again")]
    Again,

    /// A parameter had an out-of-range or otherwise unusable value.
    #[error("invalid parameter value")]
    InvalidParameterValue,

    /// A parameter had the wrong type.
    #[error("invalid parameter type")]
    InvalidParameterType,

    /// The operation is not allowed in the current state.
    #[error("invalid operation")]
    InvalidOperation,

    /// No common or supported format.
    #[error("unsupported format")]
    UnsupportedFormat,

    /// The referenced object does not exist.
    #[error("not existed")]
    NotExisted,

    /// A bounded wait expired.
    #[error("timed out")]
    TimedOut,

    /// Allocation failed.
    #[error("out of memory")]
    NoMemory,

    /// Internal state is inconsistent.
    #[error("invalid state")]
    InvalidState,

    /// Access was refused.
    #[error("permission denied")]
    PermissionDenied,
}

impl Error {
    /// Check if this is the end-of-stream signal.
    #[inline]
    pub fn is_eos(self) -> bool {
        self == Error::EndOfStream
    }

    /// Check if the caller should retry the operation shortly.
    #[inline]
    pub fn is_transient(self) -> bool {
        self == Error::Again
    }
}
