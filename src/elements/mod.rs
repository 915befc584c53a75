//! Built-in filters.
//!
//! - [`BufferedSource`]: serves application-fed bytes, by offset in pull
//!   mode or in chunks in push mode
//! - [`PassThrough`]: forwards buffers unchanged
//! - [`NullSink`]: discards buffers and counts them

mod buffered_source;
mod null;
mod passthrough;

pub use buffered_source::BufferedSource;
pub use null::NullSink;
pub use passthrough::PassThrough;
