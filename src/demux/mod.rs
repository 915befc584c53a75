//! Building blocks for demuxing filters.
//!
//! - [`DataPacker`]: reassembles chunked input into byte ranges a parser can
//!   request by offset, in seekable or live mode.

mod data_packer;

pub use data_packer::{DataPacker, DataPackerConfig, RangeStatus};
