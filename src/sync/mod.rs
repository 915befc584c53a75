//! Audio/video clock synchronization.
//!
//! - [`MediaSyncManager`]: the per-session clock authority. It maps wall
//!   clock to media time through a single anchor and arbitrates anchor
//!   reports by [`SyncerPriority`].
//! - [`MediaSynchronizer`]: implemented by sinks and live sources that
//!   report anchors and take part in the preroll barrier.
//! - [`PrerollGate`]: the blocking half of the barrier, embedded in sinks.
//!
//! Filters reach the manager through the [`MediaSyncCenter`] trait.

mod manager;
mod preroll;
mod synchronizer;

pub use manager::{ClockStatus, MediaSyncManager, SyncConfig};
pub use preroll::{PrerollGate, PrerollOutcome};
pub use synchronizer::{MediaSyncCenter, MediaSynchronizer, SyncerPriority};
