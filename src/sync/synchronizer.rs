//! Interfaces between time-reporting filters and the sync center.

use crate::clock::ClockTime;
use std::sync::Arc;

/// Rank of a synchronizer when several report clock anchors.
///
/// Higher priorities win. Reports from a synchronizer ranked below the
/// best one seen so far are ignored until the next seek or reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SyncerPriority(pub i8);

impl SyncerPriority {
    /// No synchronizer has reported yet.
    pub const NONE: Self = Self(-1);
    /// Video renderer.
    pub const VIDEO_SINK: Self = Self(0);
    /// Audio renderer.
    pub const AUDIO_SINK: Self = Self(2);
    /// Video capture or live video source.
    pub const VIDEO_SRC: Self = Self(4);
    /// Audio capture or live audio source.
    pub const AUDIO_SRC: Self = Self(6);
}

impl Default for SyncerPriority {
    fn default() -> Self {
        Self::NONE
    }
}

/// A filter that reports clock anchors and takes part in the preroll
/// barrier.
pub trait MediaSynchronizer: Send + Sync {
    /// Rank used to arbitrate anchor reports.
    fn priority(&self) -> SyncerPriority;

    /// Tell the synchronizer whether to hold its first frame until every
    /// synchronizer has prerolled.
    fn wait_all_prerolled(&self, should_wait: bool);

    /// Every synchronizer has prerolled; release the held frame.
    fn notify_all_prerolled(&self);
}

/// The clock authority synchronizers report to.
pub trait MediaSyncCenter: Send + Sync {
    /// Register a synchronizer. Registering twice has no effect.
    fn add_synchronizer(&self, syncer: &Arc<dyn MediaSynchronizer>);

    /// Unregister a synchronizer.
    fn remove_synchronizer(&self, syncer: &dyn MediaSynchronizer);

    /// Offer a new anchor: at wall-clock `clock_time` the media position
    /// was `media_time`.
    ///
    /// Returns `true` if the anchor was accepted.
    fn update_time_anchor(
        &self,
        clock_time: ClockTime,
        media_time: ClockTime,
        syncer: &dyn MediaSynchronizer,
    ) -> bool;

    /// Current media position, or `NONE` if unknown.
    fn media_time_now(&self) -> ClockTime;

    /// Current wall-clock time.
    fn clock_time_now(&self) -> ClockTime;

    /// Wall-clock time at which `media_time` is due, or `NONE`.
    fn clock_time(&self, media_time: ClockTime) -> ClockTime;

    /// Report that `syncer` has received its first frame.
    fn report_prerolled(&self, syncer: &dyn MediaSynchronizer);

    /// Record the first media time of a track.
    fn set_media_time_range_start(&self, start: ClockTime, track_id: u32);

    /// Record the last media time of a track.
    fn set_media_time_range_end(&self, end: ClockTime, track_id: u32);

    /// Seek target while a seek is in progress, otherwise `NONE`.
    fn seeking_media_time(&self) -> ClockTime;

    /// Current playback rate.
    fn playback_rate(&self) -> f64;
}

/// Identity of a synchronizer for registration bookkeeping.
#[inline]
pub(crate) fn syncer_key(syncer: &dyn MediaSynchronizer) -> usize {
    syncer as *const dyn MediaSynchronizer as *const () as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_order() {
        assert!(SyncerPriority::NONE < SyncerPriority::VIDEO_SINK);
        assert!(SyncerPriority::VIDEO_SINK < SyncerPriority::AUDIO_SINK);
        assert!(SyncerPriority::AUDIO_SINK < SyncerPriority::VIDEO_SRC);
        assert!(SyncerPriority::VIDEO_SRC < SyncerPriority::AUDIO_SRC);
        assert_eq!(SyncerPriority::default(), SyncerPriority::NONE);
    }
}
