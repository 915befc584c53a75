//! The media sync manager: one clock authority per playback session.
//!
//! The manager keeps a single anchor `(clock_time, media_time)` and
//! extrapolates the media position from it at the current playback rate:
//!
//! ```text
//! media_now = anchor_media + (clock_now - anchor_clock) * rate
//! ```
//!
//! clipped into the known media range of all tracks. Anchors are offered by
//! registered synchronizers and accepted only from the highest priority
//! seen so far.
//!
//! Clock state and the synchronizer set sit behind two separate locks that
//! are never held together; synchronizer callbacks run with neither held.

use crate::clock::{Clock, ClockTime, SystemClock};
use crate::error::{Error, Result};
use crate::observability::{record_anchor_update, record_preroll_release};
use crate::sync::synchronizer::{MediaSyncCenter, MediaSynchronizer, SyncerPriority, syncer_key};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Configuration for [`MediaSyncManager`] and the sink-side preroll wait.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// How long a synchronizer holds its first frame waiting for the others.
    pub preroll_timeout: Duration,
    /// Whether the preroll barrier is armed by default.
    pub wait_for_preroll: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            preroll_timeout: Duration::from_secs(1),
            wait_for_preroll: true,
        }
    }
}

impl SyncConfig {
    /// Set the preroll timeout.
    pub fn with_preroll_timeout(mut self, timeout: Duration) -> Self {
        self.preroll_timeout = timeout;
        self
    }

    /// Set whether the preroll barrier is armed by default.
    pub fn with_wait_for_preroll(mut self, wait: bool) -> Self {
        self.wait_for_preroll = wait;
        self
    }
}

/// Whether the media clock is advancing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockStatus {
    /// Media time advances with the wall clock.
    Resumed,
    /// Media time is frozen.
    Paused,
}

struct ClockState {
    status: ClockStatus,
    anchor_clock: ClockTime,
    anchor_media: ClockTime,
    rate: f64,
    priority: SyncerPriority,
    paused_clock: ClockTime,
    paused_media: ClockTime,
    seeking: bool,
    seeking_media: ClockTime,
    track_ranges: HashMap<u32, (ClockTime, ClockTime)>,
    min_start: ClockTime,
    max_end: ClockTime,
    wait_for_preroll: bool,
    barrier_armed: bool,
}

impl ClockState {
    fn new(wait_for_preroll: bool) -> Self {
        Self {
            status: ClockStatus::Paused,
            anchor_clock: ClockTime::NONE,
            anchor_media: ClockTime::NONE,
            rate: 1.0,
            priority: SyncerPriority::NONE,
            paused_clock: ClockTime::NONE,
            paused_media: ClockTime::NONE,
            seeking: false,
            seeking_media: ClockTime::NONE,
            track_ranges: HashMap::new(),
            min_start: ClockTime::NONE,
            max_end: ClockTime::NONE,
            wait_for_preroll,
            barrier_armed: false,
        }
    }

    fn reset_anchor(&mut self) {
        self.anchor_clock = ClockTime::NONE;
        self.anchor_media = ClockTime::NONE;
        self.priority = SyncerPriority::NONE;
    }

    fn media_at(&self, clock_now: ClockTime) -> ClockTime {
        if self.anchor_clock.is_none() || self.anchor_media.is_none() {
            return ClockTime::NONE;
        }
        let elapsed = clock_now.saturating_sub(self.anchor_clock).mul_f64(self.rate);
        self.anchor_media.saturating_add(elapsed)
    }

    fn clock_at(&self, media_time: ClockTime) -> ClockTime {
        if self.anchor_clock.is_none() || self.anchor_media.is_none() {
            return ClockTime::NONE;
        }
        media_time
            .saturating_sub(self.anchor_media)
            .checked_div_f64(self.rate)
            .map_or(ClockTime::NONE, |delta| self.anchor_clock.saturating_add(delta))
    }

    fn clip(&self, time: ClockTime) -> ClockTime {
        if time.is_none() {
            return time;
        }
        if self.min_start.is_some() && time < self.min_start {
            return self.min_start;
        }
        if self.max_end.is_some() && time > self.max_end {
            return self.max_end;
        }
        time
    }

    /// Arm the barrier if it is wanted and not armed yet.
    ///
    /// Returns `true` if the caller must tell the synchronizers to wait.
    fn arm_barrier(&mut self) -> bool {
        if self.wait_for_preroll && !self.barrier_armed {
            self.barrier_armed = true;
            return true;
        }
        false
    }
}

#[derive(Default)]
struct Syncers {
    registered: Vec<(usize, Weak<dyn MediaSynchronizer>)>,
    prerolled: Vec<usize>,
}

impl Syncers {
    fn prune(&mut self) {
        self.registered.retain(|(_, syncer)| syncer.strong_count() > 0);
        let registered = &self.registered;
        self.prerolled
            .retain(|key| registered.iter().any(|(k, _)| k == key));
    }

    fn live(&self) -> Vec<Arc<dyn MediaSynchronizer>> {
        self.registered
            .iter()
            .filter_map(|(_, syncer)| syncer.upgrade())
            .collect()
    }

    fn contains(&self, key: usize) -> bool {
        self.registered.iter().any(|(k, _)| *k == key)
    }

    /// If every registered synchronizer has prerolled, clear the set and
    /// return the synchronizers to release.
    fn take_release_batch(&mut self) -> Option<Vec<Arc<dyn MediaSynchronizer>>> {
        self.prune();
        if self.prerolled.is_empty() || self.prerolled.len() < self.registered.len() {
            return None;
        }
        self.prerolled.clear();
        Some(self.live())
    }
}

/// Clock authority for one playback session.
///
/// # Example
///
/// ```rust
/// use cadence::clock::{ClockTime, ManualClock};
/// use cadence::sync::{MediaSyncCenter, MediaSyncManager};
/// use std::sync::Arc;
///
/// let clock = Arc::new(ManualClock::new());
/// let manager = MediaSyncManager::with_clock(clock.clone());
/// manager.set_media_time_range_start_end(ClockTime::ZERO, ClockTime::from_secs(10), 1);
/// manager.resume();
///
/// manager.seek(ClockTime::from_secs(5)).unwrap();
/// assert_eq!(manager.media_time_now(), ClockTime::from_secs(5));
/// ```
pub struct MediaSyncManager {
    clock: Arc<dyn Clock>,
    config: SyncConfig,
    state: Mutex<ClockState>,
    syncers: Mutex<Syncers>,
}

impl MediaSyncManager {
    /// Create a manager driven by the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock::with_name("media-sync")))
    }

    /// Create a manager driven by `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self::with_config(clock, SyncConfig::default())
    }

    /// Create a manager driven by `clock` with explicit configuration.
    pub fn with_config(clock: Arc<dyn Clock>, config: SyncConfig) -> Self {
        Self {
            clock,
            state: Mutex::new(ClockState::new(config.wait_for_preroll)),
            syncers: Mutex::new(Syncers::default()),
            config,
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Whether media time is currently advancing.
    pub fn clock_status(&self) -> ClockStatus {
        self.state.lock().status
    }

    /// Enable or disable the preroll barrier for the next resume or seek.
    pub fn wait_all_prerolled(&self, should_wait: bool) {
        self.state.lock().wait_for_preroll = should_wait;
    }

    /// Start advancing media time.
    ///
    /// After a pause the clock re-anchors at the frozen media position, so
    /// no media time passes during the pause. The preroll barrier is armed
    /// again if it was disarmed by a pause or seek; prerolls reported while
    /// paused still count toward it.
    pub fn resume(&self) {
        let arm = {
            let mut state = self.state.lock();
            if state.status == ClockStatus::Resumed {
                return;
            }
            let arm = state.arm_barrier();
            if state.paused_clock.is_some() && state.paused_media.is_some() {
                state.anchor_clock = self.clock.now();
                state.anchor_media = state.paused_media;
            }
            state.paused_clock = ClockTime::NONE;
            state.paused_media = ClockTime::NONE;
            state.status = ClockStatus::Resumed;
            arm
        };
        tracing::debug!("media clock resumed");
        if arm {
            self.tell_syncers_to_wait(false);
        }
    }

    /// Freeze media time at the current position.
    pub fn pause(&self) {
        let mut state = self.state.lock();
        if state.status == ClockStatus::Paused {
            return;
        }
        let now = self.clock.now();
        state.paused_clock = now;
        state.paused_media = state.clip(state.media_at(now));
        state.status = ClockStatus::Paused;
        state.barrier_armed = false;
        tracing::debug!("media clock paused at {}", state.paused_media);
    }

    /// Move to `media_time`.
    ///
    /// Until a synchronizer reports an anchor at or past the target,
    /// [`media_time_now`](Self::media_time_now) returns the target. Every
    /// synchronizer must preroll again.
    pub fn seek(&self, media_time: ClockTime) -> Result<()> {
        let arm = {
            let mut state = self.state.lock();
            if state.min_start.is_none() || state.max_end.is_none() {
                tracing::warn!("seek to {} with unknown media range", media_time);
                return Err(Error::InvalidOperation);
            }
            if media_time.is_none() || media_time < state.min_start || media_time > state.max_end {
                tracing::warn!(
                    "seek to {} outside media range [{}, {}]",
                    media_time,
                    state.min_start,
                    state.max_end
                );
                return Err(Error::InvalidParameterValue);
            }
            state.seeking = true;
            state.seeking_media = media_time;
            state.paused_clock = ClockTime::NONE;
            state.paused_media = ClockTime::NONE;
            state.reset_anchor();
            state.barrier_armed = false;
            state.arm_barrier()
        };
        tracing::debug!("seeking to {}", media_time);
        if arm {
            self.tell_syncers_to_wait(true);
        }
        Ok(())
    }

    /// Return to the initial state and forget all synchronizers.
    pub fn reset(&self) {
        *self.state.lock() = ClockState::new(self.config.wait_for_preroll);
        let mut syncers = self.syncers.lock();
        syncers.registered.clear();
        syncers.prerolled.clear();
    }

    /// Change the playback rate.
    ///
    /// The clock re-anchors at the current position so the media time stays
    /// continuous. A rate of zero freezes media time.
    pub fn set_playback_rate(&self, rate: f64) -> Result<()> {
        if !rate.is_finite() || rate < 0.0 {
            return Err(Error::InvalidParameterValue);
        }
        let mut state = self.state.lock();
        if state.status == ClockStatus::Resumed && state.anchor_clock.is_some() {
            let now = self.clock.now();
            state.anchor_media = state.media_at(now);
            state.anchor_clock = now;
        }
        state.rate = rate;
        Ok(())
    }

    /// Check if a seek is waiting for its first anchor.
    pub fn is_seeking(&self) -> bool {
        self.state.lock().seeking
    }

    /// Clip `time` into the known media range.
    pub fn clip_media_time(&self, time: ClockTime) -> ClockTime {
        self.state.lock().clip(time)
    }

    /// Record both ends of a track's media range.
    pub fn set_media_time_range_start_end(&self, start: ClockTime, end: ClockTime, track_id: u32) {
        self.set_media_time_range_start(start, track_id);
        self.set_media_time_range_end(end, track_id);
    }

    /// Known media range across all tracks, if both ends are known.
    pub fn media_time_range(&self) -> Option<(ClockTime, ClockTime)> {
        let state = self.state.lock();
        match (state.min_start.to_option(), state.max_end.to_option()) {
            (Some(start), Some(end)) => Some((start, end)),
            _ => None,
        }
    }

    /// Media range recorded for one track.
    pub fn track_media_time_range(&self, track_id: u32) -> Option<(ClockTime, ClockTime)> {
        self.state.lock().track_ranges.get(&track_id).copied()
    }

    /// Number of live registered synchronizers.
    pub fn synchronizer_count(&self) -> usize {
        let mut syncers = self.syncers.lock();
        syncers.prune();
        syncers.registered.len()
    }

    /// Gate every synchronizer behind the barrier. `discard_reports`
    /// forgets prerolls reported before this point.
    fn tell_syncers_to_wait(&self, discard_reports: bool) {
        let live = {
            let mut syncers = self.syncers.lock();
            syncers.prune();
            if discard_reports {
                syncers.prerolled.clear();
            }
            syncers.live()
        };
        if live.len() > 1 {
            for syncer in &live {
                syncer.wait_all_prerolled(true);
            }
        }
    }

    fn release(&self, batch: Vec<Arc<dyn MediaSynchronizer>>) {
        tracing::debug!("all {} synchronizers prerolled", batch.len());
        record_preroll_release(batch.len());
        for syncer in &batch {
            syncer.notify_all_prerolled();
        }
    }
}

impl Default for MediaSyncManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaSyncCenter for MediaSyncManager {
    fn add_synchronizer(&self, syncer: &Arc<dyn MediaSynchronizer>) {
        let key = syncer_key(syncer.as_ref());
        let mut syncers = self.syncers.lock();
        if !syncers.contains(key) {
            syncers.registered.push((key, Arc::downgrade(syncer)));
        }
    }

    fn remove_synchronizer(&self, syncer: &dyn MediaSynchronizer) {
        let key = syncer_key(syncer);
        let waiting = self.state.lock().wait_for_preroll;
        let batch = {
            let mut syncers = self.syncers.lock();
            syncers.registered.retain(|(k, _)| *k != key);
            syncers.prerolled.retain(|k| *k != key);
            if waiting { syncers.take_release_batch() } else { None }
        };
        if let Some(batch) = batch {
            self.release(batch);
        }
    }

    fn update_time_anchor(
        &self,
        clock_time: ClockTime,
        media_time: ClockTime,
        syncer: &dyn MediaSynchronizer,
    ) -> bool {
        if clock_time.is_none() || media_time.is_none() {
            return false;
        }
        if !self.syncers.lock().contains(syncer_key(syncer)) {
            tracing::trace!("anchor from unregistered synchronizer ignored");
            record_anchor_update(false);
            return false;
        }

        let priority = syncer.priority();
        let mut state = self.state.lock();
        if priority < state.priority {
            tracing::trace!("anchor from {:?} below {:?} ignored", priority, state.priority);
            record_anchor_update(false);
            return false;
        }
        state.priority = priority;
        state.anchor_clock = clock_time;
        state.anchor_media = media_time;
        if state.seeking && media_time >= state.seeking_media {
            state.seeking = false;
            state.seeking_media = ClockTime::NONE;
            tracing::debug!("seek settled at {}", media_time);
        }
        record_anchor_update(true);
        true
    }

    fn media_time_now(&self) -> ClockTime {
        let state = self.state.lock();
        if state.seeking {
            return state.seeking_media;
        }
        let media = match state.status {
            ClockStatus::Paused if state.paused_media.is_some() => state.paused_media,
            ClockStatus::Paused => state.anchor_media,
            ClockStatus::Resumed => state.media_at(self.clock.now()),
        };
        state.clip(media)
    }

    fn clock_time_now(&self) -> ClockTime {
        self.clock.now()
    }

    fn clock_time(&self, media_time: ClockTime) -> ClockTime {
        let state = self.state.lock();
        if (state.min_start.is_some() && media_time < state.min_start)
            || (state.max_end.is_some() && media_time > state.max_end)
        {
            tracing::trace!("clock time requested for {} outside media range", media_time);
        }
        state.clock_at(media_time)
    }

    fn report_prerolled(&self, syncer: &dyn MediaSynchronizer) {
        // Reports made while paused count toward the barrier armed on resume.
        if !self.state.lock().wait_for_preroll {
            return;
        }
        let key = syncer_key(syncer);
        let batch = {
            let mut syncers = self.syncers.lock();
            if !syncers.contains(key) || syncers.prerolled.contains(&key) {
                return;
            }
            syncers.prerolled.push(key);
            syncers.take_release_batch()
        };
        if let Some(batch) = batch {
            self.release(batch);
        }
    }

    fn set_media_time_range_start(&self, start: ClockTime, track_id: u32) {
        if start.is_none() {
            return;
        }
        let mut state = self.state.lock();
        let range = state
            .track_ranges
            .entry(track_id)
            .or_insert((ClockTime::NONE, ClockTime::NONE));
        range.0 = start;
        if state.min_start.is_none() || start < state.min_start {
            state.min_start = start;
        }
    }

    fn set_media_time_range_end(&self, end: ClockTime, track_id: u32) {
        if end.is_none() {
            return;
        }
        let mut state = self.state.lock();
        let range = state
            .track_ranges
            .entry(track_id)
            .or_insert((ClockTime::NONE, ClockTime::NONE));
        range.1 = end;
        if state.max_end.is_none() || end > state.max_end {
            state.max_end = end;
        }
    }

    fn seeking_media_time(&self) -> ClockTime {
        let state = self.state.lock();
        if state.seeking { state.seeking_media } else { ClockTime::NONE }
    }

    fn playback_rate(&self) -> f64 {
        self.state.lock().rate
    }
}
