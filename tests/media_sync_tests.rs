//! Integration tests for the media sync manager and the preroll barrier.

use cadence::clock::{Clock, ClockTime, ManualClock};
use cadence::error::Error;
use cadence::sync::{
    ClockStatus, MediaSyncCenter, MediaSyncManager, MediaSynchronizer, PrerollGate,
    PrerollOutcome, SyncConfig, SyncerPriority,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// A renderer that holds its first frame behind a preroll gate.
struct GatedSink {
    priority: SyncerPriority,
    gate: PrerollGate,
    waits: AtomicUsize,
    releases: AtomicUsize,
}

impl GatedSink {
    fn new(priority: SyncerPriority, timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            priority,
            gate: PrerollGate::new(timeout),
            waits: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
        })
    }

    fn audio() -> Arc<Self> {
        Self::new(SyncerPriority::AUDIO_SINK, Duration::from_secs(5))
    }

    fn video() -> Arc<Self> {
        Self::new(SyncerPriority::VIDEO_SINK, Duration::from_secs(5))
    }

    fn waits(&self) -> usize {
        self.waits.load(Ordering::SeqCst)
    }

    fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

impl MediaSynchronizer for GatedSink {
    fn priority(&self) -> SyncerPriority {
        self.priority
    }

    fn wait_all_prerolled(&self, should_wait: bool) {
        if should_wait {
            self.waits.fetch_add(1, Ordering::SeqCst);
        }
        self.gate.set_wait(should_wait);
    }

    fn notify_all_prerolled(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
        self.gate.release();
    }
}

fn setup() -> (Arc<ManualClock>, Arc<MediaSyncManager>) {
    let clock = Arc::new(ManualClock::starting_at(ClockTime::from_secs(1000)));
    let manager = Arc::new(MediaSyncManager::with_clock(clock.clone()));
    (clock, manager)
}

fn register(manager: &MediaSyncManager, sink: &Arc<GatedSink>) {
    let syncer: Arc<dyn MediaSynchronizer> = sink.clone();
    manager.add_synchronizer(&syncer);
}

// ============================================================================
// Anchors
// ============================================================================

#[test]
fn test_higher_priority_owns_the_anchor() {
    let (clock, manager) = setup();
    let audio = GatedSink::audio();
    let video = GatedSink::video();
    register(&manager, &audio);
    register(&manager, &video);
    manager.set_media_time_range_start_end(ClockTime::ZERO, ClockTime::from_secs(60), 1);
    manager.resume();

    assert!(manager.update_time_anchor(clock.now(), ClockTime::from_secs(1), &*video));
    assert!(manager.update_time_anchor(clock.now(), ClockTime::from_secs(2), &*audio));
    assert!(!manager.update_time_anchor(clock.now(), ClockTime::from_secs(9), &*video));
    assert_eq!(manager.media_time_now(), ClockTime::from_secs(2));

    // A seek clears the arbitration.
    manager.seek(ClockTime::from_secs(10)).unwrap();
    assert!(manager.update_time_anchor(clock.now(), ClockTime::from_secs(10), &*video));
    assert!(!manager.is_seeking());
}

#[test]
fn test_invalid_anchor_rejected() {
    let (clock, manager) = setup();
    let audio = GatedSink::audio();
    register(&manager, &audio);
    manager.resume();

    assert!(!manager.update_time_anchor(ClockTime::NONE, ClockTime::ZERO, &*audio));
    assert!(!manager.update_time_anchor(clock.now(), ClockTime::NONE, &*audio));
    assert!(manager.media_time_now().is_none());
}

#[test]
fn test_media_time_follows_wall_clock() {
    let (clock, manager) = setup();
    let audio = GatedSink::audio();
    register(&manager, &audio);
    manager.resume();

    manager.update_time_anchor(clock.now(), ClockTime::from_secs(4), &*audio);
    clock.advance(ClockTime::from_millis(250));
    assert_eq!(manager.media_time_now(), ClockTime::from_millis(4250));
    assert_eq!(manager.clock_time_now(), clock.now());
    assert_eq!(
        manager.clock_time(ClockTime::from_secs(5)),
        clock.now() + ClockTime::from_millis(750)
    );
}

#[test]
fn test_media_range_spans_tracks() {
    let (_, manager) = setup();
    manager.set_media_time_range_start_end(ClockTime::ZERO, ClockTime::from_secs(10), 1);
    manager.set_media_time_range_start_end(
        ClockTime::from_millis(500),
        ClockTime::from_secs(12),
        2,
    );

    assert_eq!(
        manager.media_time_range(),
        Some((ClockTime::ZERO, ClockTime::from_secs(12)))
    );
    assert_eq!(
        manager.track_media_time_range(2),
        Some((ClockTime::from_millis(500), ClockTime::from_secs(12)))
    );
    assert_eq!(manager.clip_media_time(ClockTime::from_secs(20)), ClockTime::from_secs(12));
    assert_eq!(manager.clip_media_time(ClockTime::from_secs(-1)), ClockTime::ZERO);
}

// ============================================================================
// Seek, pause and rate
// ============================================================================

#[test]
fn test_seek_pins_media_time_until_anchor_reaches_target() {
    let (clock, manager) = setup();
    let audio = GatedSink::audio();
    register(&manager, &audio);
    manager.set_media_time_range_start_end(ClockTime::ZERO, ClockTime::from_secs(10), 1);
    manager.resume();

    manager.seek(ClockTime::from_secs(5)).unwrap();
    assert!(manager.is_seeking());
    assert_eq!(manager.seeking_media_time(), ClockTime::from_secs(5));
    assert_eq!(manager.media_time_now(), ClockTime::from_secs(5));

    // An anchor short of the target does not end the seek.
    manager.update_time_anchor(clock.now(), ClockTime::from_millis(4800), &*audio);
    clock.advance(ClockTime::from_secs(1));
    assert_eq!(manager.media_time_now(), ClockTime::from_secs(5));

    manager.update_time_anchor(clock.now(), ClockTime::from_secs(5), &*audio);
    assert!(!manager.is_seeking());
    assert!(manager.seeking_media_time().is_none());
    clock.advance(ClockTime::from_secs(1));
    assert_eq!(manager.media_time_now(), ClockTime::from_secs(6));
}

#[test]
fn test_seek_rejects_bad_targets() {
    let (_, manager) = setup();
    assert_eq!(manager.seek(ClockTime::from_secs(1)), Err(Error::InvalidOperation));

    manager.set_media_time_range_start_end(ClockTime::ZERO, ClockTime::from_secs(10), 1);
    assert_eq!(
        manager.seek(ClockTime::from_secs(11)),
        Err(Error::InvalidParameterValue)
    );
    assert_eq!(manager.seek(ClockTime::NONE), Err(Error::InvalidParameterValue));
    assert!(!manager.is_seeking());
    assert!(manager.seek(ClockTime::from_secs(10)).is_ok());
}

#[test]
fn test_pause_freezes_media_time() {
    let (clock, manager) = setup();
    let audio = GatedSink::audio();
    register(&manager, &audio);
    manager.resume();
    assert_eq!(manager.clock_status(), ClockStatus::Resumed);

    manager.update_time_anchor(clock.now(), ClockTime::ZERO, &*audio);
    clock.advance(ClockTime::from_secs(2));
    manager.pause();
    assert_eq!(manager.clock_status(), ClockStatus::Paused);

    clock.advance(ClockTime::from_secs(5));
    assert_eq!(manager.media_time_now(), ClockTime::from_secs(2));

    manager.resume();
    clock.advance(ClockTime::from_secs(1));
    assert_eq!(manager.media_time_now(), ClockTime::from_secs(3));
}

#[test]
fn test_rate_change_keeps_media_time_continuous() {
    let (clock, manager) = setup();
    let audio = GatedSink::audio();
    register(&manager, &audio);
    manager.resume();
    manager.update_time_anchor(clock.now(), ClockTime::ZERO, &*audio);

    manager.set_playback_rate(2.0).unwrap();
    clock.advance(ClockTime::from_secs(1));
    assert_eq!(manager.media_time_now(), ClockTime::from_secs(2));

    manager.set_playback_rate(0.5).unwrap();
    clock.advance(ClockTime::from_secs(2));
    assert_eq!(manager.media_time_now(), ClockTime::from_secs(3));
    assert_eq!(manager.playback_rate(), 0.5);
}

// ============================================================================
// Preroll barrier
// ============================================================================

#[test]
fn test_barrier_releases_on_last_distinct_report() {
    let (_, manager) = setup();
    let sinks = [GatedSink::audio(), GatedSink::video(), GatedSink::video()];
    for sink in &sinks {
        register(&manager, sink);
    }
    manager.resume();
    assert!(sinks.iter().all(|s| s.waits() == 1));

    manager.report_prerolled(&*sinks[0]);
    manager.report_prerolled(&*sinks[0]);
    manager.report_prerolled(&*sinks[1]);
    assert!(sinks.iter().all(|s| s.releases() == 0));

    manager.report_prerolled(&*sinks[2]);
    assert!(sinks.iter().all(|s| s.releases() == 1));

    // A late repeat report does not release again.
    manager.report_prerolled(&*sinks[0]);
    assert_eq!(sinks[0].releases(), 1);
}

#[test]
fn test_barrier_rearms_after_seek() {
    let (_, manager) = setup();
    let audio = GatedSink::audio();
    let video = GatedSink::video();
    register(&manager, &audio);
    register(&manager, &video);
    manager.set_media_time_range_start_end(ClockTime::ZERO, ClockTime::from_secs(10), 1);
    manager.resume();
    manager.report_prerolled(&*audio);
    manager.report_prerolled(&*video);
    assert_eq!(audio.releases(), 1);

    manager.seek(ClockTime::from_secs(3)).unwrap();
    assert_eq!(audio.waits(), 2);
    manager.report_prerolled(&*video);
    manager.report_prerolled(&*audio);
    assert_eq!(audio.releases(), 2);
    assert_eq!(video.releases(), 2);
}

#[test]
fn test_preroll_reported_while_paused_counts_after_resume() {
    let (_, manager) = setup();
    let audio = GatedSink::audio();
    let video = GatedSink::video();
    register(&manager, &audio);
    register(&manager, &video);
    manager.resume();
    manager.pause();

    // The audio sink got its first frame while the clock was paused.
    manager.report_prerolled(&*audio);
    manager.resume();
    assert_eq!(audio.waits(), 2);
    assert_eq!(audio.releases(), 0);

    manager.report_prerolled(&*video);
    assert_eq!(audio.releases(), 1);
    assert_eq!(video.releases(), 1);
}

#[test]
fn test_barrier_disabled() {
    let clock = Arc::new(ManualClock::new());
    let config = SyncConfig::default().with_wait_for_preroll(false);
    let manager = MediaSyncManager::with_config(clock, config);
    let audio = GatedSink::audio();
    let video = GatedSink::video();
    register(&manager, &audio);
    register(&manager, &video);
    manager.resume();

    assert_eq!(audio.waits(), 0);
    manager.report_prerolled(&*audio);
    manager.report_prerolled(&*video);
    assert_eq!(audio.releases(), 0);
}

#[test]
fn test_gates_release_across_threads() {
    let (_, manager) = setup();
    let audio = GatedSink::audio();
    let video = GatedSink::video();
    register(&manager, &audio);
    register(&manager, &video);
    manager.resume();
    assert!(audio.gate.should_wait());

    let outcomes = std::thread::scope(|scope| {
        let audio_thread = scope.spawn(|| audio.gate.wait_for_release(&*manager, &*audio));
        std::thread::sleep(Duration::from_millis(20));
        let video_outcome = video.gate.wait_for_release(&*manager, &*video);
        (audio_thread.join().unwrap(), video_outcome)
    });

    assert_eq!(outcomes, (PrerollOutcome::Released, PrerollOutcome::Released));
    assert!(!audio.gate.should_wait());
}

#[test]
fn test_gate_times_out_without_peer() {
    let (_, manager) = setup();
    let audio = GatedSink::new(SyncerPriority::AUDIO_SINK, Duration::from_millis(30));
    let video = GatedSink::video();
    register(&manager, &audio);
    register(&manager, &video);
    manager.resume();

    let outcome = audio.gate.wait_for_release(&*manager, &*audio);
    assert_eq!(outcome, PrerollOutcome::TimedOut);

    // The report was made once; a second wait does not repeat it.
    assert_eq!(
        audio.gate.wait_for_release(&*manager, &*audio),
        PrerollOutcome::NotRequired
    );
    manager.report_prerolled(&*video);
    assert_eq!(video.releases(), 1);
}

#[test]
fn test_dropped_synchronizer_is_pruned() {
    let (_, manager) = setup();
    let audio = GatedSink::audio();
    register(&manager, &audio);
    {
        let video = GatedSink::video();
        register(&manager, &video);
        assert_eq!(manager.synchronizer_count(), 2);
    }
    assert_eq!(manager.synchronizer_count(), 1);
}
