//! Sink-side half of the preroll barrier.
//!
//! A rendering filter embeds a [`PrerollGate`], forwards
//! [`MediaSynchronizer::wait_all_prerolled`] to [`PrerollGate::set_wait`]
//! and [`MediaSynchronizer::notify_all_prerolled`] to
//! [`PrerollGate::release`], and calls [`PrerollGate::wait_for_release`]
//! before rendering its first frame.

use crate::sync::manager::SyncConfig;
use crate::sync::synchronizer::{MediaSyncCenter, MediaSynchronizer};
use parking_lot::{Condvar, Mutex};
use std::time::Duration;

/// How a preroll wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrerollOutcome {
    /// Every synchronizer prerolled and the frame was released.
    Released,
    /// The peers did not preroll in time; render anyway.
    TimedOut,
    /// No wait was requested, or the gate was reset while waiting.
    NotRequired,
}

#[derive(Debug, Default)]
struct GateState {
    should_wait: bool,
    released: bool,
    reported: bool,
}

/// Blocks a synchronizer's first frame until its peers have prerolled.
#[derive(Debug)]
pub struct PrerollGate {
    state: Mutex<GateState>,
    cond: Condvar,
    timeout: Duration,
}

impl PrerollGate {
    /// Create a gate that waits at most `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            state: Mutex::new(GateState::default()),
            cond: Condvar::new(),
            timeout,
        }
    }

    /// Create a gate using the configured preroll timeout.
    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.preroll_timeout)
    }

    /// Request or cancel a wait before the next frame.
    ///
    /// Requesting a wait also re-enables the prerolled report.
    pub fn set_wait(&self, should_wait: bool) {
        let mut state = self.state.lock();
        state.should_wait = should_wait;
        if should_wait {
            state.released = false;
            state.reported = false;
        } else {
            self.cond.notify_all();
        }
    }

    /// Release a pending or future wait.
    pub fn release(&self) {
        let mut state = self.state.lock();
        state.released = true;
        state.should_wait = false;
        self.cond.notify_all();
    }

    /// Forget any pending wait and wake waiters.
    pub fn reset(&self) {
        *self.state.lock() = GateState::default();
        self.cond.notify_all();
    }

    /// Check if a wait is pending.
    pub fn should_wait(&self) -> bool {
        self.state.lock().should_wait
    }

    /// Report prerolled to `center` once, then block until released or the
    /// timeout expires.
    ///
    /// The report is made without holding the gate's lock, since the center
    /// may release this gate from inside the call.
    pub fn wait_for_release(
        &self,
        center: &dyn MediaSyncCenter,
        syncer: &dyn MediaSynchronizer,
    ) -> PrerollOutcome {
        let (was_waiting, report) = {
            let mut state = self.state.lock();
            let report = !state.reported;
            state.reported = true;
            (state.should_wait, report)
        };
        if report {
            center.report_prerolled(syncer);
        }
        if !was_waiting {
            return PrerollOutcome::NotRequired;
        }

        let mut state = self.state.lock();
        let result = self.cond.wait_while_for(
            &mut state,
            |s| s.should_wait && !s.released,
            self.timeout,
        );
        state.should_wait = false;
        if state.released {
            PrerollOutcome::Released
        } else if result.timed_out() {
            tracing::warn!("preroll wait timed out after {:?}", self.timeout);
            PrerollOutcome::TimedOut
        } else {
            PrerollOutcome::NotRequired
        }
    }
}

impl Default for PrerollGate {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}
