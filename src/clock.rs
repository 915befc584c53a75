//! Clock and time types for media synchronization.
//!
//! This module provides:
//! - [`ClockTime`]: A signed nanosecond timestamp type (8 bytes, Copy)
//! - [`Clock`]: Trait for wall-clock time sources
//! - [`SystemClock`]: Monotonic system clock
//! - [`ManualClock`]: Externally driven clock for tests and offline rendering

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

// ============================================================================
// ClockTime
// ============================================================================

/// Time in nanoseconds (8 bytes, Copy).
///
/// Used both for wall-clock readings and for positions on the media
/// timeline. It is signed because media-time deltas computed against an
/// anchor can be negative.
///
/// # Special Values
///
/// - `ClockTime::ZERO`: Zero time
/// - `ClockTime::NONE`: Invalid/unset time (sentinel value)
/// - `ClockTime::MAX` / `ClockTime::MIN`: Representable bounds
///
/// # Examples
///
/// ```rust
/// use cadence::clock::ClockTime;
///
/// let t1 = ClockTime::from_secs(1);
/// let t2 = ClockTime::from_millis(500);
/// let t3 = t1 + t2;
///
/// assert_eq!(t3.millis(), 1500);
/// assert_eq!(format!("{}", t3), "1.500s");
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ClockTime(i64);

impl ClockTime {
    /// Zero time.
    pub const ZERO: Self = Self(0);

    /// Maximum representable time.
    pub const MAX: Self = Self(i64::MAX);

    /// Minimum representable time (one more than the NONE sentinel).
    pub const MIN: Self = Self(i64::MIN + 1);

    /// Invalid/unset time (sentinel value).
    pub const NONE: Self = Self(i64::MIN);

    /// Create from nanoseconds.
    #[inline]
    pub const fn from_nanos(ns: i64) -> Self {
        Self(ns)
    }

    /// Create from microseconds.
    #[inline]
    pub const fn from_micros(us: i64) -> Self {
        Self::clamped(us.saturating_mul(1_000))
    }

    /// Create from milliseconds.
    #[inline]
    pub const fn from_millis(ms: i64) -> Self {
        Self::clamped(ms.saturating_mul(1_000_000))
    }

    /// Create from seconds.
    #[inline]
    pub const fn from_secs(s: i64) -> Self {
        Self::clamped(s.saturating_mul(1_000_000_000))
    }

    /// Get as nanoseconds.
    #[inline]
    pub const fn nanos(self) -> i64 {
        self.0
    }

    /// Get as microseconds (truncated).
    #[inline]
    pub const fn micros(self) -> i64 {
        self.0 / 1_000
    }

    /// Get as milliseconds (truncated).
    #[inline]
    pub const fn millis(self) -> i64 {
        self.0 / 1_000_000
    }

    /// Get as seconds (truncated).
    #[inline]
    pub const fn secs(self) -> i64 {
        self.0 / 1_000_000_000
    }

    /// Check if this is the NONE sentinel value.
    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == i64::MIN
    }

    /// Check if this is a valid time (not NONE).
    #[inline]
    pub const fn is_some(self) -> bool {
        self.0 != i64::MIN
    }

    /// Convert to Option, returning None for the NONE sentinel.
    #[inline]
    pub const fn to_option(self) -> Option<Self> {
        if self.is_none() { None } else { Some(self) }
    }

    /// Saturating addition. Returns NONE if either operand is NONE.
    #[inline]
    pub const fn saturating_add(self, rhs: Self) -> Self {
        if self.is_none() || rhs.is_none() {
            return Self::NONE;
        }
        Self::clamped(self.0.saturating_add(rhs.0))
    }

    /// Saturating subtraction. Returns NONE if either operand is NONE.
    #[inline]
    pub const fn saturating_sub(self, rhs: Self) -> Self {
        if self.is_none() || rhs.is_none() {
            return Self::NONE;
        }
        Self::clamped(self.0.saturating_sub(rhs.0))
    }

    /// Scale by a floating-point factor. Returns NONE for NONE or a
    /// non-finite factor.
    pub fn mul_f64(self, factor: f64) -> Self {
        if self.is_none() || !factor.is_finite() {
            return Self::NONE;
        }
        let scaled = (self.0 as f64 * factor).round();
        if scaled >= i64::MAX as f64 {
            Self::MAX
        } else if scaled <= Self::MIN.0 as f64 {
            Self::MIN
        } else {
            Self(scaled as i64)
        }
    }

    /// Divide by a floating-point divisor.
    ///
    /// Returns `None` for NONE or a divisor too close to zero.
    pub fn checked_div_f64(self, divisor: f64) -> Option<Self> {
        if self.is_none() || !divisor.is_finite() || divisor.abs() < f64::EPSILON {
            return None;
        }
        Some(self.mul_f64(1.0 / divisor))
    }

    /// Keep arithmetic results from landing on the NONE sentinel.
    #[inline]
    const fn clamped(ns: i64) -> Self {
        if ns == i64::MIN { Self::MIN } else { Self(ns) }
    }
}

impl std::ops::Add for ClockTime {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        self.saturating_add(rhs)
    }
}

impl std::ops::AddAssign for ClockTime {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        *self = self.saturating_add(rhs);
    }
}

impl std::ops::Sub for ClockTime {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        self.saturating_sub(rhs)
    }
}

impl std::ops::SubAssign for ClockTime {
    #[inline]
    fn sub_assign(&mut self, rhs: Self) {
        *self = self.saturating_sub(rhs);
    }
}

impl From<Duration> for ClockTime {
    #[inline]
    fn from(d: Duration) -> Self {
        Self(i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
    }
}

impl From<ClockTime> for Duration {
    #[inline]
    fn from(t: ClockTime) -> Self {
        if t.is_none() || t.0 < 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(t.0 as u64)
        }
    }
}

impl std::fmt::Display for ClockTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_none() {
            return write!(f, "NONE");
        }
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let secs = abs / 1_000_000_000;
        let ms = (abs / 1_000_000) % 1000;
        write!(f, "{}{}.{:03}s", sign, secs, ms)
    }
}

// ============================================================================
// Clock Trait
// ============================================================================

/// A clock that provides the current wall-clock time.
///
/// Implementations should provide monotonic time (never goes backwards).
/// The sync manager reads it to anchor and extrapolate media time.
pub trait Clock: Send + Sync {
    /// Get the current time.
    fn now(&self) -> ClockTime;

    /// Get a human-readable name for the clock.
    fn name(&self) -> &str {
        "unknown"
    }
}

// ============================================================================
// SystemClock
// ============================================================================

/// System monotonic clock.
///
/// Uses `std::time::Instant` for monotonic time measurement.
/// Time is relative to when the clock was created.
pub struct SystemClock {
    epoch: Instant,
    name: String,
}

impl SystemClock {
    /// Create a new system clock with the current instant as epoch.
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            name: "system-monotonic".to_string(),
        }
    }

    /// Create a system clock with a custom name.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            epoch: Instant::now(),
            name: name.into(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> ClockTime {
        ClockTime::from(self.epoch.elapsed())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ============================================================================
// ManualClock
// ============================================================================

/// A clock that only moves when told to.
///
/// Useful for deterministic tests and for offline (faster than real-time)
/// rendering where the caller drives time explicitly.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Create a manual clock starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a manual clock starting at `start`.
    pub fn starting_at(start: ClockTime) -> Self {
        Self {
            now: AtomicI64::new(start.nanos()),
        }
    }

    /// Set the current time.
    pub fn set(&self, time: ClockTime) {
        self.now.store(time.nanos(), Ordering::Release);
    }

    /// Advance the current time by `delta`.
    pub fn advance(&self, delta: ClockTime) {
        self.now.fetch_add(delta.nanos(), Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> ClockTime {
        ClockTime::from_nanos(self.now.load(Ordering::Acquire))
    }

    fn name(&self) -> &str {
        "manual"
    }
}
