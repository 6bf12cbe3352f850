//! Time sources for the accounting engine.
//!
//! The engine never reads wall-clock time on its own: every elapsed-time
//! computation goes through a [`Clock`] injected at construction. That keeps
//! the battery time base deterministic under test and leaves the choice of
//! kernel clock to the host.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Source of the two monotonic time bases the engine accounts in.
///
/// Both values are microseconds and must be non-decreasing for the life of
/// the process. `uptime` excludes time the device spent asleep; `realtime`
/// includes it.
pub trait Clock: Send {
    /// Microseconds of awake time since an arbitrary fixed origin.
    fn uptime_us(&self) -> u64;

    /// Microseconds of elapsed time (including sleep) since the same origin.
    fn realtime_us(&self) -> u64;
}

/// Process-lifetime clock backed by [`Instant`].
///
/// On hosts where the process never observes a suspend, the two bases
/// coincide; the engine still tracks them separately so the accounting is
/// correct wherever a suspend-aware clock is supplied instead.
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn uptime_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }

    fn realtime_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }
}

/// Hand-advanced clock for tests.
///
/// Cloning yields a handle onto the same underlying time, so a test can keep
/// one handle and give the other to the engine.
#[derive(Clone, Default)]
pub struct ManualClock {
    inner: Arc<ManualClockState>,
}

#[derive(Default)]
struct ManualClockState {
    uptime: AtomicU64,
    realtime: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance both bases: the device is awake, so uptime and realtime move
    /// together.
    pub fn advance_us(&self, us: u64) {
        self.inner.uptime.fetch_add(us, Ordering::SeqCst);
        self.inner.realtime.fetch_add(us, Ordering::SeqCst);
    }

    /// Advance realtime only, modelling a device suspend.
    pub fn sleep_us(&self, us: u64) {
        self.inner.realtime.fetch_add(us, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn uptime_us(&self) -> u64 {
        self.inner.uptime.load(Ordering::SeqCst)
    }

    fn realtime_us(&self) -> u64 {
        self.inner.realtime.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_tracks_sleep_separately() {
        let clock = ManualClock::new();
        clock.advance_us(1_000);
        clock.sleep_us(500);
        assert_eq!(clock.uptime_us(), 1_000);
        assert_eq!(clock.realtime_us(), 1_500);
    }

    #[test]
    fn system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.realtime_us();
        let b = clock.realtime_us();
        assert!(b >= a);
    }
}
