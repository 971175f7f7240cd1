//! Time sources
//!
//! Filesystem timestamps are whole seconds since the UNIX epoch. Request
//! latency is measured in nanoseconds. Both come from a [`Clock`] so
//! tests can pin time down.

use core::ops::{Add, Sub};
use std::cell::Cell;
use std::time::{SystemTime, UNIX_EPOCH};

/// A point in time, in nanoseconds since the UNIX epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Instant {
    nanos: u64,
}

impl Instant {
    pub const fn from_nanos(nanos: u64) -> Self {
        Self { nanos }
    }

    pub const fn from_secs(secs: u64) -> Self {
        Self {
            nanos: secs.saturating_mul(1_000_000_000),
        }
    }

    pub fn as_nanos(&self) -> u64 {
        self.nanos
    }

    /// Whole seconds since the epoch
    pub fn as_secs(&self) -> u64 {
        self.nanos / 1_000_000_000
    }

    /// Returns the duration since another instant, zero if `earlier` is later
    pub fn duration_since(&self, earlier: Instant) -> Duration {
        Duration::from_nanos(self.nanos.saturating_sub(earlier.nanos))
    }
}

impl Add<Duration> for Instant {
    type Output = Instant;

    fn add(self, duration: Duration) -> Self::Output {
        Instant::from_nanos(self.nanos.saturating_add(duration.as_nanos()))
    }
}

impl Sub<Duration> for Instant {
    type Output = Instant;

    fn sub(self, duration: Duration) -> Self::Output {
        Instant::from_nanos(self.nanos.saturating_sub(duration.as_nanos()))
    }
}

/// A duration of time
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Duration {
    nanos: u64,
}

impl Duration {
    pub const fn from_nanos(nanos: u64) -> Self {
        Self { nanos }
    }

    pub const fn from_millis(millis: u64) -> Self {
        Self {
            nanos: millis * 1_000_000,
        }
    }

    pub const fn from_secs(secs: u64) -> Self {
        Self {
            nanos: secs * 1_000_000_000,
        }
    }

    pub const fn as_nanos(&self) -> u64 {
        self.nanos
    }

    pub const fn as_millis(&self) -> u64 {
        self.nanos / 1_000_000
    }

    pub const fn as_secs(&self) -> u64 {
        self.nanos / 1_000_000_000
    }
}

/// Source of the current time
pub trait Clock {
    fn now(&self) -> Instant;

    /// Current time in whole seconds, as stored in directory entries
    fn now_secs(&self) -> u64 {
        self.now().as_secs()
    }
}

impl<C: Clock + ?Sized> Clock for Box<C> {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

/// Wall-clock time from the host
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        // A host clock set before 1970 reads as the epoch
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos().min(u64::MAX as u128) as u64)
            .unwrap_or(0);
        Instant::from_nanos(nanos)
    }
}

/// A clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: Cell<u64>,
}

impl ManualClock {
    pub fn new(start: Instant) -> Self {
        Self {
            nanos: Cell::new(start.as_nanos()),
        }
    }

    pub fn at_secs(secs: u64) -> Self {
        Self::new(Instant::from_secs(secs))
    }

    pub fn set(&self, now: Instant) {
        self.nanos.set(now.as_nanos());
    }

    pub fn advance(&self, by: Duration) {
        self.nanos.set(self.nanos.get().saturating_add(by.as_nanos()));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        Instant::from_nanos(self.nanos.get())
    }
}
