//! Write timestamps and the clocks that issue them.
//!
//! Every write to a version log is stamped by a [`Clock`]. Timestamps must be
//! strictly increasing per clock instance: version selection picks the
//! maximum timestamp per key and assumes no ties, so a clock that can hand
//! out the same value twice is a correctness bug, not a precision issue.

use std::sync::atomic::{AtomicI64, Ordering};

use serde::{Deserialize, Serialize};

/// Microseconds since the Unix epoch, as stamped on a stored version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Create a timestamp from raw microseconds.
    pub fn from_micros(micros: i64) -> Self {
        Self(micros)
    }

    /// Raw microseconds since epoch.
    pub fn micros(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}us", self.0)
    }
}

/// Source of write timestamps.
///
/// Implementations must guarantee that consecutive `now` calls on one
/// instance return strictly increasing values, even when calls arrive
/// faster than the wall clock's resolution.
pub trait Clock: Send + Sync {
    /// Issue a timestamp strictly greater than any issued before.
    fn now(&self) -> Timestamp;
}

/// Production clock: wall-clock microseconds with a logical fallback.
///
/// Each call takes the wall clock if it has moved past the last issued
/// value, otherwise `last + 1`. Bursts of writes within one microsecond
/// therefore still get distinct, ordered timestamps that stay readable as
/// approximate wall-clock times.
pub struct MonotonicClock {
    last: AtomicI64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            last: AtomicI64::new(0),
        }
    }

    fn wall_micros() -> i64 {
        chrono::Utc::now().timestamp_micros()
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Timestamp {
        let wall = Self::wall_micros();
        let mut last = self.last.load(Ordering::SeqCst);
        loop {
            let next = wall.max(last + 1);
            match self
                .last
                .compare_exchange_weak(last, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return Timestamp(next),
                Err(observed) => last = observed,
            }
        }
    }
}

/// Deterministic clock for tests: starts at 1 and counts up by one.
pub struct ManualClock {
    next: AtomicI64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Start issuing from `first` onwards.
    pub fn starting_at(first: i64) -> Self {
        Self {
            next: AtomicI64::new(first),
        }
    }

    /// Jump forward so the next issued timestamp is at least `micros`.
    pub fn advance_to(&self, micros: i64) {
        self.next.fetch_max(micros, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.next.fetch_add(1, Ordering::SeqCst))
    }
}
