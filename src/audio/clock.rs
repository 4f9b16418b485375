//! Output clocks.
//!
//! Every engine reads time from an [`OutputClock`] instead of the wall clock
//! directly, so the same state machines run against real time or against a
//! virtual clock that tests advance by hand.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use atomic_float::AtomicF64;

/// Source of "now", in seconds since an arbitrary origin.
pub trait OutputClock {
    fn now(&self) -> f64;
}

/// Wall clock anchored at construction.
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputClock for MonotonicClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Virtual clock. Clones share the same time value.
#[derive(Clone)]
pub struct ManualClock {
    seconds: Arc<AtomicF64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self { seconds: Arc::new(AtomicF64::new(0.0)) }
    }

    pub fn set(&self, seconds: f64) {
        self.seconds.store(seconds, Ordering::Relaxed);
    }

    pub fn advance(&self, seconds: f64) {
        self.seconds.fetch_add(seconds, Ordering::Relaxed);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputClock for ManualClock {
    fn now(&self) -> f64 {
        self.seconds.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_is_shared_between_clones() {
        let clock = ManualClock::new();
        let view = clock.clone();
        clock.advance(1.5);
        clock.advance(0.25);
        assert!((view.now() - 1.75).abs() < 1e-12);
        view.set(10.0);
        assert_eq!(clock.now(), 10.0);
    }

    #[test]
    fn monotonic_clock_never_goes_backwards() {
        let clock = MonotonicClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
