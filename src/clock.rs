// src/clock.rs

// clock module definition and implementations

// dependencies
use std::time::Instant;

/// Clock trait to abstract time retrieval.
/// Implementors must be thread-safe (Send + Sync).
/// The `now` method returns monotonic time in nanoseconds as a u64, measured
/// from an arbitrary origin fixed by the implementation.
/// Readings must never go backwards for a given clock instance.
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

/// Monotonic clock backed by `std::time::Instant`.
/// Clones share the same origin, so readings from a clone are comparable
/// with readings from the original.
/// This is the default clock used by the admission controller.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> u64 {
        // u64 nanoseconds covers ~584 years of uptime
        self.origin.elapsed().as_nanos() as u64
    }
}

pub(crate) const NANOS_PER_SECOND: f64 = 1_000_000_000.0;

// seconds elapsed between two clock readings, zero if the clock went backwards
pub(crate) fn elapsed_seconds(earlier: u64, later: u64) -> f64 {
    later.saturating_sub(earlier) as f64 / NANOS_PER_SECOND
}
