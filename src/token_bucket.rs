// src/token_bucket.rs

// single-key token bucket with lazy refill

// dependencies
use crate::clock::{NANOS_PER_SECOND, elapsed_seconds};
use crate::config::RateLimiterConfig;
use crate::errors::ConfigError;
use std::time::Duration;

/// A token bucket that refills continuously at `refill_rate` tokens per
/// second, up to `capacity`.
///
/// The bucket holds no clock of its own: every operation takes the current
/// clock reading in nanoseconds, so its state is purely a function of the
/// readings it has seen. Callers needing concurrent access wrap it in a lock
/// (the `RateLimiter` keeps each bucket behind its `DashMap` shard guard).
///
/// A cost that is not finite or not strictly positive is never admitted:
/// `try_consume` returns `false` and leaves the tokens untouched apart from
/// the refill.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_rate: f64,
    last_refill_nanos: u64,
}

impl TokenBucket {
    /// Create a full bucket, rejecting a capacity or refill rate that is not
    /// a positive finite number.
    pub fn new(config: RateLimiterConfig, now_nanos: u64) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_validated(config, now_nanos))
    }

    // callers must have run `config.validate()`
    pub(crate) fn from_validated(config: RateLimiterConfig, now_nanos: u64) -> Self {
        Self {
            capacity: config.capacity,
            tokens: config.capacity,
            refill_rate: config.refill_rate_per_second,
            last_refill_nanos: now_nanos,
        }
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    /// Tokens held as of the last refill
    pub fn available(&self) -> f64 {
        self.tokens
    }

    /// Clock reading of the last refill computation
    pub fn last_refill_nanos(&self) -> u64 {
        self.last_refill_nanos
    }

    /// Bring the token count up to date with `now_nanos`.
    pub fn refill(&mut self, now_nanos: u64) {
        let elapsed = elapsed_seconds(self.last_refill_nanos, now_nanos);
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        // never move backwards, otherwise a stale reading would refill twice
        self.last_refill_nanos = self.last_refill_nanos.max(now_nanos);
    }

    /// Refill, then take `cost` tokens if they are available.
    pub fn try_consume(&mut self, cost: f64, now_nanos: u64) -> bool {
        self.refill(now_nanos);

        if !is_valid_cost(cost) || self.tokens < cost {
            return false;
        }

        self.tokens -= cost;
        true
    }

    /// Time until `cost` tokens will be available, assuming nobody else
    /// consumes in between. `None` if the cost can never be satisfied.
    pub fn retry_after(&self, cost: f64) -> Option<Duration> {
        if !is_valid_cost(cost) || cost > self.capacity {
            return None;
        }
        let deficit = (cost - self.tokens).max(0.0);
        let seconds = deficit / self.refill_rate;
        // round up to the next nanosecond so waiting it out always suffices
        Some(Duration::from_nanos((seconds * NANOS_PER_SECOND).ceil() as u64))
    }

    /// Whether the bucket would be full at `now_nanos` without any further
    /// consumption.
    pub fn is_full_at(&self, now_nanos: u64) -> bool {
        let elapsed = elapsed_seconds(self.last_refill_nanos, now_nanos);
        self.tokens + elapsed * self.refill_rate >= self.capacity
    }

    /// Swap in new parameters, keeping the tokens already earned.
    /// An invalid config is rejected and leaves the bucket untouched.
    pub fn reconfigure(
        &mut self,
        config: RateLimiterConfig,
        now_nanos: u64,
    ) -> Result<(), ConfigError> {
        config.validate()?;
        self.apply(config, now_nanos);
        Ok(())
    }

    pub(crate) fn apply(&mut self, config: RateLimiterConfig, now_nanos: u64) {
        self.refill(now_nanos);
        self.capacity = config.capacity;
        self.refill_rate = config.refill_rate_per_second;
        self.tokens = self.tokens.min(self.capacity);
    }
}

fn is_valid_cost(cost: f64) -> bool {
    cost.is_finite() && cost > 0.0
}
