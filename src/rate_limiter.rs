// src/rate_limiter.rs

// per-key token bucket registry

// dependencies
use crate::clock::{Clock, MonotonicClock};
use crate::config::RateLimiterConfig;
use crate::errors::ConfigError;
use crate::token_bucket::TokenBucket;
use dashmap::DashMap;
use std::time::Duration;

/// Per-key token bucket rate limiter.
/// Buckets are created lazily, full, the first time a key is seen.
/// C is the clock type, defaulting to MonotonicClock.
/// We use `DashMap` so that each key's refill-then-consume runs under its
/// shard's write guard; unrelated keys on other shards are never serialized.
#[derive(Debug)]
pub struct RateLimiter<C = MonotonicClock>
where
    C: Clock,
{
    defaults: RateLimiterConfig,
    overrides: DashMap<String, RateLimiterConfig>,
    pub(crate) buckets: DashMap<String, TokenBucket>,
    clock: C,
}

/// Result of a rate limiting decision
#[derive(Debug, Clone, PartialEq)]
pub struct AllowResult {
    /// Whether the call was admitted
    pub allowed: bool,
    /// Advisory wait before the same cost could be admitted (denials only).
    /// `None` on a denial means the cost can never be admitted by this bucket.
    pub retry_after: Option<Duration>,
    /// Tokens left in the bucket after this decision
    pub remaining: f64,
}

impl<C> RateLimiter<C>
where
    C: Clock,
{
    // method to create a new rate limiter from a config object
    pub fn with_config(config: RateLimiterConfig, clock: C) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            defaults: config,
            overrides: DashMap::new(),
            buckets: DashMap::new(),
            clock,
        })
    }

    /// Default bucket parameters
    pub fn defaults(&self) -> RateLimiterConfig {
        self.defaults
    }

    /// Admit a unit-cost call for `key`.
    pub fn allow(&self, key: &str) -> AllowResult {
        self.allow_cost(key, 1.0)
    }

    /// Admit a call costing `cost` tokens for `key`.
    pub fn allow_cost(&self, key: &str, cost: f64) -> AllowResult {
        let now = self.clock.now();

        // fast path avoids allocating the key for buckets that already exist
        let mut bucket = match self.buckets.get_mut(key) {
            Some(bucket) => bucket,
            None => self.buckets.entry(key.to_owned()).or_insert_with(|| {
                tracing::trace!(key, "creating token bucket");
                TokenBucket::from_validated(self.config_for(key), now)
            }),
        };

        if bucket.try_consume(cost, now) {
            return AllowResult {
                allowed: true,
                retry_after: None,
                remaining: bucket.available(),
            };
        }

        let retry_after = bucket.retry_after(cost);
        tracing::debug!(key, cost, ?retry_after, "rate limit exceeded");
        AllowResult {
            allowed: false,
            retry_after,
            remaining: bucket.available(),
        }
    }

    /// Override the bucket parameters for one key.
    ///
    /// Safe before or after the key's bucket exists. An existing bucket keeps
    /// the tokens it has earned, clamped to the new capacity.
    pub fn configure(
        &self,
        key: &str,
        capacity: f64,
        refill_rate_per_second: f64,
    ) -> Result<(), ConfigError> {
        let config = RateLimiterConfig::new(capacity, refill_rate_per_second);
        config.validate()?;

        self.overrides.insert(key.to_owned(), config);
        if let Some(mut bucket) = self.buckets.get_mut(key) {
            bucket.apply(config, self.clock.now());
        }
        tracing::debug!(key, capacity, refill_rate_per_second, "bucket override set");
        Ok(())
    }

    /// Drop buckets idle for at least `max_idle` that would be full by now.
    ///
    /// A full bucket is indistinguishable from a freshly created one, so
    /// eviction never grants a key more tokens than it would otherwise have.
    /// Returns the number of buckets removed.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let now = self.clock.now();
        let max_idle_nanos = u64::try_from(max_idle.as_nanos()).unwrap_or(u64::MAX);
        let mut evicted = 0;

        self.buckets.retain(|_, bucket| {
            let idle = now.saturating_sub(bucket.last_refill_nanos());
            let keep = idle < max_idle_nanos || !bucket.is_full_at(now);
            if !keep {
                evicted += 1;
            }
            keep
        });

        if evicted > 0 {
            tracing::debug!(evicted, "evicted idle token buckets");
        }
        evicted
    }

    /// Number of live buckets
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    fn config_for(&self, key: &str) -> RateLimiterConfig {
        self.overrides
            .get(key)
            .map(|entry| *entry.value())
            .unwrap_or(self.defaults)
    }
}
