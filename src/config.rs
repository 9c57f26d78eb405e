// src/config.rs

//! Configuration types for the admission controller and its collaborators

// dependencies
use crate::errors::ConfigError;
use serde::Deserialize;
use std::time::Duration;

/// Token bucket parameters for a rate limiter (or a single key override)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimiterConfig {
    pub(crate) capacity: f64,
    pub(crate) refill_rate_per_second: f64,
}

impl RateLimiterConfig {
    /// Create a new configuration with capacity and refill settings
    pub fn new(capacity: f64, refill_rate_per_second: f64) -> Self {
        Self {
            capacity,
            refill_rate_per_second,
        }
    }

    /// Builder-style: set bucket capacity
    pub fn capacity(mut self, capacity: f64) -> Self {
        self.capacity = capacity;
        self
    }

    /// Builder-style: set refill rate in tokens per second
    pub fn refill_rate(mut self, refill_rate_per_second: f64) -> Self {
        self.refill_rate_per_second = refill_rate_per_second;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.capacity.is_finite() && self.capacity > 0.0) {
            return Err(ConfigError::InvalidCapacity(self.capacity));
        }
        if !(self.refill_rate_per_second.is_finite() && self.refill_rate_per_second > 0.0) {
            return Err(ConfigError::InvalidRefillRate(self.refill_rate_per_second));
        }
        Ok(())
    }
}

/// Thresholds and recovery timeout for a circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    pub(crate) failure_threshold: u32,
    pub(crate) success_threshold: u32,
    pub(crate) recovery_timeout: Duration,
}

impl CircuitBreakerConfig {
    pub fn new(failure_threshold: u32, success_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            success_threshold,
            recovery_timeout,
        }
    }

    /// Builder-style: consecutive failures that open a closed breaker
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Builder-style: consecutive probe successes that close a half-open breaker
    pub fn success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    /// Builder-style: how long an open breaker rejects before probing
    pub fn recovery_timeout(mut self, timeout: Duration) -> Self {
        self.recovery_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::InvalidFailureThreshold);
        }
        if self.success_threshold == 0 {
            return Err(ConfigError::InvalidSuccessThreshold);
        }
        if self.recovery_timeout.is_zero() {
            return Err(ConfigError::InvalidRecoveryTimeout);
        }
        Ok(())
    }
}

/// Construction-time configuration for an `AdmissionController`.
///
/// Deserializable so hosts can embed it in their own configuration files:
///
/// ```toml
/// default_capacity = 20.0
/// default_refill_rate_per_second = 5.0
/// failure_threshold = 3
/// success_threshold = 1
/// recovery_timeout_ms = 1000
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdmissionConfig {
    pub default_capacity: f64,
    pub default_refill_rate_per_second: f64,
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub recovery_timeout_ms: u64,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            default_capacity: 10.0,
            default_refill_rate_per_second: 10.0,
            failure_threshold: 5,
            success_threshold: 1,
            recovery_timeout_ms: 30_000,
        }
    }
}

impl AdmissionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn default_capacity(mut self, capacity: f64) -> Self {
        self.default_capacity = capacity;
        self
    }

    pub fn default_refill_rate(mut self, refill_rate_per_second: f64) -> Self {
        self.default_refill_rate_per_second = refill_rate_per_second;
        self
    }

    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    pub fn recovery_timeout_ms(mut self, millis: u64) -> Self {
        self.recovery_timeout_ms = millis;
        self
    }

    /// Bucket defaults for keys without an override
    pub fn rate_limiter(&self) -> RateLimiterConfig {
        RateLimiterConfig::new(self.default_capacity, self.default_refill_rate_per_second)
    }

    /// Breaker settings shared by every target
    pub fn circuit_breaker(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig::new(
            self.failure_threshold,
            self.success_threshold,
            Duration::from_millis(self.recovery_timeout_ms),
        )
    }

    /// Validate every field; the first offending field is reported
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.rate_limiter().validate()?;
        self.circuit_breaker().validate()
    }
}
