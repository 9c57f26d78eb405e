// src/admission.rs

//! Admission controller: rate limiting, then the target's circuit breaker,
//! then the guarded operation.
//!
//! # Data Flow
//! ```text
//! call(key, target)
//!     → RateLimiter::allow_cost(key)     denied: Rejected(RateLimited)
//!     → CircuitBreaker::before_call()    open:   fallback, Rejected(CircuitOpen)
//!     → operation() [under timeout]
//!     → permit.success() / permit.failure()
//!     → failure with fallback: Recovered, without: Failed
//! ```

// dependencies
use crate::circuit_breaker::{CircuitBreaker, CircuitState};
use crate::clock::{Clock, MonotonicClock};
use crate::config::{AdmissionConfig, CircuitBreakerConfig};
use crate::errors::ConfigError;
use crate::rate_limiter::RateLimiter;
use dashmap::DashMap;
use std::future::{Future, Ready};
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;

/// Why a call never reached the operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    RateLimited,
    CircuitOpen,
}

/// Structured admission rejection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejection {
    pub reason: RejectReason,
    /// Advisory wait before retrying, when one can be computed
    pub retry_after: Option<Duration>,
}

/// How an admitted operation failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError<E> {
    #[error("operation failed: {0}")]
    Operation(E),
    #[error("operation timed out after {0:?}")]
    TimedOut(Duration),
}

impl<E> CallError<E> {
    pub fn is_timeout(&self) -> bool {
        matches!(self, CallError::TimedOut(_))
    }

    pub fn operation_error(&self) -> Option<&E> {
        match self {
            CallError::Operation(error) => Some(error),
            CallError::TimedOut(_) => None,
        }
    }

    pub fn into_operation_error(self) -> Option<E> {
        match self {
            CallError::Operation(error) => Some(error),
            CallError::TimedOut(_) => None,
        }
    }
}

/// Result of running a call through the controller
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T, E> {
    /// The operation ran and succeeded
    Success(T),
    /// The call was not admitted; `fallback` holds the fallback's value when
    /// one was supplied and invoked (circuit-open rejections only)
    Rejected {
        rejection: Rejection,
        fallback: Option<T>,
    },
    /// The operation failed and the fallback supplied `value`
    Recovered { value: T, error: CallError<E> },
    /// The operation failed and there was no fallback, or the error was
    /// classified as not tripping the breaker
    Failed(CallError<E>),
}

impl<T, E> Outcome<T, E> {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn rejection(&self) -> Option<Rejection> {
        match self {
            Outcome::Rejected { rejection, .. } => Some(*rejection),
            _ => None,
        }
    }

    /// The value the caller should use: the operation's on success, the
    /// fallback's otherwise
    pub fn into_value(self) -> Option<T> {
        match self {
            Outcome::Success(value) | Outcome::Recovered { value, .. } => Some(value),
            Outcome::Rejected { fallback, .. } => fallback,
            Outcome::Failed(_) => None,
        }
    }
}

/// Counter snapshot for a controller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdmissionStats {
    /// Calls that reached the operation
    pub admitted: u64,
    pub rate_limited: u64,
    pub circuit_rejected: u64,
    /// Admitted calls recorded as failures on their breaker
    pub failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    admitted: AtomicU64,
    rate_limited: AtomicU64,
    circuit_rejected: AtomicU64,
    failures: AtomicU64,
}

/// The default failure classification: every error trips the breaker.
pub fn every_error<E>(_: &E) -> bool {
    true
}

/// Classifier type used when none is supplied
pub type EveryError<E> = fn(&E) -> bool;

/// Fallback type used when none is supplied
pub type NoFallback<T> = fn() -> Ready<T>;

/// Gatekeeper for calls to downstream targets.
///
/// Owns one `RateLimiter` and a lazily populated circuit breaker per target.
/// Independent controllers share nothing, so one process can hold a
/// controller per downstream service.
#[derive(Debug)]
pub struct AdmissionController<C = MonotonicClock>
where
    C: Clock + Clone,
{
    limiter: RateLimiter<C>,
    breakers: DashMap<String, Arc<CircuitBreaker<C>>>,
    breaker_config: CircuitBreakerConfig,
    clock: C,
    counters: Counters,
}

impl AdmissionController<MonotonicClock> {
    /// Build a controller on the monotonic system clock.
    pub fn new(config: AdmissionConfig) -> Result<Self, ConfigError> {
        Self::with_clock(config, MonotonicClock::new())
    }
}

impl<C> AdmissionController<C>
where
    C: Clock + Clone,
{
    /// Build a controller on a caller-supplied clock.
    /// Fails fast on any non-positive setting.
    pub fn with_clock(config: AdmissionConfig, clock: C) -> Result<Self, ConfigError> {
        config.validate()?;
        let limiter = RateLimiter::with_config(config.rate_limiter(), clock.clone())?;

        tracing::debug!(
            capacity = config.default_capacity,
            refill_rate = config.default_refill_rate_per_second,
            failure_threshold = config.failure_threshold,
            success_threshold = config.success_threshold,
            recovery_timeout_ms = config.recovery_timeout_ms,
            "admission controller created"
        );

        Ok(Self {
            limiter,
            breakers: DashMap::new(),
            breaker_config: config.circuit_breaker(),
            clock,
            counters: Counters::default(),
        })
    }

    pub fn rate_limiter(&self) -> &RateLimiter<C> {
        &self.limiter
    }

    /// The breaker for `target`, created on first use
    pub fn breaker(&self, target: &str) -> Arc<CircuitBreaker<C>> {
        if let Some(breaker) = self.breakers.get(target) {
            return Arc::clone(breaker.value());
        }
        let entry = self.breakers.entry(target.to_owned()).or_insert_with(|| {
            Arc::new(CircuitBreaker::from_validated(
                target,
                self.breaker_config,
                self.clock.clone(),
            ))
        });
        Arc::clone(entry.value())
    }

    /// State of an existing breaker; `None` if the target was never called
    pub fn breaker_state(&self, target: &str) -> Option<CircuitState> {
        self.breakers.get(target).map(|breaker| breaker.state())
    }

    /// Force a target's breaker closed. Returns false for unknown targets.
    pub fn reset_breaker(&self, target: &str) -> bool {
        match self.breakers.get(target) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    /// Per-key bucket override, see `RateLimiter::configure`
    pub fn configure_key(
        &self,
        key: &str,
        capacity: f64,
        refill_rate_per_second: f64,
    ) -> Result<(), ConfigError> {
        self.limiter.configure(key, capacity, refill_rate_per_second)
    }

    /// See `RateLimiter::evict_idle`
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        self.limiter.evict_idle(max_idle)
    }

    pub fn stats(&self) -> AdmissionStats {
        AdmissionStats {
            admitted: self.counters.admitted.load(Ordering::Relaxed),
            rate_limited: self.counters.rate_limited.load(Ordering::Relaxed),
            circuit_rejected: self.counters.circuit_rejected.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
        }
    }

    /// Start building a call for `key` against `target`.
    pub fn call<'a, T, E>(
        &'a self,
        key: &'a str,
        target: &'a str,
    ) -> Call<'a, C, T, E, EveryError<E>, NoFallback<T>> {
        Call {
            controller: self,
            key,
            target,
            cost: 1.0,
            timeout: None,
            is_failure: every_error::<E>,
            fallback: None,
            _marker: PhantomData,
        }
    }

    /// Run `operation` with unit cost, no fallback and every error counted
    /// as a failure.
    pub async fn execute<T, E, Op, Fut>(
        &self,
        key: &str,
        target: &str,
        operation: Op,
    ) -> Outcome<T, E>
    where
        Op: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.call(key, target).run(operation).await
    }

    /// Run `operation`, falling back to `fallback` when the circuit is open
    /// or the operation fails.
    pub async fn execute_or_else<T, E, Op, Fut, Fb, FbFut>(
        &self,
        key: &str,
        target: &str,
        operation: Op,
        fallback: Fb,
    ) -> Outcome<T, E>
    where
        Op: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        Fb: FnOnce() -> FbFut,
        FbFut: Future<Output = T>,
    {
        self.call(key, target).fallback(fallback).run(operation).await
    }
}

/// A call being configured; finish with `run`.
#[must_use = "a call does nothing until `run` is awaited"]
pub struct Call<'a, C, T, E, P, F>
where
    C: Clock + Clone,
{
    controller: &'a AdmissionController<C>,
    key: &'a str,
    target: &'a str,
    cost: f64,
    timeout: Option<Duration>,
    is_failure: P,
    fallback: Option<F>,
    _marker: PhantomData<fn() -> (T, E)>,
}

impl<'a, C, T, E, P, F> Call<'a, C, T, E, P, F>
where
    C: Clock + Clone,
{
    /// Tokens this call consumes from its key's bucket (default 1)
    pub fn cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    /// Deadline for the operation; expiry counts as a failure.
    /// Must be awaited inside a Tokio runtime with the time driver enabled.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Decide which operation errors trip the breaker. Errors for which the
    /// predicate returns false are handed back as `Failed` and recorded as
    /// successes, since the target did respond.
    pub fn failure_if<P2>(self, is_failure: P2) -> Call<'a, C, T, E, P2, F>
    where
        P2: Fn(&E) -> bool,
    {
        Call {
            controller: self.controller,
            key: self.key,
            target: self.target,
            cost: self.cost,
            timeout: self.timeout,
            is_failure,
            fallback: self.fallback,
            _marker: PhantomData,
        }
    }

    /// Value source used when the circuit is open or the operation fails.
    /// Its result is returned as-is; a panicking fallback unwinds to the caller.
    pub fn fallback<F2, FbFut>(self, fallback: F2) -> Call<'a, C, T, E, P, F2>
    where
        F2: FnOnce() -> FbFut,
        FbFut: Future<Output = T>,
    {
        Call {
            controller: self.controller,
            key: self.key,
            target: self.target,
            cost: self.cost,
            timeout: self.timeout,
            is_failure: self.is_failure,
            fallback: Some(fallback),
            _marker: PhantomData,
        }
    }

    /// Admit and run `operation`.
    ///
    /// The breaker always learns the outcome: if this future is dropped while
    /// the operation is pending, the permit records a failure on drop.
    ///
    /// When a [`timeout`](Call::timeout) is set, this future must be polled
    /// inside a Tokio runtime with the time driver enabled, otherwise it
    /// panics. Without a timeout any executor will do.
    pub async fn run<Op, Fut, FbFut>(self, operation: Op) -> Outcome<T, E>
    where
        Op: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        F: FnOnce() -> FbFut,
        FbFut: Future<Output = T>,
    {
        let controller = self.controller;
        let counters = &controller.counters;

        let decision = controller.limiter.allow_cost(self.key, self.cost);
        if !decision.allowed {
            counters.rate_limited.fetch_add(1, Ordering::Relaxed);
            return Outcome::Rejected {
                rejection: Rejection {
                    reason: RejectReason::RateLimited,
                    retry_after: decision.retry_after,
                },
                fallback: None,
            };
        }

        let breaker = controller.breaker(self.target);
        let permit = match breaker.before_call() {
            Ok(permit) => permit,
            Err(open) => {
                counters.circuit_rejected.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    circuit = %open.target,
                    retry_after = ?open.retry_after,
                    "circuit open, call short-circuited"
                );
                let fallback = match self.fallback {
                    Some(fallback) => Some(fallback().await),
                    None => None,
                };
                return Outcome::Rejected {
                    rejection: Rejection {
                        reason: RejectReason::CircuitOpen,
                        retry_after: open.retry_after,
                    },
                    fallback,
                };
            }
        };
        counters.admitted.fetch_add(1, Ordering::Relaxed);

        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, operation()).await {
                Ok(result) => result.map_err(CallError::Operation),
                Err(_) => Err(CallError::TimedOut(limit)),
            },
            None => operation().await.map_err(CallError::Operation),
        };

        let error = match result {
            Ok(value) => {
                permit.success();
                return Outcome::Success(value);
            }
            Err(error) => error,
        };

        let trips = match &error {
            CallError::Operation(inner) => (self.is_failure)(inner),
            CallError::TimedOut(_) => true,
        };
        if !trips {
            permit.success();
            return Outcome::Failed(error);
        }

        let probe = permit.is_probe();
        permit.failure();
        counters.failures.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            circuit = self.target,
            probe,
            timed_out = error.is_timeout(),
            "guarded operation failed"
        );

        match self.fallback {
            Some(fallback) => Outcome::Recovered {
                value: fallback().await,
                error,
            },
            None => Outcome::Failed(error),
        }
    }
}
