// src/circuit_breaker.rs

//! Three-state circuit breaker guarding a single downstream target.
//!
//! # States
//! - Closed: calls pass through, consecutive failures are counted
//! - Open: calls are rejected until the recovery timeout has elapsed
//! - HalfOpen: one probe call at a time tests whether the target recovered
//!
//! # State Transitions
//! ```text
//! Closed   → Open:     consecutive failures >= failure_threshold
//! Open     → HalfOpen: recovery_timeout elapsed, checked on the next call
//! HalfOpen → Closed:   consecutive probe successes >= success_threshold
//! HalfOpen → Open:     any probe failure
//! ```
//!
//! There are no timers: the Open → HalfOpen check runs lazily inside
//! `before_call`, so the state is a function of the recorded outcomes and the
//! clock readings alone.

// dependencies
use crate::clock::{Clock, MonotonicClock};
use crate::config::CircuitBreakerConfig;
use crate::errors::ConfigError;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;

/// Externally visible breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Returned by `before_call` when the breaker refuses a call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("circuit '{target}' is open")]
pub struct OpenCircuit {
    pub target: String,
    /// Remaining recovery time while Open; `None` while a half-open probe is
    /// in flight, since the wait depends on the probe's outcome.
    pub retry_after: Option<Duration>,
}

/// Point-in-time view of a breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    /// Clock reading at which the breaker last opened, set only while Open
    pub opened_at_nanos: Option<u64>,
    pub probe_in_flight: bool,
}

// internal state; each phase carries only the data valid in it
#[derive(Debug, Clone, Copy)]
enum Phase {
    Closed { failures: u32 },
    Open { opened_at: u64 },
    HalfOpen { successes: u32, probe_in_flight: bool },
}

#[derive(Debug)]
struct Inner {
    phase: Phase,
    // bumped on every transition; outcomes from older permits are ignored
    generation: u64,
}

/// A circuit breaker for one protected target.
/// C is the clock type, defaulting to MonotonicClock.
#[derive(Debug)]
pub struct CircuitBreaker<C = MonotonicClock>
where
    C: Clock,
{
    target: String,
    config: CircuitBreakerConfig,
    clock: C,
    inner: Mutex<Inner>,
}

impl<C> CircuitBreaker<C>
where
    C: Clock,
{
    pub fn with_config(
        target: impl Into<String>,
        config: CircuitBreakerConfig,
        clock: C,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_validated(target, config, clock))
    }

    pub(crate) fn from_validated(
        target: impl Into<String>,
        config: CircuitBreakerConfig,
        clock: C,
    ) -> Self {
        Self {
            target: target.into(),
            config,
            clock,
            inner: Mutex::new(Inner {
                phase: Phase::Closed { failures: 0 },
                generation: 0,
            }),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn config(&self) -> CircuitBreakerConfig {
        self.config
    }

    /// Current state without evaluating the recovery timeout
    pub fn state(&self) -> CircuitState {
        self.snapshot().state
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        match inner.phase {
            Phase::Closed { failures } => BreakerSnapshot {
                state: CircuitState::Closed,
                consecutive_failures: failures,
                consecutive_successes: 0,
                opened_at_nanos: None,
                probe_in_flight: false,
            },
            Phase::Open { opened_at } => BreakerSnapshot {
                state: CircuitState::Open,
                consecutive_failures: 0,
                consecutive_successes: 0,
                opened_at_nanos: Some(opened_at),
                probe_in_flight: false,
            },
            Phase::HalfOpen {
                successes,
                probe_in_flight,
            } => BreakerSnapshot {
                state: CircuitState::HalfOpen,
                consecutive_failures: 0,
                consecutive_successes: successes,
                opened_at_nanos: None,
                probe_in_flight,
            },
        }
    }

    /// Ask to make a call.
    ///
    /// The returned permit must be resolved with `success` or `failure`; a
    /// permit dropped unresolved counts as a failure. While half-open, the
    /// permit that claims the single probe slot is the only one issued until
    /// its outcome is recorded.
    pub fn before_call(&self) -> Result<Permit<'_, C>, OpenCircuit> {
        let mut inner = self.lock();
        let now = self.clock.now();

        let phase = inner.phase;
        match phase {
            Phase::Closed { .. } => Ok(self.permit(inner.generation, false)),
            Phase::Open { opened_at } => {
                let elapsed = now.saturating_sub(opened_at);
                let timeout = duration_nanos(self.config.recovery_timeout);
                if elapsed < timeout {
                    return Err(self.rejection(Some(Duration::from_nanos(timeout - elapsed))));
                }
                self.transition(
                    &mut inner,
                    Phase::HalfOpen {
                        successes: 0,
                        probe_in_flight: true,
                    },
                );
                Ok(self.permit(inner.generation, true))
            }
            Phase::HalfOpen {
                successes,
                probe_in_flight,
            } => {
                if probe_in_flight {
                    return Err(self.rejection(None));
                }
                inner.phase = Phase::HalfOpen {
                    successes,
                    probe_in_flight: true,
                };
                Ok(self.permit(inner.generation, true))
            }
        }
    }

    /// Force the breaker closed and clear its counters.
    pub fn reset(&self) {
        let mut inner = self.lock();
        self.transition(&mut inner, Phase::Closed { failures: 0 });
    }

    fn on_success(&self, generation: u64) {
        let mut inner = self.lock();
        if inner.generation != generation {
            tracing::trace!(circuit = %self.target, "ignoring stale success");
            return;
        }

        let phase = inner.phase;
        match phase {
            Phase::Closed { .. } => inner.phase = Phase::Closed { failures: 0 },
            Phase::HalfOpen { successes, .. } => {
                let successes = successes + 1;
                if successes >= self.config.success_threshold {
                    self.transition(&mut inner, Phase::Closed { failures: 0 });
                } else {
                    inner.phase = Phase::HalfOpen {
                        successes,
                        probe_in_flight: false,
                    };
                }
            }
            // entering Open bumps the generation, so no live permit matches
            Phase::Open { .. } => {}
        }
    }

    fn on_failure(&self, generation: u64) {
        let mut inner = self.lock();
        if inner.generation != generation {
            tracing::trace!(circuit = %self.target, "ignoring stale failure");
            return;
        }

        let now = self.clock.now();
        let phase = inner.phase;
        match phase {
            Phase::Closed { failures } => {
                let failures = failures + 1;
                if failures >= self.config.failure_threshold {
                    self.transition(&mut inner, Phase::Open { opened_at: now });
                } else {
                    inner.phase = Phase::Closed { failures };
                }
            }
            Phase::HalfOpen { .. } => {
                self.transition(&mut inner, Phase::Open { opened_at: now });
            }
            Phase::Open { .. } => {}
        }
    }

    fn transition(&self, inner: &mut Inner, next: Phase) {
        inner.phase = next;
        inner.generation += 1;

        match next {
            Phase::Open { .. } => tracing::warn!(
                circuit = %self.target,
                recovery_timeout_ms = self.config.recovery_timeout.as_millis() as u64,
                "circuit breaker opened"
            ),
            Phase::HalfOpen { .. } => {
                tracing::info!(circuit = %self.target, "circuit breaker half-open, probing")
            }
            Phase::Closed { .. } => tracing::info!(circuit = %self.target, "circuit breaker closed"),
        }
    }

    fn permit(&self, generation: u64, probe: bool) -> Permit<'_, C> {
        Permit {
            breaker: self,
            generation,
            probe,
            settled: false,
        }
    }

    fn rejection(&self, retry_after: Option<Duration>) -> OpenCircuit {
        OpenCircuit {
            target: self.target.clone(),
            retry_after,
        }
    }

    // every critical section leaves Inner consistent, so a poisoned lock is safe to reuse
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn duration_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

/// Permission to make one call through a breaker.
///
/// Consumed by `success` or `failure`, so each permit reports exactly once.
/// Dropping an unresolved permit (a cancelled future, a panic in the guarded
/// call) records a failure, which also frees a claimed half-open probe slot.
#[must_use = "a permit dropped without an outcome is recorded as a failure"]
#[derive(Debug)]
pub struct Permit<'a, C>
where
    C: Clock,
{
    breaker: &'a CircuitBreaker<C>,
    generation: u64,
    probe: bool,
    settled: bool,
}

impl<C> Permit<'_, C>
where
    C: Clock,
{
    /// Whether this permit is the half-open probe
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn success(mut self) {
        self.settled = true;
        self.breaker.on_success(self.generation);
    }

    pub fn failure(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.generation);
    }
}

impl<C> Drop for Permit<'_, C>
where
    C: Clock,
{
    fn drop(&mut self) {
        if !self.settled {
            tracing::warn!(
                circuit = %self.breaker.target,
                probe = self.probe,
                "permit dropped without an outcome, recording failure"
            );
            self.breaker.on_failure(self.generation);
        }
    }
}
