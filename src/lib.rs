// src/lib.rs

//! # Flux Admission
//!
//! Admission control for calls to a downstream dependency: a per-key token
//! bucket rate limiter composed with a per-target circuit breaker.
//!
//! Every call goes through the same fixed order: the rate limiter for its
//! key, then the circuit breaker for its target, then the operation itself.
//! Rejections are values, not errors, and the breaker always learns the
//! outcome of an admitted call, even when the calling future is cancelled.
//!
//! Calls with a deadline (`Call::timeout`) use `tokio::time` and must run
//! inside a Tokio runtime with the time driver enabled. Calls without one
//! are executor-agnostic.
//!
//! ## Quick Example
//!
//! ```rust
//! use flux_admission::{AdmissionConfig, AdmissionController, Outcome, RejectReason};
//!
//! # async fn fetch_profile() -> Result<String, std::io::Error> { Ok("profile".into()) }
//! # async fn example() -> Result<(), flux_admission::ConfigError> {
//! let config = AdmissionConfig::new()
//!     .default_capacity(20.0)
//!     .default_refill_rate(5.0)
//!     .failure_threshold(3)
//!     .recovery_timeout_ms(1_000);
//! let controller = AdmissionController::new(config)?;
//!
//! let outcome = controller
//!     .execute_or_else("user_123", "profile-service", fetch_profile, || async {
//!         String::from("cached profile")
//!     })
//!     .await;
//!
//! match outcome {
//!     Outcome::Success(profile) => println!("fresh: {profile}"),
//!     Outcome::Recovered { value, error } => println!("fallback after {error}: {value}"),
//!     Outcome::Rejected { rejection, .. } if rejection.reason == RejectReason::RateLimited => {
//!         println!("slow down, retry after {:?}", rejection.retry_after)
//!     }
//!     other => println!("unavailable: {other:?}"),
//! }
//! # Ok(())
//! # }
//! ```

// private modules
mod admission;
mod circuit_breaker;
mod clock;
mod config;
mod errors;
mod rate_limiter;
mod token_bucket;

// public API exports
pub use admission::{
    AdmissionController, AdmissionStats, Call, CallError, EveryError, NoFallback, Outcome,
    RejectReason, Rejection, every_error,
};
pub use circuit_breaker::{BreakerSnapshot, CircuitBreaker, CircuitState, OpenCircuit, Permit};
pub use clock::{Clock, MonotonicClock};
pub use config::{AdmissionConfig, CircuitBreakerConfig, RateLimiterConfig};
pub use errors::ConfigError;
pub use rate_limiter::{AllowResult, RateLimiter};
pub use token_bucket::TokenBucket;
