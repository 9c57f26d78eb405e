// src/errors.rs

// error handling for admission control configuration

// dependencies
use thiserror::Error;

/// Error type for configuration issues.
/// Every variant is raised at construction or `configure` time, never while
/// admitting a call.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("capacity must be a positive finite number, got {0}")]
    InvalidCapacity(f64),
    #[error("refill rate must be a positive finite number, got {0}")]
    InvalidRefillRate(f64),
    #[error("failure threshold must be positive")]
    InvalidFailureThreshold,
    #[error("success threshold must be positive")]
    InvalidSuccessThreshold,
    #[error("recovery timeout must be positive")]
    InvalidRecoveryTimeout,
}
