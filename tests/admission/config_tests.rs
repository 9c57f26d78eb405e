// tests/admission/config_tests.rs

#[cfg(test)]
mod tests {
    use crate::fixtures::test_clock::TestClock;
    use flux_admission::{
        AdmissionConfig, AdmissionController, CircuitBreakerConfig, ConfigError, RateLimiterConfig,
    };
    use std::time::Duration;

    // Config validation tests
    #[test]
    fn config_rejects_zero_capacity() {
        let config = AdmissionConfig::new().default_capacity(0.0);
        assert_eq!(config.validate(), Err(ConfigError::InvalidCapacity(0.0)));
    }

    #[test]
    fn config_rejects_negative_refill_rate() {
        let config = AdmissionConfig::new().default_refill_rate(-1.0);
        assert_eq!(config.validate(), Err(ConfigError::InvalidRefillRate(-1.0)));
    }

    #[test]
    fn config_rejects_zero_thresholds() {
        let config = AdmissionConfig::new().failure_threshold(0);
        assert_eq!(config.validate(), Err(ConfigError::InvalidFailureThreshold));

        let config = AdmissionConfig::new().success_threshold(0);
        assert_eq!(config.validate(), Err(ConfigError::InvalidSuccessThreshold));
    }

    #[test]
    fn config_rejects_zero_recovery_timeout() {
        let config = AdmissionConfig::new().recovery_timeout_ms(0);
        assert_eq!(config.validate(), Err(ConfigError::InvalidRecoveryTimeout));
    }

    #[test]
    fn config_accepts_valid_parameters() {
        let config = AdmissionConfig::new()
            .default_capacity(2.0)
            .default_refill_rate(0.5)
            .failure_threshold(1)
            .success_threshold(1)
            .recovery_timeout_ms(1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn constructor_with_invalid_config_fails() {
        let config = AdmissionConfig::new().default_capacity(-3.0);
        let result = AdmissionController::with_clock(config, TestClock::new(0.0));
        assert!(matches!(result, Err(ConfigError::InvalidCapacity(_))));
    }

    #[test]
    fn component_configs_validate_independently() {
        assert!(RateLimiterConfig::new(1.0, 1.0).capacity(0.5).validate().is_ok());
        assert!(
            RateLimiterConfig::new(1.0, 1.0)
                .refill_rate(0.0)
                .validate()
                .is_err()
        );
        assert!(
            CircuitBreakerConfig::new(1, 1, Duration::from_secs(1))
                .recovery_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn config_parses_from_toml() {
        let config: AdmissionConfig = toml::from_str(
            r#"
            default_capacity = 20.0
            default_refill_rate_per_second = 5.0
            failure_threshold = 3
            success_threshold = 2
            recovery_timeout_ms = 1500
            "#,
        )
        .unwrap();

        assert_eq!(config.default_capacity, 20.0);
        assert_eq!(config.default_refill_rate_per_second, 5.0);
        assert_eq!(config.failure_threshold, 3);
        assert_eq!(config.success_threshold, 2);
        assert_eq!(
            config.circuit_breaker(),
            CircuitBreakerConfig::new(3, 2, Duration::from_millis(1500))
        );
    }

    #[test]
    fn config_rejects_unknown_toml_fields() {
        let result: Result<AdmissionConfig, _> = toml::from_str(
            r#"
            default_capacity = 20.0
            default_refill_rate_per_second = 5.0
            failure_threshold = 3
            success_threshold = 2
            recovery_timeout_ms = 1500
            burst = 4
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn error_display_formatting() {
        let error = AdmissionConfig::new()
            .failure_threshold(0)
            .validate()
            .unwrap_err();
        assert!(error.to_string().contains("failure threshold"));
    }
}
