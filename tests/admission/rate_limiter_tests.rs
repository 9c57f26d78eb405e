// tests/admission/rate_limiter_tests.rs

#[cfg(test)]
mod tests {
    use crate::fixtures::test_clock::TestClock;
    use flux_admission::{ConfigError, RateLimiter, RateLimiterConfig, TokenBucket};
    use std::time::Duration;

    fn limiter(capacity: f64, rate: f64, clock: &TestClock) -> RateLimiter<TestClock> {
        RateLimiter::with_config(RateLimiterConfig::new(capacity, rate), clock.clone()).unwrap()
    }

    #[test]
    fn first_request_always_allowed() {
        let clock = TestClock::new(0.0);
        let limiter = limiter(1.0, 1.0, &clock);
        assert!(limiter.allow("client1").allowed);
    }

    #[test]
    fn burst_then_refill_scenario() {
        // capacity=2, refill=1/s: t=0,0,0 -> allow, allow, deny; t=1 -> allow
        let clock = TestClock::new(0.0);
        let limiter = limiter(2.0, 1.0, &clock);

        assert!(limiter.allow("client1").allowed);
        assert!(limiter.allow("client1").allowed);
        assert!(!limiter.allow("client1").allowed);

        clock.set_time(1.0);
        assert!(limiter.allow("client1").allowed);
        assert!(!limiter.allow("client1").allowed);
    }

    #[test]
    fn tokens_never_exceed_capacity_after_idle() {
        let clock = TestClock::new(0.0);
        let limiter = limiter(3.0, 50.0, &clock);
        assert!(limiter.allow_cost("client1", 3.0).allowed);

        clock.advance(86_400.0);
        assert!(limiter.allow("client1").allowed);
        assert_eq!(limiter.allow("client1").remaining, 1.0);
        assert!(limiter.allow("client1").allowed);
        assert!(!limiter.allow("client1").allowed);
    }

    #[test]
    fn waiting_out_retry_after_is_enough() {
        let clock = TestClock::new(10.0);
        let limiter = limiter(1.0, 3.0, &clock);
        assert!(limiter.allow("client1").allowed);

        let denied = limiter.allow("client1");
        assert!(!denied.allowed);
        let wait = denied.retry_after.unwrap();
        assert!(wait > Duration::ZERO);

        clock.advance_by(wait);
        assert!(limiter.allow("client1").allowed);
    }

    #[test]
    fn retry_after_is_measured_from_current_tokens() {
        let clock = TestClock::new(0.0);
        let limiter = limiter(4.0, 2.0, &clock);
        assert!(limiter.allow_cost("client1", 4.0).allowed);

        clock.set_time(0.5);
        let denied = limiter.allow_cost("client1", 3.0);
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 1.0);
        assert_eq!(denied.retry_after, Some(Duration::from_secs(1)));
    }

    #[test]
    fn denial_still_refills() {
        let clock = TestClock::new(0.0);
        let limiter = limiter(2.0, 1.0, &clock);
        assert!(limiter.allow_cost("client1", 2.0).allowed);

        clock.set_time(0.5);
        let denied = limiter.allow("client1");
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0.5);
    }

    #[test]
    fn multiple_clients_independent() {
        let clock = TestClock::new(0.0);
        let limiter = limiter(1.0, 1.0, &clock);

        assert!(limiter.allow("client1").allowed);
        assert!(limiter.allow("client2").allowed);
        assert!(!limiter.allow("client1").allowed);
        assert!(!limiter.allow("client2").allowed);
        assert!(limiter.allow("client3").allowed);
        assert_eq!(limiter.len(), 3);
    }

    #[test]
    fn invalid_cost_is_denied_without_hint() {
        let clock = TestClock::new(0.0);
        let limiter = limiter(2.0, 1.0, &clock);

        let denied = limiter.allow_cost("client1", 0.0);
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after, None);
        assert_eq!(denied.remaining, 2.0);
    }

    #[test]
    fn per_key_override_survives_reconfiguration() {
        let clock = TestClock::new(0.0);
        let limiter = limiter(1.0, 1.0, &clock);

        assert!(limiter.allow("tenant").allowed);
        limiter.configure("tenant", 5.0, 10.0).unwrap();

        clock.set_time(1.0);
        for _ in 0..5 {
            assert!(limiter.allow("tenant").allowed);
        }
        assert!(!limiter.allow("tenant").allowed);
        // other keys keep the defaults
        assert!(limiter.allow("other").allowed);
        assert!(!limiter.allow("other").allowed);
    }

    #[test]
    fn cleanup_removes_idle_clients() {
        let clock = TestClock::new(0.0);
        let limiter = limiter(1.0, 1.0, &clock);

        assert!(limiter.allow("client1").allowed);
        clock.set_time(5.0);
        assert!(limiter.allow("client2").allowed);
        clock.set_time(10.0);
        assert!(limiter.allow("client3").allowed);
        assert_eq!(limiter.len(), 3);

        clock.set_time(12.0);
        assert_eq!(limiter.evict_idle(Duration::from_secs_f64(4.5)), 2);
        assert_eq!(limiter.len(), 1);
        assert_eq!(clock.time_as_f64(), 12.0);

        // a recreated bucket starts full
        assert!(limiter.allow("client1").allowed);
    }

    #[test]
    fn cleanup_handles_empty_state() {
        let clock = TestClock::new(0.0);
        let limiter = limiter(1.0, 1.0, &clock);
        assert_eq!(limiter.evict_idle(Duration::ZERO), 0);
        assert!(limiter.is_empty());
    }

    #[test]
    fn bucket_can_be_driven_directly() {
        let mut bucket = TokenBucket::new(RateLimiterConfig::new(2.0, 1.0), 0).unwrap();
        assert!(bucket.try_consume(2.0, 0));
        assert!(!bucket.try_consume(1.0, 500_000_000));
        assert!(bucket.try_consume(1.0, 1_000_000_000));
        assert_eq!(bucket.available(), 0.0);
    }

    #[test]
    fn standalone_bucket_rejects_negative_refill_rate() {
        let result = TokenBucket::new(RateLimiterConfig::new(2.0, -1.0), 0);
        assert_eq!(result.unwrap_err(), ConfigError::InvalidRefillRate(-1.0));

        let result = TokenBucket::new(RateLimiterConfig::new(-3.0, 1.0), 0);
        assert_eq!(result.unwrap_err(), ConfigError::InvalidCapacity(-3.0));
    }
}
