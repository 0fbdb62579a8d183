//! Reconnection Policy
//!
//! Bounded exponential backoff for the feed connection loop. The loop never
//! gives up: every delay is capped at the configured maximum and the policy
//! is reset to the initial delay whenever a connection reaches the listening
//! phase.

use std::time::Duration;

use rand::Rng;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first retry, and after every reset.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff (e.g., 2.0 doubles delay each attempt).
    pub multiplier: f64,
    /// Jitter factor as a fraction (e.g., 0.1 = ±10% randomization).
    pub jitter_factor: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter_factor: 0.0,
        }
    }
}

impl ReconnectConfig {
    /// Create a new configuration with custom values.
    #[must_use]
    pub const fn new(
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: f64,
        jitter_factor: f64,
    ) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier,
            jitter_factor,
        }
    }

    /// Create configuration from `WebSocketSettings`.
    #[must_use]
    pub const fn from_websocket_settings(settings: &crate::WebSocketSettings) -> Self {
        Self {
            initial_delay: settings.reconnect_delay_initial,
            max_delay: settings.reconnect_delay_max,
            multiplier: settings.reconnect_delay_multiplier,
            jitter_factor: settings.reconnect_jitter,
        }
    }
}

/// Reconnection policy implementing bounded exponential backoff.
///
/// With no jitter, the Nth consecutive delay is
/// `min(initial * multiplier^(N-1), max)`.
///
/// # Example
///
/// ```rust
/// use amber_price_stream::infrastructure::feed::reconnect::{ReconnectConfig, ReconnectPolicy};
/// use std::time::Duration;
///
/// let mut policy = ReconnectPolicy::new(ReconnectConfig::default());
///
/// assert_eq!(policy.next_delay(), Duration::from_secs(5));
/// assert_eq!(policy.next_delay(), Duration::from_secs(10));
///
/// // Connection reached the listening phase
/// policy.reset();
/// assert_eq!(policy.next_delay(), Duration::from_secs(5));
/// ```
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    current_delay: Duration,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Create a new reconnection policy.
    #[must_use]
    pub fn new(config: ReconnectConfig) -> Self {
        let initial_delay = config.initial_delay.min(config.max_delay);
        Self {
            config,
            current_delay: initial_delay,
            attempt_count: 0,
        }
    }

    /// Get the next delay and grow the one after it.
    #[must_use]
    pub fn next_delay(&mut self) -> Duration {
        self.attempt_count = self.attempt_count.saturating_add(1);

        let delay_with_jitter = self.apply_jitter(self.current_delay);

        #[allow(clippy::cast_precision_loss)]
        let scaled = (self.current_delay.as_millis() as f64 * self.config.multiplier).round();
        let next_millis = if scaled.is_finite() && scaled > 0.0 {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            {
                scaled as u128
            }
        } else {
            // A multiplier that cannot scale the delay keeps it where it is.
            self.current_delay.as_millis()
        };
        let max_millis = self.config.max_delay.as_millis();
        let capped = next_millis.min(max_millis);
        let capped_u64 = u64::try_from(capped).unwrap_or(u64::MAX);
        self.current_delay = Duration::from_millis(capped_u64);

        delay_with_jitter
    }

    /// Reset the policy after a connection reached the listening phase.
    pub fn reset(&mut self) {
        self.current_delay = self.config.initial_delay.min(self.config.max_delay);
        self.attempt_count = 0;
    }

    /// Consecutive delays handed out since the last reset.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// The delay the next call to [`next_delay`](Self::next_delay) starts from.
    #[must_use]
    pub const fn current_delay(&self) -> Duration {
        self.current_delay
    }

    fn apply_jitter(&self, duration: Duration) -> Duration {
        let factor = self.config.jitter_factor;
        if !factor.is_finite() || factor <= 0.0 {
            return duration;
        }

        #[allow(clippy::cast_precision_loss)]
        let base_millis = duration.as_millis() as f64;
        let jitter_range = base_millis * factor.min(1.0);
        let mut rng = rand::rng();
        let jitter: f64 = rng.random_range(-jitter_range..=jitter_range);
        let adjusted_millis = (base_millis + jitter).max(1.0);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let adjusted_u64 = adjusted_millis as u64;
        Duration::from_millis(adjusted_u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn policy(initial_ms: u64, max_ms: u64) -> ReconnectPolicy {
        ReconnectPolicy::new(ReconnectConfig {
            initial_delay: Duration::from_millis(initial_ms),
            max_delay: Duration::from_millis(max_ms),
            multiplier: 2.0,
            jitter_factor: 0.0,
        })
    }

    #[test]
    fn default_config_values() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(5));
        assert_eq!(config.max_delay, Duration::from_secs(60));
        assert!((config.multiplier - 2.0).abs() < f64::EPSILON);
        assert!(config.jitter_factor.abs() < f64::EPSILON);
    }

    #[test]
    fn default_sequence_caps_at_sixty_seconds() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::default());
        let delays: Vec<u64> = (0..7).map(|_| policy.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![5, 10, 20, 40, 60, 60, 60]);
    }

    #[test]
    fn policy_reset() {
        let mut policy = policy(100, 10_000);

        let _ = policy.next_delay();
        let _ = policy.next_delay();
        assert_eq!(policy.attempt_count(), 2);

        policy.reset();

        assert_eq!(policy.attempt_count(), 0);
        assert_eq!(policy.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn initial_above_max_is_capped() {
        let mut policy = policy(5_000, 1_000);
        assert_eq!(policy.next_delay(), Duration::from_millis(1_000));
        assert_eq!(policy.next_delay(), Duration::from_millis(1_000));
    }

    #[test]
    fn policy_jitter_bounds() {
        for _ in 0..100 {
            let mut test_policy = ReconnectPolicy::new(ReconnectConfig {
                initial_delay: Duration::from_millis(1000),
                max_delay: Duration::from_secs(10),
                multiplier: 2.0,
                jitter_factor: 0.1,
            });

            let millis = test_policy.next_delay().as_millis();
            assert!(millis >= 900, "delay {millis}ms is below minimum 900ms");
            assert!(millis <= 1100, "delay {millis}ms is above maximum 1100ms");
        }
    }

    #[test]
    fn non_finite_jitter_is_ignored() {
        for jitter_factor in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let mut policy = ReconnectPolicy::new(ReconnectConfig {
                initial_delay: Duration::from_millis(1000),
                max_delay: Duration::from_secs(10),
                multiplier: 2.0,
                jitter_factor,
            });
            assert_eq!(policy.next_delay(), Duration::from_millis(1000));
            assert_eq!(policy.next_delay(), Duration::from_millis(2000));
        }
    }

    #[test]
    fn jitter_above_one_is_bounded() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig {
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter_factor: 50.0,
        });
        let millis = policy.next_delay().as_millis();
        assert!((1..=2000).contains(&millis), "delay {millis}ms out of bounds");
    }

    #[test]
    fn unusable_multiplier_holds_delay() {
        for multiplier in [f64::NAN, 0.0, -2.0] {
            let mut policy = ReconnectPolicy::new(ReconnectConfig {
                initial_delay: Duration::from_millis(500),
                max_delay: Duration::from_secs(10),
                multiplier,
                jitter_factor: 0.0,
            });
            let delays: Vec<Duration> = (0..3).map(|_| policy.next_delay()).collect();
            assert_eq!(delays, vec![Duration::from_millis(500); 3]);
        }
    }

    #[test]
    fn never_gives_up() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::default());
        for _ in 0..1000 {
            assert!(policy.next_delay() <= Duration::from_secs(60));
        }
    }

    proptest! {
        #[test]
        fn nth_delay_is_min_of_doubling_and_max(
            initial_ms in 1u64..10_000,
            max_ms in 1u64..200_000,
            n in 1u32..40,
        ) {
            let mut policy = policy(initial_ms, max_ms);
            let mut last = Duration::ZERO;
            for _ in 0..n {
                last = policy.next_delay();
            }

            let doubled = u128::from(initial_ms) << (n - 1);
            let expected = doubled.min(u128::from(max_ms));
            prop_assert_eq!(last.as_millis(), expected);
        }

        #[test]
        fn reset_always_returns_to_initial(
            failures in 0usize..20,
        ) {
            let mut policy = policy(5_000, 60_000);
            for _ in 0..failures {
                let _ = policy.next_delay();
            }
            policy.reset();
            prop_assert_eq!(policy.next_delay(), Duration::from_millis(5_000));
        }
    }
}
