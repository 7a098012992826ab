//! Exponential backoff with symmetric jitter

use std::time::Duration;

use rand::Rng;

use crate::config::SchedulerConfig;

/// Delay policy between failed execution attempts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    base: Duration,
    factor: f64,
    cap: Duration,
    jitter_ratio: f64,
}

impl Backoff {
    /// Non-finite or out-of-range factors and jitter ratios fall back to
    /// plain doubling bounds: a factor below 1 becomes 1, a non-finite
    /// jitter ratio becomes 0.
    #[must_use]
    pub fn new(base: Duration, factor: f64, cap: Duration, jitter_ratio: f64) -> Self {
        let factor = if factor.is_finite() { factor.max(1.0) } else { 1.0 };
        let jitter_ratio = if jitter_ratio.is_finite() {
            jitter_ratio.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            base,
            factor,
            cap,
            jitter_ratio,
        }
    }

    #[must_use]
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self::new(
            Duration::from_secs(config.backoff_base_secs),
            config.backoff_factor,
            Duration::from_secs(config.backoff_cap_secs),
            config.jitter_ratio,
        )
    }

    /// Delay after failed attempt `attempt` (1-based), before jitter
    #[must_use]
    pub fn nominal(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let secs = self.base.as_secs_f64() * self.factor.powi(exponent as i32);
        Duration::from_secs_f64(secs.min(self.cap.as_secs_f64()))
    }

    /// Nominal delay with `±jitter_ratio` applied
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let nominal = self.nominal(attempt).as_secs_f64();
        if self.jitter_ratio == 0.0 || nominal == 0.0 {
            return Duration::from_secs_f64(nominal);
        }
        let spread = nominal * self.jitter_ratio;
        let jittered = rand::rng().random_range(nominal - spread..=nominal + spread);
        Duration::from_secs_f64(jittered.max(0.0))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from_config(&SchedulerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_finite_settings_do_not_panic() {
        let backoff = Backoff::new(
            Duration::from_secs(30),
            f64::INFINITY,
            Duration::from_secs(600),
            f64::NAN,
        );
        assert_eq!(backoff.delay(1), Duration::from_secs(30));
        assert_eq!(backoff.delay(3), Duration::from_secs(30));

        let config = SchedulerConfig {
            jitter_ratio: f64::NAN,
            ..SchedulerConfig::default()
        };
        assert_eq!(Backoff::from_config(&config).delay(2), Duration::from_secs(60));
    }

    #[test]
    fn doubles_from_base_up_to_cap() {
        let backoff = Backoff::default();
        assert_eq!(backoff.nominal(1), Duration::from_secs(30));
        assert_eq!(backoff.nominal(2), Duration::from_secs(60));
        assert_eq!(backoff.nominal(3), Duration::from_secs(120));
        assert_eq!(backoff.nominal(6), Duration::from_secs(600));
        assert_eq!(backoff.nominal(40), Duration::from_secs(600));
    }

    #[test]
    fn jitter_stays_within_ten_percent() {
        let backoff = Backoff::default();
        for _ in 0..200 {
            let delay = backoff.delay(2).as_secs_f64();
            assert!((54.0..=66.0).contains(&delay), "delay {delay} out of range");
        }
    }

    #[test]
    fn zero_jitter_is_exact() {
        let backoff = Backoff::new(Duration::from_secs(1), 3.0, Duration::from_secs(100), 0.0);
        assert_eq!(backoff.delay(3), Duration::from_secs(9));
    }
}
