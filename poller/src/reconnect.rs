//! Exponential backoff with jitter for restarting failed chunk connections.

use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Factor applied to the delay after every attempt.
    pub multiplier: f64,
    /// Jitter as a fraction of the delay, 0.1 = ±10%.
    pub jitter_factor: f64,
    /// 0 means unlimited.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter_factor: 0.1,
            max_attempts: 0,
        }
    }
}

#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    current_delay: Duration,
    attempt_count: u32,
}

impl ReconnectPolicy {
    pub fn new(config: ReconnectConfig) -> Self {
        let current_delay = config.initial_delay;
        Self {
            config,
            current_delay,
            attempt_count: 0,
        }
    }

    /// Delay before the next attempt, `None` once attempts are exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.config.max_attempts > 0 && self.attempt_count >= self.config.max_attempts {
            return None;
        }

        self.attempt_count += 1;
        let delay = self.apply_jitter(self.current_delay);

        let scaled = (self.current_delay.as_millis() as f64 * self.config.multiplier).round();
        self.current_delay = if scaled.is_finite()
            && scaled >= 0.0
            && (scaled as u128) < self.config.max_delay.as_millis()
        {
            Duration::from_millis(scaled as u64)
        } else {
            self.config.max_delay
        };

        Some(delay)
    }

    /// Called once a connection has streamed data again.
    pub fn reset(&mut self) {
        self.current_delay = self.config.initial_delay;
        self.attempt_count = 0;
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    fn apply_jitter(&self, delay: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 || delay.is_zero() {
            return delay;
        }

        let base = delay.as_secs_f64();
        let range = base * self.config.jitter_factor;
        let jitter = rand::thread_rng().gen_range(-range..=range);

        Duration::from_secs_f64((base + jitter).max(0.001))
    }
}
