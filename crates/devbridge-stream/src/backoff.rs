//! Exponential backoff with jitter

use rand::Rng;
use std::time::Duration;

use crate::config::SseConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    pub initial: Duration,
    pub multiplier: f64,
    pub max: Duration,
    pub jitter_factor: f64,
}

impl Backoff {
    pub fn from_config(config: &SseConfig) -> Self {
        Self {
            initial: config.initial_delay,
            multiplier: config.multiplier,
            max: config.max_delay,
            jitter_factor: config.jitter_factor,
        }
    }

    /// `min(initial × multiplier^attempt, max)`
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let max = self.max.as_secs_f64();
        let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay = self.initial.as_secs_f64() * self.multiplier.max(1.0).powi(exp);
        if delay.is_finite() && delay < max {
            Duration::from_secs_f64(delay.max(0.0))
        } else {
            self.max
        }
    }

    /// Base delay plus a uniform jitter in `[0, jitter_factor × base]`
    pub fn delay<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let base = self.base_delay(attempt);
        let fraction = self.jitter_factor.clamp(0.0, 1.0);
        if fraction == 0.0 || base.is_zero() {
            return base;
        }
        base + base.mul_f64(rng.gen_range(0.0..=fraction))
    }

    /// Largest delay `delay` can return
    pub fn ceiling(&self) -> Duration {
        self.max + self.max.mul_f64(self.jitter_factor.clamp(0.0, 1.0))
    }
}
