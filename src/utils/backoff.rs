use std::time::Duration;

use crate::config::Config;

/// Tunables for batch-level exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
    /// Retries allowed at the ceiling before the caller gives up.
    pub max_saturated_retries: u32,
}

impl BackoffPolicy {
    pub fn new(base: Duration, max: Duration, max_saturated_retries: u32) -> Self {
        Self {
            base,
            max: max.max(base),
            max_saturated_retries,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Duration::from_millis(config.backoff_base_ms),
            Duration::from_millis(config.backoff_max_ms),
            config.max_saturated_retries,
        )
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60), 5)
    }
}

/// Doubling delay shared by every item of a batch.
///
/// The delay starts at `base`, doubles on each `next_delay` call up to
/// `max`, and goes back to `base` on `reset`.
#[derive(Debug, Clone)]
pub struct BatchBackoff {
    policy: BackoffPolicy,
    current: Duration,
    saturated_retries: u32,
}

impl BatchBackoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            current: policy.base,
            saturated_retries: 0,
        }
    }

    pub fn policy(&self) -> BackoffPolicy {
        self.policy
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    /// Double the delay (capped) and return it.
    pub fn next_delay(&mut self) -> Duration {
        if self.is_saturated() {
            self.saturated_retries += 1;
        }
        self.current = self.current.saturating_mul(2).min(self.policy.max);
        self.current
    }

    pub fn reset(&mut self) {
        self.current = self.policy.base;
        self.saturated_retries = 0;
    }

    pub fn is_saturated(&self) -> bool {
        self.current >= self.policy.max
    }

    pub fn saturated_retries(&self) -> u32 {
        self.saturated_retries
    }

    /// True once the ceiling has been retried `max_saturated_retries` times.
    pub fn is_exhausted(&self) -> bool {
        self.is_saturated() && self.saturated_retries >= self.policy.max_saturated_retries
    }
}
