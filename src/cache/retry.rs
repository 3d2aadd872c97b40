use rand::Rng;
use std::time::Duration;

/// How the cache-aside executor retries transient I/O failures.
///
/// The default retries forever with a fixed 100 ms pause, favouring an
/// eventually-correct answer over latency. Bounding `max_attempts` turns
/// exhaustion into a server-unavailable error instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Pause after the first failure.
    pub base_delay: Duration,
    /// Upper bound on any single pause (exponential mode).
    pub max_delay: Duration,
    /// Double the pause after every failure.
    pub exponential: bool,
    /// Add up to 25% random extra delay.
    pub jitter: bool,
    /// Total attempts allowed; `None` retries without bound.
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            exponential: false,
            jitter: false,
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    /// Fixed-delay retries that never give up.
    pub fn unbounded(delay: Duration) -> Self {
        Self {
            base_delay: delay,
            ..Default::default()
        }
    }

    /// Exponential backoff with jitter, giving up after `max_attempts`.
    pub fn bounded(base_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_delay,
            exponential: true,
            jitter: true,
            max_attempts: Some(max_attempts.max(1)),
        }
    }

    /// Whether another attempt may follow `failures` failed ones.
    pub fn allows_retry(&self, failures: u32) -> bool {
        self.max_attempts.map_or(true, |max| failures < max)
    }

    /// Pause before the attempt following the `failures`-th failure.
    pub fn delay(&self, failures: u32) -> Duration {
        let base = if self.exponential {
            let factor = 1u32 << failures.saturating_sub(1).min(16);
            self.base_delay.saturating_mul(factor).min(self.max_delay)
        } else {
            self.base_delay
        };
        if !self.jitter {
            return base;
        }
        let spread = (base.as_millis() / 4) as u64;
        if spread == 0 {
            return base;
        }
        base + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
    }
}
