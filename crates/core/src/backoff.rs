//! Capped exponential backoff with additive jitter for job polling.
//!
//! The poll loop owns one [`BackoffState`] per invocation. Each iteration
//! sleeps for [`BackoffState::sleep_duration`] and then calls
//! [`BackoffState::advance`].

use std::time::Duration;

use rand::Rng;

/// Delay before the first status poll.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(10);
/// Upper bound on the delay between polls.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);
/// Factor by which the delay grows after each poll.
pub const DEFAULT_MULTIPLIER: f64 = 2.0;
/// Exclusive upper bound of the random jitter added to each sleep.
pub const DEFAULT_MAX_JITTER: Duration = Duration::from_secs(1);

/// Tunable parameters for the polling backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Jitter is drawn uniformly from `[0, max_jitter)`. Zero disables it.
    pub max_jitter: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            multiplier: DEFAULT_MULTIPLIER,
            max_jitter: DEFAULT_MAX_JITTER,
        }
    }
}

/// Calculate the next backoff delay from the current delay and config.
///
/// The result is clamped to [`BackoffConfig::max_delay`].
pub fn next_delay(current: Duration, config: &BackoffConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}

/// Draw a jitter value uniformly from `[0, max)` at millisecond
/// resolution. Returns zero when `max` is below one millisecond.
pub fn jitter<R: Rng>(max: Duration, rng: &mut R) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rng.random_range(0..max_ms))
}

/// Smallest base delay; a zero start would never grow.
pub const MIN_DELAY: Duration = Duration::from_millis(1);

/// Per-invocation poll backoff. Only the poll loop mutates it.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffState {
    current_delay: Duration,
    attempt: u32,
}

impl BackoffState {
    /// Fresh state at the configured initial delay, clamped to
    /// `[MIN_DELAY, max_delay]`.
    pub fn new(config: &BackoffConfig) -> Self {
        Self {
            current_delay: config.initial_delay.min(config.max_delay).max(MIN_DELAY),
            attempt: 0,
        }
    }

    /// Base delay for the upcoming sleep.
    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }

    /// Number of completed poll iterations.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Base delay plus jitter. Jitter only ever lengthens the sleep.
    pub fn sleep_duration<R: Rng>(&self, config: &BackoffConfig, rng: &mut R) -> Duration {
        self.current_delay + jitter(config.max_jitter, rng)
    }

    /// Grow the delay towards the cap and count the iteration.
    pub fn advance(&mut self, config: &BackoffConfig) {
        self.current_delay = next_delay(self.current_delay, config).max(self.current_delay);
        self.attempt = self.attempt.saturating_add(1);
    }
}
