use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Deserialize;

/// Decides when a pending message becomes eligible for its next delivery attempt.
pub trait RetryPolicy: Send + Sync + std::fmt::Debug {
    /// `attempt` is the 1-based number of the attempt about to be made.
    fn next_retry_at(&self, attempt: u32, now: DateTime<Utc>) -> DateTime<Utc>;
}

/// Same delay after every attempt.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay {
    pub delay: Duration,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl RetryPolicy for FixedDelay {
    fn next_retry_at(&self, _attempt: u32, now: DateTime<Utc>) -> DateTime<Utc> {
        delayed(now, self.delay)
    }
}

/// Exponential backoff with jitter, capped at `max`.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    pub base: Duration,
    pub max: Duration,
}

impl RetryPolicy for ExponentialBackoff {
    fn next_retry_at(&self, attempt: u32, now: DateTime<Utc>) -> DateTime<Utc> {
        let attempt = u8::try_from(attempt).unwrap_or(u8::MAX);
        let delay = calculate_backoff(
            attempt,
            self.base.as_millis() as u64,
            self.max.as_millis() as u64,
        );
        delayed(now, delay)
    }
}

fn delayed(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|delay| now.checked_add_signed(delay))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Calculate exponential backoff delay with jitter.
///
/// Formula: `min(base_ms * 2^(attempt-1) + jitter, max_ms)` (0-25% jitter)
pub fn calculate_backoff(attempt: u8, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let exp_factor = 2u64.saturating_pow((attempt - 1) as u32);
    let delay_ms = base_ms.saturating_mul(exp_factor);

    let jitter = if delay_ms > 0 {
        rand::rng().random_range(0..=delay_ms / 4)
    } else {
        0
    };

    let total_delay = delay_ms.saturating_add(jitter).min(max_ms);
    Duration::from_millis(total_delay)
}

/// Retry policy selection as it appears in configuration.
///
/// ```toml
/// [redelivery.retry]
/// strategy = "exponential"
/// base_ms = 30000
/// max_ms = 600000
/// ```
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum RetryPolicyConfig {
    Fixed {
        #[serde(default = "default_fixed_delay_secs")]
        delay_secs: u64,
    },
    Exponential {
        #[serde(default = "default_base_ms")]
        base_ms: u64,
        #[serde(default = "default_max_ms")]
        max_ms: u64,
    },
}

fn default_fixed_delay_secs() -> u64 {
    60
}
fn default_base_ms() -> u64 {
    30_000
}
fn default_max_ms() -> u64 {
    600_000
}

impl Default for RetryPolicyConfig {
    fn default() -> Self {
        Self::Fixed {
            delay_secs: default_fixed_delay_secs(),
        }
    }
}

impl RetryPolicyConfig {
    pub fn build(&self) -> Arc<dyn RetryPolicy> {
        match *self {
            Self::Fixed { delay_secs } => {
                Arc::new(FixedDelay::new(Duration::from_secs(delay_secs)))
            }
            Self::Exponential { base_ms, max_ms } => Arc::new(ExponentialBackoff {
                base: Duration::from_millis(base_ms),
                max: Duration::from_millis(max_ms),
            }),
        }
    }
}
