use std::time::Duration;

use serde::Deserialize;

use crate::msg_log::DEFAULT_MAX_TRY_COUNT;
use crate::retry::RetryPolicyConfig;

/// App-level MQ configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct MqAppConfig {
    /// Redis connection URL. Default: "redis://localhost:6379".
    #[serde(default = "default_mq_url")]
    pub url: String,
    /// Connection pool size. Default: 5.
    #[serde(default = "default_mq_pool_size")]
    pub pool_size: u8,
}

fn default_mq_url() -> String {
    "redis://localhost:6379".into()
}
fn default_mq_pool_size() -> u8 {
    5
}

impl Default for MqAppConfig {
    fn default() -> Self {
        Self {
            url: default_mq_url(),
            pool_size: default_mq_pool_size(),
        }
    }
}

/// Redelivery sweeper configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct RedeliveryConfig {
    /// Whether the redelivery service runs at all. Default: true.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Seconds between two sweeps. Default: 30.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Attempts allowed before an entry is marked failed. Default: 3.
    #[serde(default = "default_max_try_count")]
    pub max_try_count: u32,
    /// Upper bound for a single publish call. Default: 10.
    #[serde(default = "default_publish_timeout_secs")]
    pub publish_timeout_secs: u64,
    /// Maximum entries fetched per sweep. Default: 500.
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    #[serde(default)]
    pub retry: RetryPolicyConfig,
}

fn default_enabled() -> bool {
    true
}
fn default_interval_secs() -> u64 {
    30
}
fn default_max_try_count() -> u32 {
    DEFAULT_MAX_TRY_COUNT
}
fn default_publish_timeout_secs() -> u64 {
    10
}
fn default_batch_size() -> u64 {
    500
}

impl Default for RedeliveryConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            interval_secs: default_interval_secs(),
            max_try_count: default_max_try_count(),
            publish_timeout_secs: default_publish_timeout_secs(),
            batch_size: default_batch_size(),
            retry: RetryPolicyConfig::default(),
        }
    }
}

impl RedeliveryConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publish_timeout_secs)
    }
}
