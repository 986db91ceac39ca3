//! Runtime configuration
//!
//! Plain deserializable structs with workable defaults; every field can
//! be left out of a config file.

use std::time::Duration;

use serde::Deserialize;

/// Per-application runtime tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    /// Maximum time an action handler may run, in milliseconds
    pub action_timeout_ms: u64,
    /// Pages idle longer than this are closed by the sweeper, in seconds
    pub idle_expiry_secs: u64,
    /// Bounded capacity of the per-page outbound queue
    pub outbound_queue: usize,
    /// What happens when the outbound queue is full
    pub slow_client: SlowClientPolicy,
    pub limits: Limits,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            action_timeout_ms: 30_000,
            idle_expiry_secs: 3_600,
            outbound_queue: 32,
            slow_client: SlowClientPolicy::Block,
            limits: Limits::default(),
        }
    }
}

impl LiveConfig {
    pub fn action_timeout(&self) -> Duration {
        Duration::from_millis(self.action_timeout_ms)
    }

    pub fn idle_expiry(&self) -> Duration {
        Duration::from_secs(self.idle_expiry_secs)
    }
}

/// Backpressure policy when a client stops draining updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlowClientPolicy {
    /// Further actions block at the ingress until the queue drains
    Block,
    /// The page is terminated with `SlowClient`
    Terminate,
}

/// Aggregate bounds enforced at page creation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Maximum live pages per application
    pub max_pages: usize,
    /// Approximate memory bound across an application's pages, in bytes
    pub max_memory_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_pages: 1_024,
            max_memory_bytes: 64 * 1024 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_deserializes_to_defaults() {
        let config: LiveConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.action_timeout(), Duration::from_secs(30));
        assert_eq!(config.idle_expiry(), Duration::from_secs(3_600));
        assert_eq!(config.outbound_queue, 32);
        assert_eq!(config.slow_client, SlowClientPolicy::Block);
        assert_eq!(config.limits.max_pages, 1_024);
    }

    #[test]
    fn partial_overrides_apply() {
        let config: LiveConfig = serde_json::from_str(
            r#"{"action_timeout_ms": 250, "slow_client": "terminate", "limits": {"max_pages": 2}}"#,
        )
        .unwrap();
        assert_eq!(config.action_timeout(), Duration::from_millis(250));
        assert_eq!(config.slow_client, SlowClientPolicy::Terminate);
        assert_eq!(config.limits.max_pages, 2);
        assert_eq!(config.limits.max_memory_bytes, 64 * 1024 * 1024);
    }
}
