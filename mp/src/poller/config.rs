//! Poller task configuration

use serde::{Deserialize, Serialize};

/// Poller task configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Control channel buffer size
    #[serde(rename = "channel-buffer", default = "default_channel_buffer")]
    pub channel_buffer: usize,

    /// Consecutive cycle failures before the breaker trips the session
    #[serde(rename = "max-consecutive-errors", default = "default_max_consecutive_errors")]
    pub max_consecutive_errors: u32,
}

fn default_channel_buffer() -> usize {
    64
}

fn default_max_consecutive_errors() -> u32 {
    5
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            channel_buffer: 64,
            max_consecutive_errors: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PollerConfig::default();
        assert_eq!(config.channel_buffer, 64);
        assert_eq!(config.max_consecutive_errors, 5);
    }

    #[test]
    fn test_serde_defaults() {
        let config: PollerConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.max_consecutive_errors, 5);
    }
}
