use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Policer tuning.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicerConfig {
    /// Addresses examined by the first pass.
    pub work_scope: usize,
    /// Percentage the batch grows by after a completed pass.
    pub expand_rate: u32,
    /// Time allowed for one remote head check.
    pub head_timeout_ms: u64,
    /// Pause between scheduled passes.
    pub interval_secs: u64,
}

impl Default for PolicerConfig {
    fn default() -> Self {
        Self {
            work_scope: 100,
            expand_rate: 10,
            head_timeout_ms: 5_000,
            interval_secs: 60,
        }
    }
}

impl PolicerConfig {
    pub fn head_timeout(&self) -> Duration {
        Duration::from_millis(self.head_timeout_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let config: PolicerConfig = serde_json::from_str(r#"{"work_scope": 5}"#).unwrap();
        assert_eq!(config.work_scope, 5);
        assert_eq!(config.expand_rate, 10);
        assert_eq!(config.head_timeout(), Duration::from_secs(5));
    }
}
