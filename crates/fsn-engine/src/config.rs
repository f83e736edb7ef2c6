use fsn_shard::ShardConfig;
use serde::{Deserialize, Serialize};

/// Shard layout of a storage engine.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub shards: Vec<ShardConfig>,
}

impl EngineConfig {
    /// `count` in-memory shards with default settings.
    pub fn in_memory(count: usize) -> Self {
        Self {
            shards: vec![ShardConfig::default(); count],
        }
    }
}
