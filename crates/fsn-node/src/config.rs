use std::path::Path;

use anyhow::Context;
use fsn_engine::EngineConfig;
use fsn_object::TransformerConfig;
use fsn_placement::{ContainerInfo, InMemoryContainerSource, NodeInfo, PlacementPolicy};
use fsn_policer::PolicerConfig;
use fsn_types::{ContainerId, OwnerId};
use serde::{Deserialize, Serialize};

/// Node configuration, loaded from a TOML file.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub node: IdentityConfig,
    pub logging: LoggingConfig,
    pub storage: EngineConfig,
    pub object: TransformerConfig,
    pub policer: PolicerConfig,
    /// Containers this node knows the policy of.
    pub containers: Vec<ContainerConfig>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Hex-encoded public key.
    pub public_key: String,
    pub address: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            public_key: "00".into(),
            address: "/ip4/127.0.0.1/tcp/8080".into(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".into() }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContainerConfig {
    pub id: String,
    pub replicas: Vec<u32>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub basic_acl: u32,
}

impl NodeConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Config used when no file is given: one in-memory shard.
    pub fn ephemeral() -> Self {
        Self {
            storage: EngineConfig::in_memory(1),
            ..Self::default()
        }
    }

    pub fn local_node(&self) -> anyhow::Result<NodeInfo> {
        let key = hex::decode(&self.node.public_key).context("node.public_key is not hex")?;
        Ok(NodeInfo::new(key, self.node.address.clone()))
    }

    pub fn container_source(&self) -> anyhow::Result<InMemoryContainerSource> {
        let source = InMemoryContainerSource::new();
        for container in &self.containers {
            let id: ContainerId = container
                .id
                .parse()
                .with_context(|| format!("bad container id {}", container.id))?;
            let owner = match &container.owner {
                Some(owner) => owner.parse::<OwnerId>().with_context(|| format!("bad owner id {owner}"))?,
                None => OwnerId::null(),
            };
            source.insert(
                id,
                ContainerInfo {
                    policy: PlacementPolicy::with_replicas(&container.replicas),
                    owner,
                    basic_acl: container.basic_acl,
                },
            );
        }
        Ok(source)
    }
}
