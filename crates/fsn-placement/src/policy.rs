use std::collections::HashMap;
use std::sync::RwLock;

use fsn_types::{ContainerId, OwnerId};
use serde::{Deserialize, Serialize};

use crate::error::{PlacementError, PlacementResult};

/// One replica descriptor: `count` copies on nodes chosen by `selector`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replica {
    pub count: u32,
    #[serde(default)]
    pub selector: String,
}

impl Replica {
    pub fn new(count: u32) -> Self {
        Self {
            count,
            selector: String::new(),
        }
    }
}

/// Container placement rules.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementPolicy {
    pub replicas: Vec<Replica>,
    /// Candidate nodes per required copy.
    #[serde(default = "default_backup_factor")]
    pub backup_factor: u32,
}

fn default_backup_factor() -> u32 {
    1
}

impl PlacementPolicy {
    /// Policy with one replica descriptor per count.
    pub fn with_replicas(counts: &[u32]) -> Self {
        Self {
            replicas: counts.iter().copied().map(Replica::new).collect(),
            backup_factor: 1,
        }
    }

    /// Copies required across all descriptors.
    pub fn total_replicas(&self) -> u64 {
        self.replicas.iter().map(|r| u64::from(r.count)).sum()
    }
}

/// What the network knows about a container.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub policy: PlacementPolicy,
    pub owner: OwnerId,
    pub basic_acl: u32,
}

/// Lookup of container metadata.
pub trait ContainerSource: Send + Sync {
    /// Fails with [`PlacementError::ContainerNotFound`] for unknown or
    /// removed containers.
    fn get(&self, container: &ContainerId) -> PlacementResult<ContainerInfo>;
}

#[derive(Debug, Default)]
pub struct InMemoryContainerSource {
    containers: RwLock<HashMap<ContainerId, ContainerInfo>>,
}

impl InMemoryContainerSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, container: ContainerId, info: ContainerInfo) {
        self.containers
            .write()
            .expect("lock poisoned")
            .insert(container, info);
    }

    pub fn remove(&self, container: &ContainerId) -> Option<ContainerInfo> {
        self.containers.write().expect("lock poisoned").remove(container)
    }
}

impl ContainerSource for InMemoryContainerSource {
    fn get(&self, container: &ContainerId) -> PlacementResult<ContainerInfo> {
        self.containers
            .read()
            .expect("lock poisoned")
            .get(container)
            .cloned()
            .ok_or(PlacementError::ContainerNotFound(*container))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_replicas_sums_descriptors() {
        assert_eq!(PlacementPolicy::with_replicas(&[2, 3, 1]).total_replicas(), 6);
    }

    #[test]
    fn policy_defaults_from_json() {
        let policy: PlacementPolicy = serde_json::from_str(r#"{"replicas":[{"count":2}]}"#).unwrap();
        assert_eq!(policy.backup_factor, 1);
        assert_eq!(policy.replicas[0].selector, "");
    }

    #[test]
    fn container_source_lookup() {
        let source = InMemoryContainerSource::new();
        let cid = ContainerId::from_hash([1; 32]);
        assert!(matches!(source.get(&cid), Err(PlacementError::ContainerNotFound(_))));
        let info = ContainerInfo {
            policy: PlacementPolicy::with_replicas(&[1]),
            owner: OwnerId::from_hash([2; 32]),
            basic_acl: 0x1fbf_8cff,
        };
        source.insert(cid, info.clone());
        assert_eq!(source.get(&cid).unwrap(), info);
        assert!(source.remove(&cid).is_some());
    }
}
