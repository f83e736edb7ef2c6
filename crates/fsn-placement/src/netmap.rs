use std::fmt;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::error::PlacementResult;

/// A storage node as published in the network map.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeInfo {
    pub public_key: Vec<u8>,
    /// Network endpoints, e.g. `/ip4/10.0.0.1/tcp/8080`.
    pub addresses: Vec<String>,
}

impl NodeInfo {
    pub fn new(public_key: impl Into<Vec<u8>>, address: impl Into<String>) -> Self {
        Self {
            public_key: public_key.into(),
            addresses: vec![address.into()],
        }
    }

    /// First advertised endpoint.
    pub fn address(&self) -> Option<&str> {
        self.addresses.first().map(String::as_str)
    }
}

impl fmt::Debug for NodeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeInfo({self})")
    }
}

impl fmt::Display for NodeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.address() {
            Some(addr) => f.write_str(addr),
            None => {
                let key = hex::encode(&self.public_key);
                f.write_str(&key[..key.len().min(16)])
            }
        }
    }
}

/// Snapshot of the network at one epoch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Netmap {
    pub epoch: u64,
    pub nodes: Vec<NodeInfo>,
}

/// Provider of the current network map.
pub trait NetmapSource: Send + Sync {
    fn current(&self) -> PlacementResult<Netmap>;
}

/// Network map held in memory and replaced wholesale on epoch change.
#[derive(Debug, Default)]
pub struct StaticNetmap {
    netmap: RwLock<Netmap>,
}

impl StaticNetmap {
    pub fn new(netmap: Netmap) -> Self {
        Self {
            netmap: RwLock::new(netmap),
        }
    }

    pub fn update(&self, netmap: Netmap) {
        *self.netmap.write().expect("lock poisoned") = netmap;
    }
}

impl NetmapSource for StaticNetmap {
    fn current(&self) -> PlacementResult<Netmap> {
        Ok(self.netmap.read().expect("lock poisoned").clone())
    }
}

/// Identity of the node this process runs as.
#[derive(Clone, Debug)]
pub struct LocalInfo {
    node: NodeInfo,
}

impl LocalInfo {
    pub fn new(node: NodeInfo) -> Self {
        Self { node }
    }

    pub fn node(&self) -> &NodeInfo {
        &self.node
    }

    /// A node is local if it advertises any of our endpoints.
    pub fn is_local(&self, node: &NodeInfo) -> bool {
        node.addresses.iter().any(|a| self.node.addresses.contains(a))
    }
}
