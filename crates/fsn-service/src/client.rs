use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use fsn_crypto::checksum_of;
use fsn_engine::StorageEngine;
use fsn_object::format::validate;
use fsn_placement::NodeInfo;
use fsn_types::{Address, Checksum, ChecksumType, Header, Object, PayloadRange};

use crate::cancel::CancelToken;
use crate::error::{ServiceError, ServiceResult};

/// Object calls to a peer node.
///
/// Implementations must give up promptly once `cancel` fires and report
/// [`ServiceError::Cancelled`].
#[async_trait]
pub trait RemoteClient: Send + Sync {
    async fn head(&self, node: &NodeInfo, address: &Address, raw: bool, cancel: &CancelToken) -> ServiceResult<Header>;

    async fn put(&self, node: &NodeInfo, object: &Object, cancel: &CancelToken) -> ServiceResult<()>;

    async fn get_range(
        &self,
        node: &NodeInfo,
        address: &Address,
        range: PayloadRange,
        cancel: &CancelToken,
    ) -> ServiceResult<Vec<u8>>;

    async fn range_hash(
        &self,
        node: &NodeInfo,
        address: &Address,
        range: PayloadRange,
        kind: ChecksumType,
        cancel: &CancelToken,
    ) -> ServiceResult<Checksum>;
}

/// Peers backed by engines living in this process.
///
/// Used to run several nodes side by side, e.g. in tests or a single-host
/// deployment. Peers can be marked down or slowed to exercise failure paths.
#[derive(Default)]
pub struct InProcessClient {
    peers: RwLock<HashMap<String, Arc<StorageEngine>>>,
    down: RwLock<HashSet<String>>,
    delays: RwLock<HashMap<String, Duration>>,
}

impl InProcessClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, node: &NodeInfo, engine: Arc<StorageEngine>) {
        let mut peers = self.peers.write().expect("lock poisoned");
        for addr in &node.addresses {
            peers.insert(addr.clone(), engine.clone());
        }
    }

    pub fn set_down(&self, node: &NodeInfo, down: bool) {
        let mut set = self.down.write().expect("lock poisoned");
        for addr in &node.addresses {
            if down {
                set.insert(addr.clone());
            } else {
                set.remove(addr);
            }
        }
    }

    /// Delay every answer from `node`.
    pub fn set_delay(&self, node: &NodeInfo, delay: Duration) {
        let mut delays = self.delays.write().expect("lock poisoned");
        for addr in &node.addresses {
            delays.insert(addr.clone(), delay);
        }
    }

    async fn peer(&self, node: &NodeInfo, cancel: &CancelToken) -> ServiceResult<Arc<StorageEngine>> {
        let delay = {
            let delays = self.delays.read().expect("lock poisoned");
            node.addresses.iter().find_map(|a| delays.get(a).copied())
        };
        if let Some(delay) = delay {
            cancel.guard(tokio::time::sleep(delay)).await?;
        }
        if cancel.is_cancelled() {
            return Err(ServiceError::Cancelled);
        }
        let unreachable = || ServiceError::Unreachable(node.to_string());
        {
            let down = self.down.read().expect("lock poisoned");
            if node.addresses.iter().any(|a| down.contains(a)) {
                return Err(unreachable());
            }
        }
        let peers = self.peers.read().expect("lock poisoned");
        node.addresses
            .iter()
            .find_map(|a| peers.get(a).cloned())
            .ok_or_else(unreachable)
    }
}

#[async_trait]
impl RemoteClient for InProcessClient {
    async fn head(&self, node: &NodeInfo, address: &Address, raw: bool, cancel: &CancelToken) -> ServiceResult<Header> {
        Ok(self.peer(node, cancel).await?.head(address, raw)?)
    }

    async fn put(&self, node: &NodeInfo, object: &Object, cancel: &CancelToken) -> ServiceResult<()> {
        let engine = self.peer(node, cancel).await?;
        validate(object)?;
        Ok(engine.put(object)?)
    }

    async fn get_range(
        &self,
        node: &NodeInfo,
        address: &Address,
        range: PayloadRange,
        cancel: &CancelToken,
    ) -> ServiceResult<Vec<u8>> {
        Ok(self.peer(node, cancel).await?.get_range(address, range)?)
    }

    async fn range_hash(
        &self,
        node: &NodeInfo,
        address: &Address,
        range: PayloadRange,
        kind: ChecksumType,
        cancel: &CancelToken,
    ) -> ServiceResult<Checksum> {
        let data = self.peer(node, cancel).await?.get_range(address, range)?;
        Ok(checksum_of(kind, &data))
    }
}
