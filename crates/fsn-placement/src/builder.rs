use std::sync::Arc;

use fsn_crypto::hash64;
use fsn_types::Address;
use tracing::trace;

use crate::error::{PlacementError, PlacementResult};
use crate::netmap::{LocalInfo, NetmapSource, NodeInfo};
use crate::policy::PlacementPolicy;

/// Computes candidate node groups for an object.
///
/// The outer list follows the policy's replica descriptors, in priority
/// order. Each inner list is ordered by preference for this object.
pub trait PlacementBuilder: Send + Sync {
    fn build_placement(&self, address: &Address, policy: &PlacementPolicy) -> PlacementResult<Vec<Vec<NodeInfo>>>;
}

impl<T: PlacementBuilder + ?Sized> PlacementBuilder for Arc<T> {
    fn build_placement(&self, address: &Address, policy: &PlacementPolicy) -> PlacementResult<Vec<Vec<NodeInfo>>> {
        (**self).build_placement(address, policy)
    }
}

/// Restricts placement to the local node.
///
/// Yields `[[local]]` when the local node appears anywhere in the inner
/// builder's placement, and fails otherwise. Operations built on it never
/// leave the process.
pub struct LocalPlacementBuilder<B> {
    inner: B,
    local: LocalInfo,
}

impl<B: PlacementBuilder> LocalPlacementBuilder<B> {
    pub fn new(inner: B, local: LocalInfo) -> Self {
        Self { inner, local }
    }
}

impl<B: PlacementBuilder> PlacementBuilder for LocalPlacementBuilder<B> {
    fn build_placement(&self, address: &Address, policy: &PlacementPolicy) -> PlacementResult<Vec<Vec<NodeInfo>>> {
        let groups = self.inner.build_placement(address, policy)?;
        groups
            .into_iter()
            .flatten()
            .find(|node| self.local.is_local(node))
            .map(|node| vec![vec![node]])
            .ok_or(PlacementError::LocalNodeNotFound)
    }
}

/// Rendezvous-hash placement over the current network map.
///
/// For replica descriptor `i` every node is scored with
/// `hash64(key || container || i)` and the `count * backup_factor` lowest
/// scores form the container's group. The group is then reordered by
/// `hash64(key || object)` so different objects prefer different members.
pub struct NetmapPlacementBuilder {
    netmap: Arc<dyn NetmapSource>,
}

impl NetmapPlacementBuilder {
    pub fn new(netmap: Arc<dyn NetmapSource>) -> Self {
        Self { netmap }
    }
}

fn rendezvous(node: &NodeInfo, salt: &[u8]) -> u64 {
    let mut data = Vec::with_capacity(node.public_key.len() + salt.len());
    data.extend_from_slice(&node.public_key);
    data.extend_from_slice(salt);
    hash64(&data)
}

impl PlacementBuilder for NetmapPlacementBuilder {
    fn build_placement(&self, address: &Address, policy: &PlacementPolicy) -> PlacementResult<Vec<Vec<NodeInfo>>> {
        if policy.replicas.is_empty() {
            return Err(PlacementError::EmptyPolicy);
        }
        let netmap = self.netmap.current()?;
        let factor = policy.backup_factor.max(1) as usize;
        let object = address.object();

        let mut groups = Vec::with_capacity(policy.replicas.len());
        for (index, replica) in policy.replicas.iter().enumerate() {
            let needed = replica.count as usize;
            if netmap.nodes.len() < needed {
                return Err(PlacementError::NotEnoughNodes {
                    index,
                    needed,
                    available: netmap.nodes.len(),
                });
            }
            let mut salt = address.container().as_bytes().to_vec();
            salt.extend_from_slice(&(index as u64).to_le_bytes());

            let mut group = netmap.nodes.clone();
            group.sort_by_cached_key(|node| (rendezvous(node, &salt), node.public_key.clone()));
            group.truncate((needed * factor).min(netmap.nodes.len()));
            group.sort_by_cached_key(|node| (rendezvous(node, object.as_bytes()), node.public_key.clone()));
            groups.push(group);
        }
        trace!(%address, epoch = netmap.epoch, groups = groups.len(), "placement built");
        Ok(groups)
    }
}
