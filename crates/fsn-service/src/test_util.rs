//! A small in-process cluster for exercising distributed operations.

use std::sync::Arc;

use fsn_engine::{EngineConfig, StorageEngine};
use fsn_object::format::build;
use fsn_object::{CollectingSink, ObjectTarget, PayloadSizeLimiter};
use fsn_placement::{
    ContainerInfo, InMemoryContainerSource, LocalInfo, NodeInfo, PlacementBuilder, PlacementPolicy,
    PlacementResult,
};
use fsn_types::{Address, ContainerId, Header, Object, OwnerId};

use crate::client::InProcessClient;
use crate::context::ServiceContext;

/// Every replica group holds all nodes, in index order.
struct AllNodes(Vec<NodeInfo>);

impl PlacementBuilder for AllNodes {
    fn build_placement(&self, _: &Address, policy: &PlacementPolicy) -> PlacementResult<Vec<Vec<NodeInfo>>> {
        Ok(vec![self.0.clone(); policy.replicas.len()])
    }
}

pub struct Cluster {
    pub cid: ContainerId,
    pub nodes: Vec<NodeInfo>,
    pub engines: Vec<Arc<StorageEngine>>,
    pub client: Arc<InProcessClient>,
    containers: Arc<InMemoryContainerSource>,
    builder: Arc<AllNodes>,
}

impl Cluster {
    pub fn new(size: u8, replicas: &[u32]) -> Self {
        let cid = ContainerId::from_hash([0xc1; 32]);
        let nodes: Vec<NodeInfo> = (0..size)
            .map(|i| NodeInfo::new(vec![i; 33], format!("/ip4/10.0.0.{i}/tcp/8080")))
            .collect();
        let client = Arc::new(InProcessClient::new());
        let engines: Vec<Arc<StorageEngine>> = nodes
            .iter()
            .map(|node| {
                let engine = Arc::new(StorageEngine::open(&EngineConfig::in_memory(2)).unwrap());
                client.register(node, engine.clone());
                engine
            })
            .collect();
        let containers = Arc::new(InMemoryContainerSource::new());
        containers.insert(
            cid,
            ContainerInfo {
                policy: PlacementPolicy::with_replicas(replicas),
                owner: OwnerId::from_hash([0x0a; 32]),
                basic_acl: 0,
            },
        );
        let builder = Arc::new(AllNodes(nodes.clone()));
        Self {
            cid,
            nodes,
            engines,
            client,
            containers,
            builder,
        }
    }

    pub fn engine(&self, i: usize) -> &StorageEngine {
        &self.engines[i]
    }

    /// Service context as seen from node `i`.
    pub fn context(&self, i: usize) -> Arc<ServiceContext> {
        Arc::new(ServiceContext::new(
            self.engines[i].clone(),
            self.client.clone(),
            LocalInfo::new(self.nodes[i].clone()),
            self.containers.clone(),
            self.builder.clone(),
        ))
    }

    pub fn header(&self) -> Header {
        Header::new(self.cid, OwnerId::from_hash([0x0a; 32]))
    }

    pub fn object(&self, payload: &[u8]) -> Object {
        build(self.header(), payload.to_vec(), 1).unwrap()
    }

    /// Split `payload` without storing it. Returns the parent address, the
    /// children in order and the linking object.
    pub async fn split_object(&self, payload: &[u8], max: u64) -> (Address, Vec<Object>, Object) {
        let mut target = PayloadSizeLimiter::new(CollectingSink::new(), max, 1);
        target.write_header(self.header()).unwrap();
        target.write_chunk(payload).await.unwrap();
        let ids = target.close().await.unwrap();
        let mut objects = target.into_sink().objects;
        let link = objects.pop().unwrap();
        (Address::new(self.cid, ids.parent_id.unwrap()), objects, link)
    }
}
