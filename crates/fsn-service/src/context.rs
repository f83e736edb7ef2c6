use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use fsn_engine::StorageEngine;
use fsn_placement::{
    ContainerSource, LocalInfo, LocalPlacementBuilder, NodeInfo, PlacementBuilder, SuccessPolicy, Traverser,
};
use fsn_types::{Address, SplitInfoCollector};
use futures::future::join_all;
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::client::RemoteClient;
use crate::error::{ServiceError, ServiceResult};
use crate::source::{Answer, Query, Source};

/// Collaborators shared by the distributed operations of one node.
pub struct ServiceContext {
    pub engine: Arc<StorageEngine>,
    pub client: Arc<dyn RemoteClient>,
    pub local: LocalInfo,
    pub containers: Arc<dyn ContainerSource>,
    pub builder: Arc<dyn PlacementBuilder>,
    epoch: AtomicU64,
}

impl ServiceContext {
    pub fn new(
        engine: Arc<StorageEngine>,
        client: Arc<dyn RemoteClient>,
        local: LocalInfo,
        containers: Arc<dyn ContainerSource>,
        builder: Arc<dyn PlacementBuilder>,
    ) -> Self {
        Self {
            engine,
            client,
            local,
            containers,
            builder,
            epoch: AtomicU64::new(0),
        }
    }

    /// Epoch stamped on newly created objects.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Relaxed)
    }

    pub fn set_epoch(&self, epoch: u64) {
        self.epoch.store(epoch, Ordering::Relaxed);
    }

    pub fn source<'a>(&'a self, node: &'a NodeInfo) -> Source<'a> {
        Source::resolve(node, &self.local, &self.engine, self.client.as_ref())
    }

    /// Traverser over the object's placement. `local_only` restricts it to
    /// this node.
    pub fn traverser(&self, address: &Address, success: SuccessPolicy, local_only: bool) -> ServiceResult<Traverser> {
        let container = self.containers.get(&address.container())?;
        let traverser = if local_only {
            let builder = LocalPlacementBuilder::new(self.builder.clone(), self.local.clone());
            Traverser::new(&builder, address, &container.policy, success)?
        } else {
            Traverser::new(self.builder.as_ref(), address, &container.policy, success)?
        };
        Ok(traverser)
    }

    /// Run `op` against every node of `batch` concurrently.
    ///
    /// Per-node failures are returned, never propagated; only cancellation
    /// aborts the batch.
    pub(crate) async fn run_batch<'a, F, Fut, T>(
        &'a self,
        batch: &'a [NodeInfo],
        cancel: &CancelToken,
        op: F,
    ) -> ServiceResult<Vec<ServiceResult<T>>>
    where
        F: Fn(Source<'a>) -> Fut,
        Fut: Future<Output = ServiceResult<T>>,
    {
        let calls = batch.iter().map(|node| op(self.source(node)));
        cancel.guard(join_all(calls)).await
    }

    /// Ask the object's placement until one node answers.
    ///
    /// Split info from several nodes is merged, and is reported when no
    /// node holds the object itself. A removal reported by any node wins
    /// over "not found".
    pub async fn first_answer(
        &self,
        address: &Address,
        query: &Query,
        local_only: bool,
        cancel: &CancelToken,
    ) -> ServiceResult<Answer> {
        let mut traverser = self.traverser(address, SuccessPolicy::Flat(1), local_only)?;
        let mut split = SplitInfoCollector::new();
        let mut removed = false;
        let mut answer = None;

        loop {
            let batch = traverser.next();
            if batch.is_empty() {
                break;
            }
            let results = self
                .run_batch(&batch, cancel, |source| async move { source.query(address, query, cancel).await })
                .await?;
            for (node, result) in batch.iter().zip(results) {
                match result {
                    Ok(a) => {
                        if answer.is_none() {
                            answer = Some(a);
                            traverser.submit_success();
                        }
                    }
                    Err(ServiceError::SplitInfo(info)) => {
                        split.add(&info);
                    }
                    Err(ServiceError::AlreadyRemoved(_)) => removed = true,
                    Err(ServiceError::NotFound(_)) => debug!(%address, %node, "object not on node"),
                    Err(ServiceError::Cancelled) => return Err(ServiceError::Cancelled),
                    Err(e) => warn!(%address, %node, error = %e, "node request failed"),
                }
            }
            if traverser.success() || removed || split.is_complete() {
                break;
            }
        }

        if let Some(answer) = answer {
            return Ok(answer);
        }
        if removed {
            return Err(ServiceError::AlreadyRemoved(*address));
        }
        match split.into_inner() {
            Some(info) => Err(ServiceError::SplitInfo(info)),
            None => Err(ServiceError::IncompleteOperation {
                address: *address,
                reason: "no node in the placement answered".into(),
            }),
        }
    }
}
