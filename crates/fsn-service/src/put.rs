use std::sync::Arc;

use async_trait::async_trait;
use fsn_object::format::validate;
use fsn_object::{AccessIdentifiers, ObjectResult, ObjectSink, ObjectTarget, PayloadSizeLimiter};
use fsn_placement::SuccessPolicy;
use fsn_types::{Header, Object};
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::context::ServiceContext;
use crate::error::{ServiceError, ServiceResult};

/// Sink that replicates each finished object over its placement.
///
/// Every node that stores the object counts one success for its group;
/// the write fails once the groups run out before every group reached its
/// replica count.
pub struct DistributeTarget {
    ctx: Arc<ServiceContext>,
    cancel: CancelToken,
    local: bool,
}

impl DistributeTarget {
    pub fn new(ctx: Arc<ServiceContext>, cancel: CancelToken, local: bool) -> Self {
        Self { ctx, cancel, local }
    }

    async fn distribute(&self, object: &Object) -> ServiceResult<()> {
        let address = object.address();
        // the local placement is a single node, one copy is all it can hold
        let success = if self.local {
            SuccessPolicy::Flat(1)
        } else {
            SuccessPolicy::PerGroup
        };
        let mut traverser = self.ctx.traverser(&address, success, self.local)?;
        let cancel = &self.cancel;

        loop {
            let batch = traverser.next();
            if batch.is_empty() {
                break;
            }
            let results = self
                .ctx
                .run_batch(&batch, cancel, |source| async move { source.put(object, cancel).await })
                .await?;
            for (node, result) in batch.iter().zip(results) {
                match result {
                    Ok(()) => traverser.submit_success(),
                    Err(ServiceError::Cancelled) => return Err(ServiceError::Cancelled),
                    Err(e) => warn!(%address, %node, error = %e, "could not put object to node"),
                }
            }
            if traverser.success() {
                break;
            }
        }

        if !traverser.success() {
            return Err(ServiceError::IncompleteOperation {
                address,
                reason: "placement exhausted before every replica was written".into(),
            });
        }
        debug!(%address, "object distributed");
        Ok(())
    }
}

#[async_trait]
impl ObjectSink for DistributeTarget {
    async fn write_object(&mut self, object: Object) -> ObjectResult<()> {
        validate(&object)?;
        Ok(self.distribute(&object).await?)
    }
}

/// Entry point for client writes: splits the payload and distributes
/// every resulting object.
#[derive(Clone)]
pub struct PutService {
    ctx: Arc<ServiceContext>,
    max_object_size: u64,
}

impl PutService {
    pub fn new(ctx: Arc<ServiceContext>, max_object_size: u64) -> Self {
        Self { ctx, max_object_size }
    }

    /// Streaming writer for one object.
    pub fn start(&self, local: bool, cancel: CancelToken) -> PayloadSizeLimiter<DistributeTarget> {
        let sink = DistributeTarget::new(self.ctx.clone(), cancel, local);
        PayloadSizeLimiter::new(sink, self.max_object_size, self.ctx.epoch())
    }

    /// Write a complete payload in one call.
    pub async fn put(
        &self,
        header: Header,
        payload: &[u8],
        local: bool,
        cancel: CancelToken,
    ) -> ServiceResult<AccessIdentifiers> {
        let mut target = self.start(local, cancel);
        target.write_header(header)?;
        target.write_chunk(payload).await?;
        Ok(target.close().await?)
    }
}
