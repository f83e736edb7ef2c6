use std::sync::Arc;

use fsn_types::{Address, Header};

use crate::cancel::CancelToken;
use crate::context::ServiceContext;
use crate::error::ServiceResult;
use crate::source::Query;

#[derive(Clone, Debug)]
pub struct HeadRequest {
    pub address: Address,
    /// Report split info for virtual objects instead of the parent header.
    pub raw: bool,
    /// Only ask this node.
    pub local: bool,
}

impl HeadRequest {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            raw: false,
            local: false,
        }
    }

    pub fn raw(mut self) -> Self {
        self.raw = true;
        self
    }

    pub fn local(mut self) -> Self {
        self.local = true;
        self
    }
}

/// Distributed header lookup. One answering node is enough.
#[derive(Clone)]
pub struct HeadService {
    ctx: Arc<ServiceContext>,
}

impl HeadService {
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        Self { ctx }
    }

    pub async fn head(&self, request: &HeadRequest, cancel: &CancelToken) -> ServiceResult<Header> {
        self.ctx
            .first_answer(&request.address, &Query::Head { raw: request.raw }, request.local, cancel)
            .await?
            .into_header()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::test_util::Cluster;
    use fsn_types::SplitInfo;

    #[tokio::test]
    async fn finds_header_on_remote_node() {
        let cluster = Cluster::new(3, &[3]);
        let obj = cluster.object(b"hello");
        cluster.engine(2).put(&obj).unwrap();

        let head = HeadService::new(cluster.context(0));
        let header = head
            .head(&HeadRequest::new(obj.address()), &CancelToken::never())
            .await
            .unwrap();
        assert_eq!(header, obj.header);
    }

    #[tokio::test]
    async fn unreachable_nodes_are_skipped() {
        let cluster = Cluster::new(3, &[3]);
        let obj = cluster.object(b"hello");
        cluster.engine(2).put(&obj).unwrap();
        cluster.client.set_down(&cluster.nodes[1], true);

        let head = HeadService::new(cluster.context(0));
        assert!(head
            .head(&HeadRequest::new(obj.address()), &CancelToken::never())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn missing_everywhere_is_incomplete() {
        let cluster = Cluster::new(3, &[2]);
        let obj = cluster.object(b"nowhere");
        let head = HeadService::new(cluster.context(0));
        assert!(matches!(
            head.head(&HeadRequest::new(obj.address()), &CancelToken::never()).await,
            Err(ServiceError::IncompleteOperation { .. })
        ));
    }

    #[tokio::test]
    async fn removal_is_reported() {
        let cluster = Cluster::new(2, &[2]);
        let obj = cluster.object(b"gone");
        cluster.engine(1).put(&obj).unwrap();
        cluster.engine(1).delete(&obj.address()).unwrap();
        let head = HeadService::new(cluster.context(0));
        assert!(matches!(
            head.head(&HeadRequest::new(obj.address()), &CancelToken::never()).await,
            Err(ServiceError::AlreadyRemoved(_))
        ));
    }

    #[tokio::test]
    async fn split_info_is_merged_across_nodes() {
        let cluster = Cluster::new(2, &[2]);
        let (parent, children, link) = cluster.split_object(&[7u8; 40], 16).await;
        // last child on node 0, linking object on node 1
        cluster.engine(0).put(children.last().unwrap()).unwrap();
        cluster.engine(1).put(&link).unwrap();

        let head = HeadService::new(cluster.context(0));
        let err = head
            .head(&HeadRequest::new(parent).raw(), &CancelToken::never())
            .await
            .unwrap_err();
        match err {
            ServiceError::SplitInfo(SplitInfo { last_part, link: l, .. }) => {
                assert_eq!(last_part, Some(children.last().unwrap().id));
                assert_eq!(l, Some(link.id));
            }
            other => panic!("expected split info, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn local_flag_stays_on_this_node() {
        let cluster = Cluster::new(2, &[2]);
        let obj = cluster.object(b"remote only");
        cluster.engine(1).put(&obj).unwrap();
        let head = HeadService::new(cluster.context(0));
        let result = head
            .head(&HeadRequest::new(obj.address()).local(), &CancelToken::never())
            .await;
        assert!(matches!(result, Err(ServiceError::IncompleteOperation { .. })));
    }
}
