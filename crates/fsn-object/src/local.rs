use std::sync::Arc;

use async_trait::async_trait;
use fsn_engine::StorageEngine;
use fsn_types::Object;
use tracing::debug;

use crate::error::ObjectResult;
use crate::format::validate;
use crate::target::ObjectSink;

/// Sink storing finished objects in the local engine.
#[derive(Clone)]
pub struct LocalTarget {
    engine: Arc<StorageEngine>,
}

impl LocalTarget {
    pub fn new(engine: Arc<StorageEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl ObjectSink for LocalTarget {
    async fn write_object(&mut self, object: Object) -> ObjectResult<()> {
        validate(&object)?;
        self.engine.put(&object)?;
        debug!(address = %object.address(), size = object.payload.len(), "stored locally");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::build;
    use crate::target::ObjectTarget;
    use crate::transformer::PayloadSizeLimiter;
    use crate::ObjectError;
    use fsn_engine::EngineConfig;
    use fsn_types::{Address, ContainerId, Header, OwnerId};

    fn engine() -> Arc<StorageEngine> {
        Arc::new(StorageEngine::open(&EngineConfig::in_memory(3)).unwrap())
    }

    fn header() -> Header {
        Header::new(ContainerId::from_hash([3; 32]), OwnerId::from_hash([4; 32]))
    }

    #[tokio::test]
    async fn stores_valid_object() {
        let engine = engine();
        let obj = build(header(), b"payload".to_vec(), 1).unwrap();
        LocalTarget::new(engine.clone()).write_object(obj.clone()).await.unwrap();
        assert_eq!(engine.get(&obj.address()).unwrap(), obj);
    }

    #[tokio::test]
    async fn rejects_tampered_object() {
        let engine = engine();
        let mut obj = build(header(), b"payload".to_vec(), 1).unwrap();
        obj.payload[0] ^= 0xff;
        let err = LocalTarget::new(engine.clone()).write_object(obj.clone()).await;
        assert!(matches!(err, Err(ObjectError::ChecksumMismatch { .. })));
        assert!(!engine.exists(&obj.address()).unwrap());
    }

    #[tokio::test]
    async fn split_write_exposes_virtual_parent() {
        let engine = engine();
        let mut target = PayloadSizeLimiter::new(LocalTarget::new(engine.clone()), 4, 1);
        target.write_header(header()).unwrap();
        target.write_chunk(b"0123456789").await.unwrap();
        let ids = target.close().await.unwrap();

        let parent = Address::new(ContainerId::from_hash([3; 32]), ids.parent_id.unwrap());
        match engine.head(&parent, true) {
            Err(fsn_engine::EngineError::SplitInfo(info)) => {
                assert_eq!(info.link, Some(ids.self_id));
                assert!(info.last_part.is_some());
            }
            other => panic!("expected split info, got {other:?}"),
        }
        assert_eq!(engine.head(&parent, false).unwrap(), ids.parent_header.unwrap());
    }
}
