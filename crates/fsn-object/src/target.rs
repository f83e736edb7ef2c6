use async_trait::async_trait;
use fsn_types::{Header, Object, ObjectId};

use crate::error::ObjectResult;

/// Ids learned from a completed write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessIdentifiers {
    /// The object exposed to the caller: the linking object when the
    /// payload was split, otherwise the only object written.
    pub self_id: ObjectId,
    /// Id of the virtual parent of a split write.
    pub parent_id: Option<ObjectId>,
    pub parent_header: Option<Header>,
}

/// Streaming writer of a single logical object.
#[async_trait]
pub trait ObjectTarget: Send {
    fn write_header(&mut self, header: Header) -> ObjectResult<()>;

    async fn write_chunk(&mut self, chunk: &[u8]) -> ObjectResult<()>;

    async fn close(&mut self) -> ObjectResult<AccessIdentifiers>;
}

/// Destination of finalized objects.
#[async_trait]
pub trait ObjectSink: Send {
    async fn write_object(&mut self, object: Object) -> ObjectResult<()>;
}

/// Sink that keeps every object it receives, in order.
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub objects: Vec<Object>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectSink for CollectingSink {
    async fn write_object(&mut self, object: Object) -> ObjectResult<()> {
        self.objects.push(object);
        Ok(())
    }
}
