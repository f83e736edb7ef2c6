//! Payload size limiter.
//!
//! Cuts a streamed payload into children of at most `max_size` bytes. A
//! payload that fits is written as a single object. A larger one becomes a
//! chain: every child points at its predecessor, the last child carries the
//! finalized header of the virtual parent, and a linking object listing the
//! children in order is written last. The parent itself is never stored.

use async_trait::async_trait;
use fsn_crypto::PayloadHasher;
use fsn_types::{Header, ObjectId, SplitHeader, SplitId};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ObjectError, ObjectResult};
use crate::format::{build, finalize_header, header_id, seal};
use crate::target::{AccessIdentifiers, ObjectSink, ObjectTarget};

/// Upper bound on the payload of one stored object.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformerConfig {
    pub max_object_size: u64,
}

impl Default for TransformerConfig {
    fn default() -> Self {
        Self {
            max_object_size: 64 * 1024 * 1024,
        }
    }
}

/// [`ObjectTarget`] that splits oversized payloads into a child chain.
pub struct PayloadSizeLimiter<S> {
    sink: S,
    max_size: u64,
    epoch: u64,
    /// Header as written by the caller; becomes the parent when split.
    original: Option<Header>,
    current: Option<Header>,
    payload: Vec<u8>,
    /// Bytes in the current child.
    written: u64,
    child_hasher: PayloadHasher,
    parent_hasher: PayloadHasher,
    children: Vec<ObjectId>,
    split_id: Option<SplitId>,
    closed: bool,
}

impl<S: ObjectSink> PayloadSizeLimiter<S> {
    /// `max_size` is clamped to at least one byte.
    pub fn new(sink: S, max_size: u64, epoch: u64) -> Self {
        Self {
            sink,
            max_size: max_size.max(1),
            epoch,
            original: None,
            current: None,
            payload: Vec::new(),
            written: 0,
            child_hasher: PayloadHasher::new(),
            parent_hasher: PayloadHasher::new(),
            children: Vec::new(),
            split_id: None,
            closed: false,
        }
    }

    pub fn with_config(sink: S, config: &TransformerConfig, epoch: u64) -> Self {
        Self::new(sink, config.max_object_size, epoch)
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    fn check_open(&self) -> ObjectResult<()> {
        if self.closed {
            return Err(ObjectError::Closed);
        }
        if self.current.is_none() {
            return Err(ObjectError::HeaderNotWritten);
        }
        Ok(())
    }

    /// Header of the next child after `previous`.
    fn next_child(&self, previous: ObjectId) -> ObjectResult<Header> {
        let original = self.original.as_ref().ok_or(ObjectError::HeaderNotWritten)?;
        let mut header = Header::new(original.container_id, original.owner_id)
            .with_type(original.object_type);
        header.split = Some(SplitHeader {
            split_id: self.split_id,
            previous: Some(previous),
            ..SplitHeader::default()
        });
        Ok(header)
    }

    /// Current child is full and more data follows.
    async fn cut(&mut self) -> ObjectResult<()> {
        if self.split_id.is_none() {
            let split_id = SplitId::new();
            self.split_id = Some(split_id);
            if let Some(first) = self.current.as_mut() {
                first.attributes.clear();
                first.split = Some(SplitHeader {
                    split_id: Some(split_id),
                    ..SplitHeader::default()
                });
            }
            debug!(%split_id, "payload exceeds object size limit, splitting");
        }
        let id = self.release(None).await?;
        self.children.push(id);
        self.current = Some(self.next_child(id)?);
        Ok(())
    }

    /// Finalize the current child, optionally attaching the parent, and
    /// hand it to the sink.
    async fn release(&mut self, parent: Option<(ObjectId, &Header)>) -> ObjectResult<ObjectId> {
        let mut header = self.current.take().ok_or(ObjectError::HeaderNotWritten)?;
        if let (Some((parent_id, parent_header)), Some(split)) = (parent, header.split.as_mut()) {
            split.parent = Some(parent_id);
            split.parent_header = Some(Box::new(parent_header.clone()));
        }
        finalize_header(&mut header, &self.child_hasher, self.epoch);
        let object = seal(header, std::mem::take(&mut self.payload))?;
        let id = object.id;
        self.sink.write_object(object).await?;
        self.child_hasher = PayloadHasher::new();
        self.written = 0;
        Ok(id)
    }
}

#[async_trait]
impl<S: ObjectSink> ObjectTarget for PayloadSizeLimiter<S> {
    fn write_header(&mut self, header: Header) -> ObjectResult<()> {
        if self.closed {
            return Err(ObjectError::Closed);
        }
        if self.original.is_some() {
            return Err(ObjectError::HeaderAlreadyWritten);
        }
        let mut current = header.clone();
        current.split = None;
        self.original = Some(header);
        self.current = Some(current);
        Ok(())
    }

    async fn write_chunk(&mut self, chunk: &[u8]) -> ObjectResult<()> {
        self.check_open()?;
        let mut rest = chunk;
        while !rest.is_empty() {
            if self.written == self.max_size {
                self.cut().await?;
            }
            let room = (self.max_size - self.written).min(rest.len() as u64) as usize;
            let (head, tail) = rest.split_at(room);
            self.child_hasher.update(head);
            self.parent_hasher.update(head);
            self.payload.extend_from_slice(head);
            self.written += room as u64;
            rest = tail;
        }
        Ok(())
    }

    async fn close(&mut self) -> ObjectResult<AccessIdentifiers> {
        self.check_open()?;
        self.closed = true;

        let Some(split_id) = self.split_id else {
            let id = self.release(None).await?;
            return Ok(AccessIdentifiers {
                self_id: id,
                parent_id: None,
                parent_header: None,
            });
        };

        let mut parent = self.original.clone().ok_or(ObjectError::HeaderNotWritten)?;
        parent.split = None;
        finalize_header(&mut parent, &self.parent_hasher, self.epoch);
        let parent_id = header_id(&parent)?;

        let last = self.release(Some((parent_id, &parent))).await?;
        self.children.push(last);

        let mut link = Header::new(parent.container_id, parent.owner_id).with_type(parent.object_type);
        link.split = Some(SplitHeader {
            split_id: Some(split_id),
            previous: None,
            parent: Some(parent_id),
            parent_header: Some(Box::new(parent.clone())),
            children: self.children.clone(),
        });
        let link = build(link, Vec::new(), self.epoch)?;
        let link_id = link.id;
        self.sink.write_object(link).await?;

        debug!(
            parent = %parent_id,
            link = %link_id,
            children = self.children.len(),
            size = parent.payload_length,
            "split object written"
        );
        Ok(AccessIdentifiers {
            self_id: link_id,
            parent_id: Some(parent_id),
            parent_header: Some(parent),
        })
    }
}
