//! Range reads across a split chain.
//!
//! Children of a split object are only linked backwards, so a range is
//! resolved starting from the last child: headers are fetched walking
//! `previous` until the left edge of the range is covered, then the
//! per-child sub-ranges are read left to right.

use fsn_types::{Header, ObjectId, PayloadRange};

use crate::error::{ObjectError, ObjectResult};

/// What the caller has to do next.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RangeStep {
    /// Fetch the header of this child and pass it to
    /// [`RangeTraverser::push_header`].
    Header(ObjectId),
    /// Read `range` of this child's payload and report the byte count to
    /// [`RangeTraverser::push_success_size`].
    Read { id: ObjectId, range: PayloadRange },
    Done,
}

#[derive(Clone, Copy, Debug)]
struct Bounds {
    left: u64,
    right: u64,
}

#[derive(Debug)]
struct Node {
    id: Option<ObjectId>,
    /// Known once the node's header has been seen.
    bounds: Option<Bounds>,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Arena of chain nodes discovered so far, right to left.
#[derive(Debug)]
pub struct RangeTraverser {
    nodes: Vec<Node>,
    current: usize,
    seek: Bounds,
}

impl RangeTraverser {
    /// Start from the last child of a parent of `origin_size` bytes.
    pub fn new(
        origin_size: u64,
        right_id: ObjectId,
        right_size: u64,
        right_previous: Option<ObjectId>,
        range: PayloadRange,
    ) -> ObjectResult<Self> {
        let end = range
            .end()
            .filter(|end| *end <= origin_size)
            .ok_or(ObjectError::OutOfRange {
                range,
                size: origin_size,
            })?;
        if right_size > origin_size {
            return Err(ObjectError::Malformed(format!(
                "last child holds {right_size} bytes of a {origin_size} byte object"
            )));
        }
        let right = Node {
            id: Some(right_id),
            bounds: Some(Bounds {
                left: origin_size - right_size,
                right: origin_size,
            }),
            prev: Some(1),
            next: None,
        };
        let left = Node {
            id: right_previous,
            bounds: None,
            prev: None,
            next: Some(0),
        };
        Ok(Self {
            nodes: vec![right, left],
            current: 0,
            seek: Bounds {
                left: range.offset,
                right: end,
            },
        })
    }

    /// Same as [`RangeTraverser::new`] with the last child's header.
    pub fn from_last_child(
        origin_size: u64,
        right_id: ObjectId,
        right: &Header,
        range: PayloadRange,
    ) -> ObjectResult<Self> {
        Self::new(origin_size, right_id, right.payload_length, right.previous(), range)
    }

    fn bounds(&self, index: usize) -> ObjectResult<Bounds> {
        self.nodes[index]
            .bounds
            .ok_or_else(|| ObjectError::Malformed("chain node visited before its header".into()))
    }

    fn prev_id(&self) -> ObjectResult<ObjectId> {
        self.nodes[self.current]
            .prev
            .and_then(|p| self.nodes[p].id)
            .ok_or_else(|| ObjectError::Malformed("split chain ends before the requested range".into()))
    }

    pub fn next_step(&self) -> ObjectResult<RangeStep> {
        if self.seek.left >= self.seek.right {
            return Ok(RangeStep::Done);
        }
        let bounds = self.bounds(self.current)?;
        if bounds.left > self.seek.left {
            return Ok(RangeStep::Header(self.prev_id()?));
        }
        let id = self.nodes[self.current]
            .id
            .ok_or_else(|| ObjectError::Malformed("chain node without id".into()))?;
        Ok(RangeStep::Read {
            id,
            range: PayloadRange::new(
                self.seek.left - bounds.left,
                bounds.right.min(self.seek.right) - self.seek.left,
            ),
        })
    }

    /// Record the header of the child requested by [`RangeStep::Header`].
    pub fn push_header(&mut self, id: ObjectId, size: u64, previous: Option<ObjectId>) -> ObjectResult<()> {
        let expected = self.prev_id()?;
        if id != expected {
            return Err(ObjectError::ChainBroken { expected, actual: id });
        }
        let current = self.bounds(self.current)?;
        let left = current.left.checked_sub(size).ok_or_else(|| {
            ObjectError::Malformed(format!("child {id} of {size} bytes overflows the parent"))
        })?;
        let Some(index) = self.nodes[self.current].prev else {
            return Err(ObjectError::Malformed("chain node without predecessor".into()));
        };
        self.nodes[index].bounds = Some(Bounds {
            left,
            right: current.left,
        });
        let fresh = self.nodes.len();
        self.nodes.push(Node {
            id: previous,
            bounds: None,
            prev: None,
            next: Some(index),
        });
        self.nodes[index].prev = Some(fresh);
        self.current = index;
        Ok(())
    }

    pub fn push_header_of(&mut self, id: ObjectId, header: &Header) -> ObjectResult<()> {
        self.push_header(id, header.payload_length, header.previous())
    }

    /// Account for `size` bytes read by the last [`RangeStep::Read`].
    pub fn push_success_size(&mut self, size: u64) {
        self.seek.left += size;
        let right = self.nodes[self.current].bounds.map_or(0, |b| b.right);
        if self.seek.left >= right {
            if let Some(next) = self.nodes[self.current].next {
                self.current = next;
            }
        }
    }
}
