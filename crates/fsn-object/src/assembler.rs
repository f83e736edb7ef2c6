use std::collections::HashSet;
use std::sync::Arc;

use fsn_crypto::verify_checksum;
use fsn_engine::{EngineError, StorageEngine};
use fsn_types::{Address, Header, Object, ObjectId, PayloadRange, SplitInfo};
use tracing::debug;

use crate::error::{ObjectError, ObjectResult};
use crate::format::header_id;
use crate::range::{RangeStep, RangeTraverser};

/// Rebuilds split objects from the local engine.
///
/// Regular objects are returned as stored. For a virtual parent the
/// children are found through the linking object if one is stored
/// locally, otherwise by walking `previous` back from the last child.
#[derive(Clone)]
pub struct Assembler {
    engine: Arc<StorageEngine>,
}

impl Assembler {
    pub fn new(engine: Arc<StorageEngine>) -> Self {
        Self { engine }
    }

    pub fn assemble(&self, address: &Address) -> ObjectResult<Object> {
        match self.engine.get(address) {
            Ok(object) => Ok(object),
            Err(EngineError::SplitInfo(info)) => self.assemble_split(address, &info),
            Err(e) => Err(e.into()),
        }
    }

    pub fn assemble_range(&self, address: &Address, range: PayloadRange) -> ObjectResult<Vec<u8>> {
        let info = match self.engine.get_range(address, range) {
            Ok(data) => return Ok(data),
            Err(EngineError::SplitInfo(info)) => info,
            Err(e) => return Err(e.into()),
        };
        let parent = self.engine.head(address, false)?;
        let right = self.last_child(address, &info)?;
        let right_header = self.engine.head(&address.with_object(right), true)?;
        let mut traverser =
            RangeTraverser::from_last_child(parent.payload_length, right, &right_header, range)?;

        let mut data = Vec::with_capacity(range.length as usize);
        loop {
            match traverser.next_step()? {
                RangeStep::Header(id) => {
                    let header = self.engine.head(&address.with_object(id), true)?;
                    traverser.push_header_of(id, &header)?;
                }
                RangeStep::Read { id, range } => {
                    let piece = self.engine.get_range(&address.with_object(id), range)?;
                    traverser.push_success_size(piece.len() as u64);
                    data.extend_from_slice(&piece);
                }
                RangeStep::Done => return Ok(data),
            }
        }
    }

    fn assemble_split(&self, address: &Address, info: &SplitInfo) -> ObjectResult<Object> {
        let (children, parent) = self.children(address, info)?;
        debug!(%address, children = children.len(), "assembling split object");

        let mut payload = Vec::with_capacity(parent.payload_length as usize);
        for child in &children {
            let object = self.engine.get(&address.with_object(*child))?;
            payload.extend_from_slice(&object.payload);
        }

        if payload.len() as u64 != parent.payload_length {
            return Err(ObjectError::Malformed(format!(
                "children hold {} bytes, parent declares {}",
                payload.len(),
                parent.payload_length
            )));
        }
        if let Some(sum) = &parent.payload_checksum {
            if !verify_checksum(sum, &payload) {
                return Err(ObjectError::ChecksumMismatch { kind: sum.kind });
            }
        }
        let computed = header_id(&parent)?;
        if computed != address.object() {
            return Err(ObjectError::IdMismatch {
                claimed: address.object(),
                computed,
            });
        }
        Ok(Object::new(address.object(), parent, payload))
    }

    /// Ordered child ids and the parent header.
    fn children(&self, address: &Address, info: &SplitInfo) -> ObjectResult<(Vec<ObjectId>, Header)> {
        if let Some(link) = info.link {
            match self.engine.head(&address.with_object(link), true) {
                Ok(header) => {
                    let parent = header
                        .parent_header()
                        .cloned()
                        .ok_or_else(|| ObjectError::Malformed("linking object without parent header".into()))?;
                    return Ok((header.children().to_vec(), parent));
                }
                Err(EngineError::NotFound(_)) if info.last_part.is_some() => {}
                Err(e) => return Err(e.into()),
            }
        }
        let last = info.last_part.ok_or(ObjectError::NotFound(*address))?;
        let tail = self.engine.head(&address.with_object(last), true)?;
        let parent = tail
            .parent_header()
            .cloned()
            .ok_or_else(|| ObjectError::Malformed("last child without parent header".into()))?;

        let mut chain = vec![last];
        let mut seen = HashSet::from([last]);
        let mut previous = tail.previous();
        while let Some(id) = previous {
            if !seen.insert(id) {
                return Err(ObjectError::Malformed(format!("split chain loops at {id}")));
            }
            chain.push(id);
            previous = self.engine.head(&address.with_object(id), true)?.previous();
        }
        chain.reverse();
        Ok((chain, parent))
    }

    /// Id of the last child, from split info or the linking object.
    fn last_child(&self, address: &Address, info: &SplitInfo) -> ObjectResult<ObjectId> {
        if let Some(last) = info.last_part {
            return Ok(last);
        }
        let link = info.link.ok_or(ObjectError::NotFound(*address))?;
        let header = self.engine.head(&address.with_object(link), true)?;
        header
            .children()
            .last()
            .copied()
            .ok_or_else(|| ObjectError::Malformed("linking object without children".into()))
    }
}
