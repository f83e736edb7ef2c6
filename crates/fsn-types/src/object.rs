use std::fmt;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::error::TypeError;
use crate::id::{ContainerId, ObjectId, OwnerId};
use crate::split::SplitId;

/// Kind of a stored object.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectType {
    #[default]
    Regular,
    Tombstone,
    StorageGroup,
}

impl ObjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Regular => "REGULAR",
            Self::Tombstone => "TOMBSTONE",
            Self::StorageGroup => "STORAGE_GROUP",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User-supplied key/value pair attached to an object header.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Attribute {
    pub key: String,
    pub value: String,
}

impl Attribute {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Algorithm that produced a [`Checksum`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChecksumType {
    Sha256,
    /// Tillich-Zémor homomorphic hash.
    TillichZemor,
}

/// Payload checksum together with its algorithm.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksum {
    pub kind: ChecksumType,
    pub sum: Vec<u8>,
}

impl Checksum {
    pub fn new(kind: ChecksumType, sum: impl Into<Vec<u8>>) -> Self {
        Self {
            kind,
            sum: sum.into(),
        }
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checksum({:?}, {})", self.kind, hex::encode(&self.sum))
    }
}

/// Chain metadata carried by the pieces of a split object.
///
/// - every child carries `split_id`, and all but the first carry `previous`
/// - the last child and the linking object carry `parent` and `parent_header`
/// - only the linking object carries `children`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitHeader {
    pub split_id: Option<SplitId>,
    pub previous: Option<ObjectId>,
    pub parent: Option<ObjectId>,
    pub parent_header: Option<Box<Header>>,
    pub children: Vec<ObjectId>,
}

impl SplitHeader {
    pub fn is_link(&self) -> bool {
        !self.children.is_empty()
    }
}

/// Object metadata. The object id is the hash of the finalized header.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub container_id: ContainerId,
    pub owner_id: OwnerId,
    pub object_type: ObjectType,
    pub creation_epoch: u64,
    pub payload_length: u64,
    pub payload_checksum: Option<Checksum>,
    pub payload_homomorphic_hash: Option<Checksum>,
    pub attributes: Vec<Attribute>,
    pub split: Option<SplitHeader>,
}

impl Header {
    /// Header of a fresh regular object. Length, checksums and epoch are
    /// filled in when the object is finalized.
    pub fn new(container_id: ContainerId, owner_id: OwnerId) -> Self {
        Self {
            container_id,
            owner_id,
            object_type: ObjectType::Regular,
            creation_epoch: 0,
            payload_length: 0,
            payload_checksum: None,
            payload_homomorphic_hash: None,
            attributes: Vec::new(),
            split: None,
        }
    }

    pub fn with_type(mut self, object_type: ObjectType) -> Self {
        self.object_type = object_type;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push(Attribute::new(key, value));
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.key == key)
            .map(|a| a.value.as_str())
    }

    /// Parent id if this header belongs to a child of a split object.
    pub fn parent(&self) -> Option<ObjectId> {
        self.split.as_ref().and_then(|s| s.parent)
    }

    pub fn previous(&self) -> Option<ObjectId> {
        self.split.as_ref().and_then(|s| s.previous)
    }

    pub fn split_id(&self) -> Option<SplitId> {
        self.split.as_ref().and_then(|s| s.split_id)
    }

    pub fn children(&self) -> &[ObjectId] {
        self.split.as_ref().map_or(&[], |s| s.children.as_slice())
    }

    pub fn parent_header(&self) -> Option<&Header> {
        self.split.as_ref().and_then(|s| s.parent_header.as_deref())
    }

    /// Deterministic binary form used for hashing and persistence.
    pub fn to_bytes(&self) -> Result<Vec<u8>, TypeError> {
        bincode::serialize(self).map_err(|e| TypeError::Serialization(e.to_string()))
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, TypeError> {
        bincode::deserialize(data).map_err(|e| TypeError::Serialization(e.to_string()))
    }
}

/// A finalized object: its id, its header and its payload.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Object {
    pub id: ObjectId,
    pub header: Header,
    pub payload: Vec<u8>,
}

impl Object {
    pub fn new(id: ObjectId, header: Header, payload: Vec<u8>) -> Self {
        Self {
            id,
            header,
            payload,
        }
    }

    pub fn address(&self) -> Address {
        Address::new(self.header.container_id, self.id)
    }

    /// Address of the virtual parent, if this object is a split child.
    pub fn parent_address(&self) -> Option<Address> {
        self.header
            .parent()
            .map(|p| Address::new(self.header.container_id, p))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, TypeError> {
        bincode::serialize(self).map_err(|e| TypeError::Serialization(e.to_string()))
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, TypeError> {
        bincode::deserialize(data).map_err(|e| TypeError::Serialization(e.to_string()))
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("address", &self.address())
            .field("type", &self.header.object_type)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

/// Byte range inside an object payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PayloadRange {
    pub offset: u64,
    pub length: u64,
}

impl PayloadRange {
    pub const fn new(offset: u64, length: u64) -> Self {
        Self { offset, length }
    }

    /// Exclusive end offset, or `None` on overflow.
    pub fn end(&self) -> Option<u64> {
        self.offset.checked_add(self.length)
    }

    /// Whether the range lies inside a payload of `size` bytes.
    pub fn fits(&self, size: u64) -> bool {
        self.end().is_some_and(|end| end <= size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> Header {
        Header::new(ContainerId::from_hash([1; 32]), OwnerId::from_hash([2; 32]))
            .with_attribute("FileName", "cat.jpg")
    }

    #[test]
    fn header_bytes_roundtrip() {
        let h = header();
        let decoded = Header::from_bytes(&h.to_bytes().unwrap()).unwrap();
        assert_eq!(h, decoded);
    }

    #[test]
    fn header_encoding_is_deterministic() {
        assert_eq!(header().to_bytes().unwrap(), header().to_bytes().unwrap());
    }

    #[test]
    fn attribute_lookup() {
        let h = header();
        assert_eq!(h.attribute("FileName"), Some("cat.jpg"));
        assert_eq!(h.attribute("Missing"), None);
    }

    #[test]
    fn split_accessors_default_to_none() {
        let h = header();
        assert!(h.parent().is_none());
        assert!(h.previous().is_none());
        assert!(h.children().is_empty());
        assert!(h.parent_header().is_none());
    }

    #[test]
    fn parent_address_uses_child_container() {
        let mut h = header();
        let parent = ObjectId::from_hash([9; 32]);
        h.split = Some(SplitHeader {
            parent: Some(parent),
            ..Default::default()
        });
        let obj = Object::new(ObjectId::from_hash([3; 32]), h, vec![]);
        let pa = obj.parent_address().unwrap();
        assert_eq!(pa.container(), obj.address().container());
        assert_eq!(pa.object(), parent);
    }

    #[test]
    fn link_detection() {
        let mut split = SplitHeader::default();
        assert!(!split.is_link());
        split.children.push(ObjectId::from_hash([1; 32]));
        assert!(split.is_link());
    }

    #[test]
    fn range_bounds() {
        assert!(PayloadRange::new(0, 10).fits(10));
        assert!(!PayloadRange::new(5, 6).fits(10));
        assert!(!PayloadRange::new(u64::MAX, 2).fits(u64::MAX));
        assert!(PayloadRange::new(10, 0).fits(10));
    }
}
