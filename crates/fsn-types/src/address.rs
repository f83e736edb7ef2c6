use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::id::{ContainerId, ObjectId};

/// Universal key of an object: the container it belongs to plus its id.
///
/// Equality is byte-exact on both halves. The canonical text form is
/// `<container hex>/<object hex>`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address {
    container: ContainerId,
    object: ObjectId,
}

impl Address {
    /// Encoded length of [`Address::to_bytes`].
    pub const LEN: usize = ContainerId::LEN + ObjectId::LEN;

    pub const fn new(container: ContainerId, object: ObjectId) -> Self {
        Self { container, object }
    }

    pub fn container(&self) -> ContainerId {
        self.container
    }

    pub fn object(&self) -> ObjectId {
        self.object
    }

    /// Returns a sibling address in the same container.
    pub fn with_object(&self, object: ObjectId) -> Self {
        Self::new(self.container, object)
    }

    /// Fixed-width binary form: container bytes followed by object bytes.
    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut out = [0u8; Self::LEN];
        out[..ContainerId::LEN].copy_from_slice(self.container.as_bytes());
        out[ContainerId::LEN..].copy_from_slice(self.object.as_bytes());
        out
    }

    /// Inverse of [`Address::to_bytes`].
    pub fn from_slice(bytes: &[u8]) -> Result<Self, TypeError> {
        if bytes.len() != Self::LEN {
            return Err(TypeError::InvalidLength {
                expected: Self::LEN,
                actual: bytes.len(),
            });
        }
        Ok(Self {
            container: ContainerId::from_slice(&bytes[..ContainerId::LEN])?,
            object: ObjectId::from_slice(&bytes[ContainerId::LEN..])?,
        })
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Address({}/{})",
            self.container.short_hex(),
            self.object.short_hex()
        )
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container, self.object)
    }
}

impl FromStr for Address {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (cid, oid) = s
            .split_once('/')
            .ok_or_else(|| TypeError::InvalidAddress(s.to_string()))?;
        Ok(Self::new(cid.parse()?, oid.parse()?))
    }
}
