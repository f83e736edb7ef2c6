use fsn_types::{Header, ObjectId};

/// Domain-separated BLAKE3 content hasher.
///
/// The domain tag is prepended to every hash computation so that a header
/// and, say, a shard id with identical bytes never collide.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for finalized object headers (object ids).
    pub const HEADER: Self = Self {
        domain: "fsn-header-v1",
    };

    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> ObjectId {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        ObjectId::from_hash(*hasher.finalize().as_bytes())
    }

    /// Object id of a finalized header.
    pub fn hash_header(&self, header: &Header) -> Result<ObjectId, HasherError> {
        let data = header
            .to_bytes()
            .map_err(|e| HasherError::Serialization(e.to_string()))?;
        Ok(self.hash(&data))
    }

    pub fn verify(&self, data: &[u8], expected: &ObjectId) -> bool {
        self.hash(data) == *expected
    }

    pub fn domain(&self) -> &str {
        self.domain
    }
}

/// First eight bytes of the BLAKE3 digest as a little-endian integer.
///
/// Used to place addresses and shard ids on the same 64-bit ring.
pub fn hash64(data: &[u8]) -> u64 {
    let digest = blake3::hash(data);
    let mut word = [0u8; 8];
    word.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_le_bytes(word)
}

/// Errors from hashing operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HasherError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid hash length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsn_types::{ContainerId, OwnerId};

    #[test]
    fn hash_is_deterministic() {
        let a = ContentHasher::HEADER.hash(b"hello");
        let b = ContentHasher::HEADER.hash(b"hello");
        assert_eq!(a, b);
    }

    #[test]
    fn domains_separate() {
        let custom = ContentHasher::new("fsn-other-v1");
        assert_ne!(ContentHasher::HEADER.hash(b"x"), custom.hash(b"x"));
        assert_eq!(custom.domain(), "fsn-other-v1");
    }

    #[test]
    fn header_hash_changes_with_content() {
        let h1 = Header::new(ContainerId::from_hash([1; 32]), OwnerId::null());
        let mut h2 = h1.clone();
        h2.payload_length = 1;
        let id1 = ContentHasher::HEADER.hash_header(&h1).unwrap();
        let id2 = ContentHasher::HEADER.hash_header(&h2).unwrap();
        assert_ne!(id1, id2);
        assert!(ContentHasher::HEADER.verify(&h1.to_bytes().unwrap(), &id1));
    }

    #[test]
    fn hash64_is_stable() {
        assert_eq!(hash64(b"shard"), hash64(b"shard"));
        assert_ne!(hash64(b"shard-a"), hash64(b"shard-b"));
    }
}
