use fsn_types::{Checksum, ChecksumType};
use sha2::{Digest, Sha256};

use crate::tz::TzHasher;

/// Streaming hasher producing both payload checksums of an object.
#[derive(Clone, Default)]
pub struct PayloadHasher {
    sha: Sha256,
    tz: TzHasher,
    written: u64,
}

impl PayloadHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.sha.update(data);
        self.tz.update(data);
        self.written += data.len() as u64;
    }

    /// Bytes fed so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Returns `(sha256, homomorphic)` checksums of everything fed so far.
    pub fn finalize(&self) -> (Checksum, Checksum) {
        let sha = self.sha.clone().finalize();
        (
            Checksum::new(ChecksumType::Sha256, sha.to_vec()),
            Checksum::new(ChecksumType::TillichZemor, self.tz.finalize().to_bytes().to_vec()),
        )
    }
}

/// One-shot checksum of `data` with the given algorithm.
pub fn checksum_of(kind: ChecksumType, data: &[u8]) -> Checksum {
    match kind {
        ChecksumType::Sha256 => Checksum::new(kind, Sha256::digest(data).to_vec()),
        ChecksumType::TillichZemor => {
            let mut tz = TzHasher::new();
            tz.update(data);
            Checksum::new(kind, tz.finalize().to_bytes().to_vec())
        }
    }
}

pub fn verify_checksum(expected: &Checksum, data: &[u8]) -> bool {
    checksum_of(expected.kind, data) == *expected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tz::TzHash;

    #[test]
    fn streaming_matches_one_shot() {
        let mut h = PayloadHasher::new();
        h.update(b"chunk one, ");
        h.update(b"chunk two");
        let (sha, tz) = h.finalize();
        let whole = b"chunk one, chunk two";
        assert_eq!(sha, checksum_of(ChecksumType::Sha256, whole));
        assert_eq!(tz, checksum_of(ChecksumType::TillichZemor, whole));
        assert_eq!(h.written(), whole.len() as u64);
    }

    #[test]
    fn finalize_does_not_consume() {
        let mut h = PayloadHasher::new();
        h.update(b"abc");
        let first = h.finalize();
        h.update(b"def");
        let second = h.finalize();
        assert_ne!(first.0, second.0);
        assert_eq!(second.0, checksum_of(ChecksumType::Sha256, b"abcdef"));
    }

    #[test]
    fn checksum_sizes() {
        let (sha, tz) = PayloadHasher::new().finalize();
        assert_eq!(sha.sum.len(), 32);
        assert_eq!(tz.sum.len(), crate::tz::SIZE);
        assert_eq!(TzHash::from_slice(&tz.sum).unwrap(), TzHash::identity());
    }

    #[test]
    fn verify_detects_tampering() {
        let sum = checksum_of(ChecksumType::Sha256, b"payload");
        assert!(verify_checksum(&sum, b"payload"));
        assert!(!verify_checksum(&sum, b"pay1oad"));
    }
}
