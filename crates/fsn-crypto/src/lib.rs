//! Hashing primitives for FSN.
//!
//! - [`ContentHasher`]: domain-separated BLAKE3 used to derive object ids
//!   from finalized headers, and the 64-bit hash used for shard ranking
//! - [`PayloadHasher`]: streaming SHA-256 plus Tillich-Zémor over a payload
//! - [`tz`]: the homomorphic hash itself: `H(a || b) = H(a) · H(b)`

pub mod hasher;
pub mod payload;
pub mod tz;

pub use hasher::{hash64, ContentHasher, HasherError};
pub use payload::{checksum_of, verify_checksum, PayloadHasher};
pub use tz::{TzHash, TzHasher};
