//! Local storage shard for the FSN node.
//!
//! A [`Shard`] is one independently managed storage partition. It pairs a
//! [`Metabase`] (object headers, split info, graveyard, container sizes)
//! with a [`BlobStore`] holding encoded objects, and optionally fronts the
//! blob store with a bounded [`WriteCache`].
//!
//! # Persistence Backends
//!
//! The metabase sits on any [`KvStore`]:
//!
//! - [`MemoryKv`] -- `BTreeMap`-based store for tests and ephemeral shards
//! - [`LogKv`] -- append-only CRC-framed log replayed on open
//!
//! Blobs go to any [`BlobStore`]:
//!
//! - [`MemoryBlobStore`] -- `HashMap`-based store
//! - [`FsTree`] -- one file per object in a hashed directory tree
//!
//! # Design Rules
//!
//! 1. Objects are write-once per address; a second put is a no-op.
//! 2. Write-then-link: the blob is stored before the metabase records it.
//! 3. Inhumed addresses answer "already removed", never "not found".
//! 4. Every method takes `&self`; each component owns its locking.

pub mod error;
pub mod fstree;
pub mod log;
pub mod memory;
pub mod metabase;
pub mod shard;
pub mod traits;
pub mod write_cache;

pub use error::{ShardError, ShardResult};
pub use fstree::FsTree;
pub use log::LogKv;
pub use memory::{MemoryBlobStore, MemoryKv};
pub use metabase::Metabase;
pub use shard::{Shard, ShardConfig, ShardId, ShardInfo};
pub use traits::{BlobStore, KvBatch, KvStore};
pub use write_cache::WriteCache;
