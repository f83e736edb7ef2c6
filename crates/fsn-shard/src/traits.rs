use fsn_types::Address;
use serde::{Deserialize, Serialize};

use crate::error::ShardResult;

/// One mutation inside a [`KvBatch`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum KvOp {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

/// Ordered set of mutations applied atomically by [`KvStore::apply`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KvBatch {
    ops: Vec<KvOp>,
}

impl KvBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.ops.push(KvOp::Put(key.into(), value.into()));
    }

    pub fn delete(&mut self, key: impl Into<Vec<u8>>) {
        self.ops.push(KvOp::Delete(key.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn into_ops(self) -> Vec<KvOp> {
        self.ops
    }
}

/// Ordered byte-keyed store backing a shard's metabase.
///
/// Implementations must be safe for concurrent use and must apply a batch
/// atomically: after a crash either every op of a batch is visible or none.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &[u8]) -> ShardResult<Option<Vec<u8>>>;

    /// All pairs whose key starts with `prefix`, in key order.
    fn scan_prefix(&self, prefix: &[u8]) -> ShardResult<Vec<(Vec<u8>, Vec<u8>)>>;

    fn apply(&self, batch: KvBatch) -> ShardResult<()>;

    fn contains(&self, key: &[u8]) -> ShardResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> ShardResult<()> {
        let mut batch = KvBatch::new();
        batch.put(key, value);
        self.apply(batch)
    }

    fn delete(&self, key: &[u8]) -> ShardResult<()> {
        let mut batch = KvBatch::new();
        batch.delete(key);
        self.apply(batch)
    }
}

/// Address-keyed store of encoded objects.
///
/// The store never interprets the bytes it holds. Writing an address that
/// already exists is a no-op.
pub trait BlobStore: Send + Sync {
    /// Returns `Ok(None)` if nothing is stored under the address.
    fn get(&self, address: &Address) -> ShardResult<Option<Vec<u8>>>;

    fn put(&self, address: &Address, data: &[u8]) -> ShardResult<()>;

    /// Returns `true` if the blob existed.
    fn delete(&self, address: &Address) -> ShardResult<bool>;

    fn exists(&self, address: &Address) -> ShardResult<bool>;

    /// Visit every stored address. Iteration stops at the first error.
    fn iterate(&self, f: &mut dyn FnMut(Address) -> ShardResult<()>) -> ShardResult<()>;
}
