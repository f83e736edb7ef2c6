use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use fsn_types::Address;

use crate::error::ShardResult;
use crate::traits::{BlobStore, KvBatch, KvOp, KvStore};

/// In-memory ordered key-value store.
///
/// Backed by a `BTreeMap` behind a `RwLock`, so prefix scans come out in
/// key order. Suitable for tests and ephemeral shards.
pub struct MemoryKv {
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryKv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryKv")
            .field("entries", &self.len())
            .finish()
    }
}

/// Apply a batch to an ordered map. Shared with the log-backed store, which
/// keeps the same map in memory.
pub(crate) fn apply_to_map(map: &mut BTreeMap<Vec<u8>, Vec<u8>>, ops: Vec<KvOp>) {
    for op in ops {
        match op {
            KvOp::Put(k, v) => {
                map.insert(k, v);
            }
            KvOp::Delete(k) => {
                map.remove(&k);
            }
        }
    }
}

pub(crate) fn scan_map(
    map: &BTreeMap<Vec<u8>, Vec<u8>>,
    prefix: &[u8],
) -> Vec<(Vec<u8>, Vec<u8>)> {
    map.range(prefix.to_vec()..)
        .take_while(|(k, _)| k.starts_with(prefix))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

impl KvStore for MemoryKv {
    fn get(&self, key: &[u8]) -> ShardResult<Option<Vec<u8>>> {
        let entries = self.entries.read().expect("lock poisoned");
        Ok(entries.get(key).cloned())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> ShardResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let entries = self.entries.read().expect("lock poisoned");
        Ok(scan_map(&entries, prefix))
    }

    fn apply(&self, batch: KvBatch) -> ShardResult<()> {
        let mut entries = self.entries.write().expect("lock poisoned");
        apply_to_map(&mut entries, batch.into_ops());
        Ok(())
    }
}

/// In-memory blob store keyed by address.
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<Address, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self {
            blobs: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.blobs.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total bytes held across all blobs.
    pub fn total_bytes(&self) -> usize {
        let blobs = self.blobs.read().expect("lock poisoned");
        blobs.values().map(Vec::len).sum()
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBlobStore")
            .field("blob_count", &self.len())
            .finish()
    }
}

impl BlobStore for MemoryBlobStore {
    fn get(&self, address: &Address) -> ShardResult<Option<Vec<u8>>> {
        let blobs = self.blobs.read().expect("lock poisoned");
        Ok(blobs.get(address).cloned())
    }

    fn put(&self, address: &Address, data: &[u8]) -> ShardResult<()> {
        let mut blobs = self.blobs.write().expect("lock poisoned");
        blobs.entry(*address).or_insert_with(|| data.to_vec());
        Ok(())
    }

    fn delete(&self, address: &Address) -> ShardResult<bool> {
        let mut blobs = self.blobs.write().expect("lock poisoned");
        Ok(blobs.remove(address).is_some())
    }

    fn exists(&self, address: &Address) -> ShardResult<bool> {
        let blobs = self.blobs.read().expect("lock poisoned");
        Ok(blobs.contains_key(address))
    }

    fn iterate(&self, f: &mut dyn FnMut(Address) -> ShardResult<()>) -> ShardResult<()> {
        let addresses: Vec<Address> = {
            let blobs = self.blobs.read().expect("lock poisoned");
            blobs.keys().copied().collect()
        };
        for address in addresses {
            f(address)?;
        }
        Ok(())
    }
}
