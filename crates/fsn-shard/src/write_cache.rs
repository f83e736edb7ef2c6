use std::collections::HashMap;
use std::sync::RwLock;

use fsn_types::Address;
use tracing::info;

use crate::error::ShardResult;
use crate::traits::BlobStore;

/// Bounded cache of freshly written small objects.
///
/// Holds encoded objects until the shard moves them to its main blob
/// store. A put that would exceed either the per-object or the total byte
/// limit is refused and the caller writes through.
///
/// A cache opened with [`WriteCache::persistent`] writes every entry to its
/// backing store before accepting it and reloads the backing store on
/// open, so an accepted object survives a crash.
pub struct WriteCache {
    max_object_size: usize,
    capacity: usize,
    backing: Option<Box<dyn BlobStore>>,
    state: RwLock<CacheState>,
}

#[derive(Default)]
struct CacheState {
    objects: HashMap<Address, Vec<u8>>,
    size: usize,
}

impl WriteCache {
    /// Memory-only cache.
    pub fn new(max_object_size: usize, capacity: usize) -> Self {
        Self {
            max_object_size,
            capacity,
            backing: None,
            state: RwLock::new(CacheState::default()),
        }
    }

    /// Cache backed by `backing`. Entries left there by a previous run
    /// are loaded back, even past `capacity`.
    pub fn persistent(max_object_size: usize, capacity: usize, backing: Box<dyn BlobStore>) -> ShardResult<Self> {
        let mut state = CacheState::default();
        let mut addresses = Vec::new();
        backing.iterate(&mut |address| {
            addresses.push(address);
            Ok(())
        })?;
        for address in addresses {
            if let Some(data) = backing.get(&address)? {
                state.size += data.len();
                state.objects.insert(address, data);
            }
        }
        if !state.objects.is_empty() {
            info!(objects = state.objects.len(), bytes = state.size, "write-cache recovered");
        }
        Ok(Self {
            max_object_size,
            capacity,
            backing: Some(backing),
            state: RwLock::new(state),
        })
    }

    /// Cache `data` under `address`. Returns `Ok(false)` if it does not fit.
    pub fn put(&self, address: &Address, data: &[u8]) -> ShardResult<bool> {
        if data.len() > self.max_object_size {
            return Ok(false);
        }
        let mut state = self.state.write().expect("lock poisoned");
        if state.objects.contains_key(address) {
            return Ok(true);
        }
        if state.size + data.len() > self.capacity {
            return Ok(false);
        }
        if let Some(backing) = &self.backing {
            backing.put(address, data)?;
        }
        state.size += data.len();
        state.objects.insert(*address, data.to_vec());
        Ok(true)
    }

    pub fn get(&self, address: &Address) -> Option<Vec<u8>> {
        let state = self.state.read().expect("lock poisoned");
        state.objects.get(address).cloned()
    }

    pub fn contains(&self, address: &Address) -> bool {
        let state = self.state.read().expect("lock poisoned");
        state.objects.contains_key(address)
    }

    pub fn remove(&self, address: &Address) -> ShardResult<bool> {
        let mut state = self.state.write().expect("lock poisoned");
        let Some(data) = state.objects.remove(address) else {
            return Ok(false);
        };
        state.size -= data.len();
        if let Some(backing) = &self.backing {
            backing.delete(address)?;
        }
        Ok(true)
    }

    /// Copy of every cached entry. The cache itself is left untouched.
    pub fn snapshot(&self) -> Vec<(Address, Vec<u8>)> {
        let state = self.state.read().expect("lock poisoned");
        state.objects.iter().map(|(a, d)| (*a, d.clone())).collect()
    }

    pub fn len(&self) -> usize {
        self.state.read().expect("lock poisoned").objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes currently cached.
    pub fn size(&self) -> usize {
        self.state.read().expect("lock poisoned").size
    }
}

impl std::fmt::Debug for WriteCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteCache")
            .field("objects", &self.len())
            .field("size", &self.size())
            .field("capacity", &self.capacity)
            .field("persistent", &self.backing.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fstree::FsTree;
    use fsn_types::{ContainerId, ObjectId};

    fn addr(n: u8) -> Address {
        Address::new(ContainerId::from_hash([1; 32]), ObjectId::from_hash([n; 32]))
    }

    #[test]
    fn refuses_large_objects() {
        let cache = WriteCache::new(4, 100);
        assert!(!cache.put(&addr(1), b"too large").unwrap());
        assert!(cache.put(&addr(2), b"ok").unwrap());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn refuses_when_full() {
        let cache = WriteCache::new(8, 10);
        assert!(cache.put(&addr(1), &[0; 8]).unwrap());
        assert!(!cache.put(&addr(2), &[0; 8]).unwrap());
        assert_eq!(cache.size(), 8);
    }

    #[test]
    fn duplicate_put_does_not_grow() {
        let cache = WriteCache::new(8, 10);
        assert!(cache.put(&addr(1), &[0; 8]).unwrap());
        assert!(cache.put(&addr(1), &[0; 8]).unwrap());
        assert_eq!(cache.size(), 8);
    }

    #[test]
    fn snapshot_leaves_entries_in_place() {
        let cache = WriteCache::new(8, 100);
        cache.put(&addr(1), b"a").unwrap();
        cache.put(&addr(2), b"b").unwrap();
        let mut snapshot = cache.snapshot();
        snapshot.sort();
        assert_eq!(snapshot, vec![(addr(1), b"a".to_vec()), (addr(2), b"b".to_vec())]);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.size(), 2);
    }

    #[test]
    fn remove_frees_space() {
        let cache = WriteCache::new(8, 8);
        cache.put(&addr(1), &[0; 8]).unwrap();
        assert!(cache.remove(&addr(1)).unwrap());
        assert!(!cache.contains(&addr(1)));
        assert!(cache.put(&addr(2), &[0; 8]).unwrap());
    }

    #[test]
    fn persistent_cache_reloads_entries() {
        let dir = tempfile::tempdir().unwrap();
        let open = || WriteCache::persistent(64, 1024, Box::new(FsTree::open(dir.path(), 1, false).unwrap())).unwrap();
        {
            let cache = open();
            cache.put(&addr(1), b"kept").unwrap();
            cache.put(&addr(2), b"gone").unwrap();
            cache.remove(&addr(2)).unwrap();
        }
        let cache = open();
        assert_eq!(cache.get(&addr(1)), Some(b"kept".to_vec()));
        assert!(!cache.contains(&addr(2)));
        assert_eq!(cache.size(), 4);
    }
}
