use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use fsn_types::{Address, ContainerId, Header, Object, PayloadRange, SearchFilters};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ShardError, ShardResult};
use crate::fstree::FsTree;
use crate::log::LogKv;
use crate::memory::{MemoryBlobStore, MemoryKv};
use crate::metabase::Metabase;
use crate::traits::BlobStore;
use crate::write_cache::WriteCache;

/// Generated identifier of a shard, persisted in its metabase.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShardId(Uuid);

impl ShardId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    fn from_slice(bytes: &[u8]) -> ShardResult<Self> {
        Uuid::from_slice(bytes)
            .map(Self)
            .map_err(|e| ShardError::Corrupt {
                key: "shard-id".into(),
                reason: e.to_string(),
            })
    }
}

impl Default for ShardId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ShardId({})", self.0)
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ShardId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Configuration of one shard.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShardConfig {
    /// Directory holding the metabase log and the blob tree. `None` keeps
    /// everything in memory.
    pub path: Option<PathBuf>,
    /// Ranking weight. Higher weights push the shard further back in the
    /// visiting order.
    pub weight: u64,
    pub use_write_cache: bool,
    pub write_cache_capacity: usize,
    pub write_cache_max_object_size: usize,
    /// zstd-compress blobs on disk.
    pub compress: bool,
    /// Number of prefix directory levels in the blob tree.
    pub depth: usize,
}

impl Default for ShardConfig {
    fn default() -> Self {
        Self {
            path: None,
            weight: 1,
            use_write_cache: false,
            write_cache_capacity: 64 * 1024 * 1024, // 64 MiB
            write_cache_max_object_size: 128 * 1024, // 128 KiB
            compress: false,
            depth: 2,
        }
    }
}

impl ShardConfig {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }
}

/// Summary of a shard for administrative listings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShardInfo {
    pub id: ShardId,
    pub weight: u64,
    pub path: Option<PathBuf>,
    pub objects: usize,
    pub cached_objects: usize,
    pub containers: usize,
}

/// One local storage partition.
///
/// The blob is written before the metabase records the object, so an
/// object visible through the metabase always has data behind it.
pub struct Shard {
    id: ShardId,
    weight: u64,
    path: Option<PathBuf>,
    metabase: Metabase,
    blobs: Box<dyn BlobStore>,
    write_cache: Option<WriteCache>,
}

impl Shard {
    /// Open or create a shard as described by `config`.
    pub fn open(config: &ShardConfig) -> ShardResult<Self> {
        let (metabase, blobs): (Metabase, Box<dyn BlobStore>) = match &config.path {
            Some(dir) => (
                Metabase::new(Box::new(LogKv::open(&dir.join("meta.log"))?)),
                Box::new(FsTree::open(&dir.join("blobs"), config.depth, config.compress)?),
            ),
            None => (
                Metabase::new(Box::new(MemoryKv::new())),
                Box::new(MemoryBlobStore::new()),
            ),
        };

        let id = match metabase.shard_id()? {
            Some(raw) => ShardId::from_slice(&raw)?,
            None => {
                let id = ShardId::new();
                metabase.set_shard_id(id.as_bytes())?;
                id
            }
        };

        let write_cache = match (&config.path, config.use_write_cache) {
            (_, false) => None,
            (Some(dir), true) => Some(WriteCache::persistent(
                config.write_cache_max_object_size,
                config.write_cache_capacity,
                Box::new(FsTree::open(&dir.join("write_cache"), config.depth, false)?),
            )?),
            (None, true) => Some(WriteCache::new(
                config.write_cache_max_object_size,
                config.write_cache_capacity,
            )),
        };

        info!(shard = %id, path = ?config.path, weight = config.weight, "shard opened");
        Ok(Self {
            id,
            weight: config.weight.max(1),
            path: config.path.clone(),
            metabase,
            blobs,
            write_cache,
        })
    }

    /// Ephemeral shard with default settings.
    pub fn in_memory() -> ShardResult<Self> {
        Self::open(&ShardConfig::default())
    }

    pub fn id(&self) -> ShardId {
        self.id
    }

    pub fn weight(&self) -> u64 {
        self.weight
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn metabase(&self) -> &Metabase {
        &self.metabase
    }

    pub fn info(&self) -> ShardResult<ShardInfo> {
        Ok(ShardInfo {
            id: self.id,
            weight: self.weight,
            path: self.path.clone(),
            objects: self.metabase.addresses()?.len(),
            cached_objects: self.write_cache.as_ref().map_or(0, WriteCache::len),
            containers: self.metabase.containers()?.len(),
        })
    }

    /// Store an object. Storing an address that is already present is a no-op.
    pub fn put(&self, object: &Object) -> ShardResult<()> {
        let address = object.address();
        match self.metabase.exists(&address) {
            Ok(true) => return Ok(()),
            Ok(false) | Err(ShardError::SplitInfo(_)) => {}
            Err(e) => return Err(e),
        }

        let data = object.to_bytes()?;
        let cached = match &self.write_cache {
            Some(cache) => {
                let accepted = cache.put(&address, &data)?;
                if !accepted {
                    debug!(shard = %self.id, %address, "write-cache refused object; writing through");
                }
                accepted
            }
            None => false,
        };
        if !cached {
            self.blobs.put(&address, &data)?;
        }

        self.metabase.put(object)?;
        debug!(shard = %self.id, %address, cached, "object stored");
        Ok(())
    }

    pub fn get(&self, address: &Address) -> ShardResult<Object> {
        if !self.metabase.exists(address)? {
            return Err(ShardError::NotFound(*address));
        }
        let data = self.read_blob(address)?;
        Ok(Object::from_bytes(&data)?)
    }

    fn read_blob(&self, address: &Address) -> ShardResult<Vec<u8>> {
        if let Some(data) = self.write_cache.as_ref().and_then(|c| c.get(address)) {
            return Ok(data);
        }
        match self.blobs.get(address)? {
            Some(data) => Ok(data),
            None => {
                warn!(shard = %self.id, %address, "indexed object has no blob");
                Err(ShardError::NotFound(*address))
            }
        }
    }

    pub fn get_range(&self, address: &Address, range: PayloadRange) -> ShardResult<Vec<u8>> {
        let object = self.get(address)?;
        let size = object.payload.len() as u64;
        if !range.fits(size) {
            return Err(ShardError::OutOfRange { range, size });
        }
        let start = range.offset as usize;
        Ok(object.payload[start..start + range.length as usize].to_vec())
    }

    pub fn head(&self, address: &Address, raw: bool) -> ShardResult<Header> {
        self.metabase.get(address, raw)
    }

    pub fn exists(&self, address: &Address) -> ShardResult<bool> {
        self.metabase.exists(address)
    }

    pub fn inhume(&self, tombstone: Option<Address>, addresses: &[Address]) -> ShardResult<()> {
        self.metabase.inhume(tombstone, addresses)?;
        debug!(shard = %self.id, count = addresses.len(), "addresses inhumed");
        Ok(())
    }

    pub fn select(&self, container: &ContainerId, filters: &SearchFilters) -> ShardResult<Vec<Address>> {
        self.metabase.select(container, filters)
    }

    /// Every live physical address on the shard.
    pub fn list(&self) -> ShardResult<Vec<Address>> {
        self.metabase.addresses()
    }

    pub fn containers(&self) -> ShardResult<Vec<ContainerId>> {
        self.metabase.containers()
    }

    pub fn container_size(&self, container: &ContainerId) -> ShardResult<u64> {
        self.metabase.container_size(container)
    }

    /// Record that the object would be better placed on another shard.
    pub fn to_move_it(&self, address: &Address) -> ShardResult<()> {
        self.metabase.move_it(address)
    }

    pub fn movable(&self) -> ShardResult<Vec<Address>> {
        self.metabase.movable()
    }

    /// Move cached objects to the main blob store. Returns how many moved.
    ///
    /// Each entry leaves the cache only after its blob is written, so reads
    /// keep finding it throughout and a failed flush loses nothing.
    pub fn flush_write_cache(&self) -> ShardResult<usize> {
        let Some(cache) = &self.write_cache else {
            return Ok(0);
        };
        let mut moved = 0;
        for (address, data) in cache.snapshot() {
            self.blobs.put(&address, &data)?;
            if cache.remove(&address)? {
                moved += 1;
            } else {
                // collected while the blob was being written
                self.blobs.delete(&address)?;
            }
        }
        if moved > 0 {
            debug!(shard = %self.id, count = moved, "write-cache flushed");
        }
        Ok(moved)
    }

    /// Physically delete objects buried in the graveyard.
    ///
    /// A buried virtual parent takes every child of its chain with it.
    /// Returns the number of physical objects removed.
    pub fn collect_garbage(&self) -> ShardResult<usize> {
        let mut targets = Vec::new();
        for (address, _) in self.metabase.graveyard()? {
            targets.push(address);
            if let Some(info) = self.metabase.split_info(&address)? {
                match info.split_id {
                    Some(split_id) => targets.extend(
                        self.metabase.split_members(&address.container(), &split_id)?,
                    ),
                    None => targets.extend(
                        info.last_part
                            .into_iter()
                            .chain(info.link)
                            .map(|id| address.with_object(id)),
                    ),
                }
            }
        }

        let removed = self.metabase.delete(&targets)?;
        for (address, _) in &removed {
            if let Some(cache) = &self.write_cache {
                cache.remove(address)?;
            }
            self.blobs.delete(address)?;
        }
        if !removed.is_empty() {
            info!(shard = %self.id, removed = removed.len(), "garbage collected");
        }
        Ok(removed.len())
    }

    /// Flush pending writes before the shard is dropped.
    pub fn close(&self) -> ShardResult<()> {
        self.flush_write_cache()?;
        debug!(shard = %self.id, "shard closed");
        Ok(())
    }
}

impl fmt::Debug for Shard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shard")
            .field("id", &self.id)
            .field("weight", &self.weight)
            .field("path", &self.path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsn_crypto::{ContentHasher, PayloadHasher};
    use fsn_types::{ObjectId, OwnerId, SplitHeader, SplitId};

    fn cid() -> ContainerId {
        ContainerId::from_hash([1; 32])
    }

    fn object(payload: &[u8]) -> Object {
        let mut header = Header::new(cid(), OwnerId::from_hash([2; 32]));
        let mut hasher = PayloadHasher::new();
        hasher.update(payload);
        let (sha, tz) = hasher.finalize();
        header.payload_length = payload.len() as u64;
        header.payload_checksum = Some(sha);
        header.payload_homomorphic_hash = Some(tz);
        let id = ContentHasher::HEADER.hash_header(&header).unwrap();
        Object::new(id, header, payload.to_vec())
    }

    // ----------------------------------------------------------------
    // Basic operations
    // ----------------------------------------------------------------

    #[test]
    fn put_get_head() {
        let shard = Shard::in_memory().unwrap();
        let obj = object(b"payload");
        shard.put(&obj).unwrap();
        assert_eq!(shard.get(&obj.address()).unwrap(), obj);
        assert_eq!(shard.head(&obj.address(), true).unwrap(), obj.header);
        assert!(shard.exists(&obj.address()).unwrap());
    }

    #[test]
    fn get_missing_is_not_found() {
        let shard = Shard::in_memory().unwrap();
        let missing = Address::new(cid(), ObjectId::from_hash([9; 32]));
        assert!(matches!(shard.get(&missing), Err(ShardError::NotFound(_))));
    }

    #[test]
    fn get_range_bounds() {
        let shard = Shard::in_memory().unwrap();
        let obj = object(b"0123456789");
        shard.put(&obj).unwrap();
        let bytes = shard.get_range(&obj.address(), PayloadRange::new(2, 3)).unwrap();
        assert_eq!(bytes, b"234");
        assert!(matches!(
            shard.get_range(&obj.address(), PayloadRange::new(8, 3)),
            Err(ShardError::OutOfRange { size: 10, .. })
        ));
    }

    #[test]
    fn inhume_then_get_is_already_removed() {
        let shard = Shard::in_memory().unwrap();
        let obj = object(b"doomed");
        shard.put(&obj).unwrap();
        shard.inhume(None, &[obj.address()]).unwrap();
        assert!(matches!(shard.get(&obj.address()), Err(ShardError::AlreadyRemoved(_))));
        assert!(shard.list().unwrap().is_empty());
    }

    // ----------------------------------------------------------------
    // Write-cache
    // ----------------------------------------------------------------

    #[test]
    fn write_cache_serves_reads_until_flushed() {
        let config = ShardConfig {
            use_write_cache: true,
            ..ShardConfig::default()
        };
        let shard = Shard::open(&config).unwrap();
        let obj = object(b"small");
        shard.put(&obj).unwrap();
        assert_eq!(shard.info().unwrap().cached_objects, 1);
        assert_eq!(shard.get(&obj.address()).unwrap(), obj);

        assert_eq!(shard.flush_write_cache().unwrap(), 1);
        assert_eq!(shard.info().unwrap().cached_objects, 0);
        assert_eq!(shard.get(&obj.address()).unwrap(), obj);
    }

    #[test]
    fn oversized_objects_bypass_write_cache() {
        let config = ShardConfig {
            use_write_cache: true,
            write_cache_max_object_size: 16,
            ..ShardConfig::default()
        };
        let shard = Shard::open(&config).unwrap();
        let obj = object(&[1u8; 256]);
        shard.put(&obj).unwrap();
        assert_eq!(shard.info().unwrap().cached_objects, 0);
        assert_eq!(shard.get(&obj.address()).unwrap(), obj);
    }

    #[test]
    fn flush_keeps_objects_readable_during_flush() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let dir = tempfile::tempdir().unwrap();
        let config = ShardConfig {
            use_write_cache: true,
            ..ShardConfig::at(dir.path())
        };
        let shard = Shard::open(&config).unwrap();
        let objects: Vec<Object> = (0..200u32).map(|i| object(&i.to_be_bytes())).collect();
        for obj in &objects {
            shard.put(obj).unwrap();
        }
        assert_eq!(shard.info().unwrap().cached_objects, objects.len());

        let done = AtomicBool::new(false);
        std::thread::scope(|s| {
            let reader = s.spawn(|| {
                let mut reads = 0usize;
                while !done.load(Ordering::Acquire) || reads == 0 {
                    for obj in &objects {
                        assert_eq!(shard.get(&obj.address()).unwrap(), *obj);
                        reads += 1;
                    }
                }
                reads
            });
            assert_eq!(shard.flush_write_cache().unwrap(), objects.len());
            done.store(true, Ordering::Release);
            assert!(reader.join().unwrap() >= objects.len());
        });

        assert_eq!(shard.info().unwrap().cached_objects, 0);
        for obj in &objects {
            assert_eq!(shard.get(&obj.address()).unwrap(), *obj);
        }
    }

    #[test]
    fn cached_objects_survive_reopen_without_close() {
        let dir = tempfile::tempdir().unwrap();
        let config = ShardConfig {
            use_write_cache: true,
            ..ShardConfig::at(dir.path())
        };
        let obj = object(b"cached only");
        {
            let shard = Shard::open(&config).unwrap();
            shard.put(&obj).unwrap();
            assert_eq!(shard.info().unwrap().cached_objects, 1);
            // dropped without close
        }

        let shard = Shard::open(&config).unwrap();
        assert!(shard.exists(&obj.address()).unwrap());
        assert_eq!(shard.info().unwrap().cached_objects, 1);
        assert_eq!(shard.get(&obj.address()).unwrap(), obj);

        assert_eq!(shard.flush_write_cache().unwrap(), 1);
        drop(shard);
        let shard = Shard::open(&config).unwrap();
        assert_eq!(shard.info().unwrap().cached_objects, 0);
        assert_eq!(shard.get(&obj.address()).unwrap(), obj);
    }

    // ----------------------------------------------------------------
    // Persistence and GC
    // ----------------------------------------------------------------

    #[test]
    fn reopen_keeps_id_and_objects() {
        let dir = tempfile::tempdir().unwrap();
        let config = ShardConfig::at(dir.path());
        let obj = object(b"durable");
        let id = {
            let shard = Shard::open(&config).unwrap();
            shard.put(&obj).unwrap();
            shard.id()
        };
        let shard = Shard::open(&config).unwrap();
        assert_eq!(shard.id(), id);
        assert_eq!(shard.get(&obj.address()).unwrap(), obj);
    }

    #[test]
    fn gc_removes_buried_objects() {
        let dir = tempfile::tempdir().unwrap();
        let shard = Shard::open(&ShardConfig::at(dir.path())).unwrap();
        let keep = object(b"keep");
        let drop = object(b"drop");
        shard.put(&keep).unwrap();
        shard.put(&drop).unwrap();
        shard.inhume(None, &[drop.address()]).unwrap();

        assert_eq!(shard.collect_garbage().unwrap(), 1);
        assert_eq!(shard.collect_garbage().unwrap(), 0);
        assert!(matches!(shard.get(&drop.address()), Err(ShardError::AlreadyRemoved(_))));
        assert_eq!(shard.get(&keep.address()).unwrap(), keep);
        assert_eq!(shard.container_size(&cid()).unwrap(), 4);
    }

    #[test]
    fn gc_of_virtual_parent_removes_chain() {
        let shard = Shard::in_memory().unwrap();
        let sid = SplitId::new();
        let parent = ObjectId::from_hash([50; 32]);
        let mut first = object(b"first half");
        first.header.split = Some(SplitHeader {
            split_id: Some(sid),
            ..Default::default()
        });
        let mut last = object(b"second half");
        last.header.split = Some(SplitHeader {
            split_id: Some(sid),
            previous: Some(first.id),
            parent: Some(parent),
            parent_header: Some(Box::new(Header::new(cid(), OwnerId::null()))),
            children: vec![],
        });
        // Ids must differ from the unsplit headers; rehash.
        first.id = ContentHasher::HEADER.hash_header(&first.header).unwrap();
        last.id = ContentHasher::HEADER.hash_header(&last.header).unwrap();
        shard.put(&first).unwrap();
        shard.put(&last).unwrap();

        let parent_addr = Address::new(cid(), parent);
        shard.inhume(None, &[parent_addr]).unwrap();
        assert_eq!(shard.collect_garbage().unwrap(), 2);
        assert!(shard.list().unwrap().is_empty());
    }

    #[test]
    fn move_hint_roundtrip() {
        let shard = Shard::in_memory().unwrap();
        let obj = object(b"x");
        shard.put(&obj).unwrap();
        shard.to_move_it(&obj.address()).unwrap();
        assert_eq!(shard.movable().unwrap(), vec![obj.address()]);
    }
}
