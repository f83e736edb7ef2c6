use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, RwLock};

use fsn_shard::{Shard, ShardConfig, ShardError, ShardId, ShardInfo, ShardResult};
use fsn_types::{
    Address, ContainerId, Header, Object, PayloadRange, SearchFilters, SplitInfoCollector,
};
use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::ranking;

/// Routes object operations across a set of local shards.
///
/// The shard map is read-mostly: every object operation clones the shard
/// handles it needs under the read lock and releases it before touching a
/// shard, so concurrent operations only contend inside shards.
pub struct StorageEngine {
    shards: RwLock<HashMap<ShardId, Arc<Shard>>>,
}

impl StorageEngine {
    /// An engine without shards.
    pub fn new() -> Self {
        Self {
            shards: RwLock::new(HashMap::new()),
        }
    }

    /// Open every shard listed in `config`.
    pub fn open(config: &EngineConfig) -> EngineResult<Self> {
        let engine = Self::new();
        for shard in &config.shards {
            engine.add_shard(shard)?;
        }
        Ok(engine)
    }

    // ------------------------------------------------------------------
    // Shard set administration
    // ------------------------------------------------------------------

    /// Open a shard from `config` and attach it.
    pub fn add_shard(&self, config: &ShardConfig) -> EngineResult<ShardId> {
        let shard = Shard::open(config)?;
        self.attach_shard(shard)
    }

    pub fn attach_shard(&self, shard: Shard) -> EngineResult<ShardId> {
        let id = shard.id();
        let mut shards = self.shards.write().expect("lock poisoned");
        if shards.contains_key(&id) {
            return Err(EngineError::DuplicateShard(id));
        }
        shards.insert(id, Arc::new(shard));
        info!(shard = %id, total = shards.len(), "shard attached");
        Ok(id)
    }

    /// Detach a shard, flushing its write-cache first.
    pub fn drop_shard(&self, id: &ShardId) -> EngineResult<()> {
        let shard = {
            let mut shards = self.shards.write().expect("lock poisoned");
            shards.remove(id).ok_or(EngineError::ShardNotFound(*id))?
        };
        shard.close()?;
        info!(shard = %id, "shard dropped");
        Ok(())
    }

    pub fn shard_ids(&self) -> Vec<ShardId> {
        let shards = self.shards.read().expect("lock poisoned");
        let mut ids: Vec<ShardId> = shards.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn shard_info(&self) -> EngineResult<Vec<ShardInfo>> {
        let mut infos = self
            .all_shards()
            .iter()
            .map(|s| s.info())
            .collect::<ShardResult<Vec<_>>>()?;
        infos.sort_by_key(|i| i.id);
        Ok(infos)
    }

    fn all_shards(&self) -> Vec<Arc<Shard>> {
        let shards = self.shards.read().expect("lock poisoned");
        shards.values().cloned().collect()
    }

    /// Shards in visiting order for `address`.
    pub fn sorted_shards(&self, address: &Address) -> Vec<Arc<Shard>> {
        let mut shards = self.all_shards();
        ranking::rank(&mut shards, address, |s| (s.id(), s.weight()));
        shards
    }

    // ------------------------------------------------------------------
    // Point reads
    // ------------------------------------------------------------------

    /// Visit shards in ranked order until one answers.
    ///
    /// "Not found" moves on to the next shard. Split info is merged across
    /// shards and reported once complete or once every shard was asked.
    fn read_ranked<T>(
        &self,
        address: &Address,
        op: impl Fn(&Shard) -> ShardResult<T>,
    ) -> EngineResult<T> {
        let mut split = SplitInfoCollector::new();
        for shard in self.sorted_shards(address) {
            match op(&shard) {
                Ok(v) => return Ok(v),
                Err(ShardError::NotFound(_)) => continue,
                Err(ShardError::SplitInfo(info)) => {
                    if split.add(&info) {
                        break;
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
        match split.into_inner() {
            Some(info) => Err(EngineError::SplitInfo(info)),
            None => Err(EngineError::NotFound(*address)),
        }
    }

    pub fn get(&self, address: &Address) -> EngineResult<Object> {
        self.read_ranked(address, |s| s.get(address))
    }

    pub fn get_range(&self, address: &Address, range: PayloadRange) -> EngineResult<Vec<u8>> {
        self.read_ranked(address, |s| s.get_range(address, range))
    }

    /// Object header. With `raw`, virtual objects report their split info
    /// instead of the parent header.
    pub fn head(&self, address: &Address, raw: bool) -> EngineResult<Header> {
        self.read_ranked(address, |s| s.head(address, raw))
    }

    /// `Ok(true)` if some shard stores the object physically. Virtual
    /// objects surface as `SplitInfo`.
    pub fn exists(&self, address: &Address) -> EngineResult<bool> {
        let found = self.read_ranked(address, |s| match s.exists(address)? {
            true => Ok(()),
            false => Err(ShardError::NotFound(*address)),
        });
        match found {
            Ok(()) => Ok(true),
            Err(EngineError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Store an object on exactly one shard.
    ///
    /// If the first ranked shard already has it, the object is only marked
    /// for relocation. Otherwise shards are tried in ranked order until one
    /// accepts the write.
    pub fn put(&self, object: &Object) -> EngineResult<()> {
        let address = object.address();
        let shards = self.sorted_shards(&address);
        let first = shards.first().ok_or(EngineError::NoShards)?;

        match first.exists(&address) {
            Ok(true) | Err(ShardError::SplitInfo(_)) => {
                if let Err(e) = first.to_move_it(&address) {
                    warn!(shard = %first.id(), %address, error = %e, "could not mark object for move");
                }
                debug!(shard = %first.id(), %address, "object already stored");
                return Ok(());
            }
            Ok(false) => {}
            Err(e) => return Err(e.into()),
        }

        let mut last_err = None;
        for shard in &shards {
            match shard.put(object) {
                Ok(()) => {
                    debug!(shard = %shard.id(), %address, "object put");
                    return Ok(());
                }
                Err(e @ ShardError::AlreadyRemoved(_)) => return Err(e.into()),
                Err(e) => {
                    warn!(shard = %shard.id(), %address, error = %e, "could not put object to shard");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.map_or(EngineError::NoShards, EngineError::from))
    }

    /// Bury addresses, optionally under a tombstone.
    ///
    /// Each address is inhumed on the first shard that holds it; a virtual
    /// object is inhumed on every shard that knows part of its chain. An
    /// address no shard holds is buried on its first ranked shard so late
    /// copies are refused.
    pub fn inhume(&self, tombstone: Option<Address>, addresses: &[Address]) -> EngineResult<()> {
        for address in addresses {
            self.inhume_one(tombstone, address)?;
        }
        Ok(())
    }

    fn inhume_one(&self, tombstone: Option<Address>, address: &Address) -> EngineResult<()> {
        let shards = self.sorted_shards(address);
        let first = shards.first().ok_or(EngineError::NoShards)?;
        let mut root = false;

        for shard in &shards {
            match shard.exists(address) {
                Ok(true) => {
                    shard.inhume(tombstone, &[*address])?;
                    debug!(shard = %shard.id(), %address, "object inhumed");
                    return Ok(());
                }
                Ok(false) => {}
                Err(ShardError::AlreadyRemoved(_)) => return Ok(()),
                Err(ShardError::SplitInfo(_)) => {
                    root = true;
                    shard.inhume(tombstone, &[*address])?;
                }
                Err(e) => return Err(e.into()),
            }
        }

        if !root {
            first.inhume(tombstone, &[*address])?;
            debug!(shard = %first.id(), %address, "unknown address inhumed");
        }
        Ok(())
    }

    /// Remove an object without a tombstone.
    pub fn delete(&self, address: &Address) -> EngineResult<()> {
        self.inhume(None, &[*address])
    }

    // ------------------------------------------------------------------
    // Scatter-gather
    // ------------------------------------------------------------------

    /// Union of every shard's matches, without duplicates.
    pub fn select(&self, container: &ContainerId, filters: &SearchFilters) -> EngineResult<Vec<Address>> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for shard in self.all_shards() {
            for address in shard.select(container, filters)? {
                if seen.insert(address) {
                    out.push(address);
                }
            }
        }
        Ok(out)
    }

    /// Up to `limit` stored addresses in random order.
    pub fn list(&self, limit: usize) -> EngineResult<Vec<Address>> {
        let mut rng = rand::thread_rng();
        let mut shards = self.all_shards();
        shards.shuffle(&mut rng);

        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for shard in shards {
            let mut addresses = shard.list()?;
            addresses.shuffle(&mut rng);
            for address in addresses {
                if out.len() >= limit {
                    return Ok(out);
                }
                if seen.insert(address) {
                    out.push(address);
                }
            }
        }
        Ok(out)
    }

    /// Total payload bytes stored for a container across all shards.
    pub fn container_size(&self, container: &ContainerId) -> EngineResult<u64> {
        let mut total = 0u64;
        for shard in self.all_shards() {
            total += shard.container_size(container)?;
        }
        Ok(total)
    }

    pub fn list_containers(&self) -> EngineResult<Vec<ContainerId>> {
        let mut out = BTreeSet::new();
        for shard in self.all_shards() {
            out.extend(shard.containers()?);
        }
        Ok(out.into_iter().collect())
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    /// Run garbage collection on every shard. Returns objects removed.
    pub fn collect_garbage(&self) -> EngineResult<usize> {
        let mut removed = 0;
        for shard in self.all_shards() {
            removed += shard.collect_garbage()?;
        }
        Ok(removed)
    }

    pub fn flush_write_caches(&self) -> EngineResult<usize> {
        let mut flushed = 0;
        for shard in self.all_shards() {
            flushed += shard.flush_write_cache()?;
        }
        Ok(flushed)
    }

    /// Flush every shard. The engine stays usable afterwards.
    pub fn close(&self) -> EngineResult<()> {
        for shard in self.all_shards() {
            shard.close()?;
        }
        Ok(())
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("shards", &self.shard_ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsn_crypto::{ContentHasher, PayloadHasher};
    use fsn_types::{ObjectId, OwnerId, SplitHeader, SplitId, SplitInfo};
    use std::thread;

    fn cid() -> ContainerId {
        ContainerId::from_hash([1; 32])
    }

    fn seal(mut header: Header, payload: &[u8]) -> Object {
        let mut hasher = PayloadHasher::new();
        hasher.update(payload);
        let (sha, tz) = hasher.finalize();
        header.payload_length = payload.len() as u64;
        header.payload_checksum = Some(sha);
        header.payload_homomorphic_hash = Some(tz);
        let id = ContentHasher::HEADER.hash_header(&header).unwrap();
        Object::new(id, header, payload.to_vec())
    }

    fn object(payload: &[u8]) -> Object {
        seal(Header::new(cid(), OwnerId::from_hash([2; 32])), payload)
    }

    fn engine(shards: usize) -> StorageEngine {
        StorageEngine::open(&EngineConfig::in_memory(shards)).unwrap()
    }

    fn holders(engine: &StorageEngine, address: &Address) -> usize {
        engine
            .all_shards()
            .iter()
            .filter(|s| matches!(s.exists(address), Ok(true)))
            .count()
    }

    // ----------------------------------------------------------------
    // Put / Get
    // ----------------------------------------------------------------

    #[test]
    fn put_then_get() {
        let e = engine(3);
        let obj = object(b"hello");
        e.put(&obj).unwrap();
        assert_eq!(e.get(&obj.address()).unwrap(), obj);
        assert_eq!(e.head(&obj.address(), true).unwrap(), obj.header);
        assert!(e.exists(&obj.address()).unwrap());
    }

    #[test]
    fn put_lands_on_first_ranked_shard_only() {
        let e = engine(4);
        let obj = object(b"single copy");
        e.put(&obj).unwrap();
        assert_eq!(holders(&e, &obj.address()), 1);
        let first = &e.sorted_shards(&obj.address())[0];
        assert!(first.exists(&obj.address()).unwrap());
    }

    #[test]
    fn second_put_is_idempotent_and_marks_move() {
        let e = engine(3);
        let obj = object(b"twice");
        e.put(&obj).unwrap();
        e.put(&obj).unwrap();
        assert_eq!(holders(&e, &obj.address()), 1);
        let first = &e.sorted_shards(&obj.address())[0];
        assert_eq!(first.movable().unwrap(), vec![obj.address()]);
    }

    #[test]
    fn put_without_shards_fails() {
        let e = StorageEngine::new();
        assert!(matches!(e.put(&object(b"x")), Err(EngineError::NoShards)));
    }

    #[test]
    fn get_missing_is_not_found() {
        let e = engine(2);
        let missing = Address::new(cid(), ObjectId::from_hash([9; 32]));
        assert!(matches!(e.get(&missing), Err(EngineError::NotFound(_))));
        assert!(!e.exists(&missing).unwrap());
    }

    #[test]
    fn get_range_slices_payload() {
        let e = engine(2);
        let obj = object(b"0123456789");
        e.put(&obj).unwrap();
        assert_eq!(e.get_range(&obj.address(), PayloadRange::new(3, 4)).unwrap(), b"3456");
        assert!(matches!(
            e.get_range(&obj.address(), PayloadRange::new(9, 4)),
            Err(EngineError::OutOfRange { .. })
        ));
    }

    // ----------------------------------------------------------------
    // Split info merging
    // ----------------------------------------------------------------

    fn split_child(parent: ObjectId, sid: SplitId, link: bool, payload: &[u8]) -> Object {
        let mut header = Header::new(cid(), OwnerId::from_hash([2; 32]));
        header.split = Some(SplitHeader {
            split_id: Some(sid),
            previous: None,
            parent: Some(parent),
            parent_header: Some(Box::new(
                Header::new(cid(), OwnerId::from_hash([2; 32])).with_attribute("k", "v"),
            )),
            children: if link { vec![ObjectId::from_hash([4; 32])] } else { vec![] },
        });
        seal(header, payload)
    }

    #[test]
    fn partial_split_infos_merge_across_shards() {
        let e = engine(2);
        let shards = e.all_shards();
        let parent = ObjectId::from_hash([50; 32]);
        let sid = SplitId::new();
        let last = split_child(parent, sid, false, b"tail");
        let link = split_child(parent, sid, true, b"");
        // Place the two halves of the chain on different shards directly.
        shards[0].put(&last).unwrap();
        shards[1].put(&link).unwrap();

        let parent_addr = Address::new(cid(), parent);
        match e.get(&parent_addr) {
            Err(EngineError::SplitInfo(info)) => {
                assert_eq!(info.last_part, Some(last.id));
                assert_eq!(info.link, Some(link.id));
                assert_eq!(info.split_id, Some(sid));
            }
            other => panic!("expected merged split info, got {other:?}"),
        }
    }

    #[test]
    fn partial_split_info_alone_is_reported() {
        let e = engine(3);
        let parent = ObjectId::from_hash([51; 32]);
        let last = split_child(parent, SplitId::new(), false, b"tail");
        e.put(&last).unwrap();
        let Err(EngineError::SplitInfo(info)) = e.head(&Address::new(cid(), parent), true) else {
            panic!("expected split info");
        };
        assert_eq!(
            info,
            SplitInfo {
                split_id: last.header.split_id(),
                last_part: Some(last.id),
                link: None
            }
        );
    }

    #[test]
    fn non_raw_head_of_virtual_returns_parent_header() {
        let e = engine(2);
        let parent = ObjectId::from_hash([52; 32]);
        e.put(&split_child(parent, SplitId::new(), false, b"tail")).unwrap();
        let header = e.head(&Address::new(cid(), parent), false).unwrap();
        assert_eq!(header.attribute("k"), Some("v"));
    }

    // ----------------------------------------------------------------
    // Inhume / Delete
    // ----------------------------------------------------------------

    #[test]
    fn delete_buries_object() {
        let e = engine(3);
        let obj = object(b"bye");
        e.put(&obj).unwrap();
        e.delete(&obj.address()).unwrap();
        assert!(matches!(e.get(&obj.address()), Err(EngineError::AlreadyRemoved(_))));
        assert!(matches!(e.put(&obj), Err(EngineError::AlreadyRemoved(_))));
        assert_eq!(e.collect_garbage().unwrap(), 1);
    }

    #[test]
    fn inhume_unknown_blocks_late_arrival() {
        let e = engine(3);
        let obj = object(b"late");
        let tomb = Address::new(cid(), ObjectId::from_hash([77; 32]));
        e.inhume(Some(tomb), &[obj.address()]).unwrap();
        assert!(matches!(e.put(&obj), Err(EngineError::AlreadyRemoved(_))));
    }

    #[test]
    fn inhume_virtual_reaches_every_shard_with_chain_parts() {
        let e = engine(2);
        let shards = e.all_shards();
        let parent = ObjectId::from_hash([53; 32]);
        let sid = SplitId::new();
        shards[0].put(&split_child(parent, sid, false, b"tail")).unwrap();
        shards[1].put(&split_child(parent, sid, true, b"")).unwrap();
        let parent_addr = Address::new(cid(), parent);
        e.inhume(None, &[parent_addr]).unwrap();
        for shard in &shards {
            assert!(matches!(shard.exists(&parent_addr), Err(ShardError::AlreadyRemoved(_))));
        }
        assert_eq!(e.collect_garbage().unwrap(), 2);
    }

    // ----------------------------------------------------------------
    // Scatter-gather
    // ----------------------------------------------------------------

    #[test]
    fn select_unions_all_shards() {
        let e = engine(4);
        let objs: Vec<Object> = (0..20u8).map(|n| object(&[n])).collect();
        for obj in &objs {
            e.put(obj).unwrap();
        }
        let mut found = e.select(&cid(), &SearchFilters::new()).unwrap();
        found.sort();
        let mut expected: Vec<Address> = objs.iter().map(Object::address).collect();
        expected.sort();
        assert_eq!(found, expected);
    }

    #[test]
    fn select_deduplicates_copies_on_several_shards() {
        let e = engine(2);
        let obj = object(b"dup");
        for shard in e.all_shards() {
            shard.put(&obj).unwrap();
        }
        assert_eq!(e.select(&cid(), &SearchFilters::new()).unwrap().len(), 1);
        assert_eq!(e.list(10).unwrap().len(), 1);
    }

    #[test]
    fn list_respects_limit() {
        let e = engine(3);
        for n in 0..10u8 {
            e.put(&object(&[n])).unwrap();
        }
        assert_eq!(e.list(4).unwrap().len(), 4);
        assert_eq!(e.list(100).unwrap().len(), 10);
    }

    #[test]
    fn container_queries() {
        let e = engine(3);
        for n in 0..5u8 {
            e.put(&object(&[n; 10])).unwrap();
        }
        assert_eq!(e.container_size(&cid()).unwrap(), 50);
        assert_eq!(e.list_containers().unwrap(), vec![cid()]);
    }

    // ----------------------------------------------------------------
    // Shard set and concurrency
    // ----------------------------------------------------------------

    #[test]
    fn ranking_survives_reattach_in_other_order() {
        let dir = tempfile::tempdir().unwrap();
        let configs: Vec<ShardConfig> = (0..3)
            .map(|i| ShardConfig::at(dir.path().join(format!("s{i}"))))
            .collect();
        let obj = object(b"stable");
        let before: Vec<ShardId> = {
            let e = StorageEngine::open(&EngineConfig { shards: configs.clone() }).unwrap();
            e.sorted_shards(&obj.address()).iter().map(|s| s.id()).collect()
        };
        let mut reversed = configs;
        reversed.reverse();
        let e = StorageEngine::open(&EngineConfig { shards: reversed }).unwrap();
        let after: Vec<ShardId> = e.sorted_shards(&obj.address()).iter().map(|s| s.id()).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn drop_shard_removes_it_from_ranking() {
        let e = engine(3);
        let id = e.shard_ids()[0];
        e.drop_shard(&id).unwrap();
        assert_eq!(e.shard_ids().len(), 2);
        assert!(matches!(e.drop_shard(&id), Err(EngineError::ShardNotFound(_))));
    }

    #[test]
    fn concurrent_puts_on_distinct_addresses() {
        let e = Arc::new(engine(4));
        let handles: Vec<_> = (0..16u8)
            .map(|n| {
                let e = Arc::clone(&e);
                thread::spawn(move || {
                    let obj = object(&[n; 32]);
                    e.put(&obj).unwrap();
                    obj.address()
                })
            })
            .collect();
        let addresses: Vec<Address> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for address in &addresses {
            assert!(e.exists(address).unwrap());
            assert_eq!(holders(&e, address), 1);
        }
        assert_eq!(e.list(100).unwrap().len(), 16);
    }
}
