use std::sync::Mutex;

use fsn_types::{
    Address, Candidate, ContainerId, Header, Object, ObjectType, SearchFilters, SplitId,
    SplitInfo,
};
use tracing::debug;

use crate::error::{ShardError, ShardResult};
use crate::traits::{KvBatch, KvStore};

// Bucket prefixes. Keys are `prefix || container || object` unless noted.
const CONTAINER_SIZE: u8 = 0x00; // prefix || container -> u64 LE
const HEADERS: u8 = 0x01; // physical object headers
const GRAVEYARD: u8 = 0x02; // -> bincode(Option<Address>) tombstone
const ROOT: u8 = 0x05; // virtual parents -> bincode(SplitInfo)
const PARENT_HEADER: u8 = 0x06; // virtual parents -> header bytes
const TO_MOVE_IT: u8 = 0x08; // -> empty
const SHARD_ID: u8 = 0x0f; // prefix -> shard id bytes

fn key(bucket: u8, address: &Address) -> Vec<u8> {
    let mut k = Vec::with_capacity(1 + Address::LEN);
    k.push(bucket);
    k.extend_from_slice(&address.to_bytes());
    k
}

fn container_key(bucket: u8, container: &ContainerId) -> Vec<u8> {
    let mut k = Vec::with_capacity(1 + ContainerId::LEN);
    k.push(bucket);
    k.extend_from_slice(container.as_bytes());
    k
}

fn address_from_key(k: &[u8]) -> ShardResult<Address> {
    Address::from_slice(&k[1..]).map_err(|e| ShardError::Corrupt {
        key: hex::encode(k),
        reason: e.to_string(),
    })
}

fn decode_size(raw: &[u8]) -> u64 {
    let mut word = [0u8; 8];
    let n = raw.len().min(8);
    word[..n].copy_from_slice(&raw[..n]);
    u64::from_le_bytes(word)
}

/// Metadata index of one shard.
///
/// Tracks physical object headers, virtual (split) parents with the split
/// info learned about them, the graveyard, per-container payload sizes and
/// relocation hints. Payload bytes live elsewhere.
pub struct Metabase {
    kv: Box<dyn KvStore>,
    /// Serializes read-modify-write sequences. Reads go straight to `kv`.
    write_lock: Mutex<()>,
}

impl Metabase {
    pub fn new(kv: Box<dyn KvStore>) -> Self {
        Self {
            kv,
            write_lock: Mutex::new(()),
        }
    }

    pub fn shard_id(&self) -> ShardResult<Option<Vec<u8>>> {
        self.kv.get(&[SHARD_ID])
    }

    pub fn set_shard_id(&self, id: &[u8]) -> ShardResult<()> {
        self.kv.put(&[SHARD_ID], id)
    }

    /// Register a physical object. Idempotent for an address already present.
    ///
    /// A split child that names its parent also registers the parent as a
    /// virtual object: the linking object contributes `Link`, any other
    /// child `LastPart`. Partial infos merge with what was recorded before.
    pub fn put(&self, object: &Object) -> ShardResult<()> {
        let _guard = self.write_lock.lock().expect("lock poisoned");
        let address = object.address();

        if self.kv.contains(&key(GRAVEYARD, &address))? {
            return Err(ShardError::AlreadyRemoved(address));
        }
        if self.kv.contains(&key(HEADERS, &address))? {
            return Ok(());
        }

        let header = &object.header;
        let mut batch = KvBatch::new();
        batch.put(key(HEADERS, &address), header.to_bytes()?);

        let size_key = container_key(CONTAINER_SIZE, &address.container());
        let mut size = self.kv.get(&size_key)?.map_or(0, |raw| decode_size(&raw));
        if header.object_type == ObjectType::Regular {
            size += header.payload_length;
        }
        batch.put(size_key, size.to_le_bytes().to_vec());

        if let (Some(parent), Some(split)) = (object.parent_address(), header.split.as_ref()) {
            let learned = if split.is_link() {
                SplitInfo::with_link(split.split_id, object.id)
            } else {
                SplitInfo::with_last_part(split.split_id, object.id)
            };
            let root_key = key(ROOT, &parent);
            let merged = match self.kv.get(&root_key)? {
                Some(raw) => bincode::deserialize::<SplitInfo>(&raw)?.merged(&learned),
                None => learned,
            };
            batch.put(root_key, bincode::serialize(&merged)?);
            if let Some(parent_header) = &split.parent_header {
                batch.put(key(PARENT_HEADER, &parent), parent_header.to_bytes()?);
            }
            debug!(%parent, child = %object.id, "registered split parent");
        }

        self.kv.apply(batch)
    }

    /// `Ok(true)` for a physical object, `Ok(false)` if unknown.
    ///
    /// Fails with `AlreadyRemoved` for graveyard entries and with `SplitInfo`
    /// for virtual objects.
    pub fn exists(&self, address: &Address) -> ShardResult<bool> {
        if self.kv.contains(&key(GRAVEYARD, address))? {
            return Err(ShardError::AlreadyRemoved(*address));
        }
        if self.kv.contains(&key(HEADERS, address))? {
            return Ok(true);
        }
        match self.split_info(address)? {
            Some(info) => Err(ShardError::SplitInfo(info)),
            None => Ok(false),
        }
    }

    /// Header of an object.
    ///
    /// For a virtual object, `raw` requests fail with `SplitInfo`; otherwise
    /// the parent header carried by its children is returned.
    pub fn get(&self, address: &Address, raw: bool) -> ShardResult<Header> {
        if self.kv.contains(&key(GRAVEYARD, address))? {
            return Err(ShardError::AlreadyRemoved(*address));
        }
        if let Some(bytes) = self.kv.get(&key(HEADERS, address))? {
            return Ok(Header::from_bytes(&bytes)?);
        }
        let Some(info) = self.split_info(address)? else {
            return Err(ShardError::NotFound(*address));
        };
        if !raw {
            if let Some(bytes) = self.kv.get(&key(PARENT_HEADER, address))? {
                return Ok(Header::from_bytes(&bytes)?);
            }
        }
        Err(ShardError::SplitInfo(info))
    }

    /// Split info recorded for a virtual parent, ignoring the graveyard.
    pub fn split_info(&self, address: &Address) -> ShardResult<Option<SplitInfo>> {
        match self.kv.get(&key(ROOT, address))? {
            Some(raw) => Ok(Some(bincode::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn is_inhumed(&self, address: &Address) -> ShardResult<bool> {
        self.kv.contains(&key(GRAVEYARD, address))
    }

    /// Move addresses to the graveyard. Stored data stays until
    /// [`Metabase::delete`] removes it.
    pub fn inhume(&self, tombstone: Option<Address>, addresses: &[Address]) -> ShardResult<()> {
        let _guard = self.write_lock.lock().expect("lock poisoned");
        let mut batch = KvBatch::new();
        let value = bincode::serialize(&tombstone)?;
        for address in addresses {
            batch.put(key(GRAVEYARD, address), value.clone());
            batch.delete(key(TO_MOVE_IT, address));
        }
        self.kv.apply(batch)
    }

    /// Graveyard entries with the tombstone that buried them, if any.
    pub fn graveyard(&self) -> ShardResult<Vec<(Address, Option<Address>)>> {
        self.kv
            .scan_prefix(&[GRAVEYARD])?
            .into_iter()
            .map(|(k, v)| Ok((address_from_key(&k)?, bincode::deserialize(&v)?)))
            .collect()
    }

    /// Drop index records of the given addresses. Graveyard entries are
    /// kept so removed objects keep answering `AlreadyRemoved`.
    ///
    /// Returns the headers of the physical objects that were dropped.
    pub fn delete(&self, addresses: &[Address]) -> ShardResult<Vec<(Address, Header)>> {
        let _guard = self.write_lock.lock().expect("lock poisoned");
        let mut batch = KvBatch::new();
        let mut removed = Vec::new();
        let mut freed: Vec<(ContainerId, u64)> = Vec::new();

        for address in addresses {
            batch.delete(key(ROOT, address));
            batch.delete(key(PARENT_HEADER, address));
            batch.delete(key(TO_MOVE_IT, address));
            if let Some(bytes) = self.kv.get(&key(HEADERS, address))? {
                let header = Header::from_bytes(&bytes)?;
                batch.delete(key(HEADERS, address));
                if header.object_type == ObjectType::Regular {
                    freed.push((address.container(), header.payload_length));
                }
                removed.push((*address, header));
            }
        }

        freed.sort_by_key(|(cid, _)| *cid);
        freed.dedup_by(|b, a| {
            if a.0 == b.0 {
                a.1 += b.1;
                true
            } else {
                false
            }
        });
        for (cid, bytes) in freed {
            let size_key = container_key(CONTAINER_SIZE, &cid);
            let size = self.kv.get(&size_key)?.map_or(0, |raw| decode_size(&raw));
            batch.put(size_key, size.saturating_sub(bytes).to_le_bytes().to_vec());
        }

        self.kv.apply(batch)?;
        Ok(removed)
    }

    /// Physical children sharing `split_id` within a container.
    pub fn split_members(&self, container: &ContainerId, split_id: &SplitId) -> ShardResult<Vec<Address>> {
        let mut out = Vec::new();
        for (k, v) in self.kv.scan_prefix(&container_key(HEADERS, container))? {
            let header = Header::from_bytes(&v)?;
            if header.split_id().as_ref() == Some(split_id) {
                out.push(address_from_key(&k)?);
            }
        }
        Ok(out)
    }

    /// Addresses in `container` matching every filter. Graveyard entries
    /// never match.
    pub fn select(&self, container: &ContainerId, filters: &SearchFilters) -> ShardResult<Vec<Address>> {
        let mut out = Vec::new();

        for (k, v) in self.kv.scan_prefix(&container_key(HEADERS, container))? {
            let address = address_from_key(&k)?;
            if self.is_inhumed(&address)? {
                continue;
            }
            let header = Header::from_bytes(&v)?;
            let oid = address.object();
            let candidate = Candidate {
                id: &oid,
                header: &header,
                physical: true,
                root: header.split.is_none(),
            };
            if filters.matches(&candidate) {
                out.push(address);
            }
        }

        for (k, _) in self.kv.scan_prefix(&container_key(ROOT, container))? {
            let address = address_from_key(&k)?;
            if self.is_inhumed(&address)? {
                continue;
            }
            let Some(bytes) = self.kv.get(&key(PARENT_HEADER, &address))? else {
                continue;
            };
            let header = Header::from_bytes(&bytes)?;
            let oid = address.object();
            let candidate = Candidate {
                id: &oid,
                header: &header,
                physical: false,
                root: true,
            };
            if filters.matches(&candidate) {
                out.push(address);
            }
        }

        Ok(out)
    }

    /// Every physical address that is not in the graveyard.
    pub fn addresses(&self) -> ShardResult<Vec<Address>> {
        let mut out = Vec::new();
        for (k, _) in self.kv.scan_prefix(&[HEADERS])? {
            let address = address_from_key(&k)?;
            if !self.is_inhumed(&address)? {
                out.push(address);
            }
        }
        Ok(out)
    }

    pub fn containers(&self) -> ShardResult<Vec<ContainerId>> {
        self.kv
            .scan_prefix(&[CONTAINER_SIZE])?
            .into_iter()
            .map(|(k, _)| {
                ContainerId::from_slice(&k[1..]).map_err(|e| ShardError::Corrupt {
                    key: hex::encode(&k),
                    reason: e.to_string(),
                })
            })
            .collect()
    }

    /// Sum of payload lengths of regular objects stored for `container`.
    pub fn container_size(&self, container: &ContainerId) -> ShardResult<u64> {
        Ok(self
            .kv
            .get(&container_key(CONTAINER_SIZE, container))?
            .map_or(0, |raw| decode_size(&raw)))
    }

    /// Mark an object as a candidate for relocation to a better shard.
    pub fn move_it(&self, address: &Address) -> ShardResult<()> {
        self.kv.put(&key(TO_MOVE_IT, address), &[])
    }

    pub fn do_not_move(&self, address: &Address) -> ShardResult<()> {
        self.kv.delete(&key(TO_MOVE_IT, address))
    }

    pub fn movable(&self) -> ShardResult<Vec<Address>> {
        self.kv
            .scan_prefix(&[TO_MOVE_IT])?
            .into_iter()
            .map(|(k, _)| address_from_key(&k))
            .collect()
    }
}

impl std::fmt::Debug for Metabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metabase").finish_non_exhaustive()
    }
}
