use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use fsn_types::{Address, ContainerId, ObjectId};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{ShardError, ShardResult};
use crate::traits::BlobStore;

/// Leading byte of every stored file.
const RAW: u8 = 0;
const ZSTD: u8 = 1;

const ZSTD_LEVEL: i32 = 3;

/// File-per-object blob store.
///
/// Layout: `<root>/<container hex>/<ab>/<cd>/.../<object hex>` where the
/// intermediate directories are the first `depth` byte pairs of the object
/// id. Files are written to a temporary sibling and renamed into place, so
/// readers never observe a partial blob.
pub struct FsTree {
    root: PathBuf,
    depth: usize,
    compress: bool,
}

impl FsTree {
    pub fn open(root: &Path, depth: usize, compress: bool) -> ShardResult<Self> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
            depth: depth.min(ObjectId::LEN / 2),
            compress,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, address: &Address) -> PathBuf {
        let oid = address.object().to_hex();
        let mut path = self.root.join(address.container().to_hex());
        for level in 0..self.depth {
            path.push(&oid[level * 2..level * 2 + 2]);
        }
        path.push(oid);
        path
    }

    fn encode(&self, data: &[u8]) -> ShardResult<Vec<u8>> {
        let mut out = Vec::with_capacity(data.len() + 1);
        if self.compress {
            out.push(ZSTD);
            out.extend_from_slice(&zstd::encode_all(data, ZSTD_LEVEL)?);
        } else {
            out.push(RAW);
            out.extend_from_slice(data);
        }
        Ok(out)
    }

    fn decode(address: &Address, stored: Vec<u8>) -> ShardResult<Vec<u8>> {
        match stored.first() {
            Some(&RAW) => Ok(stored[1..].to_vec()),
            Some(&ZSTD) => Ok(zstd::decode_all(&stored[1..])?),
            other => Err(ShardError::Corrupt {
                key: address.to_string(),
                reason: format!("unknown blob encoding {other:?}"),
            }),
        }
    }

    fn address_of(&self, path: &Path) -> Option<Address> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let container = rel.components().next()?.as_os_str().to_str()?;
        let object = path.file_name()?.to_str()?;
        let cid = ContainerId::from_hex(container).ok()?;
        let oid = ObjectId::from_hex(object).ok()?;
        Some(Address::new(cid, oid))
    }
}

impl BlobStore for FsTree {
    fn get(&self, address: &Address) -> ShardResult<Option<Vec<u8>>> {
        match fs::read(self.path_of(address)) {
            Ok(stored) => Self::decode(address, stored).map(Some),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, address: &Address, data: &[u8]) -> ShardResult<()> {
        let path = self.path_of(address);
        if path.exists() {
            return Ok(());
        }
        let dir = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(dir)?;

        let encoded = self.encode(data)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&encoded)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| ShardError::Io(e.error))?;
        debug!(%address, bytes = encoded.len(), "blob written");
        Ok(())
    }

    fn delete(&self, address: &Address) -> ShardResult<bool> {
        match fs::remove_file(self.path_of(address)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&self, address: &Address) -> ShardResult<bool> {
        Ok(self.path_of(address).is_file())
    }

    fn iterate(&self, f: &mut dyn FnMut(Address) -> ShardResult<()>) -> ShardResult<()> {
        for entry in WalkDir::new(&self.root).min_depth(2) {
            let entry = entry.map_err(|e| ShardError::Io(io::Error::other(e.to_string())))?;
            if !entry.file_type().is_file() {
                continue;
            }
            match self.address_of(entry.path()) {
                Some(address) => f(address)?,
                None => warn!(path = %entry.path().display(), "skipping foreign file in blob tree"),
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for FsTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsTree")
            .field("root", &self.root)
            .field("depth", &self.depth)
            .field("compress", &self.compress)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(c: u8, o: u8) -> Address {
        Address::new(ContainerId::from_hash([c; 32]), ObjectId::from_hash([o; 32]))
    }

    #[test]
    fn put_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let tree = FsTree::open(dir.path(), 2, false).unwrap();
        tree.put(&addr(1, 2), b"blob bytes").unwrap();
        assert_eq!(tree.get(&addr(1, 2)).unwrap(), Some(b"blob bytes".to_vec()));
        assert!(tree.exists(&addr(1, 2)).unwrap());
        assert_eq!(tree.get(&addr(1, 3)).unwrap(), None);
    }

    #[test]
    fn layout_uses_container_and_prefix_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let tree = FsTree::open(dir.path(), 2, false).unwrap();
        let a = addr(0xaa, 0xbc);
        tree.put(&a, b"x").unwrap();
        let expected = dir
            .path()
            .join(a.container().to_hex())
            .join("bc")
            .join("bc")
            .join(a.object().to_hex());
        assert!(expected.is_file());
    }

    #[test]
    fn compressed_blobs_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let tree = FsTree::open(dir.path(), 1, true).unwrap();
        let data = vec![7u8; 64 * 1024];
        tree.put(&addr(1, 1), &data).unwrap();
        assert_eq!(tree.get(&addr(1, 1)).unwrap(), Some(data.clone()));
        let on_disk = fs::metadata(tree.path_of(&addr(1, 1))).unwrap().len();
        assert!(on_disk < data.len() as u64);
    }

    #[test]
    fn put_is_write_once() {
        let dir = tempfile::tempdir().unwrap();
        let tree = FsTree::open(dir.path(), 1, false).unwrap();
        tree.put(&addr(1, 1), b"first").unwrap();
        tree.put(&addr(1, 1), b"second").unwrap();
        assert_eq!(tree.get(&addr(1, 1)).unwrap(), Some(b"first".to_vec()));
    }

    #[test]
    fn delete_and_iterate() {
        let dir = tempfile::tempdir().unwrap();
        let tree = FsTree::open(dir.path(), 2, false).unwrap();
        for o in 1..=3 {
            tree.put(&addr(1, o), &[o]).unwrap();
        }
        tree.put(&addr(2, 9), b"other container").unwrap();
        assert!(tree.delete(&addr(1, 2)).unwrap());
        assert!(!tree.delete(&addr(1, 2)).unwrap());

        let mut seen = Vec::new();
        tree.iterate(&mut |a| {
            seen.push(a);
            Ok(())
        })
        .unwrap();
        seen.sort();
        assert_eq!(seen, vec![addr(1, 1), addr(1, 3), addr(2, 9)]);
    }

    #[test]
    fn reopen_sees_existing_blobs() {
        let dir = tempfile::tempdir().unwrap();
        FsTree::open(dir.path(), 2, true)
            .unwrap()
            .put(&addr(4, 4), b"persisted")
            .unwrap();
        let tree = FsTree::open(dir.path(), 2, false).unwrap();
        assert_eq!(tree.get(&addr(4, 4)).unwrap(), Some(b"persisted".to_vec()));
    }
}
