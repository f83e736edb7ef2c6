use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use tracing::{debug, warn};

use crate::error::{ShardError, ShardResult};
use crate::memory::{apply_to_map, scan_map};
use crate::traits::{KvBatch, KvOp, KvStore};

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: usize = 8;

/// Log-structured key-value store.
///
/// Every batch is serialized with bincode and appended as one record:
///
/// ```text
/// [4 bytes: record length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload (bincode-serialized Vec<KvOp>)]
/// ```
///
/// On open the file is replayed front-to-back into an in-memory `BTreeMap`.
/// A record that fails its CRC is skipped; a truncated tail (torn write)
/// ends replay and is cut off so later appends start on a clean boundary.
pub struct LogKv {
    path: PathBuf,
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    writer: Mutex<LogWriter>,
    sync_every_write: bool,
}

struct LogWriter {
    writer: BufWriter<File>,
    /// Current end of the log file.
    offset: u64,
    /// Records appended since open or the last compaction.
    records: u64,
}

impl LogKv {
    /// Open (or create) a log at `path` and replay it.
    pub fn open(path: &Path) -> ShardResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut entries = BTreeMap::new();
        let (valid_len, records) = if path.exists() {
            replay(path, &mut entries)?
        } else {
            (0, 0)
        };

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;
        if file.metadata()?.len() != valid_len {
            warn!(path = %path.display(), valid_len, "truncating torn log tail");
            file.set_len(valid_len)?;
        }
        let mut file = file;
        io::Seek::seek(&mut file, io::SeekFrom::Start(valid_len))?;

        debug!(path = %path.display(), keys = entries.len(), records, "log replayed");
        Ok(Self {
            path: path.to_path_buf(),
            entries: RwLock::new(entries),
            writer: Mutex::new(LogWriter {
                writer: BufWriter::new(file),
                offset: valid_len,
                records,
            }),
            sync_every_write: false,
        })
    }

    /// `fsync` after every batch instead of relying on the page cache.
    pub fn with_sync(mut self, sync_every_write: bool) -> Self {
        self.sync_every_write = sync_every_write;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the log file in bytes.
    pub fn log_size(&self) -> u64 {
        self.writer.lock().expect("lock poisoned").offset
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rewrite the log so it holds exactly one put per live key.
    ///
    /// The new log is written to a temporary file next to the old one and
    /// atomically renamed over it.
    pub fn compact(&self) -> ShardResult<()> {
        let mut w = self.writer.lock().expect("lock poisoned");
        let entries = self.entries.read().expect("lock poisoned");

        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        let ops: Vec<KvOp> = entries
            .iter()
            .map(|(k, v)| KvOp::Put(k.clone(), v.clone()))
            .collect();
        let mut size = 0u64;
        let mut records = 0u64;
        if !ops.is_empty() {
            size = write_record(tmp.as_file_mut(), &ops)?;
            records = 1;
        }
        tmp.as_file().sync_all()?;
        let mut file = tmp
            .persist(&self.path)
            .map_err(|e| ShardError::Io(e.error))?;
        io::Seek::seek(&mut file, io::SeekFrom::End(0))?;

        debug!(
            path = %self.path.display(),
            before = w.offset,
            after = size,
            "log compacted"
        );
        *w = LogWriter {
            writer: BufWriter::new(file),
            offset: size,
            records,
        };
        Ok(())
    }

    /// Number of records appended since open or the last compaction.
    pub fn records(&self) -> u64 {
        self.writer.lock().expect("lock poisoned").records
    }
}

fn write_record(w: &mut impl Write, ops: &[KvOp]) -> ShardResult<u64> {
    let payload = bincode::serialize(ops)?;
    let length = payload.len() as u32;
    let crc = crc32fast::hash(&payload);
    w.write_all(&length.to_le_bytes())?;
    w.write_all(&crc.to_le_bytes())?;
    w.write_all(&payload)?;
    Ok(HEADER_SIZE as u64 + payload.len() as u64)
}

/// Replay the log into `entries`. Returns the length of the valid prefix
/// and the number of records applied.
fn replay(path: &Path, entries: &mut BTreeMap<Vec<u8>, Vec<u8>>) -> ShardResult<(u64, u64)> {
    let mut file = BufReader::new(File::open(path)?);
    let file_len = file.get_ref().metadata()?.len();
    let mut offset: u64 = 0;
    let mut records: u64 = 0;

    while offset + HEADER_SIZE as u64 <= file_len {
        let mut header = [0u8; HEADER_SIZE];
        match file.read_exact(&mut header) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }
        let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

        if length == 0 || offset + HEADER_SIZE as u64 + length as u64 > file_len {
            warn!(offset, length, file_len, "invalid log record length; stopping replay");
            break;
        }

        let mut payload = vec![0u8; length as usize];
        match file.read_exact(&mut payload) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                warn!(offset, "truncated log record; stopping replay");
                break;
            }
            Err(e) => return Err(e.into()),
        }
        offset += HEADER_SIZE as u64 + length as u64;

        let actual_crc = crc32fast::hash(&payload);
        if actual_crc != expected_crc {
            warn!(offset, expected = expected_crc, actual = actual_crc, "CRC mismatch; skipping record");
            continue;
        }

        match bincode::deserialize::<Vec<KvOp>>(&payload) {
            Ok(ops) => {
                apply_to_map(entries, ops);
                records += 1;
            }
            Err(e) => warn!(offset, error = %e, "failed to decode log record; skipping"),
        }
    }

    Ok((offset, records))
}

impl KvStore for LogKv {
    fn get(&self, key: &[u8]) -> ShardResult<Option<Vec<u8>>> {
        let entries = self.entries.read().expect("lock poisoned");
        Ok(entries.get(key).cloned())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> ShardResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let entries = self.entries.read().expect("lock poisoned");
        Ok(scan_map(&entries, prefix))
    }

    fn apply(&self, batch: KvBatch) -> ShardResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let ops = batch.into_ops();

        // The writer lock orders appends and map updates identically.
        let mut w = self.writer.lock().expect("lock poisoned");
        let written = write_record(&mut w.writer, &ops)?;
        w.writer.flush()?;
        if self.sync_every_write {
            w.writer.get_ref().sync_all()?;
        }
        w.offset += written;
        w.records += 1;

        let mut entries = self.entries.write().expect("lock poisoned");
        apply_to_map(&mut entries, ops);
        Ok(())
    }
}

impl std::fmt::Debug for LogKv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogKv")
            .field("path", &self.path)
            .field("keys", &self.len())
            .finish()
    }
}
