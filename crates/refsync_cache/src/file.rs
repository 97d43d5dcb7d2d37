//! File-backed cache store.
//!
//! Layout of a cache directory:
//!
//! ```text
//! <cache_dir>/
//! ├─ LOCK                       # advisory lock for single-writer
//! ├─ user-42-0f3a9c1b2d4e5f60.rsyc
//! └─ group-7-aa12bb34cc56dd78.rsyc
//! ```
//!
//! One record file per library identity. A record is a 4-byte magic,
//! a little-endian u16 format version, and a CBOR body. Writes go to a
//! temp file which is renamed over the record, so readers never observe
//! a half-written record. A record with an unknown magic or a newer
//! format version is discarded as absent (forcing a full resync), never
//! misread.

use crate::entry::{CacheEntry, CachePolicy};
use crate::error::{CacheError, CacheResult};
use crate::store::CacheStore;
use fs2::FileExt;
use refsync_model::LibraryIdentity;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};

/// Magic bytes for cache record files.
pub const RECORD_MAGIC: [u8; 4] = *b"RSYC";

/// Current record format version.
pub const RECORD_VERSION: u16 = 1;

const LOCK_FILE: &str = "LOCK";
const RECORD_EXT: &str = "rsyc";
const TEMP_EXT: &str = "tmp";

/// A cache store keeping one record file per identity.
///
/// Holds an exclusive advisory lock on the directory for its lifetime;
/// a second process opening the same directory gets
/// [`CacheError::Locked`].
#[derive(Debug)]
pub struct FileCacheStore {
    dir: PathBuf,
    policy: CachePolicy,
    _lock_file: File,
}

impl FileCacheStore {
    /// Opens or creates a cache directory with the default policy.
    pub fn open(dir: impl Into<PathBuf>) -> CacheResult<Self> {
        Self::open_with_policy(dir, CachePolicy::default())
    }

    /// Opens or creates a cache directory with a specific policy.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Locked`] if another process holds the lock,
    /// or an I/O error if the directory cannot be created.
    pub fn open_with_policy(dir: impl Into<PathBuf>, policy: CachePolicy) -> CacheResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        if !dir.is_dir() {
            return Err(CacheError::invalid_format(format!(
                "cache path is not a directory: {}",
                dir.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(dir.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(CacheError::Locked);
        }

        Ok(Self {
            dir,
            policy,
            _lock_file: lock_file,
        })
    }

    /// Returns the cache directory path.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, identity: &LibraryIdentity) -> PathBuf {
        self.dir.join(format!("{}.{RECORD_EXT}", identity.slug()))
    }

    fn encode(entry: &CacheEntry) -> CacheResult<Vec<u8>> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&RECORD_MAGIC);
        buf.extend_from_slice(&RECORD_VERSION.to_le_bytes());
        ciborium::into_writer(entry, &mut buf).map_err(|e| CacheError::encode(e.to_string()))?;
        Ok(buf)
    }

    fn decode(data: &[u8]) -> CacheResult<CacheEntry> {
        if data.len() < 6 || data[0..4] != RECORD_MAGIC {
            return Err(CacheError::invalid_format("bad record magic"));
        }
        let version = u16::from_le_bytes([data[4], data[5]]);
        if version > RECORD_VERSION {
            return Err(CacheError::invalid_format(format!(
                "unsupported record version: {version}"
            )));
        }
        ciborium::from_reader(&data[6..]).map_err(|e| CacheError::decode(e.to_string()))
    }

    /// Reads and decodes a record file, ignoring staleness.
    fn read_raw(&self, path: &Path) -> CacheResult<Option<CacheEntry>> {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match Self::decode(&data) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                // Incompatible or corrupt record: drop it and report a
                // miss so the caller resyncs from scratch.
                warn!(path = %path.display(), error = %e, "discarding unreadable cache record");
                let _ = fs::remove_file(path);
                Ok(None)
            }
        }
    }
}

impl CacheStore for FileCacheStore {
    fn read(&self, identity: &LibraryIdentity) -> CacheResult<Option<CacheEntry>> {
        Ok(self
            .read_stale(identity)?
            .filter(|entry| !entry.is_expired(&self.policy, SystemTime::now())))
    }

    fn read_stale(&self, identity: &LibraryIdentity) -> CacheResult<Option<CacheEntry>> {
        self.read_raw(&self.record_path(identity))
    }

    fn write_entry(&self, entry: CacheEntry) -> CacheResult<()> {
        let path = self.record_path(&entry.identity);
        let temp_path = path.with_extension(TEMP_EXT);
        let data = Self::encode(&entry)?;

        let mut temp = File::create(&temp_path)?;
        temp.write_all(&data)?;
        temp.sync_all()?;
        drop(temp);

        fs::rename(&temp_path, &path)?;
        debug!(identity = %entry.identity, bytes = data.len(), "cache record written");
        Ok(())
    }

    fn invalidate(&self, identity: &LibraryIdentity) -> CacheResult<()> {
        let path = self.record_path(identity);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn compact(&self) -> CacheResult<usize> {
        let now = SystemTime::now();
        let mut removed = 0;

        for dir_entry in fs::read_dir(&self.dir)? {
            let path = dir_entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXT) {
                continue;
            }
            // read_raw already removes unreadable records.
            match self.read_raw(&path)? {
                Some(entry) if entry.is_expired(&self.policy, now) => {
                    fs::remove_file(&path)?;
                    removed += 1;
                }
                Some(_) => {}
                None => removed += 1,
            }
        }

        if removed > 0 {
            debug!(removed, "cache compaction removed records");
        }
        Ok(removed)
    }

    fn policy(&self) -> &CachePolicy {
        &self.policy
    }
}
