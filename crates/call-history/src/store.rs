//! Key-value settings storage
//!
//! The history repository keeps a single encoded blob under a fixed key, the
//! way platform settings storage works. Two stores are provided:
//!
//! - [`MemoryStore`] for tests and ephemeral hosts
//! - [`FileStore`], a JSON file mapping keys to base64 blobs, replaced
//!   atomically on every write

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{HistoryError, HistoryResult};

/// Byte-blob settings storage
pub trait KeyValueStore: Send + Sync {
    /// Value stored under `key`, if any
    fn get(&self, key: &str) -> HistoryResult<Option<Vec<u8>>>;

    /// Store `value` under `key`, replacing any previous value
    fn set(&self, key: &str, value: Vec<u8>) -> HistoryResult<()>;

    /// Remove `key`; removing a missing key is not an error
    fn remove(&self, key: &str) -> HistoryResult<()>;
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> HistoryResult<Option<Vec<u8>>> {
        Ok(self.values.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: Vec<u8>) -> HistoryResult<()> {
        self.values.write().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> HistoryResult<()> {
        self.values.write().remove(key);
        Ok(())
    }
}

/// File-backed store
///
/// The whole file is read on every access. Writes go to a sibling temporary
/// file which then replaces the original, so a crash mid-write leaves the
/// previous contents intact.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Store backed by the file at `path`; the file is created on first write
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Location of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> HistoryResult<BTreeMap<String, String>> {
        match fs::read(&self.path) {
            Ok(bytes) if bytes.is_empty() => Ok(BTreeMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_all(&self, values: &BTreeMap<String, String>) -> HistoryResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, serde_json::to_vec_pretty(values)?)?;
        fs::rename(&tmp, &self.path)?;
        debug!("Wrote {} key(s) to {}", values.len(), self.path.display());
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> HistoryResult<Option<Vec<u8>>> {
        match self.read_all()?.get(key) {
            Some(encoded) => STANDARD
                .decode(encoded)
                .map(Some)
                .map_err(|_| HistoryError::CorruptValue { key: key.to_string() }),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: Vec<u8>) -> HistoryResult<()> {
        let _guard = self.write_lock.lock();
        let mut values = self.read_all()?;
        values.insert(key.to_string(), STANDARD.encode(value));
        self.write_all(&values)
    }

    fn remove(&self, key: &str) -> HistoryResult<()> {
        let _guard = self.write_lock.lock();
        let mut values = self.read_all()?;
        if values.remove(key).is_some() {
            self.write_all(&values)?;
        }
        Ok(())
    }
}
