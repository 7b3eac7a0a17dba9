//! Persisted clock state and the places it can live.

use crate::errors::*;
use dirsrv_types::Dn;
use fs2::FileExt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// File holding the serialized clock state inside a state directory.
pub const STATE_FILE_NAME: &str = "uniqueid.state";

/// Lock file held for as long as a generator owns a state directory.
pub const LOCK_FILE_NAME: &str = "uniqueid.lock";

/// Where the generator keeps its clock state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateLocation {
    /// A filesystem directory. The empty path means the current directory.
    Directory(PathBuf),
    /// A directory entry, read and written through an [`EntryStateStore`].
    Entry(Dn),
}

impl StateLocation {
    /// Build a location from the two optional configuration values.
    ///
    /// Exactly one must be present. An empty directory path counts as present.
    pub fn from_parts(directory: Option<&str>, entry: Option<Dn>) -> Result<Self> {
        match (directory, entry) {
            (Some(dir), None) => Ok(Self::Directory(PathBuf::from(dir))),
            (None, Some(dn)) => Ok(Self::Entry(dn)),
            _ => Err(UniqueIdError::ConfigurationConflict),
        }
    }

    pub fn current_directory() -> Self {
        Self::Directory(PathBuf::new())
    }
}

/// Whether more than one thread will call the generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadMode {
    SingleThreaded,
    MultiThreaded,
}

impl ThreadMode {
    pub fn from_flag(multi_threaded: bool) -> Self {
        if multi_threaded {
            Self::MultiThreaded
        } else {
            Self::SingleThreaded
        }
    }
}

/// Clock state that must survive restarts for generated ids to stay unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedClock {
    /// Last timestamp handed out, in 100ns ticks since 1582-10-15.
    pub last_ticks: u64,
    /// 14-bit clock sequence.
    pub clock_seq: u16,
    /// 48-bit node identifier.
    pub node: [u8; 6],
}

/// Backing store for [`PersistedClock`].
pub trait StateStore: Send + Sync {
    fn load(&self) -> Result<Option<PersistedClock>>;
    fn save(&self, state: &PersistedClock) -> Result<()>;
    /// Human-readable location, for log messages.
    fn describe(&self) -> String;
}

/// Check that `dir` names an existing directory. Empty means the current one.
pub fn validate_directory(dir: &Path) -> Result<()> {
    if dir.as_os_str().is_empty() || dir.is_dir() {
        Ok(())
    } else {
        Err(UniqueIdError::bad_data(format!(
            "state directory {} does not exist",
            dir.display()
        )))
    }
}

/// Clock state kept in `uniqueid.state` under a directory.
///
/// Holds an exclusive lock on `uniqueid.lock` until dropped, so two
/// generators can never share one directory.
#[derive(Debug)]
pub struct FileStateStore {
    dir: PathBuf,
    path: PathBuf,
    lock: File,
}

impl FileStateStore {
    pub fn open(dir: &Path) -> Result<Self> {
        validate_directory(dir)?;

        let lock_path = dir.join(LOCK_FILE_NAME);
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)?;
        lock.try_lock_exclusive().map_err(|_| {
            UniqueIdError::system(format!(
                "state directory {} is in use by another generator",
                dir.display()
            ))
        })?;

        Ok(Self {
            dir: dir.to_path_buf(),
            path: dir.join(STATE_FILE_NAME),
            lock,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for FileStateStore {
    fn load(&self) -> Result<Option<PersistedClock>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = fs::read(&self.path)?;
        decode_clock(&data).map(Some)
    }

    fn save(&self, state: &PersistedClock) -> Result<()> {
        let data = encode_clock(state)?;
        let tmp = self.path.with_extension("state.tmp");

        // The new state must be on disk before it replaces the old one.
        let mut file = File::create(&tmp)?;
        file.write_all(&data)?;
        file.sync_all()?;
        fs::rename(&tmp, &self.path)?;
        sync_directory(&self.dir)?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

impl Drop for FileStateStore {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.lock);
    }
}

/// Access to the directory entry that stores generator state.
pub trait EntryStateStore: Send + Sync {
    fn read_state(&self, dn: &Dn) -> Result<Option<Vec<u8>>>;
    fn write_state(&self, dn: &Dn, state: &[u8]) -> Result<()>;
}

/// In-memory entry store, for tests and embedded use.
#[derive(Debug, Default)]
pub struct MemoryEntryStore {
    entries: RwLock<HashMap<Dn, Vec<u8>>>,
}

impl MemoryEntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, dn: &Dn) -> bool {
        self.entries.read().contains_key(dn)
    }
}

impl EntryStateStore for MemoryEntryStore {
    fn read_state(&self, dn: &Dn) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().get(dn).cloned())
    }

    fn write_state(&self, dn: &Dn, state: &[u8]) -> Result<()> {
        self.entries.write().insert(dn.clone(), state.to_vec());
        Ok(())
    }
}

/// [`StateStore`] adapter over a single entry of an [`EntryStateStore`].
pub struct EntryBackedStore {
    dn: Dn,
    entries: Arc<dyn EntryStateStore>,
}

impl EntryBackedStore {
    pub fn new(dn: Dn, entries: Arc<dyn EntryStateStore>) -> Self {
        Self { dn, entries }
    }
}

impl StateStore for EntryBackedStore {
    fn load(&self) -> Result<Option<PersistedClock>> {
        match self.entries.read_state(&self.dn)? {
            Some(data) => decode_clock(&data).map(Some),
            None => Ok(None),
        }
    }

    fn save(&self, state: &PersistedClock) -> Result<()> {
        let data = encode_clock(state)?;
        self.entries.write_state(&self.dn, &data)
    }

    fn describe(&self) -> String {
        format!("entry {}", self.dn)
    }
}

#[cfg(unix)]
fn sync_directory(dir: &Path) -> Result<()> {
    let dir = if dir.as_os_str().is_empty() {
        Path::new(".")
    } else {
        dir
    };
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_directory(_dir: &Path) -> Result<()> {
    Ok(())
}

fn encode_clock(state: &PersistedClock) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(state)?)
}

fn decode_clock(data: &[u8]) -> Result<PersistedClock> {
    Ok(serde_json::from_slice(data)?)
}
