//! On-disk catalog store
//!
//! Layout:
//!
//! ```text
//! <base>/index.json           name -> {digest, size, published_at}
//! <base>/objects/XX/YYYY...   content, addressed by digest
//! ```
//!
//! An object is written once and rewritten only if it no longer matches
//! its digest. The index is replaced by writing a
//! temporary file and renaming it over the old one.
//!
//! A store is held by one process at a time through `<base>/.koha.lock`,
//! which records the holder's PID. A lock left by a dead process is
//! removed on the next open.

use super::CatalogError;
use crate::digest::{self, Digest};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::NamedTempFile;

const INDEX_FILE: &str = "index.json";
const OBJECTS_DIR: &str = "objects";
const LOCK_FILE: &str = ".koha.lock";

/// Persisted index of published packages
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Index {
    pub packages: BTreeMap<String, IndexEntry>,
}

/// Index record for a single package
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub digest: String,
    pub size: u64,
    pub published_at: DateTime<Utc>,
}

/// Directory-backed package store
#[derive(Debug)]
pub struct Store {
    base_path: PathBuf,
}

impl Store {
    /// Open the store at `base_path`, creating it if needed.
    ///
    /// Fails with [`CatalogError::Locked`] while another live process
    /// (or another `Store` in this process) holds it.
    pub fn open<P: AsRef<Path>>(base_path: P) -> Result<Self, CatalogError> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(base_path.join(OBJECTS_DIR))?;
        acquire_lock(&base_path)?;
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Load the index, or an empty one if none was written yet
    pub fn load_index(&self) -> Result<Index, CatalogError> {
        let path = self.index_path();
        if !path.exists() {
            return Ok(Index::default());
        }
        let file = File::open(&path)?;
        serde_json::from_reader(file).map_err(|e| CatalogError::Index(format!("{:?}: {}", path, e)))
    }

    /// Replace the index atomically
    pub fn save_index(&self, index: &Index) -> Result<(), CatalogError> {
        let json = serde_json::to_vec_pretty(index)
            .map_err(|e| CatalogError::Index(format!("serialize: {}", e)))?;
        let mut tmp = NamedTempFile::new_in(&self.base_path)?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.index_path()).map_err(|e| e.error)?;
        log::debug!("Saved index with {} package(s)", index.packages.len());
        Ok(())
    }

    /// Store content under its digest.
    ///
    /// An existing object is kept only if it still hashes to `digest`;
    /// otherwise it is rewritten.
    pub fn write_object(&self, digest: &Digest, data: &[u8]) -> io::Result<()> {
        let path = self.object_path(digest);
        if path.exists() {
            match self.read_object(digest) {
                Ok(existing) if digest::hash(&existing) == *digest => return Ok(()),
                Ok(_) => log::warn!("Rewriting corrupt object {}", digest),
                Err(e) => log::warn!("Rewriting unreadable object {}: {}", digest, e),
            }
        }
        let parent = path
            .parent()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "object path has no parent"))?;
        fs::create_dir_all(parent)?;

        let mut tmp = NamedTempFile::new_in(parent)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Read content by digest
    pub fn read_object(&self, digest: &Digest) -> io::Result<Vec<u8>> {
        let mut file = File::open(self.object_path(digest))?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        Ok(data)
    }

    fn index_path(&self) -> PathBuf {
        self.base_path.join(INDEX_FILE)
    }

    /// Convert digest to object path (base/objects/XX/YYYY...)
    fn object_path(&self, digest: &Digest) -> PathBuf {
        let hex = digest.to_hex();
        let (prefix, suffix) = hex.split_at(2);
        self.base_path.join(OBJECTS_DIR).join(prefix).join(suffix)
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        let lock = self.base_path.join(LOCK_FILE);
        if read_lock_pid(&lock) == Some(std::process::id()) {
            if let Err(e) = fs::remove_file(&lock) {
                log::warn!("Failed to remove store lock {:?}: {}", lock, e);
            }
        }
    }
}

/// Create the lock file atomically, reclaiming it from a dead holder
fn acquire_lock(base_path: &Path) -> Result<(), CatalogError> {
    let lock = base_path.join(LOCK_FILE);
    loop {
        let mut tmp = NamedTempFile::new_in(base_path)?;
        write!(tmp, "{}", std::process::id())?;
        tmp.as_file().sync_all()?;

        let err = match tmp.persist_noclobber(&lock) {
            Ok(_) => return Ok(()),
            Err(e) => e.error,
        };
        if err.kind() != io::ErrorKind::AlreadyExists {
            return Err(err.into());
        }

        match read_lock_pid(&lock) {
            Some(pid) if is_process_running(pid) => {
                return Err(CatalogError::Locked {
                    path: base_path.to_path_buf(),
                    pid,
                });
            }
            holder => {
                log::warn!("Removing stale store lock {:?} (holder {:?})", lock, holder);
                match fs::remove_file(&lock) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
    }
}

fn read_lock_pid(lock: &Path) -> Option<u32> {
    fs::read_to_string(lock).ok()?.trim().parse().ok()
}

/// Check if a process with the given PID is running
fn is_process_running(pid: u32) -> bool {
    if pid == std::process::id() {
        return true;
    }

    #[cfg(unix)]
    {
        // Signal 0 only checks that the process exists
        Command::new("kill")
            .arg("-0")
            .arg(pid.to_string())
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    #[cfg(not(unix))]
    {
        Command::new("tasklist")
            .arg("/FI")
            .arg(format!("PID eq {}", pid))
            .output()
            .map(|output| String::from_utf8_lossy(&output.stdout).contains(&pid.to_string()))
            .unwrap_or(false)
    }
}
