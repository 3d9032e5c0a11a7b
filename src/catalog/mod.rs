//! Package catalog
//!
//! Maps package names to their content and known-good digest. The catalog
//! is an owned value shared with request handlers through an `Arc`; it is
//! never a process-wide global.
//!
//! Entries are held behind a single catalog-wide `RwLock`. Lookups and
//! listings take the read lock; [`Catalog::publish`] takes the write lock.
//! Each entry is an `Arc<Package>` carrying content and digest together, so
//! a reader that resolved a name before a republish still holds a matching
//! pair.

pub mod store;

use crate::digest::{self, Digest};
use crate::protocol::{validate_package_name, NameError, PackageRecord};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use store::{Index, IndexEntry, Store};
use thiserror::Error;

/// Catalog errors
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("package not found: {0}")]
    NotFound(String),

    #[error("invalid package name: {0}")]
    InvalidName(#[from] NameError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("index error: {0}")]
    Index(String),

    #[error("store {path:?} is in use by process {pid}")]
    Locked { path: PathBuf, pid: u32 },
}

/// Result type for catalog operations
pub type CatalogResult<T> = Result<T, CatalogError>;

/// A published package
#[derive(Debug)]
pub struct Package {
    pub name: String,
    pub content: Vec<u8>,
    pub digest: Digest,
    pub published_at: DateTime<Utc>,
}

impl Package {
    fn new(name: &str, content: Vec<u8>) -> Self {
        let digest = digest::hash(&content);
        Self {
            name: name.to_string(),
            content,
            digest,
            published_at: Utc::now(),
        }
    }

    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }

    pub fn record(&self) -> PackageRecord {
        PackageRecord {
            name: self.name.clone(),
            digest: self.digest.to_hex(),
            size: self.size(),
        }
    }

    fn index_entry(&self) -> IndexEntry {
        IndexEntry {
            digest: self.digest.to_hex(),
            size: self.size(),
            published_at: self.published_at,
        }
    }
}

/// Snapshot of the catalog, sorted by name.
///
/// Iterating a listing again yields the same records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    records: Vec<PackageRecord>,
}

impl Listing {
    pub fn iter(&self) -> std::slice::Iter<'_, PackageRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<PackageRecord> {
        self.records
    }
}

impl<'a> IntoIterator for &'a Listing {
    type Item = &'a PackageRecord;
    type IntoIter = std::slice::Iter<'a, PackageRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Package catalog
#[derive(Debug)]
pub struct Catalog {
    entries: RwLock<HashMap<String, Arc<Package>>>,
    store: Option<Store>,
}

impl Catalog {
    /// Create a catalog that lives only in memory
    pub fn in_memory() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            store: None,
        }
    }

    /// Open a disk-backed catalog, loading every package from the store.
    ///
    /// Entries whose object is missing or no longer hashes to the indexed
    /// digest are dropped and the index is rewritten without them.
    pub fn open<P: AsRef<Path>>(path: P) -> CatalogResult<Self> {
        let store = Store::open(path)?;
        let index = store.load_index()?;
        let indexed = index.packages.len();

        let mut entries = HashMap::new();
        for (name, entry) in index.packages {
            match load_package(&store, &name, &entry) {
                Ok(package) => {
                    entries.insert(name, Arc::new(package));
                }
                Err(reason) => {
                    log::warn!("Dropping package {:?} from index: {}", name, reason);
                }
            }
        }

        let catalog = Self {
            entries: RwLock::new(entries),
            store: Some(store),
        };

        let loaded = catalog.len();
        if loaded != indexed {
            catalog.save_index(&catalog.read_entries())?;
        }
        log::info!("Loaded catalog with {} package(s)", loaded);
        Ok(catalog)
    }

    /// Sorted snapshot of every package
    pub fn list(&self) -> Listing {
        let entries = self.read_entries();
        let mut records: Vec<PackageRecord> = entries.values().map(|p| p.record()).collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        Listing { records }
    }

    /// Look up a package by name
    pub fn resolve(&self, name: &str) -> CatalogResult<Arc<Package>> {
        self.read_entries()
            .get(name)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(name.to_string()))
    }

    /// Publish `content` under `name`, replacing any previous package.
    ///
    /// The object and index are written before the in-memory entry is
    /// swapped, all under the write lock. If persisting fails the catalog
    /// is left unchanged.
    pub fn publish(&self, name: &str, content: Vec<u8>) -> CatalogResult<Digest> {
        validate_package_name(name)?;
        let package = Package::new(name, content);
        let digest = package.digest;

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(store) = &self.store {
            store.write_object(&digest, &package.content)?;
            let mut index = build_index(&entries);
            index.packages.insert(name.to_string(), package.index_entry());
            store.save_index(&index)?;
        }

        let previous = entries.insert(name.to_string(), Arc::new(package));
        match previous {
            Some(old) if old.digest != digest => {
                log::info!("Republished {} ({} -> {})", name, old.digest, digest)
            }
            Some(_) => log::info!("Republished {} unchanged ({})", name, digest),
            None => log::info!("Published {} ({})", name, digest),
        }
        Ok(digest)
    }

    /// Read a file from disk and publish it under `name`
    pub fn publish_file<P: AsRef<Path>>(&self, name: &str, path: P) -> CatalogResult<Digest> {
        let content = std::fs::read(path.as_ref())?;
        self.publish(name, content)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read_entries().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.read_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_entries().is_empty()
    }

    fn read_entries(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<Package>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn save_index(&self, entries: &HashMap<String, Arc<Package>>) -> CatalogResult<()> {
        match &self.store {
            Some(store) => store.save_index(&build_index(entries)),
            None => Ok(()),
        }
    }
}

fn build_index(entries: &HashMap<String, Arc<Package>>) -> Index {
    Index {
        packages: entries
            .iter()
            .map(|(name, package)| (name.clone(), package.index_entry()))
            .collect(),
    }
}

fn load_package(store: &Store, name: &str, entry: &IndexEntry) -> Result<Package, String> {
    let digest = Digest::from_hex(&entry.digest).map_err(|e| e.to_string())?;
    let content = store
        .read_object(&digest)
        .map_err(|e| format!("object {}: {}", digest, e))?;
    let actual = digest::hash(&content);
    if actual != digest {
        return Err(format!("object hashes to {}, index says {}", actual, digest));
    }
    Ok(Package {
        name: name.to_string(),
        content,
        digest,
        published_at: entry.published_at,
    })
}
