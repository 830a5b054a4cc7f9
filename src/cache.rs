//! Persistent snapshot of a scanned library.
//!
//! One redb file per library root lives in the cache directory. Its name is
//! derived from the canonical root path alone, so the cache directory can be
//! moved freely while renaming a library root starts a fresh entry.
//!
//! The file is a single-writer resource: concurrent external mutation during
//! a run is not guarded against.

use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
};

use redb::{
    Database, DatabaseError, ReadableDatabase, ReadableTable, TableDefinition,
    TableError,
};
use sha2::{Digest, Sha256};

use crate::{
    document::Document,
    error::{Error, Result},
};

const META: TableDefinition<&str, &str> = TableDefinition::new("meta");
/// Folder path -> JSON-encoded document. An empty value marks a folder whose
/// document could not be loaded at scan time.
const DOCUMENTS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("documents");

const FORMAT_VERSION: &str = "1";
const KEY_VERSION: &str = "version";
const KEY_ROOT: &str = "root";

/// Hex characters of the root-path digest kept in the entry name.
const KEY_HASH_LEN: usize = 32;

/// Outcome of a cache lookup.
#[derive(Debug, Default)]
pub struct CacheLoad {
    pub folders: BTreeSet<PathBuf>,
    pub documents: Vec<Document>,
    pub hit: bool,
}

#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Entry name for a library root: `<sha256 prefix>-<basename>`.
    pub fn key(root: &Path) -> String {
        let canonical = canonical(root);
        let digest = Sha256::digest(canonical.to_string_lossy().as_bytes());
        let hash = hex::encode(digest);
        let base = canonical
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("{}-{base}", &hash[..KEY_HASH_LEN])
    }

    pub fn entry_path(&self, root: &Path) -> PathBuf {
        self.dir.join(Self::key(root))
    }

    /// Load the snapshot for `root`.
    ///
    /// Never fails: a missing entry is a plain miss, and an unreadable or
    /// mismatched entry is logged and reported as a miss so the caller
    /// rescans and overwrites it.
    pub fn load(&self, root: &Path) -> CacheLoad {
        let path = self.entry_path(root);
        if !path.exists() {
            tracing::debug!(cache = %path.display(), "cache miss");
            return CacheLoad::default();
        }

        match read_entry(&path, &canonical(root)) {
            Ok((folders, documents)) => {
                tracing::debug!(
                    cache = %path.display(),
                    folders = folders.len(),
                    "loaded library from cache"
                );
                CacheLoad {
                    folders,
                    documents,
                    hit: true,
                }
            }
            Err(err) => {
                tracing::warn!(
                    "{}; rescanning ({err})",
                    Error::CacheCorrupt(path)
                );
                CacheLoad::default()
            }
        }
    }

    /// Replace the snapshot for `root` with `folders` and `documents`.
    ///
    /// The whole snapshot is written in one transaction, so readers see
    /// either the previous entry or the new one.
    pub fn save(
        &self,
        root: &Path,
        folders: &BTreeSet<PathBuf>,
        documents: &[Document],
    ) -> Result<()> {
        // Keys must round-trip to the same path, so folders that are not
        // valid UTF-8 stay out of the snapshot.
        let mut encoded: BTreeMap<String, Vec<u8>> = BTreeMap::new();
        for folder in folders {
            match folder.to_str() {
                Some(key) => {
                    encoded.insert(key.to_string(), Vec::new());
                }
                None => tracing::warn!(
                    "not caching {}: path is not valid UTF-8",
                    folder.display()
                ),
            }
        }
        for doc in documents {
            // Reported with the folder set.
            let Some(key) = doc.folder().to_str() else {
                continue;
            };
            encoded.insert(key.to_string(), serde_json::to_vec(doc)?);
        }

        std::fs::create_dir_all(&self.dir)?;
        let path = self.entry_path(root);

        let db = match Database::create(&path) {
            Ok(db) => db,
            Err(DatabaseError::DatabaseAlreadyOpen) => {
                return Err(DatabaseError::DatabaseAlreadyOpen.into());
            }
            Err(err) => {
                tracing::warn!(
                    "discarding unreadable cache entry {}: {err}",
                    path.display()
                );
                std::fs::remove_file(&path)?;
                Database::create(&path)?
            }
        };

        let root_key = canonical(root).to_string_lossy().into_owned();
        let txn = db.begin_write()?;
        txn.delete_table(DOCUMENTS)?;
        {
            let mut table = txn.open_table(DOCUMENTS)?;
            for (folder, value) in &encoded {
                table.insert(folder.as_str(), value.as_slice())?;
            }
        }
        {
            let mut meta = txn.open_table(META)?;
            meta.insert(KEY_VERSION, FORMAT_VERSION)?;
            meta.insert(KEY_ROOT, root_key.as_str())?;
        }
        txn.commit()?;

        tracing::debug!(
            cache = %path.display(),
            entries = encoded.len(),
            "saved library cache"
        );
        Ok(())
    }

    /// Drop the snapshot for `root`. Returns whether an entry existed.
    pub fn invalidate(&self, root: &Path) -> Result<bool> {
        let path = self.entry_path(root);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!(cache = %path.display(), "cleared cache");
                Ok(true)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}

fn read_entry(
    path: &Path,
    root: &Path,
) -> Result<(BTreeSet<PathBuf>, Vec<Document>)> {
    let db = Database::open(path)?;
    let txn = db.begin_read()?;

    let meta = txn.open_table(META)?;
    let version = meta.get(KEY_VERSION)?.map(|v| v.value().to_string());
    if version.as_deref() != Some(FORMAT_VERSION) {
        return Err(Error::CacheCorrupt(path.to_path_buf()));
    }
    let stored_root = meta.get(KEY_ROOT)?.map(|v| v.value().to_string());
    if stored_root.as_deref() != Some(root.to_string_lossy().as_ref()) {
        return Err(Error::CacheCorrupt(path.to_path_buf()));
    }

    let table = match txn.open_table(DOCUMENTS) {
        Ok(table) => table,
        Err(TableError::TableDoesNotExist(_)) => {
            return Ok((BTreeSet::new(), Vec::new()));
        }
        Err(err) => return Err(err.into()),
    };

    let mut folders = BTreeSet::new();
    let mut documents = Vec::new();
    for entry in table.iter()? {
        let (folder, value) = entry?;
        folders.insert(PathBuf::from(folder.value()));
        let bytes = value.value();
        if !bytes.is_empty() {
            documents.push(serde_json::from_slice::<Document>(bytes)?);
        }
    }
    // Keys are ordered as strings; callers expect path order like a scan.
    documents.sort_by(|a, b| a.folder().cmp(b.folder()));
    Ok((folders, documents))
}

fn canonical(root: &Path) -> PathBuf {
    root.canonicalize().unwrap_or_else(|_| root.to_path_buf())
}
