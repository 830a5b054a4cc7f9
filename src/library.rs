use std::{
    collections::{BTreeSet, HashMap},
    path::{Path, PathBuf},
};

use crate::{
    cache::CacheStore,
    config::Config,
    document::{self, Document},
    error::{Error, Result},
    matcher::DocumentFilter,
    pool::WorkerPool,
    scan,
};

/// Read access to the documents of a library.
///
/// The citation and backlink resolvers only depend on this trait, so they
/// work the same over a cached [`Library`] or a plain list of documents.
pub trait DocumentStore: Sync {
    fn all_documents(&self) -> &[Document];

    /// Documents whose rendered fields equal every `(key, value)` pair,
    /// ignoring case.
    fn query_by_field(&self, fields: &[(&str, &str)]) -> Vec<&Document> {
        self.all_documents()
            .iter()
            .filter(|doc| {
                fields.iter().all(|(key, value)| {
                    doc.field_text(key).eq_ignore_ascii_case(value)
                })
            })
            .collect()
    }
}

impl DocumentStore for Vec<Document> {
    fn all_documents(&self) -> &[Document] {
        self
    }
}

impl DocumentStore for [Document] {
    fn all_documents(&self) -> &[Document] {
        self
    }
}

/// Map normalized DOIs to the first document carrying them.
pub fn doi_index(documents: &[Document]) -> HashMap<String, &Document> {
    let mut index = HashMap::with_capacity(documents.len());
    for doc in documents {
        if let Some(doi) = doc.doi() {
            index.entry(doi).or_insert(doc);
        }
    }
    index
}

/// The in-memory document set of one library root, backed by the cache.
pub struct Library {
    config: Config,
    root: PathBuf,
    cache: CacheStore,
    pool: WorkerPool,
    folders: BTreeSet<PathBuf>,
    documents: Vec<Document>,
}

impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("root", &self.root)
            .field("documents", &self.documents.len())
            .finish_non_exhaustive()
    }
}

impl Library {
    /// Open the library at `config.library_root`.
    ///
    /// Uses the cached snapshot when one exists for this exact root;
    /// otherwise scans the tree, loads every document in parallel and writes
    /// a fresh snapshot.
    pub fn open(config: Config) -> Result<Self> {
        let root = config.library_root.canonicalize()?;
        let cache = CacheStore::new(&config.cache_dir);
        let pool = WorkerPool::new(config.workers)?;

        let mut library = Self {
            config,
            root,
            cache,
            pool,
            folders: BTreeSet::new(),
            documents: Vec::new(),
        };

        if library.config.use_cache {
            let loaded = library.cache.load(&library.root);
            if loaded.hit {
                library.folders = loaded.folders;
                library.documents = loaded.documents;
                return Ok(library);
            }
        }

        library.rescan()?;
        Ok(library)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn folders(&self) -> &BTreeSet<PathBuf> {
        &self.folders
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    /// Scan the tree again, reload every document and overwrite the cache.
    pub fn rescan(&mut self) -> Result<()> {
        let folders = scan::scan(&self.root, &self.config.info_name)?;
        self.documents = self.load_folders(&folders);
        self.folders = folders;
        self.persist();
        Ok(())
    }

    fn load_folders(&self, folders: &BTreeSet<PathBuf>) -> Vec<Document> {
        let folders: Vec<&PathBuf> = folders.iter().collect();
        let info_name = self.config.info_name.as_str();
        let loaded = self
            .pool
            .map(&folders, |folder| document::load_document(folder, info_name));

        let mut documents = Vec::with_capacity(loaded.len());
        for (folder, result) in folders.iter().zip(loaded) {
            match result {
                Ok(doc) => documents.push(doc),
                Err(err) => {
                    tracing::warn!("skipping {}: {err}", folder.display())
                }
            }
        }
        tracing::debug!(count = documents.len(), "loaded documents");
        documents
    }

    /// Write the snapshot. The in-memory library stays authoritative, so a
    /// failed write is only logged.
    fn persist(&self) {
        if !self.config.use_cache {
            return;
        }
        if let Err(err) =
            self.cache.save(&self.root, &self.folders, &self.documents)
        {
            tracing::warn!(
                "could not write cache for {}: {err}",
                self.root.display()
            );
        }
    }

    /// Documents matching `search`, in library order.
    pub fn query(&self, search: &str) -> Result<Vec<&Document>> {
        let filter = DocumentFilter::new(search, &self.config.match_format)?;
        Ok(filter.apply(&self.documents, Some(&self.pool)))
    }

    /// The document owned by `folder`.
    pub fn get(&self, folder: &Path) -> Result<&Document> {
        let folder = canonical_or_given(folder);
        self.documents
            .iter()
            .find(|doc| doc.folder() == folder)
            .ok_or(Error::DocumentNotFound(folder))
    }

    pub fn find_by_doi(&self, doi: &str) -> Option<&Document> {
        let doi = crate::doi::normalize(doi);
        self.documents
            .iter()
            .find(|doc| doc.doi().as_deref() == Some(doi.as_str()))
    }

    /// Load the document in `folder` and add it to the library, replacing
    /// any previous copy, then rewrite the cache.
    pub fn add(&mut self, folder: &Path) -> Result<&Document> {
        let folder = folder.canonicalize()?;
        let doc = document::load_document(&folder, &self.config.info_name)?;

        let existing = self.documents.iter().position(|d| d.folder() == folder);
        let index = match existing {
            Some(i) => {
                self.documents[i] = doc;
                i
            }
            None => {
                self.documents.push(doc);
                self.documents.len() - 1
            }
        };
        self.folders.insert(folder);
        self.persist();
        Ok(&self.documents[index])
    }

    /// Reload a document after its metadata file changed on disk.
    pub fn update(&mut self, folder: &Path) -> Result<&Document> {
        self.get(folder)?;
        self.add(folder)
    }

    /// Forget the document owned by `folder` and rewrite the cache.
    pub fn remove(&mut self, folder: &Path) -> Result<Document> {
        let folder = canonical_or_given(folder);
        let index = self
            .documents
            .iter()
            .position(|doc| doc.folder() == folder)
            .ok_or_else(|| Error::DocumentNotFound(folder.clone()))?;
        let doc = self.documents.remove(index);
        self.folders.remove(&folder);
        self.persist();
        Ok(doc)
    }

    /// Delete the cached snapshot of this library.
    pub fn clear_cache(&self) -> Result<bool> {
        self.cache.invalidate(&self.root)
    }
}

fn canonical_or_given(folder: &Path) -> PathBuf {
    folder
        .canonicalize()
        .unwrap_or_else(|_| folder.to_path_buf())
}

impl DocumentStore for Library {
    fn all_documents(&self) -> &[Document] {
        &self.documents
    }
}
