//! Derived per-document records stored next to the metadata file.
//!
//! A missing sidecar means "never resolved"; an empty one means "resolved,
//! nothing found". The two states are kept distinct by [`SidecarStore::load`]
//! returning `None` versus `Some(vec![])`.

use std::{
    io::Write,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{
    config::Config,
    doi,
    document::{self, Document, Metadata},
    error::{Error, Result},
};

/// An outgoing citation, identified by its normalized DOI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub doi: String,
    #[serde(flatten)]
    pub fields: Metadata,
}

impl Citation {
    /// Build a citation from a metadata record.
    ///
    /// Returns `None` when the record has no DOI. Nested `citations` are
    /// dropped so stored graphs stay one level deep.
    pub fn from_metadata(mut data: Metadata) -> Option<Self> {
        let doi = match data.remove("doi")? {
            Value::String(s) if !s.trim().is_empty() => doi::normalize(&s),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        document::strip_citations(&mut data);
        Some(Self { doi, fields: data })
    }

    /// Citation record describing a local document, if it has a DOI.
    pub fn from_document(doc: &Document) -> Option<Self> {
        Self::from_metadata(doc.to_metadata())
    }

    pub fn title(&self) -> Option<&str> {
        self.fields.get("title").and_then(Value::as_str)
    }

    pub fn author(&self) -> Option<&str> {
        self.fields.get("author").and_then(Value::as_str)
    }

    pub fn year(&self) -> Option<String> {
        self.fields.get("year").map(document::value_text)
    }
}

/// A local document that cites the sidecar's owner.
///
/// Citing documents are identified by folder because they need not have a
/// DOI of their own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Backlink {
    pub folder: PathBuf,
    #[serde(flatten)]
    pub fields: Metadata,
}

impl Backlink {
    pub fn from_document(doc: &Document) -> Self {
        let mut fields = doc.to_metadata();
        fields.remove("folder");
        Self {
            folder: doc.folder().to_path_buf(),
            fields,
        }
    }

    pub fn doi(&self) -> Option<String> {
        self.fields
            .get("doi")
            .and_then(Value::as_str)
            .map(doi::normalize)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SidecarKind {
    /// Outgoing citations of the document.
    Citations,
    /// Local documents citing the document.
    CitedBy,
}

/// Reads and writes sidecar files inside document folders.
#[derive(Debug, Clone)]
pub struct SidecarStore {
    citations_file_name: String,
    cited_by_file_name: String,
}

impl SidecarStore {
    pub fn new(config: &Config) -> Self {
        Self {
            citations_file_name: config.citations_file_name.clone(),
            cited_by_file_name: config.cited_by_file_name.clone(),
        }
    }

    pub fn path(&self, folder: &Path, kind: SidecarKind) -> PathBuf {
        match kind {
            SidecarKind::Citations => folder.join(&self.citations_file_name),
            SidecarKind::CitedBy => folder.join(&self.cited_by_file_name),
        }
    }

    pub fn exists(&self, folder: &Path, kind: SidecarKind) -> bool {
        self.path(folder, kind).is_file()
    }

    /// Load a sidecar. `Ok(None)` when the file does not exist.
    pub fn load<T: DeserializeOwned>(
        &self,
        folder: &Path,
        kind: SidecarKind,
    ) -> Result<Option<Vec<T>>> {
        let path = self.path(folder, kind);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };
        if content.trim().is_empty() {
            return Ok(Some(Vec::new()));
        }

        let records: Option<Vec<T>> = serde_yaml::from_str(&content)?;
        Ok(Some(records.unwrap_or_default()))
    }

    /// Replace a sidecar with `records`.
    ///
    /// The file is written to a temporary sibling and renamed into place, so
    /// a failed write leaves the previous sidecar untouched.
    pub fn save<T: Serialize>(
        &self,
        folder: &Path,
        kind: SidecarKind,
        records: &[T],
    ) -> Result<()> {
        let path = self.path(folder, kind);
        let mut tmp = tempfile::NamedTempFile::new_in(folder)?;
        serde_yaml::to_writer(&mut tmp, records)?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| Error::Persist {
            path: path.clone(),
            source: e.error,
        })?;
        tracing::debug!(
            path = %path.display(),
            count = records.len(),
            "saved sidecar"
        );
        Ok(())
    }

    pub fn load_citations(
        &self,
        folder: &Path,
    ) -> Result<Option<Vec<Citation>>> {
        Ok(self
            .load::<Citation>(folder, SidecarKind::Citations)?
            .map(|citations| {
                citations
                    .into_iter()
                    .map(|mut c| {
                        c.doi = doi::normalize(&c.doi);
                        c
                    })
                    .collect()
            }))
    }

    pub fn save_citations(
        &self,
        folder: &Path,
        citations: &[Citation],
    ) -> Result<()> {
        self.save(folder, SidecarKind::Citations, citations)
    }

    pub fn load_backlinks(
        &self,
        folder: &Path,
    ) -> Result<Option<Vec<Backlink>>> {
        self.load(folder, SidecarKind::CitedBy)
    }

    pub fn save_backlinks(
        &self,
        folder: &Path,
        backlinks: &[Backlink],
    ) -> Result<()> {
        self.save(folder, SidecarKind::CitedBy, backlinks)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn store() -> SidecarStore {
        SidecarStore::new(&Config::new("/lib", "/cache"))
    }

    fn metadata(value: Value) -> Metadata {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn citation_from_metadata_normalizes_and_strips() {
        let c = Citation::from_metadata(metadata(json!({
            "doi": "10.1/ABC",
            "title": "A",
            "citations": [{"doi": "10.1/deep"}]
        })))
        .unwrap();
        assert_eq!(c.doi, "10.1/abc");
        assert_eq!(c.title(), Some("A"));
        assert!(!c.fields.contains_key("citations"));
        assert!(!c.fields.contains_key("doi"));
    }

    #[test]
    fn citation_requires_doi() {
        let untitled = metadata(json!({"title": "x"}));
        assert!(Citation::from_metadata(untitled).is_none());
        let blank = metadata(json!({"doi": "  "}));
        assert!(Citation::from_metadata(blank).is_none());
    }

    #[test]
    fn missing_sidecar_is_none_and_empty_is_some() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store();

        assert_eq!(store.load_citations(tmp.path()).unwrap(), None);

        store.save_citations(tmp.path(), &[]).unwrap();
        assert_eq!(store.load_citations(tmp.path()).unwrap(), Some(vec![]));
        assert!(store.exists(tmp.path(), SidecarKind::Citations));
        assert!(!store.exists(tmp.path(), SidecarKind::CitedBy));
    }

    #[test]
    fn citations_survive_save_and_load() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store();
        let citations = vec![
            Citation::from_metadata(metadata(
                json!({"doi": "10.1/a", "title": "A", "year": 1905}),
            ))
            .unwrap(),
            Citation::from_metadata(metadata(json!({"doi": "10.1/b"})))
                .unwrap(),
        ];

        store.save_citations(tmp.path(), &citations).unwrap();
        let loaded = store.load_citations(tmp.path()).unwrap().unwrap();

        assert_eq!(loaded, citations);
        assert_eq!(loaded[0].year().as_deref(), Some("1905"));
        let path = store.path(tmp.path(), SidecarKind::Citations);
        let raw = std::fs::read_to_string(path).unwrap();
        assert!(raw.contains("doi: 10.1/a"));
    }

    #[test]
    fn hand_written_uppercase_dois_are_normalized_on_load() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store();
        std::fs::write(
            tmp.path().join("citations.yaml"),
            "- doi: 10.1/UPPER\n  title: Shouting\n",
        )
        .unwrap();

        let loaded = store.load_citations(tmp.path()).unwrap().unwrap();
        assert_eq!(loaded[0].doi, "10.1/upper");
    }

    #[test]
    fn backlinks_keep_folder_identity() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store();
        let doc = Document::new(
            tmp.path().join("citer"),
            metadata(json!({
                "title": "Citer",
                "citations": [{"doi": "10.1/a"}],
            })),
        );
        let backlinks = vec![Backlink::from_document(&doc)];

        store.save_backlinks(tmp.path(), &backlinks).unwrap();
        let loaded = store.load_backlinks(tmp.path()).unwrap().unwrap();

        assert_eq!(loaded, backlinks);
        assert_eq!(loaded[0].folder, tmp.path().join("citer"));
        assert!(!loaded[0].fields.contains_key("citations"));
        assert_eq!(loaded[0].doi(), None);
    }

    fn sample_citations() -> Vec<Citation> {
        vec![
            Citation::from_metadata(metadata(json!({"doi": "10.1/a"})))
                .unwrap(),
        ]
    }

    #[cfg(unix)]
    #[test]
    fn failed_write_keeps_previous_sidecar() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let folder = tmp.path().join("doc");
        std::fs::create_dir(&folder).unwrap();
        let store = store();
        let original = sample_citations();
        store.save_citations(&folder, &original).unwrap();

        let set_mode = |mode| {
            std::fs::set_permissions(
                &folder,
                std::fs::Permissions::from_mode(mode),
            )
            .unwrap()
        };
        set_mode(0o555);
        // Privileged users ignore directory modes.
        if tempfile::NamedTempFile::new_in(&folder).is_ok() {
            set_mode(0o755);
            return;
        }

        let result = store.save_citations(&folder, &[]);
        set_mode(0o755);

        assert!(result.is_err());
        assert_eq!(store.load_citations(&folder).unwrap(), Some(original));
    }

    #[cfg(unix)]
    #[test]
    fn unserializable_records_leave_sidecar_untouched() {
        use std::{ffi::OsStr, os::unix::ffi::OsStrExt};

        let tmp = tempfile::tempdir().unwrap();
        let store = store();
        let doc = Document::new(tmp.path().join("citer"), Metadata::new());
        let original = vec![Backlink::from_document(&doc)];
        store.save_backlinks(tmp.path(), &original).unwrap();

        let odd = Document::new(
            tmp.path().join(OsStr::from_bytes(b"caf\xe9")),
            Metadata::new(),
        );
        let result =
            store.save_backlinks(tmp.path(), &[Backlink::from_document(&odd)]);

        assert!(result.is_err());
        assert_eq!(store.load_backlinks(tmp.path()).unwrap(), Some(original));
        let leftovers = std::fs::read_dir(tmp.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn malformed_sidecar_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("citations.yaml");
        std::fs::write(path, "doi: not-a-list\n").unwrap();
        assert!(store().load_citations(tmp.path()).is_err());
    }
}
