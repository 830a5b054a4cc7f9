use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    doi,
    error::{Error, Result},
};

/// String-keyed metadata of a document or citation record.
pub type Metadata = serde_json::Map<String, Value>;

const FILES_KEY: &str = "files";
const CITATIONS_KEY: &str = "citations";

/// One library entry: a folder holding a metadata file.
///
/// The folder path is the document's identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    folder: PathBuf,
    data: Metadata,
    files: Vec<String>,
}

impl Document {
    /// Build a document from already parsed metadata.
    ///
    /// The `files` key is moved out of the map into the attached file list.
    pub fn new(folder: impl Into<PathBuf>, mut data: Metadata) -> Self {
        let files = match data.remove(FILES_KEY) {
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(name) => Some(name),
                    _ => None,
                })
                .collect(),
            Some(Value::String(name)) => vec![name],
            _ => Vec::new(),
        };
        Self {
            folder: folder.into(),
            data,
            files,
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// Last component of the folder path.
    pub fn folder_name(&self) -> String {
        self.folder
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn data(&self) -> &Metadata {
        &self.data
    }

    pub fn files(&self) -> &[String] {
        &self.files
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.data.get(key).is_some_and(|v| !v.is_null())
    }

    /// Render a field for display or matching. Missing keys render empty.
    pub fn field_text(&self, key: &str) -> String {
        self.data.get(key).map(value_text).unwrap_or_default()
    }

    /// The document's own DOI, normalized.
    pub fn doi(&self) -> Option<String> {
        match self.data.get("doi") {
            Some(Value::String(s)) if !s.trim().is_empty() => {
                Some(doi::normalize(s))
            }
            _ => None,
        }
    }

    pub fn title(&self) -> Option<&str> {
        self.data.get("title").and_then(Value::as_str)
    }

    /// Citation entries in the metadata that already carry a DOI.
    pub fn metadata_citations(&self) -> Vec<&Metadata> {
        metadata_citations(&self.data)
    }

    /// Flatten into a single metadata map, files included and nested
    /// citations removed.
    pub fn to_metadata(&self) -> Metadata {
        let mut data = self.data.clone();
        data.remove(CITATIONS_KEY);
        if !self.files.is_empty() {
            let files =
                self.files.iter().cloned().map(Value::String).collect();
            data.insert(FILES_KEY.to_string(), Value::Array(files));
        }
        data
    }

    /// Replace the metadata of this document in place.
    pub fn update(&mut self, data: Metadata) {
        let replacement = Self::new(self.folder.clone(), data);
        self.data = replacement.data;
        self.files = replacement.files;
    }
}

/// Citation entries of a metadata map that are maps carrying a non-blank
/// `doi`.
pub fn metadata_citations(data: &Metadata) -> Vec<&Metadata> {
    match data.get(CITATIONS_KEY) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_object)
            .filter(|entry| {
                entry
                    .get("doi")
                    .is_some_and(|v| !value_text(v).trim().is_empty())
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Remove a nested `citations` key so stored graphs stay one level deep.
pub fn strip_citations(data: &mut Metadata) {
    data.remove(CITATIONS_KEY);
}

/// Render a metadata value as plain text.
///
/// Strings are verbatim, lists are joined with spaces, maps render their
/// values in key order.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .map(value_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" "),
        Value::Object(map) => map
            .values()
            .map(value_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" "),
    }
}

/// Load the document stored in `folder`, reading its `info_name` file.
///
/// An empty metadata file yields a document with no fields.
pub fn load_document(folder: &Path, info_name: &str) -> Result<Document> {
    let info_path = folder.join(info_name);
    let content = std::fs::read_to_string(&info_path)?;
    let data = parse_metadata(&content, &info_path)?;
    Ok(Document::new(folder, data))
}

fn parse_metadata(content: &str, path: &Path) -> Result<Metadata> {
    if content.trim().is_empty() {
        return Ok(Metadata::new());
    }

    let value: Value =
        serde_yaml::from_str(content).map_err(|e| Error::Metadata {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Metadata::new()),
        other => Err(Error::Metadata {
            path: path.to_path_buf(),
            reason: format!(
                "expected a mapping at the top level, found {}",
                kind_of(&other)
            ),
        }),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn write_info(dir: &Path, content: &str) {
        std::fs::write(dir.join("info.yaml"), content).unwrap();
    }

    #[test]
    fn loads_fields_and_files() {
        let tmp = tempfile::tempdir().unwrap();
        write_info(
            tmp.path(),
            "title: On the Electrodynamics of Moving Bodies\n\
             author: Einstein, A.\n\
             year: 1905\n\
             doi: 10.1002/ANDP.19053221004\n\
             files:\n  - paper.pdf\n  - notes.md\n",
        );

        let doc = load_document(tmp.path(), "info.yaml").unwrap();

        assert_eq!(doc.folder(), tmp.path());
        assert_eq!(
            doc.title(),
            Some("On the Electrodynamics of Moving Bodies")
        );
        assert_eq!(doc.field_text("year"), "1905");
        assert_eq!(doc.doi().as_deref(), Some("10.1002/andp.19053221004"));
        assert_eq!(doc.files(), ["paper.pdf", "notes.md"]);
        assert!(!doc.has("files"));
    }

    #[test]
    fn empty_info_file_is_empty_document() {
        let tmp = tempfile::tempdir().unwrap();
        write_info(tmp.path(), "");
        let doc = load_document(tmp.path(), "info.yaml").unwrap();
        assert!(doc.data().is_empty());
        assert!(doc.files().is_empty());
    }

    #[test]
    fn non_mapping_info_file_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        write_info(tmp.path(), "- just\n- a list\n");
        let err = load_document(tmp.path(), "info.yaml").unwrap_err();
        assert!(matches!(err, Error::Metadata { .. }));
    }

    #[test]
    fn missing_info_file_is_io_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = load_document(tmp.path(), "info.yaml").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn metadata_citations_keep_only_entries_with_doi() {
        let data = json!({
            "citations": [
                {"doi": "10.1/a", "title": "A"},
                {"title": "no doi"},
                {"doi": "  ", "title": "blank doi"},
                {"doi": null},
                "plain string",
                {"doi": "10.1/b"}
            ]
        });
        let doc = Document::new("/lib/x", data.as_object().unwrap().clone());
        let dois: Vec<_> = doc
            .metadata_citations()
            .iter()
            .map(|c| c["doi"].as_str().unwrap())
            .collect();
        assert_eq!(dois, vec!["10.1/a", "10.1/b"]);
    }

    #[test]
    fn to_metadata_strips_citations_and_restores_files() {
        let data = json!({
            "title": "T",
            "files": ["a.pdf"],
            "citations": [{"doi": "10.1/a"}]
        });
        let doc = Document::new("/lib/x", data.as_object().unwrap().clone());
        let flat = doc.to_metadata();
        assert!(!flat.contains_key("citations"));
        assert_eq!(flat["files"], json!(["a.pdf"]));
    }

    #[test]
    fn value_text_joins_lists() {
        assert_eq!(
            value_text(&json!(["physics", "relativity"])),
            "physics relativity"
        );
        assert_eq!(value_text(&json!(null)), "");
        assert_eq!(value_text(&json!(3.5)), "3.5");
    }
}
