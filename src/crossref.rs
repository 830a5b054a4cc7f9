//! Crossref REST client.
//!
//! Talks to `https://api.crossref.org/works` and converts Crossref work
//! messages into the metadata keys used by library documents.

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use reqwest::{StatusCode, blocking::Client};
use serde_json::{Value, json};

use crate::{
    api::{ApiError, BibliographicApi},
    config::Config,
    document::Metadata,
    error,
};

/// Characters escaped in the DOI path segment. `/` stays literal.
const DOI_PATH: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

const DEFAULT_SEARCH_ROWS: usize = 20;
const AUTHOR_SEPARATOR: &str = " and ";

pub struct CrossrefClient {
    base_url: String,
    http: Client,
}

impl std::fmt::Debug for CrossrefClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrossrefClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl CrossrefClient {
    pub fn new(config: &Config) -> error::Result<Self> {
        let http = Client::builder()
            .timeout(config.crossref_timeout)
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self {
            base_url: config
                .crossref_base_url
                .trim_end_matches('/')
                .to_string(),
            http,
        })
    }

    fn get(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<Option<Value>, ApiError> {
        let resp = self.http.get(url).query(query).send()?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
            });
        }
        Ok(Some(resp.json::<Value>()?))
    }

    /// Works matching every filter set in `search`, most relevant first.
    pub fn search_works(
        &self,
        search: &WorkSearch,
    ) -> Result<Vec<Metadata>, ApiError> {
        let url = format!("{}/works", self.base_url);
        tracing::debug!(%url, ?search, "crossref search");
        match self.get(&url, &search.params())? {
            Some(body) => works_from_response(&body),
            None => Ok(Vec::new()),
        }
    }
}

impl BibliographicApi for CrossrefClient {
    fn lookup(&self, doi: &str) -> Result<Vec<Metadata>, ApiError> {
        let url = format!(
            "{}/works/{}",
            self.base_url,
            utf8_percent_encode(doi, DOI_PATH)
        );
        tracing::debug!(%url, "crossref lookup");
        match self.get(&url, &[])? {
            Some(body) => works_from_response(&body),
            None => Ok(Vec::new()),
        }
    }

    fn search(&self, query: &str) -> Result<Vec<Metadata>, ApiError> {
        self.search_works(&WorkSearch::new(query))
    }
}

/// Filters for a Crossref work search. Empty filters are not sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkSearch {
    pub query: String,
    pub author: Option<String>,
    pub title: Option<String>,
    /// Row limit; the client default applies when unset.
    pub max_results: Option<usize>,
}

impl WorkSearch {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn max_results(mut self, rows: usize) -> Self {
        self.max_results = Some(rows);
        self
    }

    fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        let filters = [
            ("query", Some(&self.query)),
            ("query.author", self.author.as_ref()),
            ("query.bibliographic", self.title.as_ref()),
        ];
        for (key, value) in filters {
            if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
                params.push((key, value.trim().to_string()));
            }
        }
        let rows = self
            .max_results
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_SEARCH_ROWS);
        params.push(("rows", rows.to_string()));
        params.push(("sort", "relevance".to_string()));
        params
    }
}

/// Extract works from a Crossref envelope: either a single work message or
/// a list message with `items`.
pub fn works_from_response(body: &Value) -> Result<Vec<Metadata>, ApiError> {
    let message = body
        .get("message")
        .ok_or_else(|| ApiError::Malformed("response has no message".into()))?;

    let works: Vec<&Value> = match message.get("items") {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(_) => {
            return Err(ApiError::Malformed("items is not a list".into()));
        }
        None => vec![message],
    };
    tracing::debug!(count = works.len(), "retrieved crossref works");
    Ok(works.into_iter().map(convert_work).collect())
}

/// Convert one Crossref work into document metadata.
///
/// Fields that are missing or have an unexpected shape are skipped.
pub fn convert_work(work: &Value) -> Metadata {
    let mut data = Metadata::new();

    copy_string(work, "DOI", "doi", &mut data);
    copy_string(work, "URL", "url", &mut data);
    for key in ["issue", "volume", "language", "publisher"] {
        copy_string(work, key, key, &mut data);
    }

    if let Some(isbn) = work.get("ISBN").and_then(first_string) {
        data.insert("isbn".into(), json!(isbn));
    }
    if let Some(Value::Array(parts)) = work.get("title") {
        let title = parts
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(" ");
        if !title.is_empty() {
            data.insert("title".into(), json!(title));
        }
    }
    if let Some(journal) = work.get("container-title").and_then(first_string) {
        data.insert("journal".into(), json!(journal));
    }
    if let Some(page) = work.get("page").and_then(Value::as_str) {
        data.insert("pages".into(), json!(bibtex_page_range(page)));
    }
    if let Some(kind) = work.get("type").and_then(Value::as_str) {
        data.insert("type".into(), json!(convert_type(kind)));
    }

    if let Some(Value::Array(authors)) = work.get("author") {
        let list: Vec<Value> = authors
            .iter()
            .map(|a| {
                json!({
                    "given": a.get("given").cloned().unwrap_or(Value::Null),
                    "family": a.get("family").cloned().unwrap_or(Value::Null),
                })
            })
            .collect();
        let names: Vec<String> =
            list.iter().filter_map(format_author).collect();
        if !names.is_empty() {
            data.insert("author".into(), json!(names.join(AUTHOR_SEPARATOR)));
        }
        data.insert("author_list".into(), Value::Array(list));
    }

    let date = work
        .get("published-print")
        .or_else(|| work.get("issued"))
        .and_then(|d| d.pointer("/date-parts/0"));
    if let Some(Value::Array(parts)) = date {
        if let Some(year) = parts.first().filter(|v| v.is_number()) {
            data.insert("year".into(), year.clone());
        }
        if let Some(month) = parts.get(1).filter(|v| v.is_number()) {
            data.insert("month".into(), month.clone());
        }
    }

    if let Some(event) = work.get("event") {
        if let Some(venue) = event.get("location").and_then(Value::as_str) {
            data.insert("venue".into(), json!(venue));
        }
        if let Some(name) = event.get("name").and_then(Value::as_str) {
            data.insert("booktitle".into(), json!(name));
        }
    }

    if let Some(Value::Array(references)) = work.get("reference") {
        let citations: Vec<Value> = references
            .iter()
            .filter_map(Value::as_object)
            .map(|reference| {
                let entry: Metadata = reference
                    .iter()
                    .filter(|(k, _)| {
                        k.as_str() != "key" && k.as_str() != "doi-asserted-by"
                    })
                    .map(|(k, v)| (k.to_lowercase(), v.clone()))
                    .collect();
                Value::Object(entry)
            })
            .collect();
        data.insert("citations".into(), Value::Array(citations));
    }

    data
}

fn copy_string(work: &Value, from: &str, to: &str, data: &mut Metadata) {
    if let Some(value) = work.get(from).and_then(Value::as_str) {
        data.insert(to.to_string(), json!(value));
    }
}

fn first_string(value: &Value) -> Option<&str> {
    match value {
        Value::Array(items) => items.first().and_then(Value::as_str),
        Value::String(s) => Some(s),
        _ => None,
    }
}

fn format_author(author: &Value) -> Option<String> {
    let family = author.get("family").and_then(Value::as_str);
    let given = author.get("given").and_then(Value::as_str);
    match (family, given) {
        (Some(family), Some(given)) => Some(format!("{family}, {given}")),
        (Some(family), None) => Some(family.to_string()),
        (None, Some(given)) => Some(given.to_string()),
        (None, None) => None,
    }
}

/// `12-15` becomes the BibTeX range `12--15`; existing `--` is kept.
fn bibtex_page_range(page: &str) -> String {
    if page.contains("--") {
        page.to_string()
    } else {
        page.replace('-', "--")
    }
}

fn convert_type(kind: &str) -> &'static str {
    match kind {
        "book" | "edited-book" | "reference-book" => "book",
        "book-chapter" | "book-part" | "book-section" | "book-track" => {
            "inbook"
        }
        "book-series" | "book-set" | "standard-series" => "incollection",
        "dissertation" => "phdthesis",
        "journal-article" | "journal-volume" | "peer-review" => "article",
        "monograph" => "monograph",
        "proceedings-article"
        | "proceedings"
        | "proceedings-series"
        | "report-series" => "inproceedings",
        "report" => "report",
        "standard" => "techreport",
        _ => "misc",
    }
}
