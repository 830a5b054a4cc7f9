//! Metadata importers.
//!
//! An importer turns a user supplied URI (a DOI, a DOI link, free-text
//! query terms) into document metadata. Importers are registered by name
//! from a static list; callers either ask for one by name or let every
//! importer that recognizes the URI run.

use std::{path::PathBuf, sync::Arc};

use crate::{
    api::BibliographicApi,
    doi,
    document::Metadata,
    error::{Error, Result},
};

/// What an importer produced.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ImportContext {
    pub data: Metadata,
    pub files: Vec<PathBuf>,
}

impl ImportContext {
    pub fn is_empty(&self) -> bool {
        self.data.is_empty() && self.files.is_empty()
    }
}

pub trait Importer: Send {
    fn name(&self) -> &'static str;

    /// Whether this importer recognizes `uri` on its own.
    fn matches(&self, uri: &str) -> bool;

    fn fetch_data(&mut self, uri: &str) -> Result<()>;

    fn fetch_files(&mut self, _uri: &str) -> Result<()> {
        Ok(())
    }

    fn fetch(&mut self, uri: &str) -> Result<()> {
        self.fetch_data(uri)?;
        self.fetch_files(uri)
    }

    fn context(&self) -> &ImportContext;
}

pub type ImporterFactory = fn(Arc<dyn BibliographicApi>) -> Box<dyn Importer>;

const BUILTIN_IMPORTERS: &[(&str, ImporterFactory)] = &[
    ("doi", DoiImporter::boxed),
    ("crossref", CrossrefImporter::boxed),
];

pub struct ImporterRegistry {
    api: Arc<dyn BibliographicApi>,
    factories: Vec<(&'static str, ImporterFactory)>,
}

impl std::fmt::Debug for ImporterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImporterRegistry")
            .field("importers", &self.names())
            .finish()
    }
}

impl ImporterRegistry {
    /// Registry holding the built-in importers.
    pub fn new(api: Arc<dyn BibliographicApi>) -> Self {
        Self {
            api,
            factories: BUILTIN_IMPORTERS.to_vec(),
        }
    }

    /// Add or replace an importer.
    pub fn register(&mut self, name: &'static str, factory: ImporterFactory) {
        self.factories.retain(|(existing, _)| *existing != name);
        self.factories.push((name, factory));
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.factories.iter().map(|(name, _)| *name).collect()
    }

    pub fn get(&self, name: &str) -> Option<Box<dyn Importer>> {
        self.factories
            .iter()
            .find(|(existing, _)| *existing == name)
            .map(|(_, factory)| factory(Arc::clone(&self.api)))
    }

    /// Run every importer recognizing `uri` and return those that produced
    /// something. Failing importers are logged and skipped.
    pub fn matching(&self, uri: &str) -> Vec<Box<dyn Importer>> {
        let mut found = Vec::new();
        for (name, factory) in &self.factories {
            let mut importer = factory(Arc::clone(&self.api));
            if !importer.matches(uri) {
                continue;
            }
            tracing::debug!("{name} importer matches {uri}");
            match importer.fetch(uri) {
                Ok(()) if !importer.context().is_empty() => {
                    found.push(importer)
                }
                Ok(()) => {
                    tracing::info!("{name} importer found nothing for {uri}")
                }
                Err(err) => {
                    tracing::warn!("{name} importer failed for {uri}: {err}")
                }
            }
        }
        found
    }
}

/// Imports the record of a DOI, given bare or inside a link.
pub struct DoiImporter {
    api: Arc<dyn BibliographicApi>,
    ctx: ImportContext,
}

impl DoiImporter {
    pub fn new(api: Arc<dyn BibliographicApi>) -> Self {
        Self {
            api,
            ctx: ImportContext::default(),
        }
    }

    fn boxed(api: Arc<dyn BibliographicApi>) -> Box<dyn Importer> {
        Box::new(Self::new(api))
    }
}

impl Importer for DoiImporter {
    fn name(&self) -> &'static str {
        "doi"
    }

    fn matches(&self, uri: &str) -> bool {
        doi::is_valid(&doi::normalize(uri)) || doi::find_in_text(uri).is_some()
    }

    fn fetch_data(&mut self, uri: &str) -> Result<()> {
        let normalized = doi::normalize(uri);
        let target = if doi::is_valid(&normalized) {
            normalized
        } else {
            doi::find_in_text(uri).unwrap_or(normalized)
        };

        let records = self
            .api
            .lookup(&target)
            .map_err(|err| Error::RemoteFetchFailed {
                doi: target.clone(),
                reason: err.to_string(),
            })?;
        if let Some(record) = records.into_iter().next() {
            self.ctx.data = record;
        }
        Ok(())
    }

    fn context(&self) -> &ImportContext {
        &self.ctx
    }
}

/// Imports the best match of a free-text bibliographic search.
///
/// Never matches on its own since any string is a valid query; use it by
/// name.
pub struct CrossrefImporter {
    api: Arc<dyn BibliographicApi>,
    ctx: ImportContext,
}

impl CrossrefImporter {
    pub fn new(api: Arc<dyn BibliographicApi>) -> Self {
        Self {
            api,
            ctx: ImportContext::default(),
        }
    }

    fn boxed(api: Arc<dyn BibliographicApi>) -> Box<dyn Importer> {
        Box::new(Self::new(api))
    }
}

impl Importer for CrossrefImporter {
    fn name(&self) -> &'static str {
        "crossref"
    }

    fn matches(&self, _uri: &str) -> bool {
        false
    }

    fn fetch_data(&mut self, uri: &str) -> Result<()> {
        let records = self
            .api
            .search(uri)
            .map_err(|err| Error::RemoteFetchFailed {
                doi: uri.to_string(),
                reason: err.to_string(),
            })?;
        if let Some(record) = records.into_iter().next() {
            self.ctx.data = record;
        }
        Ok(())
    }

    fn context(&self) -> &ImportContext {
        &self.ctx
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::api::ApiError;

    struct StaticApi;

    impl BibliographicApi for StaticApi {
        fn lookup(
            &self,
            doi: &str,
        ) -> std::result::Result<Vec<Metadata>, ApiError> {
            match doi {
                "10.1000/known" => Ok(vec![json!({"doi": doi, "title": "Known"})
                    .as_object()
                    .unwrap()
                    .clone()]),
                "10.1000/broken" => Err(ApiError::Status { status: 500 }),
                _ => Ok(Vec::new()),
            }
        }

        fn search(
            &self,
            query: &str,
        ) -> std::result::Result<Vec<Metadata>, ApiError> {
            Ok(vec![json!({"title": query}).as_object().unwrap().clone()])
        }
    }

    fn registry() -> ImporterRegistry {
        ImporterRegistry::new(Arc::new(StaticApi))
    }

    #[test]
    fn builtins_are_registered() {
        assert_eq!(registry().names(), ["doi", "crossref"]);
        assert!(registry().get("doi").is_some());
        assert!(registry().get("arxiv").is_none());
    }

    #[test]
    fn doi_importer_matches_links_and_bare_dois() {
        let importer = registry().get("doi").unwrap();
        assert!(importer.matches("10.1000/known"));
        assert!(importer.matches("https://doi.org/10.1000/known"));
        assert!(importer.matches("see 10.1000/xyz123 for details"));
        assert!(!importer.matches("general relativity"));
    }

    #[test]
    fn matching_fetches_data() {
        let found = registry().matching("https://doi.org/10.1000/KNOWN");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name(), "doi");
        assert_eq!(found[0].context().data["title"], "Known");
    }

    #[test]
    fn matching_skips_failures_and_empty_results() {
        assert!(registry().matching("10.1000/broken").is_empty());
        assert!(registry().matching("10.1000/unknown").is_empty());
    }

    #[test]
    fn crossref_importer_only_runs_by_name() {
        assert!(registry().matching("relativity").is_empty());

        let mut importer = registry().get("crossref").unwrap();
        importer.fetch("relativity").unwrap();
        assert_eq!(importer.context().data["title"], "relativity");
    }

    #[test]
    fn register_replaces_by_name() {
        let mut registry = registry();
        registry.register("doi", CrossrefImporter::boxed);
        assert_eq!(registry.names(), ["crossref", "doi"]);
        assert_eq!(registry.get("doi").unwrap().name(), "crossref");
    }
}
