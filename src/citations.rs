//! Outgoing citation resolution.
//!
//! A document's citation stubs come from its own metadata, or from a remote
//! lookup of its DOI when the metadata has none. Each stub is resolved
//! against the local library first and only fetched remotely on a miss.

use std::collections::HashSet;

use crate::{
    api::BibliographicApi,
    doi,
    document::{self, Document},
    error::{Error, Result},
    library::{self, DocumentStore},
    sidecar::{Citation, SidecarStore},
};

pub struct CitationResolver<'a, S: ?Sized, A: ?Sized> {
    store: &'a S,
    api: &'a A,
    sidecars: &'a SidecarStore,
}

impl<'a, S, A> CitationResolver<'a, S, A>
where
    S: DocumentStore + ?Sized,
    A: BibliographicApi + ?Sized,
{
    pub fn new(store: &'a S, api: &'a A, sidecars: &'a SidecarStore) -> Self {
        Self {
            store,
            api,
            sidecars,
        }
    }

    /// Resolve the citations of `doc` without touching disk.
    ///
    /// The result follows stub order and holds each DOI once. Remote
    /// failures for individual citations are logged and the citation is
    /// dropped; failing to fetch the document's own record is an error.
    pub fn resolve(&self, doc: &Document) -> Result<Vec<Citation>> {
        let stubs = self.stubs(doc)?;
        if stubs.is_empty() {
            return Ok(Vec::new());
        }

        let index = library::doi_index(self.store.all_documents());
        let local = stubs.iter().filter(|d| index.contains_key(*d)).count();
        tracing::info!(
            total = stubs.len(),
            local,
            remote = stubs.len() - local,
            "resolving citations of {}",
            doc.folder().display()
        );

        let mut citations = Vec::with_capacity(stubs.len());
        for stub in stubs {
            let citation = match index.get(&stub) {
                Some(found) => Citation::from_document(found),
                None => self.fetch_remote(&stub),
            };
            if let Some(mut citation) = citation {
                citation.doi = stub;
                citations.push(citation);
            }
        }
        Ok(citations)
    }

    /// Resolve and write the citation sidecar of `doc`.
    ///
    /// An empty result is persisted too, so the document counts as
    /// resolved.
    pub fn resolve_and_persist(&self, doc: &Document) -> Result<Vec<Citation>> {
        let citations = self.resolve(doc)?;
        self.sidecars.save_citations(doc.folder(), &citations)?;
        Ok(citations)
    }

    /// Citations from the sidecar, resolving and persisting them first when
    /// the document was never resolved.
    pub fn citations(&self, doc: &Document) -> Result<Vec<Citation>> {
        match self.sidecars.load_citations(doc.folder())? {
            Some(citations) => Ok(citations),
            None => self.resolve_and_persist(doc),
        }
    }

    /// Replace entries of an existing sidecar with fresh copies of local
    /// documents carrying the same DOI.
    ///
    /// Returns `None` when the document has no sidecar yet. Entries with no
    /// local counterpart are kept as they are.
    pub fn refresh_from_library(
        &self,
        doc: &Document,
    ) -> Result<Option<Vec<Citation>>> {
        let Some(existing) = self.sidecars.load_citations(doc.folder())? else {
            return Ok(None);
        };

        let index = library::doi_index(self.store.all_documents());
        let refreshed: Vec<Citation> = existing
            .into_iter()
            .map(|citation| {
                index
                    .get(&citation.doi)
                    .and_then(|found| Citation::from_document(found))
                    .map(|mut fresh| {
                        fresh.doi = citation.doi.clone();
                        fresh
                    })
                    .unwrap_or(citation)
            })
            .collect();

        self.sidecars.save_citations(doc.folder(), &refreshed)?;
        Ok(Some(refreshed))
    }

    /// Normalized, deduplicated stub DOIs of `doc` in their original order.
    fn stubs(&self, doc: &Document) -> Result<Vec<String>> {
        let from_metadata: Vec<String> = doc
            .metadata_citations()
            .into_iter()
            .filter_map(|entry| entry.get("doi").map(document::value_text))
            .collect();

        let raw = if !from_metadata.is_empty() {
            from_metadata
        } else {
            let own = doc
                .doi()
                .ok_or_else(|| Error::NoDoi(doc.folder().to_path_buf()))?;
            self.remote_stubs(&own)?
        };

        let mut seen = HashSet::new();
        Ok(raw
            .iter()
            .map(|d| doi::normalize(d))
            .filter(|d| !d.is_empty() && seen.insert(d.clone()))
            .collect())
    }

    fn remote_stubs(&self, own: &str) -> Result<Vec<String>> {
        let records = self
            .api
            .lookup(own)
            .map_err(|err| Error::RemoteFetchFailed {
                doi: own.to_string(),
                reason: err.to_string(),
            })?;
        let record = records.first().ok_or_else(|| Error::RemoteFetchFailed {
            doi: own.to_string(),
            reason: "no record found".to_string(),
        })?;

        Ok(document::metadata_citations(record)
            .into_iter()
            .filter_map(|entry| entry.get("doi").map(document::value_text))
            .collect())
    }

    fn fetch_remote(&self, stub: &str) -> Option<Citation> {
        match self.api.lookup(stub) {
            Ok(records) => {
                let Some(mut record) = records.into_iter().next() else {
                    tracing::warn!("no record found for citation {stub}");
                    return None;
                };
                record
                    .entry("doi")
                    .or_insert_with(|| stub.to_string().into());
                Citation::from_metadata(record)
            }
            Err(err) => {
                tracing::warn!("could not fetch citation {stub}: {err}");
                None
            }
        }
    }
}
