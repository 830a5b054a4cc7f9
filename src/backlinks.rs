//! Incoming citation resolution ("cited by").
//!
//! A backlink is computed locally: every document whose citation sidecar
//! lists the target's DOI cites the target. Documents that were never
//! resolved have no sidecar and do not count.

use crate::{
    document::Document,
    error::{Error, Result},
    library::DocumentStore,
    pool::WorkerPool,
    sidecar::{Backlink, SidecarStore},
};

pub struct BacklinkResolver<'a, S: ?Sized> {
    store: &'a S,
    sidecars: &'a SidecarStore,
    pool: &'a WorkerPool,
}

impl<'a, S: DocumentStore + ?Sized> BacklinkResolver<'a, S> {
    pub fn new(
        store: &'a S,
        sidecars: &'a SidecarStore,
        pool: &'a WorkerPool,
    ) -> Self {
        Self {
            store,
            sidecars,
            pool,
        }
    }

    /// Local documents citing `doc`, in library order.
    ///
    /// Sidecars are read in parallel. An unreadable sidecar is logged and
    /// its owner skipped. A document citing its own DOI is its own backlink.
    pub fn resolve(&self, doc: &Document) -> Result<Vec<&'a Document>> {
        let target = doc
            .doi()
            .ok_or_else(|| Error::NoDoi(doc.folder().to_path_buf()))?;

        let corpus: &'a [Document] = self.store.all_documents();
        let citing = self
            .pool
            .filter(corpus, |candidate| self.cites(candidate, &target));
        tracing::debug!(
            count = citing.len(),
            "{} is cited by local documents",
            doc.folder().display()
        );
        Ok(citing)
    }

    /// Resolve and write the cited-by sidecar of `doc`, even when empty.
    pub fn resolve_and_persist(
        &self,
        doc: &Document,
    ) -> Result<Vec<Backlink>> {
        let backlinks: Vec<Backlink> = self
            .resolve(doc)?
            .into_iter()
            .map(Backlink::from_document)
            .collect();
        self.sidecars.save_backlinks(doc.folder(), &backlinks)?;
        Ok(backlinks)
    }

    /// Backlinks from the sidecar, resolving and persisting them first when
    /// none were stored yet.
    pub fn backlinks(&self, doc: &Document) -> Result<Vec<Backlink>> {
        match self.sidecars.load_backlinks(doc.folder())? {
            Some(backlinks) => Ok(backlinks),
            None => self.resolve_and_persist(doc),
        }
    }

    fn cites(&self, candidate: &Document, target: &str) -> bool {
        match self.sidecars.load_citations(candidate.folder()) {
            Ok(Some(citations)) => citations.iter().any(|c| c.doi == target),
            Ok(None) => false,
            Err(err) => {
                tracing::warn!(
                    "skipping citations of {}: {err}",
                    candidate.folder().display()
                );
                false
            }
        }
    }
}
