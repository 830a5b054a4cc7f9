//! libris - a cached document index and citation graph for folder-based
//! bibliographic libraries.
//!
//! A library is a directory tree in which every folder holding an
//! `info.yaml` file is one document. libris scans the tree, caches the
//! parsed documents per library root, filters them with free-text queries
//! and resolves which works each document cites and which local documents
//! cite it back. Resolved citations are stored next to each document as
//! YAML sidecar files.
//!
//! # Quick start
//!
//! ```no_run
//! use std::path::Path;
//!
//! use libris::{Config, CrossrefClient, Library, SidecarStore};
//! use libris::citations::CitationResolver;
//!
//! let config = Config::resolve(Path::new("papers"), None).unwrap();
//! let library = Library::open(config.clone()).unwrap();
//!
//! for doc in library.query("einstein 1905").unwrap() {
//!     println!("{}", doc.folder().display());
//! }
//!
//! let api = CrossrefClient::new(&config).unwrap();
//! let sidecars = SidecarStore::new(&config);
//! let resolver = CitationResolver::new(&library, &api, &sidecars);
//! let doc = &library.documents()[0];
//! for citation in resolver.citations(doc).unwrap() {
//!     println!("{} {}", citation.doi, citation.title().unwrap_or_default());
//! }
//! ```

pub mod api;
pub mod backlinks;
pub mod cache;
pub mod citations;
pub mod config;
pub mod crossref;
pub mod doi;
pub mod document;
pub mod error;
pub mod importer;
pub mod library;
pub mod matcher;
pub mod pool;
pub mod scan;
pub mod sidecar;

pub use api::{ApiError, BibliographicApi};
pub use cache::CacheStore;
pub use config::Config;
pub use crossref::{CrossrefClient, WorkSearch};
pub use document::{Document, Metadata};
pub use error::{Error, Result};
pub use library::{DocumentStore, Library};
pub use pool::WorkerPool;
pub use sidecar::{Backlink, Citation, SidecarStore};
