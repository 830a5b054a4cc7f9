use crate::document::Metadata;

/// Failure talking to a bibliographic service.
///
/// "Not found" is not an error: lookups return an empty record set.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("service answered with status {status}")]
    Status { status: u16 },

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Malformed(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// A remote bibliographic service returning normalized metadata records.
///
/// Records use the same keys as document metadata (`doi`, `title`,
/// `author`, `year`, `journal`, `citations`, ...).
pub trait BibliographicApi: Send + Sync {
    /// Records for one DOI. Empty when the DOI is unknown.
    fn lookup(&self, doi: &str) -> Result<Vec<Metadata>, ApiError>;

    /// Records matching free-text query terms.
    fn search(&self, query: &str) -> Result<Vec<Metadata>, ApiError>;
}
