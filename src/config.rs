use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use crate::error::{Error, Result};

pub const DEFAULT_INFO_NAME: &str = "info.yaml";
pub const DEFAULT_CITATIONS_FILE_NAME: &str = "citations.yaml";
pub const DEFAULT_CITED_BY_FILE_NAME: &str = "cited-by.yaml";
pub const DEFAULT_MATCH_FORMAT: &str =
    "{tags} {folder} {title} {author} {year}";
pub const DEFAULT_CROSSREF_URL: &str = "https://api.crossref.org";
pub const DEFAULT_USER_AGENT: &str = "libris/0.0.1";

pub const CACHE_DIR_ENV_VAR: &str = "LIBRIS_CACHE_DIR";
pub const MATCH_FORMAT_ENV_VAR: &str = "LIBRIS_MATCH_FORMAT";
pub const WORKERS_ENV_VAR: &str = "LIBRIS_NP";
pub const USE_CACHE_ENV_VAR: &str = "LIBRIS_USE_CACHE";
pub const CROSSREF_URL_ENV_VAR: &str = "LIBRIS_CROSSREF_URL";

/// Immutable settings shared by every component of one library.
///
/// Built once at startup and handed to constructors; nothing reads
/// configuration from a global.
#[derive(Debug, Clone)]
pub struct Config {
    pub library_root: PathBuf,
    pub cache_dir: PathBuf,
    /// Marker file identifying a document folder.
    pub info_name: String,
    pub citations_file_name: String,
    pub cited_by_file_name: String,
    /// Projection template used by the query matcher.
    pub match_format: String,
    pub use_cache: bool,
    /// Worker pool size. `None` means one worker per available core.
    pub workers: Option<usize>,
    pub crossref_base_url: String,
    pub crossref_timeout: Duration,
    pub user_agent: String,
}

impl Config {
    /// Configuration with built-in defaults for a library and cache directory.
    pub fn new(
        library_root: impl Into<PathBuf>,
        cache_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            library_root: library_root.into(),
            cache_dir: cache_dir.into(),
            info_name: DEFAULT_INFO_NAME.to_string(),
            citations_file_name: DEFAULT_CITATIONS_FILE_NAME.to_string(),
            cited_by_file_name: DEFAULT_CITED_BY_FILE_NAME.to_string(),
            match_format: DEFAULT_MATCH_FORMAT.to_string(),
            use_cache: true,
            workers: None,
            crossref_base_url: DEFAULT_CROSSREF_URL.to_string(),
            crossref_timeout: Duration::from_secs(20),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    /// Resolve the configuration for a library, applying environment
    /// overrides on top of the defaults.
    ///
    /// The cache directory is taken from, in order of priority:
    /// 1. An explicit path (from --cache-dir)
    /// 2. The LIBRIS_CACHE_DIR environment variable
    /// 3. The XDG cache directory (~/.cache/libris/)
    pub fn resolve(
        library_root: &Path,
        explicit_cache_dir: Option<&Path>,
    ) -> Result<Self> {
        if !library_root.is_dir() {
            return Err(Error::Config(format!(
                "library root is not a directory: {}",
                library_root.display()
            )));
        }

        let cache_dir = resolve_cache_dir(explicit_cache_dir)?;
        let mut config = Self::new(library_root, cache_dir);

        if let Ok(format) = std::env::var(MATCH_FORMAT_ENV_VAR)
            && !format.trim().is_empty()
        {
            config.match_format = format;
        }
        if let Ok(np) = std::env::var(WORKERS_ENV_VAR) {
            let workers = np.trim().parse::<usize>().map_err(|_| {
                Error::Config(format!(
                    "{WORKERS_ENV_VAR} must be a positive integer, got '{np}'"
                ))
            })?;
            config.workers = (workers > 0).then_some(workers);
        }
        if let Ok(flag) = std::env::var(USE_CACHE_ENV_VAR) {
            config.use_cache = parse_bool(&flag).ok_or_else(|| {
                Error::Config(format!(
                    "{USE_CACHE_ENV_VAR} must be a boolean, got '{flag}'"
                ))
            })?;
        }
        if let Ok(url) = std::env::var(CROSSREF_URL_ENV_VAR)
            && !url.trim().is_empty()
        {
            config.crossref_base_url = url.trim_end_matches('/').to_string();
        }

        Ok(config)
    }

    pub fn with_workers(mut self, workers: Option<usize>) -> Self {
        self.workers = workers.filter(|&n| n > 0);
        self
    }

    pub fn with_match_format(mut self, format: impl Into<String>) -> Self {
        self.match_format = format.into();
        self
    }

    pub fn with_use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }
}

fn resolve_cache_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    let root = if let Some(path) = explicit {
        path.to_path_buf()
    } else if let Ok(val) = std::env::var(CACHE_DIR_ENV_VAR) {
        PathBuf::from(val)
    } else {
        xdg::BaseDirectories::with_prefix("libris")
            .get_cache_home()
            .ok_or_else(|| {
                Error::Config(
                    "could not determine XDG cache home directory".into(),
                )
            })?
    };

    std::fs::create_dir_all(&root).map_err(|e| {
        Error::Config(format!(
            "cannot create cache directory {}: {e}",
            root.display()
        ))
    })?;

    Ok(root)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_with_explicit_cache_dir() {
        let lib = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let nested = cache.path().join("nested");

        let config = Config::resolve(lib.path(), Some(&nested)).unwrap();

        assert_eq!(config.cache_dir, nested);
        assert!(nested.is_dir());
        assert_eq!(config.library_root, lib.path());
        assert_eq!(config.info_name, "info.yaml");
    }

    #[test]
    fn resolve_rejects_missing_library() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("nope");
        let err = Config::resolve(&missing, Some(tmp.path())).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn zero_workers_means_default() {
        let config = Config::new("/lib", "/cache").with_workers(Some(0));
        assert_eq!(config.workers, None);
        let config = config.with_workers(Some(3));
        assert_eq!(config.workers, Some(3));
    }

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert_eq!(parse_bool("yes"), Some(true));
        assert_eq!(parse_bool(" False "), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
