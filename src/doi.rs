//! DOI normalization and detection.

use std::sync::LazyLock;

use regex::Regex;

static DOI_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^10\.\d{4,9}/\S+$").expect("DOI pattern is valid")
});

static DOI_IN_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)10\.\d{4,9}/[^\s"'<>]+"#)
        .expect("DOI search pattern is valid")
});

const PREFIXES: &[&str] = &[
    "https://doi.org/",
    "http://doi.org/",
    "https://dx.doi.org/",
    "http://dx.doi.org/",
    "doi.org/",
    "doi:",
];

/// Normalize a DOI to its canonical comparison form: trimmed, lowercase,
/// with resolver URL and `doi:` prefixes removed.
pub fn normalize(doi: &str) -> String {
    let mut value = doi.trim().to_lowercase();
    for prefix in PREFIXES {
        if let Some(rest) = value.strip_prefix(prefix) {
            value = rest.trim().to_string();
            break;
        }
    }
    value
}

/// Whether `doi` is a well-formed DOI after normalization.
pub fn is_valid(doi: &str) -> bool {
    DOI_PATTERN.is_match(&normalize(doi))
}

/// Find the first DOI in a piece of text such as a URL or a reference string.
pub fn find_in_text(text: &str) -> Option<String> {
    DOI_IN_TEXT.find(text).map(|m| {
        let found = m.as_str().trim_end_matches(['.', ',', ';', ')', ']']);
        normalize(found)
    })
}
