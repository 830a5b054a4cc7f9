//! Free-text document matching.
//!
//! Matching is a two-stage pipeline: a [`MatchFormat`] projects a document
//! onto one string, then a [`Matcher`] compiled from the search string tests
//! that string. Search tokens must appear in the order they were typed, with
//! anything (or nothing) in between: `"einstein 1905"` matches
//! `"Einstein, A. (1905)"` but not `"1905 Einstein"`.

use regex::{Regex, RegexBuilder};

use crate::{document::Document, error::Result, pool::WorkerPool};

/// Placeholder rendering the document's folder name.
const FOLDER_FIELD: &str = "folder";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(String),
}

/// Projection of a document onto the string searched by the matcher.
///
/// Templates use `{key}` placeholders, e.g. `"{title} {author} {year}"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchFormat {
    segments: Vec<Segment>,
}

impl MatchFormat {
    pub fn parse(template: &str) -> Self {
        let mut segments = Vec::new();
        let mut rest = template;

        while let Some(open) = rest.find('{') {
            let Some(close) = rest[open..].find('}').map(|i| open + i) else {
                break;
            };
            if open > 0 {
                segments.push(Segment::Literal(rest[..open].to_string()));
            }
            let key = rest[open + 1..close].trim();
            if key.is_empty() {
                segments.push(Segment::Literal(rest[open..=close].to_string()));
            } else {
                segments.push(Segment::Field(key.to_string()));
            }
            rest = &rest[close + 1..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Self { segments }
    }

    pub fn render(&self, doc: &Document) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(key) if key == FOLDER_FIELD => {
                    out.push_str(&doc.folder_name())
                }
                Segment::Field(key) => out.push_str(&doc.field_text(key)),
            }
        }
        out
    }
}

/// A compiled search string.
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Empty or `.` search: every document matches.
    All,
    Pattern(Regex),
}

impl Matcher {
    pub fn compile(search: &str) -> Result<Self> {
        let search = search.trim();
        if search.is_empty() || search == "." {
            return Ok(Self::All);
        }

        let pattern = search
            .split_whitespace()
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let regex = RegexBuilder::new(&pattern)
            .case_insensitive(true)
            .dot_matches_new_line(true)
            .build()?;
        Ok(Self::Pattern(regex))
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }

    pub fn is_match(&self, text: &str) -> bool {
        match self {
            Self::All => true,
            Self::Pattern(regex) => regex.is_match(text),
        }
    }
}

/// A pure per-document predicate: projection plus compiled matcher.
#[derive(Debug, Clone)]
pub struct DocumentFilter {
    matcher: Matcher,
    format: MatchFormat,
}

impl DocumentFilter {
    pub fn new(search: &str, format: &str) -> Result<Self> {
        Ok(Self {
            matcher: Matcher::compile(search)?,
            format: MatchFormat::parse(format),
        })
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.matcher.is_all() || self.matcher.is_match(&self.format.render(doc))
    }

    /// Filter `documents`, keeping their relative order.
    ///
    /// With a pool the predicate runs across its workers; without one it runs
    /// on the calling thread.
    pub fn apply<'a>(
        &self,
        documents: &'a [Document],
        pool: Option<&WorkerPool>,
    ) -> Vec<&'a Document> {
        if self.matcher.is_all() {
            return documents.iter().collect();
        }

        let matched = match pool {
            Some(pool) => pool.filter(documents, |doc| self.matches(doc)),
            None => documents.iter().filter(|doc| self.matches(doc)).collect(),
        };
        tracing::debug!(
            total = documents.len(),
            matched = matched.len(),
            "filtered documents"
        );
        matched
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;

    fn doc(folder: &str, data: Value) -> Document {
        Document::new(folder, data.as_object().unwrap().clone())
    }

    fn library() -> Vec<Document> {
        vec![
            doc(
                "/lib/einstein-1905",
                json!({
                    "author": "Einstein, A.",
                    "year": 1905,
                    "title": "On the Electrodynamics of Moving Bodies",
                }),
            ),
            doc(
                "/lib/reversed",
                json!({"author": "1905", "title": "Einstein"}),
            ),
            doc(
                "/lib/euler",
                json!({
                    "author": "Euler, L.",
                    "year": 1748,
                    "tags": ["analysis", "series"],
                }),
            ),
        ]
    }

    #[test]
    fn format_renders_fields_and_literals() {
        let format = MatchFormat::parse("{author} ({year}) {title}");
        let docs = library();
        assert_eq!(
            format.render(&docs[0]),
            "Einstein, A. (1905) On the Electrodynamics of Moving Bodies"
        );
        assert_eq!(format.render(&docs[2]), "Euler, L. (1748) ");
    }

    #[test]
    fn format_supports_folder_placeholder_and_stray_braces() {
        let format = MatchFormat::parse("{folder}: {} {unclosed");
        let docs = library();
        assert_eq!(format.render(&docs[2]), "euler: {} {unclosed");
    }

    #[test]
    fn empty_and_dot_match_everything() {
        let docs = library();
        for search in ["", "   ", "."] {
            let filter = DocumentFilter::new(search, "{title}").unwrap();
            assert_eq!(filter.apply(&docs, None).len(), docs.len());
        }
        assert!(Matcher::compile(".").unwrap().is_all());
    }

    #[test]
    fn tokens_match_in_order_case_insensitively() {
        let docs = library();
        let filter =
            DocumentFilter::new("einstein 1905", "{author} ({year}) {title}")
                .unwrap();
        let matched = filter.apply(&docs, None);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].folder_name(), "einstein-1905");
    }

    #[test]
    fn token_order_is_significant() {
        let text = "1905 Einstein";
        assert!(!Matcher::compile("einstein 1905").unwrap().is_match(text));
        assert!(Matcher::compile("1905 einstein").unwrap().is_match(text));
    }

    #[test]
    fn verbatim_text_always_matches() {
        let docs = library();
        let format = MatchFormat::parse("{author} ({year}) {title}");
        for d in &docs {
            let rendered = format.render(d);
            let matcher = Matcher::compile(&rendered).unwrap();
            assert!(matcher.is_match(&rendered), "{rendered}");
        }
    }

    #[test]
    fn absent_token_matches_nothing() {
        let docs = library();
        let filter =
            DocumentFilter::new("zzz_absent_token", "{author} {title} {tags}")
                .unwrap();
        assert!(filter.apply(&docs, None).is_empty());
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        let matcher = Matcher::compile("A. (1905)").unwrap();
        assert!(matcher.is_match("Einstein, A. (1905)"));
        assert!(!Matcher::compile("a.c").unwrap().is_match("abc"));
    }

    #[test]
    fn parallel_apply_matches_sequential_order() {
        let docs: Vec<Document> = (0..400)
            .map(|i| {
                let title = format!("paper {}", i % 3);
                doc(&format!("/lib/{i:03}"), json!({ "title": title }))
            })
            .collect();
        let filter = DocumentFilter::new("paper 1", "{title}").unwrap();
        let pool = WorkerPool::new(Some(4)).unwrap();

        let sequential = filter.apply(&docs, None);
        let parallel = filter.apply(&docs, Some(&pool));
        assert_eq!(sequential, parallel);
        assert_eq!(parallel.len(), 133);
    }
}
