//! Core data models used throughout Content Mirror.
//!
//! These types represent the remote entries, directory paths, normalized
//! documents, and aggregated cache payloads that flow through the sync
//! pipeline.

use std::fmt;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Maximum number of segments in a [`DirectoryPath`].
pub const MAX_DEPTH: usize = 3;

/// One file or subdirectory as returned by the remote tree client.
///
/// `raw_text` is `None` for subdirectories and for blobs the remote could
/// not render as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub raw_text: Option<String>,
}

impl RemoteEntry {
    pub fn file(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            raw_text: Some(text.into()),
        }
    }

    pub fn dir(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            raw_text: None,
        }
    }
}

/// A directory inside the remote tree, at most [`MAX_DEPTH`] segments deep.
///
/// Segments are non-empty and never contain `/`, `\` or `.`, which keeps
/// every path safe to use as a cache key and as an HTTP route.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DirectoryPath {
    segments: Vec<String>,
}

impl DirectoryPath {
    /// Parse a slash-delimited path such as `"about/people"`.
    ///
    /// Leading and trailing slashes are ignored.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim_matches('/');
        if trimmed.is_empty() {
            bail!("directory path must not be empty");
        }

        let segments: Vec<String> = trimmed.split('/').map(str::to_string).collect();
        if segments.len() > MAX_DEPTH {
            bail!(
                "directory path '{}' is deeper than {} levels",
                trimmed,
                MAX_DEPTH
            );
        }

        for segment in &segments {
            if segment.is_empty() {
                bail!("directory path '{}' contains an empty segment", trimmed);
            }
            if segment.contains('.') || segment.contains('\\') {
                bail!("invalid directory path segment: '{}'", segment);
            }
            if segment.chars().any(char::is_control) {
                bail!("directory path '{}' contains control characters", trimmed);
            }
        }

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// The last segment of the path.
    pub fn name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or_default()
    }
}

impl fmt::Display for DirectoryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

impl TryFrom<String> for DirectoryPath {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<DirectoryPath> for String {
    fn from(value: DirectoryPath) -> Self {
        value.to_string()
    }
}

/// A single file converted into the canonical document shape.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedDocument {
    /// Parsed from a structured data file (`.yml` / `.yaml`).
    Metadata {
        source: String,
        fields: Map<String, Value>,
        is_index: bool,
    },
    /// Parsed from a prose file (`.md`): front matter plus rendered body.
    Prose {
        source: String,
        front_matter: Map<String, Value>,
        body: Option<String>,
        is_index: bool,
    },
}

impl NormalizedDocument {
    /// Name of the file this document came from.
    pub fn source(&self) -> &str {
        match self {
            Self::Metadata { source, .. } | Self::Prose { source, .. } => source,
        }
    }

    pub fn is_index(&self) -> bool {
        match self {
            Self::Metadata { is_index, .. } | Self::Prose { is_index, .. } => *is_index,
        }
    }

    /// True when the document carries no key-value pairs at all.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Metadata { fields, .. } => fields.is_empty(),
            Self::Prose {
                front_matter, body, ..
            } => front_matter.is_empty() && body.is_none(),
        }
    }

    /// The table-of-contents title carried by this document, if any.
    ///
    /// Strings are used as-is when non-empty; numbers are rendered.
    pub fn title(&self) -> Option<String> {
        let fields = match self {
            Self::Metadata { fields, .. } => fields,
            Self::Prose { front_matter, .. } => front_matter,
        };
        match fields.get("title")? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Flatten into the served key-value shape.
    ///
    /// For prose documents the rendered body is stored under `body`,
    /// replacing any front-matter key of the same name.
    pub fn into_fields(self) -> Map<String, Value> {
        match self {
            Self::Metadata { fields, .. } => fields,
            Self::Prose {
                mut front_matter,
                body,
                ..
            } => {
                if let Some(body) = body {
                    front_matter.insert("body".to_string(), Value::String(body));
                }
                front_matter
            }
        }
    }
}

/// Result of normalizing a single remote entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Document(NormalizedDocument),
    /// A bare extension-less name, surfaced directly into the table of contents.
    Token(String),
}

/// The canonical per-directory payload written to the cache and served.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatedContent {
    #[serde(default)]
    pub index: Map<String, Value>,
    #[serde(default)]
    pub data: Vec<Map<String, Value>>,
    #[serde(default)]
    pub toc: Vec<String>,
}

impl AggregatedContent {
    /// `{index: {}, data: [], toc: []}`.
    pub fn empty() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_directory_path() {
        let path = DirectoryPath::parse("/about/people/").unwrap();
        assert_eq!(path.segments(), &["about", "people"]);
        assert_eq!(path.depth(), 2);
        assert_eq!(path.name(), "people");
        assert_eq!(path.to_string(), "about/people");
    }

    #[test]
    fn test_parse_rejects_invalid_paths() {
        assert!(DirectoryPath::parse("").is_err());
        assert!(DirectoryPath::parse("/").is_err());
        assert!(DirectoryPath::parse("a//b").is_err());
        assert!(DirectoryPath::parse("a/b/c/d").is_err());
        assert!(DirectoryPath::parse("../etc").is_err());
        assert!(DirectoryPath::parse("readme.md").is_err());
        assert!(DirectoryPath::parse("a\\b").is_err());
    }

    #[test]
    fn test_directory_path_serde_as_string() {
        let path = DirectoryPath::parse("our-work/apps").unwrap();
        let encoded = serde_json::to_string(&path).unwrap();
        assert_eq!(encoded, "\"our-work/apps\"");
        let decoded: DirectoryPath = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, path);
        assert!(serde_json::from_str::<DirectoryPath>("\"a.b\"").is_err());
    }

    #[test]
    fn test_prose_into_fields_body_overrides() {
        let mut fm = Map::new();
        fm.insert("title".into(), json!("Alpha"));
        fm.insert("body".into(), json!("stale"));
        let doc = NormalizedDocument::Prose {
            source: "a.md".into(),
            front_matter: fm,
            body: Some("<main><p>hi</p>\n</main>".into()),
            is_index: false,
        };
        let fields = doc.into_fields();
        assert_eq!(fields["title"], json!("Alpha"));
        assert_eq!(fields["body"], json!("<main><p>hi</p>\n</main>"));
        assert_eq!(fields.len(), 2);
    }

    #[test]
    fn test_title_variants() {
        let mut fields = Map::new();
        fields.insert("title".into(), json!(2024));
        let doc = NormalizedDocument::Metadata {
            source: "x.yml".into(),
            fields: fields.clone(),
            is_index: false,
        };
        assert_eq!(doc.title().as_deref(), Some("2024"));

        fields.insert("title".into(), json!(""));
        let doc = NormalizedDocument::Metadata {
            source: "x.yml".into(),
            fields,
            is_index: false,
        };
        assert_eq!(doc.title(), None);
    }

    #[test]
    fn test_empty_aggregate_shape() {
        let encoded = serde_json::to_string(&AggregatedContent::empty()).unwrap();
        assert_eq!(encoded, r#"{"index":{},"data":[],"toc":[]}"#);
    }
}
