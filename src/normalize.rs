//! Format normalization.
//!
//! Converts each fetched [`RemoteEntry`] into the canonical document shape:
//!
//! | Entry | Result |
//! |-------|--------|
//! | `*.yml`, `*.yaml` | [`NormalizedDocument::Metadata`] parsed from YAML |
//! | `*.md` | [`NormalizedDocument::Prose`]: front matter + `<main>`-wrapped HTML body |
//! | no extension | [`Normalized::Token`] carrying the bare name |
//! | anything else | skipped |
//!
//! Parse failures are isolated to the offending file: the entry is dropped
//! and the failure is reported alongside the surviving items.
//!
//! A Markdown body made only of whitespace counts as absent: the document
//! carries its front matter alone, with no `body` key and no empty
//! `<main></main>` element.

use anyhow::{anyhow, bail, Result};
use pulldown_cmark::{html, Options, Parser};
use serde::Deserialize;
use serde_json::{Map, Number, Value};
use tracing::{debug, warn};

use crate::error::SyncError;
use crate::models::{Normalized, NormalizedDocument, RemoteEntry};

/// How a file name is recognised as the directory's index document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexRule {
    /// The part of the name before the first `.` is `index` (any case).
    #[default]
    Stem,
    /// The name contains `index` anywhere, e.g. `index-old.md`.
    Contains,
}

impl IndexRule {
    pub fn matches(self, name: &str) -> bool {
        match self {
            IndexRule::Stem => name
                .split('.')
                .next()
                .is_some_and(|stem| stem.eq_ignore_ascii_case("index")),
            IndexRule::Contains => name.contains("index"),
        }
    }
}

/// File classification by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Structured,
    Prose,
    Bare,
    Unsupported,
}

pub fn classify(name: &str) -> EntryKind {
    let Some((_, ext)) = name.rsplit_once('.') else {
        return EntryKind::Bare;
    };
    if ext.eq_ignore_ascii_case("yml") || ext.eq_ignore_ascii_case("yaml") {
        EntryKind::Structured
    } else if ext.eq_ignore_ascii_case("md") {
        EntryKind::Prose
    } else {
        EntryKind::Unsupported
    }
}

/// Normalize one entry.
///
/// Returns `Ok(None)` for entries that produce nothing (unsupported
/// extensions, files without text).
pub fn normalize_entry(entry: &RemoteEntry, rule: IndexRule) -> Result<Option<Normalized>, SyncError> {
    let name = entry.name.as_str();
    let kind = classify(name);

    if kind == EntryKind::Bare {
        return Ok(Some(Normalized::Token(name.to_string())));
    }
    if kind == EntryKind::Unsupported {
        debug!(file = name, "skipping unsupported file type");
        return Ok(None);
    }

    let Some(text) = entry.raw_text.as_deref() else {
        debug!(file = name, "skipping entry without text content");
        return Ok(None);
    };

    let is_index = rule.matches(name);
    let doc = match kind {
        EntryKind::Structured => NormalizedDocument::Metadata {
            source: name.to_string(),
            fields: parse_mapping(text).map_err(|e| SyncError::parse(name, e))?,
            is_index,
        },
        _ => {
            let (yaml, body) = split_front_matter(text);
            let front_matter = match yaml {
                Some(yaml) => parse_mapping(yaml).map_err(|e| SyncError::parse(name, e))?,
                None => Map::new(),
            };
            let body = if body.trim().is_empty() {
                None
            } else {
                Some(render_markdown(body))
            };
            NormalizedDocument::Prose {
                source: name.to_string(),
                front_matter,
                body,
                is_index,
            }
        }
    };
    Ok(Some(Normalized::Document(doc)))
}

/// Items produced from one directory plus the files that failed to parse.
#[derive(Debug, Default)]
pub struct NormalizeOutcome {
    pub items: Vec<Normalized>,
    pub failures: Vec<SyncError>,
}

/// Normalize every entry of a directory.
///
/// Prose documents and bare tokens come first, followed by structured
/// documents; listing order is kept within each group. This order decides
/// `toc` and `data` order and which index document wins.
pub fn normalize_entries(entries: &[RemoteEntry], rule: IndexRule) -> NormalizeOutcome {
    let mut outcome = NormalizeOutcome::default();
    let mut structured = Vec::new();
    for entry in entries {
        match normalize_entry(entry, rule) {
            Ok(Some(item @ Normalized::Document(NormalizedDocument::Metadata { .. }))) => {
                structured.push(item)
            }
            Ok(Some(item)) => outcome.items.push(item),
            Ok(None) => {}
            Err(e) => {
                warn!(file = %entry.name, error = %e, "dropping file that failed to parse");
                outcome.failures.push(e);
            }
        }
    }
    outcome.items.extend(structured);
    outcome
}

/// Split a prose file into its YAML front matter and body.
///
/// Front matter opens with a `---` line and closes with a `---` or `...`
/// line. Without a complete block the whole text is the body.
pub fn split_front_matter(text: &str) -> (Option<&str>, &str) {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let Some((first, rest)) = split_line(text) else {
        return (None, text);
    };
    if first.trim_end() != "---" {
        return (None, text);
    }

    let mut remaining = rest;
    while let Some((line, after)) = split_line(remaining) {
        let marker = line.trim_end();
        if marker == "---" || marker == "..." {
            let start = rest.len() - remaining.len();
            return (Some(&rest[..start]), after);
        }
        remaining = after;
    }
    (None, text)
}

fn split_line(s: &str) -> Option<(&str, &str)> {
    if s.is_empty() {
        return None;
    }
    Some(match s.find('\n') {
        Some(i) => (&s[..i], &s[i + 1..]),
        None => (s, ""),
    })
}

/// Render Markdown to HTML wrapped in a single `<main>` element.
pub fn render_markdown(body: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_TASKLISTS);

    let parser = Parser::new_ext(body, options);
    let mut out = String::with_capacity(body.len() * 3 / 2 + 16);
    out.push_str("<main>");
    html::push_html(&mut out, parser);
    out.push_str("</main>");
    out
}

/// Parse YAML text whose top level must be a mapping (or empty).
pub fn parse_mapping(text: &str) -> Result<Map<String, Value>> {
    let blank = text.lines().all(|line| {
        let line = line.trim();
        line.is_empty() || line.starts_with('#')
    });
    if blank {
        return Ok(Map::new());
    }
    let mut yaml: serde_yaml::Value = serde_yaml::from_str(text)?;
    yaml.apply_merge()?;
    match yaml_to_json(yaml)? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => bail!("expected a mapping at the top level, found {}", type_name(&other)),
    }
}

fn yaml_to_json(value: serde_yaml::Value) -> Result<Value> {
    use serde_yaml::Value as Y;

    Ok(match value {
        Y::Null => Value::Null,
        Y::Bool(b) => Value::Bool(b),
        Y::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                let f = n.as_f64().unwrap_or(f64::NAN);
                Number::from_f64(f)
                    .map(Value::Number)
                    .ok_or_else(|| anyhow!("non-finite number {} cannot be represented", n))?
            }
        }
        Y::String(s) => Value::String(s),
        Y::Sequence(seq) => Value::Array(
            seq.into_iter()
                .map(yaml_to_json)
                .collect::<Result<Vec<_>>>()?,
        ),
        Y::Mapping(mapping) => {
            let mut map = Map::with_capacity(mapping.len());
            for (k, v) in mapping {
                map.insert(mapping_key(k)?, yaml_to_json(v)?);
            }
            Value::Object(map)
        }
        Y::Tagged(tagged) => yaml_to_json(tagged.value)?,
    })
}

fn mapping_key(key: serde_yaml::Value) -> Result<String> {
    use serde_yaml::Value as Y;

    match key {
        Y::String(s) => Ok(s),
        Y::Number(n) => Ok(n.to_string()),
        Y::Bool(b) => Ok(b.to_string()),
        Y::Null => Ok("null".to_string()),
        _ => bail!("mapping keys must be scalars"),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}
