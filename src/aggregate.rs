//! Per-directory aggregation into `{index, data, toc}`.

use std::collections::HashSet;
use tracing::warn;

use crate::models::{AggregatedContent, Normalized};

/// Combine the normalized items of one directory.
///
/// Classification per item, in order:
///
/// 1. index-flagged documents replace `index` (the last one wins);
/// 2. non-empty documents are appended to `data`, contributing their title;
/// 3. bare tokens contribute themselves as a title.
///
/// Empty documents that are not the index are dropped. `toc` keeps the
/// first occurrence of each title.
pub fn aggregate(items: Vec<Normalized>) -> AggregatedContent {
    let mut content = AggregatedContent::empty();
    let mut index_source: Option<String> = None;
    let mut titles = Vec::new();

    for item in items {
        match item {
            Normalized::Document(doc) if doc.is_index() => {
                if let Some(previous) = index_source.replace(doc.source().to_string()) {
                    warn!(
                        previous = %previous,
                        replacement = %doc.source(),
                        "multiple index documents in one directory; keeping the last"
                    );
                }
                content.index = doc.into_fields();
            }
            Normalized::Document(doc) if !doc.is_empty() => {
                if let Some(title) = doc.title() {
                    titles.push(title);
                }
                content.data.push(doc.into_fields());
            }
            Normalized::Document(_) => {}
            Normalized::Token(name) => titles.push(name),
        }
    }

    content.toc = dedup_first_seen(titles);
    content
}

fn dedup_first_seen(titles: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::with_capacity(titles.len());
    titles
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .collect()
}
