//! Path resolution.
//!
//! Flattens the remote root tree (three levels deep) into the list of
//! directory paths to sync. An entry counts as a directory when its path
//! contains no `.`; anything nested deeper than three levels is never
//! requested and therefore silently truncated.

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::error::SyncError;
use crate::models::{DirectoryPath, MAX_DEPTH};
use crate::remote::TreeClient;

/// Query the remote tree and return every directory path within reach.
///
/// Any failure here is fatal to the sync pass.
pub async fn resolve_paths(client: &dyn TreeClient) -> Result<Vec<DirectoryPath>, SyncError> {
    let data = client.tree().await.map_err(SyncError::resolution)?;
    let paths = paths_from_tree(&data)?;
    debug!(count = paths.len(), "resolved directory paths");
    Ok(paths)
}

/// Extract directory paths from a raw tree response.
///
/// Output is in pre-order (parents before children), deduplicated.
pub fn paths_from_tree(data: &Value) -> Result<Vec<DirectoryPath>, SyncError> {
    let repository = data
        .get("repository")
        .filter(|r| r.is_object())
        .ok_or_else(|| SyncError::resolution("response has no 'repository' object"))?;

    let object = repository.get("object").unwrap_or(&Value::Null);
    if object.is_null() {
        return Err(SyncError::resolution(
            "branch or root tree not found in repository",
        ));
    }

    let entries = object
        .get("entries")
        .and_then(Value::as_array)
        .ok_or_else(|| SyncError::resolution("root object is not a tree"))?;

    let mut raw = Vec::new();
    collect(entries, "", 1, &mut raw)?;

    let mut seen = HashSet::new();
    let mut paths = Vec::new();
    for path in raw {
        if path.contains('.') {
            continue;
        }
        match DirectoryPath::parse(&path) {
            Ok(dir) => {
                if seen.insert(dir.clone()) {
                    paths.push(dir);
                }
            }
            Err(e) => warn!(path = %path, error = %e, "skipping unusable remote path"),
        }
    }
    Ok(paths)
}

fn collect(entries: &[Value], parent: &str, level: usize, out: &mut Vec<String>) -> Result<(), SyncError> {
    for entry in entries {
        let path = entry_path(entry, parent).ok_or_else(|| {
            SyncError::resolution(format!("tree entry at level {} has no path or name", level))
        })?;

        if level < MAX_DEPTH {
            if let Some(children) = entry
                .get("object")
                .and_then(|o| o.get("entries"))
                .and_then(Value::as_array)
            {
                out.push(path.clone());
                collect(children, &path, level + 1, out)?;
                continue;
            }
        }
        out.push(path);
    }
    Ok(())
}

fn entry_path(entry: &Value, parent: &str) -> Option<String> {
    if let Some(path) = entry.get("path").and_then(Value::as_str) {
        return Some(path.to_string());
    }
    let name = entry.get("name").and_then(Value::as_str)?;
    if parent.is_empty() {
        Some(name.to_string())
    } else {
        Some(format!("{}/{}", parent, name))
    }
}

/// Drop paths matching any of the given glob patterns.
pub fn filter_excluded(paths: Vec<DirectoryPath>, patterns: &[String]) -> Result<Vec<DirectoryPath>> {
    if patterns.is_empty() {
        return Ok(paths);
    }
    let set = build_globset(patterns)?;
    Ok(paths
        .into_iter()
        .filter(|p| {
            let excluded = set.is_match(p.to_string());
            if excluded {
                debug!(path = %p, "excluded by sync.exclude_paths");
            }
            !excluded
        })
        .collect())
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}
