//! On-disk cache of aggregated directory content.
//!
//! One JSON file per directory path, all directly under the cache root.
//! File names are derived from the path by percent-escaping `%` and the
//! delimiter `~` inside each segment and joining segments with `~`:
//!
//! | Directory path | Cache file |
//! |----------------|------------|
//! | `about` | `about.json` |
//! | `our-work/apps` | `our-work~apps.json` |
//! | `a~b/c` | `a%7Eb~c.json` |
//!
//! The mapping is injective, so [`CacheStore::list`] can recover every
//! cached path from the directory listing. Writes go to a uniquely named
//! temporary file that is then renamed over the target, so readers only
//! ever observe a complete entry.

use anyhow::{Context, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

use crate::models::{AggregatedContent, DirectoryPath};

/// Separator placed between path segments in cache file names.
pub const DELIMITER: char = '~';

const EXTENSION: &str = ".json";

#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deterministic cache file name for a directory path.
    pub fn file_name(path: &DirectoryPath) -> String {
        let mut name = String::new();
        for (i, segment) in path.segments().iter().enumerate() {
            if i > 0 {
                name.push(DELIMITER);
            }
            for c in segment.chars() {
                match c {
                    '%' => name.push_str("%25"),
                    DELIMITER => name.push_str("%7E"),
                    c => name.push(c),
                }
            }
        }
        name.push_str(EXTENSION);
        name
    }

    /// Inverse of [`file_name`](Self::file_name). `None` for names this
    /// store never produces.
    pub fn path_from_file_name(name: &str) -> Option<DirectoryPath> {
        let stem = name.strip_suffix(EXTENSION)?;
        if stem.starts_with('.') {
            return None;
        }
        let segments = stem
            .split(DELIMITER)
            .map(unescape)
            .collect::<Option<Vec<_>>>()?;
        DirectoryPath::parse(&segments.join("/")).ok()
    }

    pub fn file_path(&self, path: &DirectoryPath) -> PathBuf {
        self.root.join(Self::file_name(path))
    }

    /// Replace the cache entry for `path` with `content`.
    pub async fn write(&self, path: &DirectoryPath, content: &AggregatedContent) -> Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("Failed to create cache root: {}", self.root.display()))?;

        let bytes = serde_json::to_vec(content).context("Failed to serialize content")?;
        let target = self.file_path(path);
        let tmp = self.root.join(format!(
            ".{}.{}.tmp",
            Self::file_name(path),
            Uuid::new_v4()
        ));

        tokio::fs::write(&tmp, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;

        if let Err(e) = tokio::fs::rename(&tmp, &target).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e).with_context(|| format!("Failed to replace {}", target.display()));
        }

        debug!(path = %path, file = %target.display(), bytes = bytes.len(), "cache entry written");
        Ok(())
    }

    /// Read the cache entry for `path`, or `None` if it was never written.
    pub async fn read(&self, path: &DirectoryPath) -> Result<Option<AggregatedContent>> {
        let file = self.file_path(path);
        let bytes = match tokio::fs::read(&file).await {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", file.display()))
            }
        };
        let content = serde_json::from_slice(&bytes)
            .with_context(|| format!("Corrupt cache entry: {}", file.display()))?;
        Ok(Some(content))
    }

    /// All directory paths with a cache entry, sorted.
    pub async fn list(&self) -> Result<Vec<DirectoryPath>> {
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(d) => d,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to list {}", self.root.display()))
            }
        };

        let mut paths = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(path) = entry
                .file_name()
                .to_str()
                .and_then(Self::path_from_file_name)
            {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }
}

fn unescape(segment: &str) -> Option<String> {
    let mut out = String::with_capacity(segment.len());
    let mut rest = segment;
    while let Some(i) = rest.find('%') {
        out.push_str(&rest[..i]);
        let code = rest.get(i + 1..i + 3)?;
        match code {
            "25" => out.push('%'),
            "7E" => out.push(DELIMITER),
            _ => return None,
        }
        rest = &rest[i + 3..];
    }
    out.push_str(rest);
    Some(out)
}
