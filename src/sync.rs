//! Sync orchestration.
//!
//! Drives the full cycle: resolve paths → (per directory) fetch →
//! normalize → aggregate → persist. Directories run concurrently, bounded
//! by `sync.concurrency`; within a directory the steps are strictly
//! sequential. A pass returns only after every directory has been
//! attempted, and overlapping passes never interleave: [`Syncer::run_sync`]
//! queues behind an in-flight pass, [`Syncer::try_run_sync`] rejects.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::aggregate::aggregate;
use crate::cache::CacheStore;
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::fetch::fetch_entries;
use crate::models::DirectoryPath;
use crate::normalize::{normalize_entries, IndexRule};
use crate::remote::TreeClient;
use crate::resolve::{filter_excluded, resolve_paths};

/// Tuning for a [`Syncer`].
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Maximum number of directories in flight.
    pub concurrency: usize,
    /// Upper bound on fetching one directory.
    pub directory_timeout: Duration,
    /// Glob patterns over resolved paths that are never synced.
    pub exclude_paths: Vec<String>,
    pub index_rule: IndexRule,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

impl SyncOptions {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            concurrency: config.concurrency.max(1),
            directory_timeout: Duration::from_secs(config.directory_timeout_secs),
            exclude_paths: config.exclude_paths.clone(),
            index_rule: config.index_match,
        }
    }
}

/// What happened to one directory during a pass.
#[derive(Debug, Clone, Serialize)]
pub struct DirectoryOutcome {
    pub path: DirectoryPath,
    /// Number of documents written to `data`.
    pub documents: usize,
    pub toc_entries: usize,
    pub has_index: bool,
    /// Files dropped because they failed to parse.
    pub dropped_files: Vec<SyncError>,
    /// Set when the directory's cache entry was not (re)written.
    pub error: Option<SyncError>,
}

impl DirectoryOutcome {
    fn failed(path: DirectoryPath, error: SyncError) -> Self {
        Self {
            path,
            documents: 0,
            toc_entries: 0,
            has_index: false,
            dropped_files: Vec::new(),
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of a completed sync pass.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub paths_resolved: usize,
    /// One outcome per resolved path, sorted by path.
    pub directories: Vec<DirectoryOutcome>,
}

impl SyncReport {
    pub fn synced(&self) -> usize {
        self.directories.iter().filter(|d| d.is_success()).count()
    }

    pub fn failed(&self) -> Vec<&DirectoryOutcome> {
        self.directories.iter().filter(|d| !d.is_success()).collect()
    }

    pub fn dropped_files(&self) -> usize {
        self.directories.iter().map(|d| d.dropped_files.len()).sum()
    }

    /// True when every directory was written and no file was dropped.
    pub fn is_complete_success(&self) -> bool {
        self.failed().is_empty() && self.dropped_files() == 0
    }

    /// One-line completion status.
    pub fn summary(&self) -> String {
        let failed = self.failed().len();
        let dropped = self.dropped_files();
        if failed == 0 && dropped == 0 {
            format!(
                "Content updated. {} of {} directories synced.",
                self.synced(),
                self.paths_resolved
            )
        } else {
            format!(
                "Content updated with errors. {} of {} directories synced, {} failed, {} files dropped.",
                self.synced(),
                self.paths_resolved,
                failed,
                dropped
            )
        }
    }
}

/// Why [`Syncer::try_run_sync`] did not produce a report.
#[derive(Debug, Error)]
pub enum TrySyncError {
    #[error("a sync pass is already in progress")]
    Busy,
    #[error(transparent)]
    Failed(#[from] SyncError),
}

/// Owns the remote client and the cache for the lifetime of the process.
pub struct Syncer {
    client: Arc<dyn TreeClient>,
    cache: CacheStore,
    options: SyncOptions,
    running: Mutex<()>,
    last_report: RwLock<Option<SyncReport>>,
}

impl Syncer {
    pub fn new(client: Arc<dyn TreeClient>, cache: CacheStore, options: SyncOptions) -> Self {
        Self {
            client,
            cache,
            options,
            running: Mutex::new(()),
            last_report: RwLock::new(None),
        }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Resolve paths and apply `exclude_paths`, without syncing.
    pub async fn resolve(&self) -> Result<Vec<DirectoryPath>, SyncError> {
        let paths = resolve_paths(self.client.as_ref()).await?;
        filter_excluded(paths, &self.options.exclude_paths).map_err(SyncError::resolution)
    }

    /// Run a full pass, waiting for any in-flight pass to finish first.
    pub async fn run_sync(&self) -> Result<SyncReport, SyncError> {
        let _guard = self.running.lock().await;
        self.run_locked().await
    }

    /// Run a full pass unless one is already in flight.
    pub async fn try_run_sync(&self) -> Result<SyncReport, TrySyncError> {
        let _guard = self.running.try_lock().map_err(|_| TrySyncError::Busy)?;
        Ok(self.run_locked().await?)
    }

    /// The report of the most recent completed pass.
    pub fn last_report(&self) -> Option<SyncReport> {
        self.last_report
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn run_locked(&self) -> Result<SyncReport, SyncError> {
        let started_at = Utc::now();
        info!("sync started");

        let paths = self.resolve().await.inspect_err(|e| {
            error!(error = %e, "sync aborted");
        })?;
        let paths_resolved = paths.len();
        info!(paths = paths_resolved, "directory paths resolved");

        let mut directories: Vec<DirectoryOutcome> = stream::iter(paths)
            .map(|path| self.sync_directory(path))
            .buffer_unordered(self.options.concurrency)
            .collect()
            .await;
        directories.sort_by(|a, b| a.path.cmp(&b.path));

        let report = SyncReport {
            started_at,
            finished_at: Utc::now(),
            paths_resolved,
            directories,
        };

        info!(
            synced = report.synced(),
            failed = report.failed().len(),
            dropped_files = report.dropped_files(),
            "sync finished"
        );

        *self
            .last_report
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(report.clone());
        Ok(report)
    }

    /// Fetch, normalize, aggregate and persist one directory.
    ///
    /// Never fails: errors are recorded in the returned outcome and the
    /// existing cache entry is left untouched.
    pub async fn sync_directory(&self, path: DirectoryPath) -> DirectoryOutcome {
        let fetched = tokio::time::timeout(
            self.options.directory_timeout,
            fetch_entries(self.client.as_ref(), &path),
        )
        .await;

        let entries = match fetched {
            Ok(Ok(entries)) => entries,
            Ok(Err(e)) => {
                warn!(path = %path, error = %e, "directory skipped; cache left stale");
                return DirectoryOutcome::failed(path, e);
            }
            Err(_) => {
                let e = SyncError::Timeout {
                    path: path.to_string(),
                    secs: self.options.directory_timeout.as_secs(),
                };
                warn!(path = %path, error = %e, "directory skipped; cache left stale");
                return DirectoryOutcome::failed(path, e);
            }
        };

        let normalized = normalize_entries(&entries, self.options.index_rule);
        let content = aggregate(normalized.items);

        if let Err(e) = self.cache.write(&path, &content).await {
            let e = SyncError::persist(&path, e);
            error!(path = %path, error = %e, "failed to persist directory");
            let mut outcome = DirectoryOutcome::failed(path, e);
            outcome.dropped_files = normalized.failures;
            return outcome;
        }

        debug!(
            path = %path,
            documents = content.data.len(),
            toc = content.toc.len(),
            "directory synced"
        );

        DirectoryOutcome {
            path,
            documents: content.data.len(),
            toc_entries: content.toc.len(),
            has_index: !content.index.is_empty(),
            dropped_files: normalized.failures,
            error: None,
        }
    }
}
