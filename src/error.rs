//! Failure taxonomy for a sync pass.
//!
//! Only [`SyncError::Resolution`] aborts a whole pass. Every other variant is
//! isolated to one directory or one file and recorded in the
//! [`SyncReport`](crate::sync::SyncReport).

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncError {
    /// The root tree query failed or returned an unexpected shape.
    #[error("failed to resolve directory paths: {message}")]
    Resolution { message: String },

    /// A single directory's file listing could not be fetched.
    #[error("failed to fetch '{path}': {message}")]
    Fetch { path: String, message: String },

    /// A structured-data or front-matter block failed to parse.
    #[error("failed to parse '{file}': {message}")]
    Parse { file: String, message: String },

    /// Writing the cache entry for a directory failed.
    #[error("failed to persist '{path}': {message}")]
    Persist { path: String, message: String },

    /// A directory pipeline did not finish within its time bound.
    #[error("sync of '{path}' timed out after {secs}s")]
    Timeout { path: String, secs: u64 },
}

impl SyncError {
    pub fn resolution(err: impl std::fmt::Display) -> Self {
        Self::Resolution {
            message: format!("{:#}", err),
        }
    }

    pub fn fetch(path: impl std::fmt::Display, err: impl std::fmt::Display) -> Self {
        Self::Fetch {
            path: path.to_string(),
            message: format!("{:#}", err),
        }
    }

    pub fn parse(file: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Parse {
            file: file.into(),
            message: format!("{:#}", err),
        }
    }

    pub fn persist(path: impl std::fmt::Display, err: impl std::fmt::Display) -> Self {
        Self::Persist {
            path: path.to_string(),
            message: format!("{:#}", err),
        }
    }

    /// Stable snake_case label for logs and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Resolution { .. } => "resolution",
            Self::Fetch { .. } => "fetch",
            Self::Parse { .. } => "parse",
            Self::Persist { .. } => "persist",
            Self::Timeout { .. } => "timeout",
        }
    }
}
