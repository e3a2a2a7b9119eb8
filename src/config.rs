//! TOML configuration parsing.
//!
//! Credentials never live in the file: `[remote]` names the environment
//! variables holding the bearer token and client identifier, and they are
//! resolved when the remote client is built.

use anyhow::{bail, Context, Result};
use globset::Glob;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::normalize::IndexRule;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub remote: RemoteConfig,
    pub cache: CacheConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RemoteConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    pub owner: String,
    pub repository: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_user_agent_env")]
    pub user_agent_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_endpoint() -> String {
    "https://api.github.com/graphql".to_string()
}
fn default_branch() -> String {
    "main".to_string()
}
fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}
fn default_user_agent_env() -> String {
    "GITHUB_USER".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    pub root: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_directory_timeout_secs")]
    pub directory_timeout_secs: u64,
    #[serde(default)]
    pub exclude_paths: Vec<String>,
    #[serde(default)]
    pub index_match: IndexRule,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            directory_timeout_secs: default_directory_timeout_secs(),
            exclude_paths: Vec::new(),
            index_match: IndexRule::default(),
        }
    }
}

fn default_concurrency() -> usize {
    8
}
fn default_directory_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_sync_on_start")]
    pub sync_on_start: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            sync_on_start: default_sync_on_start(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:3001".to_string()
}
fn default_sync_on_start() -> bool {
    true
}

/// Credentials resolved from the environment for the remote API.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub token: String,
    pub user_agent: String,
}

impl RemoteConfig {
    /// Read the bearer token and client identifier from the environment.
    ///
    /// The client identifier falls back to the crate name when unset, since
    /// the remote only requires a non-empty `User-Agent`.
    pub fn credentials(&self) -> Result<Credentials> {
        let token = std::env::var(&self.token_env)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .with_context(|| format!("{} must be set to a bearer token", self.token_env))?;
        let user_agent = std::env::var(&self.user_agent_env)
            .ok()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string());
        Ok(Credentials { token, user_agent })
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate remote
    if config.remote.owner.trim().is_empty() {
        bail!("remote.owner must not be empty");
    }
    if config.remote.repository.trim().is_empty() {
        bail!("remote.repository must not be empty");
    }
    if config.remote.branch.trim().is_empty() {
        bail!("remote.branch must not be empty");
    }
    if config.remote.timeout_secs == 0 {
        bail!("remote.timeout_secs must be > 0");
    }

    // Validate sync
    if config.sync.concurrency == 0 {
        bail!("sync.concurrency must be >= 1");
    }
    if config.sync.directory_timeout_secs == 0 {
        bail!("sync.directory_timeout_secs must be >= 1");
    }
    for pattern in &config.sync.exclude_paths {
        Glob::new(pattern)
            .with_context(|| format!("Invalid sync.exclude_paths glob: '{}'", pattern))?;
    }

    if config.server.bind.trim().is_empty() {
        bail!("server.bind must not be empty");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[remote]
owner = "brown-ccv"
repository = "ccv-website-content"

[cache]
root = "./content"
"#;

    #[test]
    fn test_minimal_config_defaults() {
        let config = parse_config(MINIMAL).unwrap();
        assert_eq!(config.remote.endpoint, "https://api.github.com/graphql");
        assert_eq!(config.remote.branch, "main");
        assert_eq!(config.remote.token_env, "GITHUB_TOKEN");
        assert_eq!(config.sync.concurrency, 8);
        assert_eq!(config.sync.index_match, IndexRule::Stem);
        assert!(config.server.sync_on_start);
        assert_eq!(config.server.bind, "127.0.0.1:3001");
    }

    #[test]
    fn test_full_config() {
        let content = r#"
[remote]
endpoint = "http://127.0.0.1:9999/graphql"
owner = "acme"
repository = "site"
branch = "content"
timeout_secs = 5

[cache]
root = "/tmp/content"

[sync]
concurrency = 2
directory_timeout_secs = 10
exclude_paths = ["drafts/**"]
index_match = "contains"

[server]
bind = "0.0.0.0:8080"
sync_on_start = false
"#;
        let config = parse_config(content).unwrap();
        assert_eq!(config.remote.branch, "content");
        assert_eq!(config.sync.concurrency, 2);
        assert_eq!(config.sync.index_match, IndexRule::Contains);
        assert_eq!(config.sync.exclude_paths, vec!["drafts/**"]);
        assert!(!config.server.sync_on_start);
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        let content = format!("{}\n[sync]\nconcurrency = 0\n", MINIMAL);
        let err = parse_config(&content).unwrap_err();
        assert!(err.to_string().contains("concurrency"));
    }

    #[test]
    fn test_rejects_empty_owner() {
        let content = MINIMAL.replace("brown-ccv", " ");
        assert!(parse_config(&content).is_err());
    }

    #[test]
    fn test_rejects_bad_glob() {
        let content = format!("{}\n[sync]\nexclude_paths = [\"a/[\"]\n", MINIMAL);
        assert!(parse_config(&content).is_err());
    }

    #[test]
    fn test_missing_token_is_an_error() {
        let mut config = parse_config(MINIMAL).unwrap();
        config.remote.token_env = "CONTENT_MIRROR_TEST_UNSET_TOKEN".to_string();
        let err = config.remote.credentials().unwrap_err();
        assert!(err.to_string().contains("CONTENT_MIRROR_TEST_UNSET_TOKEN"));
    }
}
