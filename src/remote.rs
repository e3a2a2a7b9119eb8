//! Remote tree client.
//!
//! Issues GraphQL queries against a GitHub-compatible endpoint and returns
//! the raw `data` object of each response. Shape interpretation belongs to
//! the callers ([`resolve`](crate::resolve) and [`fetch`](crate::fetch)).
//!
//! # Queries
//!
//! | Query | Purpose |
//! |-------|---------|
//! | [`tree_query`] | Tree entries at the repository root, three levels deep |
//! | [`directory_query`] | Entries directly inside one directory, with blob text |
//!
//! Owner, repository and the `<branch>:<path>` expression are always sent
//! as GraphQL variables.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::config::RemoteConfig;
use crate::models::DirectoryPath;

/// Source of raw tree data for the sync pipeline.
///
/// Implementations return the GraphQL `data` object unchanged. A failed
/// request, a non-success status, or a GraphQL `errors` array is an `Err`.
#[async_trait]
pub trait TreeClient: Send + Sync {
    /// The repository root, nested three levels deep.
    async fn tree(&self) -> Result<Value>;

    /// The entries directly inside `path`, with text for blobs.
    async fn directory(&self, path: &DirectoryPath) -> Result<Value>;
}

/// GraphQL query listing tree entries three levels deep from the root.
pub fn tree_query() -> &'static str {
    r#"query($owner: String!, $name: String!, $expression: String!) {
  repository(owner: $owner, name: $name) {
    object(expression: $expression) {
      ... on Tree {
        entries {
          name
          path
          object {
            ... on Tree {
              entries {
                name
                path
                object {
                  ... on Tree {
                    entries {
                      name
                      path
                    }
                  }
                }
              }
            }
          }
        }
      }
    }
  }
}"#
}

/// GraphQL query listing the entries of one directory with their text.
pub fn directory_query() -> &'static str {
    r#"query($owner: String!, $name: String!, $expression: String!) {
  repository(owner: $owner, name: $name) {
    object(expression: $expression) {
      ... on Tree {
        entries {
          name
          object {
            ... on Blob {
              text
            }
          }
        }
      }
    }
  }
}"#
}

#[derive(Debug, Deserialize)]
struct GraphqlResponse {
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
}

/// [`TreeClient`] backed by the GitHub GraphQL API (v4).
pub struct GithubClient {
    http: reqwest::Client,
    endpoint: String,
    owner: String,
    repository: String,
    branch: String,
}

impl GithubClient {
    /// Build a client from configuration, reading credentials from the
    /// environment.
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let creds = config.credentials()?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", creds.token))
            .context("Bearer token contains invalid header characters")?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&creds.user_agent)
                .context("Client identifier contains invalid header characters")?,
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            owner: config.owner.clone(),
            repository: config.repository.clone(),
            branch: config.branch.clone(),
        })
    }

    fn expression(&self, path: Option<&DirectoryPath>) -> String {
        match path {
            Some(p) => format!("{}:{}", self.branch, p),
            None => format!("{}:", self.branch),
        }
    }

    async fn execute(&self, query: &str, expression: String) -> Result<Value> {
        debug!(endpoint = %self.endpoint, %expression, "graphql request");

        let body = json!({
            "query": query,
            "variables": {
                "owner": self.owner,
                "name": self.repository,
                "expression": expression,
            }
        });

        let resp = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("GraphQL request to {} failed", self.endpoint))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let excerpt: String = text.chars().take(200).collect();
            bail!("GraphQL endpoint returned {}: {}", status, excerpt);
        }

        let parsed: GraphqlResponse = resp
            .json()
            .await
            .context("GraphQL response was not valid JSON")?;

        if let Some(first) = parsed.errors.first() {
            bail!(
                "GraphQL error ({} total): {}",
                parsed.errors.len(),
                first.message
            );
        }

        parsed
            .data
            .filter(|d| !d.is_null())
            .context("GraphQL response is missing 'data'")
    }
}

#[async_trait]
impl TreeClient for GithubClient {
    async fn tree(&self) -> Result<Value> {
        self.execute(tree_query(), self.expression(None)).await
    }

    async fn directory(&self, path: &DirectoryPath) -> Result<Value> {
        self.execute(directory_query(), self.expression(Some(path)))
            .await
    }
}
