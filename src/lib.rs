//! # Content Mirror
//!
//! Mirrors a hierarchical content tree from a remote Git repository into a
//! locally servable, pre-normalized JSON cache, and re-synchronizes it on
//! demand.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌───────────────┐   ┌──────────┐
//! │   Remote    │──▶│   Resolve    │──▶│ Fetch → Norm. │──▶│  Cache   │
//! │  (GraphQL)  │   │  dir paths   │   │ → Aggregate   │   │ JSON/dir │
//! └─────────────┘   └──────────────┘   └───────────────┘   └────┬─────┘
//!                                                              │
//!                                       ┌──────────────────────┤
//!                                       ▼                      ▼
//!                                  ┌──────────┐          ┌──────────┐
//!                                  │   CLI    │          │   HTTP   │
//!                                  │ (mirror) │          │  server  │
//!                                  └──────────┘          └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export GITHUB_TOKEN=...        # bearer token for the GraphQL API
//! mirror paths                   # list directories that would be synced
//! mirror sync                    # fetch, normalize and cache everything
//! mirror get about/people        # print one cached directory
//! mirror serve                   # sync, then serve the cache over HTTP
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Sync failure taxonomy |
//! | [`remote`] | GraphQL tree client |
//! | [`resolve`] | Directory path resolution |
//! | [`fetch`] | Per-directory content fetching |
//! | [`normalize`] | YAML / Markdown normalization |
//! | [`aggregate`] | `{index, data, toc}` aggregation |
//! | [`cache`] | On-disk JSON cache |
//! | [`sync`] | Sync orchestration and reports |
//! | [`server`] | HTTP server |

pub mod aggregate;
pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod models;
pub mod normalize;
pub mod remote;
pub mod resolve;
pub mod server;
pub mod sync;
