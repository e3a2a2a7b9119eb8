//! # Content Mirror CLI (`mirror`)
//!
//! ## Usage
//!
//! ```bash
//! mirror --config ./config/mirror.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `mirror sync` | Resolve, fetch, normalize and cache every directory |
//! | `mirror paths` | List the directory paths a sync would cover |
//! | `mirror get <path>` | Print the cached content of one directory |
//! | `mirror serve` | Sync, then serve the cache over HTTP |
//!
//! Credentials are read from the environment (`GITHUB_TOKEN`,
//! `GITHUB_USER` by default); a `.env` file in the working directory is
//! loaded first.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use content_mirror::cache::CacheStore;
use content_mirror::config::{self, Config};
use content_mirror::models::DirectoryPath;
use content_mirror::remote::GithubClient;
use content_mirror::server;
use content_mirror::sync::{SyncOptions, Syncer};

/// Content Mirror: mirrors a remote content repository into a
/// pre-normalized JSON cache and serves it.
#[derive(Parser)]
#[command(
    name = "mirror",
    about = "Mirror a remote content repository into a servable JSON cache",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/mirror.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full sync pass.
    ///
    /// Exits non-zero only when the directory tree cannot be resolved;
    /// per-directory and per-file failures are listed in the report.
    Sync,

    /// List the directory paths a sync would cover.
    Paths,

    /// Print the cached content of one directory as JSON.
    Get {
        /// Directory path, e.g. `about/people`.
        path: String,
    },

    /// Start the HTTP server.
    ///
    /// Binds to `[server].bind`. With `sync_on_start`, the first sync pass
    /// completes before requests are accepted.
    Serve,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_syncer(cfg: &Config) -> Result<Arc<Syncer>> {
    let client = GithubClient::new(&cfg.remote)?;
    Ok(Arc::new(Syncer::new(
        Arc::new(client),
        CacheStore::new(&cfg.cache.root),
        SyncOptions::from_config(&cfg.sync),
    )))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Sync => {
            let syncer = build_syncer(&cfg)?;
            let report = syncer.run_sync().await?;

            println!(
                "sync {}/{}@{}",
                cfg.remote.owner, cfg.remote.repository, cfg.remote.branch
            );
            println!("  paths resolved: {}", report.paths_resolved);
            println!("  directories synced: {}", report.synced());
            println!("  directories failed: {}", report.failed().len());
            println!("  files dropped: {}", report.dropped_files());
            for outcome in report.failed() {
                if let Some(err) = &outcome.error {
                    println!("  FAILED [{}] {}", err.kind(), err);
                }
            }
            for outcome in &report.directories {
                for dropped in &outcome.dropped_files {
                    println!("  DROPPED {}: {}", outcome.path, dropped);
                }
            }
            println!("{}", if report.is_complete_success() { "ok" } else { "partial" });
        }
        Commands::Paths => {
            let syncer = build_syncer(&cfg)?;
            for path in syncer.resolve().await? {
                println!("{}", path);
            }
        }
        Commands::Get { path } => {
            let path = DirectoryPath::parse(&path)?;
            let store = CacheStore::new(&cfg.cache.root);
            let content = store
                .read(&path)
                .await?
                .with_context(|| format!("no cached content for '{}'; run `mirror sync`", path))?;
            println!("{}", serde_json::to_string_pretty(&content)?);
        }
        Commands::Serve => {
            let syncer = build_syncer(&cfg)?;
            server::run_server(&cfg, syncer).await?;
        }
    }

    Ok(())
}
