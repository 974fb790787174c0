//! kalas-server binary.
//!
//! Reads `config.toml` (or the path given with `--config`) layered under
//! `KALAS_*` environment variables, opens the SQLite store, and serves the
//! HTTP API.
//!
//! # Key generation
//!
//! To generate a value for `allergy_key`:
//!
//! ```text
//! cargo run -p kalas-server -- --generate-key
//! ```
//!
//! # One-shot retention
//!
//! Hosts that drive retention from system cron instead of the HTTP endpoints
//! can run both sweeps once and exit:
//!
//! ```text
//! kalas-server --config /etc/kalaskoll.toml --sweep
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use chrono::Utc;
use clap::Parser;
use kalas_cipher::KEY_LEN;
use kalas_server::{AppState, ServerConfig};
use kalas_store_sqlite::SqliteStore;
use rand_core::{OsRng, RngCore};
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "KalasKoll allergy-data service")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Print a fresh base64 allergy key and exit.
  #[arg(long)]
  generate_key: bool,

  /// Run both retention sweeps once and exit.
  #[arg(long)]
  sweep: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  if cli.generate_key {
    let mut raw = [0u8; KEY_LEN];
    OsRng.fill_bytes(&mut raw);
    println!("{}", B64.encode(raw));
    return Ok(());
  }

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("KALAS"))
    .build()
    .context("failed to read config file")?;

  let mut server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;
  server_cfg.store_path = expand_tilde(&server_cfg.store_path);

  tracing::info!(config = ?server_cfg, "configuration loaded");

  let store = SqliteStore::open(&server_cfg.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", server_cfg.store_path))?;

  let address = format!("{}:{}", server_cfg.host, server_cfg.port);
  let state = AppState::new(store, server_cfg);

  if cli.sweep {
    let now = Utc::now();
    let sweeper = state.sweeper();
    let allergies = sweeper
      .sweep_allergy_records(now)
      .await
      .context("allergy retention sweep failed")?;
    let parties = sweeper
      .sweep_stale_parties(now)
      .await
      .context("party retention sweep failed")?;
    println!(
      "allergy records deleted: {allergies}; parties dated before {} deleted: {}",
      parties.cutoff, parties.deleted
    );
    return Ok(());
  }

  let app = kalas_server::router(state);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
