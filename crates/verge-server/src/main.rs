//! verge server binary.
//!
//! Reads `config.toml` (or the path given with `--config`), opens an
//! in-process SQLite store, and serves the lifecycle API, login endpoint,
//! and action gateway over HTTP.
//!
//! # Helper modes
//!
//! Generate the argon2 PHC string for `auth_password_hash`:
//!
//! ```
//! cargo run -p verge-server --bin server -- --hash-password
//! ```
//!
//! Mint an out-of-band action link (printed as a full URL):
//!
//! ```
//! cargo run -p verge-server --bin server -- \
//!   --issue-link --action promote --version 1.2.0 --email ops@example.com
//! ```

use std::{
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use anyhow::Context as _;
use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
use clap::Parser;
use rand_core::OsRng;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;
use verge_api::ApiState;
use verge_core::{audit::{LinkAction, Role}, orchestrator::Orchestrator};
use verge_server::{
  AppState, ServerConfig,
  auth::AuthConfig,
  notify::{LogChannel, QueueNotifier},
  scheduler,
};
use verge_store_sqlite::SqliteStore;
use verge_token::TokenCodec;

#[derive(Parser)]
#[command(author, version, about = "Verge model lifecycle server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Print the argon2 hash for a password entered on stdin and exit.
  #[arg(long)]
  hash_password: bool,

  /// Mint a signed action link and exit. Requires --action, --version and
  /// --email.
  #[arg(long)]
  issue_link: bool,

  /// Action for --issue-link: promote or rollback.
  #[arg(long)]
  action: Option<LinkAction>,

  /// Target version for --issue-link, e.g. 1.2.0.
  #[arg(long)]
  version: Option<String>,

  /// Actor email embedded in the link for audit attribution.
  #[arg(long)]
  email: Option<String>,
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

  // Helper mode: hash a password and exit.
  if cli.hash_password {
    let password = read_password()?;
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
      .hash_password(password.as_bytes(), &salt)
      .map_err(|e| anyhow::anyhow!("argon2 error: {e}"))?
      .to_string();
    println!("{hash}");
    return Ok(());
  }

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("VERGE"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  server_cfg.validate()?;

  let codec = TokenCodec::new(&server_cfg.session_secret, &server_cfg.link_secret);

  // Helper mode: mint an action link and exit.
  if cli.issue_link {
    let action = cli.action.context("--issue-link requires --action")?;
    let version = cli
      .version
      .context("--issue-link requires --version")?
      .parse()
      .map_err(|e| anyhow::anyhow!("bad --version: {e}"))?;
    let email = cli.email.context("--issue-link requires --email")?;

    let token = codec.issue_link(
      Uuid::new_v4(),
      &email,
      Role::Admin,
      action,
      version,
      chrono::Duration::hours(server_cfg.link_ttl_hours),
    )?;
    println!(
      "{}/actions?token={token}&action={action}&version={version}",
      server_cfg.base_url.trim_end_matches('/'),
    );
    return Ok(());
  }

  // Open SQLite store.
  let store_path = expand_tilde(&server_cfg.store_path);
  let store = SqliteStore::open(&store_path, server_cfg.rate_limits())
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  // Notification dispatch.
  let mut channels: Vec<Arc<dyn verge_server::notify::Channel>> = Vec::new();
  for name in &server_cfg.notify_channels {
    match name.as_str() {
      "log" => channels.push(Arc::new(LogChannel)),
      other => tracing::warn!("ignoring unknown notification channel {other:?}"),
    }
  }
  let (notifier, _dispatcher) = QueueNotifier::spawn(channels);

  let orchestrator = Arc::new(Orchestrator::new(store, notifier));

  if server_cfg.auto_suggest_enabled {
    let period =
      Duration::from_secs(server_cfg.auto_suggest_period_hours * 3600);
    scheduler::spawn_auto_suggest(orchestrator.clone(), period);
  }

  let state = AppState {
    api:    ApiState { orchestrator, codec: Arc::new(codec) },
    auth:   Arc::new(AuthConfig {
      username:      server_cfg.auth_username.clone(),
      password_hash: server_cfg.auth_password_hash.clone(),
      email:         server_cfg.auth_email.clone(),
      user_id:       Uuid::new_v4(),
    }),
    config: Arc::new(server_cfg.clone()),
  };

  let app = verge_server::router(state);
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

/// Read a password from stdin.
fn read_password() -> anyhow::Result<String> {
  use std::io::{self, BufRead, Write};
  let stdin = io::stdin();
  print!("Password: ");
  io::stdout().flush().ok();
  let mut line = String::new();
  stdin.lock().read_line(&mut line)?;
  Ok(line.trim_end_matches(['\n', '\r']).to_string())
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
