//! HTTP server assembly for Verge.
//!
//! Wires the operator JSON API, the login endpoint, and the out-of-band
//! action gateway into one axum [`Router`] over a SQLite store, with
//! queue-backed notification dispatch and the periodic auto-suggest task.

pub mod auth;
pub mod gateway;
pub mod notify;
pub mod scheduler;

use std::{path::PathBuf, sync::Arc};

use axum::{
  Router,
  routing::{get, post},
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use verge_api::ApiState;
use verge_store_sqlite::{RateLimitConfig, SqliteStore};

use auth::AuthConfig;
use notify::QueueNotifier;

// ─── Configuration ───────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml`.
#[derive(Deserialize, Clone)]
pub struct ServerConfig {
  pub host:               String,
  pub port:               u16,
  /// Public base URL, used when printing action links.
  pub base_url:           String,
  pub store_path:         PathBuf,

  pub auth_username:      String,
  pub auth_password_hash: String,
  pub auth_email:         String,

  /// Signing secrets for the two token domains. Must differ.
  pub session_secret:     String,
  pub link_secret:        String,
  #[serde(default = "default_session_ttl_hours")]
  pub session_ttl_hours:  i64,
  #[serde(default = "default_link_ttl_hours")]
  pub link_ttl_hours:     i64,

  #[serde(default = "default_rate_quota")]
  pub rate_quota:         u32,
  #[serde(default = "default_rate_window_secs")]
  pub rate_window_secs:   i64,
  #[serde(default = "default_rate_block_secs")]
  pub rate_block_secs:    i64,

  #[serde(default = "default_true")]
  pub auto_suggest_enabled:      bool,
  #[serde(default = "default_auto_suggest_period_hours")]
  pub auto_suggest_period_hours: u64,

  /// Named notification channels to dispatch to. Only "log" ships in-tree.
  #[serde(default = "default_notify_channels")]
  pub notify_channels:           Vec<String>,
}

fn default_session_ttl_hours() -> i64 {
  8
}
fn default_link_ttl_hours() -> i64 {
  48
}
fn default_rate_quota() -> u32 {
  5
}
fn default_rate_window_secs() -> i64 {
  3600
}
fn default_rate_block_secs() -> i64 {
  3600
}
fn default_true() -> bool {
  true
}
fn default_auto_suggest_period_hours() -> u64 {
  168
}
fn default_notify_channels() -> Vec<String> {
  vec!["log".to_owned()]
}

impl ServerConfig {
  /// Cross-field invariants that deserialisation cannot express. Called at
  /// startup before anything is built from the config.
  pub fn validate(&self) -> anyhow::Result<()> {
    anyhow::ensure!(
      self.session_secret != self.link_secret,
      "session_secret and link_secret must differ",
    );
    // The cooldown must outlast the counting window, so a blocked identity
    // always comes back to a fresh window.
    anyhow::ensure!(
      self.rate_block_secs >= self.rate_window_secs,
      "rate_block_secs ({}) must be at least rate_window_secs ({})",
      self.rate_block_secs,
      self.rate_window_secs,
    );
    Ok(())
  }

  pub fn rate_limits(&self) -> RateLimitConfig {
    RateLimitConfig {
      quota:       self.rate_quota,
      window_secs: self.rate_window_secs,
      block_secs:  self.rate_block_secs,
    }
  }
}

// ─── Application state ───────────────────────────────────────────────────────

/// Shared state threaded through the server's own handlers. The nested API
/// router carries `api` on its own.
#[derive(Clone)]
pub struct AppState {
  pub api:    ApiState<SqliteStore, QueueNotifier>,
  pub auth:   Arc<AuthConfig>,
  pub config: Arc<ServerConfig>,
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build the complete server router.
pub fn router(state: AppState) -> Router {
  Router::new()
    .route("/auth/login", post(auth::login))
    .route("/actions", get(gateway::actions))
    .with_state(state.clone())
    .nest("/api", verge_api::api_router(state.api.clone()))
    .layer(TraceLayer::new_for_http())
}

// ─── Integration tests ───────────────────────────────────────────────────────
