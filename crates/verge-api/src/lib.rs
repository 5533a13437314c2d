//! JSON REST API for Verge.
//!
//! Exposes an axum [`Router`] backed by any combined lifecycle store. TLS
//! and transport concerns are the caller's responsibility; authentication is
//! not — session tokens, role gates, rate limiting, and rejection auditing
//! all happen here, because a privileged attempt must reach the audit log
//! even when it never reaches the orchestrator.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", verge_api::api_router(state.clone()))
//! ```

pub mod audit;
pub mod auth;
pub mod error;
pub mod lifecycle;
pub mod versions;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use verge_core::{
  orchestrator::Orchestrator,
  store::{
    AuditStore, FeedbackStore, Notifier, OutcomeStore, RateLimiter,
    RevocationStore, VersionStore,
  },
};
use verge_token::TokenCodec;

pub use error::ApiError;

/// Everything the API needs from a storage backend, as one handle.
pub trait LifecycleStore:
  VersionStore
  + AuditStore
  + FeedbackStore
  + OutcomeStore
  + RevocationStore
  + RateLimiter
  + Clone
  + Send
  + Sync
  + 'static
{
}

impl<T> LifecycleStore for T where
  T: VersionStore
    + AuditStore
    + FeedbackStore
    + OutcomeStore
    + RevocationStore
    + RateLimiter
    + Clone
    + Send
    + Sync
    + 'static
{
}

/// Shared state threaded through all API handlers.
pub struct ApiState<S, N> {
  pub orchestrator: Arc<Orchestrator<S, N>>,
  pub codec:        Arc<TokenCodec>,
}

impl<S, N> Clone for ApiState<S, N> {
  fn clone(&self) -> Self {
    Self {
      orchestrator: self.orchestrator.clone(),
      codec:        self.codec.clone(),
    }
  }
}

/// Build a fully-materialised API router for `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S, N>(state: ApiState<S, N>) -> Router<()>
where
  S: LifecycleStore,
  N: Notifier + Clone + Send + Sync + 'static,
{
  Router::new()
    // Versions
    .route("/versions", get(versions::list::<S, N>))
    .route("/versions/deployed", get(versions::deployed::<S, N>))
    .route("/versions/{label}/ready", post(versions::ready::<S, N>))
    // Lifecycle
    .route("/versions/{label}/deploy", post(lifecycle::deploy::<S, N>))
    .route("/versions/{label}/rollback", post(lifecycle::rollback::<S, N>))
    .route("/train", post(lifecycle::train::<S, N>))
    .route("/auto-suggest", post(lifecycle::auto_suggest::<S, N>))
    // Audit trail and revocation
    .route("/audit", get(audit::query::<S, N>))
    .route("/tokens/revoke", post(audit::revoke::<S, N>))
    .with_state(state)
}

// ─── Integration tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use axum::{
    body::Body,
    http::{Request, StatusCode, header},
  };
  use chrono::Duration;
  use tower::ServiceExt as _;
  use uuid::Uuid;
  use verge_core::{
    audit::{Actor, AuditAction, AuditStatus, Role},
    orchestrator::Orchestrator,
    outcome::OutcomeLabel,
    store::{AuditQuery, AuditStore, NullNotifier, VersionStore},
    version::{NewTrainingVersion, TrainingMetrics, VersionStatus},
  };
  use verge_store_sqlite::{RateLimitConfig, SqliteStore};
  use verge_token::TokenCodec;

  use super::*;

  async fn state_with_quota(quota: u32) -> ApiState<SqliteStore, NullNotifier> {
    let store = SqliteStore::open_in_memory(RateLimitConfig {
      quota,
      window_secs: 3600,
      block_secs: 3600,
    })
    .await
    .unwrap();
    ApiState {
      orchestrator: Arc::new(Orchestrator::new(store, NullNotifier)),
      codec:        Arc::new(TokenCodec::new("session-secret", "link-secret")),
    }
  }

  async fn make_state() -> ApiState<SqliteStore, NullNotifier> {
    state_with_quota(100).await
  }

  fn bearer(state: &ApiState<SqliteStore, NullNotifier>, role: Role) -> String {
    let email = match role {
      Role::Admin => "admin@example.com",
      Role::Operator => "operator@example.com",
      Role::Viewer => "viewer@example.com",
    };
    let token = state
      .codec
      .issue_session(Uuid::new_v4(), email, role, Default::default(), Duration::hours(8))
      .unwrap();
    format!("Bearer {token}")
  }

  async fn seed_training(
    state: &ApiState<SqliteStore, NullNotifier>,
  ) -> verge_core::version::ModelVersion {
    state
      .orchestrator
      .store()
      .create_training(NewTrainingVersion {
        feedback_ids: vec![],
        metrics:      TrainingMetrics::default(),
      })
      .await
      .unwrap()
  }

  async fn send(
    state: &ApiState<SqliteStore, NullNotifier>,
    method: &str,
    uri: &str,
    auth: Option<&str>,
    body: Option<&str>,
  ) -> axum::response::Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(auth) = auth {
      builder = builder.header(header::AUTHORIZATION, auth);
    }
    let req = match body {
      Some(json) => builder
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json.to_string()))
        .unwrap(),
      None => builder.body(Body::empty()).unwrap(),
    };
    api_router(state.clone()).oneshot(req).await.unwrap()
  }

  async fn json_body(resp: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
  }

  // ── Reads ───────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn unauthenticated_read_is_rejected() {
    let state = make_state().await;
    let resp = send(&state, "GET", "/versions", None, None).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
  }

  #[tokio::test]
  async fn any_role_can_list_versions() {
    let state = make_state().await;
    seed_training(&state).await;

    let auth = bearer(&state, Role::Viewer);
    let resp = send(&state, "GET", "/versions", Some(&auth), None).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body = json_body(resp).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["label"], "1.0.0");
  }

  #[tokio::test]
  async fn deployed_returns_404_when_nothing_is_live() {
    let state = make_state().await;
    let auth = bearer(&state, Role::Viewer);
    let resp = send(&state, "GET", "/versions/deployed", Some(&auth), None).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
  }

  // ── Deploy / rollback ───────────────────────────────────────────────────

  #[tokio::test]
  async fn admin_deploy_succeeds_and_audits_once() {
    let state = make_state().await;
    let v = seed_training(&state).await;

    let auth = bearer(&state, Role::Admin);
    let resp = send(
      &state,
      "POST",
      &format!("/versions/{}/deploy", v.label),
      Some(&auth),
      Some(r#"{"notes":"ship it"}"#),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body = json_body(resp).await;
    assert_eq!(body["status"], "deployed");
    assert_eq!(body["deployed_by"], "admin@example.com");

    let entries = state
      .orchestrator
      .store()
      .query(&AuditQuery::default())
      .await
      .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].action, AuditAction::Promote);
    assert_eq!(entries[0].status, AuditStatus::Success);
    assert!(entries[0].details.contains("ship it"));
  }

  #[tokio::test]
  async fn viewer_deploy_is_forbidden_and_audited() {
    let state = make_state().await;
    let v = seed_training(&state).await;

    let auth = bearer(&state, Role::Viewer);
    let resp = send(
      &state,
      "POST",
      &format!("/versions/{}/deploy", v.label),
      Some(&auth),
      None,
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // The rejection is attributed to the verified caller.
    let entries = state
      .orchestrator
      .store()
      .query(&AuditQuery::default())
      .await
      .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, AuditStatus::Failed);
    assert_eq!(entries[0].actor.email.as_deref(), Some("viewer@example.com"));

    // And the version was not touched.
    let v = state.orchestrator.store().get_version(v.label).await.unwrap().unwrap();
    assert_eq!(v.status, VersionStatus::Training);
  }

  #[tokio::test]
  async fn deploy_of_unknown_version_is_404_and_audited() {
    let state = make_state().await;
    let auth = bearer(&state, Role::Admin);
    let resp =
      send(&state, "POST", "/versions/9.9.9/deploy", Some(&auth), None).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let entries = state
      .orchestrator
      .store()
      .query(&AuditQuery::default())
      .await
      .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, AuditStatus::Failed);
    assert_eq!(entries[0].meta.version, Some("9.9.9".parse().unwrap()));
  }

  #[tokio::test]
  async fn malformed_label_is_rejected_before_any_state_access() {
    let state = make_state().await;
    let auth = bearer(&state, Role::Admin);
    let resp = send(
      &state,
      "POST",
      "/versions/not-a-label/deploy",
      Some(&auth),
      None,
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn rollback_round_trip() {
    let state = make_state().await;
    let auth = bearer(&state, Role::Admin);

    let old = seed_training(&state).await;
    send(&state, "POST", &format!("/versions/{}/deploy", old.label), Some(&auth), None)
      .await;
    let new = seed_training(&state).await;
    send(&state, "POST", &format!("/versions/{}/deploy", new.label), Some(&auth), None)
      .await;

    let resp = send(
      &state,
      "POST",
      &format!("/versions/{}/rollback", old.label),
      Some(&auth),
      None,
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body = json_body(resp).await;
    assert_eq!(body["status"], "deployed");
    assert_eq!(body["label"], old.label.to_string());
  }

  #[tokio::test]
  async fn rollback_to_non_archived_version_is_conflict() {
    let state = make_state().await;
    let auth = bearer(&state, Role::Admin);
    let v = seed_training(&state).await;

    let resp = send(
      &state,
      "POST",
      &format!("/versions/{}/rollback", v.label),
      Some(&auth),
      None,
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
  }

  // ── Rate limiting ───────────────────────────────────────────────────────

  #[tokio::test]
  async fn privileged_attempts_beyond_quota_get_429() {
    let state = state_with_quota(1).await;
    let auth = bearer(&state, Role::Admin);
    let v = seed_training(&state).await;

    let first = send(
      &state,
      "POST",
      &format!("/versions/{}/deploy", v.label),
      Some(&auth),
      None,
    )
    .await;
    assert_eq!(first.status(), StatusCode::OK);

    let second = send(
      &state,
      "POST",
      &format!("/versions/{}/deploy", v.label),
      Some(&auth),
      None,
    )
    .await;
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(second.headers().contains_key("retry-after"));

    // One entry for the executed deploy, one for the blocked attempt.
    let entries = state
      .orchestrator
      .store()
      .query(&AuditQuery::default())
      .await
      .unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].status, AuditStatus::Failed);
    assert_eq!(entries[0].meta.error.as_deref(), Some("rate limited"));
  }

  // ── Revocation ──────────────────────────────────────────────────────────

  #[tokio::test]
  async fn revoked_session_token_stops_working() {
    let state = make_state().await;
    let auth = bearer(&state, Role::Admin);
    let token = auth.strip_prefix("Bearer ").unwrap().to_string();

    let before = send(&state, "GET", "/versions", Some(&auth), None).await;
    assert_eq!(before.status(), StatusCode::OK);

    state
      .orchestrator
      .revoke_token(&token, "leaked", &Actor::system(), Default::default())
      .await
      .unwrap();

    let after = send(&state, "GET", "/versions", Some(&auth), None).await;
    assert_eq!(after.status(), StatusCode::UNAUTHORIZED);
  }

  #[tokio::test]
  async fn revoke_endpoint_requires_admin() {
    let state = make_state().await;
    let operator = bearer(&state, Role::Operator);
    let resp = send(
      &state,
      "POST",
      "/tokens/revoke",
      Some(&operator),
      Some(r#"{"token":"whatever","reason":"test"}"#),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
  }

  // ── Training and auto-suggest ───────────────────────────────────────────

  #[tokio::test]
  async fn train_endpoint_consumes_feedback() {
    let state = make_state().await;
    let auth = bearer(&state, Role::Admin);
    let store = state.orchestrator.store();
    store
      .add_feedback(serde_json::json!({ "case": 1 }), true)
      .await
      .unwrap();

    let resp = send(&state, "POST", "/train", Some(&auth), None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["status"], "started");
    assert_eq!(body["version"]["label"], "1.0.0");

    // Second run finds nothing left.
    let resp = send(&state, "POST", "/train", Some(&auth), None).await;
    let body = json_body(resp).await;
    assert_eq!(body["status"], "no_feedback");
  }

  #[tokio::test]
  async fn auto_suggest_endpoint_promotes_best_version() {
    let state = make_state().await;
    let auth = bearer(&state, Role::Admin);
    let store = state.orchestrator.store().clone();

    let v = seed_training(&state).await;
    for _ in 0..3 {
      store.add_outcome(v.label, OutcomeLabel::Improved).await.unwrap();
    }

    let resp = send(&state, "POST", "/auto-suggest", Some(&auth), None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["status"], "deployed");
    assert_eq!(body["version"]["label"], v.label.to_string());
  }

  // ── Ready callback and audit query ──────────────────────────────────────

  #[tokio::test]
  async fn operator_can_mark_ready_but_viewer_cannot() {
    let state = make_state().await;
    let v = seed_training(&state).await;

    let viewer = bearer(&state, Role::Viewer);
    let resp = send(
      &state,
      "POST",
      &format!("/versions/{}/ready", v.label),
      Some(&viewer),
      None,
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let operator = bearer(&state, Role::Operator);
    let resp = send(
      &state,
      "POST",
      &format!("/versions/{}/ready", v.label),
      Some(&operator),
      None,
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await["status"], "ready");
  }

  #[tokio::test]
  async fn audit_query_filters_by_actor() {
    let state = make_state().await;
    let admin = bearer(&state, Role::Admin);
    let viewer = bearer(&state, Role::Viewer);
    let v = seed_training(&state).await;

    // admin deploys, viewer gets rejected; two entries, two actors.
    send(&state, "POST", &format!("/versions/{}/deploy", v.label), Some(&admin), None)
      .await;
    send(&state, "POST", &format!("/versions/{}/deploy", v.label), Some(&viewer), None)
      .await;

    let resp = send(
      &state,
      "GET",
      "/audit?actor_email=viewer@example.com",
      Some(&admin),
      None,
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    let entries = body.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["status"], "failed");
  }
}
