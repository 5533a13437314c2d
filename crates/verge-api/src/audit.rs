//! Handlers for the audit-trail query and token revocation endpoints.

use axum::{
  Json,
  extract::{Query, State},
  http::HeaderMap,
};
use serde::Deserialize;
use verge_core::{
  audit::{AuditAction, AuditEntry},
  store::{AuditQuery, AuditStore, Notifier},
};

use crate::{
  ApiState, LifecycleStore,
  auth::{Session, guard, request_meta},
  error::ApiError,
};

// ─── Audit query ─────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct AuditParams {
  pub actor_email: Option<String>,
  pub limit:       Option<usize>,
}

/// `GET /audit[?actor_email=<email>&limit=<n>]` — newest first. Any
/// authenticated role may read the trail.
pub async fn query<S, N>(
  State(state): State<ApiState<S, N>>,
  _session: Session,
  Query(params): Query<AuditParams>,
) -> Result<Json<Vec<AuditEntry>>, ApiError>
where
  S: LifecycleStore,
  N: Notifier + Clone + Send + Sync + 'static,
{
  let entries = state
    .orchestrator
    .store()
    .query(&AuditQuery {
      actor_email: params.actor_email,
      limit:       params.limit,
    })
    .await?;
  Ok(Json(entries))
}

// ─── Revocation ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RevokeBody {
  /// The full token string to revoke; only its fingerprint is stored.
  pub token:  String,
  pub reason: String,
}

/// `POST /tokens/revoke`
pub async fn revoke<S, N>(
  State(state): State<ApiState<S, N>>,
  headers: HeaderMap,
  Json(body): Json<RevokeBody>,
) -> Result<Json<serde_json::Value>, ApiError>
where
  S: LifecycleStore,
  N: Notifier + Clone + Send + Sync + 'static,
{
  let claims = guard(
    &state,
    &headers,
    AuditAction::RevokeToken,
    None,
    "token revocation",
  )
  .await?;

  state
    .orchestrator
    .revoke_token(&body.token, &body.reason, &claims.actor(), request_meta(&headers))
    .await?;
  Ok(Json(serde_json::json!({ "revoked": true })))
}
