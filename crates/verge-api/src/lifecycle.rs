//! Handlers for the privileged lifecycle operations: deploy, rollback,
//! train, and the manual auto-suggest trigger.
//!
//! Every handler here runs the [`crate::auth::guard`] gate first, so each
//! attempt lands in the audit log exactly once: rejections are recorded by
//! the gate, executions by the orchestrator.

use axum::{
  Json,
  extract::{Path, State},
  http::HeaderMap,
};
use serde::Serialize;
use verge_core::{
  audit::AuditAction,
  orchestrator::{SuggestOutcome, TrainOutcome},
  store::Notifier,
  version::{ModelVersion, VersionLabel},
};

use crate::{
  ApiState, LifecycleStore,
  auth::{guard, request_meta},
  error::ApiError,
};

#[derive(Debug, Default, serde::Deserialize)]
pub struct ActionBody {
  /// Free-text note recorded in the audit entry details.
  pub notes: Option<String>,
}

/// `POST /versions/{label}/deploy`
pub async fn deploy<S, N>(
  State(state): State<ApiState<S, N>>,
  Path(label): Path<VersionLabel>,
  headers: HeaderMap,
  body: Option<Json<ActionBody>>,
) -> Result<Json<ModelVersion>, ApiError>
where
  S: LifecycleStore,
  N: Notifier + Clone + Send + Sync + 'static,
{
  let claims = guard(
    &state,
    &headers,
    AuditAction::Promote,
    Some(label),
    &format!("deploy of version {label}"),
  )
  .await?;

  let notes = body.map(|Json(b)| b.notes).unwrap_or_default();
  let version = state
    .orchestrator
    .deploy(label, &claims.actor(), notes, request_meta(&headers))
    .await?;
  Ok(Json(version))
}

/// `POST /versions/{label}/rollback`
pub async fn rollback<S, N>(
  State(state): State<ApiState<S, N>>,
  Path(label): Path<VersionLabel>,
  headers: HeaderMap,
  body: Option<Json<ActionBody>>,
) -> Result<Json<ModelVersion>, ApiError>
where
  S: LifecycleStore,
  N: Notifier + Clone + Send + Sync + 'static,
{
  let claims = guard(
    &state,
    &headers,
    AuditAction::Rollback,
    Some(label),
    &format!("rollback to version {label}"),
  )
  .await?;

  let notes = body.map(|Json(b)| b.notes).unwrap_or_default();
  let version = state
    .orchestrator
    .rollback(label, &claims.actor(), notes, request_meta(&headers))
    .await?;
  Ok(Json(version))
}

// ─── Train ───────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrainResponse {
  NoFeedback,
  Started { version: ModelVersion },
}

/// `POST /train`
pub async fn train<S, N>(
  State(state): State<ApiState<S, N>>,
  headers: HeaderMap,
) -> Result<Json<TrainResponse>, ApiError>
where
  S: LifecycleStore,
  N: Notifier + Clone + Send + Sync + 'static,
{
  let claims =
    guard(&state, &headers, AuditAction::Train, None, "training run").await?;

  let outcome = state
    .orchestrator
    .train(&claims.actor(), request_meta(&headers))
    .await?;
  Ok(Json(match outcome {
    TrainOutcome::NoFeedback => TrainResponse::NoFeedback,
    TrainOutcome::Started(version) => TrainResponse::Started { version },
  }))
}

// ─── Auto-suggest ────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SuggestResponse {
  NoData,
  KeepCurrent { label: VersionLabel },
  Deployed { version: ModelVersion },
}

/// `POST /auto-suggest` — manual trigger for the scheduled job.
pub async fn auto_suggest<S, N>(
  State(state): State<ApiState<S, N>>,
  headers: HeaderMap,
) -> Result<Json<SuggestResponse>, ApiError>
where
  S: LifecycleStore,
  N: Notifier + Clone + Send + Sync + 'static,
{
  guard(&state, &headers, AuditAction::Promote, None, "auto-suggest trigger")
    .await?;

  let outcome = state.orchestrator.auto_suggest(request_meta(&headers)).await?;
  Ok(Json(match outcome {
    SuggestOutcome::NoData => SuggestResponse::NoData,
    SuggestOutcome::KeepCurrent(label) => SuggestResponse::KeepCurrent { label },
    SuggestOutcome::Deployed(version) => SuggestResponse::Deployed { version },
  }))
}
