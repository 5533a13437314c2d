//! Handlers for `/versions` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/versions` | All versions, newest first |
//! | `GET`  | `/versions/deployed` | 404 if nothing is live |
//! | `POST` | `/versions/{label}/ready` | Training job completion callback |

use axum::{
  Json,
  extract::{Path, State},
};
use verge_core::{
  audit::Role,
  store::{Notifier, VersionStore},
  version::{ModelVersion, VersionLabel},
};

use crate::{ApiState, LifecycleStore, auth::Session, error::ApiError};

/// `GET /versions`
pub async fn list<S, N>(
  State(state): State<ApiState<S, N>>,
  _session: Session,
) -> Result<Json<Vec<ModelVersion>>, ApiError>
where
  S: LifecycleStore,
  N: Notifier + Clone + Send + Sync + 'static,
{
  let versions = state.orchestrator.store().list_versions().await?;
  Ok(Json(versions))
}

/// `GET /versions/deployed`
pub async fn deployed<S, N>(
  State(state): State<ApiState<S, N>>,
  _session: Session,
) -> Result<Json<ModelVersion>, ApiError>
where
  S: LifecycleStore,
  N: Notifier + Clone + Send + Sync + 'static,
{
  let version = state
    .orchestrator
    .store()
    .deployed_version()
    .await?
    .ok_or_else(|| ApiError::NotFound("no version is deployed".to_owned()))?;
  Ok(Json(version))
}

/// `POST /versions/{label}/ready` — called when the external training job
/// reports completion. Operators may do this; viewers may not.
pub async fn ready<S, N>(
  State(state): State<ApiState<S, N>>,
  Path(label): Path<VersionLabel>,
  Session(claims): Session,
) -> Result<Json<ModelVersion>, ApiError>
where
  S: LifecycleStore,
  N: Notifier + Clone + Send + Sync + 'static,
{
  if claims.role == Role::Viewer {
    return Err(ApiError::Forbidden);
  }
  let version = state.orchestrator.store().mark_ready(label).await?;
  Ok(Json(version))
}
