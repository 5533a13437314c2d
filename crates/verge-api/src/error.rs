//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
///
/// Authorization failures are deliberately uniform: the response never says
/// whether the token was missing, expired, revoked, or mis-signed. The full
/// reason lives in the audit entry.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  /// Valid request, but the transition is not allowed from the current
  /// state (already deployed, not archived).
  #[error("conflict: {0}")]
  Conflict(String),

  #[error("not authorized")]
  Unauthorized,

  #[error("forbidden")]
  Forbidden,

  #[error("too many requests")]
  RateLimited { retry_after_secs: i64 },

  #[error("internal error")]
  Internal,
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
      ApiError::Unauthorized => {
        (StatusCode::UNAUTHORIZED, "not authorized".to_string())
      }
      ApiError::Forbidden => (StatusCode::FORBIDDEN, "forbidden".to_string()),
      ApiError::RateLimited { retry_after_secs } => {
        let body = Json(json!({ "error": "too many requests" }));
        return (
          StatusCode::TOO_MANY_REQUESTS,
          [("retry-after", retry_after_secs.to_string())],
          body,
        )
          .into_response();
      }
      ApiError::Internal => {
        (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
      }
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}

impl From<verge_core::Error> for ApiError {
  fn from(e: verge_core::Error) -> Self {
    use verge_core::Error as E;
    match e {
      E::Validation(m) => ApiError::BadRequest(m),
      E::NotFound(label) => ApiError::NotFound(format!("version {label} not found")),
      E::AlreadyDeployed(_) | E::NotArchived(_) => ApiError::Conflict(e.to_string()),
      E::Authorization(_) => ApiError::Unauthorized,
      E::RateLimited { retry_after_secs } => {
        ApiError::RateLimited { retry_after_secs }
      }
      E::Persistence(_) | E::Serialization(_) => ApiError::Internal,
    }
  }
}
