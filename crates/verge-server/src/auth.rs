//! Operator login.
//!
//! `POST /auth/login` exchanges the configured username/password for a
//! session-domain capability token bound to the caller's device and a fresh
//! server-chosen session id. The password is checked against an argon2 PHC
//! hash from config; the plaintext never touches disk.

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::{
  Json,
  extract::State,
  http::{HeaderMap, StatusCode},
  response::{IntoResponse, Response},
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use verge_api::auth::rate_identity;
use verge_core::{audit::Role, store::RateLimiter as _};

use crate::AppState;

/// The single configured operator account.
#[derive(Clone)]
pub struct AuthConfig {
  pub username:      String,
  pub password_hash: String,
  pub email:         String,
  /// Stable identity for the lifetime of the process; audit entries key on
  /// email for durable attribution.
  pub user_id:       Uuid,
}

#[derive(Deserialize)]
pub struct LoginBody {
  pub username:  String,
  pub password:  String,
  /// Client device identifier baked into the token binding, if presented.
  pub device_id: Option<String>,
}

#[derive(Serialize)]
pub struct LoginResponse {
  pub token:      String,
  /// Must be presented as `x-session-id` on every subsequent request.
  pub session_id: String,
  pub expires_at: chrono::DateTime<Utc>,
}

/// Verify `password` against an argon2 PHC string.
pub fn verify_password(password: &str, phc: &str) -> bool {
  let Ok(parsed) = PasswordHash::new(phc) else {
    tracing::error!("configured password hash is not a valid PHC string");
    return false;
  };
  Argon2::default()
    .verify_password(password.as_bytes(), &parsed)
    .is_ok()
}

/// `POST /auth/login`
///
/// Login attempts consume rate-limit quota like any other privileged
/// attempt, so credential stuffing hits the same wall as action hammering.
pub async fn login(
  State(state): State<AppState>,
  headers: HeaderMap,
  Json(body): Json<LoginBody>,
) -> Response {
  match state.api.orchestrator.store().consume(&rate_identity(&headers)).await {
    Ok(verge_core::store::RateDecision::Allowed) => {}
    Ok(verge_core::store::RateDecision::Blocked { retry_after_secs }) => {
      return (
        StatusCode::TOO_MANY_REQUESTS,
        [("retry-after", retry_after_secs.to_string())],
        "too many attempts",
      )
        .into_response();
    }
    Err(e) => {
      tracing::error!("rate limiter unavailable during login: {e}");
      return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
  }

  let auth = &state.auth;
  if body.username != auth.username
    || !verify_password(&body.password, &auth.password_hash)
  {
    tracing::warn!(username = %body.username, "rejected login attempt");
    return (StatusCode::UNAUTHORIZED, "invalid credentials").into_response();
  }

  let session_id = Uuid::new_v4().to_string();
  let expires_at = Utc::now() + Duration::hours(state.config.session_ttl_hours);
  let token = match state.api.codec.issue_session(
    auth.user_id,
    &auth.email,
    Role::Admin,
    verge_token::SessionBinding {
      device_id:  body.device_id,
      session_id: Some(session_id.clone()),
    },
    Duration::hours(state.config.session_ttl_hours),
  ) {
    Ok(token) => token,
    Err(e) => {
      tracing::error!("failed to issue session token: {e}");
      return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
  };

  tracing::info!(email = %auth.email, "operator logged in");
  Json(LoginResponse { token, session_id, expires_at }).into_response()
}
