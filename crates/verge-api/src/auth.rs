//! Session-token authentication and the pre-execution guard for privileged
//! handlers.
//!
//! Read handlers take the [`Session`] extractor. Mutating handlers call
//! [`guard`] instead, so a rejected attempt can be written to the audit log
//! before the generic error response goes out.

use std::fmt;

use axum::{
  extract::FromRequestParts,
  http::{HeaderMap, header, request::Parts},
};
use verge_core::{
  audit::{Actor, AuditAction, AuditMeta, Role},
  store::{Notifier, RateDecision, RateLimiter, RevocationStore},
  version::VersionLabel,
};
use verge_token::{Claims, SessionBinding, TokenCodec, TokenDomain};

use crate::{ApiState, LifecycleStore, error::ApiError};

// ─── Header plumbing ─────────────────────────────────────────────────────────

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
  headers
    .get(header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.strip_prefix("Bearer "))
}

/// The device/session context the caller presents, checked against the
/// binding embedded in the session token.
fn presented_binding(headers: &HeaderMap) -> SessionBinding {
  let get = |name: &str| {
    headers
      .get(name)
      .and_then(|v| v.to_str().ok())
      .map(str::to_owned)
  };
  SessionBinding {
    device_id:  get("x-device-id"),
    session_id: get("x-session-id"),
  }
}

/// Network identity used for rate limiting. All callers sharing an origin
/// share the quota, authenticated or not.
pub fn rate_identity(headers: &HeaderMap) -> String {
  headers
    .get("x-forwarded-for")
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.split(',').next())
    .map(|v| v.trim().to_owned())
    .unwrap_or_else(|| "unknown".to_owned())
}

/// Correlation metadata recorded with every attempt that reaches the audit
/// log.
pub fn request_meta(headers: &HeaderMap) -> AuditMeta {
  AuditMeta {
    origin: Some(rate_identity(headers)),
    client: headers
      .get(header::USER_AGENT)
      .and_then(|v| v.to_str().ok())
      .map(str::to_owned),
    ..Default::default()
  }
}

// ─── Authentication ──────────────────────────────────────────────────────────

/// Why authentication failed. Internal only: callers see a uniform 401, the
/// audit log sees this.
enum AuthFailure {
  MissingToken,
  Invalid(verge_token::Error),
  Revoked,
}

impl fmt::Display for AuthFailure {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::MissingToken => write!(f, "no bearer token presented"),
      Self::Invalid(e) => write!(f, "token rejected: {e}"),
      Self::Revoked => write!(f, "token is revoked"),
    }
  }
}

async fn authenticate<S, N>(
  headers: &HeaderMap,
  state: &ApiState<S, N>,
) -> Result<Claims, AuthFailure>
where
  S: LifecycleStore,
  N: Notifier,
{
  let token = bearer_token(headers).ok_or(AuthFailure::MissingToken)?;
  let binding = presented_binding(headers);

  let claims = state
    .codec
    .verify(token, TokenDomain::Session, Some(&binding))
    .map_err(AuthFailure::Invalid)?;

  if state.orchestrator.store().is_revoked(token).await {
    return Err(AuthFailure::Revoked);
  }

  Ok(claims)
}

/// The verified session identity. Present in a handler signature means the
/// request carried a valid, unrevoked session token.
pub struct Session(pub Claims);

impl<S, N> FromRequestParts<ApiState<S, N>> for Session
where
  S: LifecycleStore,
  N: Notifier + Clone + Send + Sync + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &ApiState<S, N>,
  ) -> Result<Self, Self::Rejection> {
    authenticate(&parts.headers, state)
      .await
      .map(Session)
      .map_err(|_| ApiError::Unauthorized)
  }
}

// ─── Privileged-action guard ─────────────────────────────────────────────────

/// Rate-check and authorize one privileged attempt.
///
/// Every rejection is written to the audit log before the generic response,
/// attributing the actor forensically from the token when it at least
/// decodes. Unverified claims contribute attribution only, never
/// authorization.
pub async fn guard<S, N>(
  state: &ApiState<S, N>,
  headers: &HeaderMap,
  action: AuditAction,
  version: Option<VersionLabel>,
  details: &str,
) -> Result<Claims, ApiError>
where
  S: LifecycleStore,
  N: Notifier,
{
  let mut meta = request_meta(headers);
  meta.version = version;

  let forensic_actor = || {
    bearer_token(headers)
      .and_then(TokenCodec::decode_unverified)
      .map(|c| c.actor())
      .unwrap_or_else(Actor::unknown)
  };

  match state.orchestrator.store().consume(&rate_identity(headers)).await? {
    RateDecision::Allowed => {}
    RateDecision::Blocked { retry_after_secs } => {
      meta.error = Some("rate limited".to_owned());
      state
        .orchestrator
        .record_rejection(
          &forensic_actor(),
          action,
          format!("{details} rejected: rate limited"),
          meta,
        )
        .await?;
      return Err(ApiError::RateLimited { retry_after_secs });
    }
  }

  let claims = match authenticate(headers, state).await {
    Ok(claims) => claims,
    Err(failure) => {
      meta.error = Some(failure.to_string());
      state
        .orchestrator
        .record_rejection(
          &forensic_actor(),
          action,
          format!("{details} rejected: not authorized"),
          meta,
        )
        .await?;
      return Err(ApiError::Unauthorized);
    }
  };

  if claims.role != Role::Admin {
    meta.error = Some(format!("role {} is not admin", claims.role));
    state
      .orchestrator
      .record_rejection(
        &claims.actor(),
        action,
        format!("{details} rejected: insufficient role"),
        meta,
      )
      .await?;
    return Err(ApiError::Forbidden);
  }

  Ok(claims)
}
