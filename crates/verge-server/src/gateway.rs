//! Out-of-band action gateway.
//!
//! `GET /actions` executes a promote or rollback from a signed link-domain
//! token, the kind embedded in notification emails. The token itself carries
//! the intended action and target version; the query parameters merely
//! restate them and must match, so a link cannot be repurposed by editing
//! the URL.
//!
//! Every rejection returns the same generic page. The audit log keeps the
//! real reason.

use axum::{
  extract::{Query, State},
  http::{HeaderMap, StatusCode, header},
  response::{Html, IntoResponse, Response},
};
use serde::Deserialize;
use verge_core::{
  audit::{Actor, AuditAction, LinkAction, Role},
  store::{RateDecision, RateLimiter as _, RevocationStore as _},
  version::VersionLabel,
};
use verge_token::{Claims, TokenCodec, TokenDomain};

use crate::AppState;
use verge_api::auth::{rate_identity, request_meta};

#[derive(Debug, Default, Deserialize)]
pub struct ActionParams {
  pub token:   Option<String>,
  pub action:  Option<String>,
  pub version: Option<String>,
  /// Provenance tag recorded in the audit entry (e.g. "scheduled-email").
  pub source:  Option<String>,
}

/// `GET /actions?token=..&action=..&version=..[&source=..]`
pub async fn actions(
  State(state): State<AppState>,
  headers: HeaderMap,
  Query(params): Query<ActionParams>,
) -> Response {
  let mut meta = request_meta(&headers);
  meta.source = Some(params.source.clone().unwrap_or_else(|| "action-link".to_owned()));
  meta.version = params.version.as_deref().and_then(|v| v.parse().ok());

  // One audit action per attempt even when the gate trips before the token
  // is trusted; unverified claims only shape attribution and naming.
  let forensic = params
    .token
    .as_deref()
    .and_then(TokenCodec::decode_unverified);
  let audit_action = audit_action_for(&params, forensic.as_ref());
  let forensic_actor = forensic
    .as_ref()
    .map(Claims::actor)
    .unwrap_or_else(Actor::unknown);

  // Rate gate first: unauthenticated traffic must not be able to probe the
  // token check for free.
  match state.api.orchestrator.store().consume(&rate_identity(&headers)).await {
    Ok(RateDecision::Allowed) => {}
    Ok(RateDecision::Blocked { retry_after_secs }) => {
      meta.error = Some("rate limited".to_owned());
      if let Err(e) = state
        .api
        .orchestrator
        .record_rejection(
          &forensic_actor,
          audit_action,
          "action link rejected: rate limited".to_owned(),
          meta,
        )
        .await
      {
        tracing::error!("failed to audit rate-limited action link: {e}");
      }
      return (
        StatusCode::TOO_MANY_REQUESTS,
        [(header::RETRY_AFTER, retry_after_secs.to_string())],
        Html(FAILURE_PAGE),
      )
        .into_response();
    }
    Err(e) => {
      tracing::error!("rate limiter unavailable at action gateway: {e}");
      return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
  }

  // All remaining gates collapse to the same outward response.
  let claims = match check_link(&state, &params).await {
    Ok(claims) => claims,
    Err(reason) => {
      meta.error = Some(reason.clone());
      if let Err(e) = state
        .api
        .orchestrator
        .record_rejection(
          &forensic_actor,
          audit_action,
          "action link rejected: not authorized".to_owned(),
          meta,
        )
        .await
      {
        tracing::error!("failed to audit rejected action link: {e}");
      }
      return (StatusCode::BAD_REQUEST, Html(FAILURE_PAGE)).into_response();
    }
  };

  // By construction link tokens carry both; absent means a token from a
  // different issuer generation, which we refuse above via check_link.
  let (action, label) = match (claims.action, claims.version) {
    (Some(action), Some(label)) => (action, label),
    _ => return (StatusCode::BAD_REQUEST, Html(FAILURE_PAGE)).into_response(),
  };

  let actor = claims.actor();
  let result = match action {
    LinkAction::Promote => {
      state.api.orchestrator.deploy(label, &actor, None, meta).await
    }
    LinkAction::Rollback => {
      state.api.orchestrator.rollback(label, &actor, None, meta).await
    }
  };

  match result {
    Ok(version) => Html(format!(
      "<!doctype html><html><body>\
       <h1>Action completed</h1>\
       <p>Version {} is now deployed.</p>\
       </body></html>",
      version.label,
    ))
    .into_response(),
    Err(e) => {
      // Execution failures were already audited by the orchestrator.
      tracing::warn!("action link execution failed: {e}");
      (StatusCode::CONFLICT, Html(FAILURE_PAGE)).into_response()
    }
  }
}

const FAILURE_PAGE: &str = "<!doctype html><html><body>\
   <h1>Action not completed</h1>\
   <p>This link is invalid, expired, or no longer applicable.</p>\
   </body></html>";

/// Verify the link token and cross-check the restated query parameters.
/// Returns the internal rejection reason for the audit trail.
async fn check_link(state: &AppState, params: &ActionParams) -> Result<Claims, String> {
  let token = params.token.as_deref().ok_or("no token presented")?;

  let claims = state
    .api
    .codec
    .verify(token, TokenDomain::Link, None)
    .map_err(|e| format!("token rejected: {e}"))?;

  if state.api.orchestrator.store().is_revoked(token).await {
    return Err("token is revoked".to_owned());
  }

  if claims.role != Role::Admin {
    return Err(format!("role {} is not admin", claims.role));
  }

  let stated_action: LinkAction = params
    .action
    .as_deref()
    .ok_or("no action parameter")?
    .parse()
    .map_err(|_| "unrecognized action parameter".to_owned())?;
  let stated_version: VersionLabel = params
    .version
    .as_deref()
    .ok_or("no version parameter")?
    .parse()
    .map_err(|_| "unparseable version parameter".to_owned())?;

  if claims.action != Some(stated_action) || claims.version != Some(stated_version) {
    return Err("parameters do not match signed link".to_owned());
  }

  Ok(claims)
}

/// Best-effort naming of the attempted action for the audit entry. The
/// verified token wins; failing that, the stated parameter; failing that,
/// promote.
fn audit_action_for(params: &ActionParams, forensic: Option<&Claims>) -> AuditAction {
  forensic
    .and_then(|c| c.action)
    .or_else(|| params.action.as_deref().and_then(|a| a.parse().ok()))
    .map(LinkAction::as_audit_action)
    .unwrap_or(AuditAction::Promote)
}
