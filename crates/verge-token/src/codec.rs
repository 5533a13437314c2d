//! Token issue/verify implementation.
//!
//! Wire form: `base64url(claims_json) + "." + base64url(hmac_sha256)`, with
//! the MAC computed over the encoded claims segment using the key of the
//! token's domain.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;
use verge_core::{
  audit::{LinkAction, Role},
  version::VersionLabel,
};

use crate::{
  Error, Result,
  claims::{Claims, SessionBinding, TokenDomain},
};

type HmacSha256 = Hmac<Sha256>;

/// Issues and verifies capability tokens for both signing domains.
#[derive(Clone)]
pub struct TokenCodec {
  session_key: Vec<u8>,
  link_key:    Vec<u8>,
}

impl TokenCodec {
  pub fn new(session_secret: &str, link_secret: &str) -> Self {
    Self {
      session_key: session_secret.as_bytes().to_vec(),
      link_key:    link_secret.as_bytes().to_vec(),
    }
  }

  fn key_for(&self, domain: TokenDomain) -> &[u8] {
    match domain {
      TokenDomain::Session => &self.session_key,
      TokenDomain::Link => &self.link_key,
    }
  }

  // ── Issue ─────────────────────────────────────────────────────────────

  /// Issue a session-domain token bound to `binding`.
  pub fn issue_session(
    &self,
    user_id: Uuid,
    email: &str,
    role: Role,
    binding: SessionBinding,
    ttl: Duration,
  ) -> Result<String> {
    let now = Utc::now();
    self.issue(Claims {
      user_id,
      email: email.to_string(),
      role,
      domain: TokenDomain::Session,
      device_id: binding.device_id,
      session_id: binding.session_id,
      action: None,
      version: None,
      issued_at: now,
      expires_at: now + ttl,
    })
  }

  /// Issue a link-domain token carrying its intended action and target
  /// version.
  pub fn issue_link(
    &self,
    user_id: Uuid,
    email: &str,
    role: Role,
    action: LinkAction,
    version: VersionLabel,
    ttl: Duration,
  ) -> Result<String> {
    let now = Utc::now();
    self.issue(Claims {
      user_id,
      email: email.to_string(),
      role,
      domain: TokenDomain::Link,
      device_id: None,
      session_id: None,
      action: Some(action),
      version: Some(version),
      issued_at: now,
      expires_at: now + ttl,
    })
  }

  fn issue(&self, claims: Claims) -> Result<String> {
    let payload = B64.encode(serde_json::to_vec(&claims)?);
    let mut mac = HmacSha256::new_from_slice(self.key_for(claims.domain))
      .expect("hmac accepts any key length");
    mac.update(payload.as_bytes());
    let tag = B64.encode(mac.finalize().into_bytes());
    Ok(format!("{payload}.{tag}"))
  }

  // ── Verify ────────────────────────────────────────────────────────────

  /// Verify `token` against the expected `domain`, returning its claims.
  ///
  /// For session-domain verification the caller's presented `binding` is
  /// checked against the token's embedded binding. Revocation is the
  /// caller's concern; this codec is pure.
  pub fn verify(
    &self,
    token: &str,
    domain: TokenDomain,
    binding: Option<&SessionBinding>,
  ) -> Result<Claims> {
    let (payload, tag) = token.split_once('.').ok_or(Error::Malformed)?;
    let claims_bytes = B64.decode(payload).map_err(|_| Error::Malformed)?;
    let claims: Claims =
      serde_json::from_slice(&claims_bytes).map_err(|_| Error::Malformed)?;

    if claims.domain != domain {
      return Err(Error::DomainMismatch);
    }

    let tag_bytes = B64.decode(tag).map_err(|_| Error::Malformed)?;
    let mut mac = HmacSha256::new_from_slice(self.key_for(domain))
      .expect("hmac accepts any key length");
    mac.update(payload.as_bytes());
    mac.verify_slice(&tag_bytes).map_err(|_| Error::BadSignature)?;

    if claims.expires_at <= Utc::now() {
      return Err(Error::Expired);
    }

    if domain == TokenDomain::Session {
      check_binding(&claims, binding)?;
    }

    Ok(claims)
  }

  /// Decode claims without any verification, for forensic audit
  /// attribution of rejected tokens. Never use the result for
  /// authorization decisions.
  pub fn decode_unverified(token: &str) -> Option<Claims> {
    let (payload, _) = token.split_once('.')?;
    let bytes = B64.decode(payload).ok()?;
    serde_json::from_slice(&bytes).ok()
  }
}

/// An embedded binding constrains; an absent one does not.
fn check_binding(claims: &Claims, presented: Option<&SessionBinding>) -> Result<()> {
  let presented_device = presented.and_then(|b| b.device_id.as_deref());
  let presented_session = presented.and_then(|b| b.session_id.as_deref());

  if let Some(device) = claims.device_id.as_deref()
    && presented_device != Some(device)
  {
    return Err(Error::BindingMismatch);
  }
  if let Some(session) = claims.session_id.as_deref()
    && presented_session != Some(session)
  {
    return Err(Error::BindingMismatch);
  }
  Ok(())
}
