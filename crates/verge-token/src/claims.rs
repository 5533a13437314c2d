//! Claim payload types embedded in capability tokens.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use verge_core::{
  audit::{Actor, LinkAction, Role},
  version::VersionLabel,
};

/// The signing-key scope of a token. The two domains use disjoint signing
/// material, so compromise of one cannot forge tokens of the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenDomain {
  /// Interactive operator sessions, bound to a device/session context.
  Session,
  /// Single-purpose out-of-band action links.
  Link,
}

/// The device/session context a session token is bound to. Presented by the
/// caller on every request; must match the token's embedded binding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionBinding {
  pub device_id:  Option<String>,
  pub session_id: Option<String>,
}

/// The signed, self-contained bearer claim. Never persisted as an entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
  pub user_id:    Uuid,
  pub email:      String,
  pub role:       Role,
  pub domain:     TokenDomain,

  /// Session-domain context binding.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub device_id:  Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub session_id: Option<String>,

  /// Link-domain action context. Embedding these in the signed payload is
  /// what stops a link being repurposed by substituting query parameters.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub action:     Option<LinkAction>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub version:    Option<VersionLabel>,

  pub issued_at:  DateTime<Utc>,
  pub expires_at: DateTime<Utc>,
}

impl Claims {
  /// The audit-trail identity these claims assert. Only meaningful for
  /// attribution after the token verifies; unverified claims may be used
  /// for forensic attribution but never for authorization.
  pub fn actor(&self) -> Actor {
    Actor {
      user_id: Some(self.user_id),
      email:   Some(self.email.clone()),
      role:    Some(self.role),
    }
  }
}
