//! Audit trail types — the append-only record of every privileged-action
//! attempt, successful or not.
//!
//! Entries are immutable once written. Writing an entry for a promote or
//! rollback additionally triggers a best-effort notification through the
//! configured [`crate::store::Notifier`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::version::VersionLabel;

// ─── Actors ──────────────────────────────────────────────────────────────────

/// Authorization role carried inside capability tokens. Lifecycle actions
/// require `Admin`.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
  Admin,
  Operator,
  Viewer,
}

/// Who attempted an action. All fields optional so unauthenticated attempts
/// can be recorded with the sentinel value, and partially-decoded tokens can
/// still contribute forensic attribution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
  pub user_id: Option<Uuid>,
  pub email:   Option<String>,
  pub role:    Option<Role>,
}

impl Actor {
  /// Sentinel for attempts where no token was ever verified.
  pub fn unknown() -> Self { Self::default() }

  /// The scheduler identity used by the auto-suggest job.
  pub fn system() -> Self {
    Self {
      user_id: None,
      email:   Some("auto-suggest@verge".to_string()),
      role:    Some(Role::Admin),
    }
  }

  pub fn is_unknown(&self) -> bool {
    self.user_id.is_none() && self.email.is_none()
  }

  /// Attribution string stored against deployed versions.
  pub fn attribution(&self) -> String {
    self
      .email
      .clone()
      .or_else(|| self.user_id.map(|id| id.to_string()))
      .unwrap_or_else(|| "unknown".to_string())
  }
}

// ─── Actions ─────────────────────────────────────────────────────────────────

/// The two privileged actions an out-of-band link may carry. A closed enum:
/// links are never dispatched from free-form strings.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LinkAction {
  Promote,
  Rollback,
}

impl LinkAction {
  pub fn as_audit_action(self) -> AuditAction {
    match self {
      Self::Promote => AuditAction::Promote,
      Self::Rollback => AuditAction::Rollback,
    }
  }
}

/// Everything the audit log can record.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AuditAction {
  Promote,
  Rollback,
  Train,
  RevokeToken,
}

impl AuditAction {
  /// Promote and rollback are the high-sensitivity actions whose audit
  /// entries trigger notifications regardless of status.
  pub fn notifies(self) -> bool {
    matches!(self, Self::Promote | Self::Rollback)
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AuditStatus {
  Success,
  Failed,
}

// ─── Metadata ────────────────────────────────────────────────────────────────

/// Structured correlation metadata stored alongside an entry. `error` holds
/// the full internal failure detail that outward layers hide behind generic
/// responses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditMeta {
  /// Network origin of the request, when it arrived over the wire.
  pub origin:  Option<String>,
  /// Client identity string (e.g. user agent).
  pub client:  Option<String>,
  pub version: Option<VersionLabel>,
  /// Source tag from an action link (e.g. "scheduled-email").
  pub source:  Option<String>,
  pub error:   Option<String>,
}

// ─── Entries ─────────────────────────────────────────────────────────────────

/// Input to [`crate::store::AuditStore::record`]. Timestamp and id are
/// store-assigned.
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
  pub actor:   Actor,
  pub action:  AuditAction,
  pub status:  AuditStatus,
  pub details: String,
  pub meta:    AuditMeta,
}

/// A persisted, immutable audit entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
  pub entry_id:    Uuid,
  pub actor:       Actor,
  pub action:      AuditAction,
  pub status:      AuditStatus,
  pub details:     String,
  pub meta:        AuditMeta,
  pub recorded_at: DateTime<Utc>,
}

// ─── Notifications ───────────────────────────────────────────────────────────

/// The payload dispatched to notification channels after a promote/rollback
/// audit entry is durably written. Delivery is best-effort and asynchronous;
/// it never affects the outcome of the triggering action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
  pub action:  AuditAction,
  pub actor:   Actor,
  pub status:  AuditStatus,
  pub details: String,
  pub at:      DateTime<Utc>,
}

impl Notification {
  pub fn for_entry(entry: &AuditEntry) -> Self {
    Self {
      action:  entry.action,
      actor:   entry.actor.clone(),
      status:  entry.status,
      details: entry.details.clone(),
      at:      entry.recorded_at,
    }
  }
}
