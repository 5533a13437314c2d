//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings (rate-limit expiries are the
//! exception: unix seconds). Structured fields (feedback ids, metrics, audit
//! metadata) are stored as compact JSON. UUIDs are stored as hyphenated
//! lowercase strings. Enums use their string forms.

use chrono::{DateTime, Utc};
use sha2::{Digest as _, Sha256};
use uuid::Uuid;
use verge_core::{
  audit::{Actor, AuditAction, AuditEntry, AuditMeta, AuditStatus, Role},
  outcome::{OutcomeLabel, OutcomeRecord},
  store::FeedbackRecord,
  version::{ModelVersion, TrainingMetrics, VersionLabel, VersionStatus},
};

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::Decode(format!("bad timestamp {s:?}: {e}")))
}

// ─── Enums ───────────────────────────────────────────────────────────────────

pub fn decode_status(s: &str) -> Result<VersionStatus> {
  s.parse()
    .map_err(|_| Error::Decode(format!("unknown version status: {s:?}")))
}

pub fn decode_role(s: &str) -> Result<Role> {
  s.parse().map_err(|_| Error::Decode(format!("unknown role: {s:?}")))
}

pub fn decode_action(s: &str) -> Result<AuditAction> {
  s.parse()
    .map_err(|_| Error::Decode(format!("unknown audit action: {s:?}")))
}

pub fn decode_audit_status(s: &str) -> Result<AuditStatus> {
  s.parse()
    .map_err(|_| Error::Decode(format!("unknown audit status: {s:?}")))
}

pub fn decode_outcome(s: &str) -> Result<OutcomeLabel> {
  s.parse()
    .map_err(|_| Error::Decode(format!("unknown outcome label: {s:?}")))
}

pub fn decode_label(s: &str) -> Result<VersionLabel> {
  Ok(s.parse::<VersionLabel>()?)
}

// ─── JSON columns ────────────────────────────────────────────────────────────

pub fn encode_feedback_ids(ids: &[Uuid]) -> Result<String> {
  let strings: Vec<String> = ids.iter().copied().map(encode_uuid).collect();
  Ok(serde_json::to_string(&strings)?)
}

pub fn decode_feedback_ids(s: &str) -> Result<Vec<Uuid>> {
  let strings: Vec<String> = serde_json::from_str(s)?;
  strings.iter().map(|s| decode_uuid(s)).collect()
}

pub fn encode_metrics(m: &TrainingMetrics) -> Result<String> {
  Ok(serde_json::to_string(m)?)
}

pub fn encode_meta(m: &AuditMeta) -> Result<String> {
  Ok(serde_json::to_string(m)?)
}

// ─── Token fingerprints ──────────────────────────────────────────────────────

/// SHA-256 hex digest of the full token string. The revocations table only
/// ever sees fingerprints.
pub fn token_fingerprint(token: &str) -> String {
  hex::encode(Sha256::digest(token.as_bytes()))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a `model_versions` row.
pub struct RawVersion {
  pub version_id:   String,
  pub label:        String,
  pub status:       String,
  pub feedback_ids: String,
  pub metrics:      String,
  pub deployed_by:  Option<String>,
  pub deployed_at:  Option<String>,
  pub created_at:   String,
  pub updated_at:   String,
}

impl RawVersion {
  pub fn into_version(self) -> Result<ModelVersion> {
    Ok(ModelVersion {
      version_id:   decode_uuid(&self.version_id)?,
      label:        decode_label(&self.label)?,
      status:       decode_status(&self.status)?,
      feedback_ids: decode_feedback_ids(&self.feedback_ids)?,
      metrics:      serde_json::from_str(&self.metrics)?,
      deployed_by:  self.deployed_by,
      deployed_at:  self.deployed_at.as_deref().map(decode_dt).transpose()?,
      created_at:   decode_dt(&self.created_at)?,
      updated_at:   decode_dt(&self.updated_at)?,
    })
  }
}

/// Raw strings read directly from an `audit_log` row.
pub struct RawAuditEntry {
  pub entry_id:    String,
  pub actor_id:    Option<String>,
  pub actor_email: Option<String>,
  pub actor_role:  Option<String>,
  pub action:      String,
  pub status:      String,
  pub details:     String,
  pub meta:        String,
  pub recorded_at: String,
}

impl RawAuditEntry {
  pub fn into_entry(self) -> Result<AuditEntry> {
    Ok(AuditEntry {
      entry_id:    decode_uuid(&self.entry_id)?,
      actor:       Actor {
        user_id: self.actor_id.as_deref().map(decode_uuid).transpose()?,
        email:   self.actor_email,
        role:    self.actor_role.as_deref().map(decode_role).transpose()?,
      },
      action:      decode_action(&self.action)?,
      status:      decode_audit_status(&self.status)?,
      details:     self.details,
      meta:        serde_json::from_str(&self.meta)?,
      recorded_at: decode_dt(&self.recorded_at)?,
    })
  }
}

/// Raw strings read directly from a `feedback` row.
pub struct RawFeedback {
  pub feedback_id:  String,
  pub payload:      String,
  pub submitted_at: String,
}

impl RawFeedback {
  pub fn into_record(self) -> Result<FeedbackRecord> {
    Ok(FeedbackRecord {
      feedback_id:  decode_uuid(&self.feedback_id)?,
      payload:      serde_json::from_str(&self.payload)?,
      submitted_at: decode_dt(&self.submitted_at)?,
    })
  }
}

/// Raw strings read directly from an `outcomes` row.
pub struct RawOutcome {
  pub record_id:   String,
  pub version:     String,
  pub outcome:     String,
  pub recorded_at: String,
}

impl RawOutcome {
  pub fn into_record(self) -> Result<OutcomeRecord> {
    Ok(OutcomeRecord {
      record_id:   decode_uuid(&self.record_id)?,
      version:     decode_label(&self.version)?,
      outcome:     decode_outcome(&self.outcome)?,
      recorded_at: decode_dt(&self.recorded_at)?,
    })
  }
}
