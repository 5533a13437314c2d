//! Model versions — the artifacts whose lifecycle this service tracks.
//!
//! A version is never deleted. It is created in `Training`, may be marked
//! `Ready` when its training job completes, becomes `Deployed` only through
//! the orchestrator, and is displaced into `Archived` when another version
//! takes its place. `Archived` is terminal-but-revivable: it is the only
//! status eligible as a rollback target.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

// ─── VersionLabel ────────────────────────────────────────────────────────────

/// An ordered `major.minor.patch` label. Stored and serialised as its string
/// form; ordered numerically component by component.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
  Deserialize,
)]
#[serde(into = "String", try_from = "String")]
pub struct VersionLabel {
  pub major: u32,
  pub minor: u32,
  pub patch: u32,
}

impl VersionLabel {
  pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
    Self { major, minor, patch }
  }

  /// The label a new training version receives when this one is the
  /// baseline.
  pub fn bump_patch(self) -> Self {
    Self { patch: self.patch + 1, ..self }
  }
}

impl fmt::Display for VersionLabel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
  }
}

impl FromStr for VersionLabel {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    let mut parts = s.split('.');
    let mut next = |name: &str| -> Result<u32> {
      parts
        .next()
        .ok_or_else(|| Error::Validation(format!("label {s:?} is missing its {name} component")))?
        .parse()
        .map_err(|_| Error::Validation(format!("label {s:?} has a non-numeric {name} component")))
    };
    let label = Self {
      major: next("major")?,
      minor: next("minor")?,
      patch: next("patch")?,
    };
    if parts.next().is_some() {
      return Err(Error::Validation(format!("label {s:?} has too many components")));
    }
    Ok(label)
  }
}

impl From<VersionLabel> for String {
  fn from(l: VersionLabel) -> Self { l.to_string() }
}

impl TryFrom<String> for VersionLabel {
  type Error = Error;

  fn try_from(s: String) -> Result<Self> { s.parse() }
}

// ─── Status ──────────────────────────────────────────────────────────────────

/// Lifecycle status. The single-live-version invariant holds over `Deployed`:
/// at most one version carries it at any instant.
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
pub enum VersionStatus {
  Training,
  Ready,
  Deployed,
  Archived,
}

// ─── Training provenance ─────────────────────────────────────────────────────

/// Snapshot of the metrics reported by the (external, opaque) training job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingMetrics {
  /// Number of feedback records consumed by the training run.
  pub feedback_count: u64,
  /// Opaque metric payload from the training job, passed through verbatim.
  #[serde(default)]
  pub summary:        serde_json::Value,
}

// ─── ModelVersion ────────────────────────────────────────────────────────────

/// A versioned artifact with its status, training provenance, and deployment
/// attribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelVersion {
  pub version_id:   Uuid,
  pub label:        VersionLabel,
  pub status:       VersionStatus,
  /// Identifiers of the feedback records this version was trained on.
  pub feedback_ids: Vec<Uuid>,
  pub metrics:      TrainingMetrics,
  /// Who most recently deployed this version, if anyone ever has.
  pub deployed_by:  Option<String>,
  pub deployed_at:  Option<DateTime<Utc>>,
  pub created_at:   DateTime<Utc>,
  pub updated_at:   DateTime<Utc>,
}

// ─── NewTrainingVersion ──────────────────────────────────────────────────────

/// Input to [`crate::store::VersionStore::create_training`]. The label is
/// computed by the store (baseline patch bump); timestamps are store-assigned.
#[derive(Debug, Clone)]
pub struct NewTrainingVersion {
  pub feedback_ids: Vec<Uuid>,
  pub metrics:      TrainingMetrics,
}
