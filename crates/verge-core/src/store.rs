//! Store traits and supporting query types.
//!
//! The traits are implemented by storage backends (e.g. `verge-store-sqlite`)
//! and mocked in orchestrator tests. Higher layers (`verge-api`,
//! `verge-server`) depend on these abstractions, not on any concrete backend.
//!
//! All methods return `Send` futures so the traits can be used in
//! multi-threaded async runtimes (tokio with `axum`). Backends map their
//! internal failures into the [`crate::Error`] taxonomy; store-unavailability
//! becomes [`crate::Error::Persistence`].

use std::future::Future;

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::{
  Result,
  audit::{Actor, AuditEntry, NewAuditEntry, Notification},
  outcome::OutcomeRecord,
  version::{ModelVersion, NewTrainingVersion, VersionLabel},
};

// ─── Query types ─────────────────────────────────────────────────────────────

/// Parameters for [`AuditStore::query`]. Results are always newest first.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
  /// Restrict to entries whose actor email matches exactly.
  pub actor_email: Option<String>,
  pub limit:       Option<usize>,
}

/// Outcome of a rate-limit consumption attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
  Allowed,
  /// The identity is in its cooldown window. `retry_after_secs` counts from
  /// now; the block expiry is fixed at first violation and is not extended
  /// by further attempts.
  Blocked { retry_after_secs: i64 },
}

/// An approved-but-unprocessed feedback record from the external intake.
#[derive(Debug, Clone)]
pub struct FeedbackRecord {
  pub feedback_id:  Uuid,
  /// Opaque payload owned by the intake collaborator.
  pub payload:      Value,
  pub submitted_at: DateTime<Utc>,
}

// ─── Model versions ──────────────────────────────────────────────────────────

/// Abstraction over the model version store.
///
/// `deploy` and `rollback` must execute their archive-then-promote pair as a
/// single atomic unit: no intermediate state with zero or two deployed
/// versions is ever externally observable, and concurrent calls serialize
/// around the single-live-version invariant.
pub trait VersionStore: Send + Sync {
  /// Create a version in `Training` status. The new label is the baseline
  /// label (deployed version, else the greatest existing) with its patch
  /// component incremented; an empty store seeds at `1.0.0`.
  fn create_training(
    &self,
    input: NewTrainingVersion,
  ) -> impl Future<Output = Result<ModelVersion>> + Send;

  fn get_version(
    &self,
    label: VersionLabel,
  ) -> impl Future<Output = Result<Option<ModelVersion>>> + Send;

  /// The currently deployed version, derived from `status = deployed`.
  /// There is no separately-cached "current version".
  fn deployed_version(
    &self,
  ) -> impl Future<Output = Result<Option<ModelVersion>>> + Send;

  /// Mark a `Training` version `Ready` once its training job reports done.
  fn mark_ready(
    &self,
    label: VersionLabel,
  ) -> impl Future<Output = Result<ModelVersion>> + Send;

  /// Atomically archive whichever version is currently deployed (if any)
  /// and set `label` deployed with attribution. Fails with
  /// [`crate::Error::AlreadyDeployed`] if `label` is already live and
  /// [`crate::Error::NotFound`] if it does not exist.
  fn deploy(
    &self,
    label: VersionLabel,
    deployed_by: &str,
  ) -> impl Future<Output = Result<ModelVersion>> + Send;

  /// As [`VersionStore::deploy`], but the target must currently be
  /// `Archived`; otherwise fails with [`crate::Error::NotArchived`].
  fn rollback(
    &self,
    label: VersionLabel,
    deployed_by: &str,
  ) -> impl Future<Output = Result<ModelVersion>> + Send;

  /// All versions, newest first.
  fn list_versions(
    &self,
  ) -> impl Future<Output = Result<Vec<ModelVersion>>> + Send;
}

// ─── Audit log ───────────────────────────────────────────────────────────────

/// Append-only audit log. A write that fails means the calling operation is
/// failed-closed: the caller must not report success, even if the underlying
/// state mutation already committed.
pub trait AuditStore: Send + Sync {
  fn record(
    &self,
    entry: NewAuditEntry,
  ) -> impl Future<Output = Result<AuditEntry>> + Send;

  fn query(
    &self,
    query: &AuditQuery,
  ) -> impl Future<Output = Result<Vec<AuditEntry>>> + Send;
}

// ─── Revocation ──────────────────────────────────────────────────────────────

/// Explicitly invalidated tokens, consulted during verification.
pub trait RevocationStore: Send + Sync {
  fn revoke(
    &self,
    token: &str,
    reason: &str,
    revoked_by: &Actor,
  ) -> impl Future<Output = Result<()>> + Send;

  /// Whether a matching revocation record exists.
  ///
  /// Fails open: on store-unavailability implementations log the failure
  /// and return `false` rather than blocking all authenticated traffic.
  fn is_revoked(&self, token: &str) -> impl Future<Output = bool> + Send;
}

// ─── Rate limiting ───────────────────────────────────────────────────────────

/// Per-identity quota with a fixed cooldown. Identity is the network origin
/// of the request; authenticated and anonymous callers share the guard.
pub trait RateLimiter: Send + Sync {
  fn consume(
    &self,
    identity: &str,
  ) -> impl Future<Output = Result<RateDecision>> + Send;
}

// ─── External feeds ──────────────────────────────────────────────────────────

/// The approved-feedback feed consumed by `train()`. Ingestion and approval
/// are owned by an external collaborator.
pub trait FeedbackStore: Send + Sync {
  fn approved_unprocessed(
    &self,
  ) -> impl Future<Output = Result<Vec<FeedbackRecord>>> + Send;

  /// Mark records consumed. Called only after the training version record
  /// is durably created.
  fn mark_processed(
    &self,
    ids: &[Uuid],
  ) -> impl Future<Output = Result<()>> + Send;
}

/// The outcome feed consumed by the aggregator. Read-only here.
pub trait OutcomeStore: Send + Sync {
  fn all_outcomes(
    &self,
  ) -> impl Future<Output = Result<Vec<OutcomeRecord>>> + Send;
}

// ─── Notifications ───────────────────────────────────────────────────────────

/// Hand-off point for notification dispatch. `notify` must not block and
/// must not fail the caller: implementations enqueue and return.
pub trait Notifier: Send + Sync {
  fn notify(&self, notification: Notification);
}

/// Discards every notification. Used by tests and the CLI helper modes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
  fn notify(&self, _notification: Notification) {}
}
