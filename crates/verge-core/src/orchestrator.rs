//! The Lifecycle Orchestrator — the use-case layer composing the version
//! store, audit log, feeds, and notifier into atomic, audited operations.
//!
//! Ordering contract: the state mutation commits first, then the audit entry
//! is written, then the caller sees the result. A failed audit write turns
//! the whole operation into [`Error::Persistence`] even when the mutation
//! already committed — an action that cannot be logged is never reported as
//! complete. Notification dispatch happens after the audit write and never
//! affects the result.

use uuid::Uuid;

use crate::{
  Error, Result,
  audit::{
    Actor, AuditAction, AuditMeta, AuditStatus, NewAuditEntry, Notification,
  },
  outcome::{best_candidate, summarize},
  store::{
    AuditStore, FeedbackStore, Notifier, OutcomeStore, RevocationStore,
    VersionStore,
  },
  version::{
    ModelVersion, NewTrainingVersion, TrainingMetrics, VersionLabel,
  },
};

// ─── Results ─────────────────────────────────────────────────────────────────

/// Outcome of [`Orchestrator::train`]. Having nothing to train on is a
/// no-op, not an error.
#[derive(Debug, Clone)]
pub enum TrainOutcome {
  NoFeedback,
  Started(ModelVersion),
}

/// Outcome of [`Orchestrator::auto_suggest`].
#[derive(Debug, Clone)]
pub enum SuggestOutcome {
  /// No outcome records exist yet; nothing to decide.
  NoData,
  /// The best-scoring version is already live.
  KeepCurrent(VersionLabel),
  Deployed(ModelVersion),
}

// ─── Orchestrator ────────────────────────────────────────────────────────────

/// Wraps a combined store handle and a notifier. Cloning is as cheap as the
/// store handle's clone.
#[derive(Clone)]
pub struct Orchestrator<S, N> {
  store:    S,
  notifier: N,
}

impl<S, N> Orchestrator<S, N>
where
  S: VersionStore
    + AuditStore
    + FeedbackStore
    + OutcomeStore
    + RevocationStore,
  N: Notifier,
{
  pub fn new(store: S, notifier: N) -> Self { Self { store, notifier } }

  /// Direct access to the backing store, for read-only query surfaces.
  pub fn store(&self) -> &S { &self.store }

  // ── Deploy / rollback ─────────────────────────────────────────────────

  /// Promote `label` to deployed, archiving whichever version was live.
  pub async fn deploy(
    &self,
    label: VersionLabel,
    actor: &Actor,
    notes: Option<String>,
    mut meta: AuditMeta,
  ) -> Result<ModelVersion> {
    meta.version = Some(label);
    match self.store.deploy(label, &actor.attribution()).await {
      Ok(version) => {
        let details = match notes {
          Some(n) => format!("deployed version {label}: {n}"),
          None => format!("deployed version {label}"),
        };
        self
          .record(actor, AuditAction::Promote, AuditStatus::Success, details, meta)
          .await?;
        Ok(version)
      }
      Err(err) => {
        meta.error = Some(err.to_string());
        self
          .record(
            actor,
            AuditAction::Promote,
            AuditStatus::Failed,
            format!("deploy of version {label} rejected"),
            meta,
          )
          .await?;
        Err(err)
      }
    }
  }

  /// Revive an archived version, archiving whichever version was live.
  pub async fn rollback(
    &self,
    label: VersionLabel,
    actor: &Actor,
    notes: Option<String>,
    mut meta: AuditMeta,
  ) -> Result<ModelVersion> {
    meta.version = Some(label);
    match self.store.rollback(label, &actor.attribution()).await {
      Ok(version) => {
        let details = match notes {
          Some(n) => format!("rolled back to version {label}: {n}"),
          None => format!("rolled back to version {label}"),
        };
        self
          .record(actor, AuditAction::Rollback, AuditStatus::Success, details, meta)
          .await?;
        Ok(version)
      }
      Err(err) => {
        meta.error = Some(err.to_string());
        self
          .record(
            actor,
            AuditAction::Rollback,
            AuditStatus::Failed,
            format!("rollback to version {label} rejected"),
            meta,
          )
          .await?;
        Err(err)
      }
    }
  }

  // ── Train ─────────────────────────────────────────────────────────────

  /// Create a training-status version from the approved, unprocessed
  /// feedback backlog. Feedback is marked processed only after the version
  /// record is durably created.
  pub async fn train(
    &self,
    actor: &Actor,
    mut meta: AuditMeta,
  ) -> Result<TrainOutcome> {
    let pending = self.store.approved_unprocessed().await?;
    if pending.is_empty() {
      tracing::debug!("train: no approved unprocessed feedback, skipping");
      return Ok(TrainOutcome::NoFeedback);
    }

    let ids: Vec<Uuid> = pending.iter().map(|f| f.feedback_id).collect();
    let metrics = TrainingMetrics {
      feedback_count: ids.len() as u64,
      summary:        serde_json::Value::Null,
    };
    let input = NewTrainingVersion { feedback_ids: ids.clone(), metrics };

    match self.store.create_training(input).await {
      Ok(version) => {
        meta.version = Some(version.label);
        if let Err(err) = self.store.mark_processed(&ids).await {
          // The version record is durable but the feedback stayed
          // unconsumed; a retried train would mint a second version from
          // the same records. The trail carries the created label so an
          // operator can reconcile.
          meta.error = Some(err.to_string());
          self
            .record(
              actor,
              AuditAction::Train,
              AuditStatus::Failed,
              format!(
                "training version {} created but feedback was not marked \
                 processed",
                version.label
              ),
              meta,
            )
            .await?;
          return Err(err);
        }
        self
          .record(
            actor,
            AuditAction::Train,
            AuditStatus::Success,
            format!(
              "created training version {} from {} feedback records",
              version.label,
              ids.len()
            ),
            meta,
          )
          .await?;
        Ok(TrainOutcome::Started(version))
      }
      Err(err) => {
        meta.error = Some(err.to_string());
        self
          .record(
            actor,
            AuditAction::Train,
            AuditStatus::Failed,
            "training version creation failed".to_string(),
            meta,
          )
          .await?;
        Err(err)
      }
    }
  }

  // ── Auto-suggest ──────────────────────────────────────────────────────

  /// Summarise outcomes and deploy the best-scoring version if it differs
  /// from the one currently live. Runs on the weekly schedule; also
  /// triggerable by operators.
  pub async fn auto_suggest(&self, mut meta: AuditMeta) -> Result<SuggestOutcome> {
    let records = self.store.all_outcomes().await?;
    let summary = summarize(&records);
    let Some((best, score)) = best_candidate(&summary) else {
      tracing::debug!("auto-suggest: no outcome records, skipping");
      return Ok(SuggestOutcome::NoData);
    };

    let current = self.store.deployed_version().await?;
    if current.as_ref().is_some_and(|v| v.label == best) {
      tracing::debug!(label = %best, "auto-suggest: best version already deployed");
      return Ok(SuggestOutcome::KeepCurrent(best));
    }

    tracing::info!(label = %best, score, "auto-suggest: promoting best-scoring version");
    meta.source = Some("auto-suggest".to_string());
    let version = self
      .deploy(
        best,
        &Actor::system(),
        Some(format!("auto-suggest: net score {score:.2}")),
        meta,
      )
      .await?;
    Ok(SuggestOutcome::Deployed(version))
  }

  // ── Token revocation ──────────────────────────────────────────────────

  pub async fn revoke_token(
    &self,
    token: &str,
    reason: &str,
    actor: &Actor,
    mut meta: AuditMeta,
  ) -> Result<()> {
    match self.store.revoke(token, reason, actor).await {
      Ok(()) => {
        self
          .record(
            actor,
            AuditAction::RevokeToken,
            AuditStatus::Success,
            format!("token revoked: {reason}"),
            meta,
          )
          .await?;
        Ok(())
      }
      Err(err) => {
        meta.error = Some(err.to_string());
        self
          .record(
            actor,
            AuditAction::RevokeToken,
            AuditStatus::Failed,
            "token revocation failed".to_string(),
            meta,
          )
          .await?;
        Err(err)
      }
    }
  }

  /// Record a failed-status entry for an attempt rejected before execution
  /// (rate limited, bad token, insufficient role). Goes through the same
  /// plumbing as execution entries, so promote/rollback rejections notify
  /// too.
  pub async fn record_rejection(
    &self,
    actor: &Actor,
    action: AuditAction,
    details: String,
    meta: AuditMeta,
  ) -> Result<()> {
    self.record(actor, action, AuditStatus::Failed, details, meta).await
  }

  // ── Audit plumbing ────────────────────────────────────────────────────

  /// Persist one entry; dispatch a notification afterwards for the
  /// high-sensitivity actions. A failed write propagates as
  /// [`Error::Persistence`] through the `?` in every caller.
  async fn record(
    &self,
    actor: &Actor,
    action: AuditAction,
    status: AuditStatus,
    details: String,
    meta: AuditMeta,
  ) -> Result<()> {
    let entry = self
      .store
      .record(NewAuditEntry { actor: actor.clone(), action, status, details, meta })
      .await
      .map_err(|e| match e {
        Error::Persistence(_) => e,
        other => Error::Persistence(other.to_string()),
      })?;

    if action.notifies() {
      self.notifier.notify(Notification::for_entry(&entry));
    }
    Ok(())
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
