//! Integration tests for `SqliteStore` against an in-memory database.

use verge_core::{
  audit::{Actor, AuditAction, AuditMeta, AuditStatus, NewAuditEntry, Role},
  outcome::OutcomeLabel,
  store::{
    AuditQuery, AuditStore, FeedbackStore, OutcomeStore, RateDecision,
    RateLimiter, RevocationStore, VersionStore,
  },
  version::{
    ModelVersion, NewTrainingVersion, TrainingMetrics, VersionLabel,
    VersionStatus,
  },
};

use crate::{RateLimitConfig, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory(RateLimitConfig::default())
    .await
    .expect("in-memory store")
}

fn label(s: &str) -> VersionLabel { s.parse().unwrap() }

async fn training(s: &SqliteStore) -> ModelVersion {
  s.create_training(NewTrainingVersion {
    feedback_ids: vec![],
    metrics:      TrainingMetrics::default(),
  })
  .await
  .unwrap()
}

fn admin() -> Actor {
  Actor {
    user_id: Some(uuid::Uuid::new_v4()),
    email:   Some("admin@example.com".into()),
    role:    Some(Role::Admin),
  }
}

fn entry(actor: Actor, action: AuditAction, status: AuditStatus) -> NewAuditEntry {
  NewAuditEntry {
    actor,
    action,
    status,
    details: "test entry".into(),
    meta: AuditMeta::default(),
  }
}

// ─── Version creation ────────────────────────────────────────────────────────

#[tokio::test]
async fn empty_store_seeds_first_label() {
  let s = store().await;
  let v = training(&s).await;

  assert_eq!(v.label, label("1.0.0"));
  assert_eq!(v.status, VersionStatus::Training);
  assert!(v.deployed_by.is_none());
}

#[tokio::test]
async fn new_label_bumps_deployed_baseline() {
  let s = store().await;
  let first = training(&s).await; // 1.0.0
  s.deploy(first.label, "ops@example.com").await.unwrap();

  let next = training(&s).await;
  assert_eq!(next.label, label("1.0.1"));
}

#[tokio::test]
async fn new_label_falls_back_to_greatest_when_nothing_deployed() {
  let s = store().await;
  training(&s).await; // 1.0.0
  training(&s).await; // 1.0.1
  training(&s).await; // 1.0.2

  let next = training(&s).await;
  assert_eq!(next.label, label("1.0.3"));
}

#[tokio::test]
async fn training_provenance_roundtrips() {
  let s = store().await;
  let ids = vec![uuid::Uuid::new_v4(), uuid::Uuid::new_v4()];
  let created = s
    .create_training(NewTrainingVersion {
      feedback_ids: ids.clone(),
      metrics:      TrainingMetrics {
        feedback_count: 2,
        summary:        serde_json::json!({ "loss": 0.03 }),
      },
    })
    .await
    .unwrap();

  let fetched = s.get_version(created.label).await.unwrap().unwrap();
  assert_eq!(fetched.feedback_ids, ids);
  assert_eq!(fetched.metrics.feedback_count, 2);
  assert_eq!(fetched.metrics.summary["loss"], 0.03);
}

// ─── mark_ready ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn mark_ready_transitions_from_training() {
  let s = store().await;
  let v = training(&s).await;

  let ready = s.mark_ready(v.label).await.unwrap();
  assert_eq!(ready.status, VersionStatus::Ready);

  let err = s.mark_ready(v.label).await.unwrap_err();
  assert!(matches!(err, verge_core::Error::Validation(_)));
}

#[tokio::test]
async fn mark_ready_unknown_label_errors() {
  let s = store().await;
  let err = s.mark_ready(label("9.9.9")).await.unwrap_err();
  assert!(matches!(err, verge_core::Error::NotFound(_)));
}

// ─── Deploy ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn deploy_sets_attribution_and_is_queryable() {
  let s = store().await;
  let v = training(&s).await;

  let deployed = s.deploy(v.label, "ops@example.com").await.unwrap();
  assert_eq!(deployed.status, VersionStatus::Deployed);
  assert_eq!(deployed.deployed_by.as_deref(), Some("ops@example.com"));
  assert!(deployed.deployed_at.is_some());

  let current = s.deployed_version().await.unwrap().unwrap();
  assert_eq!(current.label, v.label);
}

#[tokio::test]
async fn deploy_archives_the_displaced_version() {
  let s = store().await;
  let first = training(&s).await;
  s.deploy(first.label, "ops@example.com").await.unwrap();
  let second = training(&s).await;

  s.deploy(second.label, "ops@example.com").await.unwrap();

  // The single-live-version invariant holds after the swap.
  let versions = s.list_versions().await.unwrap();
  let deployed: Vec<_> = versions
    .iter()
    .filter(|v| v.status == VersionStatus::Deployed)
    .collect();
  assert_eq!(deployed.len(), 1);
  assert_eq!(deployed[0].label, second.label);

  let displaced = s.get_version(first.label).await.unwrap().unwrap();
  assert_eq!(displaced.status, VersionStatus::Archived);
}

#[tokio::test]
async fn deploy_already_deployed_errors() {
  let s = store().await;
  let v = training(&s).await;
  s.deploy(v.label, "ops@example.com").await.unwrap();

  let err = s.deploy(v.label, "ops@example.com").await.unwrap_err();
  assert!(matches!(err, verge_core::Error::AlreadyDeployed(_)));
}

#[tokio::test]
async fn deploy_unknown_label_errors() {
  let s = store().await;
  let err = s.deploy(label("2.0.0"), "ops@example.com").await.unwrap_err();
  assert!(matches!(err, verge_core::Error::NotFound(_)));
}

// ─── Rollback ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn rollback_swaps_deployed_and_archived() {
  let s = store().await;
  let old = training(&s).await; // 1.0.0
  s.deploy(old.label, "ops@example.com").await.unwrap();
  let new = training(&s).await; // 1.0.1
  s.deploy(new.label, "ops@example.com").await.unwrap();

  // old is now archived; roll back to it.
  let restored = s.rollback(old.label, "oncall@example.com").await.unwrap();
  assert_eq!(restored.status, VersionStatus::Deployed);
  assert_eq!(restored.deployed_by.as_deref(), Some("oncall@example.com"));

  let displaced = s.get_version(new.label).await.unwrap().unwrap();
  assert_eq!(displaced.status, VersionStatus::Archived);

  let current = s.deployed_version().await.unwrap().unwrap();
  assert_eq!(current.label, old.label);
}

#[tokio::test]
async fn rollback_to_non_archived_version_errors() {
  let s = store().await;
  let v = training(&s).await;

  let err = s.rollback(v.label, "ops@example.com").await.unwrap_err();
  assert!(matches!(err, verge_core::Error::NotArchived(_)));
}

#[tokio::test]
async fn rollback_to_live_version_errors() {
  let s = store().await;
  let v = training(&s).await;
  s.deploy(v.label, "ops@example.com").await.unwrap();

  let err = s.rollback(v.label, "ops@example.com").await.unwrap_err();
  assert!(matches!(err, verge_core::Error::AlreadyDeployed(_)));
}

#[tokio::test]
async fn rollback_unknown_label_errors() {
  let s = store().await;
  let err = s
    .rollback(label("3.0.0"), "ops@example.com")
    .await
    .unwrap_err();
  assert!(matches!(err, verge_core::Error::NotFound(_)));
}

#[tokio::test]
async fn list_versions_newest_first() {
  let s = store().await;
  let a = training(&s).await;
  let b = training(&s).await;
  let c = training(&s).await;

  let listed: Vec<_> = s
    .list_versions()
    .await
    .unwrap()
    .into_iter()
    .map(|v| v.label)
    .collect();
  assert_eq!(listed, vec![c.label, b.label, a.label]);
}

// ─── Audit log ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn audit_entries_come_back_newest_first() {
  let s = store().await;
  let first = s
    .record(entry(admin(), AuditAction::Promote, AuditStatus::Success))
    .await
    .unwrap();
  let second = s
    .record(entry(admin(), AuditAction::Rollback, AuditStatus::Failed))
    .await
    .unwrap();

  let entries = s.query(&AuditQuery::default()).await.unwrap();
  assert_eq!(entries.len(), 2);
  assert_eq!(entries[0].entry_id, second.entry_id);
  assert_eq!(entries[1].entry_id, first.entry_id);
}

#[tokio::test]
async fn audit_query_filters_by_actor_email() {
  let s = store().await;
  s.record(entry(admin(), AuditAction::Promote, AuditStatus::Success))
    .await
    .unwrap();
  s.record(entry(Actor::unknown(), AuditAction::Promote, AuditStatus::Failed))
    .await
    .unwrap();

  let entries = s
    .query(&AuditQuery {
      actor_email: Some("admin@example.com".into()),
      limit:       None,
    })
    .await
    .unwrap();
  assert_eq!(entries.len(), 1);
  assert_eq!(entries[0].actor.email.as_deref(), Some("admin@example.com"));
}

#[tokio::test]
async fn audit_query_respects_limit() {
  let s = store().await;
  for _ in 0..5 {
    s.record(entry(admin(), AuditAction::Train, AuditStatus::Success))
      .await
      .unwrap();
  }

  let entries = s
    .query(&AuditQuery { actor_email: None, limit: Some(3) })
    .await
    .unwrap();
  assert_eq!(entries.len(), 3);
}

#[tokio::test]
async fn audit_meta_roundtrips() {
  let s = store().await;
  let mut input = entry(Actor::unknown(), AuditAction::Promote, AuditStatus::Failed);
  input.meta = AuditMeta {
    origin:  Some("203.0.113.7".into()),
    client:  Some("curl/8".into()),
    version: Some(label("1.2.0")),
    source:  Some("scheduled-email".into()),
    error:   Some("token expired".into()),
  };

  s.record(input).await.unwrap();

  let fetched = &s.query(&AuditQuery::default()).await.unwrap()[0];
  assert_eq!(fetched.meta.origin.as_deref(), Some("203.0.113.7"));
  assert_eq!(fetched.meta.version, Some(label("1.2.0")));
  assert_eq!(fetched.meta.error.as_deref(), Some("token expired"));
  assert!(fetched.actor.is_unknown());
}

// ─── Revocations ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn revoked_token_is_reported_revoked() {
  let s = store().await;
  s.revoke("some.token", "leaked in a screenshot", &admin())
    .await
    .unwrap();

  assert!(s.is_revoked("some.token").await);
  assert!(!s.is_revoked("some.other.token").await);
}

#[tokio::test]
async fn revoking_twice_is_idempotent() {
  let s = store().await;
  s.revoke("some.token", "first", &admin()).await.unwrap();
  s.revoke("some.token", "second", &admin()).await.unwrap();

  assert!(s.is_revoked("some.token").await);
}

#[tokio::test]
async fn revocation_check_fails_open_when_store_breaks() {
  let s = store().await;
  s.revoke("some.token", "reason", &admin()).await.unwrap();
  s.break_revocations().await.unwrap();

  // Unreachable table: treated as not revoked rather than blocking traffic.
  assert!(!s.is_revoked("some.token").await);
}

// ─── Rate limiting ───────────────────────────────────────────────────────────

#[tokio::test]
async fn sixth_attempt_in_window_is_blocked() {
  let s = SqliteStore::open_in_memory(RateLimitConfig {
    quota:       5,
    window_secs: 3600,
    block_secs:  3600,
  })
  .await
  .unwrap();

  for _ in 0..5 {
    assert_eq!(s.consume("203.0.113.7").await.unwrap(), RateDecision::Allowed);
  }
  assert!(matches!(
    s.consume("203.0.113.7").await.unwrap(),
    RateDecision::Blocked { .. }
  ));
}

#[tokio::test]
async fn block_is_fixed_and_not_extended_by_further_attempts() {
  let s = SqliteStore::open_in_memory(RateLimitConfig {
    quota:       5,
    window_secs: 3600,
    block_secs:  600,
  })
  .await
  .unwrap();

  for _ in 0..6 {
    s.consume("203.0.113.7").await.unwrap();
  }

  // Attempts 7-10 arrive during the block; each stays blocked and none
  // pushes the expiry past the original 600 seconds.
  for _ in 0..4 {
    match s.consume("203.0.113.7").await.unwrap() {
      RateDecision::Blocked { retry_after_secs } => {
        assert!(retry_after_secs > 0 && retry_after_secs <= 600);
      }
      RateDecision::Allowed => panic!("attempt during block was allowed"),
    }
  }
}

#[tokio::test]
async fn served_out_block_starts_a_fresh_window() {
  // Zero-length cooldown: the block expires the moment it is issued.
  let s = SqliteStore::open_in_memory(RateLimitConfig {
    quota:       1,
    window_secs: 3600,
    block_secs:  0,
  })
  .await
  .unwrap();

  assert_eq!(s.consume("203.0.113.7").await.unwrap(), RateDecision::Allowed);
  assert!(matches!(
    s.consume("203.0.113.7").await.unwrap(),
    RateDecision::Blocked { .. }
  ));

  // The identity served its cooldown; the still-open window must not
  // re-block it with a second full cooldown.
  assert_eq!(s.consume("203.0.113.7").await.unwrap(), RateDecision::Allowed);
}

#[tokio::test]
async fn identities_are_limited_independently() {
  let s = SqliteStore::open_in_memory(RateLimitConfig {
    quota:       1,
    window_secs: 3600,
    block_secs:  3600,
  })
  .await
  .unwrap();

  assert_eq!(s.consume("a").await.unwrap(), RateDecision::Allowed);
  assert!(matches!(
    s.consume("a").await.unwrap(),
    RateDecision::Blocked { .. }
  ));
  assert_eq!(s.consume("b").await.unwrap(), RateDecision::Allowed);
}

// ─── External feeds ──────────────────────────────────────────────────────────

#[tokio::test]
async fn only_approved_unprocessed_feedback_is_served() {
  let s = store().await;
  let approved = s
    .add_feedback(serde_json::json!({ "case": 1 }), true)
    .await
    .unwrap();
  s.add_feedback(serde_json::json!({ "case": 2 }), false)
    .await
    .unwrap();

  let pending = s.approved_unprocessed().await.unwrap();
  assert_eq!(pending.len(), 1);
  assert_eq!(pending[0].feedback_id, approved.feedback_id);
  assert_eq!(pending[0].payload["case"], 1);
}

#[tokio::test]
async fn processed_feedback_is_not_served_again() {
  let s = store().await;
  let a = s.add_feedback(serde_json::json!({}), true).await.unwrap();
  let b = s.add_feedback(serde_json::json!({}), true).await.unwrap();

  s.mark_processed(&[a.feedback_id]).await.unwrap();

  let pending = s.approved_unprocessed().await.unwrap();
  assert_eq!(pending.len(), 1);
  assert_eq!(pending[0].feedback_id, b.feedback_id);
}

#[tokio::test]
async fn outcomes_roundtrip() {
  let s = store().await;
  s.add_outcome(label("1.0.0"), OutcomeLabel::Improved)
    .await
    .unwrap();
  s.add_outcome(label("1.0.0"), OutcomeLabel::Worsened)
    .await
    .unwrap();
  s.add_outcome(label("1.1.0"), OutcomeLabel::Stable)
    .await
    .unwrap();

  let all = s.all_outcomes().await.unwrap();
  assert_eq!(all.len(), 3);
  assert_eq!(all[0].version, label("1.0.0"));
  assert_eq!(all[0].outcome, OutcomeLabel::Improved);
  assert_eq!(all[2].version, label("1.1.0"));
}
