//! [`SqliteStore`] — the SQLite implementation of every `verge-core` store
//! trait.

use std::path::Path;

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use verge_core::{
  audit::{Actor, AuditEntry, NewAuditEntry},
  outcome::{OutcomeLabel, OutcomeRecord},
  store::{
    AuditQuery, AuditStore, FeedbackRecord, FeedbackStore, OutcomeStore,
    RateDecision, RateLimiter, RevocationStore, VersionStore,
  },
  version::{ModelVersion, NewTrainingVersion, VersionLabel, VersionStatus},
};

use crate::{
  Error, Result,
  encode::{
    RawAuditEntry, RawFeedback, RawOutcome, RawVersion, encode_dt,
    encode_feedback_ids, encode_meta, encode_metrics, encode_uuid,
    token_fingerprint,
  },
  schema::SCHEMA,
};

// ─── Configuration ───────────────────────────────────────────────────────────

/// Rate-limiter tuning. The block expiry is fixed at first violation; attempts
/// during the block do not extend it.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
  /// Attempts allowed per identity per window.
  pub quota:       u32,
  pub window_secs: i64,
  /// Cooldown issued at the first violation. Expected to be at least
  /// `window_secs`; `ServerConfig::validate` enforces that for deployed
  /// configurations.
  pub block_secs:  i64,
}

impl Default for RateLimitConfig {
  fn default() -> Self {
    Self { quota: 5, window_secs: 3600, block_secs: 3600 }
  }
}

// ─── Store ───────────────────────────────────────────────────────────────────

const VERSION_COLS: &str = "version_id, label, status, feedback_ids, metrics, \
                            deployed_by, deployed_at, created_at, updated_at";

/// A Verge store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn:   tokio_rusqlite::Connection,
  limits: RateLimitConfig,
}

/// Probe of a `model_versions` row inside a status-transition transaction.
enum VersionProbe {
  NotFound,
  WrongStatus(String),
  Done(RawVersion),
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(
    path: impl AsRef<Path>,
    limits: RateLimitConfig,
  ) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn, limits };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory(limits: RateLimitConfig) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn, limits };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Fetch the single row matching `condition` with one bound parameter.
  async fn version_where(
    &self,
    condition: &'static str,
    param: String,
  ) -> Result<Option<ModelVersion>> {
    let raw: Option<RawVersion> = self
      .conn
      .call(move |conn| {
        let sql =
          format!("SELECT {VERSION_COLS} FROM model_versions WHERE {condition}");
        Ok(conn
          .query_row(&sql, rusqlite::params![param], raw_version)
          .optional()?)
      })
      .await?;

    raw.map(RawVersion::into_version).transpose()
  }

  /// Atomic archive-then-promote. `deploy` and `rollback` differ only in the
  /// status the target must currently hold.
  async fn swap_deployed(
    &self,
    label: VersionLabel,
    deployed_by: &str,
    required_status: Option<VersionStatus>,
  ) -> Result<VersionProbe> {
    let label_str = label.to_string();
    let by = deployed_by.to_owned();
    let required = required_status.map(|s| s.to_string());
    let now_str = encode_dt(Utc::now());

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let status: Option<String> = tx
          .query_row(
            "SELECT status FROM model_versions WHERE label = ?1",
            rusqlite::params![label_str],
            |r| r.get(0),
          )
          .optional()?;

        let status = match status {
          Some(s) => s,
          None => return Ok(VersionProbe::NotFound),
        };
        if status == "deployed" {
          return Ok(VersionProbe::WrongStatus(status));
        }
        if let Some(required) = required
          && status != required
        {
          return Ok(VersionProbe::WrongStatus(status));
        }

        tx.execute(
          "UPDATE model_versions SET status = 'archived', updated_at = ?1
           WHERE status = 'deployed'",
          rusqlite::params![now_str],
        )?;
        tx.execute(
          "UPDATE model_versions
           SET status = 'deployed', deployed_by = ?2, deployed_at = ?3,
               updated_at = ?3
           WHERE label = ?1",
          rusqlite::params![label_str, by, now_str],
        )?;

        let raw = tx.query_row(
          &format!("SELECT {VERSION_COLS} FROM model_versions WHERE label = ?1"),
          rusqlite::params![label_str],
          raw_version,
        )?;
        tx.commit()?;
        Ok(VersionProbe::Done(raw))
      })
      .await?;

    Ok(outcome)
  }

  // ── Intake-side write paths ───────────────────────────────────────────────
  //
  // Feedback ingestion/approval and outcome labelling are owned by external
  // collaborators that write to the same database. These helpers are that
  // write path; the lifecycle service itself only reads these tables.

  pub async fn add_feedback(
    &self,
    payload: serde_json::Value,
    approved: bool,
  ) -> Result<FeedbackRecord> {
    let record = FeedbackRecord {
      feedback_id:  Uuid::new_v4(),
      payload,
      submitted_at: Utc::now(),
    };

    let id_str = encode_uuid(record.feedback_id);
    let payload_str = record.payload.to_string();
    let at_str = encode_dt(record.submitted_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO feedback (feedback_id, payload, approved, processed, submitted_at)
           VALUES (?1, ?2, ?3, 0, ?4)",
          rusqlite::params![id_str, payload_str, approved, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(record)
  }

  pub async fn add_outcome(
    &self,
    version: VersionLabel,
    outcome: OutcomeLabel,
  ) -> Result<OutcomeRecord> {
    let record = OutcomeRecord {
      record_id: Uuid::new_v4(),
      version,
      outcome,
      recorded_at: Utc::now(),
    };

    let id_str = encode_uuid(record.record_id);
    let version_str = version.to_string();
    let outcome_str = outcome.to_string();
    let at_str = encode_dt(record.recorded_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO outcomes (record_id, version, outcome, recorded_at)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![id_str, version_str, outcome_str, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(record)
  }

  /// Make the revocation table unreachable, to exercise the fail-open path.
  #[cfg(test)]
  pub(crate) async fn break_revocations(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch("DROP TABLE revocations;")?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

fn raw_version(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawVersion> {
  Ok(RawVersion {
    version_id:   row.get(0)?,
    label:        row.get(1)?,
    status:       row.get(2)?,
    feedback_ids: row.get(3)?,
    metrics:      row.get(4)?,
    deployed_by:  row.get(5)?,
    deployed_at:  row.get(6)?,
    created_at:   row.get(7)?,
    updated_at:   row.get(8)?,
  })
}

// ─── VersionStore impl ───────────────────────────────────────────────────────

impl VersionStore for SqliteStore {
  async fn create_training(
    &self,
    input: NewTrainingVersion,
  ) -> verge_core::Result<ModelVersion> {
    let version_id = Uuid::new_v4();
    let now = Utc::now();

    let id_str = encode_uuid(version_id);
    let feedback_str = encode_feedback_ids(&input.feedback_ids)?;
    let metrics_str = encode_metrics(&input.metrics)?;
    let now_str = encode_dt(now);

    // The baseline is read and the row inserted inside one transaction so
    // concurrent trainings cannot compute the same label.
    let label_str: String = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let deployed: Option<String> = tx
          .query_row(
            "SELECT label FROM model_versions WHERE status = 'deployed'",
            [],
            |r| r.get(0),
          )
          .optional()?;

        let baseline = match deployed {
          Some(s) => s.parse::<VersionLabel>().ok(),
          None => {
            let mut stmt = tx.prepare("SELECT label FROM model_versions")?;
            let labels = stmt
              .query_map([], |r| r.get::<_, String>(0))?
              .collect::<rusqlite::Result<Vec<_>>>()?;
            drop(stmt);
            labels.iter().filter_map(|s| s.parse().ok()).max()
          }
        };
        let label = baseline
          .map(VersionLabel::bump_patch)
          .unwrap_or(VersionLabel::new(1, 0, 0));
        let label_str = label.to_string();

        tx.execute(
          "INSERT INTO model_versions (
             version_id, label, status, feedback_ids, metrics,
             deployed_by, deployed_at, created_at, updated_at
           ) VALUES (?1, ?2, 'training', ?3, ?4, NULL, NULL, ?5, ?5)",
          rusqlite::params![id_str, label_str, feedback_str, metrics_str, now_str],
        )?;
        tx.commit()?;
        Ok(label_str)
      })
      .await
      .map_err(Error::from)?;

    Ok(ModelVersion {
      version_id,
      label: label_str.parse()?,
      status: VersionStatus::Training,
      feedback_ids: input.feedback_ids,
      metrics: input.metrics,
      deployed_by: None,
      deployed_at: None,
      created_at: now,
      updated_at: now,
    })
  }

  async fn get_version(
    &self,
    label: VersionLabel,
  ) -> verge_core::Result<Option<ModelVersion>> {
    Ok(self.version_where("label = ?1", label.to_string()).await?)
  }

  async fn deployed_version(&self) -> verge_core::Result<Option<ModelVersion>> {
    Ok(self.version_where("status = ?1", "deployed".to_string()).await?)
  }

  async fn mark_ready(
    &self,
    label: VersionLabel,
  ) -> verge_core::Result<ModelVersion> {
    let label_str = label.to_string();
    let now_str = encode_dt(Utc::now());

    let outcome: VersionProbe = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let status: Option<String> = tx
          .query_row(
            "SELECT status FROM model_versions WHERE label = ?1",
            rusqlite::params![label_str],
            |r| r.get(0),
          )
          .optional()?;

        match status.as_deref() {
          None => return Ok(VersionProbe::NotFound),
          Some("training") => {}
          Some(other) => return Ok(VersionProbe::WrongStatus(other.to_owned())),
        }

        tx.execute(
          "UPDATE model_versions SET status = 'ready', updated_at = ?2
           WHERE label = ?1",
          rusqlite::params![label_str, now_str],
        )?;
        let raw = tx.query_row(
          &format!("SELECT {VERSION_COLS} FROM model_versions WHERE label = ?1"),
          rusqlite::params![label_str],
          raw_version,
        )?;
        tx.commit()?;
        Ok(VersionProbe::Done(raw))
      })
      .await
      .map_err(Error::from)?;

    match outcome {
      VersionProbe::NotFound => Err(verge_core::Error::NotFound(label)),
      VersionProbe::WrongStatus(status) => Err(verge_core::Error::Validation(
        format!("version {label} is {status}, not training"),
      )),
      VersionProbe::Done(raw) => Ok(raw.into_version()?),
    }
  }

  async fn deploy(
    &self,
    label: VersionLabel,
    deployed_by: &str,
  ) -> verge_core::Result<ModelVersion> {
    match self.swap_deployed(label, deployed_by, None).await? {
      VersionProbe::NotFound => Err(verge_core::Error::NotFound(label)),
      VersionProbe::WrongStatus(_) => {
        Err(verge_core::Error::AlreadyDeployed(label))
      }
      VersionProbe::Done(raw) => Ok(raw.into_version()?),
    }
  }

  async fn rollback(
    &self,
    label: VersionLabel,
    deployed_by: &str,
  ) -> verge_core::Result<ModelVersion> {
    match self
      .swap_deployed(label, deployed_by, Some(VersionStatus::Archived))
      .await?
    {
      VersionProbe::NotFound => Err(verge_core::Error::NotFound(label)),
      VersionProbe::WrongStatus(status) if status == "deployed" => {
        Err(verge_core::Error::AlreadyDeployed(label))
      }
      VersionProbe::WrongStatus(_) => Err(verge_core::Error::NotArchived(label)),
      VersionProbe::Done(raw) => Ok(raw.into_version()?),
    }
  }

  async fn list_versions(&self) -> verge_core::Result<Vec<ModelVersion>> {
    let raws: Vec<RawVersion> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {VERSION_COLS} FROM model_versions
           ORDER BY created_at DESC, rowid DESC"
        ))?;
        let rows = stmt
          .query_map([], raw_version)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await
      .map_err(Error::from)?;

    Ok(
      raws
        .into_iter()
        .map(RawVersion::into_version)
        .collect::<Result<_>>()?,
    )
  }
}

// ─── AuditStore impl ─────────────────────────────────────────────────────────

impl AuditStore for SqliteStore {
  async fn record(&self, entry: NewAuditEntry) -> verge_core::Result<AuditEntry> {
    let persisted = AuditEntry {
      entry_id:    Uuid::new_v4(),
      actor:       entry.actor,
      action:      entry.action,
      status:      entry.status,
      details:     entry.details,
      meta:        entry.meta,
      recorded_at: Utc::now(),
    };

    let id_str = encode_uuid(persisted.entry_id);
    let actor_id = persisted.actor.user_id.map(encode_uuid);
    let actor_email = persisted.actor.email.clone();
    let actor_role = persisted.actor.role.map(|r| r.to_string());
    let action_str = persisted.action.to_string();
    let status_str = persisted.status.to_string();
    let details = persisted.details.clone();
    let meta_str = encode_meta(&persisted.meta)?;
    let at_str = encode_dt(persisted.recorded_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO audit_log (
             entry_id, actor_id, actor_email, actor_role,
             action, status, details, meta, recorded_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
          rusqlite::params![
            id_str,
            actor_id,
            actor_email,
            actor_role,
            action_str,
            status_str,
            details,
            meta_str,
            at_str,
          ],
        )?;
        Ok(())
      })
      .await
      .map_err(Error::from)?;

    Ok(persisted)
  }

  async fn query(&self, query: &AuditQuery) -> verge_core::Result<Vec<AuditEntry>> {
    let email = query.actor_email.clone();
    // SQLite treats a negative LIMIT as unlimited.
    let limit = query.limit.map(|n| n as i64).unwrap_or(-1);

    let raws: Vec<RawAuditEntry> = self
      .conn
      .call(move |conn| {
        let where_clause = if email.is_some() {
          "WHERE actor_email = ?1"
        } else {
          "WHERE ?1 IS NULL"
        };
        let sql = format!(
          "SELECT entry_id, actor_id, actor_email, actor_role,
                  action, status, details, meta, recorded_at
           FROM audit_log
           {where_clause}
           ORDER BY recorded_at DESC, rowid DESC
           LIMIT ?2"
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![email, limit], |row| {
            Ok(RawAuditEntry {
              entry_id:    row.get(0)?,
              actor_id:    row.get(1)?,
              actor_email: row.get(2)?,
              actor_role:  row.get(3)?,
              action:      row.get(4)?,
              status:      row.get(5)?,
              details:     row.get(6)?,
              meta:        row.get(7)?,
              recorded_at: row.get(8)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await
      .map_err(Error::from)?;

    Ok(
      raws
        .into_iter()
        .map(RawAuditEntry::into_entry)
        .collect::<Result<_>>()?,
    )
  }
}

// ─── RevocationStore impl ────────────────────────────────────────────────────

impl RevocationStore for SqliteStore {
  async fn revoke(
    &self,
    token: &str,
    reason: &str,
    revoked_by: &Actor,
  ) -> verge_core::Result<()> {
    let hash = token_fingerprint(token);
    let reason = reason.to_owned();
    let by = revoked_by.attribution();
    let at_str = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO revocations (token_hash, reason, revoked_by, revoked_at)
           VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT(token_hash) DO NOTHING",
          rusqlite::params![hash, reason, by, at_str],
        )?;
        Ok(())
      })
      .await
      .map_err(Error::from)?;
    Ok(())
  }

  async fn is_revoked(&self, token: &str) -> bool {
    let hash = token_fingerprint(token);

    let lookup = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT 1 FROM revocations WHERE token_hash = ?1",
              rusqlite::params![hash],
              |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false),
        )
      })
      .await;

    match lookup {
      Ok(revoked) => revoked,
      Err(err) => {
        // Fail open: an unreachable revocation table must not lock out all
        // authenticated traffic.
        tracing::warn!(%err, "revocation check failed, treating token as not revoked");
        false
      }
    }
  }
}

// ─── RateLimiter impl ────────────────────────────────────────────────────────

impl RateLimiter for SqliteStore {
  async fn consume(&self, identity: &str) -> verge_core::Result<RateDecision> {
    let identity = identity.to_owned();
    let quota = i64::from(self.limits.quota);
    let window_secs = self.limits.window_secs;
    let block_secs = self.limits.block_secs;
    let now_ts = Utc::now().timestamp();

    let decision = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let row: Option<(i64, i64, Option<i64>)> = tx
          .query_row(
            "SELECT points, window_expires, blocked_until
             FROM rate_limits WHERE identity = ?1",
            rusqlite::params![identity],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
          )
          .optional()?;

        let decision = match row {
          // An active block is fixed at first violation; it is not extended
          // by attempts made while blocked.
          Some((_, _, Some(blocked_until))) if blocked_until > now_ts => {
            RateDecision::Blocked { retry_after_secs: blocked_until - now_ts }
          }
          Some((points, window_expires, None)) if window_expires > now_ts => {
            if points >= quota {
              let blocked_until = now_ts + block_secs;
              tx.execute(
                "UPDATE rate_limits SET blocked_until = ?2 WHERE identity = ?1",
                rusqlite::params![identity, blocked_until],
              )?;
              RateDecision::Blocked { retry_after_secs: block_secs }
            } else {
              tx.execute(
                "UPDATE rate_limits SET points = points + 1 WHERE identity = ?1",
                rusqlite::params![identity],
              )?;
              RateDecision::Allowed
            }
          }
          // No row, an expired window, or a served-out block: start a fresh
          // window. A block that already expired never re-blocks the
          // identity, whatever remains of the window it was issued in.
          _ => {
            tx.execute(
              "INSERT INTO rate_limits (identity, points, window_expires, blocked_until)
               VALUES (?1, 1, ?2, NULL)
               ON CONFLICT(identity) DO UPDATE
               SET points = 1, window_expires = ?2, blocked_until = NULL",
              rusqlite::params![identity, now_ts + window_secs],
            )?;
            RateDecision::Allowed
          }
        };

        tx.commit()?;
        Ok(decision)
      })
      .await
      .map_err(Error::from)?;

    Ok(decision)
  }
}

// ─── External feeds ──────────────────────────────────────────────────────────

impl FeedbackStore for SqliteStore {
  async fn approved_unprocessed(&self) -> verge_core::Result<Vec<FeedbackRecord>> {
    let raws: Vec<RawFeedback> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT feedback_id, payload, submitted_at
           FROM feedback
           WHERE approved = 1 AND processed = 0
           ORDER BY submitted_at ASC, rowid ASC",
        )?;
        let rows = stmt
          .query_map([], |row| {
            Ok(RawFeedback {
              feedback_id:  row.get(0)?,
              payload:      row.get(1)?,
              submitted_at: row.get(2)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await
      .map_err(Error::from)?;

    Ok(
      raws
        .into_iter()
        .map(RawFeedback::into_record)
        .collect::<Result<_>>()?,
    )
  }

  async fn mark_processed(&self, ids: &[Uuid]) -> verge_core::Result<()> {
    let id_strs: Vec<String> = ids.iter().copied().map(encode_uuid).collect();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        for id in &id_strs {
          tx.execute(
            "UPDATE feedback SET processed = 1 WHERE feedback_id = ?1",
            rusqlite::params![id],
          )?;
        }
        tx.commit()?;
        Ok(())
      })
      .await
      .map_err(Error::from)?;
    Ok(())
  }
}

impl OutcomeStore for SqliteStore {
  async fn all_outcomes(&self) -> verge_core::Result<Vec<OutcomeRecord>> {
    let raws: Vec<RawOutcome> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT record_id, version, outcome, recorded_at
           FROM outcomes
           ORDER BY recorded_at ASC, rowid ASC",
        )?;
        let rows = stmt
          .query_map([], |row| {
            Ok(RawOutcome {
              record_id:   row.get(0)?,
              version:     row.get(1)?,
              outcome:     row.get(2)?,
              recorded_at: row.get(3)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await
      .map_err(Error::from)?;

    Ok(
      raws
        .into_iter()
        .map(RawOutcome::into_record)
        .collect::<Result<_>>()?,
    )
  }
}
