//! SQL schema for the Verge SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Versions are never deleted; status transitions only.
CREATE TABLE IF NOT EXISTS model_versions (
    version_id   TEXT PRIMARY KEY,
    label        TEXT NOT NULL UNIQUE,  -- 'major.minor.patch'
    status       TEXT NOT NULL,         -- 'training' | 'ready' | 'deployed' | 'archived'
    feedback_ids TEXT NOT NULL DEFAULT '[]',
    metrics      TEXT NOT NULL DEFAULT '{}',
    deployed_by  TEXT,
    deployed_at  TEXT,
    created_at   TEXT NOT NULL,
    updated_at   TEXT NOT NULL
);

-- The audit trail is strictly append-only.
-- No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS audit_log (
    entry_id    TEXT PRIMARY KEY,
    actor_id    TEXT,                   -- NULL for the unknown-actor sentinel
    actor_email TEXT,
    actor_role  TEXT,
    action      TEXT NOT NULL,          -- 'promote' | 'rollback' | 'train' | 'revoke_token'
    status      TEXT NOT NULL,          -- 'success' | 'failed'
    details     TEXT NOT NULL,
    meta        TEXT NOT NULL DEFAULT '{}',
    recorded_at TEXT NOT NULL
);

-- Tokens are stored as SHA-256 fingerprints, never as plaintext.
CREATE TABLE IF NOT EXISTS revocations (
    token_hash TEXT PRIMARY KEY,
    reason     TEXT NOT NULL,
    revoked_by TEXT,
    revoked_at TEXT NOT NULL
);

-- Rate-limit counters; operational state, not durable history.
-- Expiries are unix seconds so the consume path stays pure integer math.
CREATE TABLE IF NOT EXISTS rate_limits (
    identity       TEXT PRIMARY KEY,
    points         INTEGER NOT NULL,
    window_expires INTEGER NOT NULL,
    blocked_until  INTEGER
);

-- Feedback intake is owned by an external collaborator; training only
-- consumes rows with approved = 1 AND processed = 0.
CREATE TABLE IF NOT EXISTS feedback (
    feedback_id  TEXT PRIMARY KEY,
    payload      TEXT NOT NULL,
    approved     INTEGER NOT NULL DEFAULT 0,
    processed    INTEGER NOT NULL DEFAULT 0,
    submitted_at TEXT NOT NULL
);

-- Outcome records arrive pre-labelled per version; read-only here.
CREATE TABLE IF NOT EXISTS outcomes (
    record_id   TEXT PRIMARY KEY,
    version     TEXT NOT NULL,
    outcome     TEXT NOT NULL,          -- 'improved' | 'stable' | 'worsened'
    recorded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS versions_status_idx  ON model_versions(status);
CREATE INDEX IF NOT EXISTS audit_recorded_idx   ON audit_log(recorded_at);
CREATE INDEX IF NOT EXISTS audit_actor_idx      ON audit_log(actor_email);
CREATE INDEX IF NOT EXISTS feedback_pending_idx ON feedback(approved, processed);
CREATE INDEX IF NOT EXISTS outcomes_version_idx ON outcomes(version);

PRAGMA user_version = 1;
";
