//! Error taxonomy for `verge-core`.
//!
//! Every failure a lifecycle operation can surface is one of these variants.
//! Outward-facing layers collapse them into generic caller-visible messages;
//! the full variant detail is preserved in the audit entry metadata.

use thiserror::Error;

use crate::version::VersionLabel;

#[derive(Debug, Error)]
pub enum Error {
  /// Malformed input, rejected before any state access.
  #[error("invalid input: {0}")]
  Validation(String),

  #[error("version not found: {0}")]
  NotFound(VersionLabel),

  #[error("version {0} is already deployed")]
  AlreadyDeployed(VersionLabel),

  #[error("version {0} is not archived; only archived versions can be rolled back to")]
  NotArchived(VersionLabel),

  /// Token invalid, expired, revoked, wrong domain, or insufficient role.
  #[error("not authorized: {0}")]
  Authorization(String),

  #[error("rate limited; retry after {retry_after_secs}s")]
  RateLimited { retry_after_secs: i64 },

  /// A backing store was unavailable. Never reported as success; if the
  /// audit write itself fails this is the variant that propagates.
  #[error("persistence error: {0}")]
  Persistence(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
