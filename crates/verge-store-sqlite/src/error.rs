//! Error type for `verge-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] verge_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  /// A stored column value could not be decoded back into its domain type.
  #[error("decode error: {0}")]
  Decode(String),
}

/// Store trait methods speak `verge_core::Error`; everything that is not
/// already a core error surfaces as store-unavailability.
impl From<Error> for verge_core::Error {
  fn from(e: Error) -> Self {
    match e {
      Error::Core(inner) => inner,
      other => verge_core::Error::Persistence(other.to_string()),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
