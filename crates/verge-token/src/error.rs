//! Error types for `verge-token`.

use thiserror::Error;

/// Why a token failed verification (or issuance).
///
/// Verification rejections are ordinary values, not aborts: callers recover
/// them into generic responses and write their own audit entries. The codec
/// never writes audit entries itself.
#[derive(Debug, Error)]
pub enum Error {
  /// The token is not two base64url segments of JSON-plus-MAC shape.
  #[error("malformed token")]
  Malformed,

  #[error("bad signature")]
  BadSignature,

  #[error("token expired")]
  Expired,

  /// Signed for the other domain (e.g. an action-link token presented
  /// where a session token is expected).
  #[error("token domain mismatch")]
  DomainMismatch,

  /// A session token's embedded device/session binding does not match what
  /// the caller presented.
  #[error("context binding mismatch")]
  BindingMismatch,

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
