//! Capability token codec for Verge.
//!
//! Creates and verifies the signed, time-bounded bearer tokens that
//! authorize lifecycle actions: session tokens for interactive operators and
//! single-purpose link tokens delivered out of band. Pure synchronous; no
//! HTTP or database dependencies.
//!
//! # Quick start
//!
//! ```no_run
//! use chrono::Duration;
//! use uuid::Uuid;
//! use verge_core::audit::{LinkAction, Role};
//! use verge_token::{TokenCodec, TokenDomain};
//!
//! let codec = TokenCodec::new("session-secret", "link-secret");
//! let token = codec
//!   .issue_link(
//!     Uuid::new_v4(),
//!     "ops@example.com",
//!     Role::Admin,
//!     LinkAction::Promote,
//!     "1.2.3".parse().unwrap(),
//!     Duration::hours(48),
//!   )
//!   .unwrap();
//! let claims = codec.verify(&token, TokenDomain::Link, None).unwrap();
//! assert_eq!(claims.action, Some(LinkAction::Promote));
//! ```

pub mod error;

mod claims;
mod codec;

pub use claims::{Claims, SessionBinding, TokenDomain};
pub use codec::TokenCodec;
pub use error::{Error, Result};
