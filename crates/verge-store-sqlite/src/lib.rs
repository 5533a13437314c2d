//! SQLite backend for the Verge lifecycle stores.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. One [`SqliteStore`] implements every
//! store trait from `verge-core`: versions, audit log, revocations, rate
//! limits, and the external feedback/outcome feeds.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::{RateLimitConfig, SqliteStore};

#[cfg(test)]
mod tests;
