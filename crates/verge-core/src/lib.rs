//! Core types and trait definitions for the Verge model-version lifecycle.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! All other crates depend on it.

pub mod audit;
pub mod error;
pub mod orchestrator;
pub mod outcome;
pub mod store;
pub mod version;

pub use error::{Error, Result};
