//! Chanfeed Common Library
//!
//! Shared code for the Chanfeed services including:
//! - Database models, the entity store seam and its Postgres repository
//! - Entity service (dedup and idempotency policy)
//! - Read-side aggregation and pagination
//! - Topic sources and inbound event payloads
//! - Error types, configuration and metrics

pub mod config;
pub mod db;
pub mod errors;
pub mod feed;
pub mod metrics;
pub mod queue;
pub mod service;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::{DbPool, EntityStore, Repository};
pub use errors::{AppError, Result};
pub use feed::Feed;
pub use service::{EntityService, Resolution};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
