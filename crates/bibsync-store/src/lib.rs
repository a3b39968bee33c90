//! Bibsync Store - Local mirror persistence
//!
//! SQLite-based mirror of the remote library service:
//! - one row per group with its per-kind version watermarks
//! - one row per collection/item/tag, keyed by (library, key) with a
//!   secondary unique index on (library, old id)
//!
//! ## Architecture
//!
//! This crate implements the `VersionedStore` port from `bibsync-core`
//! using SQLite as the storage backend. It is a driven (secondary) adapter
//! in the hexagonal architecture.
//!
//! ## Key Components
//!
//! - [`DatabasePool`] - Connection pool with migration support
//! - [`SqliteVersionedStore`] - Full `VersionedStore` implementation
//! - [`StoreError`] - Error types for store operations
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use bibsync_store::{DatabasePool, SqliteVersionedStore};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pool = DatabasePool::new(Path::new("/var/lib/bibsync/mirror.db")).await?;
//! let store = SqliteVersionedStore::new(pool.pool().clone());
//! // Use store as VersionedStore...
//! # Ok(())
//! # }
//! ```

pub mod pool;
pub mod repository;

pub use pool::DatabasePool;
pub use repository::SqliteVersionedStore;

/// Errors that can occur during store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Failed to establish a database connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A database query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Serialization or deserialization of domain types failed
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::QueryFailed(e.to_string())
    }
}
