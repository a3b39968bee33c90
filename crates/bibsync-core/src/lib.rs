//! Bibsync Core - Domain logic and business rules
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `Group`, `SyncObject`, `CycleReport`
//! - **Pure decision logic** - `SyncDirection`, `SyncStatus` transitions
//! - **Port definitions** - Traits for adapters: `LibraryService`,
//!   `VersionedStore`, `BlobStore`
//!
//! # Architecture
//!
//! This crate follows the hexagonal (ports & adapters) architecture pattern.
//! The domain module contains pure business logic with no I/O dependencies.
//! Ports define trait interfaces that adapter crates implement: the HTTP
//! client for the remote library service, the SQLite mirror store, and the
//! attachment vaults. The engine crate orchestrates domain entities through
//! the port interfaces.

pub mod config;
pub mod domain;
pub mod ports;
