//! Bibsync Engine - the synchronization core
//!
//! Keeps the local mirror and the remote library service eventually
//! consistent under concurrent, unordered modification:
//! - per-object version tracking with conflict classification
//! - paginated, batched remote access under account-wide rate limiting
//! - deletion propagation under the group's direction policy
//! - checksum-gated binary attachment transfer
//! - at-most-one-direction-wins semantics per sync cycle
//!
//! ## Modules
//!
//! - [`synchronizer`] - Generic diff-and-fetch per object kind
//! - [`deletions`] - Remote tombstone propagation
//! - [`attachments`] - Binary transfer over the blob store
//! - [`engine`] - Per-group phase orchestration and watermark commit
//! - [`scheduler`] - Outer drive loop with shutdown signaling

pub mod attachments;
pub mod deletions;
pub mod engine;
pub mod scheduler;
pub mod synchronizer;

pub use engine::GroupOrchestrator;
pub use scheduler::{SchedulerHandle, SyncScheduler};
