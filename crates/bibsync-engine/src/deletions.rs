//! Remote tombstone propagation
//!
//! Applies the remote deletion feed to local state under the group's
//! direction policy. The pass is idempotent: tombstones for keys that are
//! absent or already deleted locally are no-ops, so replaying a feed
//! yields the same end state.
//!
//! Policy per tombstone, in order:
//! - object absent locally: no-op (already consistent)
//! - object already deleted: no-op
//! - object Synced (or an unfetched placeholder): clean remote-driven
//!   delete — tombstone it and keep Synced
//! - object dirty and the direction makes the remote authoritative for
//!   deletes: force the tombstone, discarding the local uncommitted
//!   change (explicit data-loss policy, always logged)
//! - otherwise the local change wins: the tombstone is rejected by
//!   re-stamping the object's version to the feed's last-modified-version
//!   while keeping its dirty status, so the next cycle re-uploads it
//!   ("undelete by resurrection")

use std::sync::Arc;

use tracing::{debug, info, warn};

use bibsync_core::domain::{Group, ObjectKind, SyncStatus, Version};
use bibsync_core::ports::{LibraryService, VersionedStore};

/// Counters from one deletion propagation pass
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DeletionOutcome {
    /// Tombstones applied cleanly
    pub applied: u64,
    /// Tombstones rejected in favor of a local uncommitted change
    pub resurrected: u64,
    /// Local uncommitted changes discarded because the remote is
    /// authoritative for deletes under this direction
    pub discarded: u64,
    /// Last-Modified-Version of the deletion feed
    pub last_modified: Option<Version>,
}

/// Applies remote tombstones to local state under the conflict policy
pub struct DeletionPropagator {
    service: Arc<dyn LibraryService>,
    store: Arc<dyn VersionedStore>,
}

impl DeletionPropagator {
    /// Creates a propagator over the given ports
    pub fn new(service: Arc<dyn LibraryService>, store: Arc<dyn VersionedStore>) -> Self {
        Self { service, store }
    }

    /// Fetches and applies the tombstone feed since the group's version
    #[tracing::instrument(skip(self, group), fields(library = %group.id()))]
    pub async fn apply(&self, group: &Group) -> anyhow::Result<DeletionOutcome> {
        let library = group.id();
        let feed = self.service.deletions(library, group.version()).await?;
        let mut outcome = DeletionOutcome {
            last_modified: Some(feed.last_modified),
            ..DeletionOutcome::default()
        };

        debug!(
            since = %group.version(),
            tombstones = feed.len(),
            "Applying remote deletion feed"
        );

        for kind in ObjectKind::ALL {
            for key in feed.for_kind(kind) {
                let Some(mut object) = self.store.object(library, kind, key).await? else {
                    // Never seen locally: already consistent.
                    continue;
                };
                if object.is_deleted() {
                    // Already tombstoned: idempotent no-op.
                    continue;
                }

                match object.status() {
                    SyncStatus::Synced | SyncStatus::Incomplete => {
                        object.mark_deleted();
                        object.set_status(SyncStatus::Synced);
                        self.store.save_object(&object).await?;
                        outcome.applied += 1;
                    }
                    _ if group.direction().remote_wins_deletes() => {
                        warn!(
                            %key,
                            kind = %kind,
                            status = %object.status(),
                            "Remote tombstone overrides local uncommitted change; discarding it"
                        );
                        object.mark_deleted();
                        object.set_status(SyncStatus::Synced);
                        object.restamp_version(feed.last_modified);
                        self.store.save_object(&object).await?;
                        outcome.discarded += 1;
                    }
                    _ => {
                        // Local wins: re-stamp so the next upload passes
                        // the remote's version precondition and recreates
                        // the object.
                        info!(
                            %key,
                            kind = %kind,
                            status = %object.status(),
                            restamped = %feed.last_modified,
                            "Rejecting remote tombstone; object will be re-uploaded"
                        );
                        object.restamp_version(feed.last_modified);
                        self.store.save_object(&object).await?;
                        outcome.resurrected += 1;
                    }
                }
            }
        }

        info!(
            applied = outcome.applied,
            resurrected = outcome.resurrected,
            discarded = outcome.discarded,
            "Deletion propagation complete"
        );
        Ok(outcome)
    }
}
