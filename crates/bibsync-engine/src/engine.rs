//! Group orchestration
//!
//! Drives one sync cycle per group through the fixed phase sequence:
//!
//! ```text
//! Idle → Uploading → SyncingCollections → Downloading → SyncingTags
//!      → PropagatingDeletions → CommittingWatermarks → Idle
//! ```
//!
//! Any phase error ends the cycle early for that group — remaining phases
//! are skipped, sibling groups are unaffected — and the watermark commit
//! still runs with only the maxima observed by the phases that completed.
//! A partially failed cycle therefore advances watermarks conservatively
//! and naturally resumes the rest on the next cycle.
//!
//! Groups are driven sequentially: the remote's rate budget is
//! account-wide, and concurrent requests against one library risk
//! version-precondition races.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use bibsync_core::domain::{CycleReport, Group, ObjectKind, SyncPhase, Watermarks};
use bibsync_core::ports::library_service::WriteFailure;
use bibsync_core::ports::{BlobStore, LibraryService, VersionedStore};

use crate::attachments::{AttachmentTransfer, TransferResult};
use crate::deletions::DeletionPropagator;
use crate::synchronizer::ObjectSynchronizer;

/// Orchestrates sync cycles across groups
pub struct GroupOrchestrator {
    service: Arc<dyn LibraryService>,
    store: Arc<dyn VersionedStore>,
    synchronizer: ObjectSynchronizer,
    deletions: DeletionPropagator,
    attachments: AttachmentTransfer,
}

impl GroupOrchestrator {
    /// Creates an orchestrator over the three ports
    pub fn new(
        service: Arc<dyn LibraryService>,
        store: Arc<dyn VersionedStore>,
        vault: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            synchronizer: ObjectSynchronizer::new(service.clone(), store.clone()),
            deletions: DeletionPropagator::new(service.clone(), store.clone()),
            attachments: AttachmentTransfer::new(service.clone(), store.clone(), vault),
            service,
            store,
        }
    }

    // ========================================================================
    // Group discovery
    // ========================================================================

    /// Discovers remote groups and refreshes stale group metadata
    ///
    /// Groups are created on first reference as placeholders (safe
    /// local-master direction); a group whose remote version advanced past
    /// the stored one gets its opaque metadata re-fetched.
    pub async fn refresh_groups(&self) -> anyhow::Result<()> {
        let remote = self.service.group_versions().await?;

        let mut ids: Vec<_> = remote.into_iter().collect();
        ids.sort_by_key(|(id, _)| *id);

        for (id, remote_version) in ids {
            let mut group = self.store.ensure_group(id).await?;
            if group.version() < remote_version && group.direction().can_download() {
                debug!(
                    library = %id,
                    local = %group.version(),
                    remote = %remote_version,
                    "Group metadata stale; refreshing"
                );
                let fetched = self.service.group(id).await?;
                group.update_data(fetched.version, fetched.data);
                self.store.save_group(&group).await?;
            }
        }
        Ok(())
    }

    // ========================================================================
    // Cycle driving
    // ========================================================================

    /// Runs one cycle over every active group, sequentially
    ///
    /// Per-group failures never abort sibling groups.
    pub async fn sync_all(&self) -> anyhow::Result<Vec<CycleReport>> {
        self.refresh_groups().await?;

        let groups = self.store.active_groups().await?;
        info!(groups = groups.len(), "Starting sync cycle");

        let mut reports = Vec::with_capacity(groups.len());
        for group in groups {
            reports.push(self.sync_group(&group).await);
        }

        let failed = reports.iter().filter(|r| !r.is_clean()).count();
        info!(
            groups = reports.len(),
            failed,
            "Sync cycle finished"
        );
        Ok(reports)
    }

    /// Runs one cycle for one group
    ///
    /// Never returns an error: failures are captured in the report so the
    /// caller can keep driving sibling groups.
    #[tracing::instrument(skip(self, group), fields(library = %group.id()))]
    pub async fn sync_group(&self, group: &Group) -> CycleReport {
        let mut report = CycleReport::start(group.id());

        if group.direction() == bibsync_core::domain::SyncDirection::None {
            // Intentionally unmanaged: no remote calls at all, not even
            // deletion checks.
            debug!("Direction is none; skipping group entirely");
            report.finish();
            return report;
        }

        let mut marks = Watermarks::default();
        if let Err(e) = self.run_phases(group, &mut report, &mut marks).await {
            error!(
                phase = %report.phase(),
                error = %format!("{e:#}"),
                "Phase failed; skipping remaining phases for this cycle"
            );
            report.record_error(format!("{e:#}"));
        }

        // The commit runs even after a phase failure, using only the
        // watermarks collected by phases that completed.
        report.enter(SyncPhase::CommittingWatermarks);
        if marks.is_empty() {
            report.complete_phase();
        } else {
            match self.store.commit_watermarks(group.id(), &marks).await {
                Ok(()) => report.complete_phase(),
                Err(e) => {
                    error!(error = %format!("{e:#}"), "Watermark commit failed");
                    report.record_error(format!("watermark commit: {e:#}"));
                }
            }
        }

        report.finish();
        info!(
            uploaded = report.uploaded,
            downloaded = report.downloaded,
            deleted = report.deleted,
            attachments = report.attachments,
            conflicts = report.conflicts,
            errors = report.errors().len(),
            "Group cycle complete"
        );
        report
    }

    /// Runs the transfer phases in order; `?` aborts the remainder
    async fn run_phases(
        &self,
        group: &Group,
        report: &mut CycleReport,
        marks: &mut Watermarks,
    ) -> anyhow::Result<()> {
        let direction = group.direction();

        // Upload precedes download for items: the captured watermark must
        // not already reflect this client's own upload.
        report.enter(SyncPhase::Uploading);
        if direction.can_upload() {
            let outcome = self.synchronizer.upload(group, ObjectKind::Item).await?;
            report.uploaded += outcome.uploaded + outcome.deletions_pushed;
            if let Some(v) = outcome.last_modified {
                marks.observe(ObjectKind::Item, v);
            }
            Self::record_write_failures(report, ObjectKind::Item, &outcome.failed);
            for item in &outcome.attachments {
                self.transfer_attachment_upload(group, report, item).await;
            }
        }
        report.complete_phase();

        // Collections run upload-then-download as one phase; the item
        // rationale (never capture a watermark that could include our own
        // write) applies unchanged.
        report.enter(SyncPhase::SyncingCollections);
        self.sync_kind(group, ObjectKind::Collection, report, marks)
            .await?;
        report.complete_phase();

        report.enter(SyncPhase::Downloading);
        if direction.can_download() {
            let outcome = self.synchronizer.download(group, ObjectKind::Item).await?;
            report.downloaded += outcome.fetched;
            report.conflicts += outcome.conflicts.len() as u64;
            if let Some(v) = outcome.last_modified {
                marks.observe(ObjectKind::Item, v);
            }
            for item in &outcome.attachments {
                match self.attachments.download(group, item).await {
                    Ok(TransferResult::Transferred) => report.attachments += 1,
                    Ok(_) => {}
                    Err(e) => {
                        // Per-object: siblings keep transferring.
                        warn!(
                            key = ?item.key().map(|k| k.as_str().to_string()),
                            error = %format!("{e:#}"),
                            "Attachment download failed"
                        );
                        report.record_error(format!("attachment download: {e:#}"));
                    }
                }
            }
        }
        report.complete_phase();

        report.enter(SyncPhase::SyncingTags);
        self.sync_kind(group, ObjectKind::Tag, report, marks).await?;
        report.complete_phase();

        // Deletions run after both transfer directions so a download pass
        // that predates a tombstone can never resurrect it.
        report.enter(SyncPhase::PropagatingDeletions);
        if direction.can_download() {
            let outcome = self.deletions.apply(group).await?;
            report.deleted += outcome.applied + outcome.discarded;
            if let Some(v) = outcome.last_modified {
                marks.observe_library(v);
            }
        }
        report.complete_phase();

        Ok(())
    }

    /// Upload-then-download for one secondary kind (collections, tags)
    async fn sync_kind(
        &self,
        group: &Group,
        kind: ObjectKind,
        report: &mut CycleReport,
        marks: &mut Watermarks,
    ) -> anyhow::Result<()> {
        let direction = group.direction();

        if direction.can_upload() {
            let outcome = self.synchronizer.upload(group, kind).await?;
            report.uploaded += outcome.uploaded + outcome.deletions_pushed;
            if let Some(v) = outcome.last_modified {
                marks.observe(kind, v);
            }
            Self::record_write_failures(report, kind, &outcome.failed);
        }

        if direction.can_download() {
            let outcome = self.synchronizer.download(group, kind).await?;
            report.downloaded += outcome.fetched;
            report.conflicts += outcome.conflicts.len() as u64;
            if let Some(v) = outcome.last_modified {
                marks.observe(kind, v);
            }
        }

        Ok(())
    }

    /// Records per-object write failures against the current phase
    ///
    /// These objects stay dirty and re-evaluate on the next cycle; the
    /// report carries the remote's code and message for the caller.
    fn record_write_failures(
        report: &mut CycleReport,
        kind: ObjectKind,
        failed: &[(Option<bibsync_core::domain::ObjectKey>, WriteFailure)],
    ) {
        for (key, failure) in failed {
            report.record_error(format!(
                "{kind} {} rejected by remote ({}): {}",
                key.as_ref().map_or("<unkeyed>", |k| k.as_str()),
                failure.code,
                failure.message
            ));
        }
    }

    /// Attempts one attachment upload, capturing per-object failures
    async fn transfer_attachment_upload(
        &self,
        group: &Group,
        report: &mut CycleReport,
        item: &bibsync_core::domain::SyncObject,
    ) {
        match self.attachments.upload(group, item).await {
            Ok(TransferResult::Transferred) => report.attachments += 1,
            Ok(TransferResult::Deferred) => {
                report.record_error(format!(
                    "attachment {} deferred: remote content changed concurrently",
                    item.key().map_or("<unkeyed>", |k| k.as_str())
                ));
            }
            Ok(_) => {}
            Err(e) => {
                warn!(
                    key = ?item.key().map(|k| k.as_str().to_string()),
                    error = %format!("{e:#}"),
                    "Attachment upload failed"
                );
                report.record_error(format!("attachment upload: {e:#}"));
            }
        }
    }
}
