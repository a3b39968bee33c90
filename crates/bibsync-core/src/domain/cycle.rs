//! Sync cycle bookkeeping
//!
//! A `CycleReport` tracks one orchestrator pass over one group: which
//! phases ran, what moved, and what went wrong. The phase sequence is
//! fixed; any phase error ends the cycle early (remaining phases are
//! skipped for that group, watermarks advance only for completed phases).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::{CycleId, LibraryId};

/// Phases of a group sync cycle, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Idle,
    Uploading,
    SyncingCollections,
    Downloading,
    SyncingTags,
    PropagatingDeletions,
    CommittingWatermarks,
}

impl SyncPhase {
    /// Returns the next phase in the sequence, or None after commit
    #[must_use]
    pub fn next(&self) -> Option<SyncPhase> {
        match self {
            SyncPhase::Idle => Some(SyncPhase::Uploading),
            SyncPhase::Uploading => Some(SyncPhase::SyncingCollections),
            SyncPhase::SyncingCollections => Some(SyncPhase::Downloading),
            SyncPhase::Downloading => Some(SyncPhase::SyncingTags),
            SyncPhase::SyncingTags => Some(SyncPhase::PropagatingDeletions),
            SyncPhase::PropagatingDeletions => Some(SyncPhase::CommittingWatermarks),
            SyncPhase::CommittingWatermarks => None,
        }
    }

    /// Returns the phase name for logs
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            SyncPhase::Idle => "idle",
            SyncPhase::Uploading => "uploading",
            SyncPhase::SyncingCollections => "syncing_collections",
            SyncPhase::Downloading => "downloading",
            SyncPhase::SyncingTags => "syncing_tags",
            SyncPhase::PropagatingDeletions => "propagating_deletions",
            SyncPhase::CommittingWatermarks => "committing_watermarks",
        }
    }
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// An error captured against one phase of a cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleError {
    /// Phase in which the error occurred
    pub phase: SyncPhase,
    /// Human-readable error message
    pub message: String,
    /// When the error occurred
    pub timestamp: DateTime<Utc>,
}

/// Summary of one orchestrator pass over one group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    /// Cycle identifier
    id: CycleId,
    /// Group this cycle ran for
    library: LibraryId,
    /// When the cycle started
    started_at: DateTime<Utc>,
    /// When the cycle finished (None while running)
    finished_at: Option<DateTime<Utc>>,
    /// Phase currently executing (Idle once finished)
    phase: SyncPhase,
    /// Phases that ran to completion
    completed: Vec<SyncPhase>,
    /// Objects uploaded this cycle
    pub uploaded: u64,
    /// Objects downloaded this cycle
    pub downloaded: u64,
    /// Tombstones applied this cycle
    pub deleted: u64,
    /// Attachment payloads transferred this cycle
    pub attachments: u64,
    /// Conflicts detected and skipped this cycle
    pub conflicts: u64,
    /// Errors captured during the cycle
    errors: Vec<CycleError>,
}

impl CycleReport {
    /// Starts a new cycle report for a group
    #[must_use]
    pub fn start(library: LibraryId) -> Self {
        Self {
            id: CycleId::new(),
            library,
            started_at: Utc::now(),
            finished_at: None,
            phase: SyncPhase::Idle,
            completed: Vec::new(),
            uploaded: 0,
            downloaded: 0,
            deleted: 0,
            attachments: 0,
            conflicts: 0,
            errors: Vec::new(),
        }
    }

    /// Returns the cycle identifier
    pub fn id(&self) -> CycleId {
        self.id
    }

    /// Returns the group this cycle ran for
    pub fn library(&self) -> LibraryId {
        self.library
    }

    /// Returns the phase currently executing
    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    /// Returns the phases that ran to completion
    pub fn completed_phases(&self) -> &[SyncPhase] {
        &self.completed
    }

    /// Returns the captured errors
    pub fn errors(&self) -> &[CycleError] {
        &self.errors
    }

    /// Returns true if the cycle finished without captured errors
    pub fn is_clean(&self) -> bool {
        self.finished_at.is_some() && self.errors.is_empty()
    }

    /// Returns when the cycle started
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Returns when the cycle finished
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Enters a phase
    pub fn enter(&mut self, phase: SyncPhase) {
        self.phase = phase;
    }

    /// Marks the current phase completed
    pub fn complete_phase(&mut self) {
        if self.phase != SyncPhase::Idle {
            self.completed.push(self.phase);
        }
    }

    /// Returns true if the given phase ran to completion
    pub fn phase_completed(&self, phase: SyncPhase) -> bool {
        self.completed.contains(&phase)
    }

    /// Captures an error against the current phase
    pub fn record_error(&mut self, message: impl Into<String>) {
        self.errors.push(CycleError {
            phase: self.phase,
            message: message.into(),
            timestamp: Utc::now(),
        });
    }

    /// Ends the cycle and returns to Idle
    pub fn finish(&mut self) {
        self.phase = SyncPhase::Idle;
        self.finished_at = Some(Utc::now());
    }
}
