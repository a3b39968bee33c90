//! Sync scheduler - the outer drive loop
//!
//! Runs orchestrator cycles at a fixed poll interval. Shutdown is
//! signaled between cycles, never mid-cycle: each object write is
//! transactionally atomic and the convergence algorithm is
//! version-diff-driven, so a cycle that never starts is the only safe
//! cancellation point the loop needs. A user-initiated sync request
//! bypasses the remainder of the current wait.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::engine::GroupOrchestrator;

/// Granularity at which the wait loop observes its flags
const WAIT_TICK: Duration = Duration::from_millis(250);

/// Shared control handle for a running scheduler
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    shutdown: Arc<AtomicBool>,
    sync_requested: Arc<AtomicBool>,
}

impl SchedulerHandle {
    /// Requests a stop after the current cycle finishes
    pub fn request_shutdown(&self) {
        info!("Scheduler shutdown requested");
        self.shutdown.store(true, Ordering::Release);
    }

    /// Requests an immediate cycle, bypassing the remaining wait
    pub fn request_sync(&self) {
        debug!("Immediate sync requested");
        self.sync_requested.store(true, Ordering::Release);
    }

    /// Returns true once shutdown has been requested
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

/// Drives orchestrator cycles until shutdown
pub struct SyncScheduler {
    orchestrator: Arc<GroupOrchestrator>,
    poll_interval: Duration,
    handle: SchedulerHandle,
}

impl SyncScheduler {
    /// Creates a scheduler and its control handle
    pub fn new(
        orchestrator: Arc<GroupOrchestrator>,
        poll_interval: Duration,
    ) -> (Self, SchedulerHandle) {
        let handle = SchedulerHandle {
            shutdown: Arc::new(AtomicBool::new(false)),
            sync_requested: Arc::new(AtomicBool::new(false)),
        };

        info!(
            poll_secs = poll_interval.as_secs(),
            "Creating sync scheduler"
        );

        let scheduler = Self {
            orchestrator,
            poll_interval,
            handle: handle.clone(),
        };
        (scheduler, handle)
    }

    /// Creates a scheduler with the configured poll interval
    pub fn from_config(
        orchestrator: Arc<GroupOrchestrator>,
        config: &bibsync_core::config::Config,
    ) -> (Self, SchedulerHandle) {
        Self::new(
            orchestrator,
            Duration::from_secs(config.sync.poll_interval),
        )
    }

    /// Runs cycles until shutdown is requested
    ///
    /// A failed cycle is logged and the loop keeps going: the next cycle
    /// resumes from the conservatively committed watermarks.
    pub async fn run(self) {
        info!("Sync scheduler started");

        loop {
            if self.handle.is_shutdown() {
                break;
            }

            match self.orchestrator.sync_all().await {
                Ok(reports) => {
                    let errors: usize = reports.iter().map(|r| r.errors().len()).sum();
                    debug!(groups = reports.len(), errors, "Cycle completed");
                }
                Err(e) => {
                    error!(error = %format!("{e:#}"), "Cycle failed");
                }
            }

            self.wait_for_next_cycle().await;
        }

        info!("Sync scheduler stopped");
    }

    /// Waits out the poll interval, observing the control flags
    async fn wait_for_next_cycle(&self) {
        let deadline = Instant::now() + self.poll_interval;
        loop {
            if self.handle.is_shutdown() {
                return;
            }
            if self.handle.sync_requested.swap(false, Ordering::AcqRel) {
                debug!("Wait interrupted by sync request");
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            let remaining = deadline - now;
            tokio::time::sleep(remaining.min(WAIT_TICK)).await;
        }
    }
}
