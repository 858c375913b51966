//! TTL-deferred cleanup of job artifacts.
//!
//! Every job that reaches a terminal state gets exactly one cleanup task,
//! guarded by the registry's `cleanup_scheduled` flag. When the TTL fires the
//! task deletes both files and removes the registry entry. Deletion is
//! idempotent: already-missing files are success, and a second invocation
//! finds no registry entry and does nothing.

use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use msz_models::JobId;

use crate::registry::JobRegistry;

/// Default artifact lifetime after completion: 30 minutes.
pub const DEFAULT_TTL_MIN: u64 = 30;

/// Schedules deferred, idempotent artifact deletion.
#[derive(Debug, Clone)]
pub struct CleanupScheduler {
    ttl: Duration,
}

impl Default for CleanupScheduler {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_TTL_MIN * 60))
    }
}

impl CleanupScheduler {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Schedule cleanup for a terminal job.
    ///
    /// Safe to call more than once; only the call that flips the registry
    /// guard actually spawns a task.
    pub fn schedule(&self, registry: Arc<JobRegistry>, job_id: JobId) {
        if !registry.mark_cleanup_scheduled(&job_id) {
            return;
        }

        let ttl = self.ttl;
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            run_cleanup(&registry, &job_id).await;
        });
    }
}

/// Delete a job's artifacts and drop its registry entry.
///
/// A deletion failure is logged and does not keep the entry alive; leaking a
/// file is surfaced in logs only.
pub async fn run_cleanup(registry: &JobRegistry, job_id: &JobId) {
    let Some(job) = registry.remove(job_id) else {
        return;
    };

    let source_ok = remove_artifact(&job.source_path).await;
    let output_ok = remove_artifact(&job.output_path).await;

    if source_ok && output_ok {
        info!(job_id = %job_id, "cleaned up job artifacts");
    } else {
        warn!(job_id = %job_id, "job removed with leaked artifacts, see prior warnings");
    }
}

/// Remove a file, treating "already gone" as success.
async fn remove_artifact(path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => true,
        Err(err) if err.kind() == ErrorKind::NotFound => true,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to delete artifact");
            false
        }
    }
}
