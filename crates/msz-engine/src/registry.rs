//! Synchronized job store and transition API.
//!
//! The registry is the single synchronization point guarding all job
//! mutation. Every other component reads cloned snapshots and mutates only
//! through `transition`. The lock is a plain mutex held for map operations
//! only, never across an await point.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::Utc;
use tracing::debug;

use msz_models::{pricing, Job, JobId, JobStatus, Provider, Upsells};

use crate::error::{EngineError, EngineResult};

/// What the upload receiver gets back from `create`.
#[derive(Debug, Clone)]
pub struct JobTicket {
    pub job_id: JobId,
    pub size_bytes: u64,
    pub duration_sec: u32,
    pub tier: u8,
    pub price: f64,
    pub target_size_mb: u64,
}

/// Outcome of a payment confirmation.
///
/// Only `Started` carries the obligation to spawn a compression task; the
/// compare-and-swap inside `confirm_paid` hands it to exactly one caller.
#[derive(Debug, Clone)]
pub enum Confirmed {
    /// This call won the queued -> processing swap
    Started(Job),
    /// The job was already past queued; idempotent no-op
    AlreadyPaid(Job),
}

impl Confirmed {
    pub fn job(&self) -> &Job {
        match self {
            Confirmed::Started(job) | Confirmed::AlreadyPaid(job) => job,
        }
    }
}

/// Field updates applied atomically with a status change.
#[derive(Debug, Clone, Default)]
pub struct StageUpdate {
    pub progress_pct: Option<u8>,
    pub message: Option<String>,
    pub download_token: Option<String>,
    pub error: Option<String>,
}

impl StageUpdate {
    pub fn progress(pct: u8, message: impl Into<String>) -> Self {
        Self {
            progress_pct: Some(pct),
            message: Some(message.into()),
            ..Default::default()
        }
    }
}

/// In-memory store of jobs, process-lifetime-scoped.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<JobId, Job>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Price an upload and insert it as a queued job.
    pub fn create(
        &self,
        source_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
        size_bytes: u64,
        duration_sec: u32,
        provider: Provider,
    ) -> EngineResult<JobTicket> {
        let quote = pricing::quote(size_bytes, duration_sec, provider, Upsells::default())?;

        let job = Job::new(
            source_path,
            output_path,
            size_bytes,
            duration_sec,
            provider,
            quote.tier,
            quote.price,
        );
        let ticket = JobTicket {
            job_id: job.id.clone(),
            size_bytes,
            duration_sec,
            tier: quote.tier,
            price: quote.price,
            target_size_mb: provider.target_size_mb(),
        };

        debug!(job_id = %job.id, tier = quote.tier, price = quote.price, "job created");
        self.jobs
            .lock()
            .expect("registry lock poisoned")
            .insert(job.id.clone(), job);

        Ok(ticket)
    }

    /// Confirm payment: compare-and-swap queued -> processing.
    ///
    /// The first confirmation fixes upsells, email and the final price, and
    /// returns `Started`. Concurrent or repeated confirmations observe a job
    /// already past queued and get `AlreadyPaid` back unchanged, so at most
    /// one compression task is ever spawned per job.
    pub fn confirm_paid(
        &self,
        job_id: &JobId,
        upsells: Upsells,
        email: Option<String>,
    ) -> EngineResult<Confirmed> {
        let mut jobs = self.jobs.lock().expect("registry lock poisoned");
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| EngineError::not_found(job_id))?;

        if job.status != JobStatus::Queued {
            return Ok(Confirmed::AlreadyPaid(job.clone()));
        }

        job.upsells = upsells;
        job.email = email.filter(|e| !e.trim().is_empty());
        job.price = pricing::price_for(job.provider, job.tier, upsells);
        job.paid_at = Some(Utc::now());
        job.status = JobStatus::Processing;
        job.progress_pct = 0;
        job.message = "Payment confirmed".to_string();

        Ok(Confirmed::Started(job.clone()))
    }

    /// Apply a validated status transition together with its field updates.
    ///
    /// Status, progress and message always change together under the lock,
    /// so subscribers never observe an inconsistent pair. Progress is clamped
    /// monotone non-decreasing.
    pub fn transition(
        &self,
        job_id: &JobId,
        new_status: JobStatus,
        update: StageUpdate,
    ) -> EngineResult<Job> {
        let mut jobs = self.jobs.lock().expect("registry lock poisoned");
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| EngineError::not_found(job_id))?;

        if !job.status.can_transition(new_status) {
            return Err(EngineError::InvalidTransition {
                from: job.status,
                to: new_status,
            });
        }

        job.status = new_status;
        if let Some(pct) = update.progress_pct {
            job.progress_pct = job.progress_pct.max(pct.min(100));
        }
        if let Some(message) = update.message {
            job.message = message;
        }

        match new_status {
            JobStatus::Done => {
                job.download_token = update.download_token;
                job.progress_pct = 100;
                job.completed_at = Some(Utc::now());
            }
            JobStatus::Error => {
                job.error = update.error;
                job.download_token = None;
                job.completed_at = Some(Utc::now());
            }
            _ => {}
        }

        Ok(job.clone())
    }

    /// Snapshot a job.
    pub fn get(&self, job_id: &JobId) -> Option<Job> {
        self.jobs
            .lock()
            .expect("registry lock poisoned")
            .get(job_id)
            .cloned()
    }

    /// Remove a job. Reserved for the cleanup scheduler.
    pub fn remove(&self, job_id: &JobId) -> Option<Job> {
        self.jobs
            .lock()
            .expect("registry lock poisoned")
            .remove(job_id)
    }

    /// Flip the cleanup guard. Returns false when the job is unknown or
    /// cleanup was already scheduled, making double-scheduling a no-op.
    pub fn mark_cleanup_scheduled(&self, job_id: &JobId) -> bool {
        let mut jobs = self.jobs.lock().expect("registry lock poisoned");
        match jobs.get_mut(job_id) {
            Some(job) if !job.cleanup_scheduled => {
                job.cleanup_scheduled = true;
                true
            }
            _ => false,
        }
    }

    /// Number of live jobs.
    pub fn len(&self) -> usize {
        self.jobs.lock().expect("registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const MB: u64 = 1024 * 1024;

    fn registry_with_job() -> (JobRegistry, JobId) {
        let registry = JobRegistry::new();
        let ticket = registry
            .create("in.mp4", "out.mp4", 400 * MB, 480, Provider::Gmail)
            .unwrap();
        (registry, ticket.job_id)
    }

    #[test]
    fn create_prices_and_queues() {
        let (registry, job_id) = registry_with_job();
        let job = registry.get(&job_id).unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.tier, 2);
        // gmail tier 2, no upsells: 2.99 * 1.10 = 3.29
        assert!((job.price - 3.29).abs() < 1e-9);
    }

    #[test]
    fn create_rejects_oversized_input_without_inserting() {
        let registry = JobRegistry::new();
        let err = registry
            .create("in.mp4", "out.mp4", 2100 * MB, 60, Provider::Gmail)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
        assert!(registry.is_empty());
    }

    #[test]
    fn confirm_paid_fixes_price_and_is_idempotent() {
        let (registry, job_id) = registry_with_job();
        let upsells = Upsells {
            priority: true,
            transcript: false,
        };

        let first = registry
            .confirm_paid(&job_id, upsells, Some("a@b.com".to_string()))
            .unwrap();
        let Confirmed::Started(job) = first else {
            panic!("first confirmation must start the job");
        };
        assert_eq!(job.status, JobStatus::Processing);
        // (2.99 + 0.75) * 1.10 = 4.11
        assert!((job.price - 4.11).abs() < 1e-9);
        assert!(job.paid_at.is_some());

        // Second confirmation with different upsells changes nothing
        let second = registry
            .confirm_paid(&job_id, Upsells::default(), None)
            .unwrap();
        let Confirmed::AlreadyPaid(job) = second else {
            panic!("repeat confirmation must be a no-op");
        };
        assert!((job.price - 4.11).abs() < 1e-9);
        assert_eq!(job.email.as_deref(), Some("a@b.com"));
    }

    #[tokio::test]
    async fn concurrent_confirmations_start_exactly_once() {
        let (registry, job_id) = registry_with_job();
        let registry = Arc::new(registry);

        let mut handles = Vec::new();
        for _ in 0..32 {
            let registry = Arc::clone(&registry);
            let job_id = job_id.clone();
            handles.push(tokio::spawn(async move {
                registry.confirm_paid(&job_id, Upsells::default(), None)
            }));
        }

        let mut started = 0;
        for handle in handles {
            if let Confirmed::Started(_) = handle.await.unwrap().unwrap() {
                started += 1;
            }
        }
        assert_eq!(started, 1);
    }

    #[test]
    fn transition_rejects_illegal_moves() {
        let (registry, job_id) = registry_with_job();

        let err = registry
            .transition(&job_id, JobStatus::Compressing, StageUpdate::default())
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));

        registry
            .confirm_paid(&job_id, Upsells::default(), None)
            .unwrap();
        registry
            .transition(&job_id, JobStatus::Error, StageUpdate::default())
            .unwrap();

        // terminal: nothing moves anymore
        let err = registry
            .transition(&job_id, JobStatus::Processing, StageUpdate::default())
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));
    }

    #[test]
    fn progress_is_monotone_within_a_stage() {
        let (registry, job_id) = registry_with_job();
        registry
            .confirm_paid(&job_id, Upsells::default(), None)
            .unwrap();
        registry
            .transition(
                &job_id,
                JobStatus::Compressing,
                StageUpdate::progress(40, "halfway"),
            )
            .unwrap();

        let job = registry
            .transition(
                &job_id,
                JobStatus::Compressing,
                StageUpdate::progress(20, "stale tick"),
            )
            .unwrap();
        assert_eq!(job.progress_pct, 40);
    }

    #[test]
    fn done_sets_token_and_completion_timestamp() {
        let (registry, job_id) = registry_with_job();
        registry
            .confirm_paid(&job_id, Upsells::default(), None)
            .unwrap();
        registry
            .transition(&job_id, JobStatus::Compressing, StageUpdate::default())
            .unwrap();
        registry
            .transition(&job_id, JobStatus::Finalizing, StageUpdate::default())
            .unwrap();

        let job = registry
            .transition(
                &job_id,
                JobStatus::Done,
                StageUpdate {
                    download_token: Some("tok".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(job.progress_pct, 100);
        assert_eq!(job.download_token.as_deref(), Some("tok"));
        assert!(job.completed_at.is_some());
        assert!(job.download_url().is_some());
    }

    #[test]
    fn cleanup_guard_flips_once() {
        let (registry, job_id) = registry_with_job();
        assert!(registry.mark_cleanup_scheduled(&job_id));
        assert!(!registry.mark_cleanup_scheduled(&job_id));
        assert!(!registry.mark_cleanup_scheduled(&JobId::new()));
    }
}
