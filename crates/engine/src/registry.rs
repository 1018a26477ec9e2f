//! Canonical owner of every job's state for one batch.
//!
//! The registry holds the FIFO queue of unsubmitted jobs, the set of
//! active submissions keyed by scene id, and the job table itself. The
//! scheduler and the poller mutate it concurrently; every operation is
//! a short critical section behind one mutex, so transitions are
//! linearizable: no lost updates, no duplicate terminal transitions.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use tokio::sync::Notify;
use veoflow_core::types::{Job, JobId, JobStatus, SceneId, SubmissionHandle};

/// Outcome of a terminal status reconciliation.
#[derive(Debug, Clone)]
pub enum TerminalOutcome {
    /// Generation finished; carries the serving URI when present.
    Succeeded { result_ref: Option<String> },
    /// Generation failed with a remote error message.
    Failed { error: String },
}

/// Shared, mutex-guarded job state for one batch.
pub struct JobRegistry {
    inner: Mutex<RegistryInner>,
    /// Notified whenever a transition may have drained the batch.
    drained: Notify,
}

struct RegistryInner {
    /// Job table; owns the canonical [`Job`] for every id.
    jobs: HashMap<JobId, Job>,
    /// Job ids in enqueue order (stable iteration for events/snapshots).
    order: Vec<JobId>,
    /// FIFO queue of not-yet-submitted job ids.
    queue: VecDeque<JobId>,
    /// Active submissions keyed by scene id.
    active: HashMap<SceneId, SubmissionHandle>,
    /// Jobs dequeued whose submission call is still in flight.
    in_flight: usize,
}

impl JobRegistry {
    /// Create a registry pre-loaded with a batch of queued jobs.
    pub fn new(jobs: Vec<Job>) -> Self {
        let registry = Self {
            inner: Mutex::new(RegistryInner {
                jobs: HashMap::new(),
                order: Vec::new(),
                queue: VecDeque::new(),
                active: HashMap::new(),
                in_flight: 0,
            }),
            drained: Notify::new(),
        };
        for job in jobs {
            registry.enqueue(job);
        }
        registry
    }

    /// Append a job to the submission queue.
    pub fn enqueue(&self, job: Job) {
        let mut inner = self.lock();
        if inner.jobs.contains_key(&job.id) {
            tracing::warn!(job_id = %job.id, "Ignoring duplicate job id");
            return;
        }
        inner.order.push(job.id.clone());
        inner.queue.push_back(job.id.clone());
        inner.jobs.insert(job.id.clone(), job);
    }

    /// Atomically dequeue the next job when under the concurrency cap.
    ///
    /// The claimed job moves to [`JobStatus::Submitted`] and counts
    /// toward the cap until [`mark_submitted`](Self::mark_submitted) or
    /// [`mark_failed`](Self::mark_failed) resolves it, so the cap holds
    /// across the submission call's suspension point.
    pub fn claim_next(&self, max_concurrent: usize) -> Option<Job> {
        let mut inner = self.lock();
        if inner.active.len() + inner.in_flight >= max_concurrent {
            return None;
        }
        let id = inner.queue.pop_front()?;
        let job = inner.jobs.get_mut(&id)?;
        job.status = JobStatus::Submitted;
        let claimed = job.clone();
        inner.in_flight += 1;
        Some(claimed)
    }

    /// Record a successful submission: the job becomes active and its
    /// handle joins the active set.
    pub fn mark_submitted(&self, handle: SubmissionHandle) {
        let mut inner = self.lock();
        inner.in_flight = inner.in_flight.saturating_sub(1);
        if let Some(job) = inner.jobs.get_mut(&handle.job_id) {
            job.status = JobStatus::Active;
        }
        inner.active.insert(handle.scene_id.clone(), handle);
    }

    /// Fail a job that never reached the active set (submission error).
    pub fn mark_failed(&self, job_id: &str, error: &str) {
        let mut inner = self.lock();
        inner.in_flight = inner.in_flight.saturating_sub(1);
        if let Some(job) = inner.jobs.get_mut(job_id) {
            job.status = JobStatus::Failed;
            job.error_message = Some(error.to_string());
        }
        drop(inner);
        self.notify_if_drained();
    }

    /// Reconcile a terminal status for an active scene.
    ///
    /// Returns the updated job when the scene was active, `None` for
    /// unknown scene ids: stale or duplicate responses are dropped
    /// without touching the registry.
    pub fn mark_terminal(&self, scene_id: &str, outcome: TerminalOutcome) -> Option<Job> {
        let mut inner = self.lock();
        let handle = inner.active.remove(scene_id)?;
        let job = inner.jobs.get_mut(&handle.job_id)?;
        match outcome {
            TerminalOutcome::Succeeded { result_ref } => {
                job.status = JobStatus::Succeeded;
                job.result_ref = result_ref;
            }
            TerminalOutcome::Failed { error } => {
                job.status = JobStatus::Failed;
                job.error_message = Some(error);
            }
        }
        let updated = job.clone();
        drop(inner);
        self.notify_if_drained();
        Some(updated)
    }

    /// Global cutoff: every job not yet terminal becomes `Failed`.
    ///
    /// Returns the affected ids in enqueue order so the caller can emit
    /// one event per job.
    pub fn fail_all(&self, reason: &str) -> Vec<JobId> {
        let mut inner = self.lock();
        inner.queue.clear();
        inner.active.clear();
        inner.in_flight = 0;

        let ids = inner.order.clone();
        let mut affected = Vec::new();
        for id in ids {
            if let Some(job) = inner.jobs.get_mut(&id) {
                if !job.status.is_terminal() {
                    job.status = JobStatus::Failed;
                    job.error_message = Some(reason.to_string());
                    affected.push(id);
                }
            }
        }
        drop(inner);
        self.drained.notify_waiters();
        affected
    }

    /// Snapshot of every active submission handle.
    pub fn snapshot_active(&self) -> Vec<SubmissionHandle> {
        self.lock().active.values().cloned().collect()
    }

    /// True iff no jobs remain queued, in flight, or active.
    pub fn is_drained(&self) -> bool {
        let inner = self.lock();
        inner.queue.is_empty() && inner.active.is_empty() && inner.in_flight == 0
    }

    /// Resolve once the batch is drained.
    pub async fn wait_drained(&self) {
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            // Register the waiter before re-checking, so a notification
            // racing with the check is not lost.
            notified.as_mut().enable();
            if self.is_drained() {
                return;
            }
            notified.await;
        }
    }

    /// Snapshot of a single job.
    pub fn job(&self, id: &str) -> Option<Job> {
        self.lock().jobs.get(id).cloned()
    }

    /// Snapshot of every job in enqueue order.
    pub fn jobs(&self) -> Vec<Job> {
        let inner = self.lock();
        inner
            .order
            .iter()
            .filter_map(|id| inner.jobs.get(id).cloned())
            .collect()
    }

    /// Number of jobs currently counted against the concurrency cap.
    pub fn active_len(&self) -> usize {
        let inner = self.lock();
        inner.active.len() + inner.in_flight
    }

    /// Number of jobs still waiting in the queue.
    pub fn queued_len(&self) -> usize {
        self.lock().queue.len()
    }

    /// First job id in enqueue order, used for batch-level events.
    pub fn first_job_id(&self) -> Option<JobId> {
        self.lock().order.first().cloned()
    }

    // ---- private helpers ----

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().expect("registry mutex poisoned")
    }

    fn notify_if_drained(&self) {
        if self.is_drained() {
            self.drained.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(job_id: &str, scene_id: &str) -> SubmissionHandle {
        SubmissionHandle {
            job_id: job_id.into(),
            operation_name: format!("ops/{scene_id}"),
            scene_id: scene_id.into(),
        }
    }

    fn batch(n: usize) -> JobRegistry {
        JobRegistry::new(
            (1..=n)
                .map(|i| Job::new(format!("j{i}"), format!("prompt {i}")))
                .collect(),
        )
    }

    #[test]
    fn claim_respects_the_concurrency_cap() {
        let registry = batch(7);

        for _ in 0..5 {
            assert!(registry.claim_next(5).is_some());
        }
        assert!(registry.claim_next(5).is_none());
        assert_eq!(registry.active_len(), 5);
        assert_eq!(registry.queued_len(), 2);
    }

    #[test]
    fn claim_is_fifo() {
        let registry = batch(3);
        let first = registry.claim_next(5).unwrap();
        let second = registry.claim_next(5).unwrap();
        let third = registry.claim_next(5).unwrap();
        assert_eq!(first.id, "j1");
        assert_eq!(second.id, "j2");
        assert_eq!(third.id, "j3");
    }

    #[test]
    fn in_flight_submissions_count_toward_the_cap() {
        let registry = batch(3);

        let job = registry.claim_next(1).unwrap();
        // The submission call for j1 has not resolved yet.
        assert!(registry.claim_next(1).is_none());

        registry.mark_submitted(handle(&job.id, "s-1"));
        // Still at the cap: the job is now active instead of in flight.
        assert!(registry.claim_next(1).is_none());

        registry.mark_terminal(
            "s-1",
            TerminalOutcome::Succeeded { result_ref: None },
        );
        assert!(registry.claim_next(1).is_some());
    }

    #[test]
    fn successful_lifecycle_attaches_result_ref() {
        let registry = batch(1);
        let job = registry.claim_next(5).unwrap();
        assert_eq!(job.status, JobStatus::Submitted);

        registry.mark_submitted(handle("j1", "s-1"));
        assert_eq!(registry.job("j1").unwrap().status, JobStatus::Active);

        let updated = registry
            .mark_terminal(
                "s-1",
                TerminalOutcome::Succeeded {
                    result_ref: Some("r1".into()),
                },
            )
            .unwrap();
        assert_eq!(updated.status, JobStatus::Succeeded);
        assert_eq!(updated.result_ref.as_deref(), Some("r1"));
        assert!(registry.is_drained());
    }

    #[test]
    fn unknown_scene_ids_are_dropped_without_mutation() {
        let registry = batch(1);
        registry.claim_next(5).unwrap();
        registry.mark_submitted(handle("j1", "s-1"));

        let result = registry.mark_terminal(
            "bogus",
            TerminalOutcome::Failed {
                error: "late response".into(),
            },
        );
        assert!(result.is_none());
        assert_eq!(registry.job("j1").unwrap().status, JobStatus::Active);
        assert_eq!(registry.snapshot_active().len(), 1);
    }

    #[test]
    fn duplicate_terminal_transitions_are_rejected() {
        let registry = batch(1);
        registry.claim_next(5).unwrap();
        registry.mark_submitted(handle("j1", "s-1"));

        let first = registry.mark_terminal(
            "s-1",
            TerminalOutcome::Succeeded {
                result_ref: Some("r1".into()),
            },
        );
        assert!(first.is_some());

        // A duplicate (late) response for the same scene is a no-op.
        let second = registry.mark_terminal(
            "s-1",
            TerminalOutcome::Failed {
                error: "stale".into(),
            },
        );
        assert!(second.is_none());
        assert_eq!(registry.job("j1").unwrap().status, JobStatus::Succeeded);
    }

    #[test]
    fn submission_failure_frees_the_slot() {
        let registry = batch(2);
        let job = registry.claim_next(1).unwrap();
        registry.mark_failed(&job.id, "Protocol error: missing sceneId");

        let failed = registry.job("j1").unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert!(failed.error_message.unwrap().contains("Protocol error"));

        // The slot is free again for the next job.
        assert_eq!(registry.claim_next(1).unwrap().id, "j2");
    }

    #[test]
    fn fail_all_spares_terminal_jobs() {
        let registry = batch(3);
        registry.claim_next(5).unwrap();
        registry.mark_submitted(handle("j1", "s-1"));
        registry.mark_terminal(
            "s-1",
            TerminalOutcome::Succeeded {
                result_ref: Some("r1".into()),
            },
        );

        let affected = registry.fail_all("login wait expired");
        assert_eq!(affected, vec!["j2".to_string(), "j3".to_string()]);
        assert_eq!(registry.job("j1").unwrap().status, JobStatus::Succeeded);
        assert_eq!(registry.job("j2").unwrap().status, JobStatus::Failed);
        assert_eq!(registry.job("j3").unwrap().status, JobStatus::Failed);
        assert!(registry.is_drained());
    }

    #[test]
    fn drained_only_when_queue_active_and_in_flight_are_empty() {
        let registry = batch(1);
        assert!(!registry.is_drained());

        registry.claim_next(5).unwrap();
        assert!(!registry.is_drained());

        registry.mark_submitted(handle("j1", "s-1"));
        assert!(!registry.is_drained());

        registry.mark_terminal(
            "s-1",
            TerminalOutcome::Succeeded { result_ref: None },
        );
        assert!(registry.is_drained());
    }

    #[tokio::test]
    async fn wait_drained_resolves_on_the_final_transition() {
        let registry = std::sync::Arc::new(batch(1));
        registry.claim_next(5).unwrap();
        registry.mark_submitted(handle("j1", "s-1"));

        let waiter = {
            let registry = std::sync::Arc::clone(&registry);
            tokio::spawn(async move { registry.wait_drained().await })
        };

        registry.mark_terminal(
            "s-1",
            TerminalOutcome::Succeeded { result_ref: None },
        );
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn wait_drained_resolves_immediately_for_an_empty_batch() {
        let registry = JobRegistry::new(Vec::new());
        registry.wait_drained().await;
    }
}
