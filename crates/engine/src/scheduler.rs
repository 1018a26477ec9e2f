//! Bounded-concurrency submission loop.
//!
//! Claims jobs from the registry in FIFO order on a fixed cadence and
//! submits them to the remote service, never holding more than the
//! configured number of jobs in flight. Submission failures are scoped
//! to the failing job; fatal failures (missing credentials) are
//! signalled to the orchestrator for a batch-wide cutoff.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use veoflow_client::api::{GenerationParams, RemoteClient};
use veoflow_client::session::SessionContext;
use veoflow_core::error::FlowError;
use veoflow_core::types::{Job, SubmissionHandle};
use veoflow_events::{EventBus, JobEvent};

use crate::registry::JobRegistry;

/// Exclusive upper bound for request seeds.
const SEED_SPACE: u32 = 100_000;

/// Periodic task that drains the queue into the remote service.
pub struct SubmissionScheduler {
    registry: Arc<JobRegistry>,
    client: Arc<dyn RemoteClient>,
    session: Arc<SessionContext>,
    bus: Arc<EventBus>,
    project_id: String,
    params: GenerationParams,
    max_concurrent: usize,
    interval: Duration,
    /// Signalled when a submission fails with a batch-fatal error.
    fatal_tx: mpsc::Sender<FlowError>,
}

impl SubmissionScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<JobRegistry>,
        client: Arc<dyn RemoteClient>,
        session: Arc<SessionContext>,
        bus: Arc<EventBus>,
        project_id: String,
        params: GenerationParams,
        max_concurrent: usize,
        interval: Duration,
        fatal_tx: mpsc::Sender<FlowError>,
    ) -> Self {
        Self {
            registry,
            client,
            session,
            bus,
            project_id,
            params,
            max_concurrent,
            interval,
            fatal_tx,
        }
    }

    /// Run the submission loop until the cancellation token triggers.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        tracing::info!(
            max_concurrent = self.max_concurrent,
            interval_ms = self.interval.as_millis() as u64,
            "Submission scheduler started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Submission scheduler shutting down");
                    break;
                }
                _ = ticker.tick() => self.tick().await,
            }
        }
    }

    /// One cycle: claim and submit jobs until the cap or the queue
    /// stops us. A transiently empty queue is not an exit condition;
    /// the loop keeps ticking until cancelled.
    async fn tick(&self) {
        while let Some(job) = self.registry.claim_next(self.max_concurrent) {
            self.submit(job).await;
        }
    }

    async fn submit(&self, job: Job) {
        self.bus
            .publish(JobEvent::running(job.id.clone(), "Submitting generation request"));

        let seed = rand::rng().random_range(0..SEED_SPACE);
        let result = self
            .client
            .submit_job(&self.session, &self.project_id, &job.payload, seed, &self.params)
            .await;

        match result {
            Ok(submitted) => {
                tracing::info!(
                    job_id = %job.id,
                    scene_id = %submitted.scene_id,
                    "Generation request submitted",
                );
                self.registry.mark_submitted(SubmissionHandle {
                    job_id: job.id.clone(),
                    operation_name: submitted.operation_name,
                    scene_id: submitted.scene_id,
                });
                self.bus
                    .publish(JobEvent::running(job.id, "Request submitted, awaiting result"));
            }
            Err(e) => {
                tracing::error!(
                    job_id = %job.id,
                    error = %e,
                    "Failed to submit generation request",
                );
                self.registry.mark_failed(&job.id, &e.to_string());
                self.bus
                    .publish(JobEvent::error(job.id, format!("Submission failed: {e}")));
                if e.is_fatal() {
                    let _ = self.fatal_tx.try_send(e);
                }
            }
        }
    }
}
