//! Batch lifecycle orchestration.
//!
//! Ties the registry, scheduler, poller, and remote client together for
//! one batch: waits for the session to authenticate, establishes the
//! project context, runs the two periodic tasks until the registry
//! drains, and broadcasts fatal failures to every non-terminal job.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use veoflow_client::api::{GenerationParams, RemoteClient};
use veoflow_client::session::{SessionContext, SessionDriver};
use veoflow_core::error::FlowError;
use veoflow_core::types::Job;
use veoflow_events::{EventBus, JobEvent};

use crate::config::EngineConfig;
use crate::poller::StatusPoller;
use crate::registry::JobRegistry;
use crate::scheduler::SubmissionScheduler;

/// Job id used for batch-level events when the batch is empty.
const BATCH_EVENT_ID: &str = "batch";

/// Lifecycle phase of one batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPhase {
    Initializing,
    /// Blocked on the external session driver finishing login.
    AwaitingLogin,
    /// Authenticated with a usable project context.
    ProjectReady,
    /// Scheduler and poller are running.
    Running,
    /// No jobs remain queued or active.
    Drained,
    /// The session resource has been released.
    Closed,
}

/// One generation request as accepted from the caller.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub id: String,
    pub prompt: String,
}

/// Handle returned by [`Orchestrator::submit_batch`].
///
/// The batch runs on a spawned task; this handle lets callers observe
/// phase transitions, inspect job state, and await completion.
pub struct BatchHandle {
    registry: Arc<JobRegistry>,
    phase_rx: watch::Receiver<BatchPhase>,
    task: JoinHandle<()>,
}

impl BatchHandle {
    /// The batch's job registry, for state snapshots.
    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> BatchPhase {
        *self.phase_rx.borrow()
    }

    /// Watch receiver for phase transitions.
    pub fn phase_watch(&self) -> watch::Receiver<BatchPhase> {
        self.phase_rx.clone()
    }

    /// Wait for the batch to reach [`BatchPhase::Closed`].
    pub async fn wait_closed(self) {
        let _ = self.task.await;
    }
}

/// Entry point for running batches.
pub struct Orchestrator {
    config: EngineConfig,
    client: Arc<dyn RemoteClient>,
    driver: Arc<dyn SessionDriver>,
    bus: Arc<EventBus>,
    params: GenerationParams,
}

impl Orchestrator {
    pub fn new(
        config: EngineConfig,
        client: Arc<dyn RemoteClient>,
        driver: Arc<dyn SessionDriver>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            config,
            client,
            driver,
            bus,
            params: GenerationParams::default(),
        }
    }

    /// Override the generation parameters for subsequent batches.
    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    /// Accept a batch and run it to completion in the background.
    ///
    /// The only synchronous contract is acceptance: the jobs are
    /// enqueued and the lifecycle task is spawned before this returns.
    pub fn submit_batch(&self, jobs: Vec<JobSpec>) -> BatchHandle {
        let registry = Arc::new(JobRegistry::new(
            jobs.into_iter()
                .map(|spec| Job::new(spec.id, spec.prompt))
                .collect(),
        ));
        let (phase_tx, phase_rx) = watch::channel(BatchPhase::Initializing);

        let run = BatchRun {
            config: self.config.clone(),
            client: Arc::clone(&self.client),
            driver: Arc::clone(&self.driver),
            bus: Arc::clone(&self.bus),
            params: self.params.clone(),
            registry: Arc::clone(&registry),
            phase: phase_tx,
        };
        let task = tokio::spawn(run.run());

        BatchHandle {
            registry,
            phase_rx,
            task,
        }
    }
}

/// State for one spawned batch lifecycle task.
struct BatchRun {
    config: EngineConfig,
    client: Arc<dyn RemoteClient>,
    driver: Arc<dyn SessionDriver>,
    bus: Arc<EventBus>,
    params: GenerationParams,
    registry: Arc<JobRegistry>,
    phase: watch::Sender<BatchPhase>,
}

impl BatchRun {
    async fn run(self) {
        if let Err(e) = self.execute().await {
            self.abort(&e);
        }

        // Grace delay before releasing the session, so late readers can
        // still fetch transient result references.
        tokio::time::sleep(self.config.close_grace).await;
        self.driver.close().await;
        self.set_phase(BatchPhase::Closed);
        tracing::info!("Batch closed");
    }

    async fn execute(&self) -> Result<(), FlowError> {
        // --- Login ---
        let session = self.await_login().await?;

        // --- Project context ---
        let project_id = self.ensure_project(&session).await?;
        self.set_phase(BatchPhase::ProjectReady);

        // --- Scheduler and poller, until drained or fatal ---
        self.run_until_drained(Arc::new(session), project_id)
            .await?;

        self.set_phase(BatchPhase::Drained);
        let batch_id = self
            .registry
            .first_job_id()
            .unwrap_or_else(|| BATCH_EVENT_ID.to_string());
        self.bus
            .publish(JobEvent::success(batch_id, "All jobs processed", None));
        tracing::info!("Batch drained");
        Ok(())
    }

    async fn await_login(&self) -> Result<SessionContext, FlowError> {
        if self.driver.is_authenticated().await {
            return self.driver.wait_authenticated().await;
        }

        self.set_phase(BatchPhase::AwaitingLogin);
        tracing::info!(
            timeout_secs = self.config.login_timeout.as_secs(),
            "Waiting for login",
        );
        tokio::time::timeout(self.config.login_timeout, self.driver.wait_authenticated())
            .await
            .map_err(|_| FlowError::Timeout("login wait expired".into()))?
    }

    /// Reuse the session's project or create a new one. Any failure
    /// here is fatal for the batch.
    async fn ensure_project(&self, session: &SessionContext) -> Result<String, FlowError> {
        if let Some(project_id) = &session.project_id {
            tracing::info!(project_id = %project_id, "Reusing existing project");
            return Ok(project_id.clone());
        }

        let title = format!(
            "Veo Project Auto - {}",
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S")
        );
        self.client
            .create_project(session, &title)
            .await
            .map_err(|e| FlowError::Fatal(format!("could not create project: {e}")))
    }

    /// Spawn the two periodic tasks and wait for drain or a fatal error.
    /// Both tasks are stopped before returning, either way.
    async fn run_until_drained(
        &self,
        session: Arc<SessionContext>,
        project_id: String,
    ) -> Result<(), FlowError> {
        self.set_phase(BatchPhase::Running);

        let cancel = CancellationToken::new();
        let (fatal_tx, mut fatal_rx) = mpsc::channel::<FlowError>(1);

        let scheduler = SubmissionScheduler::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.client),
            Arc::clone(&session),
            Arc::clone(&self.bus),
            project_id,
            self.params.clone(),
            self.config.max_concurrent,
            self.config.submit_interval,
            fatal_tx.clone(),
        );
        let poller = StatusPoller::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.client),
            session,
            Arc::clone(&self.bus),
            self.config.poll_interval,
            fatal_tx,
        );

        let scheduler_task = tokio::spawn(scheduler.run(cancel.child_token()));
        let poller_task = tokio::spawn(poller.run(cancel.child_token()));

        // A fatal signal racing with the drain it caused must win, so
        // the batch is reported aborted rather than completed.
        let result = tokio::select! {
            biased;
            Some(error) = fatal_rx.recv() => Err(error),
            _ = self.registry.wait_drained() => Ok(()),
        };

        cancel.cancel();
        let _ = scheduler_task.await;
        let _ = poller_task.await;
        result
    }

    /// Broadcast a fatal error to every non-terminal job.
    fn abort(&self, error: &FlowError) {
        tracing::error!(error = %error, "Batch aborted");
        let message = error.to_string();
        for job_id in self.registry.fail_all(&message) {
            self.bus.publish(JobEvent::error(job_id, message.clone()));
        }
    }

    fn set_phase(&self, phase: BatchPhase) {
        let _ = self.phase.send(phase);
    }
}
