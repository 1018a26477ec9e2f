//! Periodic batched status reconciliation.
//!
//! On its own cadence, takes a snapshot of every active submission and
//! checks them all in a single round trip. Results are correlated back
//! to jobs by scene id; unknown scene ids are dropped, so duplicate or
//! stale responses are harmless. A failed status call skips the tick
//! and leaves every job active for the next one.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use veoflow_client::api::RemoteClient;
use veoflow_client::responses::{GenerationStatus, SceneStatus};
use veoflow_client::session::SessionContext;
use veoflow_core::error::FlowError;
use veoflow_events::{EventBus, JobEvent};

use crate::registry::{JobRegistry, TerminalOutcome};

/// Periodic task that reconciles remote status into the registry.
pub struct StatusPoller {
    registry: Arc<JobRegistry>,
    client: Arc<dyn RemoteClient>,
    session: Arc<SessionContext>,
    bus: Arc<EventBus>,
    interval: Duration,
    /// Signalled when a status check fails with a batch-fatal error.
    fatal_tx: mpsc::Sender<FlowError>,
}

impl StatusPoller {
    pub fn new(
        registry: Arc<JobRegistry>,
        client: Arc<dyn RemoteClient>,
        session: Arc<SessionContext>,
        bus: Arc<EventBus>,
        interval: Duration,
        fatal_tx: mpsc::Sender<FlowError>,
    ) -> Self {
        Self {
            registry,
            client,
            session,
            bus,
            interval,
            fatal_tx,
        }
    }

    /// Run the polling loop until the cancellation token triggers.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        tracing::info!(
            interval_ms = self.interval.as_millis() as u64,
            "Status poller started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Status poller shutting down");
                    break;
                }
                _ = ticker.tick() => self.tick().await,
            }
        }
    }

    /// One cycle: one batched round trip for every active handle.
    async fn tick(&self) {
        let handles = self.registry.snapshot_active();
        if handles.is_empty() {
            return;
        }

        let results = match self.client.batch_check_status(&self.session, &handles).await {
            Ok(results) => results,
            Err(e) if e.is_fatal() => {
                tracing::error!(error = %e, "Status check failed fatally");
                let _ = self.fatal_tx.try_send(e);
                return;
            }
            Err(e) => {
                // Fail open: the jobs stay active and are re-polled on
                // the next tick.
                tracing::warn!(error = %e, "Status check failed, skipping tick");
                return;
            }
        };

        for result in results {
            self.reconcile(result);
        }
    }

    /// Apply one status result to the registry and emit events.
    fn reconcile(&self, result: SceneStatus) {
        match result.status {
            GenerationStatus::Successful => {
                let outcome = TerminalOutcome::Succeeded {
                    result_ref: result.result_ref,
                };
                match self.registry.mark_terminal(&result.scene_id, outcome) {
                    Some(job) => {
                        tracing::info!(
                            job_id = %job.id,
                            scene_id = %result.scene_id,
                            "Generation succeeded",
                        );
                        self.bus
                            .publish(JobEvent::success(job.id, "Video ready", job.result_ref));
                    }
                    None => {
                        tracing::debug!(
                            scene_id = %result.scene_id,
                            "Dropping status for unknown scene",
                        );
                    }
                }
            }
            GenerationStatus::Failed => {
                let message = result
                    .error
                    .unwrap_or_else(|| "unknown generation error".to_string());
                let outcome = TerminalOutcome::Failed {
                    error: message.clone(),
                };
                match self.registry.mark_terminal(&result.scene_id, outcome) {
                    Some(job) => {
                        tracing::warn!(
                            job_id = %job.id,
                            scene_id = %result.scene_id,
                            error = %message,
                            "Generation failed",
                        );
                        self.bus.publish(JobEvent::error(
                            job.id,
                            format!("Generation failed: {message}"),
                        ));
                    }
                    None => {
                        tracing::debug!(
                            scene_id = %result.scene_id,
                            "Dropping status for unknown scene",
                        );
                    }
                }
            }
            GenerationStatus::Pending => {}
        }
    }
}
