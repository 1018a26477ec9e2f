//! Batch runner: reads prompts from a JSON file and drives one Flow
//! generation batch from the command line.
//!
//! Credentials come from the environment (`FLOW_COOKIE`,
//! `FLOW_BEARER_TOKEN`, optional `FLOW_PROJECT_ID`), typically via a
//! `.env` file. The prompt file is a JSON array of `{id?, prompt}`
//! objects; ids default to fresh UUIDs.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use veoflow_client::api::{FlowClient, GenerationParams};
use veoflow_client::session::{SessionContext, SessionDriver};
use veoflow_core::error::FlowError;
use veoflow_core::types::JobStatus;
use veoflow_engine::{EngineConfig, JobSpec, Orchestrator};
use veoflow_events::{EventBus, EventStatus};

/// One prompt entry in the input file.
#[derive(Debug, Deserialize)]
struct PromptSpec {
    /// Optional stable id; a UUID is generated when absent.
    id: Option<String>,
    prompt: String,
}

/// Session driver for non-interactive runs: credentials come from the
/// environment, so the session is authenticated iff a cookie is set.
struct EnvSession {
    context: SessionContext,
}

#[async_trait::async_trait]
impl SessionDriver for EnvSession {
    async fn is_authenticated(&self) -> bool {
        !self.context.cookie.is_empty()
    }

    async fn wait_authenticated(&self) -> Result<SessionContext, FlowError> {
        // There is no interactive login to wait for; an empty cookie
        // can only be fixed by restarting with FLOW_COOKIE set.
        if self.context.cookie.is_empty() {
            return Err(FlowError::Auth("FLOW_COOKIE is not set".into()));
        }
        Ok(self.context.clone())
    }

    async fn close(&self) {
        tracing::debug!("Session released");
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "veoflow_runner=info,veoflow_engine=info,veoflow_client=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run().await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!(error = %e, "Runner failed");
            ExitCode::FAILURE
        }
    }
}

/// Run one batch; returns whether every job succeeded.
async fn run() -> Result<bool> {
    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .context("usage: veoflow-runner <prompts.json>")?;

    let specs = load_prompts(&path)?;
    if specs.is_empty() {
        bail!("prompt file {} contains no prompts", path.display());
    }
    tracing::info!(count = specs.len(), file = %path.display(), "Loaded prompts");

    // --- Session from environment ---
    let cookie = std::env::var("FLOW_COOKIE").unwrap_or_default();
    let mut context = SessionContext::new(cookie);
    if let Ok(token) = std::env::var("FLOW_BEARER_TOKEN") {
        context = context.with_bearer_token(token);
    }
    if let Ok(project_id) = std::env::var("FLOW_PROJECT_ID") {
        context = context.with_project_id(project_id);
    }

    // --- Generation parameters ---
    let mut params = GenerationParams::default();
    if let Ok(model_key) = std::env::var("FLOW_MODEL_KEY") {
        params.model_key = model_key;
    }
    if let Ok(aspect_ratio) = std::env::var("FLOW_ASPECT_RATIO") {
        params.aspect_ratio = aspect_ratio;
    }

    // --- Engine ---
    let config = EngineConfig::from_env();
    let bus = Arc::new(EventBus::default());
    let orchestrator = Orchestrator::new(
        config,
        Arc::new(FlowClient::new()),
        Arc::new(EnvSession { context }),
        Arc::clone(&bus),
    )
    .with_params(params);

    // --- Event logging ---
    let mut events = bus.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event.status {
                EventStatus::Running => {
                    tracing::info!(job_id = %event.job_id, "{}", event.message);
                }
                EventStatus::Success => {
                    tracing::info!(
                        job_id = %event.job_id,
                        result_ref = event.result_ref.as_deref().unwrap_or("-"),
                        "{}",
                        event.message,
                    );
                }
                EventStatus::Error => {
                    tracing::error!(job_id = %event.job_id, "{}", event.message);
                }
            }
        }
    });

    // --- Run the batch to completion ---
    let handle = orchestrator.submit_batch(
        specs
            .into_iter()
            .map(|spec| JobSpec {
                id: spec.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
                prompt: spec.prompt,
            })
            .collect(),
    );
    let registry = Arc::clone(handle.registry());
    handle.wait_closed().await;

    let jobs = registry.jobs();
    let failed = jobs
        .iter()
        .filter(|job| job.status == JobStatus::Failed)
        .count();
    tracing::info!(total = jobs.len(), failed, "Batch finished");
    Ok(failed == 0)
}

fn load_prompts(path: &Path) -> Result<Vec<PromptSpec>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("could not read prompt file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("could not parse prompt file {}", path.display()))
}
