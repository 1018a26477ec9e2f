//! Batch orchestration engine.
//!
//! Coordinates two independently-paced periodic tasks, the
//! [`scheduler::SubmissionScheduler`] and the [`poller::StatusPoller`],
//! against the shared [`registry::JobRegistry`]. The
//! [`orchestrator::Orchestrator`] owns the batch lifecycle: login wait,
//! project context, drain detection, and the global failure cutoff.

pub mod config;
pub mod orchestrator;
pub mod poller;
pub mod registry;
pub mod scheduler;

pub use config::EngineConfig;
pub use orchestrator::{BatchHandle, BatchPhase, JobSpec, Orchestrator};
