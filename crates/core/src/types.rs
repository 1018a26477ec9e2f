//! Job lifecycle types shared by the client and the engine.

use serde::{Deserialize, Serialize};

/// Caller-supplied job identifier, unique within a batch.
pub type JobId = String;

/// Server-assigned correlation key joining a submitted job to its
/// status-check results.
pub type SceneId = String;

/// Lifecycle state of a single generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting in the submission queue.
    Queued,
    /// Dequeued; the submission call is in flight.
    Submitted,
    /// Accepted by the remote service; awaiting a terminal status.
    Active,
    /// Generation finished and a result reference is available.
    Succeeded,
    /// Submission or generation failed.
    Failed,
}

impl JobStatus {
    /// Whether the job will not change state again.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

/// One content-generation request with its lifecycle state.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: JobId,
    /// Prompt text sent to the generation service.
    pub payload: String,
    pub status: JobStatus,
    /// Serving URI of the generated video, set on success.
    pub result_ref: Option<String>,
    /// Human-readable failure reason, set on failure.
    pub error_message: Option<String>,
}

impl Job {
    /// Create a queued job from an id and prompt payload.
    pub fn new(id: impl Into<JobId>, payload: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            payload: payload.into(),
            status: JobStatus::Queued,
            result_ref: None,
            error_message: None,
        }
    }
}

/// Handle produced by a successful submission.
///
/// `scene_id` is unique among currently-active jobs; the poller uses it
/// to correlate batched status results back to jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionHandle {
    pub job_id: JobId,
    /// Opaque server-side reference to the in-flight operation.
    pub operation_name: String,
    pub scene_id: SceneId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Submitted.is_terminal());
        assert!(!JobStatus::Active.is_terminal());
    }

    #[test]
    fn new_job_starts_queued() {
        let job = Job::new("j1", "a prompt");
        assert_eq!(job.status, JobStatus::Queued);
        assert!(job.result_ref.is_none());
        assert!(job.error_message.is_none());
    }
}
