//! Wire-format types for the Flow service.
//!
//! Request bodies are assembled with `serde_json::json!` in the client;
//! this module types the response envelopes and the status vocabulary.
//! Every field the server may omit is an `Option` -- missing required
//! fields are turned into protocol errors (or dropped results) by the
//! callers, never into deserialization failures.

use serde::Deserialize;

// ---------------------------------------------------------------------------
// Status vocabulary
// ---------------------------------------------------------------------------

/// Generation lifecycle states reported by the batched status endpoint.
///
/// The server's vocabulary is open-ended; anything that is not an
/// explicit success or failure counts as still pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationStatus {
    Successful,
    Failed,
    Pending,
}

impl GenerationStatus {
    /// Map the server's `MEDIA_GENERATION_STATUS_*` strings.
    pub fn from_wire(raw: &str) -> Self {
        match raw {
            "MEDIA_GENERATION_STATUS_SUCCESSFUL" => Self::Successful,
            "MEDIA_GENERATION_STATUS_FAILED" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

// ---------------------------------------------------------------------------
// Project creation (trpc envelope)
// ---------------------------------------------------------------------------

/// Response body of the trpc `project.createProject` call.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateProjectEnvelope {
    pub result: Option<TrpcResult>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrpcResult {
    pub data: Option<TrpcData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrpcData {
    pub json: Option<TrpcJson>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrpcJson {
    pub result: Option<ProjectResult>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectResult {
    #[serde(rename = "projectId")]
    pub project_id: Option<String>,
}

impl CreateProjectEnvelope {
    /// Extract the project id from the nested trpc envelope.
    pub fn project_id(self) -> Option<String> {
        self.result?.data?.json?.result?.project_id
    }
}

// ---------------------------------------------------------------------------
// Submission response
// ---------------------------------------------------------------------------

/// Response body of `video:batchAsyncGenerateVideoText`.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitEnvelope {
    #[serde(default)]
    pub operations: Vec<SubmitOperation>,
}

/// One accepted request inside a submission response.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitOperation {
    pub operation: Option<OperationRef>,
    #[serde(rename = "sceneId")]
    pub scene_id: Option<String>,
}

/// Named reference to a server-side async operation.
#[derive(Debug, Clone, Deserialize)]
pub struct OperationRef {
    pub name: Option<String>,
}

// ---------------------------------------------------------------------------
// Batched status response
// ---------------------------------------------------------------------------

/// Response body of `video:batchCheckAsyncVideoGenerationStatus`.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusEnvelope {
    #[serde(default)]
    pub operations: Vec<OperationStatus>,
}

/// One per-operation entry in a batched status response.
#[derive(Debug, Clone, Deserialize)]
pub struct OperationStatus {
    pub operation: Option<StatusOperation>,
    pub status: Option<String>,
    pub error: Option<StatusError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusOperation {
    pub metadata: Option<StatusMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusMetadata {
    #[serde(rename = "sceneId")]
    pub scene_id: Option<String>,
    pub video: Option<VideoRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VideoRef {
    #[serde(rename = "servingBaseUri")]
    pub serving_base_uri: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusError {
    pub message: Option<String>,
}

/// One reconciled status result, keyed by scene id.
#[derive(Debug, Clone)]
pub struct SceneStatus {
    pub scene_id: String,
    pub status: GenerationStatus,
    /// Serving URI of the finished video, present on success.
    pub result_ref: Option<String>,
    /// Remote failure message, present on failure.
    pub error: Option<String>,
}

impl OperationStatus {
    /// Flatten the nested envelope entry into a [`SceneStatus`].
    ///
    /// Returns `None` when the entry carries no scene id; such entries
    /// cannot be correlated to a job and are dropped.
    pub fn into_scene_status(self) -> Option<SceneStatus> {
        let scene_id = self
            .operation
            .as_ref()?
            .metadata
            .as_ref()?
            .scene_id
            .clone()?;
        let status = GenerationStatus::from_wire(self.status.as_deref().unwrap_or(""));
        let result_ref = self
            .operation
            .and_then(|op| op.metadata)
            .and_then(|meta| meta.video)
            .and_then(|video| video.serving_base_uri);
        let error = self.error.and_then(|err| err.message);

        Some(SceneStatus {
            scene_id,
            status,
            result_ref,
            error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_vocabulary_maps_known_values() {
        assert_eq!(
            GenerationStatus::from_wire("MEDIA_GENERATION_STATUS_SUCCESSFUL"),
            GenerationStatus::Successful
        );
        assert_eq!(
            GenerationStatus::from_wire("MEDIA_GENERATION_STATUS_FAILED"),
            GenerationStatus::Failed
        );
    }

    #[test]
    fn unknown_status_values_count_as_pending() {
        assert_eq!(
            GenerationStatus::from_wire("MEDIA_GENERATION_STATUS_ACTIVE"),
            GenerationStatus::Pending
        );
        assert_eq!(GenerationStatus::from_wire(""), GenerationStatus::Pending);
    }

    #[test]
    fn parse_create_project_envelope() {
        let json = r#"{"result":{"data":{"json":{"result":{"projectId":"prj-42"}}}}}"#;
        let envelope: CreateProjectEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.project_id().as_deref(), Some("prj-42"));
    }

    #[test]
    fn create_project_envelope_without_id() {
        let json = r#"{"result":{"data":{"json":{}}}}"#;
        let envelope: CreateProjectEnvelope = serde_json::from_str(json).unwrap();
        assert!(envelope.project_id().is_none());
    }

    #[test]
    fn parse_submit_envelope() {
        let json = r#"{"operations":[{"operation":{"name":"ops/123"},"sceneId":"s-1"}]}"#;
        let envelope: SubmitEnvelope = serde_json::from_str(json).unwrap();
        let op = &envelope.operations[0];
        assert_eq!(op.scene_id.as_deref(), Some("s-1"));
        assert_eq!(
            op.operation.as_ref().and_then(|o| o.name.as_deref()),
            Some("ops/123")
        );
    }

    #[test]
    fn parse_submit_envelope_without_operations() {
        let envelope: SubmitEnvelope = serde_json::from_str("{}").unwrap();
        assert!(envelope.operations.is_empty());
    }

    #[test]
    fn successful_status_entry_flattens() {
        let json = r#"{
            "operation": {"metadata": {"sceneId": "s-1", "video": {"servingBaseUri": "https://storage.googleapis.com/v.mp4"}}},
            "status": "MEDIA_GENERATION_STATUS_SUCCESSFUL"
        }"#;
        let entry: OperationStatus = serde_json::from_str(json).unwrap();
        let status = entry.into_scene_status().unwrap();
        assert_eq!(status.scene_id, "s-1");
        assert_eq!(status.status, GenerationStatus::Successful);
        assert_eq!(
            status.result_ref.as_deref(),
            Some("https://storage.googleapis.com/v.mp4")
        );
        assert!(status.error.is_none());
    }

    #[test]
    fn failed_status_entry_carries_error_message() {
        let json = r#"{
            "operation": {"metadata": {"sceneId": "s-2"}},
            "status": "MEDIA_GENERATION_STATUS_FAILED",
            "error": {"message": "quota exceeded"}
        }"#;
        let entry: OperationStatus = serde_json::from_str(json).unwrap();
        let status = entry.into_scene_status().unwrap();
        assert_eq!(status.status, GenerationStatus::Failed);
        assert_eq!(status.error.as_deref(), Some("quota exceeded"));
    }

    #[test]
    fn status_entry_without_scene_id_is_dropped() {
        let json = r#"{"operation":{"metadata":{}},"status":"MEDIA_GENERATION_STATUS_SUCCESSFUL"}"#;
        let entry: OperationStatus = serde_json::from_str(json).unwrap();
        assert!(entry.into_scene_status().is_none());
    }

    #[test]
    fn in_progress_status_entry_is_pending() {
        let json = r#"{"operation":{"metadata":{"sceneId":"s-3"}},"status":"MEDIA_GENERATION_STATUS_ACTIVE"}"#;
        let entry: OperationStatus = serde_json::from_str(json).unwrap();
        let status = entry.into_scene_status().unwrap();
        assert_eq!(status.status, GenerationStatus::Pending);
    }
}
