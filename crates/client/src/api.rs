//! HTTP client for the Flow web and generation API hosts.
//!
//! The two hosts authenticate differently: the interactive web host
//! takes the session cookie, the generation API host takes a bearer
//! token (and the cookie). The bearer-token requirement is enforced
//! before any network call.

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use veoflow_core::error::FlowError;
use veoflow_core::types::SubmissionHandle;

use crate::responses::{
    CreateProjectEnvelope, OperationStatus, SceneStatus, StatusEnvelope, SubmitEnvelope,
};
use crate::session::SessionContext;

/// Default base URL of the interactive web host.
pub const DEFAULT_WEB_BASE_URL: &str = "https://labs.google";
/// Default base URL of the generation API host.
pub const DEFAULT_API_BASE_URL: &str = "https://aisandbox-pa.googleapis.com";

/// Tool name the Flow frontend passes on project creation and submission.
const TOOL_NAME: &str = "PINHOLE";

/// Browser user agent sent with every request.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Model parameters applied to every submission in a batch.
#[derive(Debug, Clone)]
pub struct GenerationParams {
    /// Flow model key, e.g. `veo_3_0_t2v_fast`.
    pub model_key: String,
    /// Wire aspect-ratio constant.
    pub aspect_ratio: String,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            model_key: "veo_3_0_t2v_fast".into(),
            aspect_ratio: "VIDEO_ASPECT_RATIO_LANDSCAPE".into(),
        }
    }
}

/// Result of a successful submission: the server-side operation name
/// and the server-assigned scene id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitResult {
    pub operation_name: String,
    pub scene_id: String,
}

/// Remote operations the orchestration engine depends on.
///
/// The HTTP-backed [`FlowClient`] is the canonical implementation;
/// tests substitute their own. All three operations are idempotent on
/// the wire.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Create a new project on the web host and return its id.
    async fn create_project(
        &self,
        session: &SessionContext,
        title: &str,
    ) -> Result<String, FlowError>;

    /// Submit one generation request.
    async fn submit_job(
        &self,
        session: &SessionContext,
        project_id: &str,
        prompt: &str,
        seed: u32,
        params: &GenerationParams,
    ) -> Result<SubmitResult, FlowError>;

    /// Check the status of every active operation in one round trip.
    async fn batch_check_status(
        &self,
        session: &SessionContext,
        handles: &[SubmissionHandle],
    ) -> Result<Vec<SceneStatus>, FlowError>;
}

/// HTTP implementation of [`RemoteClient`] for the Flow service.
pub struct FlowClient {
    client: reqwest::Client,
    web_base_url: String,
    api_base_url: String,
}

impl FlowClient {
    /// Create a client targeting the production hosts.
    pub fn new() -> Self {
        Self::with_base_urls(DEFAULT_WEB_BASE_URL, DEFAULT_API_BASE_URL)
    }

    /// Override both hosts (tests point this at a local server).
    pub fn with_base_urls(web_base_url: impl Into<String>, api_base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            web_base_url: web_base_url.into(),
            api_base_url: api_base_url.into(),
        }
    }

    // ---- private helpers ----

    /// Headers for the interactive web host (cookie-authenticated).
    fn web_headers(&self, session: &SessionContext) -> Result<HeaderMap, FlowError> {
        let mut headers = Self::common_headers();
        headers.insert(header::COOKIE, Self::header_value(&session.cookie)?);
        headers.insert("X-Same-Domain", HeaderValue::from_static("1"));
        Ok(headers)
    }

    /// Headers for the generation API host (bearer-authenticated).
    ///
    /// Fails with [`FlowError::Auth`] before any network activity when
    /// no bearer token is configured.
    fn api_headers(&self, session: &SessionContext) -> Result<HeaderMap, FlowError> {
        let token = session.bearer_token.as_deref().ok_or_else(|| {
            FlowError::Auth("bearer token is required for the generation API host".into())
        })?;

        let mut headers = Self::common_headers();
        headers.insert(
            header::AUTHORIZATION,
            Self::header_value(&format!("Bearer {token}"))?,
        );
        headers.insert(header::COOKIE, Self::header_value(&session.cookie)?);
        Ok(headers)
    }

    fn common_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));
        headers.insert(header::ORIGIN, HeaderValue::from_static(DEFAULT_WEB_BASE_URL));
        headers.insert(header::REFERER, HeaderValue::from_static("https://labs.google/"));
        headers
    }

    fn header_value(value: &str) -> Result<HeaderValue, FlowError> {
        HeaderValue::from_str(value)
            .map_err(|_| FlowError::Auth("credential is not a valid header value".into()))
    }

    /// Ensure the response has a success status code, or convert it into
    /// a [`FlowError::Network`] carrying the status and body text.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, FlowError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(FlowError::Network {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, FlowError> {
        let response = Self::ensure_success(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| FlowError::Protocol(format!("malformed response body: {e}")))
    }

    fn request_error(e: reqwest::Error) -> FlowError {
        FlowError::Request(e.to_string())
    }
}

impl Default for FlowClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteClient for FlowClient {
    async fn create_project(
        &self,
        session: &SessionContext,
        title: &str,
    ) -> Result<String, FlowError> {
        let headers = self.web_headers(session)?;
        let body = serde_json::json!({
            "json": {
                "projectTitle": title,
                "toolName": TOOL_NAME,
            }
        });

        let response = self
            .client
            .post(format!(
                "{}/fx/api/trpc/project.createProject",
                self.web_base_url
            ))
            .headers(headers)
            .json(&body)
            .send()
            .await
            .map_err(Self::request_error)?;

        let envelope: CreateProjectEnvelope = Self::parse_response(response).await?;
        let project_id = envelope.project_id().ok_or_else(|| {
            FlowError::Protocol("createProject response carries no projectId".into())
        })?;

        tracing::info!(project_id = %project_id, "Created Flow project");
        Ok(project_id)
    }

    async fn submit_job(
        &self,
        session: &SessionContext,
        project_id: &str,
        prompt: &str,
        seed: u32,
        params: &GenerationParams,
    ) -> Result<SubmitResult, FlowError> {
        let headers = self.api_headers(session)?;

        // The frontend attaches a client-generated scene id; the server
        // answers with its own, which is the one used for correlation.
        let client_scene_id = uuid::Uuid::new_v4().to_string();
        let body = serde_json::json!({
            "clientContext": {
                "projectId": project_id,
                "tool": TOOL_NAME,
            },
            "requests": [{
                "aspectRatio": params.aspect_ratio,
                "seed": seed,
                "textInput": { "prompt": prompt },
                "videoModelKey": params.model_key,
                "metadata": [{ "sceneId": client_scene_id }],
            }],
        });

        let response = self
            .client
            .post(format!(
                "{}/v1/video:batchAsyncGenerateVideoText",
                self.api_base_url
            ))
            .headers(headers)
            .json(&body)
            .send()
            .await
            .map_err(Self::request_error)?;

        let envelope: SubmitEnvelope = Self::parse_response(response).await?;
        let operation = envelope
            .operations
            .into_iter()
            .next()
            .ok_or_else(|| FlowError::Protocol("submit response carries no operations".into()))?;
        let scene_id = operation
            .scene_id
            .ok_or_else(|| FlowError::Protocol("submit response carries no sceneId".into()))?;
        let operation_name = operation
            .operation
            .and_then(|op| op.name)
            .ok_or_else(|| {
                FlowError::Protocol("submit response carries no operation name".into())
            })?;

        tracing::debug!(scene_id = %scene_id, "Generation request accepted");
        Ok(SubmitResult {
            operation_name,
            scene_id,
        })
    }

    async fn batch_check_status(
        &self,
        session: &SessionContext,
        handles: &[SubmissionHandle],
    ) -> Result<Vec<SceneStatus>, FlowError> {
        let headers = self.api_headers(session)?;

        let operations: Vec<serde_json::Value> = handles
            .iter()
            .map(|handle| {
                serde_json::json!({
                    "operation": { "name": handle.operation_name },
                    "sceneId": handle.scene_id,
                })
            })
            .collect();
        // The Flow frontend wraps the handle list in a single-element
        // outer array.
        let body = serde_json::json!({ "operations": [operations] });

        let response = self
            .client
            .post(format!(
                "{}/v1/video:batchCheckAsyncVideoGenerationStatus",
                self.api_base_url
            ))
            .headers(headers)
            .json(&body)
            .send()
            .await
            .map_err(Self::request_error)?;

        let envelope: StatusEnvelope = Self::parse_response(response).await?;
        Ok(envelope
            .operations
            .into_iter()
            .filter_map(OperationStatus::into_scene_status)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn web_headers_attach_cookie_and_same_domain() {
        let client = FlowClient::new();
        let session = SessionContext::new("SID=abc");

        let headers = client.web_headers(&session).unwrap();
        assert_eq!(headers.get(header::COOKIE).unwrap(), "SID=abc");
        assert_eq!(headers.get("X-Same-Domain").unwrap(), "1");
        assert!(headers.get(header::AUTHORIZATION).is_none());
    }

    #[test]
    fn api_headers_require_bearer_token() {
        let client = FlowClient::new();
        let session = SessionContext::new("SID=abc");

        assert_matches!(client.api_headers(&session), Err(FlowError::Auth(_)));

        let session = session.with_bearer_token("tok");
        let headers = client.api_headers(&session).unwrap();
        assert_eq!(headers.get(header::AUTHORIZATION).unwrap(), "Bearer tok");
        assert_eq!(headers.get(header::COOKIE).unwrap(), "SID=abc");
    }

    #[tokio::test]
    async fn submit_without_bearer_token_fails_before_any_request() {
        // The base URLs are unroutable; reaching the network would fail
        // with a request error, not an auth error.
        let client = FlowClient::with_base_urls("http://127.0.0.1:9", "http://127.0.0.1:9");
        let session = SessionContext::new("SID=abc");

        let err = client
            .submit_job(&session, "prj-1", "a prompt", 42, &GenerationParams::default())
            .await
            .unwrap_err();
        assert_matches!(err, FlowError::Auth(_));
    }

    #[tokio::test]
    async fn batch_check_without_bearer_token_fails_before_any_request() {
        let client = FlowClient::with_base_urls("http://127.0.0.1:9", "http://127.0.0.1:9");
        let session = SessionContext::new("SID=abc");

        let handles = vec![SubmissionHandle {
            job_id: "j1".into(),
            operation_name: "ops/1".into(),
            scene_id: "s-1".into(),
        }];
        let err = client
            .batch_check_status(&session, &handles)
            .await
            .unwrap_err();
        assert_matches!(err, FlowError::Auth(_));
    }
}
