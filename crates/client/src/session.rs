//! Authenticated session context and the external session-driver seam.

use async_trait::async_trait;
use veoflow_core::error::FlowError;

/// Credentials and project context for one batch run.
///
/// Produced once by the session driver, read-only thereafter; every
/// remote call in the batch borrows it.
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Cookie header value for the interactive web host.
    pub cookie: String,
    /// Bearer token for the generation API host. Calls targeting that
    /// host fail pre-flight when this is `None`.
    pub bearer_token: Option<String>,
    /// Existing project to reuse. When `None` the orchestrator creates
    /// one at batch start.
    pub project_id: Option<String>,
}

impl SessionContext {
    /// Create a context holding only the web-host cookie.
    pub fn new(cookie: impl Into<String>) -> Self {
        Self {
            cookie: cookie.into(),
            bearer_token: None,
            project_id: None,
        }
    }

    /// Attach the generation-API bearer token.
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Attach an existing project id to reuse.
    pub fn with_project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }
}

/// External session driver.
///
/// Whatever performs login and owns the underlying session resource
/// (in the desktop app, a real browser profile) implements this; the
/// orchestrator only ever sees the resulting [`SessionContext`].
#[async_trait]
pub trait SessionDriver: Send + Sync {
    /// Whether the session is already authenticated.
    async fn is_authenticated(&self) -> bool;

    /// Resolve once the session is authenticated.
    ///
    /// The orchestrator bounds this wait with its login timeout; the
    /// driver itself may wait indefinitely.
    async fn wait_authenticated(&self) -> Result<SessionContext, FlowError>;

    /// Release the underlying session resource.
    async fn close(&self);
}
