//! Error taxonomy shared across the workspace.

/// Errors surfaced by the remote client and the orchestration engine.
///
/// `Auth`, `Timeout`, and `Fatal` abort the whole batch; the remaining
/// variants are scoped to a single job or a single call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FlowError {
    /// Missing or invalid credential, detected before any network call.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// A bounded wait (login, readiness) expired.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// The remote response is missing required fields.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The remote service answered with a non-success HTTP status.
    #[error("API error ({status}): {body}")]
    Network { status: u16, body: String },

    /// The request never produced a response (DNS, TLS, connection).
    #[error("Request failed: {0}")]
    Request(String),

    /// The batch cannot proceed (e.g. no project context).
    #[error("Fatal error: {0}")]
    Fatal(String),
}

impl FlowError {
    /// Whether this error must abort the entire batch rather than a
    /// single job or call.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FlowError::Auth(_) | FlowError::Timeout(_) | FlowError::Fatal(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_level_errors_are_fatal() {
        assert!(FlowError::Auth("no token".into()).is_fatal());
        assert!(FlowError::Timeout("login".into()).is_fatal());
        assert!(FlowError::Fatal("no project".into()).is_fatal());
    }

    #[test]
    fn call_level_errors_are_not_fatal() {
        assert!(!FlowError::Protocol("missing sceneId".into()).is_fatal());
        assert!(!FlowError::Request("connection refused".into()).is_fatal());
        assert!(!FlowError::Network {
            status: 500,
            body: "oops".into()
        }
        .is_fatal());
    }
}
