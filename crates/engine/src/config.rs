use std::time::Duration;

/// Engine configuration loaded from environment variables.
///
/// The defaults match the Flow frontend's observed behavior.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum number of jobs in flight at once (default: `5`).
    pub max_concurrent: usize,
    /// Cadence of the submission scheduler (default: `2s`).
    pub submit_interval: Duration,
    /// Cadence of the status poller (default: `10s`).
    pub poll_interval: Duration,
    /// Bounded wait for the session driver to authenticate
    /// (default: `300s`).
    pub login_timeout: Duration,
    /// Delay before the session is released after the batch ends, so
    /// consumers can still read transient result references
    /// (default: `120s`).
    pub close_grace: Duration,
}

impl EngineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default |
    /// |------------------------|---------|
    /// | `MAX_CONCURRENT`       | `5`     |
    /// | `SUBMIT_INTERVAL_SECS` | `2`     |
    /// | `POLL_INTERVAL_SECS`   | `10`    |
    /// | `LOGIN_TIMEOUT_SECS`   | `300`   |
    /// | `CLOSE_GRACE_SECS`     | `120`   |
    pub fn from_env() -> Self {
        let max_concurrent: usize = std::env::var("MAX_CONCURRENT")
            .unwrap_or_else(|_| "5".into())
            .parse()
            .expect("MAX_CONCURRENT must be a valid usize");

        let submit_interval_secs: u64 = std::env::var("SUBMIT_INTERVAL_SECS")
            .unwrap_or_else(|_| "2".into())
            .parse()
            .expect("SUBMIT_INTERVAL_SECS must be a valid u64");

        let poll_interval_secs: u64 = std::env::var("POLL_INTERVAL_SECS")
            .unwrap_or_else(|_| "10".into())
            .parse()
            .expect("POLL_INTERVAL_SECS must be a valid u64");

        let login_timeout_secs: u64 = std::env::var("LOGIN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "300".into())
            .parse()
            .expect("LOGIN_TIMEOUT_SECS must be a valid u64");

        let close_grace_secs: u64 = std::env::var("CLOSE_GRACE_SECS")
            .unwrap_or_else(|_| "120".into())
            .parse()
            .expect("CLOSE_GRACE_SECS must be a valid u64");

        Self {
            max_concurrent,
            submit_interval: Duration::from_secs(submit_interval_secs),
            poll_interval: Duration::from_secs(poll_interval_secs),
            login_timeout: Duration::from_secs(login_timeout_secs),
            close_grace: Duration::from_secs(close_grace_secs),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            submit_interval: Duration::from_secs(2),
            poll_interval: Duration::from_secs(10),
            login_timeout: Duration::from_secs(300),
            close_grace: Duration::from_secs(120),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_frontend_behavior() {
        let config = EngineConfig::default();
        assert_eq!(config.max_concurrent, 5);
        assert_eq!(config.submit_interval, Duration::from_secs(2));
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.login_timeout, Duration::from_secs(300));
        assert_eq!(config.close_grace, Duration::from_secs(120));
    }
}
