use std::time::Duration;

pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_SESSION_KEY: &str = "analytics_session_id";
pub const DEFAULT_QUEUE_KEY: &str = "analytics_queue";
pub const TRACK_PATH: &str = "/analytics/track";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    /// Full URL of the ingestion endpoint.
    pub endpoint: String,
    /// Consecutive failures after which the agent stops tracking.
    pub failure_threshold: u32,
    pub timeout: Duration,
    pub session_key: String,
    pub queue_key: String,
}

impl AgentConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            timeout: DEFAULT_TIMEOUT,
            session_key: DEFAULT_SESSION_KEY.to_string(),
            queue_key: DEFAULT_QUEUE_KEY.to_string(),
        }
    }

    /// Endpoint of a server exposing the standard analytics routes.
    pub fn for_server(base_url: &str) -> Self {
        Self::new(format!("{}{TRACK_PATH}", base_url.trim_end_matches('/')))
    }

    #[must_use]
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_base_gets_track_path() {
        let config = AgentConfig::for_server("http://127.0.0.1:4830/");
        assert_eq!(config.endpoint, "http://127.0.0.1:4830/analytics/track");
        assert_eq!(config.failure_threshold, 3);
        assert_eq!(config.timeout, Duration::from_secs(10));
    }

    #[test]
    fn threshold_never_drops_to_zero() {
        let config = AgentConfig::new("http://x").with_failure_threshold(0);
        assert_eq!(config.failure_threshold, 1);
    }
}
