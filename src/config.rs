//! Scalar configuration for the gateway.

/// Tunable settings, all overridable from the CLI.
#[derive(Debug, Clone)]
pub struct Config {
    /// Rate-limit window length in seconds.
    pub window_secs: u64,
    /// Maximum admitted requests per client per window.
    pub max_requests: u32,
    /// Per-command timeout in milliseconds when the request does not set one.
    pub default_timeout_ms: u64,
    /// Delay before the single retry of a transient backend failure.
    pub retry_backoff_ms: u64,
    /// Maximum simultaneously in-flight backend calls per batch.
    pub concurrency: usize,
    /// Base URL of the sandbox backend.
    pub backend_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            window_secs: 60,
            max_requests: 10,
            default_timeout_ms: 30_000,
            retry_backoff_ms: 2_000,
            concurrency: 3,
            backend_url: "http://127.0.0.1:8080".to_string(),
        }
    }
}
