//! Client for the external command-execution backend.
//!
//! The backend is a black box: one call type, "run this exact text as a shell
//! command with this timeout", answered with a structured result or a
//! transport failure. Nothing beyond that shape is assumed here.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Extra time granted to the HTTP round trip on top of the command timeout,
/// so the backend's own timeout fires first.
const TRANSPORT_GRACE_MS: u64 = 5_000;

/// Raw result of one backend execution call, exactly as reported.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawExec {
    pub success: bool,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    pub exit_code: i32,
}

/// Transport-level failure of a backend call.
///
/// A closed set of variants so callers decide retry eligibility by kind, not
/// by sniffing message text.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend connection failed: {0}")]
    Connect(String),
    #[error("backend connection lost mid-request: {0}")]
    ConnectionLost(String),
    #[error("backend response truncated: {0}")]
    Truncated(String),
    #[error("backend call timed out: {0}")]
    Timeout(String),
    #[error("backend returned HTTP status {0}")]
    Status(u16),
    #[error("backend response malformed: {0}")]
    Malformed(String),
}

impl BackendError {
    /// Whether one retry is worth attempting: the connection never formed or
    /// died mid-request. Timeouts, protocol and decode errors are terminal.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Connect(_) | Self::ConnectionLost(_) | Self::Truncated(_)
        )
    }
}

/// One command-execution call against the backend.
#[async_trait]
pub trait BackendClient: Send + Sync {
    async fn exec(&self, command: &str, timeout_ms: u64) -> Result<RawExec, BackendError>;
}

/// HTTP adapter for a backend exposing a `POST /exec` endpoint.
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl BackendClient for HttpBackend {
    async fn exec(&self, command: &str, timeout_ms: u64) -> Result<RawExec, BackendError> {
        debug!(command, timeout_ms, "backend exec");
        let body = serde_json::json!({ "command": command, "timeout": timeout_ms });

        let response = self
            .client
            .post(format!("{}/exec", self.base_url))
            .timeout(Duration::from_millis(timeout_ms + TRANSPORT_GRACE_MS))
            .json(&body)
            .send()
            .await
            .map_err(classify_send_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Status(status.as_u16()));
        }

        response.json::<RawExec>().await.map_err(classify_body_error)
    }
}

fn classify_send_error(e: reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout(e.to_string())
    } else if e.is_connect() {
        BackendError::Connect(e.to_string())
    } else {
        BackendError::ConnectionLost(e.to_string())
    }
}

fn classify_body_error(e: reqwest::Error) -> BackendError {
    if e.is_decode() {
        BackendError::Malformed(e.to_string())
    } else if e.is_timeout() {
        BackendError::Timeout(e.to_string())
    } else {
        BackendError::Truncated(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_failures_are_transient() {
        assert!(BackendError::Connect("refused".into()).is_transient());
        assert!(BackendError::ConnectionLost("reset".into()).is_transient());
        assert!(BackendError::Truncated("eof".into()).is_transient());
    }

    #[test]
    fn protocol_failures_are_terminal() {
        assert!(!BackendError::Timeout("30s".into()).is_transient());
        assert!(!BackendError::Status(502).is_transient());
        assert!(!BackendError::Malformed("not json".into()).is_transient());
    }

    #[test]
    fn raw_exec_decodes_camel_case() {
        let raw: RawExec =
            serde_json::from_str(r#"{"success":true,"stdout":"hi\n","stderr":"","exitCode":0}"#)
                .unwrap();
        assert!(raw.success);
        assert_eq!(raw.exit_code, 0);
        assert_eq!(raw.stdout, "hi\n");
    }
}
