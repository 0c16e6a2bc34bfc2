//! Single-command execution: framing, retry, classification, cleanup.
//!
//! Every path through [`CommandExecutor::execute`] ends in a well-formed
//! [`ExecutionOutcome`]; transport failures are absorbed here and never
//! escape to the HTTP layer.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::backend::{BackendClient, BackendError, RawExec};
use crate::classify::Classifier;

/// Entry point that routes a command through the backend's policy
/// enforcement. The raw path bypasses it and is reserved for introspecting
/// the backend environment itself.
const WRAPPER_PREFIX: &str = "agentsh exec -- sh -c";

/// One command to run, immutable per invocation.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub text: String,
    pub timeout_ms: u64,
    pub use_wrapper: bool,
}

/// Final result of one command execution, frozen after construction.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOutcome {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub blocked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ExecutionOutcome {
    fn transport_failure(error: &BackendError) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: error.to_string(),
            exit_code: -1,
            blocked: false,
            message: Some(format!("Execution error: {error}")),
        }
    }
}

pub struct CommandExecutor {
    backend: Arc<dyn BackendClient>,
    classifier: Classifier,
    retry_backoff: Duration,
}

impl CommandExecutor {
    pub fn new(backend: Arc<dyn BackendClient>, classifier: Classifier, retry_backoff: Duration) -> Self {
        Self {
            backend,
            classifier,
            retry_backoff,
        }
    }

    /// Run one command to completion. Never fails: every error becomes a
    /// terminal outcome.
    pub async fn execute(&self, spec: &CommandSpec) -> ExecutionOutcome {
        let framed = if spec.use_wrapper {
            wrap_command(&spec.text)
        } else {
            spec.text.clone()
        };

        let raw = match self.call_with_retry(&framed, spec.timeout_ms).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(command = %spec.text, error = %e, "backend call failed");
                return ExecutionOutcome::transport_failure(&e);
            }
        };

        // Classification reads the raw combined output; cleanup below only
        // rewrites the display stdout.
        let combined = format!("{}\n{}", raw.stdout, raw.stderr);
        let class = self.classifier.classify(&combined);
        debug!(
            command = %spec.text,
            exit_code = raw.exit_code,
            blocked = class.blocked,
            "execution finished"
        );

        ExecutionOutcome {
            success: raw.success && !class.blocked,
            stdout: clean_output(&raw.stdout),
            stderr: raw.stderr,
            exit_code: raw.exit_code,
            blocked: class.blocked,
            message: class.message,
        }
    }

    /// One backend call, retried exactly once on a transient transport
    /// failure after a fixed backoff. A result that returned normally with a
    /// nonzero exit code is a legitimate outcome, never retried.
    async fn call_with_retry(
        &self,
        command: &str,
        timeout_ms: u64,
    ) -> Result<RawExec, BackendError> {
        match self.backend.exec(command, timeout_ms).await {
            Ok(raw) => Ok(raw),
            Err(e) if e.is_transient() => {
                warn!(error = %e, backoff_ms = self.retry_backoff.as_millis() as u64, "transient backend failure, retrying once");
                tokio::time::sleep(self.retry_backoff).await;
                self.backend.exec(command, timeout_ms).await
            }
            Err(e) => Err(e),
        }
    }
}

/// Embed the literal command, shell-quoted, in the wrapper invocation.
fn wrap_command(text: &str) -> String {
    format!("{WRAPPER_PREFIX} {}", shell_quote(text))
}

/// Single-quote for `sh -c`, closing and reopening around embedded quotes.
fn shell_quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', r"'\''"))
}

/// Lines the wrapper prints on startup, plus timestamped log records the
/// backend interleaves with command output.
static NOISE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:\[agentsh\]|\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}\S*\s+(?:TRACE|DEBUG|INFO|WARN)\b)",
    )
    .unwrap()
});

/// Strip banner and log lines from display output. Cosmetic only: the
/// classifier has already seen the unmodified text.
fn clean_output(stdout: &str) -> String {
    stdout
        .lines()
        .filter(|line| !NOISE_LINE.is_match(line))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
