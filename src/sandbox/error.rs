//! Error types for sandbox execution.

use std::time::Duration;

use thiserror::Error;

use crate::sandbox::protocol::PartialResult;

/// Result type for sandbox operations.
pub type Result<T> = std::result::Result<T, SandboxError>;

/// Errors that can occur while executing a program in the sandbox.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// The supplied program is not syntactically valid.
    #[error("Syntax error in program: {message}")]
    SyntaxInvalid {
        /// Description of the problem, with a hint where possible.
        message: String,
    },

    /// A tool name cannot be bound as a callable in the generated program.
    #[error("Tool name '{name}' is not a valid identifier and cannot be bound as a callable")]
    InvalidToolName {
        /// The offending tool name.
        name: String,
    },

    /// The worker could not be created.
    #[error("Failed to provision worker: {reason}")]
    ProvisioningFailed {
        /// Reason for failure.
        reason: String,
    },

    /// The provider requires (re-)authentication before a worker can be
    /// created. Terminal: retrying without operator action cannot succeed.
    #[error("Worker provider authentication required: {reason}")]
    AuthRequired {
        /// Reason for failure.
        reason: String,
    },

    /// The cached worker endpoint reports gone/closed. Consumed internally:
    /// the controller resets its worker slot and retries once.
    #[error("Worker session is stale: {reason}")]
    StaleSession {
        /// Provider message that triggered the classification.
        reason: String,
    },

    /// The outer execution guard fired.
    #[error("Execution timed out after {timeout:?}")]
    ExecutionTimeout {
        /// The guard duration.
        timeout: Duration,
    },

    /// The worker finished without producing an output document.
    #[error("Worker produced no output")]
    NoOutput,

    /// The worker's output document was not valid JSON.
    #[error("Worker output is malformed: {reason}")]
    MalformedOutput {
        /// Parse failure description.
        reason: String,
    },

    /// The program itself failed. Results of tool calls that completed
    /// before the failure are preserved.
    #[error("Program failed: {error}")]
    ExecutionFailed {
        /// The program's error message.
        error: String,
        /// Tool results collected before the failure, if any.
        partial_result: Option<PartialResult>,
    },

    /// A worker file or command operation failed.
    #[error("Worker operation failed: {reason}")]
    Worker {
        /// Reason for failure.
        reason: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Provider messages that indicate the cached worker session is dead.
const STALE_MARKERS: [&str; 3] = ["Gone", "410", "ECONNRESET"];

impl SandboxError {
    /// Whether this error indicates a stale worker session.
    pub fn is_stale_session(&self) -> bool {
        match self {
            Self::StaleSession { .. } => true,
            Self::Worker { reason } => STALE_MARKERS.iter().any(|m| reason.contains(m)),
            _ => false,
        }
    }

    /// Upgrade worker-operation failures whose message matches a known
    /// stale-session marker.
    pub(crate) fn classify(self) -> Self {
        match self {
            Self::Worker { reason } if STALE_MARKERS.iter().any(|m| reason.contains(m)) => {
                Self::StaleSession { reason }
            }
            other => other,
        }
    }
}
