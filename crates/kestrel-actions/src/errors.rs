//! Collaborator and handler error types.

use kestrel_control::CancellationError;

/// Errors from the engine's injected collaborators.
///
/// Prompt-build and query failures are fatal to the loop; catalog failures
/// surface at round start. Action handler failures never appear here — they
/// are encoded into failed outcomes.
#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    /// Prompt building failed.
    #[error("prompt build failed: {message}")]
    PromptBuild {
        /// Failure description.
        message: String,
    },

    /// The action catalog could not be listed.
    #[error("action catalog unavailable: {message}")]
    Catalog {
        /// Failure description.
        message: String,
    },

    /// The model query failed.
    #[error("model query failed: {message}")]
    Query {
        /// Failure description.
        message: String,
        /// Whether the caller may retry.
        retryable: bool,
    },

    /// The operation observed cancellation.
    #[error("operation cancelled")]
    Cancelled,
}

impl CollaboratorError {
    /// Whether the error is retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Query { retryable: true, .. } | Self::Cancelled)
    }

    /// Error category string for events and logs.
    #[must_use]
    pub fn category(&self) -> &str {
        match self {
            Self::PromptBuild { .. } => "prompt_build",
            Self::Catalog { .. } => "catalog",
            Self::Query { .. } => "query",
            Self::Cancelled => "cancelled",
        }
    }
}

impl From<CancellationError> for CollaboratorError {
    fn from(_: CancellationError) -> Self {
        Self::Cancelled
    }
}

/// Errors an [`crate::traits::ActionHandler`] may return.
///
/// The registry converts these into failed outcomes; they never propagate
/// past the executor boundary.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// The call arguments did not fit the handler's expectations.
    #[error("invalid arguments: {message}")]
    InvalidArguments {
        /// Failure description.
        message: String,
    },

    /// Execution failed.
    #[error("execution failed: {message}")]
    Failed {
        /// Failure description.
        message: String,
    },

    /// Execution exceeded its time budget.
    #[error("timed out after {timeout_ms}ms")]
    Timeout {
        /// The budget that was exceeded.
        timeout_ms: u64,
    },

    /// Execution observed cancellation.
    #[error("operation cancelled")]
    Cancelled,
}

impl From<CancellationError> for HandlerError {
    fn from(_: CancellationError) -> Self {
        Self::Cancelled
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
