//! Engine error types.

use kestrel_actions::CollaboratorError;

/// Fatal loop errors propagated out of `execute_loop`.
///
/// Action-level failures never appear here — they are absorbed into failed
/// outcomes. Cancellation is not fatal either: a cancelled loop returns a
/// normal result with `cancelled = true`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The prompt builder failed.
    #[error("prompt build failed: {0}")]
    PromptBuild(String),

    /// The action catalog could not be listed.
    #[error("action catalog unavailable: {0}")]
    Catalog(String),

    /// The model querier failed.
    #[error("model query failed: {0}")]
    ModelQuery(String),

    /// `execute_loop` was called while a run is in flight.
    #[error("engine is already running")]
    AlreadyRunning,

    /// The loop configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Internal / unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Whether the caller may retry the invocation.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::ModelQuery(_) | Self::AlreadyRunning)
    }

    /// Error category string for events and logs.
    #[must_use]
    pub fn category(&self) -> &str {
        match self {
            Self::PromptBuild(_) => "prompt_build",
            Self::Catalog(_) => "catalog",
            Self::ModelQuery(_) => "model_query",
            Self::AlreadyRunning => "already_running",
            Self::InvalidConfig(_) => "invalid_config",
            Self::Internal(_) => "internal",
        }
    }
}

/// Maps collaborator failures onto the fatal taxonomy.
///
/// `CollaboratorError::Cancelled` never reaches this conversion on the loop
/// path — the round runner turns it into a cancelled disposition first.
impl From<CollaboratorError> for EngineError {
    fn from(e: CollaboratorError) -> Self {
        match e {
            CollaboratorError::PromptBuild { message } => Self::PromptBuild(message),
            CollaboratorError::Catalog { message } => Self::Catalog(message),
            CollaboratorError::Query { message, .. } => Self::ModelQuery(message),
            CollaboratorError::Cancelled => Self::Internal("cancelled".into()),
        }
    }
}
