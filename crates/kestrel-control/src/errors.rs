//! Control error types.

/// Raised by a pause-aware wait when cancellation occurs while waiting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("operation cancelled")]
pub struct CancellationError;
