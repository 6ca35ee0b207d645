//! Control client error types.

use thiserror::Error;

/// Failure of a single remote procedure call, before it is given meaning
/// by the operation that issued it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("request rejected ({code}): {message}")]
    Rejected { code: String, message: String },

    #[error("not authorized: {0}")]
    Unauthorized(String),

    #[error("control plane unavailable: {0}")]
    Unavailable(String),

    #[error("malformed response: {0}")]
    Decode(String),
}

impl RemoteError {
    pub fn rejected(code: impl Into<String>, message: impl Into<String>) -> Self {
        RemoteError::Rejected {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Errors surfaced by control-plane operations.
///
/// None of these are retried inside StepGrid. Step timeouts are not
/// errors; they are reported as a `StepStatus`.
#[derive(Debug, Error)]
pub enum ControlError {
    /// The remote side rejected a create, resize or terminate request.
    #[error("provisioning failed: {0}")]
    Provisioning(#[source] RemoteError),

    /// The cluster or step handle is unknown or already terminated.
    #[error("not found: {0}")]
    NotFound(String),

    /// A step could not be submitted, or no usable handle came back.
    #[error("step submission failed: {0}")]
    Submission(String),

    /// A status query failed while polling.
    #[error("status query failed: {0}")]
    Query(#[source] RemoteError),

    /// A resize for this instance group is still in flight.
    #[error("resize already in flight for instance group {0}")]
    ResizeInFlight(String),

    #[error("invalid artifact: {0}")]
    InvalidArtifact(#[from] stepgrid_core::ArtifactError),
}

pub type ControlResult<T> = Result<T, ControlError>;
