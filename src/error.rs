use thiserror::Error;

/// Failures raised by a verification backend call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    /// Connectivity loss, connection refused, request timeout.
    #[error("transport error: {0}")]
    Transport(String),
    /// The backend answered but the envelope was not what we expect.
    #[error("service error: {0}")]
    Service(String),
}

/// The image or frame could not be decoded at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("decode error: {0}")]
pub struct DecodeError(pub String);

/// Errors surfaced by the scan pipeline.
///
/// Everything except `NoPayload` and `AlreadyInProgress` still produces a
/// history record; for those the error only supplies the displayed reason.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    #[error("no code found")]
    NoPayload,
    #[error("scan already in progress")]
    AlreadyInProgress,
    #[error("no code found: {0}")]
    Decode(#[from] DecodeError),
    #[error("network unavailable")]
    Transport(String),
    #[error("malformed service response: {0}")]
    Service(String),
    #[error("verification timed out")]
    Timeout,
    #[error("verification failed: {0}")]
    Failed(String),
}

impl ScanError {
    /// Human-readable reason stored on an errored record.
    pub fn reason(&self) -> String {
        match self {
            ScanError::Failed(reason) => reason.clone(),
            other => other.to_string(),
        }
    }
}

impl From<VerifyError> for ScanError {
    fn from(err: VerifyError) -> Self {
        match err {
            VerifyError::Transport(detail) => ScanError::Transport(detail),
            VerifyError::Service(detail) => ScanError::Service(detail),
        }
    }
}
