//! Backend client error types.

use thiserror::Error;

pub type BackendResult<T> = Result<T, BackendError>;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Backend unavailable ({0}): {1}")]
    ServiceUnavailable(u16, String),

    #[error("Backend returned {0}: {1}")]
    RequestFailed(u16, String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Backend returned no {0}")]
    EmptyOutput(&'static str),

    #[error("Invalid base64 payload: {0}")]
    Decode(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackendError {
    /// Map a non-success HTTP status to an error.
    pub fn from_http_status(status: u16, body: impl Into<String>) -> Self {
        match status {
            502..=504 => Self::ServiceUnavailable(status, body.into()),
            _ => Self::RequestFailed(status, body.into()),
        }
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Connect failures, timeouts and gateway errors are worth another try.
    pub fn is_retryable(&self) -> bool {
        match self {
            BackendError::ServiceUnavailable(..) => true,
            BackendError::Network(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }
}
