//! Failure taxonomy shared by the request pipeline and the transcript.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Everything a backend request can fail with.
///
/// The error is `Clone` because a single outcome may be observed by several
/// callers that joined the same in-flight request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("Request timed out")]
    Timeout,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error {status}{}", detail_suffix(.detail))]
    ServerError { status: u16, detail: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("{0}")]
    Validation(String),
}

fn detail_suffix(detail: &str) -> String {
    if detail.is_empty() {
        String::new()
    } else {
        format!(": {detail}")
    }
}

impl RequestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RequestError::Timeout => ErrorKind::Timeout,
            RequestError::Network(_) => ErrorKind::Network,
            RequestError::ServerError { status, detail } => ErrorKind::ServerError {
                status: *status,
                detail: detail.clone(),
            },
            RequestError::MalformedResponse(_) => ErrorKind::MalformedResponse,
            RequestError::Cancelled => ErrorKind::Cancelled,
            RequestError::Validation(_) => ErrorKind::Validation,
        }
    }

    /// Whether the failure was handled without a backend round trip.
    pub fn is_local(&self) -> bool {
        matches!(self, RequestError::Cancelled | RequestError::Validation(_))
    }

    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RequestError::Timeout
        } else if err.is_decode() {
            RequestError::MalformedResponse(err.to_string())
        } else {
            RequestError::Network(err.to_string())
        }
    }
}

/// Data-only projection of [`RequestError`] stored on transcript messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    Network,
    ServerError { status: u16, detail: String },
    MalformedResponse,
    Cancelled,
    Validation,
}
