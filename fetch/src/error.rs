use std::time::Duration;

use thiserror::Error;

/// Upstream statuses worth retrying: rate limiting and transient server
/// failures.
const TRANSIENT_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

#[derive(Debug, Error)]
pub enum FetchError {
    /// The upstream asked us to back off or failed transiently. Retryable.
    #[error("transient upstream failure (status {status})")]
    Transient {
        status: u16,
        /// Server-provided minimum wait, when it sent one.
        retry_after: Option<Duration>,
    },
    /// Definitive upstream rejection. Never retried.
    #[error("upstream rejected request (status {status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("malformed upstream payload: {0}")]
    Payload(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FetchError {
    /// Classify an HTTP-style status code, folding in a server wait hint.
    pub fn from_status(status: u16, retry_after: Option<Duration>, message: &str) -> Self {
        if TRANSIENT_STATUSES.contains(&status) {
            FetchError::Transient {
                status,
                retry_after,
            }
        } else {
            FetchError::Rejected {
                status,
                message: message.to_string(),
            }
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient { .. })
    }

    pub fn retry_hint(&self) -> Option<Duration> {
        match self {
            FetchError::Transient { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}
