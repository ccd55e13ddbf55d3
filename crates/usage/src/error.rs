/// Errors talking to the registration backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("invalid backend url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("http client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request timed out")]
    Timeout,
}

impl BackendError {
    /// Whether a retry has a chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Request(_) | Self::Timeout => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::InvalidUrl { .. } | Self::Client(_) => false,
        }
    }
}
