use thiserror::Error;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Failures below the HTTP status layer. A non-2xx response is not a
/// transport error; callers interpret status codes themselves.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("request to {uri} timed out after {after_ms}ms")]
    Timeout { uri: String, after_ms: u64 },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("credential error: {0}")]
    Credentials(String),

    #[error("backend error: {0}")]
    Backend(String),
}
