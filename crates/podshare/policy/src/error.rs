use podshare_types::ValidationError;
use thiserror::Error;

/// Policy compilation and persistence errors. Any of these aborts a share.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("policy write for {resource} failed (status {status:?}): {reason}")]
    WriteFailed {
        resource: String,
        status: Option<u16>,
        reason: String,
    },

    #[error("policy read for {resource} failed (status {status:?}): {reason}")]
    ReadFailed {
        resource: String,
        status: Option<u16>,
        reason: String,
    },
}
