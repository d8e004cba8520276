use podshare_policy::PolicyError;
use podshare_types::ValidationError;
use thiserror::Error;

/// Errors that abort a share or revoke. Anything that goes wrong after the
/// policy is committed is reported as a warning instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SharingError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("share failed: {0}")]
    ShareFailed(String),

    #[error("cancelled before the policy was applied")]
    Cancelled,

    #[error("policy unavailable: {0}")]
    PolicyUnavailable(String),
}

impl From<PolicyError> for SharingError {
    fn from(err: PolicyError) -> Self {
        match err {
            PolicyError::Validation(err) => SharingError::Validation(err),
            other => SharingError::ShareFailed(other.to_string()),
        }
    }
}

/// Notification failures. Never fatal to a share.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotificationError {
    #[error("profile {profile} unavailable: {reason}")]
    ProfileUnavailable { profile: String, reason: String },

    #[error("delivery to {inbox} failed (status {status:?}): {reason}")]
    DeliveryFailed {
        inbox: String,
        status: Option<u16>,
        reason: String,
    },
}
