use thiserror::Error;

/// Input validation failures shared by every PodShare layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid principal `{value}`: {reason}")]
    InvalidPrincipal { value: String, reason: String },

    #[error("invalid resource `{value}`: {reason}")]
    InvalidResource { value: String, reason: String },

    #[error("invalid share pattern: {0}")]
    InvalidPattern(String),

    #[error("invalid permission: {0}")]
    InvalidPermission(String),
}

impl ValidationError {
    pub(crate) fn principal(value: &str, reason: impl Into<String>) -> Self {
        Self::InvalidPrincipal {
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn resource(value: &str, reason: impl Into<String>) -> Self {
        Self::InvalidResource {
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}
