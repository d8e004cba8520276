use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// An addressable object (or container) in a pod.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceUri(String);

impl ResourceUri {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        let url =
            Url::parse(trimmed).map_err(|err| ValidationError::resource(raw, err.to_string()))?;
        if !matches!(url.scheme(), "https" | "http") {
            return Err(ValidationError::resource(
                raw,
                format!("unsupported scheme `{}`", url.scheme()),
            ));
        }
        if url.host_str().map_or(true, str::is_empty) {
            return Err(ValidationError::resource(raw, "missing authority"));
        }
        if url.fragment().is_some() {
            return Err(ValidationError::resource(
                raw,
                "resources are documents, not fragment identifiers",
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Containers end in `/`.
    pub fn is_container(&self) -> bool {
        self.0.ends_with('/')
    }

    /// The location of a companion document at `<resource><suffix>`.
    pub fn with_suffix(&self, suffix: &str) -> String {
        format!("{}{}", self.0, suffix)
    }
}

impl fmt::Display for ResourceUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
