//! Identity URIs and their canonical form.
//!
//! Two spellings of the same identity (`https://Alice.example/profile/card/#me`
//! and `https://alice.example/profile/card#me`) must compare equal everywhere
//! a grant, a log target or a query filter is involved. [`Principal`] only
//! ever holds the canonical spelling, so `==` on it is canonical equality.

use crate::error::ValidationError;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use url::Url;

/// Fragment appended when an identity URI carries none.
pub const PROFILE_FRAGMENT: &str = "me";

/// Canonicalize an identity string.
///
/// Strips the fragment, trailing slashes and surrounding whitespace,
/// lowercases scheme and authority, then re-appends the original fragment
/// (or [`PROFILE_FRAGMENT`] when there was none). Total over arbitrary input
/// and idempotent.
pub fn normalize(raw: &str) -> String {
    let trimmed = raw.trim();
    let (base, fragment) = match trimmed.split_once('#') {
        Some((base, fragment)) => (base, fragment),
        None => (trimmed, ""),
    };
    let base = lowercase_origin(base.trim_end_matches('/'));
    let fragment = if fragment.is_empty() {
        PROFILE_FRAGMENT
    } else {
        fragment
    };
    format!("{}#{}", base, fragment)
}

fn lowercase_origin(base: &str) -> String {
    let Some(scheme_end) = base.find("://") else {
        return base.to_string();
    };
    let authority_start = scheme_end + 3;
    let authority_end = base[authority_start..]
        .find('/')
        .map(|offset| authority_start + offset)
        .unwrap_or(base.len());
    format!(
        "{}{}",
        base[..authority_end].to_ascii_lowercase(),
        &base[authority_end..]
    )
}

/// A canonical identity URI (a WebID).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Principal(String);

impl Principal {
    /// Validate a raw identity and store its canonical form.
    ///
    /// Requires an `http`/`https` scheme, a host and a non-empty fragment.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let url = Url::parse(raw.trim())
            .map_err(|err| ValidationError::principal(raw, err.to_string()))?;
        if !matches!(url.scheme(), "https" | "http") {
            return Err(ValidationError::principal(
                raw,
                format!("unsupported scheme `{}`", url.scheme()),
            ));
        }
        if url.host_str().map_or(true, str::is_empty) {
            return Err(ValidationError::principal(raw, "missing authority"));
        }
        if url.fragment().map_or(true, str::is_empty) {
            return Err(ValidationError::principal(raw, "missing fragment"));
        }
        Ok(Self(normalize(raw)))
    }

    /// Canonicalize without validating. Used for data read back from logs,
    /// where rejecting a historical spelling would drop the entry.
    pub fn normalized(raw: &str) -> Self {
        Self(normalize(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The profile document URL (identity without fragment).
    pub fn document(&self) -> &str {
        self.0.split_once('#').map_or(self.0.as_str(), |(doc, _)| doc)
    }

    /// Root of the pod that owns this identity.
    ///
    /// `https://pod.example/alice/profile/card#me` → `https://pod.example/alice/`;
    /// identities without a `/profile/` segment resolve to their origin root.
    pub fn storage_root(&self) -> String {
        let document = self.document();
        if let Some(index) = document.find("/profile/") {
            return format!("{}/", &document[..index]);
        }
        if document.ends_with("/profile") {
            return format!("{}/", document.trim_end_matches("/profile"));
        }
        match Url::parse(document) {
            Ok(url) => format!("{}/", url.origin().ascii_serialization()),
            Err(_) => format!("{}/", document),
        }
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for Principal {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::normalized(&raw))
    }
}
