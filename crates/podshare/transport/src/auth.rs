//! Credential seam. The identity/session provider lives outside PodShare;
//! this module only defines what the transport needs from it.

use crate::{Method, TransportResult};
use async_trait::async_trait;

/// Proof-of-possession credentials for one request: the bound access token
/// and the per-request proof over (method, uri).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub proof: String,
}

impl TokenPair {
    pub fn headers(&self) -> [(String, String); 2] {
        [
            (
                "authorization".to_string(),
                format!("DPoP {}", self.access_token),
            ),
            ("dpop".to_string(), self.proof.clone()),
        ]
    }
}

#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Token pair for `method` on `uri`, or `None` to send the request
    /// unauthenticated.
    async fn token_pair(&self, method: Method, uri: &str) -> TransportResult<Option<TokenPair>>;
}

/// Sends every request without credentials.
#[derive(Debug, Default, Clone, Copy)]
pub struct Anonymous;

#[async_trait]
impl TokenProvider for Anonymous {
    async fn token_pair(&self, _method: Method, _uri: &str) -> TransportResult<Option<TokenPair>> {
        Ok(None)
    }
}

/// Uses one pre-minted pair for every request. Suitable for scripts driven
/// by a session that already produced the proof.
#[derive(Debug, Clone)]
pub struct StaticTokens(pub TokenPair);

#[async_trait]
impl TokenProvider for StaticTokens {
    async fn token_pair(&self, _method: Method, _uri: &str) -> TransportResult<Option<TokenPair>> {
        Ok(Some(self.0.clone()))
    }
}
