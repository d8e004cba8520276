use crate::{TransportError, TransportResult};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub const TEXT_TURTLE: &str = "text/turtle";
pub const SPARQL_UPDATE: &str = "application/sparql-update";
pub const JSON_LD: &str = "application/ld+json";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Put,
    Patch,
    Post,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One request against the object store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PodRequest {
    pub method: Method,
    pub uri: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl PodRequest {
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            headers: vec![],
            body: None,
        }
    }

    pub fn get(uri: impl Into<String>) -> Self {
        Self::new(Method::Get, uri).with_header("accept", TEXT_TURTLE)
    }

    pub fn put(uri: impl Into<String>, content_type: &str, body: impl Into<String>) -> Self {
        Self::new(Method::Put, uri).with_body(content_type, body)
    }

    /// Insert-only SPARQL update: `INSERT DATA { <triples> }`.
    pub fn insert_data(uri: impl Into<String>, triples: &str) -> Self {
        Self::new(Method::Patch, uri)
            .with_body(SPARQL_UPDATE, format!("INSERT DATA {{\n{}\n}}", triples))
    }

    pub fn post(uri: impl Into<String>, content_type: &str, body: impl Into<String>) -> Self {
        Self::new(Method::Post, uri).with_body(content_type, body)
    }

    pub fn delete(uri: impl Into<String>) -> Self {
        Self::new(Method::Delete, uri)
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_ascii_lowercase(), value.into()));
        self
    }

    pub fn with_body(self, content_type: &str, body: impl Into<String>) -> Self {
        let mut request = self.with_header("content-type", content_type);
        request.body = Some(body.into());
        request
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// Response from the object store. Header names are lowercase.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PodResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl PodResponse {
    pub fn status(status: u16) -> Self {
        Self {
            status,
            headers: vec![],
            body: String::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Containers advertise an LDP container type in their `Link` header.
    pub fn is_container(&self) -> bool {
        self.headers
            .iter()
            .filter(|(name, _)| name == "link")
            .any(|(_, value)| {
                value.contains("ldp#BasicContainer") || value.contains("ldp#Container")
            })
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// The raw object-store client. Implementations attach credentials and
/// perform the exchange; status interpretation is left to callers.
#[async_trait]
pub trait PodClient: Send + Sync {
    async fn send(&self, request: PodRequest) -> TransportResult<PodResponse>;
}

/// Bounds every call of the wrapped client by a fixed timeout.
pub struct BoundedClient {
    inner: Arc<dyn PodClient>,
    timeout: Duration,
}

impl BoundedClient {
    pub fn new(inner: Arc<dyn PodClient>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl PodClient for BoundedClient {
    async fn send(&self, request: PodRequest) -> TransportResult<PodResponse> {
        let uri = request.uri.clone();
        match tokio::time::timeout(self.timeout, self.inner.send(request)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(uri = %uri, timeout_ms = self.timeout.as_millis() as u64, "pod request timed out");
                Err(TransportError::Timeout {
                    uri,
                    after_ms: self.timeout.as_millis() as u64,
                })
            }
        }
    }
}
