//! In-memory pod for tests and local runs.
//!
//! Implements just enough of the object-store protocol for PodShare:
//! whole-document PUT with implicit parent containers, insert-only SPARQL
//! PATCH applied under one lock, POST into containers, DELETE, and
//! `If-None-Match: *` create guards. Faults can be injected per URI prefix
//! and method.

use crate::{Method, PodClient, PodRequest, PodResponse, TransportError, TransportResult};
use crate::{SPARQL_UPDATE, TEXT_TURTLE};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::RwLock;

const CONTAINER_LINK: &str = "<http://www.w3.org/ns/ldp#BasicContainer>; rel=\"type\"";
const RESOURCE_LINK: &str = "<http://www.w3.org/ns/ldp#Resource>; rel=\"type\"";

#[derive(Clone, Debug)]
struct Fault {
    prefix: String,
    method: Option<Method>,
    status: u16,
}

#[derive(Default)]
pub struct InMemoryPod {
    resources: RwLock<BTreeMap<String, String>>,
    faults: RwLock<Vec<Fault>>,
    requests: RwLock<Vec<(Method, String)>>,
}

impl InMemoryPod {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document directly, bypassing the request log.
    pub fn insert(&self, uri: &str, body: &str) {
        if let Ok(mut guard) = self.resources.write() {
            create_parents(&mut guard, uri);
            guard.insert(uri.to_string(), body.to_string());
        }
    }

    pub fn body(&self, uri: &str) -> Option<String> {
        self.resources
            .read()
            .ok()
            .and_then(|guard| guard.get(uri).cloned())
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.body(uri).is_some()
    }

    /// Answer every matching request with `status` instead of serving it.
    pub fn fail_with(&self, prefix: &str, method: Option<Method>, status: u16) {
        if let Ok(mut guard) = self.faults.write() {
            guard.push(Fault {
                prefix: prefix.to_string(),
                method,
                status,
            });
        }
    }

    pub fn clear_faults(&self) {
        if let Ok(mut guard) = self.faults.write() {
            guard.clear();
        }
    }

    /// Every request seen so far, in arrival order.
    pub fn requests(&self) -> Vec<(Method, String)> {
        self.requests
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn count(&self, method: Method, prefix: &str) -> usize {
        self.requests()
            .iter()
            .filter(|(m, uri)| *m == method && uri.starts_with(prefix))
            .count()
    }

    fn fault_for(&self, request: &PodRequest) -> Option<u16> {
        let guard = self.faults.read().ok()?;
        guard
            .iter()
            .find(|fault| {
                request.uri.starts_with(&fault.prefix)
                    && fault.method.map_or(true, |m| m == request.method)
            })
            .map(|fault| fault.status)
    }

    fn serve(&self, request: PodRequest) -> TransportResult<PodResponse> {
        let mut guard = self
            .resources
            .write()
            .map_err(|_| TransportError::Backend("pod lock poisoned".to_string()))?;

        let response = match request.method {
            Method::Get | Method::Head => match guard.get(&request.uri) {
                Some(body) => {
                    let mut response = PodResponse::status(200);
                    response.headers.push(("link".to_string(), link_for(&request.uri)));
                    response
                        .headers
                        .push(("content-type".to_string(), TEXT_TURTLE.to_string()));
                    if request.method == Method::Get {
                        response.body = body.clone();
                    }
                    response
                }
                None => PodResponse::status(404),
            },
            Method::Put => {
                let exists = guard.contains_key(&request.uri);
                if exists && request.header("if-none-match") == Some("*") {
                    PodResponse::status(412)
                } else {
                    create_parents(&mut guard, &request.uri);
                    guard.insert(request.uri.clone(), request.body.unwrap_or_default());
                    PodResponse::status(if exists { 205 } else { 201 })
                }
            }
            Method::Patch => {
                if request.header("content-type") != Some(SPARQL_UPDATE) {
                    PodResponse::status(415)
                } else {
                    match request.body.as_deref().and_then(insert_data_payload) {
                        Some(triples) => {
                            let exists = guard.contains_key(&request.uri);
                            create_parents(&mut guard, &request.uri);
                            let document = guard.entry(request.uri.clone()).or_default();
                            if !document.is_empty() && !document.ends_with('\n') {
                                document.push('\n');
                            }
                            document.push_str(&triples);
                            document.push('\n');
                            PodResponse::status(if exists { 205 } else { 201 })
                        }
                        None => PodResponse::status(400),
                    }
                }
            }
            Method::Post => {
                if !request.uri.ends_with('/') || !guard.contains_key(&request.uri) {
                    PodResponse::status(404)
                } else {
                    let children = guard
                        .keys()
                        .filter(|key| key.starts_with(&request.uri) && *key != &request.uri)
                        .count();
                    let location = match request.header("slug") {
                        Some(slug) => format!("{}{}", request.uri, slug),
                        None => format!("{}{}", request.uri, children + 1),
                    };
                    guard.insert(location.clone(), request.body.unwrap_or_default());
                    let mut response = PodResponse::status(201);
                    response.headers.push(("location".to_string(), location));
                    response
                }
            }
            Method::Delete => match guard.remove(&request.uri) {
                Some(_) => PodResponse::status(204),
                None => PodResponse::status(404),
            },
        };
        Ok(response)
    }
}

#[async_trait]
impl PodClient for InMemoryPod {
    async fn send(&self, request: PodRequest) -> TransportResult<PodResponse> {
        if let Ok(mut log) = self.requests.write() {
            log.push((request.method, request.uri.clone()));
        }
        if let Some(status) = self.fault_for(&request) {
            return Ok(PodResponse::status(status));
        }
        self.serve(request)
    }
}

fn link_for(uri: &str) -> String {
    if uri.ends_with('/') {
        CONTAINER_LINK.to_string()
    } else {
        RESOURCE_LINK.to_string()
    }
}

/// Register every ancestor container of `uri` below its origin.
fn create_parents(resources: &mut BTreeMap<String, String>, uri: &str) {
    let Some(scheme_end) = uri.find("://") else {
        return;
    };
    let path_start = match uri[scheme_end + 3..].find('/') {
        Some(offset) => scheme_end + 3 + offset,
        None => return,
    };
    let trimmed = uri.trim_end_matches('/');
    for (index, _) in trimmed.match_indices('/').filter(|(i, _)| *i >= path_start) {
        resources
            .entry(uri[..=index].to_string())
            .or_default();
    }
}

/// Extract the triples of an `INSERT DATA { ... }` update. Anything else,
/// including updates that delete, is rejected.
fn insert_data_payload(body: &str) -> Option<String> {
    let trimmed = body.trim();
    let rest = trimmed.strip_prefix("INSERT DATA")?.trim_start();
    let inner = rest.strip_prefix('{')?.strip_suffix('}')?;
    let triples = inner.trim();
    if triples.is_empty() {
        None
    } else {
        Some(triples.to_string())
    }
}
