//! PodShare Transport - the object-store protocol boundary.
//!
//! Everything PodShare does to a pod goes through [`PodClient`]. The HTTP
//! implementation attaches proof-of-possession credentials from a
//! [`TokenProvider`]; [`InMemoryPod`] serves the same protocol from memory.

#![deny(unsafe_code)]

pub mod auth;
mod client;
mod error;
pub mod http;
pub mod memory;

pub use auth::{Anonymous, StaticTokens, TokenPair, TokenProvider};
pub use client::{
    BoundedClient, Method, PodClient, PodRequest, PodResponse, JSON_LD, SPARQL_UPDATE,
    TEXT_TURTLE,
};
pub use error::{TransportError, TransportResult};
pub use http::HttpPodClient;
pub use memory::InMemoryPod;
