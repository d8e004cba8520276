//! PodShare Policy - turns sharing intents into access control documents
//! and keeps them next to the resources they govern.

#![deny(unsafe_code)]

pub mod compiler;
pub mod document;
mod error;
pub mod store;

pub use compiler::{CompileOptions, Grants, PolicyCompiler};
pub use document::{AccessControl, Matcher, Policy, PolicyDocument, OWNER_CONTROL_ID};
pub use error::PolicyError;
pub use store::{PermissionSummary, PolicyStore, RawPolicy, DEFAULT_ACR_SUFFIX};
