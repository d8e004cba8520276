//! PodShare Types - the vocabulary shared by every PodShare crate.
//!
//! Principals, resources, permissions, share patterns, audit entries and the
//! injectable clock live here so that the compiler, the stores and the saga
//! agree on one canonical representation.

#![deny(unsafe_code)]

mod audit;
mod clock;
mod error;
mod pattern;
mod permission;
mod principal;
mod resource;

pub use audit::{AuditEntry, AuditEntryId, AuditEntryType, AuditEvent};
pub use clock::{Clock, FixedClock, SteppingClock, SystemClock};
pub use error::ValidationError;
pub use pattern::SharePattern;
pub use permission::{Permission, PermissionSet, ACL_NS};
pub use principal::{normalize, Principal, PROFILE_FRAGMENT};
pub use resource::ResourceUri;
