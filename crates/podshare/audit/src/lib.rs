//! PodShare Audit - the permission log replicated into every involved pod.
//!
//! Writing: [`AuditLog::record`] assigns one id per event and appends it to
//! the granter's, owner's and recipient's logs. Reading: [`AuditLog::read`]
//! decodes one principal's log into an [`AuditLogView`] with query helpers.

#![deny(unsafe_code)]

pub mod codec;
mod error;
mod id;
pub mod layout;
pub mod line;
mod log;
pub mod query;

pub use error::AuditError;
pub use id::IdGenerator;
pub use layout::LogLayout;
pub use log::{
    targets, AuditLog, AuditRole, AuditTarget, AuditWriteReport, OutgoingRecord, TargetOutcome,
};
pub use query::AuditLogView;
