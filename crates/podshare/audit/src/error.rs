use podshare_types::ValidationError;
use thiserror::Error;

/// Audit failures. A write that reached only some logs is not an error; see
/// [`crate::AuditWriteReport::is_partial`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuditError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("audit entry {entry_id} was not written to any log: {reason}")]
    AuditWriteFailed { entry_id: String, reason: String },

    #[error("audit log {log} could not be read (status {status:?}): {reason}")]
    ReadFailed {
        log: String,
        status: Option<u16>,
        reason: String,
    },
}
