use crate::{PermissionSet, Principal, SharePattern};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one logical grant/revoke event. Every replica of the event
/// carries the same id.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditEntryId(pub String);

impl AuditEntryId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AuditEntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditEntryType {
    Grant,
    Revoke,
}

impl AuditEntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEntryType::Grant => "grant",
            AuditEntryType::Revoke => "revoke",
        }
    }
}

impl fmt::Display for AuditEntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A grant/revoke event before it has been assigned an id and timestamp.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuditEvent {
    pub resource: String,
    pub owner: Principal,
    pub granter: Principal,
    pub recipient: Principal,
    pub permissions: PermissionSet,
    pub entry_type: AuditEntryType,
    pub pattern: SharePattern,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Immutable record of one grant/revoke event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: AuditEntryId,
    pub timestamp: DateTime<Utc>,
    pub resource: String,
    pub owner: Principal,
    pub granter: Principal,
    pub recipient: Principal,
    pub permissions: PermissionSet,
    pub entry_type: AuditEntryType,
    pub pattern: SharePattern,
    pub expires_at: Option<DateTime<Utc>>,
    /// Set by the reader when the stored timestamp could not be parsed and
    /// was replaced by the read time.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub timestamp_recovered: bool,
}

impl AuditEntry {
    pub fn from_event(id: AuditEntryId, timestamp: DateTime<Utc>, event: AuditEvent) -> Self {
        Self {
            id,
            timestamp,
            resource: event.resource,
            owner: event.owner,
            granter: event.granter,
            recipient: event.recipient,
            permissions: event.permissions,
            entry_type: event.entry_type,
            pattern: event.pattern,
            expires_at: event.expires_at,
            timestamp_recovered: false,
        }
    }

    pub fn is_grant(&self) -> bool {
        self.entry_type == AuditEntryType::Grant
    }
}
