use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Access mode namespace used by the policy vocabulary.
pub const ACL_NS: &str = "http://www.w3.org/ns/auth/acl#";

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Permission {
    Read,
    Write,
    Append,
    Control,
}

impl Permission {
    pub const ALL: [Permission; 4] = [
        Permission::Read,
        Permission::Write,
        Permission::Append,
        Permission::Control,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Permission::Read => "Read",
            Permission::Write => "Write",
            Permission::Append => "Append",
            Permission::Control => "Control",
        }
    }

    /// Prefixed term, e.g. `acl:Read`.
    pub fn term(&self) -> String {
        format!("acl:{}", self.name())
    }

    /// Full IRI, e.g. `http://www.w3.org/ns/auth/acl#Read`.
    pub fn iri(&self) -> String {
        format!("{}{}", ACL_NS, self.name())
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Permission {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let term = s.trim();
        let term = term
            .strip_prefix(ACL_NS)
            .or_else(|| term.strip_prefix("acl:"))
            .unwrap_or(term);
        match term.to_ascii_lowercase().as_str() {
            "read" => Ok(Permission::Read),
            "write" => Ok(Permission::Write),
            "append" => Ok(Permission::Append),
            "control" => Ok(Permission::Control),
            other => Err(ValidationError::InvalidPermission(other.to_string())),
        }
    }
}

/// An ordered set of permissions. Ordering makes sets usable as map keys and
/// keeps compiled documents deterministic.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(BTreeSet<Permission>);

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// {Read, Write, Control}: what an owner always holds.
    pub fn full_control() -> Self {
        [Permission::Read, Permission::Write, Permission::Control]
            .into_iter()
            .collect()
    }

    pub fn read_only() -> Self {
        std::iter::once(Permission::Read).collect()
    }

    pub fn contains(&self, permission: Permission) -> bool {
        self.0.contains(&permission)
    }

    pub fn insert(&mut self, permission: Permission) -> bool {
        self.0.insert(permission)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = Permission> + '_ {
        self.0.iter().copied()
    }

    /// Keep only permissions also present in `ceiling`.
    pub fn restrict_to(&self, ceiling: &PermissionSet) -> PermissionSet {
        self.0.intersection(&ceiling.0).copied().collect()
    }

    /// Parse a comma separated list (`read,write`).
    pub fn parse_list(raw: &str) -> Result<Self, ValidationError> {
        raw.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(Permission::from_str)
            .collect()
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = Permission>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for PermissionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.0.iter().map(Permission::name).collect();
        f.write_str(&names.join(","))
    }
}
