//! Read-side views over decoded entries.
//!
//! All results are ordered newest first, ties broken by id descending.

use podshare_types::{AuditEntry, AuditEntryId, Principal};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// One principal's permission log as read back.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogView {
    pub entries: Vec<AuditEntry>,
    /// Lines that carried the log markers but could not be decoded.
    pub skipped: usize,
    /// Entries whose timestamp was unreadable and replaced at read time.
    pub recovered: Vec<AuditEntryId>,
}

impl AuditLogView {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn latest_per_resource(&self) -> Vec<AuditEntry> {
        latest_per_resource(&self.entries)
    }

    pub fn filter_by_resource(&self, needle: &str) -> Vec<AuditEntry> {
        filter_by_resource(&self.entries, needle)
    }

    pub fn filter_by_owner(&self, owner: &Principal) -> Vec<AuditEntry> {
        filter_by_owner(&self.entries, owner)
    }

    pub fn shared_with_me(&self, me: &Principal) -> Vec<AuditEntry> {
        shared_with_me(&self.entries, me)
    }

    pub fn shared_by_me(&self, me: &Principal) -> Vec<AuditEntry> {
        shared_by_me(&self.entries, me)
    }

    pub fn effective_grants(&self) -> Vec<AuditEntry> {
        effective_grants(&self.entries)
    }
}

pub fn newest_first(a: &AuditEntry, b: &AuditEntry) -> Ordering {
    b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id))
}

pub fn sorted(mut entries: Vec<AuditEntry>) -> Vec<AuditEntry> {
    entries.sort_by(newest_first);
    entries
}

/// The newest entry for every resource.
pub fn latest_per_resource(entries: &[AuditEntry]) -> Vec<AuditEntry> {
    latest_by(entries, |entry| entry.resource.clone())
}

/// Entries whose resource contains `needle`.
pub fn filter_by_resource(entries: &[AuditEntry], needle: &str) -> Vec<AuditEntry> {
    select(entries, |entry| entry.resource.contains(needle))
}

pub fn filter_by_owner(entries: &[AuditEntry], owner: &Principal) -> Vec<AuditEntry> {
    select(entries, |entry| &entry.owner == owner)
}

/// Grants received by `me`.
pub fn shared_with_me(entries: &[AuditEntry], me: &Principal) -> Vec<AuditEntry> {
    select(entries, |entry| entry.is_grant() && &entry.recipient == me)
}

/// Grants issued by `me`.
pub fn shared_by_me(entries: &[AuditEntry], me: &Principal) -> Vec<AuditEntry> {
    select(entries, |entry| entry.is_grant() && &entry.granter == me)
}

/// Grants still standing: the newest entry per (resource, recipient), kept
/// only when it is a grant.
pub fn effective_grants(entries: &[AuditEntry]) -> Vec<AuditEntry> {
    latest_by(entries, |entry| (entry.resource.clone(), entry.recipient.clone()))
        .into_iter()
        .filter(AuditEntry::is_grant)
        .collect()
}

fn select(entries: &[AuditEntry], keep: impl Fn(&AuditEntry) -> bool) -> Vec<AuditEntry> {
    sorted(entries.iter().filter(|entry| keep(entry)).cloned().collect())
}

fn latest_by<K: Ord>(entries: &[AuditEntry], key: impl Fn(&AuditEntry) -> K) -> Vec<AuditEntry> {
    let mut latest: BTreeMap<K, &AuditEntry> = BTreeMap::new();
    for entry in entries {
        let slot = latest.entry(key(entry)).or_insert(entry);
        if newest_first(entry, *slot) == Ordering::Less {
            *slot = entry;
        }
    }
    sorted(latest.into_values().cloned().collect())
}
