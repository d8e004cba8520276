//! The replicated permission log.
//!
//! Every grant or revoke is written to the logs of up to three principals
//! (granter, owner, recipient). Replicas are independent: each one is
//! created on demand, then appended to with an insert-only update, so a
//! failing replica never blocks the others.

use crate::codec;
use crate::error::AuditError;
use crate::id::IdGenerator;
use crate::layout::LogLayout;
use crate::line::{format_line, parse_line, LOG_PREDICATE};
use crate::query::{sorted, AuditLogView};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use podshare_policy::{AccessControl, Matcher, Policy, PolicyDocument, PolicyStore};
use podshare_transport::{Method, PodClient, PodRequest, TEXT_TURTLE};
use podshare_types::{
    AuditEntry, AuditEntryId, AuditEntryType, AuditEvent, Clock, Permission, PermissionSet,
    Principal, ResourceUri,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Why a principal receives a copy of an entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditRole {
    Granter,
    Owner,
    Recipient,
}

impl fmt::Display for AuditRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AuditRole::Granter => "granter",
            AuditRole::Owner => "owner",
            AuditRole::Recipient => "recipient",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuditTarget {
    pub principal: Principal,
    pub roles: Vec<AuditRole>,
}

/// Distinct log targets for an event, in granter, owner, recipient order.
/// A principal holding several roles is written to once.
pub fn targets(entry: &AuditEntry) -> Vec<AuditTarget> {
    let mut targets: Vec<AuditTarget> = Vec::with_capacity(3);
    for (principal, role) in [
        (&entry.granter, AuditRole::Granter),
        (&entry.owner, AuditRole::Owner),
        (&entry.recipient, AuditRole::Recipient),
    ] {
        match targets.iter_mut().find(|t| &t.principal == principal) {
            Some(existing) => existing.roles.push(role),
            None => targets.push(AuditTarget {
                principal: principal.clone(),
                roles: vec![role],
            }),
        }
    }
    targets
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetOutcome {
    pub principal: Principal,
    pub roles: Vec<AuditRole>,
    pub log: String,
    pub error: Option<String>,
}

impl TargetOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of replicating one entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuditWriteReport {
    pub entry: AuditEntry,
    pub outcomes: Vec<TargetOutcome>,
}

impl AuditWriteReport {
    /// Some replicas were written and some were not.
    pub fn is_partial(&self) -> bool {
        self.outcomes.iter().any(TargetOutcome::succeeded)
            && self.outcomes.iter().any(|o| !o.succeeded())
    }

    pub fn outcome_for(&self, principal: &Principal) -> Option<bool> {
        self.outcomes
            .iter()
            .find(|outcome| &outcome.principal == principal)
            .map(TargetOutcome::succeeded)
    }

    pub fn by_target(&self) -> BTreeMap<Principal, bool> {
        self.outcomes
            .iter()
            .map(|outcome| (outcome.principal.clone(), outcome.succeeded()))
            .collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = &TargetOutcome> {
        self.outcomes.iter().filter(|outcome| !outcome.succeeded())
    }
}

/// A delivered notification, as noted in the granter's outgoing log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingRecord {
    pub entry: AuditEntryId,
    pub resource: String,
    pub recipient: Principal,
    #[serde(rename = "type")]
    pub entry_type: AuditEntryType,
    pub inbox: String,
    pub sent_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "v")]
enum OutgoingLine {
    #[serde(rename = "1")]
    V1(OutgoingRecord),
}

pub struct AuditLog {
    client: Arc<dyn PodClient>,
    clock: Arc<dyn Clock>,
    layout: LogLayout,
    policies: PolicyStore,
    ids: IdGenerator,
}

impl AuditLog {
    pub fn new(client: Arc<dyn PodClient>, clock: Arc<dyn Clock>) -> Self {
        Self {
            policies: PolicyStore::new(client.clone()),
            client,
            clock,
            layout: LogLayout::default(),
            ids: IdGenerator::new(),
        }
    }

    pub fn with_layout(mut self, layout: LogLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_policy_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.policies = PolicyStore::new(self.client.clone()).with_suffix(suffix);
        self
    }

    pub fn layout(&self) -> &LogLayout {
        &self.layout
    }

    /// Assign an id and timestamp to `event` and append it to every
    /// target's permission log concurrently.
    ///
    /// Succeeds when at least one replica was written.
    pub async fn record(&self, event: AuditEvent) -> Result<AuditWriteReport, AuditError> {
        let entry = self.prepare(event)?;
        self.write(entry).await
    }

    /// Validate `event` and turn it into an entry without writing it.
    pub fn prepare(&self, event: AuditEvent) -> Result<AuditEntry, AuditError> {
        ResourceUri::parse(&event.resource)?;
        let timestamp = self.clock.now();
        let id = self.ids.next(timestamp);
        Ok(AuditEntry::from_event(id, timestamp, event))
    }

    /// Replicate a prepared entry to its targets' permission logs.
    pub async fn write(&self, entry: AuditEntry) -> Result<AuditWriteReport, AuditError> {
        let targets = targets(&entry);
        let line = format_line(&entry.id, &codec::encode(&entry));

        let writes = targets.into_iter().map(|target| {
            let line = line.as_str();
            async move {
                let log = self.layout.permission_log_for(&target.principal);
                let error = self.append(&target.principal, &log, line, true).await.err();
                if let Some(reason) = &error {
                    warn!(principal = %target.principal, log = %log, reason = %reason, "audit replica not written");
                }
                TargetOutcome {
                    principal: target.principal,
                    roles: target.roles,
                    log,
                    error,
                }
            }
        });
        let outcomes = join_all(writes).await;
        let report = AuditWriteReport { entry, outcomes };

        if !report.outcomes.iter().any(TargetOutcome::succeeded) {
            let reason = report
                .failures()
                .map(|o| format!("{}: {}", o.principal, o.error.as_deref().unwrap_or("")))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(AuditError::AuditWriteFailed {
                entry_id: report.entry.id.to_string(),
                reason,
            });
        }
        info!(
            entry = %report.entry.id,
            resource = %report.entry.resource,
            entry_type = %report.entry.entry_type,
            replicas = report.outcomes.len(),
            partial = report.is_partial(),
            "audit entry recorded"
        );
        Ok(report)
    }

    /// Note a delivered notification in the granter's outgoing log.
    pub async fn record_outgoing(
        &self,
        entry: &AuditEntry,
        inbox: &str,
    ) -> Result<OutgoingRecord, AuditError> {
        let record = OutgoingRecord {
            entry: entry.id.clone(),
            resource: entry.resource.clone(),
            recipient: entry.recipient.clone(),
            entry_type: entry.entry_type,
            inbox: inbox.to_string(),
            sent_at: self.clock.now(),
        };
        let encoded = serde_json::to_string(&OutgoingLine::V1(record.clone())).map_err(|err| {
            AuditError::AuditWriteFailed {
                entry_id: entry.id.to_string(),
                reason: err.to_string(),
            }
        })?;
        let log = self.layout.outgoing_log_for(&entry.granter);
        self.append(&entry.granter, &log, &format_line(&entry.id, &encoded), false)
            .await
            .map_err(|reason| AuditError::AuditWriteFailed {
                entry_id: entry.id.to_string(),
                reason,
            })?;
        debug!(entry = %entry.id, inbox = %inbox, "outgoing notification logged");
        Ok(record)
    }

    /// Read `principal`'s permission log, newest first.
    pub async fn read(&self, principal: &Principal) -> Result<AuditLogView, AuditError> {
        let log = self.layout.permission_log_for(principal);
        let Some(body) = self.fetch(&log).await? else {
            return Ok(AuditLogView::default());
        };

        let mut view = AuditLogView::default();
        let mut seen = HashSet::new();
        for (id, record) in log_lines(&body, &mut view.skipped) {
            if !seen.insert(id.clone()) {
                continue;
            }
            match codec::decode(id, &record, self.clock.as_ref()) {
                Ok(decoded) => {
                    if decoded.timestamp_recovered {
                        warn!(log = %log, entry = %decoded.entry.id, "unreadable timestamp replaced with read time");
                        view.recovered.push(decoded.entry.id.clone());
                    }
                    view.entries.push(decoded.entry);
                }
                Err(err) => {
                    debug!(log = %log, error = %err, "skipping undecodable record");
                    view.skipped += 1;
                }
            }
        }
        view.entries = sorted(view.entries);
        if view.skipped > 0 {
            warn!(log = %log, skipped = view.skipped, "audit log contains unreadable lines");
        }
        Ok(view)
    }

    /// Read `principal`'s outgoing log, newest first. Unreadable lines are dropped.
    pub async fn read_outgoing(
        &self,
        principal: &Principal,
    ) -> Result<Vec<OutgoingRecord>, AuditError> {
        let log = self.layout.outgoing_log_for(principal);
        let Some(body) = self.fetch(&log).await? else {
            return Ok(vec![]);
        };
        let mut skipped = 0;
        let mut records: Vec<OutgoingRecord> = log_lines(&body, &mut skipped)
            .into_iter()
            .filter_map(|(_, record)| match serde_json::from_str(&record) {
                Ok(OutgoingLine::V1(record)) => Some(record),
                Err(_) => None,
            })
            .collect();
        records.sort_by(|a, b| b.sent_at.cmp(&a.sent_at).then_with(|| b.entry.cmp(&a.entry)));
        Ok(records)
    }

    async fn fetch(&self, log: &str) -> Result<Option<String>, AuditError> {
        let response = self
            .client
            .send(PodRequest::get(log))
            .await
            .map_err(|err| AuditError::ReadFailed {
                log: log.to_string(),
                status: None,
                reason: err.to_string(),
            })?;
        if response.is_not_found() {
            return Ok(None);
        }
        if !response.is_success() {
            return Err(AuditError::ReadFailed {
                log: log.to_string(),
                status: Some(response.status),
                reason: "store refused log read".to_string(),
            });
        }
        Ok(Some(response.body))
    }

    async fn append(
        &self,
        owner: &Principal,
        log: &str,
        line: &str,
        public_append: bool,
    ) -> Result<(), String> {
        self.ensure_log(owner, log, public_append).await?;
        let response = self
            .client
            .send(PodRequest::insert_data(log, line))
            .await
            .map_err(|err| err.to_string())?;
        if response.is_success() {
            Ok(())
        } else {
            Err(format!("append rejected with status {}", response.status))
        }
    }

    /// Create the log and its policy when it does not exist yet. A readable
    /// log whose policy is missing gets the policy written again. A log that
    /// exists but cannot be read by the caller is left alone.
    async fn ensure_log(
        &self,
        owner: &Principal,
        log: &str,
        public_append: bool,
    ) -> Result<(), String> {
        let resource = ResourceUri::parse(log).map_err(|err| err.to_string())?;
        let head = self
            .client
            .send(PodRequest::new(Method::Head, log))
            .await
            .map_err(|err| err.to_string())?;
        match head.status {
            status if (200..300).contains(&status) => {
                return self.ensure_log_policy(owner, &resource, public_append).await;
            }
            401 | 403 => return Ok(()),
            404 => {}
            status => return Err(format!("log check failed with status {}", status)),
        }

        let created = self
            .client
            .send(PodRequest::put(log, TEXT_TURTLE, "").with_header("if-none-match", "*"))
            .await
            .map_err(|err| err.to_string())?;
        if created.status == 412 {
            return self.ensure_log_policy(owner, &resource, public_append).await;
        }
        if !created.is_success() {
            return Err(format!("log creation failed with status {}", created.status));
        }

        self.write_log_policy(owner, &resource, public_append).await?;
        info!(log = %log, owner = %owner, "audit log created");
        Ok(())
    }

    /// Write the log policy when none is stored. An unreadable policy is
    /// left to whoever can read it.
    async fn ensure_log_policy(
        &self,
        owner: &Principal,
        log: &ResourceUri,
        public_append: bool,
    ) -> Result<(), String> {
        match self.policies.fetch(log).await {
            Ok(Some(_)) => Ok(()),
            Ok(None) => {
                warn!(log = %log, owner = %owner, "audit log has no policy, restoring it");
                self.write_log_policy(owner, log, public_append).await
            }
            Err(err) => {
                debug!(log = %log, error = %err, "log policy not readable");
                Ok(())
            }
        }
    }

    async fn write_log_policy(
        &self,
        owner: &Principal,
        log: &ResourceUri,
        public_append: bool,
    ) -> Result<(), String> {
        self.policies
            .write(log, &log_policy(owner, public_append))
            .await
            .map_err(|err| err.to_string())
    }
}

/// Owner full control; other principals may only add lines.
fn log_policy(owner: &Principal, public_append: bool) -> PolicyDocument {
    let document = PolicyDocument::owner_only(owner);
    if !public_append {
        return document;
    }
    let append: PermissionSet = [Permission::Append, Permission::Write].into_iter().collect();
    document.with_control(AccessControl::new(
        "public-append",
        Policy::new(append, Matcher::PublicAgent),
    ))
}

/// Lines carrying the log predicate, split into id and record. Marked lines
/// that do not parse are counted in `skipped`.
fn log_lines(body: &str, skipped: &mut usize) -> Vec<(AuditEntryId, String)> {
    body.lines()
        .filter(|line| line.contains(LOG_PREDICATE))
        .filter_map(|line| {
            let parsed = parse_line(line);
            if parsed.is_none() {
                *skipped += 1;
            }
            parsed
        })
        .collect()
}
