//! The share/revoke saga.
//!
//! ```text
//! Started ──policy write ok──▶ PolicyApplied ──audit, notify, outgoing──▶ Done
//!    └──────policy write err──▶ PolicyFailed
//! ```
//!
//! The policy write is the only commit point. Every later step is best
//! effort: its failure becomes a warning and nothing is rolled back.
//! Cancellation skips steps that have not started yet.

use crate::cancel::CancelSignal;
use crate::config::SharingConfig;
use crate::error::SharingError;
use crate::notify::NotificationDispatcher;
use podshare_audit::{targets, AuditError, AuditLog};
use podshare_policy::{
    CompileOptions, Grants, PermissionSummary, PolicyCompiler, PolicyStore, RawPolicy,
};
use podshare_transport::{BoundedClient, PodClient};
use podshare_types::{
    AuditEntry, AuditEntryId, AuditEntryType, AuditEvent, Clock, PermissionSet, Principal,
    ResourceUri, SharePattern, ValidationError,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

/// Grant `permissions` on `resource` to `recipient`.
#[derive(Clone, Debug)]
pub struct ShareRequest {
    pub resource: String,
    pub owner: String,
    /// Defaults to the owner.
    pub granter: Option<String>,
    pub recipient: String,
    pub permissions: PermissionSet,
    pub pattern: SharePattern,
    pub options: CompileOptions,
    /// Grants already in force. The policy is replaced wholesale, so these
    /// are compiled in alongside the new grant.
    pub existing: Grants,
}

impl ShareRequest {
    pub fn new(
        resource: impl Into<String>,
        owner: impl Into<String>,
        recipient: impl Into<String>,
        permissions: PermissionSet,
        pattern: SharePattern,
    ) -> Self {
        Self {
            resource: resource.into(),
            owner: owner.into(),
            granter: None,
            recipient: recipient.into(),
            permissions,
            pattern,
            options: CompileOptions::default(),
            existing: Grants::new(),
        }
    }

    pub fn with_granter(mut self, granter: impl Into<String>) -> Self {
        self.granter = Some(granter.into());
        self
    }

    pub fn with_options(mut self, options: CompileOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_existing(mut self, existing: Grants) -> Self {
        self.existing = existing;
        self
    }
}

/// Withdraw `recipient`'s access to `resource`.
#[derive(Clone, Debug)]
pub struct RevokeRequest {
    pub resource: String,
    pub owner: String,
    pub granter: Option<String>,
    pub recipient: String,
    /// What the recipient held, for the log entry.
    pub permissions: PermissionSet,
    pub pattern: SharePattern,
    pub options: CompileOptions,
    /// Grants that stay in force. Any spelling of the recipient is removed.
    pub remaining: Grants,
}

impl RevokeRequest {
    pub fn new(
        resource: impl Into<String>,
        owner: impl Into<String>,
        recipient: impl Into<String>,
        permissions: PermissionSet,
    ) -> Self {
        Self {
            resource: resource.into(),
            owner: owner.into(),
            granter: None,
            recipient: recipient.into(),
            permissions,
            pattern: SharePattern::OwnerOnly,
            options: CompileOptions::default(),
            remaining: Grants::new(),
        }
    }

    pub fn with_granter(mut self, granter: impl Into<String>) -> Self {
        self.granter = Some(granter.into());
        self
    }

    /// Keep `remaining` under `pattern` in the rewritten policy.
    pub fn keeping(mut self, pattern: SharePattern, remaining: Grants) -> Self {
        self.pattern = pattern;
        self.remaining = remaining;
        self
    }

    pub fn with_options(mut self, options: CompileOptions) -> Self {
        self.options = options;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SagaState {
    Started,
    PolicyApplied,
    PolicyFailed,
    Done,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SagaStep {
    Audit,
    Notify,
    OutgoingLog,
}

impl fmt::Display for SagaStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SagaStep::Audit => "audit",
            SagaStep::Notify => "notify",
            SagaStep::OutgoingLog => "outgoing log",
        })
    }
}

/// Non-fatal problems after the policy was committed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ShareWarning {
    AuditPartial { failed: Vec<Principal> },
    AuditFailed { reason: String },
    NotificationFailed { reason: String },
    OutgoingLogFailed { reason: String },
    Skipped { step: SagaStep },
}

impl fmt::Display for ShareWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShareWarning::AuditPartial { failed } => {
                let names: Vec<_> = failed.iter().map(Principal::as_str).collect();
                write!(f, "audit log not written for {}", names.join(", "))
            }
            ShareWarning::AuditFailed { reason } => write!(f, "audit failed: {}", reason),
            ShareWarning::NotificationFailed { reason } => {
                write!(f, "notification failed: {}", reason)
            }
            ShareWarning::OutgoingLogFailed { reason } => {
                write!(f, "outgoing log failed: {}", reason)
            }
            ShareWarning::Skipped { step } => write!(f, "{} skipped after cancellation", step),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ShareResult {
    pub policy_applied: bool,
    /// Per log target: whether its replica was written.
    pub audit_outcome: BTreeMap<Principal, bool>,
    pub notified: bool,
    /// Set when the entry reached at least one log.
    pub entry_id: Option<AuditEntryId>,
    pub warnings: Vec<ShareWarning>,
    pub state: SagaState,
}

impl ShareResult {
    fn started() -> Self {
        Self {
            policy_applied: false,
            audit_outcome: BTreeMap::new(),
            notified: false,
            entry_id: None,
            warnings: vec![],
            state: SagaState::Started,
        }
    }

    fn skip(&mut self, step: SagaStep) {
        warn!(step = %step, "saga step skipped after cancellation");
        self.warnings.push(ShareWarning::Skipped { step });
    }
}

/// A stored policy plus its coarse permission summary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Inspection {
    pub policy: RawPolicy,
    pub summary: PermissionSummary,
}

struct Intent<'a> {
    resource: ResourceUri,
    owner: Principal,
    granter: Principal,
    recipient: Principal,
    permissions: PermissionSet,
    entry_type: AuditEntryType,
    pattern: SharePattern,
    options: &'a CompileOptions,
    grants: Grants,
    notify: bool,
}

pub struct SharingOrchestrator {
    compiler: PolicyCompiler,
    policies: PolicyStore,
    audit: AuditLog,
    notifier: NotificationDispatcher,
    config: SharingConfig,
}

impl SharingOrchestrator {
    /// Every object-store call made through `client` is bounded by
    /// `config.request_timeout_ms`.
    pub fn new(client: Arc<dyn PodClient>, clock: Arc<dyn Clock>, config: SharingConfig) -> Self {
        let client: Arc<dyn PodClient> =
            Arc::new(BoundedClient::new(client, config.request_timeout()));
        Self {
            compiler: PolicyCompiler::new(clock.clone()),
            policies: PolicyStore::new(client.clone()).with_suffix(config.acr_suffix.clone()),
            audit: AuditLog::new(client.clone(), clock)
                .with_layout(config.audit.clone())
                .with_policy_suffix(config.acr_suffix.clone()),
            notifier: NotificationDispatcher::new(client),
            config,
        }
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn config(&self) -> &SharingConfig {
        &self.config
    }

    pub async fn share(
        &self,
        request: ShareRequest,
        cancel: CancelSignal,
    ) -> Result<ShareResult, SharingError> {
        if request.permissions.is_empty() {
            let reason = "no permissions requested".to_string();
            return Err(ValidationError::InvalidPermission(reason).into());
        }
        let owner = Principal::parse(&request.owner)?;
        let recipient = Principal::parse(&request.recipient)?;
        let granter = match &request.granter {
            Some(granter) => Principal::parse(granter)?,
            None => owner.clone(),
        };
        let grants = request
            .existing
            .clone()
            .with(request.permissions.clone(), recipient.as_str());

        self.run(
            Intent {
                resource: ResourceUri::parse(&request.resource)?,
                owner,
                granter,
                recipient,
                permissions: request.permissions.clone(),
                entry_type: AuditEntryType::Grant,
                pattern: request.pattern,
                options: &request.options,
                grants,
                notify: self.config.notify,
            },
            cancel,
        )
        .await
    }

    pub async fn revoke(
        &self,
        request: RevokeRequest,
        cancel: CancelSignal,
    ) -> Result<ShareResult, SharingError> {
        let owner = Principal::parse(&request.owner)?;
        let recipient = Principal::parse(&request.recipient)?;
        let granter = match &request.granter {
            Some(granter) => Principal::parse(granter)?,
            None => owner.clone(),
        };
        let grants = request.remaining.without(&recipient);

        self.run(
            Intent {
                resource: ResourceUri::parse(&request.resource)?,
                owner,
                granter,
                recipient,
                permissions: request.permissions.clone(),
                entry_type: AuditEntryType::Revoke,
                pattern: request.pattern,
                options: &request.options,
                grants,
                notify: self.config.notify && self.config.notify_on_revoke,
            },
            cancel,
        )
        .await
    }

    /// Give a newly created resource its owner-only policy. Not audited.
    pub async fn initialize_resource(&self, resource: &str, owner: &str) -> Result<(), SharingError> {
        let resource = ResourceUri::parse(resource)?;
        let document = self.compiler.compile(
            SharePattern::OwnerOnly,
            owner,
            &Grants::new(),
            &CompileOptions::default(),
        )?;
        self.policies.write(&resource, &document).await?;
        info!(resource = %resource, "resource initialized owner-only");
        Ok(())
    }

    pub async fn inspect(&self, resource: &str) -> Result<Option<Inspection>, SharingError> {
        let resource = ResourceUri::parse(resource)?;
        let policy = self
            .policies
            .fetch(&resource)
            .await
            .map_err(|err| SharingError::PolicyUnavailable(err.to_string()))?;
        Ok(policy.map(|policy| Inspection {
            summary: policy.summary(),
            policy,
        }))
    }

    async fn run(
        &self,
        intent: Intent<'_>,
        mut cancel: CancelSignal,
    ) -> Result<ShareResult, SharingError> {
        let mut result = ShareResult::started();

        let document =
            self.compiler
                .compile(intent.pattern, intent.owner.as_str(), &intent.grants, intent.options)?;
        let entry = self
            .audit
            .prepare(AuditEvent {
                resource: intent.resource.to_string(),
                owner: intent.owner.clone(),
                granter: intent.granter.clone(),
                recipient: intent.recipient.clone(),
                permissions: intent.permissions.clone(),
                entry_type: intent.entry_type,
                pattern: intent.pattern,
                expires_at: intent.options.expires_at,
            })
            .map_err(|err| match err {
                AuditError::Validation(err) => SharingError::Validation(err),
                other => SharingError::ShareFailed(other.to_string()),
            })?;

        if cancel.is_cancelled() {
            info!(resource = %intent.resource, "cancelled before policy write");
            return Err(SharingError::Cancelled);
        }
        if let Err(err) = self.policies.write(&intent.resource, &document).await {
            warn!(resource = %intent.resource, error = %err, state = ?SagaState::PolicyFailed, "policy not applied");
            return Err(err.into());
        }
        result.policy_applied = true;
        result.state = SagaState::PolicyApplied;
        info!(
            resource = %intent.resource,
            recipient = %intent.recipient,
            entry_type = %intent.entry_type,
            pattern = %intent.pattern,
            "policy committed"
        );

        // Replica writes are not interrupted once started; each is bounded
        // by the request timeout.
        let audit = if cancel.is_cancelled() {
            None
        } else {
            Some(self.audit.write(entry.clone()).await)
        };
        match audit {
            None => result.skip(SagaStep::Audit),
            Some(Ok(report)) => {
                result.audit_outcome = report.by_target();
                result.entry_id = Some(report.entry.id.clone());
                if report.is_partial() {
                    result.warnings.push(ShareWarning::AuditPartial {
                        failed: report.failures().map(|o| o.principal.clone()).collect(),
                    });
                }
            }
            Some(Err(err)) => {
                result.audit_outcome = targets(&entry)
                    .into_iter()
                    .map(|target| (target.principal, false))
                    .collect();
                result.warnings.push(ShareWarning::AuditFailed {
                    reason: err.to_string(),
                });
            }
        }

        if intent.notify {
            self.notify(&entry, &mut cancel, &mut result).await;
        }

        result.state = SagaState::Done;
        if !result.warnings.is_empty() {
            warn!(resource = %intent.resource, warnings = result.warnings.len(), "saga finished with warnings");
        }
        Ok(result)
    }

    async fn notify(&self, entry: &AuditEntry, cancel: &mut CancelSignal, result: &mut ShareResult) {
        let inbox = match race(cancel, self.notifier.notify(entry)).await {
            None => {
                result.skip(SagaStep::Notify);
                return;
            }
            Some(Ok(inbox)) => inbox,
            Some(Err(err)) => {
                result.warnings.push(ShareWarning::NotificationFailed {
                    reason: err.to_string(),
                });
                return;
            }
        };
        let Some(inbox) = inbox else {
            return;
        };
        result.notified = true;

        match race(cancel, self.audit.record_outgoing(entry, &inbox)).await {
            None => result.skip(SagaStep::OutgoingLog),
            Some(Ok(_)) => {}
            Some(Err(err)) => result.warnings.push(ShareWarning::OutgoingLogFailed {
                reason: err.to_string(),
            }),
        }
    }
}

/// Run `work` unless cancellation is requested first.
async fn race<F: Future>(cancel: &mut CancelSignal, work: F) -> Option<F::Output> {
    if cancel.is_cancelled() {
        return None;
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        output = work => Some(output),
    }
}
