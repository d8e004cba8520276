//! End-to-end share and revoke flows against an in-memory pod.

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use podshare_policy::Grants;
use podshare_sharing::{
    cancellation, CancelHandle, CancelSignal, RevokeRequest, SagaState, SagaStep, ShareRequest,
    ShareWarning, SharingConfig, SharingError, SharingOrchestrator,
};
use podshare_transport::{
    InMemoryPod, Method, PodClient, PodRequest, PodResponse, TransportResult,
};
use podshare_types::{Permission, PermissionSet, Principal, SharePattern, SteppingClock};
use std::sync::Arc;

const ALICE: &str = "https://alice.example/profile/card#me";
const BOB: &str = "https://bob.example/profile/card#me";
const CAROL: &str = "https://carol.example/profile/card#me";
const RESOURCE: &str = "https://alice.example/notes/r.ttl";
const RESOURCE_ACR: &str = "https://alice.example/notes/r.ttl.acr";
const BOB_PROFILE: &str = "https://bob.example/profile/card";
const BOB_INBOX: &str = "https://bob.example/inbox/";

fn p(raw: &str) -> Principal {
    Principal::parse(raw).unwrap()
}

fn clock() -> Arc<SteppingClock> {
    Arc::new(SteppingClock::new(
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
        Duration::seconds(1),
    ))
}

fn seeded_pod() -> Arc<InMemoryPod> {
    let pod = Arc::new(InMemoryPod::new());
    pod.insert(
        BOB_PROFILE,
        "@prefix ldp: <http://www.w3.org/ns/ldp#>.\n<#me> ldp:inbox </inbox/> .\n",
    );
    pod.insert(BOB_INBOX, "");
    pod
}

fn orchestrator(client: Arc<dyn PodClient>) -> SharingOrchestrator {
    SharingOrchestrator::new(client, clock(), SharingConfig::default())
}

fn read_share() -> ShareRequest {
    ShareRequest::new(
        RESOURCE,
        ALICE,
        BOB,
        PermissionSet::read_only(),
        "basic".parse().unwrap(),
    )
}

#[tokio::test]
async fn share_applies_policy_logs_both_sides_and_notifies() {
    let pod = seeded_pod();
    let sharing = orchestrator(pod.clone());

    let result = sharing.share(read_share(), CancelSignal::never()).await.unwrap();
    assert!(result.policy_applied);
    assert_eq!(result.state, SagaState::Done);
    assert!(result.notified);
    assert!(result.warnings.is_empty(), "{:?}", result.warnings);
    assert_eq!(result.audit_outcome.get(&p(ALICE)), Some(&true));
    assert_eq!(result.audit_outcome.get(&p(BOB)), Some(&true));

    let inspection = sharing.inspect(RESOURCE).await.unwrap().unwrap();
    assert!(inspection.summary.read);
    assert!(inspection.summary.control);
    assert!(inspection.policy.mentions(&p(ALICE)));
    assert!(inspection.policy.mentions(&p(BOB)));

    for who in [ALICE, BOB] {
        let view = sharing.audit().read(&p(who)).await.unwrap();
        assert_eq!(view.len(), 1);
        let entry = &view.entries[0];
        assert!(entry.is_grant());
        assert_eq!(entry.permissions, PermissionSet::read_only());
        assert_eq!(Some(&entry.id), result.entry_id.as_ref());
    }

    let bob_view = sharing.audit().read(&p(BOB)).await.unwrap();
    assert_eq!(bob_view.shared_with_me(&p(BOB))[0].resource, RESOURCE);
    let alice_view = sharing.audit().read(&p(ALICE)).await.unwrap();
    assert_eq!(alice_view.shared_by_me(&p(ALICE))[0].resource, RESOURCE);

    assert_eq!(pod.count(Method::Post, BOB_INBOX), 1);
    let outgoing = sharing.audit().read_outgoing(&p(ALICE)).await.unwrap();
    assert_eq!(outgoing.len(), 1);
    assert_eq!(outgoing[0].inbox, BOB_INBOX);
}

#[tokio::test]
async fn failed_policy_write_aborts_everything() {
    let pod = seeded_pod();
    pod.fail_with(RESOURCE_ACR, Some(Method::Put), 500);
    let sharing = orchestrator(pod.clone());

    let err = sharing.share(read_share(), CancelSignal::never()).await.unwrap_err();
    assert!(matches!(err, SharingError::ShareFailed(_)));

    assert_eq!(pod.count(Method::Patch, "https://"), 0);
    assert_eq!(pod.count(Method::Post, "https://"), 0);
    assert!(sharing.audit().read(&p(ALICE)).await.unwrap().is_empty());
    assert!(sharing.audit().read(&p(BOB)).await.unwrap().is_empty());
}

#[tokio::test]
async fn recipient_log_failure_is_a_warning() {
    let pod = seeded_pod();
    pod.fail_with("https://bob.example/audit/", None, 403);
    let sharing = orchestrator(pod.clone());

    let result = sharing.share(read_share(), CancelSignal::never()).await.unwrap();
    assert!(result.policy_applied);
    assert_eq!(result.audit_outcome.get(&p(BOB)), Some(&false));
    assert_eq!(result.audit_outcome.get(&p(ALICE)), Some(&true));
    assert!(result.entry_id.is_some());
    assert!(result.warnings.contains(&ShareWarning::AuditPartial {
        failed: vec![p(BOB)]
    }));
    assert_eq!(sharing.audit().read(&p(ALICE)).await.unwrap().len(), 1);
}

#[tokio::test]
async fn every_log_failing_still_reports_success() {
    let pod = seeded_pod();
    pod.fail_with("https://alice.example/audit/", None, 500);
    pod.fail_with("https://bob.example/audit/", None, 500);
    let sharing = orchestrator(pod.clone());

    let result = sharing.share(read_share(), CancelSignal::never()).await.unwrap();
    assert!(result.policy_applied);
    assert!(result.entry_id.is_none());
    assert!(result.audit_outcome.values().all(|written| !written));
    assert!(matches!(
        result.warnings[0],
        ShareWarning::AuditFailed { .. }
    ));
}

#[tokio::test]
async fn later_grant_is_the_latest() {
    let pod = seeded_pod();
    let sharing = orchestrator(pod.clone());

    let first = sharing.share(read_share(), CancelSignal::never()).await.unwrap();
    let write: PermissionSet = [Permission::Read, Permission::Write].into_iter().collect();
    let second = sharing
        .share(
            ShareRequest::new(RESOURCE, ALICE, BOB, write.clone(), SharePattern::SharedWrite),
            CancelSignal::never(),
        )
        .await
        .unwrap();
    assert_ne!(first.entry_id, second.entry_id);

    let view = sharing.audit().read(&p(ALICE)).await.unwrap();
    assert_eq!(view.len(), 2);
    let latest = view.latest_per_resource();
    assert_eq!(latest.len(), 1);
    assert_eq!(Some(&latest[0].id), second.entry_id.as_ref());
    assert_eq!(latest[0].permissions, write);
}

#[tokio::test]
async fn cancellation_before_commit_writes_nothing() {
    let pod = seeded_pod();
    let sharing = orchestrator(pod.clone());
    let (handle, signal) = cancellation();
    handle.cancel();

    let err = sharing.share(read_share(), signal).await.unwrap_err();
    assert_eq!(err, SharingError::Cancelled);
    assert!(pod.requests().is_empty());
}

/// Fires the cancel handle as soon as the resource policy has been written.
struct CancelAfterPolicy {
    inner: Arc<InMemoryPod>,
    handle: CancelHandle,
}

#[async_trait]
impl PodClient for CancelAfterPolicy {
    async fn send(&self, request: PodRequest) -> TransportResult<PodResponse> {
        let is_policy = request.method == Method::Put && request.uri == RESOURCE_ACR;
        let response = self.inner.send(request).await;
        if is_policy {
            self.handle.cancel();
        }
        response
    }
}

#[tokio::test]
async fn cancellation_after_commit_skips_best_effort_steps() {
    let pod = seeded_pod();
    let (handle, signal) = cancellation();
    let sharing = orchestrator(Arc::new(CancelAfterPolicy {
        inner: pod.clone(),
        handle,
    }));

    let result = sharing.share(read_share(), signal).await.unwrap();
    assert!(result.policy_applied);
    assert_eq!(result.state, SagaState::Done);
    assert!(result.entry_id.is_none());
    assert!(!result.notified);
    assert_eq!(
        result.warnings,
        vec![
            ShareWarning::Skipped {
                step: SagaStep::Audit
            },
            ShareWarning::Skipped {
                step: SagaStep::Notify
            },
        ]
    );
    assert!(pod.contains(RESOURCE_ACR));
    assert_eq!(pod.count(Method::Patch, "https://"), 0);
}

struct CancelAfterFirstAppend {
    inner: Arc<InMemoryPod>,
    handle: CancelHandle,
}

#[async_trait]
impl PodClient for CancelAfterFirstAppend {
    async fn send(&self, request: PodRequest) -> TransportResult<PodResponse> {
        let is_append = request.method == Method::Patch;
        let response = self.inner.send(request).await;
        if is_append {
            self.handle.cancel();
        }
        response
    }
}

#[tokio::test]
async fn cancellation_during_audit_lets_started_replicas_finish() {
    let pod = seeded_pod();
    let (handle, signal) = cancellation();
    let sharing = orchestrator(Arc::new(CancelAfterFirstAppend {
        inner: pod.clone(),
        handle,
    }));

    let result = sharing.share(read_share(), signal).await.unwrap();
    assert!(result.entry_id.is_some());
    assert_eq!(result.audit_outcome.get(&p(ALICE)), Some(&true));
    assert_eq!(result.audit_outcome.get(&p(BOB)), Some(&true));
    assert_eq!(
        result.warnings,
        vec![ShareWarning::Skipped {
            step: SagaStep::Notify
        }]
    );
    assert_eq!(pod.count(Method::Patch, "https://"), 2);
    assert_eq!(pod.count(Method::Post, "https://"), 0);
    let bob_log = sharing.audit().read(&p(BOB)).await.unwrap();
    assert_eq!(bob_log.entries[0].id, result.entry_id.unwrap());
}

#[tokio::test]
async fn revoke_rewrites_policy_and_logs_the_revocation() {
    let pod = seeded_pod();
    let sharing = orchestrator(pod.clone());

    sharing.share(read_share(), CancelSignal::never()).await.unwrap();
    let with_bob = Grants::new().with(PermissionSet::read_only(), BOB);
    sharing
        .share(
            ShareRequest::new(
                RESOURCE,
                ALICE,
                CAROL,
                PermissionSet::read_only(),
                SharePattern::SharedRead,
            )
            .with_existing(with_bob.clone()),
            CancelSignal::never(),
        )
        .await
        .unwrap();

    let remaining = with_bob.with(PermissionSet::read_only(), CAROL);
    let result = sharing
        .revoke(
            RevokeRequest::new(RESOURCE, ALICE, BOB, PermissionSet::read_only())
                .keeping(SharePattern::SharedRead, remaining),
            CancelSignal::never(),
        )
        .await
        .unwrap();
    assert!(result.policy_applied);
    assert!(!result.notified);

    let policy = sharing.inspect(RESOURCE).await.unwrap().unwrap().policy;
    assert!(!policy.mentions(&p(BOB)));
    assert!(policy.mentions(&p(CAROL)));

    let bob_view = sharing.audit().read(&p(BOB)).await.unwrap();
    assert_eq!(bob_view.len(), 2);
    assert!(!bob_view.entries[0].is_grant());

    let alice_view = sharing.audit().read(&p(ALICE)).await.unwrap();
    let effective: Vec<_> = alice_view
        .effective_grants()
        .into_iter()
        .map(|entry| entry.recipient)
        .collect();
    assert_eq!(effective, vec![p(CAROL)]);

    assert_eq!(pod.count(Method::Post, BOB_INBOX), 1);
}

#[tokio::test]
async fn revoke_notifies_when_configured() {
    let pod = seeded_pod();
    let config = SharingConfig {
        notify_on_revoke: true,
        ..SharingConfig::default()
    };
    let sharing = SharingOrchestrator::new(pod.clone(), clock(), config);

    let result = sharing
        .revoke(
            RevokeRequest::new(RESOURCE, ALICE, BOB, PermissionSet::read_only()),
            CancelSignal::never(),
        )
        .await
        .unwrap();
    assert!(result.notified);
    let notice = pod.body("https://bob.example/inbox/1").unwrap();
    assert!(notice.contains("\"Undo\""));
}

#[tokio::test]
async fn initialize_and_inspect() {
    let pod = seeded_pod();
    let sharing = orchestrator(pod.clone());
    assert!(sharing.inspect(RESOURCE).await.unwrap().is_none());

    sharing.initialize_resource(RESOURCE, ALICE).await.unwrap();
    let inspection = sharing.inspect(RESOURCE).await.unwrap().unwrap();
    assert!(inspection.summary.control);
    assert!(!inspection.summary.public);
    assert!(!inspection.policy.mentions(&p(BOB)));
    assert_eq!(pod.count(Method::Patch, "https://"), 0);
}

#[tokio::test]
async fn invalid_input_is_rejected_before_any_request() {
    let pod = seeded_pod();
    let sharing = orchestrator(pod.clone());

    let bad_recipient = ShareRequest::new(
        RESOURCE,
        ALICE,
        "ftp://bob.example/card#me",
        PermissionSet::read_only(),
        SharePattern::SharedRead,
    );
    assert!(matches!(
        sharing.share(bad_recipient, CancelSignal::never()).await,
        Err(SharingError::Validation(_))
    ));

    let missing_expiry = ShareRequest::new(
        RESOURCE,
        ALICE,
        BOB,
        PermissionSet::read_only(),
        SharePattern::TimeLimited,
    );
    assert!(matches!(
        sharing.share(missing_expiry, CancelSignal::never()).await,
        Err(SharingError::Validation(_))
    ));

    let not_a_container = ShareRequest::new(
        RESOURCE,
        ALICE,
        BOB,
        PermissionSet::read_only(),
        SharePattern::ContainerDefault,
    );
    assert!(matches!(
        sharing.share(not_a_container, CancelSignal::never()).await,
        Err(SharingError::Validation(_))
    ));
    assert!(pod.requests().is_empty());
}

struct Stalled;

#[async_trait]
impl PodClient for Stalled {
    async fn send(&self, _request: PodRequest) -> TransportResult<PodResponse> {
        std::future::pending().await
    }
}

#[tokio::test(start_paused = true)]
async fn stalled_store_times_out_as_share_failure() {
    let config = SharingConfig {
        request_timeout_ms: 50,
        ..SharingConfig::default()
    };
    let sharing = SharingOrchestrator::new(Arc::new(Stalled), clock(), config);

    let err = sharing.share(read_share(), CancelSignal::never()).await.unwrap_err();
    assert!(matches!(err, SharingError::ShareFailed(_)));
}
