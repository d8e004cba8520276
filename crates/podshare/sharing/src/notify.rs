//! Inbox discovery and best-effort delivery of share notices.

use crate::error::NotificationError;
use chrono::SecondsFormat;
use podshare_transport::{PodClient, PodRequest, JSON_LD};
use podshare_types::{AuditEntry, AuditEntryType, Principal};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

const LDP_INBOX: &str = "http://www.w3.org/ns/ldp#inbox";
const ACTIVITY_STREAMS: &str = "https://www.w3.org/ns/activitystreams";

pub struct NotificationDispatcher {
    client: Arc<dyn PodClient>,
}

impl NotificationDispatcher {
    pub fn new(client: Arc<dyn PodClient>) -> Self {
        Self { client }
    }

    /// The inbox advertised by `principal`'s profile, if any.
    pub async fn discover_inbox(
        &self,
        principal: &Principal,
    ) -> Result<Option<String>, NotificationError> {
        let profile = principal.document();
        let unavailable = |reason: String| NotificationError::ProfileUnavailable {
            profile: profile.to_string(),
            reason,
        };
        let response = self
            .client
            .send(PodRequest::get(profile))
            .await
            .map_err(|err| unavailable(err.to_string()))?;
        if !response.is_success() {
            return Err(unavailable(format!("status {}", response.status)));
        }
        Ok(find_inbox(&response.body, profile))
    }

    /// Deliver a notice about `entry` to the recipient's inbox. Returns the
    /// inbox used, or `None` when the recipient advertises none.
    pub async fn notify(&self, entry: &AuditEntry) -> Result<Option<String>, NotificationError> {
        let Some(inbox) = self.discover_inbox(&entry.recipient).await? else {
            debug!(recipient = %entry.recipient, "no inbox advertised");
            return Ok(None);
        };

        let body = activity(entry).to_string();
        let response = self
            .client
            .send(PodRequest::post(&inbox, JSON_LD, body))
            .await
            .map_err(|err| NotificationError::DeliveryFailed {
                inbox: inbox.clone(),
                status: None,
                reason: err.to_string(),
            })?;
        if !response.is_success() {
            return Err(NotificationError::DeliveryFailed {
                inbox,
                status: Some(response.status),
                reason: "inbox refused notice".to_string(),
            });
        }
        info!(recipient = %entry.recipient, inbox = %inbox, entry = %entry.id, "notice delivered");
        Ok(Some(inbox))
    }
}

/// Find an `ldp:inbox` object in a Turtle profile. Relative IRIs are
/// resolved against `profile`.
pub fn find_inbox(body: &str, profile: &str) -> Option<String> {
    let full = format!("<{}>", LDP_INBOX);
    let start = body
        .find("ldp:inbox")
        .map(|at| at + "ldp:inbox".len())
        .or_else(|| body.find(&full).map(|at| at + full.len()))?;
    let rest = body[start..].trim_start();
    let iri = rest.strip_prefix('<')?.split('>').next()?;
    let base = Url::parse(profile).ok()?;
    base.join(iri).ok().map(String::from)
}

/// ActivityStreams notice: `Announce` for grants, `Undo` of the announce
/// for revocations.
pub fn activity(entry: &AuditEntry) -> Value {
    let announce = json!({
        "type": "Announce",
        "actor": entry.granter.as_str(),
        "object": entry.resource,
        "target": entry.recipient.as_str(),
    });
    let mut notice = match entry.entry_type {
        AuditEntryType::Grant => announce,
        AuditEntryType::Revoke => json!({
            "type": "Undo",
            "actor": entry.granter.as_str(),
            "object": announce,
        }),
    };
    if let Value::Object(fields) = &mut notice {
        fields.insert("@context".to_string(), json!(ACTIVITY_STREAMS));
        fields.insert("id".to_string(), json!(format!("urn:podshare:{}", entry.id)));
        fields.insert(
            "published".to_string(),
            json!(entry.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        fields.insert(
            "summary".to_string(),
            json!(format!(
                "{} {} on {}",
                entry.entry_type, entry.permissions, entry.resource
            )),
        );
    }
    notice
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use podshare_transport::{InMemoryPod, Method};
    use podshare_types::{AuditEntryId, PermissionSet, SharePattern};

    const BOB_PROFILE: &str = "https://bob.example/profile/card";

    fn entry(entry_type: AuditEntryType) -> AuditEntry {
        AuditEntry {
            id: AuditEntryId("0001714564800000-000000-abcdabcd".to_string()),
            timestamp: Utc::now(),
            resource: "https://alice.example/notes/a.ttl".to_string(),
            owner: Principal::parse("https://alice.example/profile/card#me").unwrap(),
            granter: Principal::parse("https://alice.example/profile/card#me").unwrap(),
            recipient: Principal::parse("https://bob.example/profile/card#me").unwrap(),
            permissions: PermissionSet::read_only(),
            entry_type,
            pattern: SharePattern::SharedRead,
            expires_at: None,
            timestamp_recovered: false,
        }
    }

    #[test]
    fn inbox_forms() {
        assert_eq!(
            find_inbox("<#me> ldp:inbox <../inbox/> .", BOB_PROFILE).as_deref(),
            Some("https://bob.example/inbox/")
        );
        assert_eq!(
            find_inbox(
                "<#me> <http://www.w3.org/ns/ldp#inbox> <https://inbox.example/bob/> .",
                BOB_PROFILE
            )
            .as_deref(),
            Some("https://inbox.example/bob/")
        );
        assert_eq!(find_inbox("<#me> a foaf:Person .", BOB_PROFILE), None);
    }

    #[test]
    fn revoke_notice_undoes_the_announce() {
        let grant = activity(&entry(AuditEntryType::Grant));
        assert_eq!(grant["type"], "Announce");
        assert_eq!(grant["@context"], ACTIVITY_STREAMS);

        let revoke = activity(&entry(AuditEntryType::Revoke));
        assert_eq!(revoke["type"], "Undo");
        assert_eq!(revoke["object"]["type"], "Announce");
        assert_eq!(revoke["object"]["object"], "https://alice.example/notes/a.ttl");
    }

    #[tokio::test]
    async fn notify_posts_to_discovered_inbox() {
        let pod = Arc::new(InMemoryPod::new());
        pod.insert(BOB_PROFILE, "<#me> ldp:inbox </inbox/> .");
        pod.insert("https://bob.example/inbox/", "");
        let dispatcher = NotificationDispatcher::new(pod.clone());

        let inbox = dispatcher.notify(&entry(AuditEntryType::Grant)).await.unwrap();
        assert_eq!(inbox.as_deref(), Some("https://bob.example/inbox/"));
        assert_eq!(pod.count(Method::Post, "https://bob.example/inbox/"), 1);
        assert!(pod.contains("https://bob.example/inbox/1"));
    }

    #[tokio::test]
    async fn missing_profile_and_missing_inbox() {
        let pod = Arc::new(InMemoryPod::new());
        let dispatcher = NotificationDispatcher::new(pod.clone());
        assert!(matches!(
            dispatcher.notify(&entry(AuditEntryType::Grant)).await,
            Err(NotificationError::ProfileUnavailable { .. })
        ));

        pod.insert(BOB_PROFILE, "<#me> a foaf:Person .");
        assert_eq!(
            dispatcher.notify(&entry(AuditEntryType::Grant)).await.unwrap(),
            None
        );
        assert_eq!(pod.count(Method::Post, "https://bob.example/"), 0);
    }
}
