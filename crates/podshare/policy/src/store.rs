//! Persistence of policy documents next to the resources they govern.

use crate::document::PolicyDocument;
use crate::error::PolicyError;
use podshare_transport::{PodClient, PodRequest, TEXT_TURTLE};
use podshare_types::{Permission, Principal, ResourceUri, ValidationError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const DEFAULT_ACR_SUFFIX: &str = ".acr";

/// Stores one policy document per resource at `<resource><suffix>`.
pub struct PolicyStore {
    client: Arc<dyn PodClient>,
    suffix: String,
}

impl PolicyStore {
    pub fn new(client: Arc<dyn PodClient>) -> Self {
        Self {
            client,
            suffix: DEFAULT_ACR_SUFFIX.to_string(),
        }
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    pub fn location(&self, resource: &ResourceUri) -> String {
        resource.with_suffix(&self.suffix)
    }

    /// Replace the resource's policy with `document`.
    ///
    /// A single whole-document PUT: repeating it is harmless, and a failed
    /// write leaves the previous policy in place.
    pub async fn write(
        &self,
        resource: &ResourceUri,
        document: &PolicyDocument,
    ) -> Result<(), PolicyError> {
        if document.applies_to_members() && !resource.is_container() {
            return Err(PolicyError::Validation(ValidationError::InvalidResource {
                value: resource.to_string(),
                reason: "member policies can only be set on containers".to_string(),
            }));
        }

        let location = self.location(resource);
        let body = document.to_turtle(resource);
        let response = self
            .client
            .send(PodRequest::put(&location, TEXT_TURTLE, body))
            .await
            .map_err(|err| PolicyError::WriteFailed {
                resource: resource.to_string(),
                status: None,
                reason: err.to_string(),
            })?;

        if !response.is_success() {
            warn!(resource = %resource, status = response.status, "policy write rejected");
            return Err(PolicyError::WriteFailed {
                resource: resource.to_string(),
                status: Some(response.status),
                reason: "store rejected policy document".to_string(),
            });
        }
        info!(resource = %resource, pattern = %document.pattern, controls = document.controls.len(), "policy applied");
        Ok(())
    }

    /// Fetch the raw policy document. `None` when the resource has none.
    pub async fn fetch(&self, resource: &ResourceUri) -> Result<Option<RawPolicy>, PolicyError> {
        let location = self.location(resource);
        let response = self
            .client
            .send(PodRequest::get(&location))
            .await
            .map_err(|err| PolicyError::ReadFailed {
                resource: resource.to_string(),
                status: None,
                reason: err.to_string(),
            })?;

        if response.is_not_found() {
            debug!(resource = %resource, "no policy document");
            return Ok(None);
        }
        if !response.is_success() {
            return Err(PolicyError::ReadFailed {
                resource: resource.to_string(),
                status: Some(response.status),
                reason: "store refused policy read".to_string(),
            });
        }
        Ok(Some(RawPolicy {
            resource: resource.clone(),
            location,
            body: response.body,
        }))
    }

    /// Remove the policy document. Already-absent documents are not an error.
    pub async fn delete(&self, resource: &ResourceUri) -> Result<(), PolicyError> {
        let response = self
            .client
            .send(PodRequest::delete(self.location(resource)))
            .await
            .map_err(|err| PolicyError::WriteFailed {
                resource: resource.to_string(),
                status: None,
                reason: err.to_string(),
            })?;

        if response.is_success() || response.is_not_found() {
            info!(resource = %resource, "policy removed");
            Ok(())
        } else {
            Err(PolicyError::WriteFailed {
                resource: resource.to_string(),
                status: Some(response.status),
                reason: "store refused policy delete".to_string(),
            })
        }
    }
}

/// A stored policy document as text.
///
/// The read side deliberately does not rebuild the policy graph:
/// [`RawPolicy::summary`] reports which access modes appear anywhere in the
/// document and [`RawPolicy::mentions`] whether an agent is named at all.
/// That is enough for display and coarse decisions; it cannot tell which
/// agent holds which mode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawPolicy {
    pub resource: ResourceUri,
    pub location: String,
    pub body: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSummary {
    pub read: bool,
    pub write: bool,
    pub append: bool,
    pub control: bool,
    pub public: bool,
}

impl RawPolicy {
    pub fn summary(&self) -> PermissionSummary {
        let present = |permission: Permission| {
            self.body.contains(&permission.term()) || self.body.contains(&permission.iri())
        };
        PermissionSummary {
            read: present(Permission::Read),
            write: present(Permission::Write),
            append: present(Permission::Append),
            control: present(Permission::Control),
            public: self.body.contains("acp:PublicAgent")
                || self.body.contains("http://www.w3.org/ns/solid/acp#PublicAgent"),
        }
    }

    pub fn mentions(&self, principal: &Principal) -> bool {
        self.body.contains(&format!("<{}>", principal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{CompileOptions, Grants, PolicyCompiler};
    use podshare_transport::{InMemoryPod, Method};
    use podshare_types::{PermissionSet, SharePattern, SystemClock};

    const ALICE: &str = "https://alice.example/profile/card#me";
    const BOB: &str = "https://bob.example/profile/card#me";

    fn resource() -> ResourceUri {
        ResourceUri::parse("https://alice.example/notes/a.ttl").unwrap()
    }

    fn shared_with_bob() -> PolicyDocument {
        PolicyCompiler::new(Arc::new(SystemClock))
            .compile(
                SharePattern::SharedRead,
                ALICE,
                &Grants::new().with(PermissionSet::read_only(), BOB),
                &CompileOptions::default(),
            )
            .unwrap()
    }

    #[tokio::test]
    async fn write_then_fetch_summarizes_keywords() {
        let pod = Arc::new(InMemoryPod::new());
        let store = PolicyStore::new(pod.clone());

        store.write(&resource(), &shared_with_bob()).await.unwrap();
        assert!(pod.contains("https://alice.example/notes/a.ttl.acr"));

        let raw = store.fetch(&resource()).await.unwrap().unwrap();
        let summary = raw.summary();
        assert!(summary.read && summary.write && summary.control);
        assert!(!summary.append && !summary.public);
        assert!(raw.mentions(&Principal::parse(BOB).unwrap()));
        assert!(raw.mentions(&Principal::parse(ALICE).unwrap()));
    }

    #[tokio::test]
    async fn missing_policy_is_none_and_errors_carry_status() {
        let pod = Arc::new(InMemoryPod::new());
        let store = PolicyStore::new(pod.clone());
        assert!(store.fetch(&resource()).await.unwrap().is_none());

        pod.fail_with("https://alice.example/notes/", Some(Method::Get), 403);
        assert!(matches!(
            store.fetch(&resource()).await,
            Err(PolicyError::ReadFailed {
                status: Some(403),
                ..
            })
        ));

        pod.fail_with("https://alice.example/notes/", Some(Method::Put), 500);
        assert!(matches!(
            store.write(&resource(), &shared_with_bob()).await,
            Err(PolicyError::WriteFailed {
                status: Some(500),
                ..
            })
        ));
    }

    #[tokio::test]
    async fn failed_write_keeps_previous_policy() {
        let pod = Arc::new(InMemoryPod::new());
        let store = PolicyStore::new(pod.clone());
        let owner = Principal::parse(ALICE).unwrap();
        store
            .write(&resource(), &PolicyDocument::owner_only(&owner))
            .await
            .unwrap();
        let before = pod.body(&store.location(&resource()));

        pod.fail_with("https://alice.example/notes/a.ttl.acr", Some(Method::Put), 500);
        assert!(store.write(&resource(), &shared_with_bob()).await.is_err());
        assert_eq!(pod.body(&store.location(&resource())), before);
    }

    #[tokio::test]
    async fn delete_is_idempotent_and_member_policies_need_containers() {
        let pod = Arc::new(InMemoryPod::new());
        let store = PolicyStore::new(pod.clone()).with_suffix(".acl");
        assert_eq!(store.location(&resource()), "https://alice.example/notes/a.ttl.acl");
        store.delete(&resource()).await.unwrap();

        let inherited = PolicyCompiler::new(Arc::new(SystemClock))
            .compile(
                SharePattern::ContainerDefault,
                ALICE,
                &Grants::new(),
                &CompileOptions::default(),
            )
            .unwrap();
        assert!(matches!(
            store.write(&resource(), &inherited).await,
            Err(PolicyError::Validation(_))
        ));
        let container = ResourceUri::parse("https://alice.example/notes/").unwrap();
        store.write(&container, &inherited).await.unwrap();
    }
}
