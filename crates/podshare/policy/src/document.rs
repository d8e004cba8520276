//! In-memory policy graph and its Turtle rendering.
//!
//! The rendered document follows the access control resource shape:
//! `AccessControlResource → AccessControl → Policy → (allow, allOf matchers)`.

use chrono::{DateTime, SecondsFormat, Utc};
use podshare_types::{Permission, PermissionSet, Principal, ResourceUri, SharePattern};
use serde::{Deserialize, Serialize};

pub const ACP_NS: &str = "http://www.w3.org/ns/solid/acp#";
pub const POLICY_NS: &str = "https://podshare.dev/ns/policy#";

/// Id of the owner's access control, always the first node.
pub const OWNER_CONTROL_ID: &str = "owner";

/// Selection criterion for a policy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Matcher {
    Agents(Vec<Principal>),
    PublicAgent,
    Clients(Vec<String>),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub allow: PermissionSet,
    /// Every matcher must match for the policy to apply.
    pub all_of: Vec<Matcher>,
    pub role: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub delegated_by: Option<Principal>,
}

impl Policy {
    pub fn new(allow: PermissionSet, matcher: Matcher) -> Self {
        Self {
            allow,
            all_of: vec![matcher],
            role: None,
            created_at: None,
            valid_until: None,
            delegated_by: None,
        }
    }

    /// Explicit agents named by this policy's matchers.
    pub fn agents(&self) -> impl Iterator<Item = &Principal> {
        self.all_of.iter().flat_map(|matcher| match matcher {
            Matcher::Agents(agents) => agents.as_slice(),
            _ => &[][..],
        })
    }

    pub fn is_public(&self) -> bool {
        self.all_of
            .iter()
            .any(|matcher| matches!(matcher, Matcher::PublicAgent))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControl {
    pub id: String,
    pub policy: Policy,
    /// Also applied to members of a container.
    pub inherited: bool,
}

impl AccessControl {
    pub fn new(id: impl Into<String>, policy: Policy) -> Self {
        Self {
            id: id.into(),
            policy,
            inherited: false,
        }
    }
}

/// The full policy for one governed resource. Always replaced wholesale.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDocument {
    pub pattern: SharePattern,
    pub controls: Vec<AccessControl>,
}

impl PolicyDocument {
    /// Owner full control and nothing else.
    pub fn owner_only(owner: &Principal) -> Self {
        Self {
            pattern: SharePattern::OwnerOnly,
            controls: vec![AccessControl::new(
                OWNER_CONTROL_ID,
                Policy::new(
                    PermissionSet::full_control(),
                    Matcher::Agents(vec![owner.clone()]),
                ),
            )],
        }
    }

    pub fn with_control(mut self, control: AccessControl) -> Self {
        self.controls.push(control);
        self
    }

    pub fn owner(&self) -> Option<&Principal> {
        self.controls
            .iter()
            .find(|control| control.id == OWNER_CONTROL_ID)
            .and_then(|control| control.policy.agents().next())
    }

    pub fn grant_controls(&self) -> impl Iterator<Item = &AccessControl> {
        self.controls
            .iter()
            .filter(|control| control.id != OWNER_CONTROL_ID)
    }

    /// Number of access controls giving `principal` at least full control.
    pub fn full_control_count(&self, principal: &Principal) -> usize {
        let full = PermissionSet::full_control();
        self.controls
            .iter()
            .filter(|control| full.iter().all(|p| control.policy.allow.contains(p)))
            .filter(|control| control.policy.agents().any(|agent| agent == principal))
            .count()
    }

    /// Permissions an explicitly named agent receives across all controls.
    pub fn permissions_for(&self, principal: &Principal) -> PermissionSet {
        self.controls
            .iter()
            .filter(|control| control.policy.agents().any(|agent| agent == principal))
            .flat_map(|control| control.policy.allow.iter())
            .collect()
    }

    pub fn applies_to_members(&self) -> bool {
        self.controls.iter().any(|control| control.inherited)
    }

    /// Render as Turtle for storage next to `resource`.
    pub fn to_turtle(&self, resource: &ResourceUri) -> String {
        let mut out = String::new();
        out.push_str(&format!("@prefix acp: <{}>.\n", ACP_NS));
        out.push_str("@prefix acl: <http://www.w3.org/ns/auth/acl#>.\n");
        out.push_str("@prefix dcterms: <http://purl.org/dc/terms/>.\n");
        out.push_str("@prefix xsd: <http://www.w3.org/2001/XMLSchema#>.\n");
        out.push_str(&format!("@prefix ps: <{}>.\n\n", POLICY_NS));

        let controls = node_list(self.controls.iter());
        let mut root = vec![
            "a acp:AccessControlResource".to_string(),
            format!("acp:resource <{}>", resource),
            format!("ps:pattern \"{}\"", self.pattern),
            format!("acp:accessControl {}", controls),
        ];
        let inherited = node_list(self.controls.iter().filter(|control| control.inherited));
        if !inherited.is_empty() {
            root.push(format!("acp:memberAccessControl {}", inherited));
        }
        out.push_str(&block("<#root>", root));

        for control in &self.controls {
            let policy_id = format!("{}-policy", control.id);
            out.push_str(&block(
                &format!("<#{}>", control.id),
                vec![
                    "a acp:AccessControl".to_string(),
                    format!("acp:apply <#{}>", policy_id),
                ],
            ));

            let policy = &control.policy;
            let matcher_ids: Vec<String> = (1..=policy.all_of.len())
                .map(|n| format!("{}-matcher-{}", control.id, n))
                .collect();
            let mut predicates = vec![
                "a acp:Policy".to_string(),
                format!("acp:allow {}", allow_terms(&policy.allow)),
                format!(
                    "acp:allOf {}",
                    matcher_ids
                        .iter()
                        .map(|id| format!("<#{}>", id))
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            ];
            if let Some(role) = &policy.role {
                predicates.push(format!("ps:role \"{}\"", role));
            }
            if let Some(created) = policy.created_at {
                predicates.push(format!("dcterms:created {}", datetime_literal(created)));
            }
            if let Some(until) = policy.valid_until {
                predicates.push(format!("ps:validUntil {}", datetime_literal(until)));
            }
            if let Some(delegator) = &policy.delegated_by {
                predicates.push(format!("ps:delegatedBy <{}>", delegator));
            }
            out.push_str(&block(&format!("<#{}>", policy_id), predicates));

            for (matcher, id) in policy.all_of.iter().zip(&matcher_ids) {
                let selector = match matcher {
                    Matcher::Agents(agents) => format!(
                        "acp:agent {}",
                        agents
                            .iter()
                            .map(|agent| format!("<{}>", agent))
                            .collect::<Vec<_>>()
                            .join(", ")
                    ),
                    Matcher::PublicAgent => "acp:agent acp:PublicAgent".to_string(),
                    Matcher::Clients(clients) => format!(
                        "acp:client {}",
                        clients
                            .iter()
                            .map(|client| format!("<{}>", client))
                            .collect::<Vec<_>>()
                            .join(", ")
                    ),
                };
                out.push_str(&block(
                    &format!("<#{}>", id),
                    vec!["a acp:Matcher".to_string(), selector],
                ));
            }
        }
        out
    }
}

fn node_list<'a>(controls: impl Iterator<Item = &'a AccessControl>) -> String {
    controls
        .map(|control| format!("<#{}>", control.id))
        .collect::<Vec<_>>()
        .join(", ")
}

fn allow_terms(allow: &PermissionSet) -> String {
    allow
        .iter()
        .map(|permission: Permission| permission.term())
        .collect::<Vec<_>>()
        .join(", ")
}

fn datetime_literal(at: DateTime<Utc>) -> String {
    format!(
        "\"{}\"^^xsd:dateTime",
        at.to_rfc3339_opts(SecondsFormat::Millis, true)
    )
}

fn block(subject: &str, predicates: Vec<String>) -> String {
    format!("{}\n    {}.\n\n", subject, predicates.join(";\n    "))
}
