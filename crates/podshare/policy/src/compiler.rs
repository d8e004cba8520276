//! Sharing intent → policy document.

use crate::document::{AccessControl, Matcher, Policy, PolicyDocument, OWNER_CONTROL_ID};
use chrono::{DateTime, Utc};
use podshare_types::{
    Clock, Permission, PermissionSet, Principal, SharePattern, ValidationError,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use url::Url;

/// Requested grants, bucketed by permission set. Grantees are kept as given
/// and validated at compile time.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Grants(BTreeMap<PermissionSet, Vec<String>>);

impl Grants {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, permissions: PermissionSet, principal: impl Into<String>) {
        self.0.entry(permissions).or_default().push(principal.into());
    }

    pub fn with(mut self, permissions: PermissionSet, principal: impl Into<String>) -> Self {
        self.add(permissions, principal);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(Vec::is_empty)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PermissionSet, &Vec<String>)> {
        self.0.iter()
    }

    /// Copy without any spelling of `principal`.
    pub fn without(&self, principal: &Principal) -> Grants {
        let buckets = self
            .0
            .iter()
            .map(|(permissions, grantees)| {
                let kept = grantees
                    .iter()
                    .filter(|raw| Principal::normalized(raw) != *principal)
                    .cloned()
                    .collect();
                (permissions.clone(), kept)
            })
            .collect();
        Grants(buckets)
    }
}

/// Pattern-specific inputs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompileOptions {
    /// Grant Read to the public agent instead of listing read-only grantees.
    pub public_read: bool,
    /// Required by [`SharePattern::TimeLimited`].
    pub expires_at: Option<DateTime<Utc>>,
    /// Required by [`SharePattern::AppScoped`].
    pub client_ids: Vec<String>,
    /// Creation stamp for patterns that embed one; the compiler clock is
    /// used when absent.
    pub created_at: Option<DateTime<Utc>>,
}

pub struct PolicyCompiler {
    clock: Arc<dyn Clock>,
}

impl PolicyCompiler {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Build the policy document for `pattern`.
    ///
    /// The owner's full-control node is always first and the owner never
    /// appears elsewhere. Empty buckets produce no node. Grantees are
    /// deduplicated within a bucket but not across buckets.
    pub fn compile(
        &self,
        pattern: SharePattern,
        owner: &str,
        grants: &Grants,
        options: &CompileOptions,
    ) -> Result<PolicyDocument, ValidationError> {
        let owner = Principal::parse(owner)?;
        let mut buckets = Vec::new();
        for (permissions, grantees) in grants.iter() {
            let principals = grantees
                .iter()
                .map(|raw| Principal::parse(raw))
                .collect::<Result<BTreeSet<_>, _>>()?;
            buckets.push((permissions.clone(), principals));
        }
        let clients = self.validate_pattern_options(pattern, options)?;

        let stamp = pattern
            .embeds_timestamp()
            .then(|| options.created_at.unwrap_or_else(|| self.clock.now()));
        let ceiling = match pattern {
            SharePattern::SharedRead => Some(PermissionSet::read_only()),
            SharePattern::SharedWrite => Some(
                [Permission::Read, Permission::Write, Permission::Append]
                    .into_iter()
                    .collect(),
            ),
            _ => None,
        };
        let decorate = |mut control: AccessControl| -> AccessControl {
            let policy = &mut control.policy;
            match pattern {
                SharePattern::TeamRoles => {
                    policy.role = Some(role_for(&policy.allow).to_string());
                    policy.created_at = stamp;
                }
                SharePattern::TimeLimited => policy.valid_until = options.expires_at,
                SharePattern::AppScoped => policy.all_of.push(Matcher::Clients(clients.clone())),
                SharePattern::Delegated => {
                    policy.created_at = stamp;
                    policy.delegated_by = Some(owner.clone());
                }
                SharePattern::ContainerDefault => control.inherited = true,
                _ => {}
            }
            control
        };

        let mut owner_control = AccessControl::new(
            OWNER_CONTROL_ID,
            Policy::new(
                PermissionSet::full_control(),
                Matcher::Agents(vec![owner.clone()]),
            ),
        );
        owner_control.policy.created_at = stamp;
        owner_control.inherited = pattern == SharePattern::ContainerDefault;

        let mut document = PolicyDocument {
            pattern,
            controls: vec![owner_control],
        };
        if pattern == SharePattern::OwnerOnly {
            if !grants.is_empty() || options.public_read {
                tracing::debug!(owner = %owner, "owner-only pattern discards requested grants");
            }
            return Ok(document);
        }

        let read_only = PermissionSet::read_only();
        for (permissions, mut principals) in buckets {
            let allow = match &ceiling {
                Some(ceiling) => permissions.restrict_to(ceiling),
                None => permissions,
            };
            principals.remove(&owner);
            if allow.is_empty() || principals.is_empty() {
                continue;
            }
            if options.public_read && allow == read_only {
                continue;
            }
            let id = format!("grant-{}", document.controls.len());
            let control = AccessControl::new(
                id,
                Policy::new(allow, Matcher::Agents(principals.into_iter().collect())),
            );
            document.controls.push(decorate(control));
        }

        if options.public_read {
            let control =
                AccessControl::new("public", Policy::new(read_only, Matcher::PublicAgent));
            document.controls.push(decorate(control));
        }
        Ok(document)
    }

    fn validate_pattern_options(
        &self,
        pattern: SharePattern,
        options: &CompileOptions,
    ) -> Result<Vec<String>, ValidationError> {
        match pattern {
            SharePattern::TimeLimited => match options.expires_at {
                Some(expiry) if expiry > self.clock.now() => Ok(vec![]),
                Some(_) => Err(ValidationError::InvalidPattern(
                    "time-limited share expiry is already in the past".to_string(),
                )),
                None => Err(ValidationError::InvalidPattern(
                    "time-limited share requires an expiry".to_string(),
                )),
            },
            SharePattern::AppScoped => {
                if options.client_ids.is_empty() {
                    return Err(ValidationError::InvalidPattern(
                        "app-scoped share requires at least one client id".to_string(),
                    ));
                }
                options
                    .client_ids
                    .iter()
                    .map(|client| {
                        let url = Url::parse(client.trim()).map_err(|err| {
                            ValidationError::InvalidPrincipal {
                                value: client.clone(),
                                reason: err.to_string(),
                            }
                        })?;
                        if !matches!(url.scheme(), "https" | "http") {
                            return Err(ValidationError::InvalidPrincipal {
                                value: client.clone(),
                                reason: "client ids must be http(s) URIs".to_string(),
                            });
                        }
                        Ok(client.trim().to_string())
                    })
                    .collect::<Result<BTreeSet<_>, _>>()
                    .map(|clients| clients.into_iter().collect())
            }
            _ => Ok(vec![]),
        }
    }
}

fn role_for(allow: &PermissionSet) -> &'static str {
    if allow.contains(Permission::Control) {
        "manager"
    } else if allow.contains(Permission::Write) {
        "editor"
    } else if allow.contains(Permission::Append) {
        "contributor"
    } else {
        "viewer"
    }
}
