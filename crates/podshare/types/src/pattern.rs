use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Named sharing intents understood by the policy compiler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SharePattern {
    OwnerOnly,
    SharedRead,
    SharedWrite,
    TeamRoles,
    TimeLimited,
    AppScoped,
    Delegated,
    ContainerDefault,
}

impl SharePattern {
    pub const ALL: [SharePattern; 8] = [
        SharePattern::OwnerOnly,
        SharePattern::SharedRead,
        SharePattern::SharedWrite,
        SharePattern::TeamRoles,
        SharePattern::TimeLimited,
        SharePattern::AppScoped,
        SharePattern::Delegated,
        SharePattern::ContainerDefault,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SharePattern::OwnerOnly => "owner-only",
            SharePattern::SharedRead => "shared-read",
            SharePattern::SharedWrite => "shared-write",
            SharePattern::TeamRoles => "team-roles",
            SharePattern::TimeLimited => "time-limited",
            SharePattern::AppScoped => "app-scoped",
            SharePattern::Delegated => "delegated",
            SharePattern::ContainerDefault => "container-default",
        }
    }

    /// Patterns whose compiled documents carry a creation timestamp.
    pub fn embeds_timestamp(&self) -> bool {
        matches!(self, SharePattern::TeamRoles | SharePattern::Delegated)
    }
}

impl fmt::Display for SharePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SharePattern {
    type Err = ValidationError;

    /// Accepts kebab, snake and camel spellings; `basic` is an alias of
    /// [`SharePattern::SharedRead`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .flat_map(char::to_lowercase)
            .collect();
        match key.as_str() {
            "owneronly" | "private" => Ok(SharePattern::OwnerOnly),
            "sharedread" | "basic" => Ok(SharePattern::SharedRead),
            "sharedwrite" => Ok(SharePattern::SharedWrite),
            "teamroles" => Ok(SharePattern::TeamRoles),
            "timelimited" => Ok(SharePattern::TimeLimited),
            "appscoped" => Ok(SharePattern::AppScoped),
            "delegated" => Ok(SharePattern::Delegated),
            "containerdefault" => Ok(SharePattern::ContainerDefault),
            _ => Err(ValidationError::InvalidPattern(format!(
                "unknown pattern `{}`",
                s.trim()
            ))),
        }
    }
}
