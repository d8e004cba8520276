use podshare_types::Principal;
use serde::{Deserialize, Serialize};

/// Where a principal's logs live below their storage root.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLayout {
    #[serde(default = "default_container")]
    pub container: String,
    #[serde(default = "default_permission_log")]
    pub permission_log: String,
    #[serde(default = "default_outgoing_log")]
    pub outgoing_log: String,
}

fn default_container() -> String {
    "audit/".to_string()
}

fn default_permission_log() -> String {
    "permission-log.ttl".to_string()
}

fn default_outgoing_log() -> String {
    "outgoing-log.ttl".to_string()
}

impl Default for LogLayout {
    fn default() -> Self {
        Self {
            container: default_container(),
            permission_log: default_permission_log(),
            outgoing_log: default_outgoing_log(),
        }
    }
}

impl LogLayout {
    pub fn container_for(&self, principal: &Principal) -> String {
        let container = self.container.trim_matches('/');
        if container.is_empty() {
            principal.storage_root()
        } else {
            format!("{}{}/", principal.storage_root(), container)
        }
    }

    pub fn permission_log_for(&self, principal: &Principal) -> String {
        format!("{}{}", self.container_for(principal), self.permission_log)
    }

    pub fn outgoing_log_for(&self, principal: &Principal) -> String {
        format!("{}{}", self.container_for(principal), self.outgoing_log)
    }
}
