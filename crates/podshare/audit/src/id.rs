use chrono::{DateTime, Utc};
use podshare_types::AuditEntryId;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Generates entry ids of the form `<millis:13>-<counter:06>-<random:8>`.
///
/// Ids sort lexicographically in creation order within one process: the
/// millisecond prefix orders across time, the counter orders within one
/// millisecond. The random suffix keeps ids from different processes apart.
#[derive(Debug, Default)]
pub struct IdGenerator {
    counter: AtomicU64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self, at: DateTime<Utc>) -> AuditEntryId {
        let sequence = self.counter.fetch_add(1, Ordering::SeqCst) % 1_000_000;
        let millis = at.timestamp_millis().max(0);
        let suffix = Uuid::new_v4().simple().to_string();
        AuditEntryId(format!("{:013}-{:06}-{}", millis, sequence, &suffix[..8]))
    }
}
