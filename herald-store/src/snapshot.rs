use std::time::SystemTime;

use herald_common::Recipient;
use serde::{Deserialize, Serialize};

/// Per-identity send timestamps, keyed by sender address.
///
/// Entries older than the quota window are pruned lazily by the quota
/// tracker; the store persists whatever it is handed.
pub type UsageLog = ahash::AHashMap<String, Vec<SystemTime>>;

/// Durable image of the two recipient queues.
///
/// Written after every membership mutation, so a crash loses at most the
/// single recipient that was in flight at the time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientSnapshot {
    pub pending: Vec<Recipient>,
    pub completed: Vec<Recipient>,
}

impl RecipientSnapshot {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.completed.is_empty()
    }
}
