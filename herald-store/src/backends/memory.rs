use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use herald_common::{ProgressEvent, SenderIdentity};

use crate::{
    snapshot::{RecipientSnapshot, UsageLog},
    r#trait::StateStore,
};

#[derive(Debug, Default)]
struct MemoryState {
    recipients: RecipientSnapshot,
    identities: Vec<SenderIdentity>,
    usage: UsageLog,
    events: Vec<ProgressEvent>,
}

/// In-memory state store implementation
///
/// Keeps all four concerns in a `RwLock`-guarded struct. Primarily intended
/// for tests and transient runs; nothing survives the process.
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load_recipients(&self) -> crate::Result<RecipientSnapshot> {
        Ok(self.state.read()?.recipients.clone())
    }

    async fn save_recipients(&self, snapshot: &RecipientSnapshot) -> crate::Result<()> {
        self.state.write()?.recipients = snapshot.clone();
        Ok(())
    }

    async fn load_identities(&self) -> crate::Result<Vec<SenderIdentity>> {
        Ok(self.state.read()?.identities.clone())
    }

    async fn save_identities(&self, identities: &[SenderIdentity]) -> crate::Result<()> {
        self.state.write()?.identities = identities.to_vec();
        Ok(())
    }

    async fn load_usage(&self) -> crate::Result<UsageLog> {
        Ok(self.state.read()?.usage.clone())
    }

    async fn save_usage(&self, usage: &UsageLog) -> crate::Result<()> {
        self.state.write()?.usage = usage.clone();
        Ok(())
    }

    async fn load_events(&self) -> crate::Result<Vec<ProgressEvent>> {
        Ok(self.state.read()?.events.clone())
    }

    async fn save_events(&self, events: &[ProgressEvent]) -> crate::Result<()> {
        self.state.write()?.events = events.to_vec();
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use herald_common::Recipient;
    use pretty_assertions::assert_eq;

    use super::*;

    #[tokio::test]
    async fn test_round_trip_recipients() {
        let store = MemoryStateStore::new();
        let snapshot = RecipientSnapshot {
            pending: vec![Recipient::new("a@example.com", "A", "")],
            completed: vec![Recipient::new("b@example.com", "B", "")],
        };

        store.save_recipients(&snapshot).await.unwrap();
        assert_eq!(store.load_recipients().await.unwrap(), snapshot);
    }

    #[tokio::test]
    async fn test_fresh_store_is_empty() {
        let store = MemoryStateStore::new();
        assert!(store.load_recipients().await.unwrap().is_empty());
        assert!(store.load_identities().await.unwrap().is_empty());
        assert!(store.load_usage().await.unwrap().is_empty());
        assert!(store.load_events().await.unwrap().is_empty());
    }
}
