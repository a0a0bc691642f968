use async_trait::async_trait;
use herald_common::{ProgressEvent, SenderIdentity};

use crate::snapshot::{RecipientSnapshot, UsageLog};

/// Durable persistence for the engine's long-lived state.
///
/// Four logical stores back the engine: the recipient snapshot, the sender
/// identity registry, the per-identity usage log, and the bounded progress
/// event log. Every `load_*` reconciles cleanly with an empty or missing
/// backing file by returning empty state, absence is never an error.
///
/// Implementations must be safe for concurrent callers; the engine
/// serializes writes per concern through its own locks, but reads may race
/// with writes from other components.
#[async_trait]
pub trait StateStore: Send + Sync + std::fmt::Debug {
    /// Load the recipient queues persisted by the last run.
    async fn load_recipients(&self) -> crate::Result<RecipientSnapshot>;

    /// Durably replace the recipient snapshot.
    async fn save_recipients(&self, snapshot: &RecipientSnapshot) -> crate::Result<()>;

    /// Load the identity registry, in rotation (insertion) order.
    async fn load_identities(&self) -> crate::Result<Vec<SenderIdentity>>;

    /// Durably replace the identity registry.
    async fn save_identities(&self, identities: &[SenderIdentity]) -> crate::Result<()>;

    /// Load the per-identity usage log.
    async fn load_usage(&self) -> crate::Result<UsageLog>;

    /// Durably replace the usage log.
    ///
    /// Must complete before a send is considered recorded, so an identity
    /// cannot be oversold across a crash.
    async fn save_usage(&self, usage: &UsageLog) -> crate::Result<()>;

    /// Load the persisted tail of the progress event log.
    async fn load_events(&self) -> crate::Result<Vec<ProgressEvent>>;

    /// Durably replace the progress event log.
    async fn save_events(&self, events: &[ProgressEvent]) -> crate::Result<()>;
}
