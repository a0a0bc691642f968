pub mod event;
pub mod identity;
pub mod job;
pub mod logging;
pub mod recipient;
pub mod state;

pub use event::{EventKind, ProgressEvent};
pub use identity::{Credential, Endpoint, SenderIdentity};
pub use job::{JobId, SendJob};
pub use recipient::Recipient;
pub use state::RunState;
pub use tracing;

/// Control signal broadcast to long-running tasks.
#[derive(Debug, Clone, Copy)]
pub enum Signal {
    Shutdown,
    Finalised,
}
