//! Dispatch engine for bulk outbound messages
//!
//! This crate provides the core of herald:
//! - Recipient queue management with durable pending/completed sequences
//! - Sender identity rotation under per-identity daily quotas
//! - The send/retry/requeue state machine and its background worker
//! - Pause/resume control with at most one worker process-wide
//!
//! Everything user-visible flows through the [`Engine`] facade; progress is
//! surfaced exclusively through the event stream and the queue counts.

pub mod clock;
pub mod controller;
pub mod engine;
pub mod error;
pub mod identity;
pub mod quota;
pub mod roster;
pub mod template;
pub mod transport;
pub mod worker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use controller::RunController;
pub use engine::{Engine, EngineSettings};
pub use error::{DispatchError, SubmitError};
pub use identity::IdentityPool;
pub use quota::QuotaTracker;
pub use roster::RecipientRoster;
pub use template::RenderError;
pub use transport::{DevNullTransport, MessageTransport, MockTransport, TransportError};
pub use worker::WorkerState;
