//! Progress event log and broadcaster
//!
//! This crate provides the append-only, durably persisted progress log for
//! dispatch runs, plus best-effort fan-out to any number of live
//! subscribers. Delivery to a subscriber never blocks the producer: each
//! subscriber has its own bounded channel, a full channel drops the event
//! for that subscriber only, and a closed channel evicts it.

pub mod log;
pub mod stream;

pub use log::EventLog;
pub use stream::EventStream;
