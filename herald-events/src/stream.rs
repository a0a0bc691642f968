use std::sync::Arc;

use dashmap::DashMap;
use herald_common::ProgressEvent;
use tokio::sync::mpsc;

/// A live subscription to the progress event stream.
///
/// Dropping the stream unregisters it from the fan-out set; events
/// published while the subscriber's buffer is full are dropped for this
/// subscriber only.
#[derive(Debug)]
pub struct EventStream {
    id: u64,
    receiver: mpsc::Receiver<ProgressEvent>,
    registry: Arc<DashMap<u64, mpsc::Sender<ProgressEvent>>>,
}

impl EventStream {
    pub(crate) fn new(
        id: u64,
        receiver: mpsc::Receiver<ProgressEvent>,
        registry: Arc<DashMap<u64, mpsc::Sender<ProgressEvent>>>,
    ) -> Self {
        Self {
            id,
            receiver,
            registry,
        }
    }

    /// Receive the next live event, or `None` once the log is gone.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        self.receiver.recv().await
    }

    /// Non-blocking receive for polling callers.
    ///
    /// # Errors
    /// Returns the underlying channel error when empty or disconnected.
    pub fn try_recv(&mut self) -> Result<ProgressEvent, mpsc::error::TryRecvError> {
        self.receiver.try_recv()
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.registry.remove(&self.id);
    }
}
