use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use dashmap::DashMap;
use herald_common::ProgressEvent;
use herald_store::StateStore;
use tracing::warn;
use tokio::sync::{Mutex, mpsc};

use crate::stream::EventStream;

const fn default_capacity() -> usize {
    1000
}

const fn default_channel_capacity() -> usize {
    64
}

/// Append-only progress log with live fan-out.
///
/// The log is bounded: once `capacity` events accumulate, the oldest are
/// dropped first. Every append is persisted through the state store while
/// the log lock is held, so the durable tail always matches the in-memory
/// one. A persistence failure is logged and the in-memory log still
/// advances, leaving a bounded durability-loss window on crash.
#[derive(Debug)]
pub struct EventLog {
    capacity: usize,
    channel_capacity: usize,
    events: Mutex<VecDeque<ProgressEvent>>,
    subscribers: Arc<DashMap<u64, mpsc::Sender<ProgressEvent>>>,
    next_subscriber: AtomicU64,
    store: Arc<dyn StateStore>,
}

impl EventLog {
    /// Create an empty log with default bounds.
    #[must_use]
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self::with_bounds(store, default_capacity(), default_channel_capacity())
    }

    /// Create an empty log with explicit bounds.
    #[must_use]
    pub fn with_bounds(
        store: Arc<dyn StateStore>,
        capacity: usize,
        channel_capacity: usize,
    ) -> Self {
        Self {
            capacity: capacity.max(1),
            channel_capacity: channel_capacity.max(1),
            events: Mutex::new(VecDeque::new()),
            subscribers: Arc::new(DashMap::new()),
            next_subscriber: AtomicU64::new(0),
            store,
        }
    }

    /// Restore the persisted tail from the store.
    ///
    /// # Errors
    /// Returns an error if the persisted log cannot be read.
    pub async fn restore(
        store: Arc<dyn StateStore>,
        capacity: usize,
        channel_capacity: usize,
    ) -> herald_store::Result<Self> {
        let mut persisted = store.load_events().await?;
        let capacity = capacity.max(1);

        // Keep only the newest `capacity` entries.
        if persisted.len() > capacity {
            persisted.drain(..persisted.len() - capacity);
        }

        let log = Self::with_bounds(store, capacity, channel_capacity);
        *log.events.lock().await = persisted.into();
        Ok(log)
    }

    /// Append an event, fan it out to live subscribers, and persist the
    /// bounded tail.
    pub async fn append(&self, event: ProgressEvent) {
        let mut events = self.events.lock().await;
        events.push_back(event.clone());
        while events.len() > self.capacity {
            events.pop_front();
        }

        // Best-effort live delivery; the producer never waits on a
        // subscriber. A full buffer costs that subscriber this event, a
        // closed channel evicts it.
        let mut dead = Vec::new();
        for entry in self.subscribers.iter() {
            match entry.value().try_send(event.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {}
                Err(mpsc::error::TrySendError::Closed(_)) => dead.push(*entry.key()),
            }
        }
        for id in dead {
            self.subscribers.remove(&id);
        }

        let snapshot: Vec<ProgressEvent> = events.iter().cloned().collect();
        if let Err(e) = self.store.save_events(&snapshot).await {
            warn!(error = %e, "Failed to persist event log; in-memory log advances");
        }
    }

    /// Register a live subscriber.
    pub fn subscribe(&self) -> EventStream {
        let id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.channel_capacity);
        self.subscribers.insert(id, sender);
        EventStream::new(id, receiver, Arc::clone(&self.subscribers))
    }

    /// The most recent `limit` events, oldest first, for a reconnecting
    /// subscriber to reconstruct history before live events resume.
    pub async fn replay(&self, limit: usize) -> Vec<ProgressEvent> {
        let events = self.events.lock().await;
        let skip = events.len().saturating_sub(limit);
        events.iter().skip(skip).cloned().collect()
    }

    /// Number of events currently retained.
    pub async fn len(&self) -> usize {
        self.events.lock().await.len()
    }

    /// Whether the log is empty.
    pub async fn is_empty(&self) -> bool {
        self.events.lock().await.is_empty()
    }

    /// Number of live subscribers (for the control surface).
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
